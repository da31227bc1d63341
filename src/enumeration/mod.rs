//! Fast enumeration of live collections.
//!
//! Elements are handed out in bounded batches of `Arc` references so a
//! caller iterating through a raw-buffer protocol never sees the engine's
//! internal representation, and the engine is consulted once per batch
//! rather than once per element.

mod enumerator;

pub use enumerator::{fast_enumerate, Elements, EnumerationState, FastEnumerator};
