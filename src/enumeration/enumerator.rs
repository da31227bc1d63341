//! Batched enumeration over a live collection.

use crate::collection::LiveCollection;
use crate::error::{BridgeError, Result};
use crate::types::{ClassInfo, Version};
use std::collections::VecDeque;
use std::sync::Arc;

/// Binding between an enumerator and its source collection.
struct Attached<C: LiveCollection> {
    collection: C,
    class_info: ClassInfo,
    /// Collection version when enumeration began.
    version: Version,
    count: usize,
    position: usize,
    /// Strong references handed out by the latest `next` call.
    buffer: Vec<Arc<C::Element>>,
}

enum EnumeratorState<C: LiveCollection> {
    Attached(Attached<C>),
    Detached,
}

/// Enumerates a live collection in batches of strong references.
///
/// Each call to [`next`](Self::next) replaces the previous batch, so the
/// references stay alive until the following call. The enumerator must be
/// [`detach`](Self::detach)ed before the caller mutates the collection;
/// afterwards every `next` fails with `PreconditionViolation`. A mutation
/// made without detaching is detected through the collection's version.
pub struct FastEnumerator<C: LiveCollection> {
    state: EnumeratorState<C>,
    batch_size: usize,
}

impl<C: LiveCollection> FastEnumerator<C> {
    /// Bind to `collection`. Nothing is copied until the first `next`.
    pub fn begin(collection: C, class_info: ClassInfo) -> Result<Self> {
        let batch_size = collection.realm().config().enumeration_batch_size;
        // Version first: a commit between the two reads fails the next batch
        // instead of enumerating a stale count.
        let version = collection.version()?;
        let count = collection.count()?;

        tracing::trace!(
            collection = collection.id().0,
            class = %class_info.name,
            count,
            "enumeration started"
        );

        Ok(Self {
            state: EnumeratorState::Attached(Attached {
                collection,
                class_info,
                version,
                count,
                position: 0,
                buffer: Vec::with_capacity(batch_size),
            }),
            batch_size,
        })
    }

    fn detached() -> Self {
        Self {
            state: EnumeratorState::Detached,
            batch_size: 0,
        }
    }

    /// Largest batch a single `next` call returns.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.state, EnumeratorState::Detached)
    }

    /// Element-type metadata, absent once detached.
    pub fn class_info(&self) -> Option<&ClassInfo> {
        match &self.state {
            EnumeratorState::Attached(attached) => Some(&attached.class_info),
            EnumeratorState::Detached => None,
        }
    }

    /// Number of elements handed out so far.
    pub fn position(&self) -> usize {
        match &self.state {
            EnumeratorState::Attached(attached) => attached.position,
            EnumeratorState::Detached => 0,
        }
    }

    /// Fetch the next batch of at most `requested` elements.
    ///
    /// An empty batch means the enumeration is complete; further calls keep
    /// returning empty batches.
    pub fn next(&mut self, requested: usize) -> Result<&[Arc<C::Element>]> {
        let attached = match &mut self.state {
            EnumeratorState::Attached(attached) => attached,
            EnumeratorState::Detached => {
                return Err(BridgeError::PreconditionViolation(
                    "enumeration continued after detach".into(),
                ))
            }
        };

        if requested == 0 {
            return Err(BridgeError::PreconditionViolation(
                "enumeration buffer must hold at least one element".into(),
            ));
        }

        attached.buffer.clear();
        if attached.position >= attached.count {
            attached.buffer = Vec::new();
            return Ok(&attached.buffer);
        }

        let found = attached.collection.version()?;
        if found != attached.version {
            return Err(BridgeError::MutatedDuringEnumeration {
                expected: attached.version,
                found,
            });
        }

        let end = attached.count.min(attached.position + requested.min(self.batch_size));
        for index in attached.position..end {
            let element = attached.collection.get(index)?;
            attached.buffer.push(Arc::new(element));
        }
        attached.position = end;

        tracing::trace!(
            collection = attached.collection.id().0,
            batch = attached.buffer.len(),
            position = attached.position,
            "enumeration batch filled"
        );

        Ok(&attached.buffer)
    }

    /// Release the collection and the buffered references. Idempotent.
    pub fn detach(&mut self) {
        if let EnumeratorState::Attached(attached) = &self.state {
            tracing::trace!(
                collection = attached.collection.id().0,
                position = attached.position,
                "enumerator detached"
            );
        }
        self.state = EnumeratorState::Detached;
    }

    /// Adapt into a standard iterator. Iteration stops after the first error.
    pub fn elements(self) -> Elements<C> {
        Elements {
            enumerator: self,
            pending: VecDeque::new(),
            done: false,
        }
    }
}

/// Iterator over a [`FastEnumerator`].
pub struct Elements<C: LiveCollection> {
    enumerator: FastEnumerator<C>,
    pending: VecDeque<Arc<C::Element>>,
    done: bool,
}

impl<C: LiveCollection> Iterator for Elements<C> {
    type Item = Result<Arc<C::Element>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(element) = self.pending.pop_front() {
            return Some(Ok(element));
        }
        if self.done {
            return None;
        }

        let batch_size = self.enumerator.batch_size();
        match self.enumerator.next(batch_size) {
            Ok(batch) if batch.is_empty() => {
                self.done = true;
                None
            }
            Ok(batch) => {
                self.pending.extend(batch.iter().cloned());
                self.pending.pop_front().map(Ok)
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Per-loop state for [`fast_enumerate`].
pub struct EnumerationState<C: LiveCollection> {
    enumerator: Option<FastEnumerator<C>>,
    items_returned: usize,
}

impl<C: LiveCollection> EnumerationState<C> {
    pub fn new() -> Self {
        Self {
            enumerator: None,
            items_returned: 0,
        }
    }

    /// Total elements written across all calls.
    pub fn items_returned(&self) -> usize {
        self.items_returned
    }

    /// Detach the underlying enumerator before mutating the collection.
    pub fn detach(&mut self) {
        match self.enumerator.as_mut() {
            Some(enumerator) => enumerator.detach(),
            None => self.enumerator = Some(FastEnumerator::detached()),
        }
    }
}

impl<C: LiveCollection> Default for EnumerationState<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch enumeration protocol: fill `buffer` with up to `len` elements of
/// `collection` and return how many were written; 0 means done.
///
/// The first call binds an enumerator into `state`; later calls continue
/// from it.
pub fn fast_enumerate<C: LiveCollection>(
    state: &mut EnumerationState<C>,
    buffer: &mut Vec<Arc<C::Element>>,
    len: usize,
    collection: &C,
) -> Result<usize> {
    buffer.clear();

    let enumerator = match state.enumerator.take() {
        Some(enumerator) => enumerator,
        None => collection.fast_enumerator()?,
    };
    let enumerator = state.enumerator.insert(enumerator);

    let batch = enumerator.next(len)?;
    buffer.extend(batch.iter().cloned());
    state.items_returned += batch.len();
    Ok(batch.len())
}
