use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Atomically published state.
///
/// Readers clone the current `Arc` and never observe a half-applied change.
/// Writers are serialized: each one works on a private draft of the latest
/// state and swaps it in only when the transform reports a change.
pub struct SnapshotCell<T> {
    current: RwLock<Arc<T>>,
    writer: Mutex<()>,
}

impl<T: Clone> SnapshotCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<T> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Run `transform` on a draft. `Ok(Some(_))` publishes the draft,
    /// `Ok(None)` and `Err(_)` discard it.
    pub fn commit_with<R, E>(
        &self,
        transform: impl FnOnce(&mut T) -> Result<Option<R>, E>,
    ) -> Result<Option<R>, E> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut draft = T::clone(&self.snapshot());
        let outcome = transform(&mut draft)?;
        if outcome.is_some() {
            *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(draft);
        }
        Ok(outcome)
    }

    /// Replace the published state wholesale.
    pub fn replace(&self, state: T) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
    }
}

impl<T: Clone + Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
