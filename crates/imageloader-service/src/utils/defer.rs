/// Guard that runs a closure when dropped, unless it was disarmed before.
///
/// The closure must not panic, as it may run while unwinding.
pub struct CallOnDrop {
    f: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl CallOnDrop {
    /// Creates a new `CallOnDrop`.
    pub fn new<F: FnOnce() + Send + 'static>(f: F) -> Self {
        Self {
            f: Some(Box::new(f)),
        }
    }

    /// Consumes the guard without running the closure.
    pub fn disarm(mut self) {
        self.f = None;
    }
}

impl Drop for CallOnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f()
        }
    }
}

impl std::fmt::Debug for CallOnDrop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOnDrop")
            .field("armed", &self.f.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_runs_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            let _guard = CallOnDrop::new(move || {
                calls.fetch_add(1, Ordering::Relaxed);
            });
        }
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_disarmed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let guard = {
            let calls = Arc::clone(&calls);
            CallOnDrop::new(move || {
                calls.fetch_add(1, Ordering::Relaxed);
            })
        };
        guard.disarm();
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }
}
