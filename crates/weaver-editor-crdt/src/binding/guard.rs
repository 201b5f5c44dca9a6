//! Re-entrancy suppression for the two mutation paths.

use std::cell::Cell;

/// Runs at most one closure at a time. A nested attempt is dropped, not queued.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    active: Cell<bool>,
}

/// Clears the flag even if the closure unwinds.
struct Release<'a>(&'a Cell<bool>);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl ReentrancyGuard {
    pub fn run_exclusive<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if self.active.replace(true) {
            tracing::trace!("guard busy, dropping nested call");
            return None;
        }
        let _release = Release(&self.active);
        Some(f())
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_call_is_dropped() {
        let guard = ReentrancyGuard::default();
        let mut inner_ran = false;
        let outer = guard.run_exclusive(|| {
            assert!(guard.is_active());
            let inner = guard.run_exclusive(|| {
                inner_ran = true;
            });
            assert!(inner.is_none());
            7
        });
        assert_eq!(outer, Some(7));
        assert!(!inner_ran);
        assert!(!guard.is_active());
        assert_eq!(guard.run_exclusive(|| 1), Some(1));
    }
}
