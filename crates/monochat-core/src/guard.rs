//! Exactly-once release of a native handle.
//!
//! A [`ResourceGuard`] pairs a [`NativeHandle`] with the engine call that
//! frees it. Two paths can trigger the release: an explicit call by the
//! owner and automatic reclamation when the guard is dropped. The state is
//! a single atomic word (`> 0` owned, `0` released) and the transition is a
//! `swap`, so whichever path gets there first performs the release and every
//! other call, concurrent or later, sees `0` and does nothing.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::handle::NativeHandle;

type ReleaseFn = Box<dyn Fn(NativeHandle) + Send + Sync>;

/// Release-once ownership of a single engine handle.
pub struct ResourceGuard {
    state: AtomicI64,
    release: ReleaseFn,
}

impl ResourceGuard {
    /// Take ownership of `handle`; `release` runs at most once.
    ///
    /// A non-positive handle owns nothing and starts out released.
    pub fn new<F>(handle: NativeHandle, release: F) -> Self
    where
        F: Fn(NativeHandle) + Send + Sync + 'static,
    {
        let initial = if handle.is_valid() { handle.raw() } else { 0 };
        Self {
            state: AtomicI64::new(initial),
            release: Box::new(release),
        }
    }

    /// The owned handle, or `None` once released.
    pub fn handle(&self) -> Option<NativeHandle> {
        match self.state.load(Ordering::Acquire) {
            0 => None,
            raw => Some(NativeHandle(raw)),
        }
    }

    pub fn is_released(&self) -> bool {
        self.state.load(Ordering::Acquire) == 0
    }

    /// Run the release callback if this is the first release.
    ///
    /// Returns `true` if this call performed the release.
    pub fn release(&self) -> bool {
        let prev = self.state.swap(0, Ordering::AcqRel);
        if prev == 0 {
            return false;
        }
        (self.release)(NativeHandle(prev));
        true
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("handle", &self.handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};

    fn counting(handle: i64) -> (ResourceGuard, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let guard = ResourceGuard::new(NativeHandle(handle), move |h| {
            assert_eq!(h, NativeHandle(handle));
            c.fetch_add(1, Ordering::SeqCst);
        });
        (guard, calls)
    }

    #[test]
    fn release_runs_once() {
        let (guard, calls) = counting(7);
        assert_eq!(guard.handle(), Some(NativeHandle(7)));
        assert!(guard.release());
        assert!(!guard.release());
        assert!(guard.is_released());
        assert_eq!(guard.handle(), None);
        drop(guard);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_unreleased_handle() {
        let (guard, calls) = counting(9);
        drop(guard);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_handle_never_releases() {
        let (guard, calls) = counting(-1);
        assert!(guard.is_released());
        assert!(!guard.release());
        drop(guard);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_release_single_winner() {
        let (guard, calls) = counting(11);
        let guard = Arc::new(guard);
        let barrier = Arc::new(Barrier::new(8));
        let winners: usize = (0..8)
            .map(|_| {
                let g = Arc::clone(&guard);
                let b = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    b.wait();
                    g.release() as usize
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
