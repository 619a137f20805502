use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};

/// Busy-wait exclusion flag.
///
/// Acquiring moves the counter from 0 to 1, releasing moves it back. The
/// counter never leaves `{0, 1}`. Interrupt handlers must only use
/// [`SpinFlag::try_acquire`] and skip their work when it fails; mainline code
/// may spin with [`SpinFlag::acquire`].
#[derive(Debug, Default)]
pub struct SpinFlag {
    access: AtomicU8,
}

impl SpinFlag {
    pub const fn new() -> Self {
        Self {
            access: AtomicU8::new(0),
        }
    }

    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.access
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn acquire(&self) {
        while !self.try_acquire() {
            std::hint::spin_loop();
        }
    }

    /// Release a flag taken with `acquire`/`try_acquire`. Releasing a free
    /// flag is a no-op.
    #[inline]
    pub fn release(&self) {
        let _ = self
            .access
            .compare_exchange(1, 0, Ordering::Release, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.access.load(Ordering::Acquire) != 0
    }

    /// Raw counter value, 0 or 1.
    #[inline]
    pub fn count(&self) -> u8 {
        self.access.load(Ordering::Acquire)
    }
}

/// Value guarded by a [`SpinFlag`].
pub struct SpinLock<T: ?Sized> {
    flag: SpinFlag,
    value: UnsafeCell<T>,
}

// Safe because the value is only reachable through a guard, and a guard only
// exists while the flag is held.
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            flag: SpinFlag::new(),
            value: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Take the lock without waiting. Returns `None` on contention.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        if self.flag.try_acquire() {
            Some(SpinGuard { lock: self })
        } else {
            None
        }
    }

    /// Spin until the lock is free. Never call this from interrupt context.
    pub fn lock(&self) -> SpinGuard<'_, T> {
        self.flag.acquire();
        SpinGuard { lock: self }
    }

    pub fn flag(&self) -> &SpinFlag {
        &self.flag
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct SpinGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

impl<T: ?Sized> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T: ?Sized> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.flag.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn try_acquire_fails_while_held() {
        let flag = SpinFlag::new();
        assert!(flag.try_acquire());
        assert_eq!(flag.count(), 1);
        assert!(!flag.try_acquire());
        assert_eq!(flag.count(), 1);
        flag.release();
        assert_eq!(flag.count(), 0);
        flag.release();
        assert_eq!(flag.count(), 0);
    }

    #[test]
    fn guard_releases_on_drop() {
        let lock = SpinLock::new(5u32);
        {
            let mut guard = lock.try_lock().unwrap();
            *guard += 1;
            assert!(lock.try_lock().is_none());
        }
        assert_eq!(*lock.lock(), 6);
        assert!(!lock.flag().is_held());
    }

    #[test]
    fn counter_stays_binary_under_contention() {
        let lock = Arc::new(SpinLock::new(0u64));
        let mut workers = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            workers.push(thread::spawn(move || {
                let mut skipped = 0u64;
                for _ in 0..10_000 {
                    match lock.try_lock() {
                        Some(mut guard) => {
                            assert_eq!(lock.flag().count(), 1);
                            *guard += 1;
                        }
                        None => skipped += 1,
                    }
                    assert!(lock.flag().count() <= 1);
                }
                skipped
            }));
        }
        let skipped: u64 = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(*lock.lock() + skipped, 40_000);
    }
}
