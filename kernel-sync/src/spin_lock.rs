use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// Mutual exclusion by busy-waiting.
///
/// Uncontended acquisition costs one compare-exchange; a contended waiter
/// spins on plain loads and only retries the exchange once the lock looks
/// free again. That suits the critical sections of this kernel (bitmap
/// edits, region-table updates), which are a handful of memory writes with
/// nowhere to sleep anyway.
pub struct SpinLock<T> {
    /// `true` while some guard is alive.
    state: AtomicBool,
    value: UnsafeCell<T>,
}

// Safety: the guard serializes all access to the value, so sharing the lock
// across threads only ever moves `T` between them.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            state: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Take the lock only if nobody holds it right now.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.state
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinLockGuard {
                state: &self.state,
                // Safety: the exchange above made this the sole holder.
                value: unsafe { &mut *self.value.get() },
            })
    }

    /// Take the lock, waiting out any current holder.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            // Wait on cheap loads; retry the exchange only once the lock
            // looks free.
            while self.state.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    /// Run `f` with the lock held.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    /// Direct access through `&mut self`; exclusivity already rules out any
    /// other holder.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

/// Exclusive view of the locked value. Unlocks on drop.
pub struct SpinLockGuard<'a, T> {
    state: &'a AtomicBool,
    value: &'a mut T,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &*self.value
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.value
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // The Release store pairs with the Acquire exchange of the next
        // holder.
        self.state.store(false, Ordering::Release);
    }
}
