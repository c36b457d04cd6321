use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

/// Slot states. `BUSY` covers the window between winning the slot and
/// finishing the write.
const EMPTY: u8 = 0;
const BUSY: u8 = 1;
const FULL: u8 = 2;

/// A write-once slot for values installed during bring-up.
///
/// The first [`set`](Self::set) wins and publishes its value; everyone else
/// reads that value for the rest of the slot's life. This covers the
/// "configure once at boot, reference forever" statics of this kernel (the
/// console logger) without `static mut` and without the machinery of a
/// full lazy-init cell.
///
/// The stored value is dropped with the slot.
pub struct OnceSlot<T> {
    state: AtomicU8,
    slot: UnsafeCell<MaybeUninit<T>>,
}

// Safety: the state word serializes the single writer; after publication
// the value is only handed out by shared reference.
unsafe impl<T: Send + Sync> Sync for OnceSlot<T> {}

impl<T> OnceSlot<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            slot: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// The published value, if there is one yet.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) != FULL {
            return None;
        }
        // Safety: FULL is stored only after the slot holds a value.
        Some(unsafe { (*self.slot.get()).assume_init_ref() })
    }

    /// Store `value` if the slot is still empty.
    ///
    /// The winner gets `Ok` with a reference to the value it stored. A
    /// loser has its `value` dropped and gets `Err` with the value that
    /// beat it, waiting out a winner that is still mid-publish.
    pub fn set(&self, value: T) -> Result<&T, &T> {
        let won = self
            .state
            .compare_exchange(EMPTY, BUSY, Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        if !won {
            drop(value);
            return Err(self.wait());
        }

        // Safety: the EMPTY -> BUSY transition makes this the only writer.
        unsafe { (*self.slot.get()).write(value) };
        self.state.store(FULL, Ordering::Release);
        // Safety: written and published just above.
        Ok(unsafe { (*self.slot.get()).assume_init_ref() })
    }

    /// Spin until the winning writer has published.
    fn wait(&self) -> &T {
        loop {
            if let Some(value) = self.get() {
                return value;
            }
            spin_loop();
        }
    }
}

impl<T> Drop for OnceSlot<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == FULL {
            // Safety: FULL means initialized, and `&mut self` is exclusive.
            unsafe { self.slot.get_mut().assume_init_drop() };
        }
    }
}
