use kernel_sync::OnceSlot;

#[test]
fn empty_slot_has_nothing_to_read() {
    let slot: OnceSlot<u32> = OnceSlot::new();
    assert!(slot.get().is_none());
}

#[test]
fn first_set_wins_and_later_sets_see_the_winner() {
    let slot = OnceSlot::new();

    assert_eq!(slot.set(5), Ok(&5));
    assert_eq!(slot.get(), Some(&5));

    // The loser's value is discarded; the resident one comes back.
    assert_eq!(slot.set(6), Err(&5));
    assert_eq!(slot.get(), Some(&5));
}

#[test]
fn usable_as_a_static() {
    static SLOT: OnceSlot<&str> = OnceSlot::new();

    let _ = SLOT.set("boot");
    assert_eq!(SLOT.get(), Some(&"boot"));
}

#[test]
fn racing_setters_agree_on_a_single_value() {
    use std::sync::Arc;
    use std::thread;

    let slot = Arc::new(OnceSlot::new());

    let handles: Vec<_> = (0..8u32)
        .map(|id| {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.set(id).is_ok())
        })
        .collect();
    let wins = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|&won| won)
        .count();

    assert_eq!(wins, 1, "exactly one setter may win");
    assert!(slot.get().copied().unwrap() < 8);
}

#[test]
fn stored_value_is_dropped_with_the_slot() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DROPS: AtomicUsize = AtomicUsize::new(0);
    struct Tattler;
    impl Drop for Tattler {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    let slot = OnceSlot::new();
    let _ = slot.set(Tattler);
    assert_eq!(DROPS.load(Ordering::SeqCst), 0);

    drop(slot);
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);
}
