//! Virtual-memory pool accounting and its cooperation with the fault path.

mod common;

use common::{registry_guard, store_word};
use kernel_addresses::VirtualAddress;
use kernel_alloc::{AddressSpace, FrameState, VmPool};

const POOL_BASE: u32 = 0x1000_0000;
const POOL_SIZE: u32 = 0x0010_0000; // 1 MiB

macro_rules! pool_setup {
    ($machine:ident, $kernel_pool:ident, $process_pool:ident, $paging:ident, $space:ident, $pool:ident) => {
        common::boot_machine!($machine, $kernel_pool, $process_pool, $paging);
        let $space = AddressSpace::new(&$paging).expect("address space");
        $space.load();
        $paging.enable_paging();
        let $pool = VmPool::new(
            VirtualAddress::new(POOL_BASE),
            POOL_SIZE,
            &$process_pool,
            &$space,
        );
        $space.register_pool(&$pool).expect("register");
    };
}

#[test]
fn allocate_release_legitimacy_cycle() {
    let _g = registry_guard();
    pool_setup!(machine, kernel_pool, process_pool, paging, space, pool);

    let v = pool.allocate(4096).expect("one page");
    assert_eq!(v, VirtualAddress::new(POOL_BASE));

    assert!(pool.is_legitimate(v));
    assert!(pool.is_legitimate(VirtualAddress::new(POOL_BASE + 0xFFF)));
    assert!(!pool.is_legitimate(VirtualAddress::new(POOL_BASE + 0x1000)));

    pool.release(v);
    assert!(!pool.is_legitimate(v));
}

#[test]
fn allocations_are_page_granular_and_first_fit() {
    let _g = registry_guard();
    pool_setup!(machine, kernel_pool, process_pool, paging, space, pool);

    // One byte still claims a whole page.
    let a = pool.allocate(1).unwrap();
    assert_eq!(a, VirtualAddress::new(POOL_BASE));
    assert!(pool.is_legitimate(a + 4095));
    assert!(!pool.is_legitimate(a + 4096));

    // 4097 bytes round up to two pages, placed right after.
    let b = pool.allocate(4097).unwrap();
    assert_eq!(b, VirtualAddress::new(POOL_BASE + 0x1000));
    assert!(pool.is_legitimate(b + 2 * 4096 - 1));

    // With the first page released, the address before `b` is illegitimate.
    pool.release(a);
    assert!(!pool.is_legitimate(VirtualAddress::new(b.as_u32() - 1)));

    // First fit walks the free list in order: the shrunk original extent
    // sits first and serves the request; the freed hole waits its turn.
    let c = pool.allocate(4096).unwrap();
    assert_eq!(c, VirtualAddress::new(POOL_BASE + 3 * 4096));
    let d = pool.allocate(4096).unwrap();
    assert_eq!(d, c + 4096);
}

#[test]
fn zero_and_oversized_requests_fail_cleanly() {
    let _g = registry_guard();
    pool_setup!(machine, kernel_pool, process_pool, paging, space, pool);

    assert_eq!(pool.allocate(0), None);
    assert_eq!(pool.allocate(POOL_SIZE + 1), None);

    // The pool is untouched: the whole range still allocates.
    assert!(pool.allocate(POOL_SIZE).is_some());
    assert_eq!(pool.allocate(1), None, "now it really is full");
}

#[test]
fn release_returns_resident_frames_and_unmaps() {
    let _g = registry_guard();
    pool_setup!(machine, kernel_pool, process_pool, paging, space, pool);

    let v = pool.allocate(3 * 4096).unwrap();

    // Touch all three pages so they gain backing.
    let mut frames = Vec::new();
    for i in 0..3u32 {
        let va = v + i * 4096;
        store_word(&machine, &paging, va, i).unwrap();
        frames.push(machine.translate(va).unwrap().frame());
    }
    for &f in &frames {
        assert_eq!(
            process_pool.with_lock(|p| p.frame_state(&machine, f)),
            FrameState::HeadOfSequence
        );
    }

    pool.release(v);

    // Translations are gone and every data frame is back in the pool.
    for i in 0..3u32 {
        assert!(machine.translate(v + i * 4096).is_err());
    }
    for &f in &frames {
        assert_eq!(process_pool.with_lock(|p| p.frame_state(&machine, f)), FrameState::Free);
    }
}

#[test]
fn release_of_untouched_region_is_pure_bookkeeping() {
    let _g = registry_guard();
    pool_setup!(machine, kernel_pool, process_pool, paging, space, pool);

    // Nothing was ever faulted in; release must not disturb the pool.
    let before: Vec<_> = (0..8u32)
        .map(|i| process_pool.with_lock(|p| p.frame_state(&machine, p.base_frame().offset(i))))
        .collect();

    let v = pool.allocate(16 * 4096).unwrap();
    pool.release(v);

    let after: Vec<_> = (0..8u32)
        .map(|i| process_pool.with_lock(|p| p.frame_state(&machine, p.base_frame().offset(i))))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn interior_pointers_are_not_release_targets() {
    let _g = registry_guard();
    pool_setup!(machine, kernel_pool, process_pool, paging, space, pool);

    let v = pool.allocate(2 * 4096).unwrap();
    store_word(&machine, &paging, v, 1).unwrap();

    // Only the exact base releases a region.
    pool.release(v + 4096);
    pool.release(VirtualAddress::new(POOL_BASE + POOL_SIZE));
    assert!(pool.is_legitimate(v));
    assert!(machine.translate(v).is_ok());
}

#[test]
fn released_regions_coalesce_back_to_one_extent() {
    let _g = registry_guard();
    pool_setup!(machine, kernel_pool, process_pool, paging, space, pool);

    let a = pool.allocate(4 * 4096).unwrap();
    let b = pool.allocate(4 * 4096).unwrap();
    let c = pool.allocate(4 * 4096).unwrap();

    // Release out of order; neighbors must merge with each other and with
    // the untouched tail.
    pool.release(a);
    pool.release(c);
    pool.release(b);

    // Only a fully coalesced free list can satisfy the whole pool at once.
    let all = pool.allocate(POOL_SIZE).expect("whole pool in one region");
    assert_eq!(all, VirtualAddress::new(POOL_BASE));
}

#[test]
fn same_size_reallocation_returns_the_same_address() {
    let _g = registry_guard();
    pool_setup!(machine, kernel_pool, process_pool, paging, space, pool);

    let v = pool.allocate(8192).unwrap();
    store_word(&machine, &paging, v, 0xAB).unwrap();

    pool.release(v);
    let again = pool.allocate(8192).unwrap();
    assert_eq!(again, v);

    // The pages were unmapped in between; the region faults in again on
    // first touch.
    assert!(machine.translate(again).is_err());
    store_word(&machine, &paging, again, 0xCD).unwrap();
    assert_eq!(machine.read_u32(again).unwrap(), 0xCD);
}
