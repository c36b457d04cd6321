#![allow(dead_code)]

//! Simulated machine for driving the memory core hosted.
//!
//! Physical memory is a run of owned, 4 KiB-aligned frames starting at
//! frame 0. The control registers are plain cells. Virtual access performs
//! a faithful two-level table walk against the simulated RAM, which is
//! exactly what makes the recursive windows behave here the way they do on
//! hardware: the walk resolves them through the directory's self-map.

use core::cell::{Cell, UnsafeCell};
use kernel_addresses::{PhysicalAddress, VirtualAddress};
use kernel_registers::{Cr0, Cr3};
use kernel_vmem::{Cpu, PhysMapper, VirtMapper};

#[repr(align(4096))]
struct Aligned4K(UnsafeCell<[u8; 4096]>);

/// A page-fault the simulated walk ran into: the address whose translation
/// is missing. The harness latches it into CR2 and calls the fault handler,
/// as the exception stub would.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SimFault {
    pub address: VirtualAddress,
}

pub struct SimMachine {
    frames: Vec<Aligned4K>,
    cr0: Cell<u32>,
    cr2: Cell<u32>,
    cr3: Cell<u32>,
}

impl SimMachine {
    /// A machine with `n_frames` frames of RAM at physical 0.
    pub fn new(n_frames: usize) -> Self {
        let mut frames = Vec::with_capacity(n_frames);
        for _ in 0..n_frames {
            frames.push(Aligned4K(UnsafeCell::new([0u8; 4096])));
        }
        Self {
            frames,
            cr0: Cell::new(0),
            cr2: Cell::new(0),
            cr3: Cell::new(0),
        }
    }

    fn byte_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let frame = (pa.as_u32() >> 12) as usize;
        let offset = (pa.as_u32() & 0xFFF) as usize;
        assert!(
            frame < self.frames.len(),
            "access beyond simulated RAM: {pa}"
        );
        // Safety: in-bounds pointer into the owned frame.
        unsafe { (self.frames[frame].0.get() as *mut u8).add(offset) }
    }

    /// Read physical RAM directly, bypassing translation (test inspection).
    pub fn read_u32_phys(&self, pa: PhysicalAddress) -> u32 {
        assert!(pa.as_u32() % 4 == 0);
        // Safety: aligned, in-bounds.
        unsafe { *(self.byte_ptr(pa) as *const u32) }
    }

    /// Walk the live tables like the MMU would. With paging off, linear is
    /// physical.
    pub fn translate(&self, va: VirtualAddress) -> Result<PhysicalAddress, SimFault> {
        if !self.read_cr0().pg_paging() {
            return Ok(PhysicalAddress::new(va.as_u32()));
        }

        let directory = Cr3::from_bits(self.cr3.get()).directory_base();
        let pde = self.read_u32_phys(directory + ((va.as_u32() >> 22) << 2));
        if pde & 0x1 == 0 {
            return Err(SimFault { address: va });
        }

        let table = PhysicalAddress::new(pde & 0xFFFF_F000);
        let pte = self.read_u32_phys(table + (((va.as_u32() >> 12) & 0x3FF) << 2));
        if pte & 0x1 == 0 {
            return Err(SimFault { address: va });
        }

        Ok(PhysicalAddress::new((pte & 0xFFFF_F000) | (va.as_u32() & 0xFFF)))
    }

    /// Read through the live translation, faulting like a load would.
    pub fn read_u32(&self, va: VirtualAddress) -> Result<u32, SimFault> {
        let pa = self.checked(va)?;
        Ok(self.read_u32_phys(pa))
    }

    /// Write through the live translation, faulting like a store would.
    pub fn write_u32(&self, va: VirtualAddress, value: u32) -> Result<(), SimFault> {
        let pa = self.checked(va)?;
        assert!(pa.as_u32() % 4 == 0);
        // Safety: aligned, in-bounds.
        unsafe { *(self.byte_ptr(pa) as *mut u32) = value };
        Ok(())
    }

    /// Translate, latching the faulting address into CR2 on a miss; the
    /// part the hardware does before vectoring to the handler.
    fn checked(&self, va: VirtualAddress) -> Result<PhysicalAddress, SimFault> {
        self.translate(va).inspect_err(|fault| {
            self.cr2.set(fault.address.as_u32());
        })
    }
}

impl PhysMapper for SimMachine {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        // Safety: bounds-checked pointer into owned RAM; the caller promises
        // `T` matches the bytes and drops the reference before conflicting
        // access.
        unsafe { &mut *(self.byte_ptr(pa) as *mut T) }
    }
}

impl VirtMapper for SimMachine {
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        let pa = self
            .translate(va)
            .expect("virt_to_mut: address is not mapped");
        // Safety: as for phys_to_mut.
        unsafe { self.phys_to_mut(pa) }
    }
}

impl Cpu for SimMachine {
    fn read_cr0(&self) -> Cr0 {
        Cr0::from_bits(self.cr0.get())
    }

    unsafe fn write_cr0(&self, cr0: Cr0) {
        self.cr0.set(cr0.into_bits());
    }

    fn read_cr2(&self) -> VirtualAddress {
        VirtualAddress::new(self.cr2.get())
    }

    fn read_cr3(&self) -> Cr3 {
        Cr3::from_bits(self.cr3.get())
    }

    unsafe fn write_cr3(&self, cr3: Cr3) {
        self.cr3.set(cr3.into_bits());
    }
}

/// The frame-pool registry is process-wide; tests that touch it serialize
/// here and rely on pool `Drop` to leave it empty.
pub fn registry_guard() -> std::sync::MutexGuard<'static, ()> {
    static GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());
    GUARD.lock().unwrap_or_else(|e| e.into_inner())
}

/// Store `value` at `va` the way an instruction would: on a translation
/// miss, latch CR2, vector to the fault handler, and retry once.
pub fn store_word(
    machine: &SimMachine,
    paging: &kernel_alloc::Paging<'_, SimMachine, SimMachine>,
    va: VirtualAddress,
    value: u32,
) -> Result<(), SimFault> {
    let va = VirtualAddress::new(va.as_u32() & !3);
    let mut fault = None;
    for _ in 0..2 {
        match machine.write_u32(va, value) {
            Ok(()) => return Ok(()),
            Err(f) => {
                fault = Some(f);
                paging.handle_fault(&kernel_vmem::FaultInfo::demand_write());
            }
        }
    }
    Err(fault.unwrap())
}

/// The boot-time construction sequence every paging test starts from:
/// simulated RAM, the two frame pools (process-pool bitmap hosted in the
/// kernel pool, as at boot), and the paging context.
macro_rules! boot_machine {
    ($machine:ident, $kernel_pool:ident, $process_pool:ident, $paging:ident) => {
        let $machine = $crate::common::SimMachine::new(2048);
        let $kernel_pool = kernel_sync::SpinLock::new(kernel_alloc::ContFramePool::new(
            &$machine,
            kernel_addresses::FrameNumber::new(512),
            128,
            None,
        ));
        let info_frames = kernel_alloc::ContFramePool::needed_info_frames(1024);
        let process_info = $kernel_pool
            .with_lock(|pool| pool.get_frames(&$machine, info_frames))
            .expect("info frames for the process pool");
        let $process_pool = kernel_sync::SpinLock::new(kernel_alloc::ContFramePool::new(
            &$machine,
            kernel_addresses::FrameNumber::new(1024),
            1024,
            Some(process_info),
        ));
        let $paging = kernel_alloc::Paging::init_paging(
            &$machine,
            &$machine,
            &$kernel_pool,
            &$process_pool,
            kernel_info::memory::SHARED_SIZE,
        );
    };
}

pub(crate) use boot_machine;
