//! # Bare-Metal Machine Access
//!
//! The real implementations of the hardware traits for the running kernel.
//! On the machine, a pointer *is* the address: [`DirectMapper`] casts and
//! dereferences, and `HardwareCpu` moves the control registers with inline
//! asm (behind the `asm` feature, x86 only). The hosted test harness never
//! touches these; it substitutes its own simulated machine.

use kernel_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{PhysMapper, VirtMapper};

/// Address-is-pointer access for the running kernel.
///
/// Physical access is honest while paging is off; afterwards it remains
/// valid exactly for the identity-mapped shared region, which is where the
/// directory construction writes and the frame-pool bitmaps live. Virtual
/// access is the plain pointer dereference the recursive windows want.
pub struct DirectMapper;

impl PhysMapper for DirectMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        // Safety: caller guarantees `pa` is linear-addressable (paging off,
        // or identity-mapped) and unaliased; see trait contract.
        unsafe { &mut *(pa.as_u32() as usize as *mut T) }
    }
}

impl VirtMapper for DirectMapper {
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        // Safety: caller guarantees `va` is mapped writable and unaliased.
        unsafe { &mut *(va.as_u32() as usize as *mut T) }
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
mod hardware_cpu {
    use kernel_addresses::VirtualAddress;
    use kernel_registers::{Cr0, Cr2, Cr3, LoadRegisterUnsafe, StoreRegisterUnsafe};
    use kernel_vmem::Cpu;

    /// The control registers of the CPU we are running on.
    pub struct HardwareCpu;

    impl Cpu for HardwareCpu {
        fn read_cr0(&self) -> Cr0 {
            // Safety: reading CR0 at CPL0 has no side effects.
            unsafe { Cr0::load_unsafe() }
        }

        unsafe fn write_cr0(&self, cr0: Cr0) {
            unsafe { cr0.store_unsafe() }
        }

        fn read_cr2(&self) -> VirtualAddress {
            // Safety: reading CR2 at CPL0 has no side effects.
            unsafe { Cr2::load_unsafe().fault_address() }
        }

        fn read_cr3(&self) -> Cr3 {
            // Safety: reading CR3 at CPL0 has no side effects.
            unsafe { Cr3::load_unsafe() }
        }

        unsafe fn write_cr3(&self, cr3: Cr3) {
            unsafe { cr3.store_unsafe() }
        }
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use hardware_cpu::HardwareCpu;
