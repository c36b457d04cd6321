use bitfield_struct::bitfield;

/// Page-fault error code as pushed by the processor.
///
/// Each bit describes the condition that caused the fault. Reference:
/// Intel SDM Vol. 3A, "Page-Fault Exception (#PF)".
#[bitfield(u32)]
pub struct PageFaultCode {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read. 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor access. 1 = user-mode access.
    pub user: bool, // bit 2

    /// 1 = reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch.
    pub instruction_fetch: bool, // bit 4

    #[bits(27)]
    __: u32, // reserved / ignored bits
}

impl PageFaultCode {
    #[must_use]
    pub fn explain(&self) -> &'static str {
        if !self.present() {
            "non-present page (demand fault or wild access)"
        } else if self.instruction_fetch() {
            "instruction fetch through a protected page"
        } else if self.write() {
            "write access to a protected page"
        } else {
            "read access to a protected page"
        }
    }
}

/// What the exception stub hands to the fault handler: the error code the
/// processor pushed. The faulting address itself travels through CR2.
#[derive(Copy, Clone, Debug)]
pub struct FaultInfo {
    pub error_code: PageFaultCode,
}

impl FaultInfo {
    #[must_use]
    pub const fn new(error_code: PageFaultCode) -> Self {
        Self { error_code }
    }

    /// The code for an ordinary supervisor demand fault (non-present read).
    #[must_use]
    pub const fn demand_read() -> Self {
        Self::new(PageFaultCode::new())
    }

    /// The code for a supervisor write to a non-present page.
    #[must_use]
    pub const fn demand_write() -> Self {
        Self::new(PageFaultCode::new().with_write(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explain_distinguishes_demand_from_protection() {
        assert!(PageFaultCode::new().explain().contains("non-present"));
        let prot = PageFaultCode::new().with_present(true).with_write(true);
        assert!(prot.explain().contains("write"));
    }

    #[test]
    fn demand_write_sets_only_the_write_bit() {
        let f = FaultInfo::demand_write();
        assert_eq!(f.error_code.into_bits(), 0x2);
    }
}
