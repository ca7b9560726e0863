//! Bit-level layout of the ARC debug TAP registers.
//!
//! Register numbers, widths and status flags per the MEC1618/MEC1618i
//! data sheet (DS00002339A), section "JTAG Debug Port".

use super::AddressSpace;

// 4-bit instruction register values of the debug TAP.
pub(crate) const IR_STATUS: u8 = 0x8;
pub(crate) const IR_TXN_COMMAND: u8 = 0x9;
pub(crate) const IR_ADDRESS: u8 = 0xA;
pub(crate) const IR_DATA: u8 = 0xB;
pub(crate) const IR_IDCODE: u8 = 0xC;

pub(crate) const IDCODE_BITS: usize = 32;
pub(crate) const STATUS_BITS: usize = 4;
pub(crate) const ADDRESS_BITS: usize = 32;
pub(crate) const DATA_BITS: usize = 32;
pub(crate) const TXN_COMMAND_BITS: usize = 4;

/// The standard JTAG device identification register.
#[bitfield_struct::bitfield(u32, order = Lsb)]
pub struct Idcode {
    /// Always reads 1, distinguishing IDCODE from BYPASS.
    pub marker: bool,
    /// JEP106 manufacturer identity code.
    #[bits(11)]
    pub mfg_id: u16,
    #[bits(16)]
    pub part_id: u16,
    #[bits(4)]
    pub version: u8,
}

/// The 4-bit transaction status register.
///
/// Only `ready` and `failure` take part in the completion protocol.
#[bitfield_struct::bitfield(u8, order = Lsb)]
pub struct Status {
    /// ST: the core is stalled.
    pub stalled: bool,
    /// FL: the transaction failed.
    pub failure: bool,
    /// RD: the transaction completed.
    pub ready: bool,
    /// PC: program counter selected.
    pub pc_sel: bool,
    #[bits(4)]
    __: u8,
}

/// Transaction command opcodes, one per (operation, address space) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum TxnCommand {
    WriteMemory = 0x0,
    WriteCore = 0x1,
    WriteAux = 0x2,
    ReadMemory = 0x4,
    ReadCore = 0x5,
    ReadAux = 0x6,
}

impl TxnCommand {
    pub(crate) fn read(space: AddressSpace) -> Self {
        match space {
            AddressSpace::Memory => TxnCommand::ReadMemory,
            AddressSpace::Core => TxnCommand::ReadCore,
            AddressSpace::Aux => TxnCommand::ReadAux,
        }
    }

    pub(crate) fn write(space: AddressSpace) -> Self {
        match space {
            AddressSpace::Memory => TxnCommand::WriteMemory,
            AddressSpace::Core => TxnCommand::WriteCore,
            AddressSpace::Aux => TxnCommand::WriteAux,
        }
    }
}

/// Assemble an LSB-first DR buffer into a `u32`, zero-extending short
/// reads.
pub(crate) fn dr_to_u32(dr: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    let len = dr.len().min(4);
    bytes[..len].copy_from_slice(&dr[..len]);
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn idcode_round_trip() {
        let idcode = Idcode::new()
            .with_marker(true)
            .with_mfg_id(0x29)
            .with_part_id(0x1618)
            .with_version(1);
        assert_eq!(idcode.into_bits(), 0x1161_8053);
        let decoded = Idcode::from_bits(idcode.into_bits());
        assert!(decoded.marker());
        assert_eq!(decoded.mfg_id(), 0x29);
        assert_eq!(decoded.part_id(), 0x1618);
        assert_eq!(decoded.version(), 1);
    }

    #[test]
    fn status_flag_positions() {
        assert!(Status::from_bits(0b0010).failure());
        assert!(Status::from_bits(0b0100).ready());
        let idle = Status::from_bits(0b0000);
        assert!(!idle.ready() && !idle.failure());
        assert_eq!(Status::new().with_ready(true).into_bits(), 0b0100);
    }

    #[test]
    fn txn_command_covers_every_space() {
        use AddressSpace::*;
        assert_eq!(TxnCommand::read(Memory), TxnCommand::ReadMemory);
        assert_eq!(TxnCommand::read(Core), TxnCommand::ReadCore);
        assert_eq!(TxnCommand::read(Aux), TxnCommand::ReadAux);
        assert_eq!(TxnCommand::write(Memory), TxnCommand::WriteMemory);
        assert_eq!(TxnCommand::write(Core), TxnCommand::WriteCore);
        assert_eq!(TxnCommand::write(Aux), TxnCommand::WriteAux);
    }

    #[test]
    fn dr_to_u32_round_trip() {
        assert_eq!(dr_to_u32(&0xdead_beefu32.to_le_bytes()), 0xdead_beef);
        assert_eq!(dr_to_u32(&[0x04]), 4);
    }
}
