//! ARC debug-unit access over a JTAG TAP.
//!
//! The debug unit exposes three address spaces (memory, core registers,
//! auxiliary registers) behind a handful of TAP registers. A transaction
//! is: load ADDRESS (and DATA for a write), load an opcode into
//! TXN_COMMAND, then poll STATUS until the unit reports ready or failed;
//! a read finishes by shifting the result out of DATA.
//!
//! The interface borrows its transport for the duration of one call and
//! issues every shift strictly in order. If a call fails partway, the
//! transaction is abandoned where it stands; reset the TAP before
//! reusing the port.

mod database;
mod registers;

pub use database::{ArcDevice, DeviceCatalog};
pub use registers::{Idcode, Status};

use crate::FtdiError;
use crate::jtag::TapAccess;
use registers::{
    ADDRESS_BITS, DATA_BITS, IDCODE_BITS, IR_ADDRESS, IR_DATA, IR_IDCODE, IR_STATUS,
    IR_TXN_COMMAND, STATUS_BITS, TXN_COMMAND_BITS, TxnCommand, dr_to_u32,
};
use std::num::NonZeroU32;

/// Instruction register length of the ARC debug TAP.
pub const IR_LENGTH: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ArcError {
    #[error("Jtag inner error")]
    Jtag(#[from] FtdiError),
    #[error("transaction failed")]
    TransactionFailed,
    #[error("transaction still pending after {0} status polls")]
    PollLimit(u32),
}

/// The address spaces of the ARC debug unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    Memory,
    Core,
    Aux,
}

/// Debug-unit driver for one ARC TAP.
///
/// `T` is anything implementing [`TapAccess`], including `&mut` of one,
/// so a transport can be lent out per session. The TAP is a stateful
/// shift register: never interleave two users on one transport.
pub struct ArcInterface<T: TapAccess> {
    tap: T,
    catalog: DeviceCatalog,
    max_status_polls: Option<NonZeroU32>,
}

impl<T: TapAccess> ArcInterface<T> {
    pub fn new(tap: T) -> Self {
        Self {
            tap,
            catalog: DeviceCatalog::builtin(),
            max_status_polls: None,
        }
    }

    /// Replace the built-in device table.
    pub fn set_catalog(&mut self, catalog: DeviceCatalog) {
        self.catalog = catalog;
    }

    /// Bound the completion poll loop.
    ///
    /// The debug unit gives no completion-time guarantee and the
    /// default is to poll forever, matching the hardware documentation.
    /// A limit turns a wedged target into [`ArcError::PollLimit`]
    /// instead of a hang.
    pub fn set_max_status_polls(&mut self, limit: Option<NonZeroU32>) {
        self.max_status_polls = limit;
    }

    /// Read the TAP's IDCODE and look the part up in the device catalog.
    ///
    /// An unknown part is not an error: the IDCODE is returned either
    /// way and the caller decides whether `None` is fatal.
    pub fn identify(&mut self) -> Result<(Idcode, Option<&'static ArcDevice>), ArcError> {
        self.tap.write_ir(&[IR_IDCODE], IR_LENGTH)?;
        let dr = self.tap.read_dr(IDCODE_BITS)?;
        let idcode = Idcode::from_bits(dr_to_u32(&dr));
        log::debug!(
            "read IDCODE mfg_id={:03x} part_id={:04x}",
            idcode.mfg_id(),
            idcode.part_id()
        );
        let device = self.catalog.lookup(idcode.mfg_id(), idcode.part_id());
        Ok((idcode, device))
    }

    /// Read one 32-bit value from `address` in `space`.
    pub fn read(&mut self, address: u32, space: AddressSpace) -> Result<u32, ArcError> {
        let command = TxnCommand::read(space);
        log::debug!("read space={:?} address={:08x}", space, address);
        self.tap.write_ir(&[IR_ADDRESS], IR_LENGTH)?;
        self.tap.write_dr(&address.to_le_bytes(), ADDRESS_BITS)?;
        self.tap.write_ir(&[IR_TXN_COMMAND], IR_LENGTH)?;
        self.tap.write_dr(&[command as u8], TXN_COMMAND_BITS)?;
        self.wait_txn()?;
        self.tap.write_ir(&[IR_DATA], IR_LENGTH)?;
        let dr = self.tap.read_dr(DATA_BITS)?;
        let data = dr_to_u32(&dr);
        log::debug!("read data={:08x}", data);
        Ok(data)
    }

    /// Write one 32-bit value to `address` in `space`.
    pub fn write(&mut self, address: u32, data: u32, space: AddressSpace) -> Result<(), ArcError> {
        let command = TxnCommand::write(space);
        log::debug!(
            "write space={:?} address={:08x} data={:08x}",
            space,
            address,
            data
        );
        self.tap.write_ir(&[IR_ADDRESS], IR_LENGTH)?;
        self.tap.write_dr(&address.to_le_bytes(), ADDRESS_BITS)?;
        self.tap.write_ir(&[IR_DATA], IR_LENGTH)?;
        self.tap.write_dr(&data.to_le_bytes(), DATA_BITS)?;
        self.tap.write_ir(&[IR_TXN_COMMAND], IR_LENGTH)?;
        self.tap.write_dr(&[command as u8], TXN_COMMAND_BITS)?;
        self.wait_txn()
    }

    /// Poll STATUS until the in-flight transaction completes.
    ///
    /// The IR is selected once; each poll re-shifts the 4-bit DR only.
    /// `failure` aborts immediately, on any poll.
    fn wait_txn(&mut self) -> Result<(), ArcError> {
        self.tap.write_ir(&[IR_STATUS], IR_LENGTH)?;
        let mut polls = 0u32;
        loop {
            let dr = self.tap.read_dr(STATUS_BITS)?;
            let status = Status::from_bits(dr[0]);
            log::trace!("status {:?}", status);
            if status.failure() {
                return Err(ArcError::TransactionFailed);
            }
            if status.ready() {
                return Ok(());
            }
            polls += 1;
            if let Some(limit) = self.max_status_polls {
                if polls >= limit.get() {
                    return Err(ArcError::PollLimit(polls));
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TapOp {
        WriteIr(u8),
        WriteDr(Vec<u8>, usize),
        ReadDr(usize),
    }

    /// Records every IR/DR operation and answers DR reads from a script.
    struct ScriptedTap {
        ops: Vec<TapOp>,
        dr_reads: VecDeque<Vec<u8>>,
    }

    impl ScriptedTap {
        fn new(dr_reads: impl IntoIterator<Item = Vec<u8>>) -> Self {
            Self {
                ops: Vec::new(),
                dr_reads: dr_reads.into_iter().collect(),
            }
        }
    }

    impl TapAccess for ScriptedTap {
        fn write_ir(&mut self, ir: &[u8], bits: usize) -> Result<(), FtdiError> {
            assert_eq!(bits, IR_LENGTH);
            self.ops.push(TapOp::WriteIr(ir[0]));
            Ok(())
        }
        fn read_dr(&mut self, bits: usize) -> Result<Vec<u8>, FtdiError> {
            self.ops.push(TapOp::ReadDr(bits));
            self.dr_reads
                .pop_front()
                .ok_or(FtdiError::Other("scripted responses exhausted"))
        }
        fn write_dr(&mut self, dr: &[u8], bits: usize) -> Result<(), FtdiError> {
            self.ops.push(TapOp::WriteDr(dr.to_vec(), bits));
            Ok(())
        }
    }

    fn ready() -> Vec<u8> {
        vec![Status::new().with_ready(true).into_bits()]
    }

    fn idle() -> Vec<u8> {
        vec![0]
    }

    fn failed() -> Vec<u8> {
        vec![Status::new().with_failure(true).into_bits()]
    }

    #[test]
    fn identify_decodes_known_device() {
        let raw = 0x1161_8053u32; // mfg 0x029, part 0x1618, version 1
        let mut tap = ScriptedTap::new([raw.to_le_bytes().to_vec()]);
        let mut arc = ArcInterface::new(&mut tap);
        let (idcode, device) = arc.identify().unwrap();
        assert_eq!(idcode.mfg_id(), 0x029);
        assert_eq!(idcode.part_id(), 0x1618);
        assert_eq!(idcode.version(), 1);
        assert_eq!(device.unwrap().name, "MEC1618/MEC1618i");
        assert_eq!(
            tap.ops,
            vec![TapOp::WriteIr(0xC), TapOp::ReadDr(32)],
        );
    }

    #[test]
    fn identify_unknown_device_is_not_an_error() {
        let raw = 0x1fff_f053u32; // mfg 0x029, part 0xffff
        let mut tap = ScriptedTap::new([raw.to_le_bytes().to_vec()]);
        let mut arc = ArcInterface::new(&mut tap);
        let (idcode, device) = arc.identify().unwrap();
        assert_eq!(idcode.part_id(), 0xffff);
        assert!(device.is_none());
    }

    #[test]
    fn identify_with_injected_catalog() {
        static TEST_DEVICES: &[ArcDevice] = &[ArcDevice {
            name: "testpart",
            mfg_id: 0x123,
            part_id: 0x0001,
            revisions: 0..=0,
        }];
        let raw = Idcode::new()
            .with_marker(true)
            .with_mfg_id(0x123)
            .with_part_id(0x0001)
            .into_bits();
        let mut tap = ScriptedTap::new([raw.to_le_bytes().to_vec()]);
        let mut arc = ArcInterface::new(&mut tap);
        arc.set_catalog(DeviceCatalog::new(TEST_DEVICES));
        let (_, device) = arc.identify().unwrap();
        assert_eq!(device.unwrap().name, "testpart");
    }

    #[test]
    fn read_memory_sequence_and_value() {
        let mut tap = ScriptedTap::new([ready(), 0xdead_beefu32.to_le_bytes().to_vec()]);
        let mut arc = ArcInterface::new(&mut tap);
        let value = arc.read(0x2000_0100, AddressSpace::Memory).unwrap();
        assert_eq!(value, 0xdead_beef);
        assert_eq!(
            tap.ops,
            vec![
                TapOp::WriteIr(0xA),
                TapOp::WriteDr(0x2000_0100u32.to_le_bytes().to_vec(), 32),
                TapOp::WriteIr(0x9),
                TapOp::WriteDr(vec![0x4], 4), // read-memory opcode
                TapOp::WriteIr(0x8),
                TapOp::ReadDr(4),
                TapOp::WriteIr(0xB),
                TapOp::ReadDr(32),
            ],
        );
    }

    #[test]
    fn write_core_sequence() {
        let mut tap = ScriptedTap::new([ready()]);
        let mut arc = ArcInterface::new(&mut tap);
        arc.write(0x20, 0x1234_5678, AddressSpace::Core).unwrap();
        assert_eq!(
            tap.ops,
            vec![
                TapOp::WriteIr(0xA),
                TapOp::WriteDr(0x20u32.to_le_bytes().to_vec(), 32),
                TapOp::WriteIr(0xB),
                TapOp::WriteDr(0x1234_5678u32.to_le_bytes().to_vec(), 32),
                TapOp::WriteIr(0x9),
                TapOp::WriteDr(vec![0x1], 4), // write-core opcode
                TapOp::WriteIr(0x8),
                TapOp::ReadDr(4),
            ],
        );
    }

    #[test]
    fn aux_space_opcodes() {
        let mut tap = ScriptedTap::new([ready(), 0u32.to_le_bytes().to_vec(), ready()]);
        let mut arc = ArcInterface::new(&mut tap);
        arc.read(0, AddressSpace::Aux).unwrap();
        arc.write(0, 0, AddressSpace::Aux).unwrap();
        let opcodes: Vec<_> = tap
            .ops
            .iter()
            .filter_map(|op| match op {
                TapOp::WriteDr(dr, 4) => Some(dr[0]),
                _ => None,
            })
            .collect();
        assert_eq!(opcodes, vec![0x6, 0x2]);
    }

    #[test]
    fn failure_flag_aborts_read() {
        let mut tap = ScriptedTap::new([failed()]);
        let mut arc = ArcInterface::new(&mut tap);
        let err = arc.read(0, AddressSpace::Memory).unwrap_err();
        assert!(matches!(err, ArcError::TransactionFailed));
        // Nothing after the status poll: no DATA phase.
        assert_eq!(
            tap.ops[4..],
            [TapOp::WriteIr(0x8), TapOp::ReadDr(4)],
        );
    }

    #[test]
    fn failure_flag_aborts_write() {
        let mut tap = ScriptedTap::new([failed()]);
        let mut arc = ArcInterface::new(&mut tap);
        let err = arc.write(0, 0, AddressSpace::Memory).unwrap_err();
        assert!(matches!(err, ArcError::TransactionFailed));
        assert_eq!(
            tap.ops[6..],
            [TapOp::WriteIr(0x8), TapOp::ReadDr(4)],
        );
    }

    #[test]
    fn polling_tolerates_slow_completion() {
        // Three not-ready polls, then ready; the IR is selected once.
        let mut tap = ScriptedTap::new([
            idle(),
            idle(),
            idle(),
            ready(),
            0xa5a5_a5a5u32.to_le_bytes().to_vec(),
        ]);
        let mut arc = ArcInterface::new(&mut tap);
        let value = arc.read(0x10, AddressSpace::Memory).unwrap();
        assert_eq!(value, 0xa5a5_a5a5);
        let status_ops: Vec<_> = tap
            .ops
            .iter()
            .filter(|op| matches!(op, TapOp::ReadDr(4)))
            .collect();
        assert_eq!(status_ops.len(), 4);
        let ir_selects: Vec<_> = tap
            .ops
            .iter()
            .filter(|op| matches!(op, TapOp::WriteIr(0x8)))
            .collect();
        assert_eq!(ir_selects.len(), 1);
    }

    #[test]
    fn poll_limit_is_enforced_when_configured() {
        let mut tap = ScriptedTap::new([idle(), idle()]);
        let mut arc = ArcInterface::new(&mut tap);
        arc.set_max_status_polls(NonZeroU32::new(2));
        let err = arc.write(0, 0, AddressSpace::Aux).unwrap_err();
        assert!(matches!(err, ArcError::PollLimit(2)));
    }

    #[test]
    fn transport_errors_pass_through() {
        // Script runs dry: the transport error surfaces unwrapped.
        let mut tap = ScriptedTap::new([]);
        let mut arc = ArcInterface::new(&mut tap);
        let err = arc.identify().unwrap_err();
        assert!(matches!(err, ArcError::Jtag(FtdiError::Other(_))));
    }
}
