use crate::jtag::{TapAccess, extract_bits, padded_shift};
use crate::mpsse::{FtdiMpsse, PinUse};
use crate::mpsse_cmd::MpsseCmdBuilder;
use crate::{FtdiError, Pin};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

const TCK_MASK: u8 = 1 << 0;
const TDI_MASK: u8 = 1 << 1;
#[allow(unused)]
const TDO_MASK: u8 = 1 << 2;
const TMS_MASK: u8 = 1 << 3;
// TCK(AD0) must be init with value 0.
// TDI(AD1) can only output on second edge.
// TDO(AD2) can only sample on first edge.
// according to AN108-2.2.
// https://ftdichip.com/Support/Documents/AppNotes/AN_108_Command_Processor_for_MPSSE_and_MCU_Host_Bus_Emulation_Modes.pdf
const TCK_INIT_VALUE: bool = false;
const IS_LSB: bool = true;

pub(crate) struct JtagCmdBuilder(MpsseCmdBuilder);
impl JtagCmdBuilder {
    fn new() -> Self {
        JtagCmdBuilder(MpsseCmdBuilder::new())
    }
    /// From any state: five TMS ones into Test-Logic-Reset, one zero to idle.
    fn jtag_any2idle(&mut self) -> &mut Self {
        self.clock_tms_out(true, 0b0001_1111, 6);
        self
    }
    fn jtag_idle_cycle(&mut self) -> &mut Self {
        self.clock_tms_out(true, 0, 7);
        self
    }
    fn jtag_idle2ir(&mut self) -> &mut Self {
        self.clock_tms_out(true, 0b0000_0011, 4);
        self
    }
    fn jtag_idle2dr(&mut self) -> &mut Self {
        self.clock_tms_out(true, 0b0000_0001, 3);
        self
    }
    fn jtag_exit2idle(&mut self) -> &mut Self {
        self.clock_tms_out(true, 0b0000_0001, 2);
        self
    }
    /// Shift `bits_count` bits into the selected register, ignoring TDO.
    /// The final bit rides on the Exit1 TMS transition.
    fn jtag_shift_write(&mut self, data: &[u8], bits_count: usize) -> &mut Self {
        assert!(bits_count != 0);
        let bytes_count = (bits_count - 1) >> 3;
        let remain_bits = (bits_count - 1) & 0b111;
        let last_bit = data[bytes_count] >> remain_bits & 1 == 1;
        self.shift_bytes_out(TCK_INIT_VALUE, IS_LSB, &data[0..bytes_count])
            .shift_bits_out(TCK_INIT_VALUE, IS_LSB, data[bytes_count], remain_bits)
            .clock_tms_out(last_bit, 0b0000_0001, 1);
        self
    }
    /// Shift `bits_count` bits through the selected register, capturing TDO.
    fn jtag_shift(&mut self, data: &[u8], bits_count: usize) -> &mut Self {
        assert!(bits_count != 0);
        let bytes_count = (bits_count - 1) >> 3;
        let remain_bits = (bits_count - 1) & 0b111;
        let last_bit = data[bytes_count] >> remain_bits & 1 == 1;
        self.shift_bytes(TCK_INIT_VALUE, IS_LSB, &data[0..bytes_count])
            .shift_bits(TCK_INIT_VALUE, IS_LSB, data[bytes_count], remain_bits)
            .clock_tms(last_bit, 0b0000_0001, 1);
        self
    }
    /// Realign the response of a single [`Self::jtag_shift`] into an
    /// LSB-first buffer of `bits_count` bits. Bit-mode reads arrive
    /// MSB-aligned and the Exit1 bit arrives in its own byte.
    fn jtag_parse_single_shift(response: &mut Vec<u8>, bits_count: usize) {
        assert!(bits_count != 0);
        let bytes_count = (bits_count - 1) >> 3;
        let remain_bits = (bits_count - 1) & 0b111;
        if remain_bits == 0 {
            response[bytes_count] >>= 7;
        } else {
            response[bytes_count] >>= 8 - remain_bits;
            response[bytes_count] |= (response[bytes_count + 1] & 0b1000_0000) >> (7 - remain_bits);
        }
        response.truncate(bytes_count + 1);
    }
}
impl Deref for JtagCmdBuilder {
    type Target = MpsseCmdBuilder;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl DerefMut for JtagCmdBuilder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
impl From<JtagCmdBuilder> for MpsseCmdBuilder {
    fn from(value: JtagCmdBuilder) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy)]
enum ShiftTarget {
    Ir,
    Dr,
}

/// JTAG (Joint Test Action Group) interface controller
/// Implements JTAG state machine management and data transfer operations
pub struct FtdiJtag {
    /// Thread-safe handle to FTDI MPSSE controller
    mtx: Arc<Mutex<FtdiMpsse>>,
    /// Tracks if the JTAG state machine is in Run-Test/Idle
    is_idle: bool,
    /// Instruction register length of each TAP, in scan order (0 nearest TDO)
    taps: Vec<usize>,
    /// Index of the TAP addressed by [`TapAccess`] operations
    active: usize,
}
impl Drop for FtdiJtag {
    fn drop(&mut self) {
        let mut lock = self.mtx.lock().unwrap();
        lock.free_pin(Pin::Lower(0));
        lock.free_pin(Pin::Lower(1));
        lock.free_pin(Pin::Lower(2));
        lock.free_pin(Pin::Lower(3));
    }
}
impl FtdiJtag {
    /// Creates a new JTAG interface instance
    ///
    /// # Arguments
    /// * `mtx` - Thread-safe handle to FTDI MPSSE controller
    ///
    /// # Returns
    /// Result containing FtdiJtag instance or FtdiError
    ///
    /// # Pin Allocation
    /// Default pin assignments on lower GPIO bank:
    /// - TCK: Lower(0) - Test Clock
    /// - TDI: Lower(1) - Test Data In
    /// - TDO: Lower(2) - Test Data Out
    /// - TMS: Lower(3) - Test Mode Select
    pub fn new(mtx: Arc<Mutex<FtdiMpsse>>) -> Result<Self, FtdiError> {
        {
            let mut lock = mtx.lock().unwrap();
            lock.alloc_pin(Pin::Lower(0), PinUse::Jtag)?; // TCK
            lock.alloc_pin(Pin::Lower(1), PinUse::Jtag)?; // TDI
            lock.alloc_pin(Pin::Lower(2), PinUse::Jtag)?; // TDO (input)
            lock.alloc_pin(Pin::Lower(3), PinUse::Jtag)?; // TMS
            lock.lower.direction |= TCK_MASK | TDI_MASK | TMS_MASK;
            let mut cmd = MpsseCmdBuilder::new();
            cmd.set_gpio_lower(lock.lower.value, lock.lower.direction);
            lock.exec(cmd)?;
        }
        Ok(Self {
            mtx,
            is_idle: false,
            taps: Vec::new(),
            active: 0,
        })
    }
    /// Reset every TAP controller on the chain and settle in
    /// Run-Test/Idle. Also re-selects each TAP's IDCODE (or BYPASS)
    /// register, so run [`Self::scan`] right after.
    pub fn test_reset(&mut self) -> Result<(), FtdiError> {
        let mut cmd = JtagCmdBuilder::new();
        cmd.jtag_any2idle();
        let lock = self.mtx.lock().unwrap();
        lock.exec(cmd)?;
        drop(lock);
        self.is_idle = true;
        Ok(())
    }
    /// Shift the IDCODEs out of every TAP on the chain.
    ///
    /// Must run after [`Self::test_reset`], while each TAP still selects
    /// its IDCODE register. `None` marks a TAP that only implements
    /// BYPASS. Results are in scan order: index 0 is the TAP nearest TDO.
    pub fn scan(&mut self) -> Result<Vec<Option<u32>>, FtdiError> {
        const ID_LEN: usize = 32;
        let mut cmd = JtagCmdBuilder::new();
        if !self.is_idle {
            cmd.jtag_any2idle();
        }
        cmd.jtag_idle2dr();
        let lock = self.mtx.lock().unwrap();
        lock.exec(cmd)?;

        let mut idcodes = Vec::new();
        let mut current_id = 0u32;
        let mut bit_count = 0;
        let mut consecutive_bypass = 0;
        'outer: loop {
            // Shift ones so the end of the chain reads back as all-ones.
            let mut cmd = MpsseCmdBuilder::new();
            cmd.shift_bytes(TCK_INIT_VALUE, IS_LSB, &[0xff; 4]);
            let response = lock.exec(cmd)?;
            let tdos = response
                .iter()
                .flat_map(|&byte| (0..8).map(move |i| (byte >> i) & 1 == 1));
            for tdo_val in tdos {
                if bit_count == 0 && !tdo_val {
                    // A TAP in bypass contributes a single zero bit.
                    idcodes.push(None);
                    consecutive_bypass += 1;
                } else {
                    // Accumulate IDCODE bits (LSB first)
                    current_id = (current_id >> 1) | if tdo_val { 0x8000_0000 } else { 0 };
                    bit_count += 1;
                    consecutive_bypass = 0;
                }
                if consecutive_bypass == ID_LEN {
                    break 'outer;
                }
                if bit_count == ID_LEN {
                    // All-ones is our own fill coming back: end of chain.
                    if current_id == u32::MAX {
                        break 'outer;
                    }
                    idcodes.push(Some(current_id));
                    bit_count = 0;
                }
            }
        }
        drop(lock);
        // Leave Shift-DR through Test-Logic-Reset.
        self.test_reset()?;
        Ok(idcodes)
    }
    /// Declare a TAP on the scan chain with its instruction register
    /// length, in scan order (TAP 0 nearest TDO).
    pub fn add_tap(&mut self, irlen: usize) {
        assert!(irlen >= 2, "IR length must be at least 2 bits");
        self.taps.push(irlen);
    }
    /// Select which TAP subsequent IR/DR operations address. Every other
    /// TAP is put into BYPASS on the next IR shift.
    pub fn select_tap(&mut self, index: usize) {
        assert!(index < self.taps.len());
        self.active = index;
    }
    /// Number of TAPs declared with [`Self::add_tap`].
    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    fn shift_register_out(
        &mut self,
        target: ShiftTarget,
        data: &[u8],
        bits: usize,
    ) -> Result<(), FtdiError> {
        let mut cmd = JtagCmdBuilder::new();
        if !self.is_idle {
            cmd.jtag_any2idle();
        }
        match target {
            ShiftTarget::Ir => cmd.jtag_idle2ir(),
            ShiftTarget::Dr => cmd.jtag_idle2dr(),
        };
        cmd.jtag_shift_write(data, bits)
            .jtag_exit2idle()
            .jtag_idle_cycle();
        let lock = self.mtx.lock().unwrap();
        lock.exec(cmd)?;
        drop(lock);
        self.is_idle = true;
        Ok(())
    }

    fn shift_register(
        &mut self,
        target: ShiftTarget,
        data: &[u8],
        bits: usize,
    ) -> Result<Vec<u8>, FtdiError> {
        let mut cmd = JtagCmdBuilder::new();
        if !self.is_idle {
            cmd.jtag_any2idle();
        }
        match target {
            ShiftTarget::Ir => cmd.jtag_idle2ir(),
            ShiftTarget::Dr => cmd.jtag_idle2dr(),
        };
        cmd.jtag_shift(data, bits).jtag_exit2idle().jtag_idle_cycle();
        let lock = self.mtx.lock().unwrap();
        let mut response = lock.exec(cmd)?;
        drop(lock);
        self.is_idle = true;
        JtagCmdBuilder::jtag_parse_single_shift(&mut response, bits);
        Ok(response)
    }
}

impl TapAccess for FtdiJtag {
    fn write_ir(&mut self, ir: &[u8], bits: usize) -> Result<(), FtdiError> {
        assert!(!self.taps.is_empty(), "no TAP declared on the chain");
        log::trace!("write IR {:02x?} bits={}", ir, bits);
        let pre: usize = self.taps[..self.active].iter().sum();
        let post: usize = self.taps[self.active + 1..].iter().sum();
        let (buf, total) = padded_shift(pre, ir, bits, post, true);
        self.shift_register_out(ShiftTarget::Ir, &buf, total)
    }

    fn read_dr(&mut self, bits: usize) -> Result<Vec<u8>, FtdiError> {
        assert!(!self.taps.is_empty(), "no TAP declared on the chain");
        let pre = self.active;
        let post = self.taps.len() - 1 - self.active;
        let total = pre + bits + post;
        let tdi = vec![0u8; total.div_ceil(8)];
        let response = self.shift_register(ShiftTarget::Dr, &tdi, total)?;
        let dr = extract_bits(&response, pre, bits);
        log::trace!("read DR {:02x?} bits={}", dr, bits);
        Ok(dr)
    }

    fn write_dr(&mut self, dr: &[u8], bits: usize) -> Result<(), FtdiError> {
        assert!(!self.taps.is_empty(), "no TAP declared on the chain");
        log::trace!("write DR {:02x?} bits={}", dr, bits);
        let pre = self.active;
        let post = self.taps.len() - 1 - self.active;
        let (buf, total) = padded_shift(pre, dr, bits, post, false);
        self.shift_register_out(ShiftTarget::Dr, &buf, total)
    }
}

#[cfg(test)]
mod test {
    use super::JtagCmdBuilder;
    use crate::mpsse_cmd::MpsseCmdBuilder;

    #[test]
    fn any2idle_tms_sequence() {
        let mut cmd = JtagCmdBuilder::new();
        cmd.jtag_any2idle();
        let (bytes, _) = MpsseCmdBuilder::from(cmd).destruct();
        // TMS shift, 6 clocks, 0b011111 with TDI held high, then SendImmediate.
        assert_eq!(bytes, vec![0x4b, 0x05, 0x9f, 0x87]);
    }

    #[test]
    fn four_bit_shift_write_splits_exit_bit() {
        let mut cmd = JtagCmdBuilder::new();
        cmd.jtag_shift_write(&[0xa5], 4);
        let (bytes, _) = MpsseCmdBuilder::from(cmd).destruct();
        // Three bits in bit mode, final bit (0) on the Exit1 TMS clock.
        assert_eq!(bytes, vec![0x1b, 0x02, 0xa5, 0x4b, 0x00, 0x01, 0x87]);
    }

    #[test]
    fn parse_single_shift_realigns_exit_bit() {
        // 4-bit read: 3 bits arrive MSB-aligned, the Exit1 bit in bit 7
        // of its own byte.
        let mut response = vec![0b1010_0000, 0b1000_0000];
        JtagCmdBuilder::jtag_parse_single_shift(&mut response, 4);
        assert_eq!(response, vec![0b1101]);
    }
}
