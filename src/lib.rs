//! Debug-access driver for ARC-family microcontroller cores over JTAG.
//!
//! The driver talks to the ARC debug unit through the JTAG TAP found on
//! parts such as the Microchip MEC1618, using an FTDI chip in MPSSE mode
//! as the probe. The crate is layered bottom-up:
//!
//! * [`mpsse`] opens an FTDI device and manages its pins and clock.
//! * [`jtag`] drives the JTAG state machine and exposes [`jtag::TapAccess`],
//!   the IR/DR shift primitives everything above is written against.
//! * [`arc`] implements the debug-unit transaction protocol: device
//!   identification plus raw reads and writes of the memory, core and
//!   aux address spaces.
//!
//! **Note:**
//! This is strictly a development tool. One probe is owned by one session;
//! the TAP is a shared stateful shift register and must never be driven
//! from two places at once.
//!
//! # Quickstart
//!
//! * Linux users only: Add [udev rules].
//!
//! # Limitations
//!
//! * Limited device support: FT232H, FT2232H, FT4232H.
//! * One TAP on the scan chain is selected per session; there is no
//!   multi-core synchronization.

#![forbid(unsafe_code)]

pub mod arc;
mod ftdaye;
pub mod jtag;
mod list;
pub use list::list_all_device;
pub mod mpsse;
mod mpsse_cmd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipType {
    Am,
    Bm,
    FT2232D,
    R,
    FT2232H,
    FT4232H,
    FT232H,
    FT230X,
}
impl ChipType {
    pub(crate) const fn interface_list(self) -> &'static [Interface] {
        match self {
            ChipType::FT232H => &[Interface::A],
            ChipType::FT2232H | ChipType::FT2232D => &[Interface::A, Interface::B],
            ChipType::FT4232H => &[Interface::A, Interface::B, Interface::C, Interface::D],
            _ => &[],
        }
    }
    pub(crate) const fn mpsse_list(self) -> &'static [Interface] {
        match self {
            ChipType::FT232H | ChipType::FT2232D => &[Interface::A],
            ChipType::FT2232H | ChipType::FT4232H => &[Interface::A, Interface::B],
            _ => &[],
        }
    }
    pub(crate) const fn upper_pins(self) -> usize {
        match self {
            ChipType::FT232H | ChipType::FT2232H => 8,
            ChipType::FT2232D => 4,
            ChipType::FT4232H => 0,
            _ => 0,
        }
    }
    pub(crate) const fn max_frequency(self) -> (usize, Option<bool>) {
        match self {
            ChipType::FT2232D => (6_000_000, None),
            ChipType::FT232H | ChipType::FT2232H | ChipType::FT4232H => (30_000_000, Some(false)),
            _ => (0, None),
        }
    }
}
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Interface {
    A = 1,
    B = 2,
    C = 3,
    D = 4,
}

impl Interface {
    pub(crate) const fn read_ep(self) -> u8 {
        match self {
            Interface::A => 0x81,
            Interface::B => 0x83,
            Interface::C => 0x85,
            Interface::D => 0x87,
        }
    }

    pub(crate) const fn write_ep(self) -> u8 {
        match self {
            Interface::A => 0x02,
            Interface::B => 0x04,
            Interface::C => 0x06,
            Interface::D => 0x08,
        }
    }

    pub(crate) const fn index(self) -> u16 {
        self as u16
    }

    pub(crate) const fn interface_number(self) -> u8 {
        (self as u8) - 1
    }
}
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Pin {
    Lower(usize),
    Upper(usize),
}
impl Pin {
    pub(crate) const fn mask(self) -> u8 {
        match self {
            Pin::Lower(idx) => 1 << idx,
            Pin::Upper(idx) => 1 << idx,
        }
    }
}
#[derive(Debug, thiserror::Error)]
pub enum FtdiError {
    #[error("A USB transport error occurred.")]
    Usb(#[from] std::io::Error),

    #[error("Open failed: {0}")]
    /// Error occurs when open.
    OpenFailed(String),

    #[error("Unsupported chip type: {0:?}")]
    /// The connected device is not supported by the driver.
    UnsupportedChip(ChipType),

    #[error("Bad Mpsse Command: {0:#x}")]
    BadMpsseCommand(u8),

    #[error("Pin fault: {0}")]
    PinFault(String),

    #[error("{0}")]
    Other(&'static str),
}
