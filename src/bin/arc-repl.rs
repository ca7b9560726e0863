//! Interactive shell for poking at an ARC core over JTAG.
//!
//! Opens the first FTDI probe found, resets the scan chain, selects a
//! TAP (index from the first argument, default 0) and identifies the
//! device. Then reads commands from stdin:
//!
//! ```text
//! read <memory|core|aux> <address>
//! write <memory|core|aux> <address> <value>
//! quit
//! ```
//!
//! Addresses and values accept `0x` hex or decimal.
//!
//! Run with `RUST_LOG=debug` to see every transaction, `RUST_LOG=trace`
//! for the raw IR/DR shifts.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use arc_jtag::arc::{AddressSpace, ArcError, ArcInterface, IR_LENGTH};
use arc_jtag::jtag::FtdiJtag;
use arc_jtag::list_all_device;
use arc_jtag::mpsse::FtdiMpsse;

fn parse_space(word: &str) -> Option<AddressSpace> {
    match word {
        "memory" | "mem" => Some(AddressSpace::Memory),
        "core" => Some(AddressSpace::Core),
        "aux" => Some(AddressSpace::Aux),
        _ => None,
    }
}

fn parse_u32(word: &str) -> Option<u32> {
    if let Some(hex) = word.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else {
        word.parse().ok()
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let tap_index: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 0,
    };

    let devices = list_all_device();
    anyhow::ensure!(!devices.is_empty(), "Not found Ftdi devices");
    let mpsse = FtdiMpsse::open(&devices[0].usb_device, devices[0].interface[0])?;
    mpsse.set_frequency(1_000_000)?;

    let mut jtag = FtdiJtag::new(Arc::new(Mutex::new(mpsse)))?;
    jtag.test_reset()?;
    let idcodes = jtag.scan()?;
    println!("scan chain: {idcodes:08x?}");
    anyhow::ensure!(
        tap_index < idcodes.len(),
        "cannot select TAP #{tap_index} on a chain of {}",
        idcodes.len()
    );
    for _ in &idcodes {
        jtag.add_tap(IR_LENGTH);
    }
    jtag.select_tap(tap_index);

    let mut arc = ArcInterface::new(&mut jtag);
    let (idcode, device) = arc.identify()?;
    let Some(device) = device else {
        anyhow::bail!(
            "cannot operate on unknown device IDCODE={:08x}",
            idcode.into_bits()
        );
    };
    println!(
        "IDCODE={:08x} device={} rev={}",
        idcode.into_bits(),
        device.name,
        idcode.version()
    );

    let stdin = std::io::stdin();
    loop {
        print!("arc> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let words: Vec<_> = line.split_whitespace().collect();
        let result = match words.as_slice() {
            [] => continue,
            ["quit"] | ["exit"] => break,
            ["read", space, address] => {
                match (parse_space(space), parse_u32(address)) {
                    (Some(space), Some(address)) => {
                        arc.read(address, space).map(|value| {
                            println!("{value:08x}");
                        })
                    }
                    _ => {
                        eprintln!("usage: read <memory|core|aux> <address>");
                        continue;
                    }
                }
            }
            ["write", space, address, value] => {
                match (parse_space(space), parse_u32(address), parse_u32(value)) {
                    (Some(space), Some(address), Some(value)) => {
                        arc.write(address, value, space)
                    }
                    _ => {
                        eprintln!("usage: write <memory|core|aux> <address> <value>");
                        continue;
                    }
                }
            }
            _ => {
                eprintln!("commands: read, write, quit");
                continue;
            }
        };
        match result {
            Ok(()) => {}
            // A failed transaction leaves the session usable; a
            // transport error does not.
            Err(ArcError::TransactionFailed) => eprintln!("transaction failed"),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
