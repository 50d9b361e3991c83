//! EPROM programming.
//!
//! EPROM bytes are programmed one at a time: the device echoes a CRC of
//! what it received, the master applies a programming pulse and the device
//! returns the resulting byte. Consecutive bytes continue the same command
//! without a new header, the CRC then being seeded with the byte address
//! (its low byte for a CRC8).

use embedded_hal::delay::DelayNs;
use embedded_onewire::OneWire;
use log::{trace, warn};

use crate::bank::MemoryBank;
use crate::crc::{CrcCheck, CrcKind};
use crate::error::{MemoryError, MemoryResult};
use crate::session::BusSession;

pub(crate) fn program<O: OneWire, D: DelayNs>(
    bank: &MemoryBank<'_>,
    session: &mut BusSession<'_, O, D>,
    cmd: u8,
    crc: CrcKind,
    address: usize,
    data: &[u8],
) -> MemoryResult<(), O::BusError> {
    if !session.can_program() {
        return Err(MemoryError::Unsupported("EPROM programming pulse"));
    }
    let pl = bank.page_length();
    let verify = bank.write_verification();
    let mut written = 0;
    while written < data.len() {
        let logical = address + written;
        let page = bank.resolve_page(session, logical / pl)?;
        let physical = bank.config().page_address(page) + logical % pl;
        let n = (pl - logical % pl).min(data.len() - written);
        program_span(session, cmd, crc, physical, &data[written..written + n], verify)?;
        written += n;
    }
    Ok(())
}

fn program_span<O: OneWire, D: DelayNs>(
    session: &mut BusSession<'_, O, D>,
    cmd: u8,
    kind: CrcKind,
    address: usize,
    data: &[u8],
    verify: bool,
) -> MemoryResult<(), O::BusError> {
    let cl = kind.trailer_len();
    let mut chained = false;
    for (i, &byte) in data.iter().enumerate() {
        let target = (address + i) as u16;
        let valid = if chained {
            session.write_byte(byte)?;
            let mut crc = [0xff; 2];
            session.block(&mut crc[..cl])?;
            let mut check = CrcCheck::new(kind, target);
            check.update_slice(&[byte]);
            check.update_slice(&crc[..cl]);
            check.is_valid()
        } else {
            let mut raw = [cmd, 0, 0, byte, 0xff, 0xff];
            raw[1..3].copy_from_slice(&target.to_le_bytes());
            session.select()?;
            session.block(&mut raw[..4 + cl])?;
            CrcCheck::validate(kind, 0, &raw[..4 + cl])
        };
        if !valid {
            warn!("Invalid {kind:?} programming 0x{target:04x}");
            return Err(MemoryError::InvalidCrc);
        }
        session.program_pulse()?;
        let result = session.read_byte()?;
        trace!("Programmed 0x{target:04x}: 0x{byte:02x} -> 0x{result:02x}");
        if verify {
            if result != byte {
                warn!("Programming 0x{target:04x} left 0x{result:02x}, wanted 0x{byte:02x}");
                return Err(MemoryError::ReadBackMismatch);
            }
            chained = true;
        }
    }
    Ok(())
}
