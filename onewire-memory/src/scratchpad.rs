//! EEPROM scratchpad protocol.
//!
//! Data reaches EEPROM in three steps: it is written to the scratchpad,
//! read back (which also returns the authorization pattern TA1, TA2, E/S)
//! and finally copied to memory. The copy command is only accepted with the
//! exact target address and ending offset the device reported.

use bitfield_struct::bitfield;
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireCrc16};
use log::{debug, trace, warn};

use crate::bank::MemoryBank;
use crate::config::{MAX_PAGE_LENGTH, ScratchpadConfig, WriteProtocol};
use crate::error::{MemoryError, MemoryResult};
use crate::session::BusSession;

/// Room for a header, a password, a full row and CRC or poll bytes.
const BLOCK_LEN: usize = MAX_PAGE_LENGTH + 32;

/// Outcome of a copy scratchpad command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    /// The device confirmed the copy.
    Complete,
    /// The device rejected the password.
    BadPassword,
    /// Anything else.
    Failed,
}

/// Decodes the byte a device returns after a copy scratchpad command.
pub trait CopyConfirmation: Debug + Sync {
    /// Interpret the last byte read after the copy.
    fn decode(&self, status: u8) -> CopyStatus;
}

/// Completion pattern of most EEPROM devices: alternating ones and zeros,
/// so the high nibble reads `0xA` or `0x5`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NibbleConfirmation;

impl CopyConfirmation for NibbleConfirmation {
    fn decode(&self, status: u8) -> CopyStatus {
        match status & 0xf0 {
            0xa0 | 0x50 => CopyStatus::Complete,
            _ => CopyStatus::Failed,
        }
    }
}

/// Completion pattern of password protected devices. A device that
/// rejects the password does not drive the line, so the high nibble
/// reads `0xF`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordConfirmation;

impl CopyConfirmation for PasswordConfirmation {
    fn decode(&self, status: u8) -> CopyStatus {
        match status & 0xf0 {
            0xf0 => CopyStatus::BadPassword,
            other => NibbleConfirmation.decode(other),
        }
    }
}

/// Ending offset/data status byte (E/S) of scratchpads up to 32 bytes.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct EndingOffset {
    /// Offset of the last byte written into the scratchpad.
    #[bits(5)]
    pub offset: u8,
    /// Partial byte flag: the last write ended in the middle of a byte.
    pub partial: bool,
    #[bits(1)]
    __: u8,
    /// Authorization accepted, the copy has completed.
    pub authorized: bool,
}

/// E/S byte of 64 byte scratchpads, where the ending offset needs six bits
/// and pushes the partial flag up to bit 6.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct WideEndingOffset {
    /// Offset of the last byte written into the scratchpad.
    #[bits(6)]
    pub offset: u8,
    /// Partial byte flag.
    pub partial: bool,
    /// Authorization accepted.
    pub authorized: bool,
}

/// E/S byte decoded for a given scratchpad length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataStatus {
    /// Byte as sent by the device.
    pub raw: u8,
    /// Offset of the last byte written, within the scratchpad.
    pub ending: usize,
    /// The last write ended in the middle of a byte.
    pub partial: bool,
    /// Authorization accepted, the copy has completed.
    pub authorized: bool,
}

impl DataStatus {
    /// Decode `es` as sent by a scratchpad of `length` bytes.
    ///
    /// Bits above the ending offset that are not flags (such as an ending
    /// mask) are dropped.
    pub fn decode(es: u8, length: usize) -> Self {
        let (ending, partial, authorized) = if length > 32 {
            let es = WideEndingOffset::from_bits(es);
            (es.offset(), es.partial(), es.authorized())
        } else {
            let es = EndingOffset::from_bits(es);
            (es.offset(), es.partial(), es.authorized())
        };
        Self {
            raw: es,
            ending: ending as usize & (length - 1),
            partial,
            authorized,
        }
    }
}

/// Scratchpad contents as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchpadImage {
    /// Target address (TA1, TA2).
    pub address: u16,
    /// Ending offset/data status.
    pub status: DataStatus,
    /// Offset of `address` within the scratchpad row.
    pub offset: usize,
    /// Number of data bytes returned, from `offset` to the end of the row.
    pub len: usize,
}

/// Scratchpad operations of one bank.
#[derive(Debug, Clone, Copy)]
pub struct Scratchpad<'c> {
    config: &'c ScratchpadConfig,
}

impl<'c> Scratchpad<'c> {
    /// Scratchpad described by `config`.
    pub fn new(config: &'c ScratchpadConfig) -> Self {
        Self { config }
    }

    /// Scratchpad length in bytes.
    pub fn length(&self) -> usize {
        self.config.length
    }

    /// Write `data` to the scratchpad with target address `address`.
    ///
    /// The data must stay within the scratchpad row of `address`. When the
    /// device returns a CRC16 (only if the write runs to the end of the row),
    /// the CRC is checked over the command, the address and the data.
    pub fn write_scratchpad<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        address: u16,
        data: &[u8],
    ) -> MemoryResult<(), O::BusError> {
        let row = self.config.length;
        let offset = address as usize & (row - 1);
        if data.is_empty() || offset + data.len() > row {
            return Err(MemoryError::OutOfRange);
        }
        let mut raw = [0xff; BLOCK_LEN];
        raw[0] = self.config.write_cmd;
        raw[1..3].copy_from_slice(&address.to_le_bytes());
        raw[3..3 + data.len()].copy_from_slice(data);
        let crc = self.config.crc && offset + data.len() == row;
        let len = 3 + data.len() + if crc { 2 } else { 0 };
        trace!("Write scratchpad 0x{address:04x}, {} bytes", data.len());
        session.select()?;
        session.block(&mut raw[..len])?;
        if crc && !OneWireCrc16::validate(0, &raw[..len]) {
            warn!("Invalid CRC16 after write scratchpad at 0x{address:04x}");
            return Err(MemoryError::InvalidCrc);
        }
        Ok(())
    }

    /// Read the scratchpad into `buf`, which must hold a full row.
    ///
    /// The device starts at the offset of its target address, so `buf`
    /// receives [`ScratchpadImage::len`] bytes.
    pub fn read_scratchpad<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        buf: &mut [u8],
    ) -> MemoryResult<ScratchpadImage, O::BusError> {
        let row = self.config.length;
        if buf.len() < row {
            return Err(MemoryError::OutOfRange);
        }
        let mut raw = [0xff; BLOCK_LEN];
        raw[0] = self.config.read_cmd;
        session.select()?;
        session.block(&mut raw[..4])?;
        let address = u16::from_le_bytes([raw[1], raw[2]]);
        let status = DataStatus::decode(raw[3], row);
        let offset = address as usize & (row - 1);
        let len = row - offset;
        let end = 4 + len + if self.config.crc { 2 } else { 0 };
        session.block(&mut raw[4..end])?;
        if self.config.crc && !OneWireCrc16::validate(0, &raw[..end]) {
            warn!("Invalid CRC16 reading scratchpad");
            return Err(MemoryError::InvalidCrc);
        }
        buf[..len].copy_from_slice(&raw[4..4 + len]);
        trace!("Read scratchpad 0x{address:04x}, E/S 0x{:02x}", status.raw);
        Ok(ScratchpadImage {
            address,
            status,
            offset,
            len,
        })
    }

    /// Commit `len` scratchpad bytes starting at `address` to memory.
    ///
    /// With a strong pull-up configured and available, the pull-up is armed
    /// before the last authorization byte and held for the programming time.
    /// Otherwise the command is followed by poll bytes. Either way the last
    /// byte read is decoded by the bank's [`CopyConfirmation`].
    pub fn copy_scratchpad<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        address: u16,
        len: usize,
    ) -> MemoryResult<(), O::BusError> {
        let row = self.config.length;
        if len == 0 || (address as usize & (row - 1)) + len > row {
            return Err(MemoryError::OutOfRange);
        }
        let ending = ((address as usize + len - 1) & (row - 1)) as u8 | self.config.ending_mask;
        let mut raw = [0xff; BLOCK_LEN];
        raw[0] = self.config.copy_cmd;
        raw[1..3].copy_from_slice(&address.to_le_bytes());
        raw[3] = ending;
        let mut n = 4;
        if self.config.password {
            raw[4..12].copy_from_slice(&session.passwords().for_write());
            n = 12;
        }
        let completion = self.config.completion;
        let power = completion
            .strong_pullup_ms
            .filter(|_| session.can_deliver_power());
        debug!("Copy scratchpad 0x{address:04x} E/S 0x{ending:02x}, power {power:?}");
        session.select()?;
        let status = match power {
            Some(ms) => {
                session.block(&mut raw[..n - 1])?;
                session.power_after_next_byte()?;
                session.write_byte(raw[n - 1])?;
                session.delay_ms(ms);
                session.set_power_normal()?;
                let mut verify = [0xff; 4];
                let count = completion.verify_bytes.clamp(1, verify.len());
                session.block(&mut verify[..count])?;
                verify[count - 1]
            }
            None => {
                session.block(&mut raw[..n])?;
                if let Some(ms) = completion.strong_pullup_ms {
                    session.delay_ms(ms);
                }
                let mut poll = [0xff; 4];
                session.block(&mut poll)?;
                poll[3]
            }
        };
        match self.config.confirm.decode(status) {
            CopyStatus::Complete => Ok(()),
            CopyStatus::BadPassword => {
                warn!("Copy scratchpad 0x{address:04x}: password rejected");
                Err(MemoryError::BadPassword)
            }
            CopyStatus::Failed => {
                warn!("Copy scratchpad 0x{address:04x} not confirmed: 0x{status:02x}");
                Err(MemoryError::CopyNotConfirmed(status))
            }
        }
    }

    /// Clear the scratchpad, on devices that have an erase command.
    pub fn erase_scratchpad<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        address: u16,
    ) -> MemoryResult<(), O::BusError> {
        let cmd = self
            .config
            .erase_cmd
            .ok_or(MemoryError::Unsupported("erase scratchpad"))?;
        let mut raw = [cmd, 0, 0, 0xff];
        raw[1..3].copy_from_slice(&address.to_le_bytes());
        session.select()?;
        session.block(&mut raw)?;
        match NibbleConfirmation.decode(raw[3]) {
            CopyStatus::Complete => Ok(()),
            _ => Err(MemoryError::CopyNotConfirmed(raw[3])),
        }
    }
}

impl MemoryBank<'_> {
    /// Read bank bytes `[address, address + buf.len())` of a scratchpad bank.
    ///
    /// The device only returns the scratchpad from the offset of its target
    /// address on, so reads starting before that offset fail.
    pub(crate) fn read_staged<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        address: usize,
        buf: &mut [u8],
    ) -> MemoryResult<ScratchpadImage, O::BusError> {
        let WriteProtocol::Scratchpad(config) = self.config.write_protocol() else {
            return Err(MemoryError::Unsupported("scratchpad read"));
        };
        let mut image = [0xff; MAX_PAGE_LENGTH];
        let staged = Scratchpad::new(config).read_scratchpad(session, &mut image)?;
        let Some(start) = address.checked_sub(staged.offset) else {
            warn!(
                "{}: byte {address} lies before the target offset {}",
                self.description(),
                staged.offset
            );
            return Err(MemoryError::OutOfRange);
        };
        buf.copy_from_slice(&image[start..start + buf.len()]);
        Ok(staged)
    }

    /// Stage `data` in a scratchpad bank, targeting memory address `address`.
    pub(crate) fn write_staged<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        config: &ScratchpadConfig,
        address: usize,
        data: &[u8],
    ) -> MemoryResult<(), O::BusError> {
        let target = self.config.page_address(0) + address;
        self.stage(session, &Scratchpad::new(config), target as u16, data)
    }
}
