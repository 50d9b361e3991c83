//! Register style banks.
//!
//! Application registers are read and written in place with a one byte
//! address and locked by copying them to EPROM. Shadowed EEPROM blocks are
//! recalled into RAM before a read and written as a whole block, which is
//! then copied back.

use embedded_hal::delay::DelayNs;
use embedded_onewire::OneWire;
use log::{debug, trace, warn};

use crate::bank::MemoryBank;
use crate::config::{LockCommand, MAX_PAGE_LENGTH, ReadProtocol, WriteProtocol};
use crate::error::{MemoryError, MemoryResult};
use crate::session::{BusSession, Chain};

/// Strong pull-up time of a copy and lock.
const COPY_LOCK_MS: u32 = 10;

impl MemoryBank<'_> {
    /// `[cmd, addr]` followed by the data.
    pub(crate) fn read_register<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        cmd: u8,
        physical: usize,
        buf: &mut [u8],
        chain: Chain,
    ) -> MemoryResult<(), O::BusError> {
        if !session.resume(cmd, physical, chain)? {
            session.select()?;
            session.block(&mut [cmd, physical as u8])?;
        }
        buf.fill(0xff);
        session.block(buf)?;
        session.park(cmd, physical + buf.len());
        Ok(())
    }

    /// Recall the block holding `page` into the shadow RAM and read from it.
    pub(crate) fn read_recalled<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        recall: u8,
        read: u8,
        page: usize,
        physical: usize,
        buf: &mut [u8],
    ) -> MemoryResult<(), O::BusError> {
        let block = self.config.page_address(page) as u8;
        session.select()?;
        session.block(&mut [recall, block])?;
        trace!("Recalled block 0x{block:02x} ({})", self.description());
        self.read_register(session, read, physical, buf, Chain::Fresh)
    }

    /// Write `data` in place and read it back when verifying.
    pub(crate) fn write_register<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        cmd: u8,
        address: usize,
        data: &[u8],
    ) -> MemoryResult<(), O::BusError> {
        if self.needs_power_delivery() && !session.can_deliver_power() {
            return Err(MemoryError::Unsupported("register write without strong pull-up"));
        }
        let physical = self.config.page_address(0) + address;
        let mut raw = [0; MAX_PAGE_LENGTH];
        let raw = &mut raw[..data.len()];
        raw.copy_from_slice(data);
        session.select()?;
        session.block(&mut [cmd, physical as u8])?;
        session.block(raw)?;
        if self.write_verification() {
            let mut echo = [0; MAX_PAGE_LENGTH];
            let echo = &mut echo[..data.len()];
            self.read_span(session, address, echo, Chain::Fresh, false)?;
            if echo != data {
                warn!(
                    "{}: read back of 0x{physical:02x} differs, the register may be locked",
                    self.description()
                );
                return Err(MemoryError::ReadBackMismatch);
            }
        }
        Ok(())
    }

    /// Merge `data` into the blocks it touches, then write, check and copy
    /// each of those blocks.
    pub(crate) fn write_blocks<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        write: u8,
        copy: u8,
        copy_ms: u32,
        address: usize,
        data: &[u8],
    ) -> MemoryResult<(), O::BusError> {
        let ReadProtocol::Recall { read, .. } = self.config.read_protocol() else {
            return Err(MemoryError::Unsupported("block write without a shadow read"));
        };
        let pl = self.page_length();
        let end = address + data.len();
        for page in address / pl..=(end - 1) / pl {
            let first = page * pl;
            let mut image = [0; MAX_PAGE_LENGTH];
            let image = &mut image[..pl];
            self.read_span(session, first, image, Chain::Fresh, false)?;
            let from = address.max(first);
            let to = end.min(first + pl);
            image[from - first..to - first].copy_from_slice(&data[from - address..to - address]);

            let block = self.config.page_address(page);
            let mut raw = [0; MAX_PAGE_LENGTH];
            let raw = &mut raw[..pl];
            raw.copy_from_slice(image);
            session.select()?;
            session.block(&mut [write, block as u8])?;
            session.block(raw)?;

            let mut echo = [0; MAX_PAGE_LENGTH];
            let echo = &mut echo[..pl];
            self.read_register(session, read, block, echo, Chain::Fresh)?;
            if echo != image {
                warn!("{}: shadow of block 0x{block:02x} differs from what was written", self.description());
                return Err(MemoryError::ReadBackMismatch);
            }
            session.select()?;
            session.block(&mut [copy, block as u8])?;
            session.delay_ms(copy_ms);
            debug!("{}: copied block 0x{block:02x}", self.description());
        }
        Ok(())
    }

    /// Status byte of a copy and lock register.
    pub(crate) fn register_status<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        status_cmd: u8,
    ) -> MemoryResult<u8, O::BusError> {
        session.select()?;
        session.block(&mut [status_cmd, 0x00])?;
        session.read_byte()
    }

    /// Lock `page` with the bank's lock command and confirm it.
    pub(crate) fn lock_by_command<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        command: LockCommand,
        page: usize,
    ) -> MemoryResult<(), O::BusError> {
        match command {
            LockCommand::CopyAndLock { cmd, key, .. } => {
                if !session.can_deliver_power() {
                    return Err(MemoryError::Unsupported("copy and lock without strong pull-up"));
                }
                session.select()?;
                session.write_byte(cmd)?;
                session.power_after_next_byte()?;
                session.write_byte(key)?;
                session.delay_ms(COPY_LOCK_MS);
                session.set_power_normal()?;
            }
            LockCommand::Block { register, enable, cmd } => {
                let WriteProtocol::Block { write, .. } = *self.config.write_protocol() else {
                    return Err(MemoryError::Unsupported("block lock without a register write"));
                };
                let control = self.control_register(session, register)?;
                session.select()?;
                session.block(&mut [write, register, control | enable])?;
                session.select()?;
                session.block(&mut [cmd, self.config.page_address(page) as u8])?;
            }
        }
        if self.locked_by_command(session, command, page)? {
            Ok(())
        } else {
            warn!("{}: lock of page {page} did not stick", self.description());
            Err(MemoryError::ReadBackMismatch)
        }
    }

    /// Whether `page` is locked according to the device.
    pub(crate) fn locked_by_command<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        command: LockCommand,
        page: usize,
    ) -> MemoryResult<bool, O::BusError> {
        match command {
            LockCommand::CopyAndLock {
                status_cmd, locked, ..
            } => Ok(self.register_status(session, status_cmd)? == locked),
            LockCommand::Block { register, .. } => {
                let control = self.control_register(session, register)?;
                Ok(control & (1 << page) != 0)
            }
        }
    }

    fn control_register<O: OneWire, D: DelayNs>(
        &self,
        session: &mut BusSession<'_, O, D>,
        register: u8,
    ) -> MemoryResult<u8, O::BusError> {
        let ReadProtocol::Recall { read, .. } = self.config.read_protocol() else {
            return Err(MemoryError::Unsupported("control register read"));
        };
        let mut control = [0xff];
        self.read_register(session, read, register as usize, &mut control, Chain::Fresh)?;
        Ok(control[0])
    }
}
