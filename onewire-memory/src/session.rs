//! Exclusive use of the bus for a sequence of memory operations.

use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireError, PowerDelivery};
use log::{trace, warn};

use crate::error::{MemoryError, MemoryResult};

/// Device passwords sent with password-protected commands.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Passwords {
    /// Read-only access password.
    pub read: Option<[u8; 8]>,
    /// Full access (read/write) password.
    pub full: Option<[u8; 8]>,
}

impl Passwords {
    /// Password sent with read commands: the read password if known,
    /// else the full access password, else all zeros.
    pub fn for_read(&self) -> [u8; 8] {
        self.read.or(self.full).unwrap_or([0; 8])
    }

    /// Password sent with copy commands.
    pub fn for_write(&self) -> [u8; 8] {
        self.full.unwrap_or([0; 8])
    }
}

/// Position of the device's internal address pointer after a streamed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub cmd: u8,
    pub address: usize,
}

/// How a read relates to the previous one in the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Chain {
    /// Always select the device and send a new header.
    Fresh,
    /// Continue the running read; fail if the pointer is elsewhere.
    Required,
    /// Continue when the pointer is already in place.
    Auto,
}

/// A bus session.
///
/// The session borrows the bus master for its whole lifetime, so no other
/// traffic can interleave with a running read. It remembers where the
/// device's address pointer stands after a streamed read, which is what
/// makes continued reads possible, and restores normal line power when it
/// is dropped.
pub struct BusSession<'a, O: OneWire, D: DelayNs> {
    bus: &'a mut O,
    delay: D,
    rom: Option<u64>,
    overdrive: bool,
    passwords: Passwords,
    cursor: Option<Cursor>,
}

impl<'a, O: OneWire, D: DelayNs> BusSession<'a, O, D> {
    /// Start a session talking to the device with ROM id `rom`.
    /// With [`None`] the device is addressed with Skip ROM, which only works
    /// with a single device on the bus.
    pub fn begin(bus: &'a mut O, delay: D, rom: Option<u64>) -> Self {
        trace!("Bus session for {rom:x?}");
        Self {
            bus,
            delay,
            rom,
            overdrive: false,
            passwords: Passwords::default(),
            cursor: None,
        }
    }

    /// Talk to the device at overdrive speed.
    pub fn with_overdrive(mut self, overdrive: bool) -> Self {
        self.overdrive = overdrive;
        self
    }

    /// Use `password` for password-protected reads.
    pub fn with_read_password(mut self, password: [u8; 8]) -> Self {
        self.passwords.read = Some(password);
        self
    }

    /// Use `password` for password-protected reads and copies.
    pub fn with_full_password(mut self, password: [u8; 8]) -> Self {
        self.passwords.full = Some(password);
        self
    }

    /// ROM id of the device, [`None`] for Skip ROM.
    pub fn rom(&self) -> Option<u64> {
        self.rom
    }

    /// Passwords in use.
    pub fn passwords(&self) -> &Passwords {
        &self.passwords
    }

    /// Replace the passwords in use.
    pub fn set_passwords(&mut self, passwords: Passwords) {
        self.passwords = passwords;
    }

    /// Whether the bus master can drive a strong pull-up.
    pub fn can_deliver_power(&self) -> bool {
        self.bus.can_deliver_power()
    }

    /// Whether the bus master can generate EPROM programming pulses.
    pub fn can_program(&self) -> bool {
        self.bus.can_program()
    }

    /// Forget the read position, forcing the next read to send a new header.
    pub fn invalidate(&mut self) {
        self.cursor = None;
    }

    /// Brings the bus to the speed the session was opened with.
    pub(crate) fn verify_speed(&mut self) -> MemoryResult<(), O::BusError> {
        self.cursor = None;
        match self.bus.set_overdrive_mode(self.overdrive) {
            Ok(()) => Ok(()),
            Err(OneWireError::Unimplemented) if !self.overdrive => Ok(()),
            Err(OneWireError::Unimplemented) => Err(MemoryError::Unsupported("overdrive speed")),
            Err(e) => Err(e.into()),
        }
    }

    /// Reset the bus and address the device.
    pub(crate) fn select(&mut self) -> MemoryResult<(), O::BusError> {
        self.cursor = None;
        self.bus.address(self.rom)?;
        Ok(())
    }

    /// Decide whether a read at `address` continues the running one.
    /// The stored position is consumed either way.
    pub(crate) fn resume(&mut self, cmd: u8, address: usize, chain: Chain) -> MemoryResult<bool, O::BusError> {
        let positioned = self.cursor.take() == Some(Cursor { cmd, address });
        match chain {
            Chain::Fresh => Ok(false),
            Chain::Auto => Ok(positioned),
            Chain::Required if positioned => Ok(true),
            Chain::Required => {
                warn!("Continued read at 0x{address:04x} but the device pointer is elsewhere");
                Err(MemoryError::SessionDesync)
            }
        }
    }

    /// Record the position of the device pointer after a streamed read.
    pub(crate) fn park(&mut self, cmd: u8, address: usize) {
        self.cursor = Some(Cursor { cmd, address });
    }

    pub(crate) fn block(&mut self, block: &mut [u8]) -> MemoryResult<(), O::BusError> {
        self.bus.data_block(block)?;
        Ok(())
    }

    pub(crate) fn write_byte(&mut self, byte: u8) -> MemoryResult<(), O::BusError> {
        self.bus.write_byte(byte)?;
        Ok(())
    }

    pub(crate) fn read_byte(&mut self) -> MemoryResult<u8, O::BusError> {
        Ok(self.bus.read_byte()?)
    }

    /// Arm the strong pull-up for the next byte.
    pub(crate) fn power_after_next_byte(&mut self) -> MemoryResult<(), O::BusError> {
        self.bus.start_power_delivery(PowerDelivery::AfterNextByte)?;
        Ok(())
    }

    pub(crate) fn set_power_normal(&mut self) -> MemoryResult<(), O::BusError> {
        self.bus.set_power_normal()?;
        Ok(())
    }

    pub(crate) fn program_pulse(&mut self) -> MemoryResult<(), O::BusError> {
        self.bus.program_pulse()?;
        Ok(())
    }

    pub(crate) fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}

impl<O: OneWire, D: DelayNs> Drop for BusSession<'_, O, D> {
    fn drop(&mut self) {
        if self.bus.set_power_normal().is_err() {
            warn!("Could not restore normal power when releasing the bus");
        }
        trace!("Bus session for {:x?} released", self.rom);
    }
}
