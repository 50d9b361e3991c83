use core::fmt;
use embedded_onewire::OneWireError;

/// Errors raised by memory bank operations.
#[derive(Debug, PartialEq, Eq)]
pub enum MemoryError<E> {
    /// The transport failed.
    Bus(OneWireError<E>),
    /// No device answered the reset/select sequence.
    DeviceNotPresent,
    /// A CRC16 check on a scratchpad or page transfer failed.
    InvalidCrc,
    /// The copy-scratchpad completion byte did not confirm the commit.
    /// Carries the status byte that was read.
    CopyNotConfirmed(u8),
    /// The device rejected the password sent with the command.
    BadPassword,
    /// Address or length exceeds the capacity of the bank.
    OutOfRange,
    /// The page is write protected.
    PageLocked(usize),
    /// The bank (or the bus master) does not support the operation.
    Unsupported(&'static str),
    /// The write would overlap a password register window.
    WriteWouldCorruptPasswordRegion {
        /// First physical address of the window.
        address: u16,
    },
    /// Data read back after a write differs from what was written.
    ReadBackMismatch,
    /// The length prefix of a page packet is larger than the packet payload allows.
    InvalidPacketLength(u8),
    /// A continued read was requested but the device pointer is not positioned there.
    SessionDesync,
}

/// Result of memory bank operations.
pub type MemoryResult<T, E> = Result<T, MemoryError<E>>;

impl<E> MemoryError<E> {
    /// Whether the failure leaves the device in an unknown state, so the bank
    /// re-negotiates the bus speed before its next operation.
    pub fn needs_reverify(&self) -> bool {
        matches!(
            self,
            MemoryError::Bus(_)
                | MemoryError::DeviceNotPresent
                | MemoryError::InvalidCrc
                | MemoryError::CopyNotConfirmed(_)
                | MemoryError::BadPassword
                | MemoryError::ReadBackMismatch
                | MemoryError::InvalidPacketLength(_)
        )
    }
}

impl<E> From<OneWireError<E>> for MemoryError<E> {
    fn from(value: OneWireError<E>) -> Self {
        match value {
            OneWireError::NoDevicePresent => MemoryError::DeviceNotPresent,
            other => MemoryError::Bus(other),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for MemoryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::Bus(e) => write!(f, "1-Wire transport error: {e:?}"),
            MemoryError::DeviceNotPresent => f.write_str("device not present"),
            MemoryError::InvalidCrc => f.write_str("invalid CRC16 read from device"),
            MemoryError::CopyNotConfirmed(status) => {
                write!(f, "copy scratchpad not confirmed (status 0x{status:02x})")
            }
            MemoryError::BadPassword => f.write_str("password rejected by device"),
            MemoryError::OutOfRange => f.write_str("access exceeds memory bank end"),
            MemoryError::PageLocked(page) => write!(f, "page {page} is locked"),
            MemoryError::Unsupported(what) => write!(f, "not supported: {what}"),
            MemoryError::WriteWouldCorruptPasswordRegion { address } => {
                write!(f, "write overlaps password registers at 0x{address:04x}")
            }
            MemoryError::ReadBackMismatch => f.write_str("read back after write did not match"),
            MemoryError::InvalidPacketLength(len) => write!(f, "invalid packet length {len}"),
            MemoryError::SessionDesync => {
                f.write_str("continued read without the device pointer in place")
            }
        }
    }
}
