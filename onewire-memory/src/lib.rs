#![no_std]
#![deny(missing_docs)]
//! # onewire-memory
//! Memory bank access for 1-Wire EEPROM and EPROM devices, on top of any
//! bus master implementing [`embedded_onewire::OneWire`].
//!
//! A device's memory is split in banks described by a [`BankConfig`]. A
//! [`MemoryBank`] reads and writes one bank within a [`BusSession`], which
//! owns the bus for as long as it lives:
//! - EEPROM writes go through the scratchpad (write, read back, copy);
//! - EPROM writes are programmed byte by byte;
//! - register banks are written in place or block by block;
//! - page reads are checked against the CRC16 or CRC8 the device sends;
//! - pages can hold CRC16 protected packets;
//! - write-once pages can be locked or redirected.
//!
//! Memory maps of the supported parts are in [`devices`].
//!
//! ```ignore
//! use onewire_memory::{BusSession, MemoryBank, devices};
//!
//! let mut session = BusSession::begin(&mut bus, delay, Some(rom));
//! let bank = MemoryBank::new(&devices::DS2431_MAIN);
//! bank.write(&mut session, 0x10, b"hello")?;
//! let mut page = [0; 32];
//! bank.read_page(&mut session, 0, &mut page)?;
//! ```
mod bank;
mod config;
mod crc;
pub mod devices;
mod eprom;
mod error;
mod otp;
mod register;
mod scratchpad;
mod session;

pub use bank::{MemoryBank, VerifyState};
pub use config::{
    Access, BankConfig, CopyCompletion, ExtraInfo, LockCommand, MAX_PAGE_LENGTH, PageCrcLayout, ProtectedWindow,
    ReadProtocol, ScratchpadConfig, StatusLayout, StatusLink, WriteProtocol,
};
pub use crc::CrcKind;
pub use error::{MemoryError, MemoryResult};
pub use scratchpad::{
    CopyConfirmation, CopyStatus, DataStatus, EndingOffset, NibbleConfirmation, PasswordConfirmation, Scratchpad,
    ScratchpadImage, WideEndingOffset,
};
pub use session::{BusSession, Passwords};
