//! CRC flavours used by paged reads and EPROM programming.

use embedded_onewire::{OneWireCrc, OneWireCrc16};

/// CRC a device appends to paged reads and programmed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrcKind {
    /// Inverted CRC16, sent low byte first.
    #[default]
    Crc16,
    /// CRC8 as used for ROM ids, sent as is.
    Crc8,
}

impl CrcKind {
    /// Bytes the CRC takes on the wire.
    pub const fn trailer_len(self) -> usize {
        match self {
            CrcKind::Crc16 => 2,
            CrcKind::Crc8 => 1,
        }
    }
}

/// Running check of a block followed by its CRC.
#[derive(Debug)]
pub(crate) enum CrcCheck {
    Crc16(OneWireCrc16),
    Crc8(OneWireCrc),
}

impl CrcCheck {
    /// A CRC8 only takes the low byte of `seed`.
    pub(crate) fn new(kind: CrcKind, seed: u16) -> Self {
        match kind {
            CrcKind::Crc16 => CrcCheck::Crc16(OneWireCrc16::new(seed)),
            CrcKind::Crc8 => CrcCheck::Crc8(OneWireCrc::new(seed as u8)),
        }
    }

    pub(crate) fn update_slice(&mut self, bytes: &[u8]) {
        match self {
            CrcCheck::Crc16(crc) => crc.update_slice(bytes),
            CrcCheck::Crc8(crc) => crc.update_slice(bytes),
        }
    }

    /// Whether everything fed so far ends with a matching CRC.
    pub(crate) fn is_valid(&self) -> bool {
        match self {
            CrcCheck::Crc16(crc) => crc.value() == OneWireCrc16::RESIDUE,
            CrcCheck::Crc8(crc) => crc.value() == 0,
        }
    }

    /// Check `block` in one go.
    pub(crate) fn validate(kind: CrcKind, seed: u16, block: &[u8]) -> bool {
        let mut check = Self::new(kind, seed);
        check.update_slice(block);
        check.is_valid()
    }
}
