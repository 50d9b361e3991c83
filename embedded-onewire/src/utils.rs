#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Calculate CRC-8 used in 1-Wire communications.
///
/// Unlike [`OneWireCrc16`], devices send this CRC as is, so a block followed
/// by its CRC always leaves 0 behind.
pub struct OneWireCrc(u8);

impl OneWireCrc {
    /// Start a new CRC with the given seed.
    pub const fn new(seed: u8) -> Self {
        Self(seed)
    }

    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Update the CRC with the incoming byte.
    pub fn update(&mut self, byte: u8) {
        #[cfg(feature = "crc-table")]
        {
            self.0 = CRC8_TABLE[(self.0 ^ byte) as usize];
        }
        #[cfg(not(feature = "crc-table"))]
        {
            let mut crc = self.0 ^ byte; // XOR the byte with the current CRC value
            for _ in 0..8 {
                if crc & 0x1 == 0x1 {
                    crc = (crc >> 1) ^ 0x8c; // Polynomial for CRC-8
                } else {
                    crc >>= 1;
                }
            }
            self.0 = crc;
        }
    }

    /// Update the CRC with every byte of `bytes`.
    pub fn update_slice(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.update(byte);
        }
    }

    /// CRC of `bytes` starting from `seed`.
    pub fn compute(seed: u8, bytes: &[u8]) -> u8 {
        let mut crc = Self::new(seed);
        crc.update_slice(bytes);
        crc.value()
    }

    /// Valudate a sequence of bytes where the last byte is the 1-Wire CRC of
    /// the previous bytes.
    pub fn validate(sequence: &[u8]) -> bool {
        let mut crc = OneWireCrc(0);
        for &byte in sequence.iter() {
            crc.update(byte); // Update CRC with the all bytes of the ROM
        }
        crc.0 == 0x0 // If the last byte of the ROM is the CRC, the result should be 0
    }
}

/// Calculate the CRC-16 used by 1-Wire memory devices.
///
/// The CRC is seeded per transaction (usually with 0, sometimes with a page
/// number or a running address) and sent inverted, least significant byte
/// first. Running the CRC over a block that ends with such a trailer always
/// leaves [`OneWireCrc16::RESIDUE`] behind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OneWireCrc16(u16);

impl OneWireCrc16 {
    /// Value left in the accumulator after a block and its valid CRC trailer.
    pub const RESIDUE: u16 = 0xb001;

    /// Start a new CRC with the given seed.
    pub const fn new(seed: u16) -> Self {
        Self(seed)
    }

    /// Get the current CRC value
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Update the CRC with the incoming byte.
    pub fn update(&mut self, byte: u8) {
        #[cfg(feature = "crc-table")]
        {
            self.0 = (self.0 >> 8) ^ CRC16_TABLE[((self.0 ^ byte as u16) & 0xff) as usize];
        }
        #[cfg(not(feature = "crc-table"))]
        {
            let mut crc = self.0 ^ byte as u16;
            for _ in 0..8 {
                if crc & 0x1 == 0x1 {
                    crc = (crc >> 1) ^ 0xa001;
                } else {
                    crc >>= 1;
                }
            }
            self.0 = crc;
        }
    }

    /// Update the CRC with every byte of `bytes`.
    pub fn update_slice(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.update(byte);
        }
    }

    /// Run `bytes` through a CRC started from `seed` and return the new value.
    pub fn compute(seed: u16, bytes: &[u8]) -> u16 {
        let mut crc = Self::new(seed);
        crc.update_slice(bytes);
        crc.0
    }

    /// Validate a block whose last two bytes are the inverted CRC-16 of the
    /// bytes before them.
    pub fn validate(seed: u16, sequence: &[u8]) -> bool {
        Self::compute(seed, sequence) == Self::RESIDUE
    }

    /// Trailer to append to `bytes` so that [`OneWireCrc16::validate`] holds.
    pub fn trailer(seed: u16, bytes: &[u8]) -> [u8; 2] {
        (!Self::compute(seed, bytes)).to_le_bytes()
    }
}

#[cfg(feature = "crc-table")]
const CRC8_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x1 == 0x1 { (crc >> 1) ^ 0x8c } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

#[cfg(feature = "crc-table")]
const CRC16_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x1 == 0x1 { (crc >> 1) ^ 0xa001 } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};
