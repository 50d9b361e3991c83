use crate::{Ds2484, Ds2484Error};
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};

/// A register of the DS2484 that can be read back through the read pointer.
pub trait Register: Sized {
    /// Command writing the register, `0` for read-only registers.
    const WRITE_CMD: u8;
    /// Read pointer code of the register.
    const READ_PTR: u8;

    /// Read the register from the DS2484.
    fn read<I: I2c<SevenBitAddress>, D: DelayNs>(
        dev: &mut Ds2484<I, D>,
    ) -> Result<Self, Ds2484Error<I::Error>>;

    /// Write the register to the DS2484.
    fn write<I: I2c<SevenBitAddress>, D: DelayNs>(
        &self,
        dev: &mut Ds2484<I, D>,
    ) -> Result<(), Ds2484Error<I::Error>>;
}
