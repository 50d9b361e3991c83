use core::fmt;

#[derive(Debug, PartialEq, Eq)]
/// DS2484 Hardware Errors
pub enum Ds2484Error<E> {
    /// I2C bus errors.
    I2c(E),
    /// Busy wait retries exceeded.
    RetriesExceeded,
}

impl<E> From<E> for Ds2484Error<E> {
    fn from(value: E) -> Self {
        Self::I2c(value)
    }
}

impl<E: fmt::Debug> fmt::Display for Ds2484Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(e) => write!(f, "I2C error: {e:?}"),
            Self::RetriesExceeded => write!(f, "DS2484 stayed busy"),
        }
    }
}
