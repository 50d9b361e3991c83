/// One wire communication error type.
#[derive(Debug, PartialEq, Eq)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying hardware.
    Other(E),
    /// Indicates that no device is present on the bus.
    NoDevicePresent,
    /// Indicates that a short circuit was detected on the bus.
    ShortCircuit,
    /// The bus master has been reset and not configured since.
    BusUninitialized,
    /// Indicates that the operation is not implemented, such as strong pull-up
    /// on a bus master without one.
    Unimplemented,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Other(other)
    }
}
