/// Errors raised by the master and slave transfer loops.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// A GPIO line could not be driven or sampled.
    Pin,
    /// The clock backing a deadline could not be read.
    Clock,
    /// The caller's buffer does not fit the transfer buffer.
    BufferOverflow,
    /// TX and RX buffers of a full-duplex exchange differ in length.
    LengthMismatch,
    /// A session is already in progress.
    Busy,
    /// The peer stopped clocking, or deselected mid-byte.
    ///
    /// `bytes` counts the bytes fully received, `bits` the bits of the
    /// byte that was in flight.
    IncompleteTransfer {
        bytes: usize,
        bits: u8,
    },
}

impl From<embedded_time::TimeError> for Error {
    fn from(_: embedded_time::TimeError) -> Self {
        Error::Clock
    }
}
