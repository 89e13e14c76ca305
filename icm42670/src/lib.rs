#![cfg_attr(not(test), no_std)]

pub mod registers;
pub mod configs;
pub mod types;
pub mod transport;
pub mod packet;
pub mod watermark;
pub mod drain;
pub mod timestamp;
pub mod power;
pub mod sink;
pub mod stream;

#[cfg(test)]
mod mock;

use core::fmt::{Debug, Display, Formatter};

pub use crate::types::*;
pub use drain::{DrainResult, FifoBuffer};
pub use packet::{DecodeError, FifoHeader, FifoPacket, FifoRecords};
pub use power::{AlwaysOn, PowerControl, PowerGuard};
pub use registers::Odr;
pub use sink::{BatchQueue, SampleSink};
pub use stream::{Icm42670Fifo, LifecycleState};
pub use timestamp::{Clock, TimestampReconciler, WindowTimestamp};
pub use transport::{I2cTransport, RegisterTransport, DEFAULT_ADDRESS};
pub use watermark::WatermarkPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// The register transport failed; passed through unchanged.
    Transport(E),
    /// A sensor was disabled without holding a FIFO reference.
    InvalidConsumer(Sensor),
}

impl<E: Debug> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Transport(err) => write!(f, "transport error: {:?}", err),
            Error::InvalidConsumer(sensor) => write!(f, "{} holds no FIFO reference", sensor.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn error_messages() {
        assert_eq!(Error::Transport(5u8).to_string(), "transport error: 5");
        assert_eq!(Error::<()>::InvalidConsumer(Sensor::Gyro).to_string(), "gyro holds no FIFO reference");
    }
}
