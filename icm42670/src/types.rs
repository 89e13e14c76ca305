use bitflags::bitflags;

use crate::registers::Odr;

/// Raw big-endian axis triplet as stored in the FIFO, converted to host order.
pub type Axes = [i16; 3];

/// One of the two logical consumers of the shared FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    Accel,
    Gyro,
}

impl Sensor {
    pub const ALL: [Sensor; 2] = [Sensor::Accel, Sensor::Gyro];

    pub fn name(&self) -> &'static str {
        match self {
            Sensor::Accel => "accel",
            Sensor::Gyro => "gyro",
        }
    }
}

bitflags! {
    /// Sources writing into the shared FIFO. Bit positions match the EN bits
    /// of `FIFO_CONFIG5`.
    pub struct SensorSet: u8 {
        const ACCEL         = 1 << 0;
        const GYRO          = 1 << 1;
        const TMST_FSYNC    = 1 << 2;
    }
}

pub type FifoEnableMask = SensorSet;

impl From<Sensor> for SensorSet {
    fn from(sensor: Sensor) -> Self {
        match sensor {
            Sensor::Accel => SensorSet::ACCEL,
            Sensor::Gyro => SensorSet::GYRO,
        }
    }
}

/// Output data rate and latency contract of one sensor.
///
/// A `watermark` of 0 turns FIFO delivery off for the sensor without
/// touching its power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorRateConfig {
    pub odr: Odr,
    pub watermark: u16,
}

impl SensorRateConfig {
    pub const fn new(odr: Odr, watermark: u16) -> Self {
        Self { odr, watermark }
    }

    pub const fn disabled(odr: Odr) -> Self {
        Self { odr, watermark: 0 }
    }

    pub const fn is_active(&self) -> bool {
        self.watermark != 0
    }
}

impl Default for SensorRateConfig {
    fn default() -> Self {
        Self::disabled(Odr::Hz100)
    }
}

/// Hardware clock readings bracketing a drain, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimestampWindow {
    pub start_ns: u64,
    pub end_ns: u64,
}

impl TimestampWindow {
    pub const fn new(start_ns: u64, end_ns: u64) -> Self {
        Self { start_ns, end_ns }
    }

    pub const fn duration_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}

/// Descriptor handed to the sample sink after each drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleBatch {
    pub sensor: Sensor,
    pub record_count: usize,
    pub window: TimestampWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoSample {
    Accel { data: Axes, temperature: i8, timestamp_ns: u64 },
    Gyro { data: Axes, temperature: i8, timestamp_ns: u64 },
}

impl FifoSample {
    pub fn sensor(&self) -> Sensor {
        match self {
            FifoSample::Accel { .. } => Sensor::Accel,
            FifoSample::Gyro { .. } => Sensor::Gyro,
        }
    }

    pub fn timestamp_ns(&self) -> u64 {
        match self {
            FifoSample::Accel { timestamp_ns, .. } | FifoSample::Gyro { timestamp_ns, .. } => *timestamp_ns,
        }
    }
}
