//! FIFO packet codec.
//!
//! Every FIFO record starts with a one byte header telling which sensors the
//! record carries. Only two record sizes exist while high resolution mode is
//! off:
//!
//! ```text
//! single sensor  | header | x y z (BE i16) | temp (i8) |                  8 bytes
//! accel + gyro   | header | accel x y z | gyro x y z | temp (i8) | ts (BE u16) | 16 bytes
//! ```

use core::fmt;

use bitflags::bitflags;

use crate::types::{Axes, Sensor, SensorSet};

pub const FIFO_1SENSOR_PACKET_SIZE: usize = 8;
pub const FIFO_2SENSORS_PACKET_SIZE: usize = 16;
pub const FIFO_MAX_PACKET_SIZE: usize = FIFO_2SENSORS_PACKET_SIZE;

/// Axis value written by the device for a sample that was not produced.
pub const FIFO_DATA_INVALID: i16 = -32768;

const GYRO_OFFSET_2SENSORS: usize = 7;

bitflags! {
    pub struct FifoHeader: u8 {
        /// FIFO empty, the rest of the record is meaningless.
        const EMPTY         = 1 << 7;
        const ACCEL         = 1 << 6;
        const GYRO          = 1 << 5;
        const HIGHRES       = 1 << 4;
        /// Timestamp/FSYNC code, both bits set means fully valid.
        const TMST_FSYNC    = 0b11 << 2;
        const ODR_ACCEL     = 1 << 1;
        const ODR_GYRO      = 1 << 0;
    }
}

impl FifoHeader {
    pub fn fsync_code(&self) -> u8 {
        (self.bits() & Self::TMST_FSYNC.bits()) >> 2
    }

    pub fn fsync_valid(&self) -> bool {
        self.contains(Self::TMST_FSYNC)
    }

    /// Sensors whose ODR changed at this record.
    pub fn odr_changed(&self) -> SensorSet {
        let mut changed = SensorSet::empty();
        if self.contains(Self::ODR_ACCEL) {
            changed |= SensorSet::ACCEL;
        }
        if self.contains(Self::ODR_GYRO) {
            changed |= SensorSet::GYRO;
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Header with neither the empty, accel nor gyro bit set.
    MalformedHeader { header: u8 },
    /// Fewer bytes left than the header announces.
    Truncated { needed: usize, available: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MalformedHeader { header } => write!(f, "malformed FIFO header {:#04x}", header),
            DecodeError::Truncated { needed, available } => {
                write!(f, "truncated FIFO packet: {} bytes needed, {} available", needed, available)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoPacket {
    Empty,
    Accel {
        accel: Axes,
        temperature: i8,
        odr_changed: SensorSet,
    },
    Gyro {
        gyro: Axes,
        temperature: i8,
        odr_changed: SensorSet,
    },
    AccelGyro {
        accel: Axes,
        /// LSB of every axis carries the FSYNC validity marker.
        gyro: Axes,
        temperature: i8,
        timestamp: u16,
        odr_changed: SensorSet,
    },
}

impl FifoPacket {
    pub const fn byte_length(&self) -> usize {
        match self {
            FifoPacket::Empty => 0,
            FifoPacket::Accel { .. } | FifoPacket::Gyro { .. } => FIFO_1SENSOR_PACKET_SIZE,
            FifoPacket::AccelGyro { .. } => FIFO_2SENSORS_PACKET_SIZE,
        }
    }

    pub const fn is_empty(&self) -> bool {
        matches!(self, FifoPacket::Empty)
    }

    pub fn accel(&self) -> Option<Axes> {
        match self {
            FifoPacket::Accel { accel, .. } | FifoPacket::AccelGyro { accel, .. } => Some(*accel),
            _ => None,
        }
    }

    pub fn gyro(&self) -> Option<Axes> {
        match self {
            FifoPacket::Gyro { gyro, .. } | FifoPacket::AccelGyro { gyro, .. } => Some(*gyro),
            _ => None,
        }
    }

    pub fn sensor_data(&self, sensor: Sensor) -> Option<Axes> {
        match sensor {
            Sensor::Accel => self.accel(),
            Sensor::Gyro => self.gyro(),
        }
    }

    pub fn temperature(&self) -> Option<i8> {
        match self {
            FifoPacket::Empty => None,
            FifoPacket::Accel { temperature, .. }
            | FifoPacket::Gyro { temperature, .. }
            | FifoPacket::AccelGyro { temperature, .. } => Some(*temperature),
        }
    }

    pub fn timestamp(&self) -> Option<u16> {
        match self {
            FifoPacket::AccelGyro { timestamp, .. } => Some(*timestamp),
            _ => None,
        }
    }

    pub fn odr_changed(&self) -> SensorSet {
        match self {
            FifoPacket::Empty => SensorSet::empty(),
            FifoPacket::Accel { odr_changed, .. }
            | FifoPacket::Gyro { odr_changed, .. }
            | FifoPacket::AccelGyro { odr_changed, .. } => *odr_changed,
        }
    }
}

/// All three axes at the invalid marker means the sensor produced nothing.
pub fn is_data_valid(axes: &Axes) -> bool {
    !axes.iter().all(|&axis| axis == FIFO_DATA_INVALID)
}

fn read_axes(raw: &[u8]) -> Axes {
    [
        i16::from_be_bytes([raw[0], raw[1]]),
        i16::from_be_bytes([raw[2], raw[3]]),
        i16::from_be_bytes([raw[4], raw[5]]),
    ]
}

fn ensure_len(buf: &[u8], needed: usize) -> Result<(), DecodeError> {
    if buf.len() < needed {
        return Err(DecodeError::Truncated { needed, available: buf.len() });
    }
    Ok(())
}

fn mark_fsync(axis: i16, valid: bool) -> i16 {
    if valid {
        axis | 0x1
    } else {
        axis & !0x1
    }
}

/// Decodes the record at the start of `buf` without touching it.
///
/// The returned gyro axes of a dual record already carry the FSYNC marker,
/// so `parse` and [`decode`] agree on every record.
pub fn parse(buf: &[u8]) -> Result<FifoPacket, DecodeError> {
    ensure_len(buf, 1)?;
    let raw = buf[0];
    let header = FifoHeader::from_bits_truncate(raw);

    if header.contains(FifoHeader::EMPTY) {
        return Ok(FifoPacket::Empty);
    }

    let odr_changed = header.odr_changed();

    if header.contains(FifoHeader::ACCEL | FifoHeader::GYRO) {
        ensure_len(buf, FIFO_2SENSORS_PACKET_SIZE)?;
        let valid = header.fsync_valid();
        let gyro = read_axes(&buf[GYRO_OFFSET_2SENSORS..GYRO_OFFSET_2SENSORS + 6]);
        return Ok(FifoPacket::AccelGyro {
            accel: read_axes(&buf[1..7]),
            gyro: gyro.map(|axis| mark_fsync(axis, valid)),
            temperature: buf[13] as i8,
            timestamp: u16::from_be_bytes([buf[14], buf[15]]),
            odr_changed,
        });
    }

    if header.contains(FifoHeader::ACCEL) {
        ensure_len(buf, FIFO_1SENSOR_PACKET_SIZE)?;
        return Ok(FifoPacket::Accel {
            accel: read_axes(&buf[1..7]),
            temperature: buf[7] as i8,
            odr_changed,
        });
    }

    if header.contains(FifoHeader::GYRO) {
        ensure_len(buf, FIFO_1SENSOR_PACKET_SIZE)?;
        return Ok(FifoPacket::Gyro {
            gyro: read_axes(&buf[1..7]),
            temperature: buf[7] as i8,
            odr_changed,
        });
    }

    Err(DecodeError::MalformedHeader { header: raw })
}

/// Decodes the record at the start of `buf`.
///
/// For dual records the gyro axis LSBs are rewritten in place: set when the
/// FSYNC code is `0b11`, cleared otherwise.
pub fn decode(buf: &mut [u8]) -> Result<FifoPacket, DecodeError> {
    let packet = parse(buf)?;
    if let FifoPacket::AccelGyro { gyro, .. } = packet {
        for (axis, value) in gyro.iter().enumerate() {
            let offset = GYRO_OFFSET_2SENSORS + 2 * axis;
            buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        }
    }
    Ok(packet)
}

/// Walks decoded records until an empty or undecodable one.
pub struct FifoRecords<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FifoRecords<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }
}

impl<'a> Iterator for FifoRecords<'a> {
    type Item = FifoPacket;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }
        match parse(&self.data[self.offset..]) {
            Ok(packet) if !packet.is_empty() => {
                self.offset += packet.byte_length();
                Some(packet)
            }
            _ => {
                self.offset = self.data.len();
                None
            }
        }
    }
}
