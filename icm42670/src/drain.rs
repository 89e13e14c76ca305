use log::{debug, warn};

use crate::packet::{self, is_data_valid, DecodeError, FifoPacket, FifoRecords};
use crate::registers::{Bank0Reg, FIFO_SIZE};
use crate::transport::RegisterTransport;
use crate::types::{Sensor, SensorSet};
use crate::watermark::packet_size;

pub const FIFO_BUFFER_SIZE: usize = FIFO_SIZE;

/// Per-call summary of a FIFO drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainResult {
    /// Bytes transferred from the FIFO after clamping.
    pub bytes: usize,
    /// Records carrying valid accelerometer data.
    pub accel: usize,
    /// Records carrying valid gyroscope data.
    pub gyro: usize,
    /// Records decoded before an empty, malformed or truncated one.
    pub total: usize,
}

impl DrainResult {
    pub fn count(&self, sensor: Sensor) -> usize {
        match sensor {
            Sensor::Accel => self.accel,
            Sensor::Gyro => self.gyro,
        }
    }
}

/// Reads the big-endian FIFO byte count.
pub fn read_fifo_count<T: RegisterTransport>(transport: &mut T) -> Result<u16, T::Error> {
    let mut raw = [0u8; 2];
    transport.read(Bank0Reg::FifoCountH.into(), &mut raw)?;
    Ok(u16::from_be_bytes(raw))
}

/// Local copy of the hardware FIFO.
pub struct FifoBuffer {
    data: [u8; FIFO_BUFFER_SIZE],
    len: usize,
}

impl FifoBuffer {
    pub const fn new() -> Self {
        Self {
            data: [0; FIFO_BUFFER_SIZE],
            len: 0,
        }
    }

    /// Transfers the pending FIFO content and counts its records.
    ///
    /// `max_records` caps the transfer in records of the current packet size
    /// (single sensor or dual, per `mask`); 0 means the whole buffer. The
    /// walk stops early on an empty record or on a record that cannot be
    /// decoded, keeping the counts gathered so far. Transport errors abort
    /// the drain and leave the buffer empty.
    pub fn drain<T: RegisterTransport>(
        &mut self,
        transport: &mut T,
        mask: SensorSet,
        max_records: usize,
    ) -> Result<DrainResult, T::Error> {
        self.len = 0;

        let max_count = if max_records == 0 {
            FIFO_BUFFER_SIZE
        } else {
            max_records.saturating_mul(packet_size(mask)).min(FIFO_BUFFER_SIZE)
        };

        let reported = usize::from(read_fifo_count(transport)?);
        if reported == 0 {
            return Ok(DrainResult::default());
        }
        let count = reported.min(max_count);

        transport.read_noinc(Bank0Reg::FifoData.into(), &mut self.data[..count])?;
        self.len = count;

        let mut result = DrainResult { bytes: count, ..DrainResult::default() };
        let mut offset = 0;
        while offset < count {
            let packet = match packet::decode(&mut self.data[offset..count]) {
                Ok(FifoPacket::Empty) => break,
                Ok(packet) => packet,
                Err(DecodeError::MalformedHeader { header }) => {
                    warn!("FIFO record at {} has malformed header {:#04x}, dropping {} bytes", offset, header, count - offset);
                    break;
                }
                Err(err) => {
                    debug!("FIFO record at {}: {}", offset, err);
                    break;
                }
            };
            if packet.gyro().map_or(false, |gyro| is_data_valid(&gyro)) {
                result.gyro += 1;
            }
            if packet.accel().map_or(false, |accel| is_data_valid(&accel)) {
                result.accel += 1;
            }
            result.total += 1;
            offset += packet.byte_length();
        }

        debug!(
            "FIFO drain: {}/{} bytes, {} records ({} accel, {} gyro)",
            count, reported, result.total, result.accel, result.gyro
        );
        Ok(result)
    }

    pub fn records(&self) -> FifoRecords<'_> {
        FifoRecords::new(&self.data[..self.len])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for FifoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::*;
    use crate::packet::{FifoHeader, FIFO_DATA_INVALID};
    use std::boxed::Box;

    const BOTH: SensorSet = SensorSet::from_bits_truncate(0b011);

    fn buffer() -> Box<FifoBuffer> {
        Box::new(FifoBuffer::new())
    }

    #[test]
    fn empty_fifo_skips_bulk_read() {
        let mut transport = MockTransport::new();
        let mut fifo = buffer();

        let result = fifo.drain(&mut transport, BOTH, 0).unwrap();

        assert_eq!(result, DrainResult::default());
        assert_eq!(transport.bulk_reads(), 0);
        assert!(fifo.is_empty());
    }

    #[test]
    fn counts_each_sensor_in_dual_records() {
        let mut transport = MockTransport::new();
        for i in 0..5 {
            transport.push_fifo(&dual_record([i, i, i], [-i, -i, -i]));
        }
        let mut fifo = buffer();

        let result = fifo.drain(&mut transport, BOTH, 0).unwrap();

        assert_eq!(result, DrainResult { bytes: 80, accel: 5, gyro: 5, total: 5 });
        assert_eq!(transport.bulk_reads(), 1);
        assert_eq!(fifo.records().count(), 5);
    }

    #[test]
    fn stops_at_empty_record() {
        let mut transport = MockTransport::new();
        for _ in 0..3 {
            transport.push_fifo(&dual_record([1, 2, 3], [4, 5, 6]));
        }
        transport.push_fifo(&[FifoHeader::EMPTY.bits()]);
        transport.push_fifo(&dual_record([7, 8, 9], [1, 1, 1]));
        // stale count well past the real content
        transport.fifo_count = Some(200);
        let mut fifo = buffer();

        let result = fifo.drain(&mut transport, BOTH, 0).unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.accel, 3);
        assert_eq!(result.bytes, 200);
    }

    #[test]
    fn malformed_header_keeps_partial_counts() {
        let mut transport = MockTransport::new();
        transport.push_fifo(&accel_record([1, 1, 1]));
        transport.push_fifo(&accel_record([2, 2, 2]));
        transport.push_fifo(&[0x0C, 0, 0, 0, 0, 0, 0, 0]);
        transport.push_fifo(&accel_record([3, 3, 3]));
        let mut fifo = buffer();

        let result = fifo.drain(&mut transport, SensorSet::ACCEL, 0).unwrap();

        assert_eq!(result, DrainResult { bytes: 32, accel: 2, gyro: 0, total: 2 });
    }

    #[test]
    fn invalid_samples_count_toward_total_only() {
        let mut transport = MockTransport::new();
        transport.push_fifo(&dual_record([FIFO_DATA_INVALID; 3], [1, 2, 3]));
        transport.push_fifo(&dual_record([1, 2, 3], [FIFO_DATA_INVALID; 3]));
        transport.push_fifo(&dual_record([1, 2, 3], [1, 2, 3]));
        let mut fifo = buffer();

        let result = fifo.drain(&mut transport, BOTH, 0).unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.accel, 2);
        assert_eq!(result.gyro, 2);
    }

    #[test]
    fn record_cap_uses_current_packet_size() {
        let mut transport = MockTransport::new();
        for i in 0..10 {
            transport.push_fifo(&gyro_record([i, 0, 0]));
        }
        let mut fifo = buffer();

        let result = fifo.drain(&mut transport, SensorSet::GYRO, 4).unwrap();

        assert_eq!(result.bytes, 32);
        assert_eq!(result.gyro, 4);
        assert_eq!(transport.ops.last(), Some(&Op::ReadNoinc(Bank0Reg::FifoData.into(), 32)));

        let mut transport = MockTransport::new();
        for _ in 0..10 {
            transport.push_fifo(&dual_record([0; 3], [0; 3]));
        }
        let result = fifo.drain(&mut transport, BOTH, 4).unwrap();
        assert_eq!(result.bytes, 64);
        assert_eq!(result.total, 4);
    }

    #[test]
    fn count_is_clamped_to_buffer() {
        let mut transport = MockTransport::new();
        transport.fifo_count = Some(u16::MAX);
        let mut fifo = buffer();

        let result = fifo.drain(&mut transport, BOTH, 0).unwrap();

        assert_eq!(result.bytes, FIFO_BUFFER_SIZE);
        // zero filled data is a malformed header right away
        assert_eq!(result.total, 0);
    }

    #[test]
    fn trailing_partial_record_is_not_counted() {
        let mut transport = MockTransport::new();
        transport.push_fifo(&dual_record([1, 1, 1], [1, 1, 1]));
        transport.push_fifo(&dual_record([2, 2, 2], [2, 2, 2])[..10]);
        let mut fifo = buffer();

        let result = fifo.drain(&mut transport, BOTH, 0).unwrap();

        assert_eq!(result.bytes, 26);
        assert_eq!(result.total, 1);
    }

    #[test]
    fn transport_errors_propagate() {
        let mut transport = MockTransport::new();
        transport.push_fifo(&dual_record([1, 1, 1], [1, 1, 1]));
        transport.fail_on(OpKind::ReadNoinc, Bank0Reg::FifoData);
        let mut fifo = buffer();

        assert_eq!(fifo.drain(&mut transport, BOTH, 0), Err(MockError));
        assert!(fifo.is_empty());

        let mut transport = MockTransport::new();
        transport.fail_on(OpKind::Read, Bank0Reg::FifoCountH);
        assert_eq!(fifo.drain(&mut transport, BOTH, 0), Err(MockError));
        assert_eq!(transport.bulk_reads(), 0);
    }

    #[test]
    fn drain_applies_fsync_marker_in_place() {
        let mut transport = MockTransport::new();
        let mut record = dual_record([0; 3], [2, 4, 6]);
        record[0] |= FifoHeader::TMST_FSYNC.bits();
        transport.push_fifo(&record);
        let mut fifo = buffer();

        fifo.drain(&mut transport, BOTH, 0).unwrap();

        assert_eq!(&fifo.as_bytes()[7..13], &[0, 3, 0, 5, 0, 7]);
    }
}
