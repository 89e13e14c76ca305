use heapless::spsc::Queue;

use crate::packet::{is_data_valid, FifoRecords};
use crate::types::{FifoSample, SampleBatch, Sensor};

/// Receives what each drain found for one sensor.
///
/// Called inside the device critical section: implementations must not block
/// and must not call back into the FIFO controller.
pub trait SampleSink {
    fn push_batch(&mut self, batch: &SampleBatch, records: FifoRecords<'_>);
}

/// Bounded sample queue filled from drained batches.
///
/// Valid samples of the batch's sensor get evenly spread timestamps, the
/// last one landing on the end of the batch window.
pub struct BatchQueue<const N: usize> {
    queue: Queue<FifoSample, N>,
    dropped: usize,
}

impl<const N: usize> BatchQueue<N> {
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, sample: FifoSample) {
        if self.queue.enqueue(sample).is_err() {
            self.dropped += 1;
        }
    }

    pub fn pop(&mut self) -> Option<FifoSample> {
        self.queue.dequeue()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Samples lost because the queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl<const N: usize> Default for BatchQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SampleSink for BatchQueue<N> {
    fn push_batch(&mut self, batch: &SampleBatch, records: FifoRecords<'_>) {
        if batch.record_count == 0 {
            return;
        }
        let count = batch.record_count as u64;
        let span = batch.window.duration_ns();
        let mut index = 0u64;

        for packet in records {
            let data = match packet.sensor_data(batch.sensor) {
                Some(data) if is_data_valid(&data) => data,
                _ => continue,
            };
            index += 1;
            if index > count {
                break;
            }
            let timestamp_ns = batch.window.start_ns + span.saturating_mul(index) / count;
            let temperature = packet.temperature().unwrap_or_default();
            self.push(match batch.sensor {
                Sensor::Accel => FifoSample::Accel { data, temperature, timestamp_ns },
                Sensor::Gyro => FifoSample::Gyro { data, temperature, timestamp_ns },
            });
        }
    }
}
