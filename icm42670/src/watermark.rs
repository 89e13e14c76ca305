//! Joint FIFO watermark for the accelerometer and gyroscope.
//!
//! A watermark is a latency contract: `count * period`. Picking the smaller
//! of the two counts is not enough. With gyro at 100 Hz wm 4 and accel at
//! 100 Hz wm 6, 4 does not fit the accel contract because 6 is not a
//! multiple of 4; the latency has to be cut down until it fits both (2
//! samples in that example). The adjusted latency is
//! then expressed in samples of the fastest sensor, which is only exact
//! because every supported period is a multiple of the others.

use crate::packet::{FIFO_1SENSOR_PACKET_SIZE, FIFO_2SENSORS_PACKET_SIZE};
use crate::registers::FIFO_WATERMARK_MAX;
use crate::types::{SensorRateConfig, SensorSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatermarkPlan {
    pub sample_count: u32,
    pub byte_threshold: u32,
}

/// Record size for the sensors currently writing into the FIFO.
pub fn packet_size(mask: SensorSet) -> usize {
    if mask.contains(SensorSet::ACCEL | SensorSet::GYRO) {
        FIFO_2SENSORS_PACKET_SIZE
    } else {
        FIFO_1SENSOR_PACKET_SIZE
    }
}

/// Base period of the FIFO: the shortest period among enabled sensors,
/// `u32::MAX` when none is enabled.
pub fn fifo_period_ns(mask: SensorSet, accel: &SensorRateConfig, gyro: &SensorRateConfig) -> u32 {
    let period_accel = if mask.contains(SensorSet::ACCEL) { accel.odr.period_ns() } else { u32::MAX };
    let period_gyro = if mask.contains(SensorSet::GYRO) { gyro.odr.period_ns() } else { u32::MAX };
    period_gyro.min(period_accel)
}

/// Largest sample count not above `watermark` whose byte size fits the
/// hardware threshold field.
pub fn truncate(watermark: u16, packet_size: usize) -> u32 {
    let size = (usize::from(watermark) * packet_size).min(FIFO_WATERMARK_MAX);
    (size / packet_size) as u32
}

struct Contract {
    count: u32,
    period_us: u32,
    /// `None` for a sensor without FIFO delivery.
    latency_us: Option<u32>,
}

impl Contract {
    fn new(config: &SensorRateConfig, packet_size: usize) -> Self {
        let count = truncate(config.watermark, packet_size);
        if count == 0 {
            return Self { count, period_us: u32::MAX, latency_us: None };
        }
        // microseconds keep the product within 32 bits
        let period_us = config.odr.period_us();
        Self { count, period_us, latency_us: Some(period_us * count) }
    }
}

/// Computes the joint watermark of both sensors.
///
/// With both sensors inactive the plan is all zeros, which callers must not
/// program as a threshold.
pub fn plan(accel: &SensorRateConfig, gyro: &SensorRateConfig, packet_size: usize) -> WatermarkPlan {
    let accel = Contract::new(accel, packet_size);
    let gyro = Contract::new(gyro, packet_size);

    let sample_count = match (accel.latency_us, gyro.latency_us) {
        (None, None) => 0,
        (Some(_), None) => accel.count,
        (None, Some(_)) => gyro.count,
        (Some(latency_accel), Some(latency_gyro)) => {
            let latency = if latency_gyro <= latency_accel {
                latency_gyro - (latency_accel % latency_gyro)
            } else {
                latency_accel - (latency_gyro % latency_accel)
            };
            let period = gyro.period_us.min(accel.period_us);
            (latency / period).max(1)
        }
    };

    WatermarkPlan {
        sample_count,
        byte_threshold: sample_count * packet_size as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Odr;

    const DUAL: usize = FIFO_2SENSORS_PACKET_SIZE;
    const SINGLE: usize = FIFO_1SENSOR_PACKET_SIZE;

    #[test]
    fn documented_example_needs_two_samples() {
        let accel = SensorRateConfig::new(Odr::Hz100, 6);
        let gyro = SensorRateConfig::new(Odr::Hz100, 4);

        let plan = plan(&accel, &gyro, DUAL);

        assert_eq!(plan.sample_count, 2);
        assert_eq!(plan.byte_threshold, 32);
    }

    #[test]
    fn equal_periods_with_dividing_counts_use_smallest() {
        let accel = SensorRateConfig::new(Odr::Hz100, 8);
        let gyro = SensorRateConfig::new(Odr::Hz100, 4);
        assert_eq!(plan(&accel, &gyro, DUAL).sample_count, 4);
        assert_eq!(plan(&gyro, &accel, DUAL).sample_count, 4);
    }

    #[test]
    fn different_periods_count_in_fastest_samples() {
        // 20 ms * 2 == 10 ms * 4: 40 ms of latency, 4 samples of the 100 Hz gyro
        let accel = SensorRateConfig::new(Odr::Hz50, 2);
        let gyro = SensorRateConfig::new(Odr::Hz100, 4);
        let plan = plan(&accel, &gyro, DUAL);
        assert_eq!(plan.sample_count, 4);
        assert_eq!(plan.byte_threshold, 64);
    }

    #[test]
    fn joint_latency_is_cut_to_fit_both() {
        // 625 us divides 640 ms, one 1600 Hz sample
        let accel = SensorRateConfig::new(Odr::Hz1600, 1);
        let gyro = SensorRateConfig::new(Odr::Hz1_5625, 1);
        assert_eq!(plan(&accel, &gyro, DUAL).sample_count, 1);

        // 3 * 10 ms against 4 * 10 ms: 30 - 10 = 20 ms
        let accel = SensorRateConfig::new(Odr::Hz100, 3);
        let gyro = SensorRateConfig::new(Odr::Hz100, 4);
        assert_eq!(plan(&accel, &gyro, DUAL).sample_count, 2);
    }

    #[test]
    fn one_inactive_sensor_yields_the_other_count() {
        let off = SensorRateConfig::disabled(Odr::Hz1600);
        for wm in [1u16, 7, 128, 200, 1000] {
            let on = SensorRateConfig::new(Odr::Hz25, wm);
            assert_eq!(plan(&on, &off, SINGLE).sample_count, truncate(wm, SINGLE));
            assert_eq!(plan(&off, &on, DUAL).sample_count, truncate(wm, DUAL));
        }
    }

    #[test]
    fn both_inactive_is_degenerate_zero() {
        let off = SensorRateConfig::disabled(Odr::Hz100);
        assert_eq!(plan(&off, &off, SINGLE), WatermarkPlan::default());
    }

    #[test]
    fn truncation_floors_to_threshold_capacity() {
        assert_eq!(truncate(300, DUAL), 128);
        assert_eq!(truncate(300, SINGLE), 256);
        assert_eq!(truncate(100, DUAL), 100);
        assert_eq!(truncate(0, DUAL), 0);
        let capped = plan(&SensorRateConfig::new(Odr::Hz100, u16::MAX), &SensorRateConfig::disabled(Odr::Hz100), DUAL);
        assert_eq!(capped.byte_threshold as usize, FIFO_WATERMARK_MAX);
    }

    #[test]
    fn threshold_grows_with_single_contract() {
        let off = SensorRateConfig::disabled(Odr::Hz100);
        let mut last = 0;
        for wm in 0..=400u16 {
            let plan = plan(&SensorRateConfig::new(Odr::Hz200, wm), &off, SINGLE);
            assert!(plan.byte_threshold >= last, "wm {}", wm);
            last = plan.byte_threshold;
        }
    }

    #[test]
    fn threshold_grows_when_counts_stay_multiples() {
        // the other contract is a multiple of every candidate, so the
        // adjusted latency is never cut back
        let gyro = SensorRateConfig::new(Odr::Hz100, 64);
        let mut last = 0;
        for wm in [1u16, 2, 4, 8, 16, 32, 64] {
            let plan = plan(&SensorRateConfig::new(Odr::Hz100, wm), &gyro, DUAL);
            assert!(plan.byte_threshold >= last, "wm {}", wm);
            last = plan.byte_threshold;
        }
    }

    #[test]
    fn packet_size_and_period_follow_mask() {
        let accel = SensorRateConfig::new(Odr::Hz50, 10);
        let gyro = SensorRateConfig::new(Odr::Hz200, 10);
        assert_eq!(packet_size(SensorSet::ACCEL), SINGLE);
        assert_eq!(packet_size(SensorSet::GYRO | SensorSet::TMST_FSYNC), SINGLE);
        assert_eq!(packet_size(SensorSet::ACCEL | SensorSet::GYRO), DUAL);
        assert_eq!(fifo_period_ns(SensorSet::ACCEL, &accel, &gyro), 20_000_000);
        assert_eq!(fifo_period_ns(SensorSet::all(), &accel, &gyro), 5_000_000);
        assert_eq!(fifo_period_ns(SensorSet::empty(), &accel, &gyro), u32::MAX);
    }
}
