use crate::types::TimestampWindow;

/// Hardware clock readable around a drain.
pub trait Clock {
    fn now_ns(&self) -> u64;
}

/// Turns the clock readings taken around a drain into the time span covered
/// by one sensor's records.
pub trait TimestampReconciler {
    /// `fifo_period_ns` is the FIFO base period, `total` the records of the
    /// whole drain and `count` the records carrying this sensor's data.
    fn interrupt(&mut self, fifo_period_ns: u32, total: usize, count: usize, window: TimestampWindow) -> TimestampWindow;

    /// Forgets history, called when the sensor leaves the FIFO.
    fn reset(&mut self);
}

/// Chains batches back to back: each batch starts where the previous one
/// ended and ends at the reading taken before the drain, when the newest
/// record was already latched.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowTimestamp {
    last_ns: Option<u64>,
}

impl WindowTimestamp {
    pub fn last_ns(&self) -> Option<u64> {
        self.last_ns
    }
}

impl TimestampReconciler for WindowTimestamp {
    fn interrupt(&mut self, fifo_period_ns: u32, total: usize, _count: usize, window: TimestampWindow) -> TimestampWindow {
        let end = window.start_ns;
        let start = match self.last_ns {
            Some(last) if last < end => last,
            _ => end.saturating_sub(u64::from(fifo_period_ns).saturating_mul(total as u64)),
        };
        self.last_ns = Some(end);
        TimestampWindow::new(start, end)
    }

    fn reset(&mut self) {
        self.last_ns = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_batch_is_backdated_by_fifo_period() {
        let mut ts = WindowTimestamp::default();
        let window = ts.interrupt(10_000_000, 4, 4, TimestampWindow::new(100_000_000, 100_500_000));
        assert_eq!(window, TimestampWindow::new(60_000_000, 100_000_000));
    }

    #[test]
    fn following_batches_chain() {
        let mut ts = WindowTimestamp::default();
        ts.interrupt(10_000_000, 4, 4, TimestampWindow::new(100_000_000, 100_500_000));
        let window = ts.interrupt(10_000_000, 4, 2, TimestampWindow::new(140_000_000, 140_300_000));
        assert_eq!(window, TimestampWindow::new(100_000_000, 140_000_000));

        ts.reset();
        assert_eq!(ts.last_ns(), None);
        let window = ts.interrupt(10_000_000, 1, 1, TimestampWindow::new(150_000_000, 150_100_000));
        assert_eq!(window.start_ns, 140_000_000);
    }

    #[test]
    fn clock_going_backwards_restarts_chain() {
        let mut ts = WindowTimestamp::default();
        ts.interrupt(1_000, 1, 1, TimestampWindow::new(5_000, 6_000));
        let window = ts.interrupt(1_000, 2, 2, TimestampWindow::new(4_000, 4_500));
        assert_eq!(window, TimestampWindow::new(2_000, 4_000));
    }

    #[test]
    fn idle_fifo_period_saturates() {
        let mut ts = WindowTimestamp::default();
        let window = ts.interrupt(u32::MAX, 3, 0, TimestampWindow::new(10, 20));
        assert_eq!(window, TimestampWindow::new(0, 10));
    }
}
