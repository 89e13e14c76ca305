/// Keeps the device powered while the FIFO streams.
pub trait PowerControl {
    fn acquire(&self);
    fn release(&self);
}

impl<P: PowerControl + ?Sized> PowerControl for &P {
    fn acquire(&self) {
        (**self).acquire()
    }

    fn release(&self) {
        (**self).release()
    }
}

/// For boards where the device is always powered.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOn;

impl PowerControl for AlwaysOn {
    fn acquire(&self) {}
    fn release(&self) {}
}

/// Releases a power reference when dropped unless told to keep it.
pub struct PowerGuard<'a, P: PowerControl> {
    power: &'a P,
    armed: bool,
}

impl<'a, P: PowerControl> PowerGuard<'a, P> {
    pub fn acquire(power: &'a P) -> Self {
        power.acquire();
        Self { power, armed: true }
    }

    /// Takes over a reference acquired by an earlier guard that was kept.
    pub fn adopt(power: &'a P) -> Self {
        Self { power, armed: true }
    }

    /// Leaves the reference held after the guard goes away.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl<P: PowerControl> Drop for PowerGuard<'_, P> {
    fn drop(&mut self) {
        if self.armed {
            self.power.release();
        }
    }
}
