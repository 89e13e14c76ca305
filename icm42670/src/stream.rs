//! Reference-counted lifecycle of the shared FIFO.
//!
//! The accelerometer and gyroscope are independent consumers of one FIFO.
//! The first consumer to enable switches the FIFO from bypass to stream
//! mode, the last one to disable switches it back. Every transition runs
//! inside one critical section together with the drain path, so a watermark
//! interrupt never observes a half applied configuration. Settling delays
//! run after the critical section is left.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};

use crate::configs::*;
use crate::drain::{read_fifo_count, DrainResult, FifoBuffer};
use crate::power::{PowerControl, PowerGuard};
use crate::registers::*;
use crate::sink::SampleSink;
use crate::timestamp::{Clock, TimestampReconciler, WindowTimestamp};
use crate::transport::RegisterTransport;
use crate::types::{FifoEnableMask, SampleBatch, Sensor, SensorRateConfig, SensorSet, TimestampWindow};
use crate::watermark::{self, fifo_period_ns, packet_size, WatermarkPlan};
use crate::Error;

const FIFO_EN_MASK: u8 = FifoConfig5Flags::FIFO_TMST_FSYNC_EN.bits()
    | FifoConfig5Flags::FIFO_GYRO_EN.bits()
    | FifoConfig5Flags::FIFO_ACCEL_EN.bits();

/// Batches are handed out gyroscope first.
const EMIT_ORDER: [Sensor; 2] = [Sensor::Gyro, Sensor::Accel];

/// Software view of the FIFO, only changed once a transition fully succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleState {
    /// Consumers holding the FIFO in stream mode.
    pub refs: u8,
    /// Which consumers those are.
    pub active: SensorSet,
    /// Sources currently writing into the FIFO.
    pub fifo_en: FifoEnableMask,
    /// Programmed watermark, in bytes.
    pub byte_threshold: u32,
    /// FIFO base period, `u32::MAX` with no source enabled.
    pub period_ns: u32,
}

impl LifecycleState {
    pub const fn new() -> Self {
        Self {
            refs: 0,
            active: SensorSet::empty(),
            fifo_en: SensorSet::empty(),
            byte_threshold: 0,
            period_ns: u32::MAX,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.refs > 0
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

/// What is left to do once the critical section of a disable is left.
struct Teardown<E> {
    sleep_ms: u32,
    result: Result<(), E>,
}

/// Registers an enable may change beyond the FIFO enable bits and the
/// watermark, read before it starts.
struct SavedRegisters {
    int_source0: u8,
    fifo_config1: u8,
    pwr_mgmt0: u8,
    odr_config: u8,
}

/// Everything the critical section protects.
struct Device<T, R> {
    transport: T,
    state: LifecycleState,
    accel: SensorRateConfig,
    gyro: SensorRateConfig,
    fifo: FifoBuffer,
    accel_ts: R,
    gyro_ts: R,
}

impl<T: RegisterTransport, R: TimestampReconciler> Device<T, R> {
    fn apply_config(&mut self, config: &[RegConfig<UnifiedRegister>]) -> Result<(), T::Error> {
        for entry in config {
            let addr = entry.reg.addr();
            match entry.op {
                RegOp::Write => {
                    trace!("write_reg {:<21}({:#04X}) = {:#04x}", entry.reg.name(), addr, entry.value);
                    self.transport.write_reg(entry.reg, entry.value)?;
                }
                RegOp::Read => {
                    let data = self.transport.read_reg(entry.reg)?;
                    trace!("read_reg {:<21}({:#04X}) = {:#04x}", entry.reg.name(), addr, data);
                }
                RegOp::Update { mask } => {
                    let update = self.transport.update_bits(entry.reg, mask, entry.value)?;
                    trace!(
                        "update_reg {:<21}({:#04X}) = {:#04x} (was {:#04x})",
                        entry.reg.name(),
                        addr,
                        update.applied,
                        update.previous
                    );
                }
            }
        }
        Ok(())
    }

    fn rate(&self, sensor: Sensor) -> &SensorRateConfig {
        match sensor {
            Sensor::Accel => &self.accel,
            Sensor::Gyro => &self.gyro,
        }
    }

    fn rate_mut(&mut self, sensor: Sensor) -> &mut SensorRateConfig {
        match sensor {
            Sensor::Accel => &mut self.accel,
            Sensor::Gyro => &mut self.gyro,
        }
    }

    fn timestamp_mut(&mut self, sensor: Sensor) -> &mut R {
        match sensor {
            Sensor::Accel => &mut self.accel_ts,
            Sensor::Gyro => &mut self.gyro_ts,
        }
    }

    fn init(&mut self) -> Result<(), T::Error> {
        self.apply_config(CONFIG_FIFO_INIT)?;
        self.state.fifo_en = SensorSet::empty();
        self.state.period_ns = u32::MAX;
        debug!("FIFO initialized");
        Ok(())
    }

    fn set_fifo_en(&mut self, mask: FifoEnableMask) -> Result<(), T::Error> {
        self.transport
            .update_bits(Mreg1Reg::FifoConfig5.into(), FIFO_EN_MASK, mask.bits() & FIFO_EN_MASK)?;
        self.state.fifo_en = mask;
        self.state.period_ns = fifo_period_ns(mask, &self.accel, &self.gyro);
        Ok(())
    }

    fn update_watermark(&mut self) -> Result<WatermarkPlan, T::Error> {
        // sensors not writing into the FIFO have no latency contract
        let mut accel = self.accel;
        let mut gyro = self.gyro;
        if !self.state.fifo_en.contains(SensorSet::ACCEL) {
            accel.watermark = 0;
        }
        if !self.state.fifo_en.contains(SensorSet::GYRO) {
            gyro.watermark = 0;
        }
        let plan = watermark::plan(&accel, &gyro, packet_size(self.state.fifo_en));

        // the threshold must not change while its interrupt is armed
        let int = IntSource0Flags::FIFO_THS_INT1_EN.bits();
        let masked = self.transport.update_bits(Bank0Reg::IntSource0.into(), int, 0)?;
        let raw = (plan.byte_threshold as u16).to_le_bytes();
        let written = self.transport.write(Bank0Reg::FifoConfig2.into(), &raw);
        if masked.changed() {
            self.transport.update_bits(Bank0Reg::IntSource0.into(), int, int)?;
        }
        written?;

        self.state.byte_threshold = plan.byte_threshold;
        debug!("watermark {} samples, {} bytes", plan.sample_count, plan.byte_threshold);
        Ok(plan)
    }

    fn write_odr(&mut self, sensor: Sensor) -> Result<(), T::Error> {
        let reg = Self::odr_register(sensor);
        let odr = (self.rate(sensor).odr as u8) << CONFIG0_ODR_LOC;
        self.transport.update_bits(reg.into(), CONFIG0_ODR_MASK, odr)?;
        Ok(())
    }

    /// Returns the settling time the change needs.
    fn set_sensor_power(&mut self, sensor: Sensor, on: bool) -> Result<u32, T::Error> {
        let (mask, loc, startup_ms, stop_ms) = match sensor {
            Sensor::Accel => (
                PWR_MGMT0_ACCEL_MODE_MASK,
                PWR_MGMT0_ACCEL_MODE_LOC,
                ACCEL_STARTUP_TIME_MS,
                ACCEL_STOP_TIME_MS,
            ),
            Sensor::Gyro => (
                PWR_MGMT0_GYRO_MODE_MASK,
                PWR_MGMT0_GYRO_MODE_LOC,
                GYRO_STARTUP_TIME_MS,
                GYRO_STOP_TIME_MS,
            ),
        };
        let mode = if on { SensorMode::LowNoise } else { SensorMode::Off };
        let update = self
            .transport
            .update_bits(Bank0Reg::PwrMgmt0.into(), mask, (mode as u8) << loc)?;
        Ok(match (update.changed(), on) {
            (false, _) => 0,
            (true, true) => startup_ms,
            (true, false) => stop_ms,
        })
    }

    fn set_temperature(&mut self, on: bool) -> Result<u32, T::Error> {
        let temp_dis = PwrMgmt0Flags::TEMP_DIS.bits();
        let value = if on { 0 } else { temp_dis };
        let update = self.transport.update_bits(Bank0Reg::PwrMgmt0.into(), temp_dis, value)?;
        Ok(match (update.changed(), on) {
            (false, _) => 0,
            (true, true) => TEMP_STARTUP_TIME_MS,
            (true, false) => TEMP_STOP_TIME_MS,
        })
    }

    fn stream_on(&mut self) -> Result<(), T::Error> {
        self.apply_config(CONFIG_FIFO_STREAM_ON)?;
        // the first count read after leaving bypass reads back 0
        read_fifo_count(&mut self.transport)?;
        self.apply_config(CONFIG_FSYNC_FALLING_EDGE)
    }

    /// `Ok(None)` when the consumer already holds a reference.
    fn enable(&mut self, sensor: Sensor) -> Result<Option<u32>, Error<T::Error>> {
        if self.state.active.contains(sensor.into()) {
            debug!("{} already enabled", sensor.name());
            return Ok(None);
        }

        let saved = self.state;
        let registers = self.save_registers(sensor).map_err(Error::Transport)?;
        match self.try_enable(sensor) {
            Ok(sleep_ms) => {
                debug!("{} enabled, {} consumer(s)", sensor.name(), self.state.refs);
                Ok(Some(sleep_ms))
            }
            Err(err) => {
                warn!("{} enable failed: {:?}", sensor.name(), err);
                self.state = saved;
                self.restore_registers(sensor, &registers);
                Err(Error::Transport(err))
            }
        }
    }

    fn odr_register(sensor: Sensor) -> Bank0Reg {
        match sensor {
            Sensor::Accel => Bank0Reg::AccelConfig0,
            Sensor::Gyro => Bank0Reg::GyroConfig0,
        }
    }

    fn save_registers(&mut self, sensor: Sensor) -> Result<SavedRegisters, T::Error> {
        Ok(SavedRegisters {
            int_source0: self.transport.read_reg(Bank0Reg::IntSource0.into())?,
            fifo_config1: self.transport.read_reg(Bank0Reg::FifoConfig1.into())?,
            pwr_mgmt0: self.transport.read_reg(Bank0Reg::PwrMgmt0.into())?,
            odr_config: self.transport.read_reg(Self::odr_register(sensor).into())?,
        })
    }

    /// Puts back what a failed enable touched, going on past failures.
    /// `self.state` must already hold the state to return to.
    fn restore_registers(&mut self, sensor: Sensor, saved: &SavedRegisters) {
        // interrupt first, so the watermark below is rewritten with it in
        // its saved arming state
        self.restore_reg(Bank0Reg::IntSource0.into(), 0xFF, saved.int_source0);
        let fifo_en = self.state.fifo_en.bits() & FIFO_EN_MASK;
        self.restore_reg(Mreg1Reg::FifoConfig5.into(), FIFO_EN_MASK, fifo_en);
        if let Err(err) = self.update_watermark() {
            warn!("watermark rollback failed: {:?}", err);
        }
        self.restore_reg(Bank0Reg::PwrMgmt0.into(), 0xFF, saved.pwr_mgmt0);
        self.restore_reg(Self::odr_register(sensor).into(), 0xFF, saved.odr_config);
        self.restore_reg(Bank0Reg::FifoConfig1.into(), 0xFF, saved.fifo_config1);
    }

    fn restore_reg(&mut self, reg: UnifiedRegister, mask: u8, value: u8) {
        if let Err(err) = self.transport.update_bits(reg, mask, value) {
            warn!("rollback of {} failed: {:?}", reg.name(), err);
        }
    }

    fn try_enable(&mut self, sensor: Sensor) -> Result<u32, T::Error> {
        let bit = SensorSet::from(sensor);
        let mut sleep_ms = self.set_temperature(true)?;

        self.set_fifo_en(self.state.fifo_en | bit)?;
        self.update_watermark()?;
        self.write_odr(sensor)?;
        sleep_ms = sleep_ms.max(self.set_sensor_power(sensor, true)?);

        if self.state.refs == 0 {
            self.stream_on()?;
            debug!("FIFO streaming");
        }
        self.state.refs += 1;
        self.state.active |= bit;
        Ok(sleep_ms)
    }

    fn disable(&mut self, sensor: Sensor) -> Result<Teardown<T::Error>, Error<T::Error>> {
        if self.state.refs == 0 || !self.state.active.contains(sensor.into()) {
            warn!("{} disabled without a reference", sensor.name());
            return Err(Error::InvalidConsumer(sensor));
        }

        if self.state.refs == 1 {
            self.apply_config(CONFIG_FIFO_STREAM_OFF).map_err(Error::Transport)?;
            debug!("FIFO bypassed");
        }
        self.state.refs -= 1;
        self.state.active.remove(sensor.into());

        let mut teardown = Teardown { sleep_ms: 0, result: Ok(()) };
        teardown.result = self.release_sensor(sensor, &mut teardown.sleep_ms);
        if let Err(err) = &teardown.result {
            warn!("{} release incomplete: {:?}", sensor.name(), err);
        }
        debug!("{} disabled, {} consumer(s)", sensor.name(), self.state.refs);
        Ok(teardown)
    }

    fn release_sensor(&mut self, sensor: Sensor, sleep_ms: &mut u32) -> Result<(), T::Error> {
        self.timestamp_mut(sensor).reset();
        self.set_fifo_en(self.state.fifo_en - SensorSet::from(sensor))?;
        self.update_watermark()?;
        *sleep_ms = self.set_sensor_power(sensor, false)?;
        if self.state.refs == 0 {
            *sleep_ms = (*sleep_ms).max(self.set_temperature(false)?);
        }
        Ok(())
    }

    fn set_rate(&mut self, sensor: Sensor, config: SensorRateConfig) -> Result<(), T::Error> {
        let saved = (*self.rate(sensor), self.state);
        *self.rate_mut(sensor) = config;
        if !self.state.fifo_en.contains(sensor.into()) {
            return Ok(());
        }

        let result = self.apply_rate(sensor);
        if let Err(err) = &result {
            warn!("{} rate change failed: {:?}", sensor.name(), err);
            *self.rate_mut(sensor) = saved.0;
            self.state = saved.1;
            if let Err(err) = self.write_odr(sensor) {
                warn!("{} ODR rollback failed: {:?}", sensor.name(), err);
            }
            if let Err(err) = self.update_watermark() {
                warn!("watermark rollback failed: {:?}", err);
            }
        }
        result
    }

    fn apply_rate(&mut self, sensor: Sensor) -> Result<(), T::Error> {
        self.write_odr(sensor)?;
        self.state.period_ns = fifo_period_ns(self.state.fifo_en, &self.accel, &self.gyro);
        self.update_watermark()?;
        Ok(())
    }

    fn emit<S: SampleSink>(&mut self, result: &DrainResult, window: TimestampWindow, sink: &mut S) {
        let period_ns = self.state.period_ns;
        for sensor in EMIT_ORDER {
            let record_count = result.count(sensor);
            if record_count == 0 {
                continue;
            }
            let window = self
                .timestamp_mut(sensor)
                .interrupt(period_ns, result.total, record_count, window);
            let batch = SampleBatch { sensor, record_count, window };
            sink.push_batch(&batch, self.fifo.records());
        }
    }
}

/// Shared FIFO of an ICM-42670 with its accelerometer and gyroscope consumers.
pub struct Icm42670Fifo<T, P, C, R = WindowTimestamp> {
    device: Mutex<RefCell<Device<T, R>>>,
    power: P,
    clock: C,
}

impl<T, P, C> Icm42670Fifo<T, P, C> {
    pub fn new(transport: T, power: P, clock: C) -> Self {
        Self::with_reconcilers(transport, power, clock, WindowTimestamp::default(), WindowTimestamp::default())
    }
}

impl<T, P, C, R> Icm42670Fifo<T, P, C, R> {
    pub fn with_reconcilers(transport: T, power: P, clock: C, accel_ts: R, gyro_ts: R) -> Self {
        Self {
            device: Mutex::new(RefCell::new(Device {
                transport,
                state: LifecycleState::new(),
                accel: SensorRateConfig::default(),
                gyro: SensorRateConfig::default(),
                fifo: FifoBuffer::new(),
                accel_ts,
                gyro_ts,
            })),
            power,
            clock,
        }
    }

    pub fn destroy(self) -> T {
        self.device.into_inner().into_inner().transport
    }
}

impl<T, P, C, R> Icm42670Fifo<T, P, C, R>
where
    T: RegisterTransport,
    P: PowerControl,
    C: Clock,
    R: TimestampReconciler,
{
    fn locked<F, O>(&self, f: F) -> O
    where
        F: FnOnce(&mut Device<T, R>) -> O,
    {
        critical_section::with(|cs| {
            let mut device = self.device.borrow(cs).borrow_mut();
            f(&mut device)
        })
    }

    /// Runs `f` on the transport while holding the device lock.
    pub fn with_transport<F, O>(&self, f: F) -> O
    where
        F: FnOnce(&mut T) -> O,
    {
        self.locked(|device| f(&mut device.transport))
    }

    pub fn state(&self) -> LifecycleState {
        self.locked(|device| device.state)
    }

    pub fn rate(&self, sensor: Sensor) -> SensorRateConfig {
        self.locked(|device| *device.rate(sensor))
    }

    /// Applies the FIFO defaults: byte count in big endian, snapshot mode,
    /// every source disabled.
    pub fn init(&self) -> Result<(), Error<T::Error>> {
        self.locked(|device| device.init()).map_err(Error::Transport)
    }

    /// Sets the rate and watermark of a sensor, reprogramming the hardware
    /// right away if the sensor is writing into the FIFO.
    pub fn set_rate(&self, sensor: Sensor, config: SensorRateConfig) -> Result<(), Error<T::Error>> {
        self.locked(|device| device.set_rate(sensor, config))
            .map_err(Error::Transport)
    }

    /// Selects the sources writing into the FIFO, independent of consumers.
    pub fn set_fifo_enable(&self, mask: FifoEnableMask) -> Result<(), Error<T::Error>> {
        self.locked(|device| device.set_fifo_en(mask))
            .map_err(Error::Transport)
    }

    /// Recomputes and programs the watermark for the current sources.
    pub fn update_watermark(&self) -> Result<WatermarkPlan, Error<T::Error>> {
        self.locked(|device| device.update_watermark())
            .map_err(Error::Transport)
    }

    /// Takes a FIFO reference for `sensor`.
    ///
    /// Each sensor holds at most one reference, so the count is the number of
    /// enabled sensors. Enabling a sensor that already holds one succeeds
    /// without changing the count or the hardware. A failed enable puts back
    /// every register it changed, except the FIFO flush.
    pub fn enable<D: DelayNs>(&self, sensor: Sensor, delay: &mut D) -> Result<(), Error<T::Error>> {
        let power = PowerGuard::acquire(&self.power);
        match self.locked(|device| device.enable(sensor))? {
            Some(sleep_ms) => {
                power.keep();
                if sleep_ms > 0 {
                    delay.delay_ms(sleep_ms);
                }
            }
            None => drop(power),
        }
        Ok(())
    }

    /// Drops the FIFO reference of `sensor`. Once the reference is gone the
    /// power reference is released even if part of the teardown failed.
    pub fn disable<D: DelayNs>(&self, sensor: Sensor, delay: &mut D) -> Result<(), Error<T::Error>> {
        let teardown = self.locked(|device| device.disable(sensor))?;
        let _power = PowerGuard::adopt(&self.power);
        if teardown.sleep_ms > 0 {
            delay.delay_ms(teardown.sleep_ms);
        }
        teardown.result.map_err(Error::Transport)
    }

    /// Reads the FIFO into the local buffer without reporting batches.
    pub fn drain(&self, max_records: usize) -> Result<DrainResult, Error<T::Error>> {
        self.locked(|device| {
            let mask = device.state.fifo_en;
            device.fifo.drain(&mut device.transport, mask, max_records)
        })
        .map_err(Error::Transport)
    }

    /// Drains up to `max_records` records (0 for all) and hands one batch per
    /// sensor with data to `sink`.
    pub fn flush_hw_fifo<S: SampleSink>(&self, max_records: usize, sink: &mut S) -> Result<DrainResult, Error<T::Error>> {
        self.locked(|device| -> Result<DrainResult, Error<T::Error>> {
            let mask = device.state.fifo_en;
            let start_ns = self.clock.now_ns();
            let result = device
                .fifo
                .drain(&mut device.transport, mask, max_records)
                .map_err(Error::Transport)?;
            let end_ns = self.clock.now_ns();
            if result.total > 0 {
                device.emit(&result, TimestampWindow::new(start_ns, end_ns), sink);
            }
            Ok(result)
        })
    }

    /// Watermark interrupt handler.
    pub fn handle_watermark<S: SampleSink>(&self, sink: &mut S) -> Result<DrainResult, Error<T::Error>> {
        self.flush_hw_fifo(0, sink)
    }
}
