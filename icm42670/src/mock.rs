//! In-memory register file standing in for the device in unit tests.

use std::collections::{HashMap, VecDeque};
use std::vec::Vec;

use crate::packet::{FifoHeader, FIFO_1SENSOR_PACKET_SIZE, FIFO_2SENSORS_PACKET_SIZE};
use crate::registers::*;
use crate::transport::RegisterTransport;
use crate::types::Axes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Read(UnifiedRegister, usize),
    Write(UnifiedRegister, Vec<u8>),
    ReadNoinc(UnifiedRegister, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Read,
    Write,
    ReadNoinc,
}

#[derive(Default)]
pub struct MockTransport {
    regs: HashMap<(bool, u8), u8>,
    pub fifo: VecDeque<u8>,
    /// Overrides the FIFO count register, otherwise the queued byte count.
    pub fifo_count: Option<u16>,
    pub ops: Vec<Op>,
    failures: Vec<(OpKind, UnifiedRegister)>,
}

fn key(reg: UnifiedRegister, offset: usize) -> (bool, u8) {
    let mreg = matches!(reg, UnifiedRegister::Mreg1(_));
    (mreg, reg.addr().wrapping_add(offset as u8))
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reg(&self, reg: impl Into<UnifiedRegister>) -> u8 {
        self.regs.get(&key(reg.into(), 0)).copied().unwrap_or(0)
    }

    pub fn set_reg(&mut self, reg: impl Into<UnifiedRegister>, value: u8) {
        self.regs.insert(key(reg.into(), 0), value);
    }

    pub fn push_fifo(&mut self, bytes: &[u8]) {
        self.fifo.extend(bytes.iter().copied());
    }

    pub fn fail_on(&mut self, kind: OpKind, reg: impl Into<UnifiedRegister>) {
        self.failures.push((kind, reg.into()));
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub fn bulk_reads(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, Op::ReadNoinc(..))).count()
    }

    pub fn writes_to(&self, reg: impl Into<UnifiedRegister>) -> Vec<Vec<u8>> {
        let reg = reg.into();
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Write(r, data) if *r == reg => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    fn check(&self, kind: OpKind, reg: UnifiedRegister) -> Result<(), MockError> {
        if self.failures.iter().any(|(k, r)| *k == kind && *r == reg) {
            return Err(MockError);
        }
        Ok(())
    }

    fn count(&self) -> u16 {
        self.fifo_count.unwrap_or(self.fifo.len() as u16)
    }
}

impl RegisterTransport for MockTransport {
    type Error = MockError;

    fn read(&mut self, reg: UnifiedRegister, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.ops.push(Op::Read(reg, buf.len()));
        self.check(OpKind::Read, reg)?;
        if reg == UnifiedRegister::Bank0(Bank0Reg::FifoCountH) {
            let count = self.count().to_be_bytes();
            for (byte, value) in buf.iter_mut().zip(count.iter()) {
                *byte = *value;
            }
            return Ok(());
        }
        for (offset, byte) in buf.iter_mut().enumerate() {
            *byte = self.regs.get(&key(reg, offset)).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn write(&mut self, reg: UnifiedRegister, data: &[u8]) -> Result<(), Self::Error> {
        self.ops.push(Op::Write(reg, data.to_vec()));
        self.check(OpKind::Write, reg)?;
        for (offset, value) in data.iter().enumerate() {
            self.regs.insert(key(reg, offset), *value);
        }
        if reg == UnifiedRegister::Bank0(Bank0Reg::SignalPathReset)
            && data.first().map_or(false, |v| v & SignalPathResetFlags::FIFO_FLUSH.bits() != 0)
        {
            self.fifo.clear();
            self.fifo_count = None;
        }
        Ok(())
    }

    fn read_noinc(&mut self, reg: UnifiedRegister, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.ops.push(Op::ReadNoinc(reg, buf.len()));
        self.check(OpKind::ReadNoinc, reg)?;
        for byte in buf.iter_mut() {
            *byte = self.fifo.pop_front().unwrap_or(0);
        }
        Ok(())
    }
}

fn axes_bytes(axes: Axes, out: &mut [u8]) {
    for (i, axis) in axes.iter().enumerate() {
        out[2 * i..2 * i + 2].copy_from_slice(&axis.to_be_bytes());
    }
}

pub fn dual_record(accel: Axes, gyro: Axes) -> [u8; FIFO_2SENSORS_PACKET_SIZE] {
    let mut out = [0u8; FIFO_2SENSORS_PACKET_SIZE];
    out[0] = (FifoHeader::ACCEL | FifoHeader::GYRO).bits();
    axes_bytes(accel, &mut out[1..7]);
    axes_bytes(gyro, &mut out[7..13]);
    out[13] = 24;
    out
}

pub fn accel_record(accel: Axes) -> [u8; FIFO_1SENSOR_PACKET_SIZE] {
    let mut out = [0u8; FIFO_1SENSOR_PACKET_SIZE];
    out[0] = FifoHeader::ACCEL.bits();
    axes_bytes(accel, &mut out[1..7]);
    out
}

pub fn gyro_record(gyro: Axes) -> [u8; FIFO_1SENSOR_PACKET_SIZE] {
    let mut out = [0u8; FIFO_1SENSOR_PACKET_SIZE];
    out[0] = FifoHeader::GYRO.bits();
    axes_bytes(gyro, &mut out[1..7]);
    out
}
