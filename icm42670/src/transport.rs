use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::registers::*;

pub const DEFAULT_ADDRESS: u8 = 0x68;

/// Settle time after every indirect MREG access.
const MREG_SETTLE_US: u32 = 10;
const MREG1_BLOCK: u8 = 0x00;

/// Bytes written per I2C frame, register address excluded.
const WRITE_CHUNK: usize = 8;
const WRITE_FRAME: usize = WRITE_CHUNK + 1;

/// Outcome of a read-modify-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitsUpdate {
    pub previous: u8,
    pub applied: u8,
}

impl BitsUpdate {
    pub fn changed(&self) -> bool {
        self.previous != self.applied
    }
}

/// Synchronous register access to the device.
///
/// Errors are passed through unchanged; nothing in this crate retries.
pub trait RegisterTransport {
    type Error: Debug;

    /// Reads `buf.len()` consecutive registers starting at `reg`.
    fn read(&mut self, reg: UnifiedRegister, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes `data` to consecutive registers starting at `reg`.
    fn write(&mut self, reg: UnifiedRegister, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads `buf.len()` bytes from the single address `reg` (FIFO port).
    fn read_noinc(&mut self, reg: UnifiedRegister, buf: &mut [u8]) -> Result<(), Self::Error>;

    fn read_reg(&mut self, reg: UnifiedRegister) -> Result<u8, Self::Error> {
        let mut buf = [0u8];
        self.read(reg, &mut buf)?;
        Ok(buf[0])
    }

    fn write_reg(&mut self, reg: UnifiedRegister, value: u8) -> Result<(), Self::Error> {
        self.write(reg, &[value])
    }

    /// Replaces the bits selected by `mask` with those of `value`. The
    /// register is only written when its content changes.
    fn update_bits(&mut self, reg: UnifiedRegister, mask: u8, value: u8) -> Result<BitsUpdate, Self::Error> {
        let previous = self.read_reg(reg)?;
        let applied = (previous & !mask) | (value & mask);
        if applied != previous {
            self.write_reg(reg, applied)?;
        }
        Ok(BitsUpdate { previous, applied })
    }
}

/// I2C register transport with indirect MREG1 access.
pub struct I2cTransport<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C, D> I2cTransport<I2C, D> {
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self { i2c, delay, address }
    }

    pub fn default(i2c: I2C, delay: D) -> Self {
        Self::new(i2c, delay, DEFAULT_ADDRESS)
    }

    pub fn i2c(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    pub fn destroy(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

impl<I2C, D> I2cTransport<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    fn mreg_read(&mut self, addr: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0u8];
        self.i2c.write(self.address, &[Bank0Reg::BlkSelR.addr(), MREG1_BLOCK])?;
        self.i2c.write(self.address, &[Bank0Reg::MaddrR.addr(), addr])?;
        self.delay.delay_us(MREG_SETTLE_US);
        self.i2c.write_read(self.address, &[Bank0Reg::MR.addr()], &mut buf)?;
        self.delay.delay_us(MREG_SETTLE_US);
        Ok(buf[0])
    }

    fn mreg_write(&mut self, addr: u8, value: u8) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, &[Bank0Reg::BlkSelW.addr(), MREG1_BLOCK])?;
        self.i2c.write(self.address, &[Bank0Reg::MaddrW.addr(), addr])?;
        self.i2c.write(self.address, &[Bank0Reg::MW.addr(), value])?;
        self.delay.delay_us(MREG_SETTLE_US);
        Ok(())
    }
}

impl<I2C, D> RegisterTransport for I2cTransport<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    type Error = I2C::Error;

    fn read(&mut self, reg: UnifiedRegister, buf: &mut [u8]) -> Result<(), Self::Error> {
        match reg {
            UnifiedRegister::Bank0(r) => self.i2c.write_read(self.address, &[r.addr()], buf),
            UnifiedRegister::Mreg1(r) => {
                for (offset, byte) in buf.iter_mut().enumerate() {
                    *byte = self.mreg_read(r.addr().wrapping_add(offset as u8))?;
                }
                Ok(())
            }
        }
    }

    fn write(&mut self, reg: UnifiedRegister, data: &[u8]) -> Result<(), Self::Error> {
        match reg {
            UnifiedRegister::Bank0(r) => {
                for (index, chunk) in data.chunks(WRITE_CHUNK).enumerate() {
                    let mut frame = [0u8; WRITE_FRAME];
                    frame[0] = r.addr().wrapping_add((index * WRITE_CHUNK) as u8);
                    frame[1..=chunk.len()].copy_from_slice(chunk);
                    self.i2c.write(self.address, &frame[..=chunk.len()])?;
                }
                Ok(())
            }
            UnifiedRegister::Mreg1(r) => {
                for (offset, value) in data.iter().enumerate() {
                    self.mreg_write(r.addr().wrapping_add(offset as u8), *value)?;
                }
                Ok(())
            }
        }
    }

    fn read_noinc(&mut self, reg: UnifiedRegister, buf: &mut [u8]) -> Result<(), Self::Error> {
        match reg {
            // FIFO_DATA does not advance the register pointer
            UnifiedRegister::Bank0(r) => self.i2c.write_read(self.address, &[r.addr()], buf),
            UnifiedRegister::Mreg1(r) => {
                for byte in buf.iter_mut() {
                    *byte = self.mreg_read(r.addr())?;
                }
                Ok(())
            }
        }
    }
}
