use bitflags::bitflags;

use paste::paste;

macro_rules! registers {
    (
        $enum_name:ident, $slice_name:ident {
            $($name:ident = $val:expr),* $(,)?
        }
    ) => {
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum $enum_name {
            $($name = $val),*
        }

        pub const $slice_name: &[$enum_name] = &[
            $($enum_name::$name),*
        ];

        impl $enum_name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($enum_name::$name => stringify!($name),)*
                }
            }
        }

        impl Register for $enum_name {
            fn addr(self) -> u8 {
                self as u8
            }
        }

        impl NamedRegister for $enum_name {
            fn name(&self) -> &'static str {
                self.name()
            }
        }

        impl From<$enum_name> for u8 {
            fn from(r: $enum_name) -> u8 {
                r as u8
            }
        }

        paste! {
            #[allow(non_snake_case)]
            pub fn [<$enum_name _Stringify_From_u8>](value: u8) -> Option<&'static str> {
                $slice_name.iter().find(|r| r.addr() == value).map(|r| r.name())
            }
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegOp {
    Read,
    Write,
    /// Read-modify-write of the bits selected by `mask`.
    Update { mask: u8 },
}

pub trait NamedRegister: Register {
    fn name(&self) -> &'static str;
}

pub trait Register: Copy {
    fn addr(self) -> u8;
}

pub struct RegConfig<R: Register> {
    pub op: RegOp,
    pub reg: R,
    pub value: u8,
}

/// Register banks reachable from the serial interface.
///
/// Bank 0 registers are addressed directly. MREG1 registers sit behind the
/// `BLK_SEL`/`MADDR`/`M_R`/`M_W` indirection and need a short settle time
/// after each access.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnifiedRegister {
    Bank0(Bank0Reg),
    Mreg1(Mreg1Reg),
}

impl Register for UnifiedRegister {
    fn addr(self) -> u8 {
        match self {
            UnifiedRegister::Bank0(r) => r.addr(),
            UnifiedRegister::Mreg1(r) => r.addr(),
        }
    }
}

impl NamedRegister for UnifiedRegister {
    fn name(&self) -> &'static str {
        match self {
            UnifiedRegister::Bank0(r) => r.name(),
            UnifiedRegister::Mreg1(r) => r.name(),
        }
    }
}

impl From<Bank0Reg> for UnifiedRegister {
    fn from(r: Bank0Reg) -> Self {
        UnifiedRegister::Bank0(r)
    }
}

impl From<Mreg1Reg> for UnifiedRegister {
    fn from(r: Mreg1Reg) -> Self {
        UnifiedRegister::Mreg1(r)
    }
}

registers! {
    Bank0Reg, BANK0_REGS {
        MclkRdy                 = 0x00,
        DeviceConfig            = 0x01,
        SignalPathReset         = 0x02,
        DriveConfig1            = 0x03,
        DriveConfig2            = 0x04,
        DriveConfig3            = 0x05,
        IntConfig               = 0x06,
        TempData1               = 0x09,
        TempData0               = 0x0A,
        AccelDataX1             = 0x0B,
        AccelDataX0             = 0x0C,
        AccelDataY1             = 0x0D,
        AccelDataY0             = 0x0E,
        AccelDataZ1             = 0x0F,
        AccelDataZ0             = 0x10,
        GyroDataX1              = 0x11,
        GyroDataX0              = 0x12,
        GyroDataY1              = 0x13,
        GyroDataY0              = 0x14,
        GyroDataZ1              = 0x15,
        GyroDataZ0              = 0x16,
        TmstFsynch              = 0x17,
        TmstFsyncl              = 0x18,
        ApexData4               = 0x1D,
        ApexData5               = 0x1E,
        PwrMgmt0                = 0x1F,
        GyroConfig0             = 0x20,
        AccelConfig0            = 0x21,
        TempConfig0             = 0x22,
        GyroConfig1             = 0x23,
        AccelConfig1            = 0x24,
        ApexConfig0             = 0x25,
        ApexConfig1             = 0x26,
        WomConfig               = 0x27,
        FifoConfig1             = 0x28,
        FifoConfig2             = 0x29,
        FifoConfig3             = 0x2A,
        IntSource0              = 0x2B,
        IntSource1              = 0x2C,
        IntSource3              = 0x2D,
        IntSource4              = 0x2E,
        FifoLostPktCount0       = 0x2F,
        FifoLostPktCount1       = 0x30,
        ApexData0               = 0x31,
        ApexData1               = 0x32,
        ApexData2               = 0x33,
        ApexData3               = 0x34,
        IntfConfig0             = 0x35,
        IntfConfig1             = 0x36,
        IntStatusDrdy           = 0x39,
        IntStatus               = 0x3A,
        IntStatus2              = 0x3B,
        IntStatus3              = 0x3C,
        FifoCountH              = 0x3D,
        FifoCountL              = 0x3E,
        FifoData                = 0x3F,
        WhoAmI                  = 0x75,
        BlkSelW                 = 0x79,
        MaddrW                  = 0x7A,
        MW                      = 0x7B,
        BlkSelR                 = 0x7C,
        MaddrR                  = 0x7D,
        MR                      = 0x7E,
    }
}

registers! {
    Mreg1Reg, MREG1_REGS {
        TmstConfig1             = 0x00,
        FifoConfig5             = 0x01,
        FifoConfig6             = 0x02,
        FsyncConfig             = 0x03,
        IntConfig0              = 0x04,
        IntConfig1              = 0x05,
        SensorConfig3           = 0x06,
        St                      = 0x13,
        SelfTestOffset          = 0x14,
    }
}

pub const WHO_AM_I_VALUE: u8 = 0x67;

bitflags! {
    pub struct SignalPathResetFlags: u8 {
        const SOFT_RESET_DEVICE_CONFIG  = 1 << 4;
        const FIFO_FLUSH                = 1 << 2;
    }
}

bitflags! {
    pub struct PwrMgmt0Flags: u8 {
        const ACCEL_LP_CLK_SEL  = 1 << 7;
        const TEMP_DIS          = 1 << 5;
        const IDLE              = 1 << 4;
    }
}

pub const PWR_MGMT0_GYRO_MODE_LOC: u8 = 2;
pub const PWR_MGMT0_GYRO_MODE_MASK: u8 = 0b11 << PWR_MGMT0_GYRO_MODE_LOC;
pub const PWR_MGMT0_ACCEL_MODE_LOC: u8 = 0;
pub const PWR_MGMT0_ACCEL_MODE_MASK: u8 = 0b11 << PWR_MGMT0_ACCEL_MODE_LOC;

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SensorMode {
    Off         = 0b00,
    Standby     = 0b01,
    LowPower    = 0b10,
    LowNoise    = 0b11,
}

pub const CONFIG0_ODR_LOC: u8 = 0;
pub const CONFIG0_ODR_MASK: u8 = 0b1111 << CONFIG0_ODR_LOC;

bitflags! {
    pub struct FifoConfig1Flags: u8 {
        /// Stop-on-full ("snapshot") when set, stream when clear.
        const FIFO_MODE_SNAPSHOT    = 1 << 1;
        const FIFO_BYPASS           = 1 << 0;
    }
}

bitflags! {
    pub struct IntSource0Flags: u8 {
        const ST_INT1_EN            = 1 << 7;
        const FSYNC_INT1_EN         = 1 << 6;
        const PLL_RDY_INT1_EN       = 1 << 5;
        const RESET_DONE_INT1_EN    = 1 << 4;
        const DRDY_INT1_EN          = 1 << 3;
        const FIFO_THS_INT1_EN      = 1 << 2;
        const FIFO_FULL_INT1_EN     = 1 << 1;
        const AGC_RDY_INT1_EN       = 1 << 0;
    }
}

bitflags! {
    pub struct IntfConfig0Flags: u8 {
        /// FIFO count reported in records instead of bytes.
        const FIFO_COUNT_FORMAT     = 1 << 6;
        const FIFO_COUNT_BIG_ENDIAN = 1 << 5;
        const SENSOR_DATA_ENDIAN    = 1 << 4;
    }
}

bitflags! {
    pub struct FifoConfig5Flags: u8 {
        const FIFO_WM_GT_TH             = 1 << 5;
        const FIFO_RESUME_PARTIAL_RD    = 1 << 4;
        const FIFO_HIRES_EN             = 1 << 3;
        const FIFO_TMST_FSYNC_EN        = 1 << 2;
        const FIFO_GYRO_EN              = 1 << 1;
        const FIFO_ACCEL_EN             = 1 << 0;
    }
}

bitflags! {
    pub struct FsyncConfigFlags: u8 {
        const FSYNC_UI_FLAG_CLEAR_SEL   = 1 << 1;
        /// Start FSYNC interval measurement on the falling edge.
        const FSYNC_POLARITY            = 1 << 0;
    }
}

/// FIFO watermark threshold in bytes (12-bit field split over
/// `FIFO_CONFIG2`/`FIFO_CONFIG3`).
pub const FIFO_WATERMARK_MAX: usize = 2048;

/// Size of the on-chip FIFO.
pub const FIFO_SIZE: usize = 2304;

/// Output data rates shared by the accelerometer and gyroscope.
///
/// Every period is an integer multiple of the 1600 Hz period, which the
/// watermark planner relies on.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Odr {
    Hz1600      = 0x05,
    Hz800       = 0x06,
    Hz400       = 0x07,
    Hz200       = 0x08,
    Hz100       = 0x09,
    Hz50        = 0x0A,
    Hz25        = 0x0B,
    Hz12_5      = 0x0C,
    Hz6_25      = 0x0D,
    Hz3_125     = 0x0E,
    Hz1_5625    = 0x0F,
}

impl Odr {
    pub const fn period_ns(self) -> u32 {
        match self {
            Odr::Hz1600 => 625_000,
            Odr::Hz800 => 1_250_000,
            Odr::Hz400 => 2_500_000,
            Odr::Hz200 => 5_000_000,
            Odr::Hz100 => 10_000_000,
            Odr::Hz50 => 20_000_000,
            Odr::Hz25 => 40_000_000,
            Odr::Hz12_5 => 80_000_000,
            Odr::Hz6_25 => 160_000_000,
            Odr::Hz3_125 => 320_000_000,
            Odr::Hz1_5625 => 640_000_000,
        }
    }

    /// Whole microseconds; the sub-microsecond remainder is dropped.
    pub const fn period_us(self) -> u32 {
        self.period_ns() / 1_000
    }
}

impl TryFrom<u8> for Odr {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x05 => Ok(Odr::Hz1600),
            0x06 => Ok(Odr::Hz800),
            0x07 => Ok(Odr::Hz400),
            0x08 => Ok(Odr::Hz200),
            0x09 => Ok(Odr::Hz100),
            0x0A => Ok(Odr::Hz50),
            0x0B => Ok(Odr::Hz25),
            0x0C => Ok(Odr::Hz12_5),
            0x0D => Ok(Odr::Hz6_25),
            0x0E => Ok(Odr::Hz3_125),
            0x0F => Ok(Odr::Hz1_5625),
            _ => Err(()),
        }
    }
}

// Settling times applied after a power state change.
pub const GYRO_STARTUP_TIME_MS: u32 = 45;
pub const ACCEL_STARTUP_TIME_MS: u32 = 20;
pub const TEMP_STARTUP_TIME_MS: u32 = 14;
pub const GYRO_STOP_TIME_MS: u32 = 20;
pub const ACCEL_STOP_TIME_MS: u32 = 0;
pub const TEMP_STOP_TIME_MS: u32 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odr_periods_are_multiples_of_fastest() {
        let base = Odr::Hz1600.period_us();
        for code in 0x05..=0x0F {
            let odr = Odr::try_from(code).unwrap();
            assert_eq!(odr as u8, code);
            assert_eq!(odr.period_us() % base, 0, "{:?}", odr);
        }
        assert!(Odr::try_from(0x04).is_err());
    }

    #[test]
    fn register_names_resolve_from_address() {
        assert_eq!(Bank0Reg_Stringify_From_u8(0x3D), Some("FifoCountH"));
        assert_eq!(Mreg1Reg_Stringify_From_u8(0x01), Some("FifoConfig5"));
        assert_eq!(UnifiedRegister::from(Mreg1Reg::FsyncConfig).name(), "FsyncConfig");
        assert_eq!(Bank0Reg_Stringify_From_u8(0x80), None);
    }
}
