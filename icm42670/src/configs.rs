use crate::registers::*;

// FIFO defaults applied once after reset:
// - FIFO count in bytes, big endian
// - partial read resume, continuous watermark interrupt, all FIFO EN bits off
// - snapshot mode (drop data on overflow), bypass off
pub const CONFIG_FIFO_INIT: &[RegConfig<UnifiedRegister>] = &[
    RegConfig {
        op: RegOp::Update {
            mask: IntfConfig0Flags::FIFO_COUNT_FORMAT.bits() | IntfConfig0Flags::FIFO_COUNT_BIG_ENDIAN.bits(),
        },
        reg: UnifiedRegister::Bank0(Bank0Reg::IntfConfig0),
        value: IntfConfig0Flags::FIFO_COUNT_BIG_ENDIAN.bits(),
    },
    RegConfig {
        op: RegOp::Update {
            mask: FifoConfig5Flags::FIFO_RESUME_PARTIAL_RD.bits()
                | FifoConfig5Flags::FIFO_WM_GT_TH.bits()
                | FifoConfig5Flags::FIFO_TMST_FSYNC_EN.bits()
                | FifoConfig5Flags::FIFO_GYRO_EN.bits()
                | FifoConfig5Flags::FIFO_ACCEL_EN.bits(),
        },
        reg: UnifiedRegister::Mreg1(Mreg1Reg::FifoConfig5),
        value: FifoConfig5Flags::FIFO_RESUME_PARTIAL_RD.bits() | FifoConfig5Flags::FIFO_WM_GT_TH.bits(),
    },
    RegConfig {
        op: RegOp::Update {
            mask: FifoConfig1Flags::FIFO_MODE_SNAPSHOT.bits() | FifoConfig1Flags::FIFO_BYPASS.bits(),
        },
        reg: UnifiedRegister::Bank0(Bank0Reg::FifoConfig1),
        value: FifoConfig1Flags::FIFO_MODE_SNAPSHOT.bits(),
    },
];

// Bypassed -> Streaming. The FIFO count read that has to follow the mode
// switch is issued by the caller.
pub const CONFIG_FIFO_STREAM_ON: &[RegConfig<UnifiedRegister>] = &[
    RegConfig {
        op: RegOp::Update { mask: IntSource0Flags::FIFO_THS_INT1_EN.bits() },
        reg: UnifiedRegister::Bank0(Bank0Reg::IntSource0),
        value: IntSource0Flags::FIFO_THS_INT1_EN.bits(),
    },
    RegConfig {
        op: RegOp::Write,
        reg: UnifiedRegister::Bank0(Bank0Reg::SignalPathReset),
        value: SignalPathResetFlags::FIFO_FLUSH.bits(),
    },
    RegConfig {
        op: RegOp::Write,
        reg: UnifiedRegister::Bank0(Bank0Reg::FifoConfig1),
        value: 0x00, // bypass off, stream mode
    },
];

// Measure the FSYNC interval from the falling edge of the pulse
pub const CONFIG_FSYNC_FALLING_EDGE: &[RegConfig<UnifiedRegister>] = &[
    RegConfig {
        op: RegOp::Update { mask: FsyncConfigFlags::FSYNC_POLARITY.bits() },
        reg: UnifiedRegister::Mreg1(Mreg1Reg::FsyncConfig),
        value: FsyncConfigFlags::FSYNC_POLARITY.bits(),
    },
];

// Streaming -> Bypassed
pub const CONFIG_FIFO_STREAM_OFF: &[RegConfig<UnifiedRegister>] = &[
    RegConfig {
        op: RegOp::Write,
        reg: UnifiedRegister::Bank0(Bank0Reg::FifoConfig1),
        value: FifoConfig1Flags::FIFO_BYPASS.bits(),
    },
    RegConfig {
        op: RegOp::Write,
        reg: UnifiedRegister::Bank0(Bank0Reg::SignalPathReset),
        value: SignalPathResetFlags::FIFO_FLUSH.bits(),
    },
    RegConfig {
        op: RegOp::Update { mask: IntSource0Flags::FIFO_THS_INT1_EN.bits() },
        reg: UnifiedRegister::Bank0(Bank0Reg::IntSource0),
        value: 0x00,
    },
];
