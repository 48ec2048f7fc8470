//! MFRC522 register map and PCD command set.
//!
//! Addresses and bit positions follow Section 9 of the MFRC522 data sheet.

/// See Section 9.2, Table 20
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    // Page 0: command and status
    CommandReg = 0x01,
    ComlEnReg = 0x02,
    DivlEnReg = 0x03,
    ComIrqReg = 0x04,
    DivIrqReg = 0x05,
    ErrorReg = 0x06,
    Status1Reg = 0x07,
    Status2Reg = 0x08,
    FIFODataReg = 0x09,
    FIFOLevelReg = 0x0A,
    WaterLevelReg = 0x0B,
    ControlReg = 0x0C,
    BitFramingReg = 0x0D,
    CollReg = 0x0E,
    // Page 1: command
    ModeReg = 0x11,
    TxModeReg = 0x12,
    RxModeReg = 0x13,
    TxControlReg = 0x14,
    TxASKReg = 0x15,
    TxSelReg = 0x16,
    RxSelReg = 0x17,
    RxThresholdReg = 0x18,
    DemodReg = 0x19,
    MfTxReg = 0x1C,
    MfRxReg = 0x1D,
    SerialSpeedReg = 0x1F,
    // Page 2: configuration
    CRCResultRegHigh = 0x21,
    CRCResultRegLow = 0x22,
    ModWidthReg = 0x24,
    RFCfgReg = 0x26,
    GsNReg = 0x27,
    CWGsPReg = 0x28,
    ModGsPReg = 0x29,
    TModeReg = 0x2A,
    TPrescalerReg = 0x2B,
    TReloadRegHigh = 0x2C,
    TReloadRegLow = 0x2D,
    TCounterValRegHigh = 0x2E,
    TCounterValRegLow = 0x2F,
    // Page 3: test
    TestSel1Reg = 0x31,
    TestSel2Reg = 0x32,
    TestPinEnReg = 0x33,
    TestPinValueReg = 0x34,
    TestBusReg = 0x35,
    AutoTestReg = 0x36,
    VersionReg = 0x37,
    AnalogTestReg = 0x38,
    TestDAC1Reg = 0x39,
    TestDAC2Reg = 0x3A,
    TestADCReg = 0x3B,
}

impl From<Register> for u8 {
    fn from(reg: Register) -> u8 {
        reg as u8
    }
}

/// The commands this driver issues, see Section 10.3, Table 149
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Idle = 0b0000,
    Mem = 0b0001,
    CalcCrc = 0b0011,
    Transceive = 0b1100,
    MfAuthent = 0b1110,
    SoftReset = 0b1111,
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value & 0x0F {
            0b0000 => Command::Idle,
            0b0001 => Command::Mem,
            0b0011 => Command::CalcCrc,
            0b1100 => Command::Transceive,
            0b1110 => Command::MfAuthent,
            0b1111 => Command::SoftReset,
            other => return Err(other),
        })
    }
}

// CommandReg, Section 9.3.1.2
pub const POWER_DOWN: u8 = 1 << 4;

// ComIEnReg, Section 9.3.1.3
pub const IRQ_INV: u8 = 1 << 7;

// ComIrqReg, Section 9.3.1.5
pub const SET1: u8 = 1 << 7;
pub const RX_IRQ: u8 = 1 << 5;
pub const IDLE_IRQ: u8 = 1 << 4;
pub const ERR_IRQ: u8 = 1 << 1;
pub const TIMER_IRQ: u8 = 1 << 0;
pub const ALL_COM_IRQS: u8 = 0x7F;

// DivIrqReg, Section 9.3.1.6
pub const CRC_IRQ: u8 = 1 << 2;

// ErrorReg, Section 9.3.1.7
pub const BUFFER_OVFL: u8 = 1 << 4;
pub const COLL_ERR: u8 = 1 << 3;
pub const PARITY_ERR: u8 = 1 << 1;
pub const PROTOCOL_ERR: u8 = 1 << 0;

// Status2Reg, Section 9.3.1.9
pub const MF_CRYPTO1_ON: u8 = 1 << 3;

// FIFOLevelReg, Section 9.3.1.11
pub const FLUSH_BUFFER: u8 = 1 << 7;
pub const FIFO_SIZE: usize = 64;

// ControlReg, Section 9.3.1.13
pub const RX_LAST_BITS: u8 = 0x07;

// BitFramingReg, Section 9.3.1.14
pub const START_SEND: u8 = 1 << 7;
pub const RX_ALIGN_SHIFT: u8 = 4;
pub const TX_LAST_BITS: u8 = 0x07;

// CollReg, Section 9.3.1.15
pub const VALUES_AFTER_COLL: u8 = 1 << 7;
pub const COLL_POS_NOT_VALID: u8 = 1 << 5;
pub const COLL_POS: u8 = 0x1F;

// TxControlReg, Section 9.3.2.5
pub const TX_RF_EN: u8 = 0x03;

// RFCfgReg, Section 9.3.3.6
pub const RX_GAIN_MASK: u8 = 0x70;

// AutoTestReg, Section 9.3.4.8
pub const SELFTEST_ENABLE: u8 = 0x09;
