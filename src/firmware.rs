//! Chip identification and the built-in self test, see Sections 9.3.4.8 and 16.1.1.

use crate::mfrc522::Mfrc522;
use crate::register::*;
use crate::status::TransportError;
use crate::transport::{ReaderPins, RegisterTransport};
use crate::{debug, warning};
use std::fmt;

type Result<T> = std::result::Result<T, TransportError>;

const SELFTEST_LEN: usize = 64;
const SELFTEST_FILL_LEN: usize = 25;
const SELFTEST_POLL_BUDGET: usize = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipRevision {
    /// Fudan Semiconductor FM17522 clone
    Fm17522,
    V0_0,
    V1_0,
    V2_0,
    /// Counterfeit chip reporting 0x12
    Counterfeit,
    Unknown,
}

/// Contents of VersionReg, see Section 9.3.4.8
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub value: u8,
    pub revision: ChipRevision,
    pub description: &'static str,
}

impl FirmwareVersion {
    pub fn from_value(value: u8) -> FirmwareVersion {
        let (revision, description) = FIRMWARE_TABLE
            .iter()
            .find(|entry| entry.value == value)
            .map(|entry| (entry.revision, entry.description))
            .unwrap_or((ChipRevision::Unknown, "unknown, probably a clone"));

        FirmwareVersion {
            value,
            revision,
            description,
        }
    }

    /// Self test result the chip must produce, if the version has a published one
    pub fn selftest_reference(&self) -> Option<&'static [u8; SELFTEST_LEN]> {
        FIRMWARE_TABLE
            .iter()
            .find(|entry| entry.value == self.value)
            .and_then(|entry| entry.selftest)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} = {}", self.value, self.description)
    }
}

struct FirmwareEntry {
    value: u8,
    revision: ChipRevision,
    description: &'static str,
    selftest: Option<&'static [u8; SELFTEST_LEN]>,
}

const FIRMWARE_TABLE: [FirmwareEntry; 5] = [
    FirmwareEntry {
        value: 0x88,
        revision: ChipRevision::Fm17522,
        description: "FM17522 clone",
        selftest: Some(&SELFTEST_FM17522),
    },
    FirmwareEntry {
        value: 0x90,
        revision: ChipRevision::V0_0,
        description: "version 0.0",
        selftest: Some(&SELFTEST_V0_0),
    },
    FirmwareEntry {
        value: 0x91,
        revision: ChipRevision::V1_0,
        description: "version 1.0",
        selftest: Some(&SELFTEST_V1_0),
    },
    FirmwareEntry {
        value: 0x92,
        revision: ChipRevision::V2_0,
        description: "version 2.0",
        selftest: Some(&SELFTEST_V2_0),
    },
    FirmwareEntry {
        value: 0x12,
        revision: ChipRevision::Counterfeit,
        description: "counterfeit chip",
        selftest: None,
    },
];

// Version 0.0 (0x90), Philips Semiconductors; Preliminary Specification Revision 2.0 - 01 August 2005
const SELFTEST_V0_0: [u8; SELFTEST_LEN] = [
    0x00, 0x87, 0x98, 0x0f, 0x49, 0xFF, 0x07, 0x19, 0xBF, 0x22, 0x30, 0x49, 0x59, 0x63, 0xAD, 0xCA,
    0x7F, 0xE3, 0x4E, 0x03, 0x5C, 0x4E, 0x49, 0x50, 0x47, 0x9A, 0x37, 0x61, 0xE7, 0xE2, 0xC6, 0x2E,
    0x75, 0x5A, 0xED, 0x04, 0x3D, 0x02, 0x4B, 0x78, 0x32, 0xFF, 0x58, 0x3B, 0x7C, 0xE9, 0x00, 0x94,
    0xB4, 0x4A, 0x59, 0x5B, 0xFD, 0xC9, 0x29, 0xDF, 0x35, 0x96, 0x98, 0x9E, 0x4F, 0x30, 0x32, 0x8D,
];

// Version 1.0 (0x91), NXP Semiconductors; Rev. 3.8 - 17 September 2014; 16.1.1 self test
const SELFTEST_V1_0: [u8; SELFTEST_LEN] = [
    0x00, 0xC6, 0x37, 0xD5, 0x32, 0xB7, 0x57, 0x5C, 0xC2, 0xD8, 0x7C, 0x4D, 0xD9, 0x70, 0xC7, 0x73,
    0x10, 0xE6, 0xD2, 0xAA, 0x5E, 0xA1, 0x3E, 0x5A, 0x14, 0xAF, 0x30, 0x61, 0xC9, 0x70, 0xDB, 0x2E,
    0x64, 0x22, 0x72, 0xB5, 0xBD, 0x65, 0xF4, 0xEC, 0x22, 0xBC, 0xD3, 0x72, 0x35, 0xCD, 0xAA, 0x41,
    0x1F, 0xA7, 0xF3, 0x53, 0x14, 0xDE, 0x7E, 0x02, 0xD9, 0x0F, 0xB5, 0x5E, 0x25, 0x1D, 0x29, 0x79,
];

// Version 2.0 (0x92), NXP Semiconductors; Rev. 3.8 - 17 September 2014; 16.1.1 self test
const SELFTEST_V2_0: [u8; SELFTEST_LEN] = [
    0x00, 0xEB, 0x66, 0xBA, 0x57, 0xBF, 0x23, 0x95, 0xD0, 0xE3, 0x0D, 0x3D, 0x27, 0x89, 0x5C, 0xDE,
    0x9D, 0x3B, 0xA7, 0x00, 0x21, 0x5B, 0x89, 0x82, 0x51, 0x3A, 0xEB, 0x02, 0x0C, 0xA5, 0x00, 0x49,
    0x7C, 0x84, 0x4D, 0xB3, 0xCC, 0xD2, 0x1B, 0x81, 0x5D, 0x48, 0x76, 0xD5, 0x71, 0x61, 0x21, 0xA9,
    0x86, 0x96, 0x83, 0x38, 0xCF, 0x9D, 0x5B, 0x6D, 0xDC, 0x15, 0xBA, 0x3E, 0x7D, 0x95, 0x3B, 0x2F,
];

// Clone (0x88), Fudan Semiconductor FM17522
const SELFTEST_FM17522: [u8; SELFTEST_LEN] = [
    0x00, 0xD6, 0x78, 0x8C, 0xE2, 0xAA, 0x0C, 0x18, 0x2A, 0xB8, 0x7A, 0x7F, 0xD3, 0x6A, 0xCF, 0x0B,
    0xB1, 0x37, 0x63, 0x4B, 0x69, 0xAE, 0x91, 0xC7, 0xC3, 0x97, 0xAE, 0x77, 0xF4, 0x37, 0xD7, 0x9B,
    0x7C, 0xF5, 0x3C, 0x11, 0x8F, 0x15, 0xC3, 0xD7, 0xC1, 0x5B, 0x00, 0x2A, 0xD0, 0x75, 0xDE, 0x9E,
    0x51, 0x64, 0xAB, 0x3E, 0xE9, 0x15, 0xB5, 0xAB, 0x56, 0x9A, 0x98, 0x82, 0x26, 0xEA, 0x2A, 0x62,
];

impl<T: RegisterTransport, P: ReaderPins> Mfrc522<'_, T, P> {
    pub fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        Ok(FirmwareVersion::from_value(self.read(Register::VersionReg)?))
    }

    /// Run the digital self test of Section 16.1.1.
    ///
    /// `false` means either a defect or a chip without a known reference result.
    /// The chip is reset and reconfigured afterwards either way.
    pub fn selftest(&mut self) -> Result<bool> {
        self.reset()?;

        // Clear the internal buffer by pushing 25 zero bytes through Mem
        self.write(Register::FIFOLevelReg, FLUSH_BUFFER)?;
        self.write_many(Register::FIFODataReg, &[0u8; SELFTEST_FILL_LEN])?;
        self.start_command(Command::Mem)?;

        self.write(Register::AutoTestReg, SELFTEST_ENABLE)?;
        self.write(Register::FIFODataReg, 0x00)?;
        self.start_command(Command::CalcCrc)?;

        let mut filled = false;

        for _ in 0..SELFTEST_POLL_BUDGET {
            if (self.read(Register::FIFOLevelReg)? & 0x7F) as usize >= SELFTEST_LEN {
                filled = true;
                break;
            }
        }

        self.start_command(Command::Idle)?;

        let result = self.read_many(Register::FIFODataReg, SELFTEST_LEN)?;

        self.write(Register::AutoTestReg, 0x00)?;

        let version = self.firmware_version()?;
        let passed = filled
            && version
                .selftest_reference()
                .map_or(false, |reference| result[..] == reference[..]);

        if !filled {
            warning!(self.log, "self test did not fill the FIFO");
        }

        debug!(self.log, "self test on {}: {:02x?}", version, result);

        self.reset()?;

        Ok(passed)
    }
}
