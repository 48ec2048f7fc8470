//! PICC side of ISO/IEC 14443-3 type A: commands, UIDs and type identification.

use crate::status::StatusCode;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PiccCommand {
    // ISO/IEC 14443-3 Section 6.4
    ReqA = 0x26, // Short frame, invites PICCs in IDLE to READY
    WupA = 0x52, // Short frame, invites PICCs in IDLE and HALT to READY
    Ct = 0x88,   // Cascade tag, first UID byte of a level that is not the last
    SelCl1 = 0x93,
    SelCl2 = 0x95,
    SelCl3 = 0x97,
    HltA = 0x50,
    // MIFARE Classic, MF1S503x Section 9
    MfAuthKeyA = 0x60,
    MfAuthKeyB = 0x61,
    MfRead = 0x30,
    MfWrite = 0xA0,
}

impl From<PiccCommand> for u8 {
    fn from(cmd: PiccCommand) -> u8 {
        cmd as u8
    }
}

/// The 4 bit ACK a MIFARE PICC returns; anything else is a NAK
pub const MIFARE_ACK: u8 = 0x0A;

// SAK bit 3: UID not complete, another cascade level follows
pub const SAK_CASCADE_BIT: u8 = 0x04;

/// PICC family derived from the SAK, see NXP AN10833 Section 3.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiccType {
    NotComplete,
    MifareMini,
    Mifare1K,
    Mifare4K,
    MifareUltralight,
    MifarePlus,
    Tnp3xxx,
    Iso14443_4,
    Iso18092,
    Unknown,
}

impl PiccType {
    pub fn from_sak(sak: u8) -> PiccType {
        // Bit 8 is ignored, some Infineon parts set it
        match sak & 0x7F {
            0x04 => PiccType::NotComplete,
            0x09 => PiccType::MifareMini,
            0x08 => PiccType::Mifare1K,
            0x18 => PiccType::Mifare4K,
            0x00 => PiccType::MifareUltralight,
            0x10 | 0x11 => PiccType::MifarePlus,
            0x01 => PiccType::Tnp3xxx,
            0x20 => PiccType::Iso14443_4,
            0x40 => PiccType::Iso18092,
            _ => PiccType::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PiccType::NotComplete => "SAK indicates UID is not complete",
            PiccType::MifareMini => "MIFARE Mini",
            PiccType::Mifare1K => "MIFARE 1K",
            PiccType::Mifare4K => "MIFARE 4K",
            PiccType::MifareUltralight => "MIFARE Ultralight or Ultralight C",
            PiccType::MifarePlus => "MIFARE Plus",
            PiccType::Tnp3xxx => "MIFARE TNP3XXX",
            PiccType::Iso14443_4 => "PICC compliant with ISO/IEC 14443-4",
            PiccType::Iso18092 => "PICC compliant with ISO/IEC 18092 (NFC)",
            PiccType::Unknown => "Unknown type",
        }
    }

    pub fn is_mifare_classic(&self) -> bool {
        matches!(
            self,
            PiccType::MifareMini | PiccType::Mifare1K | PiccType::Mifare4K
        )
    }
}

impl fmt::Display for PiccType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A PICC's unique identifier together with its Select Acknowledge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uid {
    bytes: Vec<u8>,
    sak: u8,
}

impl Uid {
    /// Only single (4), double (7) and triple (10) size UIDs exist
    pub fn new(bytes: &[u8], sak: u8) -> Result<Uid, StatusCode> {
        match bytes.len() {
            4 | 7 | 10 => Ok(Uid {
                bytes: bytes.to_vec(),
                sak,
            }),
            _ => Err(StatusCode::Invalid),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn sak(&self) -> u8 {
        self.sak
    }

    pub fn picc_type(&self) -> PiccType {
        PiccType::from_sak(self.sak)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// MIFARE Classic sector key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    bytes: [u8; 6],
}

impl Key {
    pub fn new(bytes: [u8; 6]) -> Key {
        Key { bytes }
    }

    pub fn bytes(&self) -> &[u8; 6] {
        &self.bytes
    }
}

impl Default for Key {
    /// Factory default transport key
    fn default() -> Key {
        Key::new([0xFF; 6])
    }
}
