//! Bit bookkeeping of the ISO/IEC 14443-3 anticollision loop for one cascade level.
//!
//! Frame layout, see ISO/IEC 14443-3 Section 6.5.3:
//!
//! | byte | content                                              |
//! |------|------------------------------------------------------|
//! | 0    | SEL, the cascade level                               |
//! | 1    | NVB, high nibble whole bytes sent, low nibble extra bits |
//! | 2..6 | UID bytes, or CT followed by three UID bytes          |
//! | 6    | BCC, XOR of bytes 2..6                               |
//! | 7..9 | CRC_A, only on the final SELECT                      |
//!
//! Collisions are resolved by taking the colliding bit as 1, so a given set of PICCs
//! always yields the one with the highest UID bit at each first point of disagreement.

use crate::picc::PiccCommand;
use crate::status::StatusCode;

/// UID bits per cascade level
pub const LEVEL_BITS: u8 = 32;

// NVB of a SELECT: seven whole bytes
const NVB_SELECT: u8 = 0x70;
// Where the UID part starts, after SEL and NVB
const UID_START: usize = 2;
const BCC_INDEX: usize = 6;

/// An ANTICOLLISION frame and the bit framing to send it with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnticollisionRequest {
    pub bytes: Vec<u8>,
    /// Valid bits in the last byte of `bytes`, 0 for all eight
    pub tx_last_bits: u8,
    /// Where the first reply bit lands in the first FIFO byte
    pub rx_align: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeFrame {
    buffer: [u8; 7],
    known_bits: u8,
}

impl CascadeFrame {
    pub fn new(select: PiccCommand) -> CascadeFrame {
        let mut buffer = [0u8; 7];

        buffer[0] = select.into();

        CascadeFrame {
            buffer,
            known_bits: 0,
        }
    }

    /// Number of UID bits of this level settled so far
    pub fn known_bits(&self) -> u8 {
        self.known_bits
    }

    /// All 32 UID bits known, ready for SELECT
    pub fn is_complete(&self) -> bool {
        self.known_bits >= LEVEL_BITS
    }

    /// The next ANTICOLLISION: SEL, NVB and the known UID bits
    pub fn anticollision_request(&mut self) -> AnticollisionRequest {
        let tx_last_bits = self.known_bits % 8;
        let index = UID_START + (self.known_bits / 8) as usize;

        self.buffer[1] = ((index as u8) << 4) | tx_last_bits;

        let used = index + usize::from(tx_last_bits != 0);

        AnticollisionRequest {
            bytes: self.buffer[..used].to_vec(),
            tx_last_bits,
            rx_align: tx_last_bits,
        }
    }

    /// Merge the reply to an ANTICOLLISION that came back without collision
    pub fn accept_response(&mut self, response: &[u8], valid_bits: u8) -> Result<(), StatusCode> {
        let index = self.merge(response)?;

        // The PICC sends the rest of its UID bits and the BCC, which always ends on a byte boundary
        if index + response.len() != self.buffer.len() || valid_bits != 0 {
            return Err(StatusCode::Error);
        }

        self.known_bits = LEVEL_BITS;

        Ok(())
    }

    /// Merge the reply to an ANTICOLLISION that collided at `collision_position` and settle that bit as 1.
    ///
    /// The position counts the UID bits of this level, 1 for the first, so it becomes the new known bit count.
    pub fn resolve_collision(
        &mut self,
        response: &[u8],
        collision_position: u8,
    ) -> Result<(), StatusCode> {
        // No progress
        if collision_position <= self.known_bits || collision_position > LEVEL_BITS {
            return Err(StatusCode::Error);
        }

        self.merge(response)?;

        let bit = collision_position - 1;

        self.buffer[UID_START + (bit / 8) as usize] |= 1 << (bit % 8);
        self.known_bits = collision_position;

        if self.is_complete() {
            // The BCC arrived after the collision and is unusable
            self.buffer[BCC_INDEX] = self.expected_bcc();
        }

        Ok(())
    }

    /// SEL, NVB and UID bytes plus BCC for the final SELECT, CRC_A not included
    pub fn select_request(&mut self) -> Result<[u8; 7], StatusCode> {
        if !self.is_complete() {
            return Err(StatusCode::InternalError);
        }

        if self.buffer[BCC_INDEX] != self.expected_bcc() {
            return Err(StatusCode::Error);
        }

        self.buffer[1] = NVB_SELECT;

        Ok(self.buffer)
    }

    /// Whether the PICC marked this level as not its last
    pub fn has_cascade_tag(&self) -> bool {
        self.buffer[UID_START] == u8::from(PiccCommand::Ct)
    }

    /// The UID bytes this level contributes, without a cascade tag
    pub fn uid_bytes(&self) -> &[u8] {
        if self.has_cascade_tag() {
            &self.buffer[UID_START + 1..BCC_INDEX]
        } else {
            &self.buffer[UID_START..BCC_INDEX]
        }
    }

    fn expected_bcc(&self) -> u8 {
        self.buffer[UID_START..BCC_INDEX]
            .iter()
            .fold(0, |bcc, byte| bcc ^ byte)
    }

    /// Copy a reply into place behind the known bits. Returns the index of the first byte touched.
    fn merge(&mut self, response: &[u8]) -> Result<usize, StatusCode> {
        let index = UID_START + (self.known_bits / 8) as usize;
        let rx_align = self.known_bits % 8;

        if response.is_empty() || index + response.len() > self.buffer.len() {
            return Err(StatusCode::Error);
        }

        // The low RxAlign bits of the first byte are ours, not the PICC's
        let mask = 0xFFu8 << rx_align;

        self.buffer[index] = (self.buffer[index] & !mask) | (response[0] & mask);
        self.buffer[index + 1..index + response.len()].copy_from_slice(&response[1..]);

        Ok(index)
    }
}
