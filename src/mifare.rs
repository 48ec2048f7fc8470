//! MIFARE Classic block access on top of a selected PICC, see MF1S50YYX Section 10.

use crate::mfrc522::Mfrc522;
use crate::picc::{Key, PiccCommand, Uid, MIFARE_ACK};
use crate::register::*;
use crate::status::{Result, StatusCode};
use crate::transceive::TransceiveOptions;
use crate::transport::{ReaderPins, RegisterTransport};
use crate::debug;

pub const BLOCK_SIZE: usize = 16;

impl<T: RegisterTransport, P: ReaderPins> Mfrc522<'_, T, P> {
    /// Three pass authentication of the sector holding `block`.
    ///
    /// `command` is [`PiccCommand::MfAuthKeyA`] or [`PiccCommand::MfAuthKeyB`]. All further
    /// traffic with the PICC is encrypted until [`stop_crypto1`](Self::stop_crypto1).
    pub fn mf_authenticate(
        &mut self,
        command: PiccCommand,
        block: u8,
        key: &Key,
        uid: &Uid,
    ) -> Result<()> {
        if !matches!(command, PiccCommand::MfAuthKeyA | PiccCommand::MfAuthKeyB) {
            return Err(StatusCode::Invalid.into());
        }

        let uid_bytes = uid.bytes();
        let mut frame = Vec::with_capacity(12);

        frame.push(command.into());
        frame.push(block);
        frame.extend_from_slice(key.bytes());
        // The last four UID bytes, which is the whole UID of a single size PICC
        frame.extend_from_slice(&uid_bytes[uid_bytes.len() - 4..]);

        let reply = self.communicate(
            Command::MfAuthent,
            IDLE_IRQ,
            &frame,
            0,
            TransceiveOptions::default(),
        )?;

        reply.status.into_result()?;

        // See Section 9.3.1.9 - only set after a successful authentication
        if self.read(Register::Status2Reg)? & MF_CRYPTO1_ON == 0 {
            return Err(StatusCode::Error.into());
        }

        debug!(self.log, "authenticated block {} of {}", block, uid);

        Ok(())
    }

    /// Leave the authenticated state. Needed before talking to another PICC.
    pub fn stop_crypto1(&mut self) -> Result<()> {
        self.clear_bits(Register::Status2Reg, MF_CRYPTO1_ON)?;

        Ok(())
    }

    pub fn mf_read(&mut self, block: u8) -> Result<[u8; BLOCK_SIZE]> {
        let frame = self.with_crc(&[PiccCommand::MfRead.into(), block])?;
        let reply = self.transceive(
            &frame,
            0,
            TransceiveOptions {
                check_crc: true,
                // Block and CRC_A
                max_response_len: BLOCK_SIZE + 2,
                ..TransceiveOptions::default()
            },
        )?;

        reply.status.into_result()?;

        if reply.data.len() != BLOCK_SIZE + 2 {
            return Err(StatusCode::Error.into());
        }

        let mut data = [0u8; BLOCK_SIZE];

        data.copy_from_slice(&reply.data[..BLOCK_SIZE]);

        Ok(data)
    }

    /// Write one block. The PICC acknowledges the command and then the data.
    pub fn mf_write(&mut self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.mifare_transceive(&[PiccCommand::MfWrite.into(), block])?;
        self.mifare_transceive(data)?;

        Ok(())
    }

    /// Send `data` plus CRC_A and expect the 4 bit ACK
    fn mifare_transceive(&mut self, data: &[u8]) -> Result<()> {
        let frame = self.with_crc(data)?;
        let reply = self.transceive(
            &frame,
            0,
            TransceiveOptions {
                max_response_len: 1,
                ..TransceiveOptions::default()
            },
        )?;

        reply.status.into_result()?;

        match reply.data[..] {
            [MIFARE_ACK] if reply.valid_bits == 4 => Ok(()),
            [_] if reply.valid_bits == 4 => Err(StatusCode::MifareNack.into()),
            _ => Err(StatusCode::Error.into()),
        }
    }

    fn with_crc(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() + 2 > FIFO_SIZE {
            return Err(StatusCode::NoRoom.into());
        }

        let crc = self.calculate_crc(data)?;
        let mut frame = Vec::with_capacity(data.len() + 2);

        frame.extend_from_slice(data);
        frame.extend_from_slice(&crc);

        Ok(frame)
    }
}
