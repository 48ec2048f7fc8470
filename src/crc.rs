//! CRC_A through the MFRC522 CRC coprocessor, see Section 10.3.1.4.

use crate::mfrc522::Mfrc522;
use crate::register::*;
use crate::status::{Result, StatusCode};
use crate::transport::{ReaderPins, RegisterTransport};

// Each DivIrqReg poll is one SPI round trip; 5000 of them is well over the 89us the calculation takes
const CRC_POLL_BUDGET: usize = 5000;

impl<T: RegisterTransport, P: ReaderPins> Mfrc522<'_, T, P> {
    /// CRC_A of `data` in transmission order, least significant byte first
    pub fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2]> {
        self.start_command(Command::Idle)?;
        // Writing with Set1 cleared clears the CRCIRq bit
        self.write(Register::DivIrqReg, CRC_IRQ)?;
        self.write(Register::FIFOLevelReg, FLUSH_BUFFER)?;
        self.write_many(Register::FIFODataReg, data)?;
        self.start_command(Command::CalcCrc)?;

        for _ in 0..CRC_POLL_BUDGET {
            if self.read(Register::DivIrqReg)? & CRC_IRQ != 0 {
                // Stop the coprocessor before it sees any further FIFO writes
                self.start_command(Command::Idle)?;

                let low = self.read(Register::CRCResultRegLow)?;
                let high = self.read(Register::CRCResultRegHigh)?;

                return Ok([low, high]);
            }
        }

        Err(StatusCode::Timeout.into())
    }

    /// Check the CRC_A trailing a received frame
    pub fn verify_crc(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() < 2 {
            return Err(StatusCode::Invalid.into());
        }

        let (payload, crc) = frame.split_at(frame.len() - 2);

        if self.calculate_crc(payload)? != crc {
            return Err(StatusCode::CrcWrong.into());
        }

        Ok(())
    }
}
