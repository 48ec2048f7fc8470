//! ISO/IEC 14443-3 type A activation: REQA/WUPA, the select cascade and HLTA.
//!
//! A PICC moves IDLE -> READY on REQA (WUPA also wakes it from HALT), READY -> ACTIVE once
//! SELECT completes its last cascade level, and ACTIVE -> HALT on HLTA.

use crate::anticollision::CascadeFrame;
use crate::mfrc522::Mfrc522;
use crate::picc::{PiccCommand, Uid, SAK_CASCADE_BIT};
use crate::register::*;
use crate::status::{Result, StatusCode};
use crate::transceive::TransceiveOptions;
use crate::transport::{ReaderPins, RegisterTransport};
use crate::debug;

// A level holds 32 UID bits, and each collision round settles at least one of them
const MAX_COLLISION_ROUNDS: usize = 32;
const CASCADE_LEVELS: [PiccCommand; 3] = [
    PiccCommand::SelCl1,
    PiccCommand::SelCl2,
    PiccCommand::SelCl3,
];

impl<T: RegisterTransport, P: ReaderPins> Mfrc522<'_, T, P> {
    /// Is there a PICC in the field, including one in HALT?
    pub fn is_card_present(&mut self) -> Result<bool> {
        self.is_present(PiccCommand::WupA)
    }

    /// Is there a PICC in the field that has not been halted?
    pub fn is_new_card_present(&mut self) -> Result<bool> {
        self.is_present(PiccCommand::ReqA)
    }

    fn is_present(&mut self, command: PiccCommand) -> Result<bool> {
        // Back to 106 kBd and default modulation in case an application changed them
        self.write(Register::TxModeReg, 0x00)?;
        self.write(Register::RxModeReg, 0x00)?;
        self.write(Register::ModWidthReg, 0x26)?;

        match self.request_or_wakeup(command) {
            Ok(_) => Ok(true),
            // Several PICCs answered at once, which still means somebody is there
            Err(err) if err.status() == Some(StatusCode::Collision) => Ok(true),
            Err(err) if err.status() == Some(StatusCode::Timeout) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// REQA, returning the ATQA
    pub fn request_a(&mut self) -> Result<[u8; 2]> {
        self.request_or_wakeup(PiccCommand::ReqA)
    }

    /// WUPA, returning the ATQA
    pub fn wakeup_a(&mut self) -> Result<[u8; 2]> {
        self.request_or_wakeup(PiccCommand::WupA)
    }

    fn request_or_wakeup(&mut self, command: PiccCommand) -> Result<[u8; 2]> {
        // ValuesAfterColl=0 - bits received after a collision are cleared
        self.clear_bits(Register::CollReg, VALUES_AFTER_COLL)?;

        // REQA and WUPA are short frames, only 7 bits of the byte are sent
        let reply = self.transceive(
            &[command.into()],
            7,
            TransceiveOptions {
                max_response_len: 2,
                ..TransceiveOptions::default()
            },
        )?;

        reply.status.into_result()?;

        // ATQA must be exactly 16 bits
        match reply.data[..] {
            [low, high] if reply.valid_bits == 0 => Ok([low, high]),
            _ => Err(StatusCode::Error.into()),
        }
    }

    /// Resolve and select one PICC in READY, returning its full UID.
    ///
    /// Call after [`is_new_card_present`](Self::is_new_card_present) or
    /// [`is_card_present`](Self::is_card_present) returned `true`. With several PICCs in
    /// the field the one holding a 1 at the first disagreeing UID bit wins, every time.
    pub fn read_card_serial(&mut self) -> Result<Uid> {
        self.clear_bits(Register::CollReg, VALUES_AFTER_COLL)?;

        let mut uid_bytes = Vec::with_capacity(10);

        for select in CASCADE_LEVELS {
            let frame = self.anticollision(select)?;
            let sak = self.select(frame.clone())?;
            let more_levels = sak & SAK_CASCADE_BIT != 0;

            // CT and the cascade bit must tell the same story
            if more_levels != frame.has_cascade_tag() {
                return Err(StatusCode::Error.into());
            }

            uid_bytes.extend_from_slice(frame.uid_bytes());

            if !more_levels {
                let uid = Uid::new(&uid_bytes, sak)?;

                debug!(self.log, "selected {} ({})", uid, uid.picc_type());
                return Ok(uid);
            }
        }

        // Cascade bit still set after level 3
        Err(StatusCode::Error.into())
    }

    /// Learn all 32 UID bits of one cascade level
    fn anticollision(&mut self, select: PiccCommand) -> Result<CascadeFrame> {
        let mut frame = CascadeFrame::new(select);

        for _ in 0..MAX_COLLISION_ROUNDS {
            let request = frame.anticollision_request();
            let reply = self.transceive(
                &request.bytes,
                request.tx_last_bits,
                TransceiveOptions {
                    rx_align: request.rx_align,
                    // Remaining UID bytes and BCC
                    max_response_len: 5,
                    ..TransceiveOptions::default()
                },
            )?;

            match (reply.status, reply.collision_position) {
                (StatusCode::Ok, _) => {
                    frame.accept_response(&reply.data, reply.valid_bits)?;
                }
                (StatusCode::Collision, Some(position)) => {
                    debug!(
                        self.log,
                        "{:?} collision at bit {} after {} known",
                        select,
                        position,
                        frame.known_bits()
                    );
                    frame.resolve_collision(&reply.data, position)?;
                }
                (status, _) => return Err(status.into()),
            }

            if frame.is_complete() {
                return Ok(frame);
            }
        }

        Err(StatusCode::Error.into())
    }

    /// SELECT a completed level, returning the SAK
    fn select(&mut self, mut frame: CascadeFrame) -> Result<u8> {
        let header = frame.select_request()?;
        let crc = self.calculate_crc(&header)?;
        let mut request = [0u8; 9];

        request[..7].copy_from_slice(&header);
        request[7..].copy_from_slice(&crc);

        let reply = self.transceive(
            &request,
            0,
            TransceiveOptions {
                check_crc: true,
                // SAK and CRC_A
                max_response_len: 3,
                ..TransceiveOptions::default()
            },
        )?;

        reply.status.into_result()?;

        if reply.data.len() != 3 {
            return Err(StatusCode::Error.into());
        }

        Ok(reply.data[0])
    }

    /// Put the selected PICC into HALT
    pub fn picc_halt_a(&mut self) -> Result<()> {
        let mut request = [PiccCommand::HltA.into(), 0x00, 0x00, 0x00];
        let crc = self.calculate_crc(&request[..2])?;

        request[2..].copy_from_slice(&crc);

        let reply = self.transceive(&request, 0, TransceiveOptions::default())?;

        // ISO/IEC 14443-3 Section 6.4.3 - any answer within 1ms of HLTA is a NAK.
        // Silence is the only success.
        match reply.status {
            StatusCode::Timeout => Ok(()),
            StatusCode::Ok => Err(StatusCode::Error.into()),
            status => Err(status.into()),
        }
    }
}
