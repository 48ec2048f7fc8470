use crate::mfrc522::Mfrc522;
use crate::picc::MIFARE_ACK;
use crate::register::*;
use crate::status::{Mfrc522Error, StatusCode, TransportError};
use crate::transport::{ReaderPins, RegisterTransport};
use crate::debug;
use std::time::Instant;

type Result<T> = std::result::Result<T, TransportError>;

/// Framing and checks for one PICC exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransceiveOptions {
    /// Bit position in the first FIFO byte where the first received bit lands
    pub rx_align: u8,
    /// Verify and keep the CRC_A trailing the reply
    pub check_crc: bool,
    /// More bytes than this in the FIFO is `NoRoom`
    pub max_response_len: usize,
}

impl Default for TransceiveOptions {
    fn default() -> Self {
        TransceiveOptions {
            rx_align: 0,
            check_crc: false,
            max_response_len: FIFO_SIZE,
        }
    }
}

/// What came back from a PICC exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transceived {
    pub status: StatusCode,
    pub data: Vec<u8>,
    /// Valid bits in the last received byte, 0 when the whole byte is valid
    pub valid_bits: u8,
    /// CollPos of the first collision, 1..=32: the UID bits of the cascade level up to and including it
    pub collision_position: Option<u8>,
}

impl Transceived {
    fn status(status: StatusCode) -> Transceived {
        Transceived {
            status,
            data: Vec::new(),
            valid_bits: 0,
            collision_position: None,
        }
    }
}

impl<T: RegisterTransport, P: ReaderPins> Mfrc522<'_, T, P> {
    /// Send `send_data` to the PICCs in the field and collect the reply.
    ///
    /// `valid_bits` is the number of bits to transmit from the last byte, 0 for all eight.
    /// Protocol outcomes are reported in [`Transceived::status`]; only a bus failure is an `Err`.
    /// Nothing is retried here.
    pub fn transceive(
        &mut self,
        send_data: &[u8],
        valid_bits: u8,
        options: TransceiveOptions,
    ) -> Result<Transceived> {
        self.communicate(
            Command::Transceive,
            RX_IRQ | IDLE_IRQ,
            send_data,
            valid_bits,
            options,
        )
    }

    /// Run `command` with `send_data` in the FIFO until one of the `wait_irq` bits in ComIrqReg is set
    pub(crate) fn communicate(
        &mut self,
        command: Command,
        wait_irq: u8,
        send_data: &[u8],
        valid_bits: u8,
        options: TransceiveOptions,
    ) -> Result<Transceived> {
        if send_data.len() > FIFO_SIZE || valid_bits > 7 || options.rx_align > 7 {
            return Ok(Transceived::status(StatusCode::Invalid));
        }

        // See Section 9.3.1.14 - RxAlign = BitFramingReg[6..4], TxLastBits = BitFramingReg[2..0]
        let bit_framing = (options.rx_align << RX_ALIGN_SHIFT) | valid_bits;

        // Cancel whatever is running, drop stale IRQ bits and stale FIFO data
        self.start_command(Command::Idle)?;
        self.write(Register::ComIrqReg, ALL_COM_IRQS)?;
        self.write(Register::FIFOLevelReg, FLUSH_BUFFER)?;

        // See Section 9.3.1.3 - route the completion bits to the active low IRQ pin
        self.write(Register::ComlEnReg, IRQ_INV | wait_irq | TIMER_IRQ)?;
        self.write(Register::BitFramingReg, bit_framing)?;
        self.write_many(Register::FIFODataReg, send_data)?;
        self.start_command(command)?;

        if command == Command::Transceive {
            // StartSend only takes effect once the Transceive command is active
            self.set_bits(Register::BitFramingReg, START_SEND)?;
        }

        let budget = self
            .config
            .wait_budget(send_data.len(), options.max_response_len);
        let deadline = Instant::now() + budget;

        loop {
            // The cancel belongs to this exchange only
            if self.cancel.take() {
                debug!(self.log, "{:?} canceled", command);
                return Ok(Transceived::status(StatusCode::Canceled));
            }

            // See Section 9.3.1.5
            let irq = self.read(Register::ComIrqReg)?;

            if irq & wait_irq != 0 {
                break;
            }

            // The chip timer started at the end of transmission, see TAuto in reset()
            if irq & TIMER_IRQ != 0 {
                debug!(self.log, "{:?} {:02x?}: no reply", command, send_data);
                return Ok(Transceived::status(StatusCode::Timeout));
            }

            let now = Instant::now();

            if now >= deadline {
                // Not even the chip timer fired, the chip itself may be unreachable
                debug!(self.log, "{:?} {:02x?}: no IRQ within {:?}", command, send_data, budget);
                return Ok(Transceived::status(StatusCode::Timeout));
            }

            self.pins
                .wait_for_interrupt(self.config.poll_interval.min(deadline - now))?;
        }

        if command == Command::Transceive {
            self.clear_bits(Register::BitFramingReg, START_SEND)?;
        }

        // See Section 9.3.1.7 - collisions are handled below, CRC errors are ours to check
        let error = self.read(Register::ErrorReg)?;

        if error & (BUFFER_OVFL | PARITY_ERR | PROTOCOL_ERR) != 0 {
            debug!(self.log, "{:?} failed, ErrorReg {:#04x}", command, error);
            return Ok(Transceived::status(StatusCode::Error));
        }

        let mut reply = Transceived::status(StatusCode::Ok);

        if command == Command::Transceive {
            let fifo_level = (self.read(Register::FIFOLevelReg)? & 0x7F) as usize;

            if fifo_level > options.max_response_len {
                return Ok(Transceived::status(StatusCode::NoRoom));
            }

            reply.data = self.read_many(Register::FIFODataReg, fifo_level)?;
            // See Section 9.3.1.13 - 0 means the whole last byte is valid
            reply.valid_bits = self.read(Register::ControlReg)? & RX_LAST_BITS;
        }

        debug!(
            self.log,
            "{:?} {:02x?} -> {:02x?} ({} bits)",
            command,
            send_data,
            reply.data,
            reply.valid_bits
        );

        if error & COLL_ERR != 0 {
            // See Section 9.3.1.15 - CollPos 0 stands for bit 32
            let coll = self.read(Register::CollReg)?;

            reply.status = StatusCode::Collision;
            reply.collision_position = if coll & COLL_POS_NOT_VALID != 0 {
                None
            } else {
                match coll & COLL_POS {
                    0 => Some(32),
                    position => Some(position),
                }
            };

            return Ok(reply);
        }

        if options.check_crc {
            reply.status = self.check_reply_crc(&reply.data, reply.valid_bits)?;
        }

        Ok(reply)
    }

    fn check_reply_crc(&mut self, data: &[u8], valid_bits: u8) -> Result<StatusCode> {
        // A lone 4 bit frame is a MIFARE ACK or NAK where data was expected
        if data.len() == 1 && valid_bits == 4 {
            return Ok(match data[0] {
                MIFARE_ACK => StatusCode::Ok,
                _ => StatusCode::MifareNack,
            });
        }

        if data.len() < 2 || valid_bits != 0 {
            return Ok(StatusCode::Invalid);
        }

        match self.verify_crc(data) {
            Ok(()) => Ok(StatusCode::Ok),
            Err(Mfrc522Error::Status(code)) => Ok(code),
            Err(Mfrc522Error::Transport(err)) => Err(err),
        }
    }
}
