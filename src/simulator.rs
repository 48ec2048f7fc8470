//! Register level stand-in for an MFRC522 with ISO/IEC 14443-3 type A PICCs in its field.
//!
//! Exchanges complete synchronously on the register write that starts them, so a poll of
//! ComIrqReg right afterwards already sees the outcome.

use crate::cancellation_token::CancellationToken;
use crate::firmware::FirmwareVersion;
use crate::mfrc522::{Mfrc522, Mfrc522Config};
use crate::register::*;
use crate::status::TransportError;
use crate::transport::{ReaderPins, RegisterTransport};
use crate::Mfrc522Log;
use core::fmt::Arguments;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

pub type SharedChip = Rc<RefCell<SimulatedChip>>;

const CT: u8 = 0x88;
const SEL: [u8; 3] = [0x93, 0x95, 0x97];
const NAK: u8 = 0x04;
const ACK: u8 = 0x0A;
const BLOCKS: usize = 64;

pub struct TestLogger;

impl Mfrc522Log for TestLogger {
    fn output(self: &Self, _args: Arguments) {}
    fn warning(self: &Self, _args: Arguments) {}
    fn error(self: &Self, _args: Arguments) {}
    fn debug(self: &Self, _args: Arguments) {}
}

pub static TEST_LOGGER: TestLogger = TestLogger;

pub fn test_config() -> Mfrc522Config {
    Mfrc522Config {
        timeout_base: Duration::from_millis(5),
        timeout_per_byte: Duration::ZERO,
        poll_interval: Duration::from_millis(1),
        reset_delay: Duration::ZERO,
    }
}

pub fn reader(chip: &SharedChip) -> Mfrc522<'static, SimTransport, SimPins> {
    reader_with_config(chip, test_config())
}

pub fn reader_with_config(
    chip: &SharedChip,
    config: Mfrc522Config,
) -> Mfrc522<'static, SimTransport, SimPins> {
    Mfrc522::init(
        SimTransport::new(chip),
        SimPins::new(chip),
        config,
        &TEST_LOGGER,
    )
    .unwrap()
}

/// CRC_A of ISO/IEC 14443-3 Annex B, least significant byte first
pub fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;

    for byte in data {
        let mut b = byte ^ (crc & 0xFF) as u8;

        b ^= b << 4;
        crc = (crc >> 8) ^ ((b as u16) << 8) ^ ((b as u16) << 3) ^ ((b as u16) >> 4);
    }

    crc.to_le_bytes()
}

fn with_crc(bytes: &[u8], corrupt: bool) -> Vec<u8> {
    let mut frame = bytes.to_vec();
    let mut crc = crc_a(bytes);

    if corrupt {
        crc[1] ^= 0xFF;
    }

    frame.extend_from_slice(&crc);
    frame
}

fn has_valid_crc(frame: &[u8]) -> bool {
    frame.len() > 2 && crc_a(&frame[..frame.len() - 2]) == frame[frame.len() - 2..]
}

fn bit(bytes: &[u8], index: usize) -> bool {
    bytes[index / 8] & (1 << (index % 8)) != 0
}

fn to_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count).map(|i| bit(bytes, i)).collect()
}

/// UID bits of the cascade level an ANTICOLLISION frame carries, 0 for any other frame
fn level_bits_sent(data: &[u8]) -> usize {
    match data {
        [sel, nvb, ..] if SEL.contains(sel) && *nvb != 0x70 && *nvb >= 0x20 => {
            ((*nvb >> 4) as usize - 2) * 8 + (*nvb & 0x0F) as usize
        }
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiccState {
    Idle,
    Ready,
    Active,
    Halt,
}

pub struct SimulatedPicc {
    pub uid: Vec<u8>,
    pub sak: u8,
    pub state: PiccState,
    pub authenticated: bool,
    /// Send a BCC with one bit flipped
    pub corrupt_bcc: bool,
    pub key: [u8; 6],
    pub blocks: Vec<[u8; 16]>,
    level: usize,
    pending_write: Option<u8>,
}

impl SimulatedPicc {
    pub fn new(uid: &[u8], sak: u8) -> SimulatedPicc {
        SimulatedPicc {
            uid: uid.to_vec(),
            sak,
            state: PiccState::Idle,
            authenticated: false,
            corrupt_bcc: false,
            key: [0xFF; 6],
            blocks: vec![[0u8; 16]; BLOCKS],
            level: 0,
            pending_write: None,
        }
    }

    /// Skip REQA and the cascade
    pub fn activate(&mut self) {
        self.state = PiccState::Active;
        self.level = self.levels() - 1;
    }

    fn levels(&self) -> usize {
        match self.uid.len() {
            4 => 1,
            7 => 2,
            _ => 3,
        }
    }

    fn is_last_level(&self) -> bool {
        self.level + 1 == self.levels()
    }

    fn power_off(&mut self) {
        self.state = PiccState::Idle;
        self.authenticated = false;
        self.pending_write = None;
    }

    fn atqa(&self) -> [u8; 2] {
        match self.uid.len() {
            4 => [0x04, 0x00],
            7 => [0x44, 0x00],
            _ => [0x84, 0x00],
        }
    }

    /// UID part of the current level plus BCC
    fn segment(&self) -> [u8; 5] {
        let start = 3 * self.level;
        let mut segment = [0u8; 5];

        if self.is_last_level() {
            segment[..4].copy_from_slice(&self.uid[start..start + 4]);
        } else {
            segment[0] = CT;
            segment[1..4].copy_from_slice(&self.uid[start..start + 3]);
        }

        segment[4] = segment[..4].iter().fold(0, |bcc, b| bcc ^ b);

        if self.corrupt_bcc {
            segment[4] ^= 0x01;
        }

        segment
    }

    fn auth_uid(&self) -> &[u8] {
        &self.uid[self.uid.len() - 4..]
    }

    /// Reaction to a frame of `data` whose last byte carries `tx_last_bits` bits (0 for 8)
    fn receive(&mut self, data: &[u8], tx_last_bits: u8, corrupt_crc: bool) -> Option<Vec<bool>> {
        if data.len() == 1 && tx_last_bits == 7 {
            return self.receive_short_frame(data[0]);
        }

        match self.state {
            PiccState::Ready => self.receive_select(data, tx_last_bits, corrupt_crc),
            PiccState::Active => self.receive_command(data, corrupt_crc),
            PiccState::Idle | PiccState::Halt => None,
        }
    }

    fn receive_short_frame(&mut self, command: u8) -> Option<Vec<bool>> {
        let wakes = match command {
            0x26 => self.state == PiccState::Idle,
            0x52 => matches!(self.state, PiccState::Idle | PiccState::Halt),
            _ => false,
        };

        if wakes {
            self.state = PiccState::Ready;
            self.level = 0;

            Some(to_bits(&self.atqa(), 16))
        } else {
            if matches!(self.state, PiccState::Ready | PiccState::Active) {
                self.power_off();
            }
            None
        }
    }

    fn receive_select(&mut self, data: &[u8], tx_last_bits: u8, corrupt_crc: bool) -> Option<Vec<bool>> {
        if data.len() < 2 || data[0] != SEL[self.level] {
            self.state = PiccState::Idle;
            return None;
        }

        let segment = self.segment();
        let nvb = data[1];

        if nvb == 0x70 {
            if data.len() != 9 || !has_valid_crc(data) || data[2..7] != segment {
                self.state = PiccState::Idle;
                return None;
            }

            let sak = if self.is_last_level() {
                self.state = PiccState::Active;
                self.sak
            } else {
                self.level += 1;
                0x04
            };

            let reply = with_crc(&[sak], corrupt_crc);

            return Some(to_bits(&reply, 24));
        }

        let whole_bytes = (nvb >> 4) as usize;
        let extra_bits = (nvb & 0x0F) as usize;

        if whole_bytes < 2 || extra_bits != tx_last_bits as usize || extra_bits > 7 {
            return None;
        }

        let known = (whole_bytes - 2) * 8 + extra_bits;

        if known > 32 || data.len() != whole_bytes + usize::from(extra_bits != 0) {
            return None;
        }

        if (0..known).any(|i| bit(&data[2..], i) != bit(&segment, i)) {
            return None;
        }

        Some((known..40).map(|i| bit(&segment, i)).collect())
    }

    fn receive_command(&mut self, data: &[u8], corrupt_crc: bool) -> Option<Vec<bool>> {
        if !has_valid_crc(data) {
            return None;
        }

        let payload = &data[..data.len() - 2];

        if let Some(block) = self.pending_write.take() {
            if payload.len() != 16 {
                return Some(to_bits(&[NAK], 4));
            }
            self.blocks[block as usize].copy_from_slice(payload);
            return Some(to_bits(&[ACK], 4));
        }

        match payload {
            [0x50, 0x00] => {
                self.state = PiccState::Halt;
                self.authenticated = false;
                None
            }
            [0x30, block] if self.authenticated && (*block as usize) < BLOCKS => {
                let reply = with_crc(&self.blocks[*block as usize], corrupt_crc);

                Some(to_bits(&reply, 8 * reply.len()))
            }
            [0xA0, block] if self.authenticated && (*block as usize) < BLOCKS => {
                self.pending_write = Some(*block);
                Some(to_bits(&[ACK], 4))
            }
            [0x30, _] | [0xA0, _] => Some(to_bits(&[NAK], 4)),
            _ => None,
        }
    }
}

pub struct SimulatedChip {
    pub piccs: Vec<SimulatedPicc>,
    /// Every register write, in order
    pub writes: Vec<(Register, u8)>,
    pub accesses: usize,
    pub accesses_at_cancel: usize,
    pub reset_asserted: bool,
    pub version: u8,
    /// Overrides the self test output of the version's reference
    pub selftest_result: Option<[u8; 64]>,
    pub fail_reads: bool,
    /// CalcCRC never raises CRCIRq
    pub crc_stalled: bool,
    /// PICC replies carry a wrong CRC_A
    pub corrupt_crc: bool,
    /// No IRQ at all after a command is started
    pub hang: bool,
    /// Collisions are reported without a usable CollPos
    pub coll_pos_not_valid: bool,
    /// Cancelled on the next wait for the IRQ line
    pub cancel_on_wait: Option<CancellationToken>,
    pub interrupt_waits: usize,
    regs: [u8; 0x40],
    fifo: VecDeque<u8>,
    rx_last_bits: u8,
}

impl SimulatedChip {
    pub fn new() -> SharedChip {
        SimulatedChip::with_piccs(Vec::new())
    }

    pub fn with_piccs(piccs: Vec<SimulatedPicc>) -> SharedChip {
        let mut chip = SimulatedChip {
            piccs,
            writes: Vec::new(),
            accesses: 0,
            accesses_at_cancel: 0,
            reset_asserted: false,
            version: 0x92,
            selftest_result: None,
            fail_reads: false,
            crc_stalled: false,
            corrupt_crc: false,
            hang: false,
            coll_pos_not_valid: false,
            cancel_on_wait: None,
            interrupt_waits: 0,
            regs: [0u8; 0x40],
            fifo: VecDeque::new(),
            rx_last_bits: 0,
        };

        chip.power_on_defaults();

        Rc::new(RefCell::new(chip))
    }

    /// Register contents as the chip would report them, without side effects
    pub fn register(&self, reg: Register) -> u8 {
        match reg {
            Register::FIFOLevelReg => self.fifo.len() as u8,
            Register::FIFODataReg => self.fifo.front().copied().unwrap_or(0),
            Register::VersionReg => self.version,
            Register::ControlReg => (self.regs[reg as usize] & !RX_LAST_BITS) | self.rx_last_bits,
            _ => self.regs[reg as usize],
        }
    }

    pub fn idle_all(&mut self) {
        for picc in self.piccs.iter_mut() {
            picc.power_off();
        }
    }

    fn power_on_defaults(&mut self) {
        // See Section 9.3 for the reset values
        self.regs = [0u8; 0x40];
        self.regs[Register::CommandReg as usize] = 0x20;
        self.regs[Register::ComlEnReg as usize] = 0x80;
        self.regs[Register::ComIrqReg as usize] = 0x14;
        self.regs[Register::ControlReg as usize] = 0x10;
        self.regs[Register::CollReg as usize] = VALUES_AFTER_COLL | COLL_POS_NOT_VALID;
        self.regs[Register::ModeReg as usize] = 0x3F;
        self.regs[Register::TxControlReg as usize] = 0x80;
        self.regs[Register::ModWidthReg as usize] = 0x26;
        self.regs[Register::RFCfgReg as usize] = 0x48;
        self.regs[Register::AutoTestReg as usize] = 0x40;
        self.fifo.clear();
        self.rx_last_bits = 0;
        self.idle_all();
    }

    fn read(&mut self, reg: Register) -> Result<u8, TransportError> {
        self.accesses += 1;

        if self.fail_reads {
            return Err(TransportError::Other("simulated read failure".to_string()));
        }

        if reg == Register::FIFODataReg {
            return Ok(self.fifo.pop_front().unwrap_or(0));
        }

        Ok(self.register(reg))
    }

    fn write(&mut self, reg: Register, value: u8) {
        self.accesses += 1;
        self.writes.push((reg, value));

        match reg {
            Register::CommandReg => self.write_command(value),
            Register::ComIrqReg | Register::DivIrqReg => {
                let index = reg as usize;

                if value & SET1 != 0 {
                    self.regs[index] |= value & 0x7F;
                } else {
                    self.regs[index] &= !(value & 0x7F);
                }
            }
            Register::FIFODataReg => {
                if self.fifo.len() < FIFO_SIZE {
                    self.fifo.push_back(value);
                } else {
                    self.regs[Register::ErrorReg as usize] |= BUFFER_OVFL;
                }
            }
            Register::FIFOLevelReg => {
                if value & FLUSH_BUFFER != 0 {
                    self.fifo.clear();
                    self.regs[Register::ErrorReg as usize] &= !BUFFER_OVFL;
                }
            }
            Register::BitFramingReg => {
                self.regs[reg as usize] = value;

                let running = self.regs[Register::CommandReg as usize] & 0x0F;

                if value & START_SEND != 0 && running == u8::from(Command::Transceive) {
                    self.transceive();
                }
            }
            Register::Status2Reg => {
                self.regs[reg as usize] = value;

                if value & MF_CRYPTO1_ON == 0 {
                    for picc in self.piccs.iter_mut() {
                        picc.authenticated = false;
                    }
                }
            }
            Register::TxControlReg => {
                self.regs[reg as usize] = value;

                if value & TX_RF_EN == 0 {
                    // No field, no powered PICCs
                    self.idle_all();
                }
            }
            _ => self.regs[reg as usize] = value,
        }
    }

    fn write_command(&mut self, value: u8) {
        self.regs[Register::CommandReg as usize] = value;

        match Command::try_from(value) {
            Ok(Command::SoftReset) => self.power_on_defaults(),
            Ok(Command::Mem) => self.fifo.clear(),
            Ok(Command::CalcCrc) => self.calculate_crc(),
            Ok(Command::MfAuthent) => self.authenticate(),
            _ => {}
        }
    }

    fn calculate_crc(&mut self) {
        if self.regs[Register::AutoTestReg as usize] & 0x0F == SELFTEST_ENABLE {
            let result = self.selftest_result.unwrap_or_else(|| {
                FirmwareVersion::from_value(self.version)
                    .selftest_reference()
                    .copied()
                    .unwrap_or([0u8; 64])
            });

            self.fifo.clear();
            self.fifo.extend(result);
            return;
        }

        if self.crc_stalled {
            return;
        }

        let data: Vec<u8> = self.fifo.drain(..).collect();
        let crc = crc_a(&data);

        self.regs[Register::CRCResultRegLow as usize] = crc[0];
        self.regs[Register::CRCResultRegHigh as usize] = crc[1];
        self.regs[Register::DivIrqReg as usize] |= CRC_IRQ;
    }

    fn authenticate(&mut self) {
        if self.hang {
            return;
        }

        let frame: Vec<u8> = self.fifo.drain(..).collect();
        let accepted = frame.len() == 12
            && matches!(frame[0], 0x60 | 0x61)
            && self.piccs.iter_mut().any(|picc| {
                let matches = picc.state == PiccState::Active
                    && picc.key[..] == frame[2..8]
                    && picc.auth_uid() == &frame[8..12];

                if matches {
                    picc.authenticated = true;
                }
                matches
            });

        if accepted {
            self.regs[Register::Status2Reg as usize] |= MF_CRYPTO1_ON;
            self.regs[Register::ComIrqReg as usize] |= IDLE_IRQ;
        } else {
            self.regs[Register::ComIrqReg as usize] |= TIMER_IRQ;
        }
    }

    fn transceive(&mut self) {
        if self.hang {
            return;
        }

        let bit_framing = self.regs[Register::BitFramingReg as usize];
        let tx_last_bits = bit_framing & TX_LAST_BITS;
        let rx_align = ((bit_framing >> RX_ALIGN_SHIFT) & 0x07) as usize;
        let data: Vec<u8> = self.fifo.drain(..).collect();
        let corrupt_crc = self.corrupt_crc;

        self.regs[Register::ErrorReg as usize] = 0;

        let replies: Vec<Vec<bool>> = self
            .piccs
            .iter_mut()
            .filter_map(|picc| picc.receive(&data, tx_last_bits, corrupt_crc))
            .collect();

        if replies.is_empty() {
            self.regs[Register::ComIrqReg as usize] |= TIMER_IRQ;
            return;
        }

        let longest = replies.iter().map(Vec::len).max().unwrap_or(0);
        let mut received = Vec::with_capacity(longest);
        let mut collision = None;

        for i in 0..longest {
            let mut bits = replies.iter().filter_map(|reply| reply.get(i).copied());
            let first = bits.next().unwrap_or(false);

            if collision.is_some() {
                // ValuesAfterColl=0 clears everything from the collision on
                received.push(false);
            } else if bits.all(|b| b == first) {
                received.push(first);
            } else {
                collision = Some(i);
                received.push(false);
            }
        }

        let total = rx_align + received.len();

        self.fifo.clear();
        self.fifo.extend(vec![0u8; (total + 7) / 8]);

        for (i, set) in received.iter().enumerate() {
            if *set {
                let position = rx_align + i;

                self.fifo[position / 8] |= 1 << (position % 8);
            }
        }

        self.rx_last_bits = (total % 8) as u8;

        let coll = self.regs[Register::CollReg as usize] & VALUES_AFTER_COLL;

        match collision {
            Some(i) => {
                let position = level_bits_sent(&data) + i + 1;

                self.regs[Register::CollReg as usize] = if self.coll_pos_not_valid {
                    coll | COLL_POS_NOT_VALID
                } else {
                    coll | (position as u8 & COLL_POS)
                };
                self.regs[Register::ErrorReg as usize] |= COLL_ERR;
                self.regs[Register::ComIrqReg as usize] |= RX_IRQ | ERR_IRQ;
            }
            None => {
                self.regs[Register::CollReg as usize] = coll | COLL_POS_NOT_VALID;
                self.regs[Register::ComIrqReg as usize] |= RX_IRQ;
            }
        }
    }
}

pub struct SimTransport {
    chip: SharedChip,
}

impl SimTransport {
    pub fn new(chip: &SharedChip) -> SimTransport {
        SimTransport {
            chip: Rc::clone(chip),
        }
    }
}

impl RegisterTransport for SimTransport {
    fn read_register(&mut self, reg: Register) -> Result<u8, TransportError> {
        self.chip.borrow_mut().read(reg)
    }

    fn write_register(&mut self, reg: Register, value: u8) -> Result<(), TransportError> {
        self.chip.borrow_mut().write(reg, value);
        Ok(())
    }
}

pub struct SimPins {
    chip: SharedChip,
}

impl SimPins {
    pub fn new(chip: &SharedChip) -> SimPins {
        SimPins {
            chip: Rc::clone(chip),
        }
    }
}

impl ReaderPins for SimPins {
    fn assert_reset(&mut self) -> Result<(), TransportError> {
        let mut chip = self.chip.borrow_mut();

        chip.reset_asserted = true;
        chip.power_on_defaults();
        Ok(())
    }

    fn release_reset(&mut self) -> Result<(), TransportError> {
        self.chip.borrow_mut().reset_asserted = false;
        Ok(())
    }

    fn wait_for_interrupt(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        let asserted = {
            let mut guard = self.chip.borrow_mut();
            let chip = &mut *guard;

            chip.interrupt_waits += 1;

            if let Some(token) = chip.cancel_on_wait.take() {
                token.cancel();
                chip.accesses_at_cancel = chip.accesses;
            }

            let enabled = chip.regs[Register::ComlEnReg as usize] & ALL_COM_IRQS;

            chip.regs[Register::ComIrqReg as usize] & enabled != 0
        };

        if !asserted {
            thread::sleep(timeout);
        }

        Ok(asserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_a_reference_values() {
        assert_eq!(crc_a(&[0x50, 0x00]), [0x57, 0xCD]);
        assert_eq!(crc_a(&[0x08]), [0xB6, 0xDD]);
    }

    #[test]
    fn collision_position_counts_level_bits_sent() {
        assert_eq!(level_bits_sent(&[0x93, 0x20]), 0);
        assert_eq!(level_bits_sent(&[0x93, 0x23, 0x04]), 3);
        assert_eq!(level_bits_sent(&[0x95, 0x34, 0x84, 0x0F]), 12);
        assert_eq!(level_bits_sent(&[0x26]), 0);
        assert_eq!(level_bits_sent(&[0x93, 0x70, 0, 0, 0, 0, 0, 0, 0]), 0);
    }

    #[test]
    fn level_segments() {
        let mut picc = SimulatedPicc::new(&[0x04, 0x25, 0x9A, 0x5A, 0x4F, 0x2B, 0x80], 0x00);

        assert_eq!(picc.segment()[..4], [CT, 0x04, 0x25, 0x9A]);
        picc.level = 1;
        assert_eq!(picc.segment()[..4], [0x5A, 0x4F, 0x2B, 0x80]);
        assert_eq!(picc.segment()[4], 0x5A ^ 0x4F ^ 0x2B ^ 0x80);
    }
}
