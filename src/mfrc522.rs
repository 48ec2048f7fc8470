use crate::cancellation_token::CancellationToken;
use crate::register::*;
use crate::status::TransportError;
use crate::transport::{ReaderPins, RegisterTransport};
use crate::{debug, warning, Mfrc522Log};
use std::thread;
use std::time::{Duration, Instant};

type Result<T> = std::result::Result<T, TransportError>;

// MFRC522 chip frequency
const MFRC_FREQ: f64 = 13.56e6;
// See Section 9.3.3.10 - this is the desired MFRC522 countdown timer tick frequency
const TICK_FREQ: f64 = 40e3;
// The inverse calculation to get the desired prescale value
const PRESCALE: f64 = (MFRC_FREQ - TICK_FREQ) / (2.0 * TICK_FREQ);
// The desired MFRC522 countdown timer interval
const TIMER_INTERVAL: f64 = 0.025;
// Soft reset takes the oscillator start-up time, see Section 8.8.2
const SOFT_RESET_RETRIES: usize = 3;
// Upper bound on waiting for the chip to leave soft power-down
const POWER_UP_TIMEOUT: Duration = Duration::from_millis(500);

/// Timing parameters of a reader
#[derive(Debug, Clone)]
pub struct Mfrc522Config {
    /// Fixed part of the wait for a PICC reply
    pub timeout_base: Duration,
    /// Added per byte sent and per byte of expected reply
    pub timeout_per_byte: Duration,
    /// Longest nap on the IRQ line between cancellation checks
    pub poll_interval: Duration,
    /// Hold and settle time of the reset line and the soft reset
    pub reset_delay: Duration,
}

impl Default for Mfrc522Config {
    fn default() -> Self {
        Mfrc522Config {
            // A little beyond the chip's own 25ms timer
            timeout_base: Duration::from_millis(36),
            timeout_per_byte: Duration::from_micros(500),
            poll_interval: Duration::from_millis(5),
            reset_delay: Duration::from_millis(50),
        }
    }
}

impl Mfrc522Config {
    /// How long to wait for an exchange of `send_len` bytes expecting up to `reply_len` back
    pub fn wait_budget(&self, send_len: usize, reply_len: usize) -> Duration {
        self.timeout_base + self.timeout_per_byte * (send_len + reply_len) as u32
    }
}

/// Receiver gain, RFCfgReg RxGain[2:0], see Section 9.3.3.6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RxGain {
    Db18 = 0x00 << 4,
    Db23 = 0x01 << 4,
    Db33 = 0x04 << 4,
    Db38 = 0x05 << 4,
    Db43 = 0x06 << 4,
    Db48 = 0x07 << 4,
}

impl RxGain {
    fn from_bits(value: u8) -> RxGain {
        // 010b and 011b are duplicates of 18dB and 23dB
        match (value & RX_GAIN_MASK) >> 4 {
            0x00 | 0x02 => RxGain::Db18,
            0x01 | 0x03 => RxGain::Db23,
            0x04 => RxGain::Db33,
            0x05 => RxGain::Db38,
            0x06 => RxGain::Db43,
            _ => RxGain::Db48,
        }
    }
}

/// A handle on one MFRC522 chip.
///
/// Owns the register transport and the reset/IRQ pins. Created by [`Mfrc522::init`];
/// [`Mfrc522::cleanup`] or dropping the handle switches the antenna off and holds the chip in reset.
pub struct Mfrc522<'a, T: RegisterTransport, P: ReaderPins> {
    pub(crate) transport: T,
    pub(crate) pins: P,
    pub(crate) config: Mfrc522Config,
    pub(crate) cancel: CancellationToken,
    pub(crate) log: &'a dyn Mfrc522Log,
    released: bool,
}

impl<'a, T: RegisterTransport, P: ReaderPins> Mfrc522<'a, T, P> {
    /// Hard reset the chip through the reset line and bring it into a known configuration
    pub fn init(
        transport: T,
        pins: P,
        config: Mfrc522Config,
        log: &'a dyn Mfrc522Log,
    ) -> Result<Mfrc522<'a, T, P>> {
        let mut mfrc522 = Mfrc522 {
            transport,
            pins,
            config,
            cancel: CancellationToken::new(),
            log,
            released: false,
        };

        // On error the handle is dropped here, which puts the chip back into reset
        mfrc522.hard_reset()?;
        mfrc522.reset()?;

        Ok(mfrc522)
    }

    /// Switch the RF field off and hold the chip in reset
    pub fn cleanup(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        self.released = true;

        let antenna = self.antenna_off();
        let reset = self.pins.assert_reset();

        antenna.and(reset)
    }

    fn hard_reset(&mut self) -> Result<()> {
        // See Section 8.8.1 - a low level on NRSTPD for at least 100ns resets the chip
        self.pins.assert_reset()?;
        thread::sleep(self.config.reset_delay);
        self.pins.release_reset()?;
        thread::sleep(self.config.reset_delay);

        Ok(())
    }

    /// Token checked while waiting for a PICC. Cancel a clone of it from another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn set_cancellation_token(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    pub fn config(&self) -> &Mfrc522Config {
        &self.config
    }

    pub fn read(&mut self, reg: Register) -> Result<u8> {
        self.transport.read_register(reg)
    }

    pub fn write(&mut self, reg: Register, value: u8) -> Result<()> {
        self.transport.write_register(reg, value)
    }

    pub fn read_many(&mut self, reg: Register, count: usize) -> Result<Vec<u8>> {
        let mut values = Vec::with_capacity(count);

        for _ in 0..count {
            values.push(self.read(reg)?);
        }

        Ok(values)
    }

    pub fn write_many(&mut self, reg: Register, values: &[u8]) -> Result<()> {
        for value in values {
            self.write(reg, *value)?;
        }

        Ok(())
    }

    fn read_write(&mut self, reg: Register, func: impl FnOnce(u8) -> u8) -> Result<()> {
        let value = self.read(reg)?;
        let new_value = func(value);
        self.write(reg, new_value)?;

        Ok(())
    }

    /// Replace the bits of `reg` selected by `mask` with those of `value`
    pub fn write_bits(&mut self, reg: Register, mask: u8, value: u8) -> Result<()> {
        self.read_write(reg, |old| (old & !mask) | (value & mask))
    }

    pub fn set_bits(&mut self, reg: Register, mask: u8) -> Result<()> {
        self.read_write(reg, |value| value | mask)
    }

    pub fn clear_bits(&mut self, reg: Register, mask: u8) -> Result<()> {
        self.read_write(reg, |value| value & !mask)
    }

    /// Write the command register without waiting for the command to finish.
    /// Any command still running on the chip is replaced.
    pub fn start_command(&mut self, command: Command) -> Result<()> {
        self.write(Register::CommandReg, command.into())
    }

    /// Soft reset and reconfigure the chip. Safe to call at any time.
    pub fn reset(&mut self) -> Result<()> {
        // See Section 9.3.1.2 - soft reset the chip, setting all registers to defaults
        self.start_command(Command::SoftReset)?;

        let mut powered_up = false;

        for _ in 0..SOFT_RESET_RETRIES {
            thread::sleep(self.config.reset_delay);

            if self.read(Register::CommandReg)? & POWER_DOWN == 0 {
                powered_up = true;
                break;
            }
        }

        if !powered_up {
            warning!(self.log, "MFRC522 still in power down after soft reset");
        }

        // Leave any baud rate set by the last PICC exchange
        self.write(Register::TxModeReg, 0x00)?;
        self.write(Register::RxModeReg, 0x00)?;
        // See Section 9.3.3.4 - default modulation width
        self.write(Register::ModWidthReg, 0x26)?;

        let prescale_bytes = (PRESCALE as u16).to_be_bytes();

        // See Section 9.3.3.10:
        // TAuto=1 - timer starts automatically at the end of the transmission in all communication modes at all speeds
        // TGated=0 - timer is not gated by pins MFIN or AUX1
        // TAutoRestart=0 - set IRQ bit instead of restarting timer
        // TPrescaler_Hi=hh - high 4-bits of prescaler value
        self.write(Register::TModeReg, 0x80 | (prescale_bytes[0] & 0xF))?;
        // TPreScalerLo=ll - low bits of prescaler value
        // 0x0a9 = 169, so f_timer = 13560000 / (2 * 169 + 1) ~= 40kHz.  1/40kHz = 25us per timer tick
        self.write(Register::TPrescalerReg, prescale_bytes[1])?;

        let timer_ticks = (TIMER_INTERVAL / (1.0 / TICK_FREQ)).ceil() as u16;
        let timer_tick_bytes = timer_ticks.to_be_bytes();

        // See Section 9.3.3.11 - timer reload value
        // With a 25us tick, reloading with 1000 gives a 25ms timeout
        self.write(Register::TReloadRegHigh, timer_tick_bytes[0])?;
        self.write(Register::TReloadRegLow, timer_tick_bytes[1])?;

        // See Section 9.3.2.6 - ForceASK100=1, 100% ASK modulation always
        self.write(Register::TxASKReg, 0b0100_0000)?;

        // See Section 9.3.2.2 - CRC coprocessor preset 0x6363 (ISO 14443-3 part 6.2.4)
        // MSBFirst=0, TxWaitRF=1, PolMFin=0, CRCPreset=01
        self.write(Register::ModeReg, 0b0011_1101)?;

        self.antenna_on()?;

        debug!(self.log, "MFRC522 reset, timer {} ticks", timer_ticks);

        Ok(())
    }

    /// See Section 9.3.2.5 - Tx1RFEn and Tx2RFEn drive the 13.56MHz carrier on TX1 and TX2
    pub fn antenna_on(&mut self) -> Result<()> {
        let value = self.read(Register::TxControlReg)?;

        if value & TX_RF_EN != TX_RF_EN {
            self.write(Register::TxControlReg, value | TX_RF_EN)?;
        }

        Ok(())
    }

    pub fn antenna_off(&mut self) -> Result<()> {
        self.clear_bits(Register::TxControlReg, TX_RF_EN)
    }

    /// See Section 8.6.2 - everything but the serial interface stops, the RF field included
    pub fn soft_power_down(&mut self) -> Result<()> {
        self.set_bits(Register::CommandReg, POWER_DOWN)
    }

    pub fn soft_power_up(&mut self) -> Result<()> {
        self.clear_bits(Register::CommandReg, POWER_DOWN)?;

        // The chip clears PowerDown itself once the oscillator is running again
        let deadline = Instant::now() + POWER_UP_TIMEOUT;

        while self.read(Register::CommandReg)? & POWER_DOWN != 0 {
            if Instant::now() >= deadline {
                warning!(self.log, "MFRC522 did not leave soft power down");
                break;
            }
            thread::sleep(self.config.poll_interval);
        }

        Ok(())
    }

    pub fn antenna_gain(&mut self) -> Result<RxGain> {
        Ok(RxGain::from_bits(self.read(Register::RFCfgReg)?))
    }

    pub fn set_antenna_gain(&mut self, gain: RxGain) -> Result<()> {
        if self.antenna_gain()? != gain {
            self.write_bits(Register::RFCfgReg, RX_GAIN_MASK, gain as u8)?;
        }

        Ok(())
    }
}

impl<T: RegisterTransport, P: ReaderPins> Drop for Mfrc522<'_, T, P> {
    fn drop(&mut self) {
        // Nothing more can be done about a failing bus here
        let _ = self.release();
    }
}
