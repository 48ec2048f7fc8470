//! Bus and pin capabilities the driver is built on.
//!
//! The driver only ever sees [`RegisterTransport`] and [`ReaderPins`]; the rppal backed
//! implementations below are what the CLI wires up on a Raspberry Pi.

use crate::register::Register;
use crate::status::TransportError;
use rppal::gpio::{Gpio, InputPin, OutputPin, Trigger};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use std::thread;
use std::time::Duration;

type Result<T> = std::result::Result<T, TransportError>;

/// Single register access to the PCD
pub trait RegisterTransport {
    fn read_register(&mut self, reg: Register) -> Result<u8>;
    fn write_register(&mut self, reg: Register, value: u8) -> Result<()>;
}

/// Reset and interrupt lines of the PCD
pub trait ReaderPins {
    /// Drive NRSTPD low, powering the chip down
    fn assert_reset(&mut self) -> Result<()>;
    /// Drive NRSTPD high, starting the oscillator
    fn release_reset(&mut self) -> Result<()>;
    /// Block until the IRQ line is asserted or `timeout` passes. Returns `true` when asserted.
    fn wait_for_interrupt(&mut self, timeout: Duration) -> Result<bool>;
}

/// MFRC522 register access over SPI, see Section 8.1.2
pub struct SpiTransport {
    spi: Spi,
}

impl SpiTransport {
    pub fn new(bus: Bus, slave_select: SlaveSelect, clock_speed: u32) -> Result<SpiTransport> {
        // Section 8.1.2 - data is sampled on the rising clock edge, clock idles low
        let spi = Spi::new(bus, slave_select, clock_speed, Mode::Mode0)?;

        Ok(SpiTransport { spi })
    }

    #[inline]
    fn address(reg: Register) -> u8 {
        ((reg as u8) << 1) & 0x7e
    }
}

impl RegisterTransport for SpiTransport {
    fn read_register(&mut self, reg: Register) -> Result<u8> {
        // See Section 8.1.2.1 - MSB set means read; the zero byte terminates the address list
        let write_buffer = [Self::address(reg) | 0x80, 0];
        let mut read_buffer = [0u8; 2];

        // Transfer will only receive as much as was sent
        self.spi.transfer(&mut read_buffer, &write_buffer)?;

        // The result is in the second byte, not the first
        Ok(read_buffer[1])
    }

    fn write_register(&mut self, reg: Register, value: u8) -> Result<()> {
        // See Section 8.1.2.2 - no terminating byte needed when writing
        self.spi.write(&[Self::address(reg), value])?;

        Ok(())
    }
}

/// Reset and IRQ lines on Raspberry Pi GPIO, BCM numbering
pub struct GpioPins {
    reset: OutputPin,
    irq: Option<InputPin>,
}

impl GpioPins {
    pub fn new(reset_pin: u8, irq_pin: Option<u8>) -> Result<GpioPins> {
        let gpio = Gpio::new()?;
        let mut reset = gpio.get(reset_pin)?.into_output();

        // Cleanup decides the final level, not rppal
        reset.set_reset_on_drop(false);

        let irq = match irq_pin {
            Some(pin) => {
                let mut irq = gpio.get(pin)?.into_input_pullup();

                // IRQ is configured active low in ComIEnReg
                irq.set_interrupt(Trigger::FallingEdge, None)?;
                Some(irq)
            }
            None => None,
        };

        Ok(GpioPins { reset, irq })
    }
}

impl ReaderPins for GpioPins {
    fn assert_reset(&mut self) -> Result<()> {
        self.reset.set_low();
        Ok(())
    }

    fn release_reset(&mut self) -> Result<()> {
        self.reset.set_high();
        Ok(())
    }

    fn wait_for_interrupt(&mut self, timeout: Duration) -> Result<bool> {
        match self.irq.as_mut() {
            Some(irq) => Ok(irq.poll_interrupt(true, Some(timeout))?.is_some()),
            None => {
                // No IRQ line wired; the caller polls ComIrqReg after the nap
                thread::sleep(timeout);
                Ok(false)
            }
        }
    }
}
