mod anticollision;
mod cancellation_token;
mod crc;
mod firmware;
mod log_macros;
mod mfrc522;
mod mifare;
mod picc;
mod protocol;
pub mod register;
#[cfg(test)]
mod simulator;
mod status;
mod transceive;
mod transport;

pub use crate::anticollision::{AnticollisionRequest, CascadeFrame};
pub use crate::cancellation_token::CancellationToken;
pub use crate::firmware::{ChipRevision, FirmwareVersion};
pub use crate::mfrc522::{Mfrc522, Mfrc522Config, RxGain};
pub use crate::mifare::BLOCK_SIZE;
pub use crate::picc::{Key, PiccCommand, PiccType, Uid, MIFARE_ACK};
pub use crate::status::{Mfrc522Error, StatusCode, TransportError};
pub use crate::transceive::{TransceiveOptions, Transceived};
pub use crate::transport::{GpioPins, ReaderPins, RegisterTransport, SpiTransport};
use clap::{Parser, Subcommand, ValueEnum};
use core::fmt::Arguments;
use rppal::spi::{Bus, SlaveSelect};
use std::error::Error;
use std::{thread, time};

pub trait Mfrc522Log {
    fn output(self: &Self, args: Arguments);
    fn warning(self: &Self, args: Arguments);
    fn error(self: &Self, args: Arguments);
    /// Register and frame level tracing
    fn debug(self: &Self, args: Arguments);
    fn set_color(self: &Self, _color: bool) {}
}

pub struct Mfrc522Tool<'a> {
    log: &'a dyn Mfrc522Log,
}

/// Passes debug lines through only when asked to
struct VerboseFilter<'a> {
    log: &'a dyn Mfrc522Log,
    verbose: bool,
}

impl Mfrc522Log for VerboseFilter<'_> {
    fn output(self: &Self, args: Arguments) {
        self.log.output(args);
    }
    fn warning(self: &Self, args: Arguments) {
        self.log.warning(args);
    }
    fn error(self: &Self, args: Arguments) {
        self.log.error(args);
    }
    fn debug(self: &Self, args: Arguments) {
        if self.verbose {
            self.log.debug(args);
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
#[repr(u8)]
enum BcmPin {
    Pin1 = 1,
    Pin2,
    Pin3,
    Pin4,
    Pin5,
    Pin6,
    Pin7,
    Pin8,
    Pin9,
    Pin10,
    Pin11,
    Pin12,
    Pin13,
    Pin14,
    Pin15,
    Pin16,
    Pin17,
    Pin18,
    Pin19,
    Pin20,
    Pin21,
    Pin22,
    Pin23,
    Pin24,
    Pin25,
    Pin26,
    Pin27,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SpiBus {
    Spi0,
    Spi1,
    Spi2,
}

impl From<SpiBus> for Bus {
    fn from(bus: SpiBus) -> Bus {
        match bus {
            SpiBus::Spi0 => Bus::Spi0,
            SpiBus::Spi1 => Bus::Spi1,
            SpiBus::Spi2 => Bus::Spi2,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ChipSelect {
    Ss0,
    Ss1,
    Ss2,
}

impl From<ChipSelect> for SlaveSelect {
    fn from(ss: ChipSelect) -> SlaveSelect {
        match ss {
            ChipSelect::Ss0 => SlaveSelect::Ss0,
            ChipSelect::Ss1 => SlaveSelect::Ss1,
            ChipSelect::Ss2 => SlaveSelect::Ss2,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Gain {
    Db18,
    Db23,
    Db33,
    Db38,
    Db43,
    Db48,
}

impl From<Gain> for RxGain {
    fn from(gain: Gain) -> RxGain {
        match gain {
            Gain::Db18 => RxGain::Db18,
            Gain::Db23 => RxGain::Db23,
            Gain::Db33 => RxGain::Db33,
            Gain::Db38 => RxGain::Db38,
            Gain::Db43 => RxGain::Db43,
            Gain::Db48 => RxGain::Db48,
        }
    }
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    /// Disable colors in output
    #[arg(long = "no-color", short = 'n', env = "NO_CLI_COLOR")]
    no_color: bool,
    /// Trace every exchange with the reader
    #[arg(long = "verbose", short = 'v')]
    verbose: bool,
    #[arg(long = "bus", value_enum, default_value_t = SpiBus::Spi0)]
    bus: SpiBus,
    #[arg(long = "slave-select", value_enum, default_value_t = ChipSelect::Ss0)]
    slave_select: ChipSelect,
    /// SPI clock in Hz, the MFRC522 handles up to 10MHz
    #[arg(long = "speed", default_value_t = 1_000_000)]
    speed: u32,
    #[arg(long = "reset-pin", short = 'r', value_enum, default_value_t = BcmPin::Pin25)]
    reset_pin: BcmPin,
    /// Without an IRQ line the reader is polled
    #[arg(long = "irq-pin", short = 'i', value_enum)]
    irq_pin: Option<BcmPin>,
    /// Receiver gain
    #[arg(long = "gain", short = 'g', value_enum)]
    gain: Option<Gain>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the reader firmware version
    Version,
    /// Run the reader's digital self test
    Selftest,
    /// Print the UID of each card put on the reader
    Read {
        /// Stop after the first card
        #[arg(long = "once", short = '1')]
        once: bool,
        /// Pause between polls in milliseconds
        #[arg(long = "interval", default_value_t = 500)]
        interval: u64,
    },
    /// Dump one block of a MIFARE Classic card
    ReadBlock {
        block: u8,
        /// Key A as 12 hex digits
        #[arg(long = "key", short = 'k', value_parser = parse_key)]
        key: Option<Key>,
    },
}

fn parse_key(s: &str) -> Result<Key, String> {
    let digits = s.trim_start_matches("0x");

    if digits.len() != 12 || !digits.is_ascii() {
        return Err(format!("'{}' is not 6 bytes of hex", s));
    }

    let mut bytes = [0u8; 6];

    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&digits[2 * i..2 * i + 2], 16)
            .map_err(|err| format!("'{}': {}", s, err))?;
    }

    Ok(Key::new(bytes))
}

type Reader<'a> = Mfrc522<'a, SpiTransport, GpioPins>;

impl<'a> Mfrc522Tool<'a> {
    pub fn new(log: &'a dyn Mfrc522Log) -> Mfrc522Tool<'a> {
        Mfrc522Tool { log }
    }

    pub fn run(
        self: &mut Self,
        args: impl IntoIterator<Item = std::ffi::OsString>,
    ) -> Result<(), Box<dyn Error>> {
        let cli = match Cli::try_parse_from(args) {
            Ok(m) => m,
            Err(err) => {
                output!(self.log, "{}", err.to_string());
                return Ok(());
            }
        };

        self.log.set_color(!cli.no_color);

        let log = VerboseFilter {
            log: self.log,
            verbose: cli.verbose,
        };
        let transport = SpiTransport::new(cli.bus.into(), cli.slave_select.into(), cli.speed)?;
        let pins = GpioPins::new(cli.reset_pin as u8, cli.irq_pin.map(|pin| pin as u8))?;
        let mut mfrc522 = Mfrc522::init(transport, pins, Mfrc522Config::default(), &log)?;

        if let Some(gain) = cli.gain {
            mfrc522.set_antenna_gain(gain.into())?;
        }

        let token = mfrc522.cancellation_token();
        let token_clone = token.clone();

        ctrlc::set_handler(move || {
            token_clone.cancel();
        })?;

        match cli.command {
            Commands::Version => {
                output!(log, "Firmware version: {}", mfrc522.firmware_version()?);
            }
            Commands::Selftest => {
                output!(log, "Firmware version: {}", mfrc522.firmware_version()?);

                if mfrc522.selftest()? {
                    output!(log, "Self test result: OK");
                } else {
                    warning!(log, "Self test result: DEFECT or UNKNOWN");
                }
            }
            Commands::Read { once, interval } => {
                let interval = time::Duration::from_millis(interval);

                while let Some(uid) = Self::wait_for_card(&mut mfrc522, &token, &log, interval)? {
                    output!(
                        log,
                        "UID {}, SAK {:#04x} ({})",
                        uid,
                        uid.sak(),
                        uid.picc_type()
                    );

                    if let Err(err) = mfrc522.picc_halt_a() {
                        warning!(log, "Halting {} failed: {}", uid, err);
                    }

                    if once {
                        break;
                    }
                }
            }
            Commands::ReadBlock { block, key } => {
                let interval = time::Duration::from_millis(100);

                if let Some(uid) = Self::wait_for_card(&mut mfrc522, &token, &log, interval)? {
                    if !uid.picc_type().is_mifare_classic() {
                        warning!(log, "{} is a {}, not MIFARE Classic", uid, uid.picc_type());
                    }

                    let key = key.unwrap_or_default();

                    mfrc522.mf_authenticate(PiccCommand::MfAuthKeyA, block, &key, &uid)?;

                    let data = mfrc522.mf_read(block);

                    // Leave the PICC and the reader in a usable state whatever the read did
                    mfrc522.picc_halt_a()?;
                    mfrc522.stop_crypto1()?;

                    output!(log, "Block {:>3}: {:02X?}", block, data?);
                }
            }
        }

        mfrc522.cleanup()?;

        Ok(())
    }

    /// Poll until a card is selected. `None` once the token is canceled.
    fn wait_for_card(
        mfrc522: &mut Reader<'_>,
        token: &CancellationToken,
        log: &dyn Mfrc522Log,
        interval: time::Duration,
    ) -> Result<Option<Uid>, Mfrc522Error> {
        loop {
            if token.is_canceled() {
                return Ok(None);
            }

            let selected = match mfrc522.is_new_card_present() {
                Ok(true) => mfrc522.read_card_serial().map(Some),
                Ok(false) => Ok(None),
                Err(err) => Err(err),
            };

            match selected {
                Ok(Some(uid)) => return Ok(Some(uid)),
                Ok(None) => {}
                Err(Mfrc522Error::Status(StatusCode::Canceled)) => return Ok(None),
                // The card left the field half way through, try again
                Err(Mfrc522Error::Status(code)) => debug!(log, "No card selected: {}", code),
                Err(err) => return Err(err),
            }

            thread::sleep(interval);
        }
    }
}
