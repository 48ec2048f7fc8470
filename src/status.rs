use thiserror::Error;

/// Outcome of a protocol level exchange with the PCD or a PICC
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    #[error("success")]
    Ok,
    #[error("error in communication")]
    Error,
    #[error("collision detected")]
    Collision,
    #[error("timeout in communication")]
    Timeout,
    #[error("a buffer is not big enough")]
    NoRoom,
    #[error("internal error in the driver")]
    InternalError,
    #[error("invalid argument")]
    Invalid,
    #[error("the CRC_A does not match")]
    CrcWrong,
    #[error("a MIFARE PICC responded with NAK")]
    MifareNack,
    #[error("operation canceled")]
    Canceled,
}

impl StatusCode {
    #[inline]
    pub fn is_ok(&self) -> bool {
        *self == StatusCode::Ok
    }

    /// `Ok(())` for [`StatusCode::Ok`], otherwise the code as an error
    pub fn into_result(self) -> Result<()> {
        match self {
            StatusCode::Ok => Ok(()),
            code => Err(Mfrc522Error::Status(code)),
        }
    }
}

/// Failure of the bus or pins underneath the protocol
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("SPI error: {0}")]
    Spi(#[from] rppal::spi::Error),
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
    #[error("transport error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum Mfrc522Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Status(StatusCode),
}

impl Mfrc522Error {
    /// The protocol status, or `None` if the transport failed
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Mfrc522Error::Status(code) => Some(*code),
            Mfrc522Error::Transport(_) => None,
        }
    }
}

impl From<StatusCode> for Mfrc522Error {
    fn from(code: StatusCode) -> Self {
        Mfrc522Error::Status(code)
    }
}

pub type Result<T> = std::result::Result<T, Mfrc522Error>;
