//! Structured transport faults.

use std::error::Error;
use std::fmt;
use std::io;

/// Boxed cause attached to a [`Fault`].
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Machine-readable transport fault code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FaultCode {
    /// TLS record could not be decrypted (`ERR_SSL_BAD_DECRYPT`).
    BadDecrypt,
    /// Protocol error on the wire (`EPROTO`).
    Protocol,
    /// Peer reset the connection (`ECONNRESET`).
    ConnectionReset,
    /// Write to a closed connection (`EPIPE`).
    BrokenPipe,
    /// Host name did not resolve (`ENOTFOUND`).
    HostNotFound,
    /// Nothing listening on the target port (`ECONNREFUSED`).
    ConnectionRefused,
    /// Request or connect deadline expired (`ETIMEDOUT`).
    TimedOut,
    /// Any other code, kept verbatim.
    Other(String),
}

impl FaultCode {
    /// Parses a code string. Unknown codes are kept as [`FaultCode::Other`].
    pub fn parse(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "ERR_SSL_BAD_DECRYPT" | "BAD_DECRYPT" => Self::BadDecrypt,
            "EPROTO" => Self::Protocol,
            "ECONNRESET" => Self::ConnectionReset,
            "EPIPE" => Self::BrokenPipe,
            "ENOTFOUND" => Self::HostNotFound,
            "ECONNREFUSED" => Self::ConnectionRefused,
            "ETIMEDOUT" => Self::TimedOut,
            _ => Self::Other(code.to_string()),
        }
    }

    /// Canonical code string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::BadDecrypt => "ERR_SSL_BAD_DECRYPT",
            Self::Protocol => "EPROTO",
            Self::ConnectionReset => "ECONNRESET",
            Self::BrokenPipe => "EPIPE",
            Self::HostNotFound => "ENOTFOUND",
            Self::ConnectionRefused => "ECONNREFUSED",
            Self::TimedOut => "ETIMEDOUT",
            Self::Other(code) => code,
        }
    }

    /// Whether a fault with this code is worth retrying without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::BadDecrypt | Self::Protocol | Self::ConnectionReset | Self::BrokenPipe
        )
    }

    /// Maps a socket-level `io::ErrorKind` onto a fault code.
    pub fn from_io_kind(kind: io::ErrorKind) -> Option<Self> {
        match kind {
            io::ErrorKind::ConnectionReset => Some(Self::ConnectionReset),
            io::ErrorKind::BrokenPipe => Some(Self::BrokenPipe),
            io::ErrorKind::ConnectionRefused => Some(Self::ConnectionRefused),
            io::ErrorKind::TimedOut => Some(Self::TimedOut),
            io::ErrorKind::ConnectionAborted => Some(Self::Other("ECONNABORTED".into())),
            _ => None,
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport failure with an optional code, HTTP status, and cause.
#[derive(Debug)]
pub struct Fault {
    message: String,
    code: Option<FaultCode>,
    status: Option<u16>,
    source: Option<BoxError>,
}

impl Fault {
    /// Creates a fault with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            status: None,
            source: None,
        }
    }

    /// Creates a fault carrying `code`; the message defaults to the code string.
    pub fn from_code(code: FaultCode) -> Self {
        Self::new(code.as_str().to_string()).with_code(code)
    }

    /// Creates a fault for a non-success HTTP status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        Self::new(message).with_status(status)
    }

    pub fn with_code(mut self, code: FaultCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> Option<&FaultCode> {
        self.code.as_ref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) if code.as_str() != self.message => {
                write!(f, "{} ({code})", self.message)
            }
            _ => f.write_str(&self.message),
        }
    }
}

impl Error for Fault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}
