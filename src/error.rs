//! `pgwire2` error types.
use std::{backtrace::Backtrace, fmt, io, str::Utf8Error};

use crate::config::ParseError;

/// A specialized [`Result`] type for `pgwire2` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible errors from the `pgwire2` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Attach a human-readable location to an error, e.g. `"startup phase"`.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        ErrorKind::Protocol(msg.into()).into()
    }

    pub(crate) fn auth(msg: impl Into<String>) -> Self {
        ErrorKind::Auth(msg.into()).into()
    }

    pub(crate) fn sql(msg: impl Into<String>) -> Self {
        ErrorKind::Sql(msg.into()).into()
    }

    pub(crate) fn invalid_arg(msg: impl Into<String>) -> Self {
        ErrorKind::InvalidArg(msg.into()).into()
    }

    pub(crate) fn connection_closed() -> Self {
        ErrorKind::ConnectionClosed.into()
    }
}

/// All possible error kinds from the `pgwire2` library, per the driver's
/// error-handling design: I/O and protocol errors are terminal for the
/// connection, `Sql` is recoverable.
pub enum ErrorKind {
    /// Missing or invalid configuration (e.g. no user), raised before any I/O.
    Config(ParseError),
    /// TCP-layer failure during connect or in-flight; terminal.
    Io(io::Error),
    /// Backend rejected credentials or requested an unsupported auth method.
    Auth(String),
    /// Unexpected tag, truncated message, or length mismatch; terminal.
    Protocol(String),
    /// Backend sent an `ErrorResponse` during a query; the connection remains usable.
    Sql(String),
    /// Caller passed an isolation level or parameter the driver cannot express.
    InvalidArg(String),
    /// Operation attempted on a connection that is already closed.
    ConnectionClosed,
    Utf8(Utf8Error),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<std::io::Error>e => ErrorKind::Io(e));
from!(<Utf8Error>e => ErrorKind::Utf8(e));

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind {}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Auth(msg) => write!(f, "authentication failed: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Sql(msg) => write!(f, "{msg}"),
            Self::InvalidArg(msg) => write!(f, "invalid argument: {msg}"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::Utf8(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
