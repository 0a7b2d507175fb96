//! Response codes.

use std::fmt;

/// A DNS response code (4-bit header field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResponseCode {
    /// No error condition.
    #[default]
    NoError,
    /// The server could not interpret the query.
    FormErr,
    /// The server failed to complete the request.
    ServFail,
    /// The queried name does not exist.
    NXDomain,
    /// The requested operation is not supported.
    NotImp,
    /// The server refuses to answer.
    Refused,
    /// Any other code.
    Unknown(u8),
}

impl ResponseCode {
    /// Decodes a response code from the low 4 bits of the header.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::FormErr,
            2 => Self::ServFail,
            3 => Self::NXDomain,
            4 => Self::NotImp,
            5 => Self::Refused,
            other => Self::Unknown(other),
        }
    }

    /// Returns the 4-bit code.
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::NoError => 0,
            Self::FormErr => 1,
            Self::ServFail => 2,
            Self::NXDomain => 3,
            Self::NotImp => 4,
            Self::Refused => 5,
            Self::Unknown(code) => code,
        }
    }

    /// Returns true for NOERROR.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::NoError)
    }

    /// Returns true for SERVFAIL.
    pub const fn is_server_error(self) -> bool {
        matches!(self, Self::ServFail)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => f.write_str("NOERROR"),
            Self::FormErr => f.write_str("FORMERR"),
            Self::ServFail => f.write_str("SERVFAIL"),
            Self::NXDomain => f.write_str("NXDOMAIN"),
            Self::NotImp => f.write_str("NOTIMP"),
            Self::Refused => f.write_str("REFUSED"),
            Self::Unknown(code) => write!(f, "RCODE{}", code),
        }
    }
}
