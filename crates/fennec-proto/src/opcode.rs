//! Operation codes.

use std::fmt;

/// A DNS operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OpCode {
    /// A standard query.
    #[default]
    Query,
    /// An inverse query (obsolete).
    IQuery,
    /// A server status request.
    Status,
    /// Zone change notification.
    Notify,
    /// Dynamic update.
    Update,
    /// Any other opcode.
    Unknown(u8),
}

impl OpCode {
    /// Decodes an opcode from its 4-bit header field.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Query,
            1 => Self::IQuery,
            2 => Self::Status,
            4 => Self::Notify,
            5 => Self::Update,
            other => Self::Unknown(other),
        }
    }

    /// Returns the 4-bit code.
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Query => 0,
            Self::IQuery => 1,
            Self::Status => 2,
            Self::Notify => 4,
            Self::Update => 5,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("QUERY"),
            Self::IQuery => f.write_str("IQUERY"),
            Self::Status => f.write_str("STATUS"),
            Self::Notify => f.write_str("NOTIFY"),
            Self::Update => f.write_str("UPDATE"),
            Self::Unknown(code) => write!(f, "OPCODE{}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_codes() {
        for code in [0u8, 1, 2, 4, 5, 9] {
            assert_eq!(OpCode::from_u8(code).to_u8(), code);
        }
    }
}
