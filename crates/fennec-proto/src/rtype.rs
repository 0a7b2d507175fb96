//! Resource record types.
//!
//! The record type is a 16-bit value on the wire; the enum covers the types
//! this resolver materializes and carries everything else as `Unknown`.

use std::fmt;
use std::str::FromStr;

/// A DNS record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    /// IPv4 host address.
    A,
    /// Authoritative name server.
    NS,
    /// Canonical name alias.
    CNAME,
    /// Start of authority.
    SOA,
    /// Domain name pointer.
    PTR,
    /// Mail exchange.
    MX,
    /// Text strings.
    TXT,
    /// IPv6 host address.
    AAAA,
    /// Service locator.
    SRV,
    /// EDNS(0) pseudo record.
    OPT,
    /// Any other type, kept as its raw code.
    Unknown(u16),
}

impl RecordType {
    /// Decodes a record type from its 16-bit code.
    pub const fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::A,
            2 => Self::NS,
            5 => Self::CNAME,
            6 => Self::SOA,
            12 => Self::PTR,
            15 => Self::MX,
            16 => Self::TXT,
            28 => Self::AAAA,
            33 => Self::SRV,
            41 => Self::OPT,
            other => Self::Unknown(other),
        }
    }

    /// Returns the 16-bit code for this type.
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::A => 1,
            Self::NS => 2,
            Self::CNAME => 5,
            Self::SOA => 6,
            Self::PTR => 12,
            Self::MX => 15,
            Self::TXT => 16,
            Self::AAAA => 28,
            Self::SRV => 33,
            Self::OPT => 41,
            Self::Unknown(code) => code,
        }
    }

    /// Returns the mnemonic for this type, if it has one.
    pub const fn mnemonic(self) -> Option<&'static str> {
        match self {
            Self::A => Some("A"),
            Self::NS => Some("NS"),
            Self::CNAME => Some("CNAME"),
            Self::SOA => Some("SOA"),
            Self::PTR => Some("PTR"),
            Self::MX => Some("MX"),
            Self::TXT => Some("TXT"),
            Self::AAAA => Some("AAAA"),
            Self::SRV => Some("SRV"),
            Self::OPT => Some("OPT"),
            Self::Unknown(_) => None,
        }
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        value.to_u16()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mnemonic() {
            Some(name) => f.write_str(name),
            // RFC 3597 presentation for unassigned types.
            None => write!(f, "TYPE{}", self.to_u16()),
        }
    }
}

impl FromStr for RecordType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "NS" => Ok(Self::NS),
            "CNAME" => Ok(Self::CNAME),
            "SOA" => Ok(Self::SOA),
            "PTR" => Ok(Self::PTR),
            "MX" => Ok(Self::MX),
            "TXT" => Ok(Self::TXT),
            "AAAA" => Ok(Self::AAAA),
            "SRV" => Ok(Self::SRV),
            other => match other.strip_prefix("TYPE") {
                Some(digits) => digits.parse().map(Self::from_u16).map_err(|_| ()),
                None => Err(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_known_codes() {
        for code in [1u16, 2, 5, 6, 12, 15, 16, 28, 33, 41] {
            assert_eq!(RecordType::from_u16(code).to_u16(), code);
        }
    }

    #[test]
    fn preserves_unknown_codes() {
        let t = RecordType::from_u16(999);
        assert_eq!(t, RecordType::Unknown(999));
        assert_eq!(t.to_string(), "TYPE999");
    }

    #[test]
    fn parses_mnemonics() {
        assert_eq!("a".parse::<RecordType>().unwrap(), RecordType::A);
        assert_eq!("AAAA".parse::<RecordType>().unwrap(), RecordType::AAAA);
        assert_eq!(
            "TYPE257".parse::<RecordType>().unwrap(),
            RecordType::Unknown(257)
        );
        assert!("BOGUS".parse::<RecordType>().is_err());
    }
}
