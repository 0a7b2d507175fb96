//! Resource records and their data.

use crate::class::RecordClass;
use crate::error::{Error, Result};
use crate::name::Name;
use crate::rtype::RecordType;
use crate::wire::WireReader;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Record data, decoded for the types this resolver works with and kept
/// opaque for everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    /// IPv4 address.
    A(Ipv4Addr),
    /// IPv6 address.
    Aaaa(Ipv6Addr),
    /// Canonical name.
    Cname(Name),
    /// Name server.
    Ns(Name),
    /// Pointer.
    Ptr(Name),
    /// Mail exchange.
    Mx { preference: u16, exchange: Name },
    /// Text strings.
    Txt(Vec<Vec<u8>>),
    /// Start of authority.
    Soa {
        mname: Name,
        rname: Name,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    /// Undecoded record data.
    Unknown(Vec<u8>),
}

impl RData {
    /// Parses record data of the given type and length.
    ///
    /// The reader must be positioned at the start of the rdata; embedded
    /// names may use compression into the surrounding message.
    pub fn parse(reader: &mut WireReader<'_>, rtype: RecordType, rdlen: usize) -> Result<Self> {
        let start = reader.position();
        if start + rdlen > reader.data().len() {
            return Err(Error::BadRdataLength { len: rdlen });
        }

        let rdata = match rtype {
            RecordType::A => {
                let octets: [u8; 4] = reader
                    .read_bytes(4)?
                    .try_into()
                    .map_err(|_| Error::BadRdataLength { len: rdlen })?;
                Self::A(Ipv4Addr::from(octets))
            }
            RecordType::AAAA => {
                let octets: [u8; 16] = reader
                    .read_bytes(16)?
                    .try_into()
                    .map_err(|_| Error::BadRdataLength { len: rdlen })?;
                Self::Aaaa(Ipv6Addr::from(octets))
            }
            RecordType::CNAME => Self::Cname(Name::parse(reader)?),
            RecordType::NS => Self::Ns(Name::parse(reader)?),
            RecordType::PTR => Self::Ptr(Name::parse(reader)?),
            RecordType::MX => Self::Mx {
                preference: reader.read_u16()?,
                exchange: Name::parse(reader)?,
            },
            RecordType::TXT => {
                let mut strings = Vec::new();
                while reader.position() < start + rdlen {
                    let len = reader.read_u8()? as usize;
                    strings.push(reader.read_bytes(len)?.to_vec());
                }
                Self::Txt(strings)
            }
            RecordType::SOA => Self::Soa {
                mname: Name::parse(reader)?,
                rname: Name::parse(reader)?,
                serial: reader.read_u32()?,
                refresh: reader.read_u32()?,
                retry: reader.read_u32()?,
                expire: reader.read_u32()?,
                minimum: reader.read_u32()?,
            },
            _ => Self::Unknown(reader.read_bytes(rdlen)?.to_vec()),
        };

        // rdata with embedded names can legitimately decode shorter than
        // rdlen once pointers are followed; resync with the declared length.
        reader.seek(start + rdlen);
        Ok(rdata)
    }

    /// Returns the uncompressed wire length of this rdata.
    pub fn wire_len(&self) -> usize {
        match self {
            Self::A(_) => 4,
            Self::Aaaa(_) => 16,
            Self::Cname(n) | Self::Ns(n) | Self::Ptr(n) => n.wire_len(),
            Self::Mx { exchange, .. } => 2 + exchange.wire_len(),
            Self::Txt(strings) => strings.iter().map(|s| s.len() + 1).sum(),
            Self::Soa { mname, rname, .. } => mname.wire_len() + rname.wire_len() + 20,
            Self::Unknown(data) => data.len(),
        }
    }

    /// Writes the rdata (without the length prefix) in wire format.
    pub fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Self::A(addr) => buf.extend_from_slice(&addr.octets()),
            Self::Aaaa(addr) => buf.extend_from_slice(&addr.octets()),
            Self::Cname(n) | Self::Ns(n) | Self::Ptr(n) => n.write_to(buf),
            Self::Mx {
                preference,
                exchange,
            } => {
                buf.put_u16(*preference);
                exchange.write_to(buf);
            }
            Self::Txt(strings) => {
                for s in strings {
                    buf.put_u8(s.len() as u8);
                    buf.extend_from_slice(s);
                }
            }
            Self::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.write_to(buf);
                rname.write_to(buf);
                buf.put_u32(*serial);
                buf.put_u32(*refresh);
                buf.put_u32(*retry);
                buf.put_u32(*expire);
                buf.put_u32(*minimum);
            }
            Self::Unknown(data) => buf.extend_from_slice(data),
        }
    }

    /// Returns the IPv4 address for A rdata.
    pub fn as_a(&self) -> Option<Ipv4Addr> {
        match self {
            Self::A(addr) => Some(*addr),
            _ => None,
        }
    }

    /// Returns the IPv6 address for AAAA rdata.
    pub fn as_aaaa(&self) -> Option<Ipv6Addr> {
        match self {
            Self::Aaaa(addr) => Some(*addr),
            _ => None,
        }
    }

    /// Returns the target name for CNAME rdata.
    pub fn as_cname(&self) -> Option<&Name> {
        match self {
            Self::Cname(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A(addr) => write!(f, "{}", addr),
            Self::Aaaa(addr) => write!(f, "{}", addr),
            Self::Cname(n) | Self::Ns(n) | Self::Ptr(n) => write!(f, "{}", n),
            Self::Mx {
                preference,
                exchange,
            } => write!(f, "{} {}", preference, exchange),
            Self::Txt(strings) => {
                for (i, s) in strings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "\"{}\"", String::from_utf8_lossy(s))?;
                }
                Ok(())
            }
            Self::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => write!(
                f,
                "{} {} {} {} {} {} {}",
                mname, rname, serial, refresh, retry, expire, minimum
            ),
            // RFC 3597 generic representation.
            Self::Unknown(data) => {
                write!(f, "\\# {}", data.len())?;
                for b in data {
                    write!(f, " {:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// A resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Owner name.
    pub name: Name,

    /// Record type.
    pub rtype: RecordType,

    /// Record class.
    pub rclass: RecordClass,

    /// Time to live in seconds.
    pub ttl: u32,

    /// Record data.
    pub rdata: RData,
}

impl ResourceRecord {
    /// Creates a record in the IN class.
    pub fn new(name: Name, rtype: RecordType, ttl: u32, rdata: RData) -> Self {
        Self {
            name,
            rtype,
            rclass: RecordClass::IN,
            ttl,
            rdata,
        }
    }

    /// Creates an A record.
    pub fn a(name: Name, ttl: u32, addr: Ipv4Addr) -> Self {
        Self::new(name, RecordType::A, ttl, RData::A(addr))
    }

    /// Creates an AAAA record.
    pub fn aaaa(name: Name, ttl: u32, addr: Ipv6Addr) -> Self {
        Self::new(name, RecordType::AAAA, ttl, RData::Aaaa(addr))
    }

    /// Creates a CNAME record.
    pub fn cname(name: Name, ttl: u32, target: Name) -> Self {
        Self::new(name, RecordType::CNAME, ttl, RData::Cname(target))
    }

    /// Parses a record from wire format.
    pub fn parse(reader: &mut WireReader<'_>) -> Result<Self> {
        let name = Name::parse(reader)?;
        let rtype = RecordType::from_u16(reader.read_u16()?);
        let rclass = RecordClass::from_u16(reader.read_u16()?);
        let ttl = reader.read_u32()?;
        let rdlen = reader.read_u16()? as usize;
        let rdata = RData::parse(reader, rtype, rdlen)?;

        Ok(Self {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        })
    }

    /// Returns the uncompressed wire length of this record.
    pub fn wire_len(&self) -> usize {
        self.name.wire_len() + 10 + self.rdata.wire_len()
    }

    /// Writes the record in wire format.
    pub fn write_to(&self, buf: &mut BytesMut) {
        self.name.write_to(buf);
        buf.put_u16(self.rtype.to_u16());
        buf.put_u16(self.rclass.to_u16());
        buf.put_u32(self.ttl);
        buf.put_u16(self.rdata.wire_len() as u16);
        self.rdata.write_to(buf);
    }
}

impl fmt::Display for ResourceRecord {
    /// Renders the record in zone-file presentation format. The rdata is the
    /// rightmost whitespace-separated field, which the query logger relies
    /// on.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.name, self.ttl, self.rclass, self.rtype, self.rdata
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn roundtrip(record: &ResourceRecord) -> ResourceRecord {
        let mut buf = BytesMut::new();
        record.write_to(&mut buf);
        assert_eq!(buf.len(), record.wire_len());

        let mut reader = WireReader::new(&buf);
        ResourceRecord::parse(&mut reader).unwrap()
    }

    #[test]
    fn a_record_roundtrip() {
        let record = ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(192, 0, 2, 1),
        );
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn aaaa_record_roundtrip() {
        let record = ResourceRecord::aaaa(
            Name::from_str("example.com").unwrap(),
            60,
            "2001:db8::1".parse().unwrap(),
        );
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn cname_record_roundtrip() {
        let record = ResourceRecord::cname(
            Name::from_str("www.example.com").unwrap(),
            3600,
            Name::from_str("example.com").unwrap(),
        );
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn txt_record_roundtrip() {
        let record = ResourceRecord::new(
            Name::from_str("example.com").unwrap(),
            RecordType::TXT,
            120,
            RData::Txt(vec![b"v=spf1 -all".to_vec()]),
        );
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn unknown_rdata_is_opaque() {
        let record = ResourceRecord::new(
            Name::from_str("example.com").unwrap(),
            RecordType::Unknown(99),
            0,
            RData::Unknown(vec![1, 2, 3]),
        );
        let parsed = roundtrip(&record);
        assert_eq!(parsed.rdata, RData::Unknown(vec![1, 2, 3]));
    }

    #[test]
    fn display_ends_with_rdata() {
        let record = ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(1, 2, 3, 4),
        );
        let rendered = record.to_string();
        let last = rendered.split_whitespace().last().unwrap();
        assert_eq!(last, "1.2.3.4");
    }

    #[test]
    fn rejects_rdata_overrunning_message() {
        let mut buf = BytesMut::new();
        Name::from_str("a.example").unwrap().write_to(&mut buf);
        buf.put_u16(RecordType::A.to_u16());
        buf.put_u16(1);
        buf.put_u32(60);
        buf.put_u16(40); // claims 40 bytes of rdata
        buf.put_u8(1);

        let mut reader = WireReader::new(&buf);
        assert!(ResourceRecord::parse(&mut reader).is_err());
    }
}
