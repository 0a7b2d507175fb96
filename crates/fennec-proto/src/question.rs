//! Question section entries.

use crate::class::RecordClass;
use crate::error::Result;
use crate::name::Name;
use crate::rtype::RecordType;
use crate::wire::WireReader;
use bytes::{BufMut, BytesMut};
use std::fmt;

/// A single entry in the question section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    /// The name being queried.
    pub qname: Name,

    /// The requested record type.
    pub qtype: RecordType,

    /// The query class.
    pub qclass: RecordClass,
}

impl Question {
    /// Creates a question for the given name and type in the IN class.
    pub fn new(qname: Name, qtype: RecordType) -> Self {
        Self {
            qname,
            qtype,
            qclass: RecordClass::IN,
        }
    }

    /// Creates an A question.
    pub fn a(qname: Name) -> Self {
        Self::new(qname, RecordType::A)
    }

    /// Creates an AAAA question.
    pub fn aaaa(qname: Name) -> Self {
        Self::new(qname, RecordType::AAAA)
    }

    /// Parses a question from wire format.
    pub fn parse(reader: &mut WireReader<'_>) -> Result<Self> {
        let qname = Name::parse(reader)?;
        let qtype = RecordType::from_u16(reader.read_u16()?);
        let qclass = RecordClass::from_u16(reader.read_u16()?);
        Ok(Self {
            qname,
            qtype,
            qclass,
        })
    }

    /// Returns the wire length of this question.
    pub fn wire_len(&self) -> usize {
        self.qname.wire_len() + 4
    }

    /// Writes the question in wire format.
    pub fn write_to(&self, buf: &mut BytesMut) {
        self.qname.write_to(buf);
        buf.put_u16(self.qtype.to_u16());
        buf.put_u16(self.qclass.to_u16());
    }
}

impl fmt::Display for Question {
    // A question renders like a record without TTL or rdata.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.qname, self.qclass, self.qtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn wire_roundtrip() {
        let q = Question::a(Name::from_str("example.com").unwrap());

        let mut buf = BytesMut::new();
        q.write_to(&mut buf);
        assert_eq!(buf.len(), q.wire_len());

        let mut reader = WireReader::new(&buf);
        let parsed = Question::parse(&mut reader).unwrap();
        assert_eq!(parsed, q);
    }

    #[test]
    fn display_format() {
        let q = Question::new(Name::from_str("example.com").unwrap(), RecordType::AAAA);
        assert_eq!(q.to_string(), "example.com.\tIN\tAAAA");
    }
}
