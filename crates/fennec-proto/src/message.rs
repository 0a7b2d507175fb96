//! DNS message representation.
//!
//! A message is a header, a question section, and the answer, authority, and
//! additional record sections.

use crate::error::{Error, Result};
use crate::header::{HEADER_SIZE, Header, HeaderFlags};
use crate::question::Question;
use crate::rcode::ResponseCode;
use crate::record::ResourceRecord;
use crate::wire::WireReader;
use bytes::{Bytes, BytesMut};
use std::fmt;

/// A complete DNS message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// The message header.
    pub header: Header,
    /// The question section.
    questions: Vec<Question>,
    /// The answer section.
    answers: Vec<ResourceRecord>,
    /// The authority section.
    authority: Vec<ResourceRecord>,
    /// The additional section.
    additional: Vec<ResourceRecord>,
}

impl Message {
    /// Creates a recursion-desired query for a single question.
    pub fn query(question: Question) -> Self {
        Self {
            header: Header::query(),
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Creates an empty response mirroring a query.
    pub fn response_from(query: &Message) -> Self {
        Self {
            header: Header::response_from(&query.header),
            questions: query.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Rewrites this message as a reply to `query`: copies the id, opcode,
    /// RD flag, and question section, and sets QR. Answers and the response
    /// code are left alone.
    pub fn set_reply(&mut self, query: &Message) {
        self.header.id = query.id();
        self.header.opcode = query.header.opcode;
        self.header.flags =
            HeaderFlags::QR | (query.header.flags & HeaderFlags::RD) | (self.header.flags & HeaderFlags::RA);
        self.questions = query.questions.clone();
        self.header.qd_count = self.questions.len() as u16;
    }

    /// Returns the message id.
    #[inline]
    pub fn id(&self) -> u16 {
        self.header.id
    }

    /// Sets the message id.
    #[inline]
    pub fn set_id(&mut self, id: u16) {
        self.header.id = id;
    }

    /// Returns the response code.
    #[inline]
    pub fn rcode(&self) -> ResponseCode {
        self.header.rcode
    }

    /// Sets the response code.
    #[inline]
    pub fn set_rcode(&mut self, rcode: ResponseCode) {
        self.header.rcode = rcode;
    }

    /// Returns the question section.
    #[inline]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Returns the first question if present.
    #[inline]
    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    /// Returns the answer section.
    #[inline]
    pub fn answers(&self) -> &[ResourceRecord] {
        &self.answers
    }

    /// Returns the authority section.
    #[inline]
    pub fn authority(&self) -> &[ResourceRecord] {
        &self.authority
    }

    /// Returns the additional section.
    #[inline]
    pub fn additional(&self) -> &[ResourceRecord] {
        &self.additional
    }

    /// Adds a question.
    pub fn add_question(&mut self, question: Question) {
        self.questions.push(question);
        self.header.qd_count = self.questions.len() as u16;
    }

    /// Adds an answer record.
    pub fn add_answer(&mut self, record: ResourceRecord) {
        self.answers.push(record);
        self.header.an_count = self.answers.len() as u16;
    }

    /// Adds an authority record.
    pub fn add_authority(&mut self, record: ResourceRecord) {
        self.authority.push(record);
        self.header.ns_count = self.authority.len() as u16;
    }

    /// Adds an additional record.
    pub fn add_additional(&mut self, record: ResourceRecord) {
        self.additional.push(record);
        self.header.ar_count = self.additional.len() as u16;
    }

    /// Returns the minimum TTL across the answer section, or zero when there
    /// are no answers. This is the cache lifetime of the message.
    pub fn min_answer_ttl(&self) -> u32 {
        self.answers.iter().map(|r| r.ttl).min().unwrap_or(0)
    }

    /// Parses a message from wire format.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::BufferTooShort {
                needed: HEADER_SIZE,
                have: data.len(),
            });
        }

        let header = Header::parse(data)?;
        let mut reader = WireReader::at(data, HEADER_SIZE);

        let mut questions = Vec::with_capacity(header.qd_count as usize);
        for _ in 0..header.qd_count {
            questions.push(Question::parse(&mut reader)?);
        }

        let mut answers = Vec::with_capacity(header.an_count as usize);
        for _ in 0..header.an_count {
            answers.push(ResourceRecord::parse(&mut reader)?);
        }

        let mut authority = Vec::with_capacity(header.ns_count as usize);
        for _ in 0..header.ns_count {
            authority.push(ResourceRecord::parse(&mut reader)?);
        }

        let mut additional = Vec::with_capacity(header.ar_count as usize);
        for _ in 0..header.ar_count {
            additional.push(ResourceRecord::parse(&mut reader)?);
        }

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }

    /// Returns the uncompressed wire length of this message.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE
            + self.questions.iter().map(Question::wire_len).sum::<usize>()
            + self.answers.iter().map(ResourceRecord::wire_len).sum::<usize>()
            + self.authority.iter().map(ResourceRecord::wire_len).sum::<usize>()
            + self.additional.iter().map(ResourceRecord::wire_len).sum::<usize>()
    }

    /// Writes the message in wire format. Section counts are derived from
    /// the actual section lengths.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let mut header = self.header.clone();
        header.qd_count = self.questions.len() as u16;
        header.an_count = self.answers.len() as u16;
        header.ns_count = self.authority.len() as u16;
        header.ar_count = self.additional.len() as u16;
        header.write_to(buf);

        for q in &self.questions {
            q.write_to(buf);
        }
        for r in &self.answers {
            r.write_to(buf);
        }
        for r in &self.authority {
            r.write_to(buf);
        }
        for r in &self.additional {
            r.write_to(buf);
        }
    }

    /// Serializes the message to wire format bytes.
    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Truncates the message to fit `max_size` bytes, dropping additional,
    /// then authority, then answer records, and sets TC if anything was
    /// dropped.
    pub fn truncate_to(&mut self, max_size: usize) {
        let mut dropped = false;
        while self.wire_len() > max_size {
            if self.additional.pop().is_some()
                || self.authority.pop().is_some()
                || self.answers.pop().is_some()
            {
                dropped = true;
                continue;
            }
            break;
        }

        if dropped {
            self.header.set_truncated(true);
        }
        self.header.an_count = self.answers.len() as u16;
        self.header.ns_count = self.authority.len() as u16;
        self.header.ar_count = self.additional.len() as u16;
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ";; {}", self.header)?;
        for q in &self.questions {
            writeln!(f, ";{}", q)?;
        }
        for r in &self.answers {
            writeln!(f, "{}", r)?;
        }
        for r in &self.authority {
            writeln!(f, "{}", r)?;
        }
        for r in &self.additional {
            writeln!(f, "{}", r)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::rtype::RecordType;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn a_question(name: &str) -> Question {
        Question::a(Name::from_str(name).unwrap())
    }

    #[test]
    fn query_sets_rd() {
        let msg = Message::query(a_question("example.com"));
        assert!(msg.header.is_query());
        assert!(msg.header.recursion_desired());
        assert_eq!(msg.questions().len(), 1);
    }

    #[test]
    fn wire_roundtrip() {
        let mut msg = Message::query(a_question("example.com"));
        msg.set_id(0x1234);
        msg.add_answer(ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(192, 0, 2, 1),
        ));

        let wire = msg.to_wire();
        let parsed = Message::parse(&wire).unwrap();

        assert_eq!(parsed.id(), 0x1234);
        assert_eq!(parsed.questions(), msg.questions());
        assert_eq!(parsed.answers(), msg.answers());
    }

    #[test]
    fn set_reply_preserves_question_and_id() {
        let mut query = Message::query(a_question("example.com"));
        query.set_id(77);

        let mut cached = Message::default();
        cached.add_question(a_question("example.com"));
        cached.add_answer(ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            60,
            Ipv4Addr::new(1, 2, 3, 4),
        ));

        cached.set_reply(&query);
        assert_eq!(cached.id(), 77);
        assert!(cached.header.is_response());
        assert!(cached.header.recursion_desired());
        assert_eq!(cached.questions(), query.questions());
        assert_eq!(cached.answers().len(), 1);
    }

    #[test]
    fn min_answer_ttl_is_minimum() {
        let mut msg = Message::default();
        assert_eq!(msg.min_answer_ttl(), 0);

        let name = Name::from_str("example.com").unwrap();
        msg.add_answer(ResourceRecord::a(name.clone(), 300, Ipv4Addr::new(1, 1, 1, 1)));
        msg.add_answer(ResourceRecord::a(name, 60, Ipv4Addr::new(2, 2, 2, 2)));
        assert_eq!(msg.min_answer_ttl(), 60);
    }

    #[test]
    fn truncation_sets_tc() {
        let mut msg = Message::response_from(&Message::query(a_question("example.com")));
        for i in 0..100 {
            msg.add_answer(ResourceRecord::a(
                Name::from_str(&format!("host{}.example.com", i)).unwrap(),
                300,
                Ipv4Addr::new(192, 0, 2, i as u8),
            ));
        }

        msg.truncate_to(512);
        assert!(msg.wire_len() <= 512);
        assert!(msg.header.is_truncated());
        assert!(msg.answers().len() < 100);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Message::parse(&[0u8; 3]).is_err());
    }

    #[test]
    fn opt_rides_through_additional() {
        // An OPT pseudo-record survives a parse/serialize cycle opaquely.
        let mut msg = Message::query(a_question("example.com"));
        msg.add_additional(ResourceRecord {
            name: Name::root(),
            rtype: RecordType::OPT,
            rclass: crate::class::RecordClass::Unknown(4096),
            ttl: 0,
            rdata: crate::record::RData::Unknown(Vec::new()),
        });

        let wire = msg.to_wire();
        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed.additional().len(), 1);
        assert_eq!(parsed.additional()[0].rtype, RecordType::OPT);
    }
}
