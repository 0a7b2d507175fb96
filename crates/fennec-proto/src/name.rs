//! Domain names.
//!
//! Names are stored as a sequence of labels with their original case.
//! Comparison and hashing are ASCII-case-insensitive, matching DNS
//! semantics; callers that need a canonical string (cache keys) use
//! [`Name::to_lowercase_string`].

use crate::error::{Error, Result};
use crate::wire::WireReader;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Maximum length of a single label in octets.
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum wire length of a full name in octets.
pub const MAX_NAME_LEN: usize = 255;

/// A fully-qualified domain name.
#[derive(Debug, Clone, Default)]
pub struct Name {
    labels: Vec<Vec<u8>>,
}

impl Name {
    /// Returns the root name.
    pub fn root() -> Self {
        Self { labels: Vec::new() }
    }

    /// Returns true if this is the root name.
    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the number of labels.
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Returns the labels.
    pub fn labels(&self) -> impl Iterator<Item = &[u8]> {
        self.labels.iter().map(|l| l.as_slice())
    }

    /// Returns the wire length of this name (labels plus the terminal zero).
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Renders the absolute name lowercased, with a trailing dot.
    ///
    /// This is the canonical cache key form.
    pub fn to_lowercase_string(&self) -> String {
        self.to_string().to_ascii_lowercase()
    }

    /// Parses a name from wire format, following compression pointers.
    ///
    /// The reader is left positioned after the name as it appears at the
    /// original offset, regardless of where pointers led.
    pub fn parse(reader: &mut WireReader<'_>) -> Result<Self> {
        let mut labels = Vec::new();
        let mut wire_len = 0usize;
        // Position to restore once the first pointer is taken.
        let mut resume: Option<usize> = None;
        let mut jumps = 0usize;

        loop {
            let at = reader.position();
            let len = reader.read_u8()? as usize;

            match len {
                0 => break,
                1..=MAX_LABEL_LEN => {
                    wire_len += len + 1;
                    if wire_len + 1 > MAX_NAME_LEN {
                        return Err(Error::NameTooLong(wire_len + 1));
                    }
                    labels.push(reader.read_bytes(len)?.to_vec());
                }
                l if l & 0xC0 == 0xC0 => {
                    let low = reader.read_u8()? as usize;
                    let target = ((l & 0x3F) << 8) | low;
                    // Pointers must go backwards; forward pointers can loop.
                    if target >= at {
                        return Err(Error::BadPointer(at));
                    }
                    jumps += 1;
                    if jumps > 64 {
                        return Err(Error::PointerLoop);
                    }
                    if resume.is_none() {
                        resume = Some(reader.position());
                    }
                    reader.seek(target);
                }
                _ => return Err(Error::BadPointer(at)),
            }
        }

        if let Some(pos) = resume {
            reader.seek(pos);
        }

        Ok(Self { labels })
    }

    /// Writes the name in uncompressed wire format.
    pub fn write_to(&self, buf: &mut BytesMut) {
        for label in &self.labels {
            buf.put_u8(label.len() as u8);
            buf.extend_from_slice(label);
        }
        buf.put_u8(0);
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_suffix('.').unwrap_or(s);
        if s.is_empty() {
            return Ok(Self::root());
        }

        let mut labels = Vec::new();
        let mut wire_len = 0usize;
        for label in s.split('.') {
            if label.is_empty() {
                return Err(Error::EmptyLabel);
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(Error::LabelTooLong(label.len()));
            }
            wire_len += label.len() + 1;
            if wire_len + 1 > MAX_NAME_LEN {
                return Err(Error::NameTooLong(wire_len + 1));
            }
            labels.push(label.as_bytes().to_vec());
        }

        Ok(Self { labels })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in &self.labels {
            for &b in label {
                // Escape dots and non-printable octets in presentation form.
                match b {
                    b'.' => f.write_str("\\.")?,
                    0x21..=0x7E => write!(f, "{}", b as char)?,
                    _ => write!(f, "\\{:03}", b)?,
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(&other.labels)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for label in &self.labels {
            for &b in label {
                state.write_u8(b.to_ascii_lowercase());
            }
            state.write_u8(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_presentation_form() {
        let name = Name::from_str("example.com").unwrap();
        assert_eq!(name.label_count(), 2);
        assert_eq!(name.to_string(), "example.com.");

        let dotted = Name::from_str("example.com.").unwrap();
        assert_eq!(name, dotted);
    }

    #[test]
    fn root_name() {
        let root = Name::from_str(".").unwrap();
        assert!(root.is_root());
        assert_eq!(root.to_string(), ".");
        assert_eq!(root.wire_len(), 1);
    }

    #[test]
    fn comparison_ignores_case() {
        let a = Name::from_str("Example.COM").unwrap();
        let b = Name::from_str("example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_lowercase_string(), "example.com.");
    }

    #[test]
    fn wire_roundtrip() {
        let name = Name::from_str("www.example.com").unwrap();
        let mut buf = BytesMut::new();
        name.write_to(&mut buf);
        assert_eq!(buf.len(), name.wire_len());

        let mut reader = WireReader::new(&buf);
        let parsed = Name::parse(&mut reader).unwrap();
        assert_eq!(parsed, name);
        assert!(reader.is_empty());
    }

    #[test]
    fn follows_compression_pointers() {
        // "example.com" at offset 0, then "www" + pointer to offset 0.
        let mut wire = Vec::new();
        wire.extend_from_slice(&[7]);
        wire.extend_from_slice(b"example");
        wire.extend_from_slice(&[3]);
        wire.extend_from_slice(b"com");
        wire.push(0);
        let ptr_target = 0u16;
        let www_at = wire.len();
        wire.push(3);
        wire.extend_from_slice(b"www");
        wire.extend_from_slice(&(0xC000u16 | ptr_target).to_be_bytes());

        let mut reader = WireReader::at(&wire, www_at);
        let name = Name::parse(&mut reader).unwrap();
        assert_eq!(name, Name::from_str("www.example.com").unwrap());
        assert!(reader.is_empty());
    }

    #[test]
    fn rejects_forward_pointers() {
        let wire = [0xC0u8, 0x04, 0, 0, 0, 0];
        let mut reader = WireReader::new(&wire);
        assert!(Name::parse(&mut reader).is_err());
    }

    #[test]
    fn rejects_oversized_labels() {
        let label = "a".repeat(64);
        assert!(Name::from_str(&label).is_err());
    }
}
