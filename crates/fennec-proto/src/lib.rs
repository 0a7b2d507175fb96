//! # fennec-proto
//!
//! DNS wire format for the fennec resolver: headers, names, questions,
//! resource records, and whole messages, per RFC 1035 and its followups.
//!
//! The codec decodes the record types the resolver materializes (addresses,
//! aliases, delegation, mail, text, SOA) and carries everything else as
//! opaque rdata, so unusual records pass through the forwarding path
//! untouched. Name decompression is supported on parse; serialization is
//! always uncompressed.

pub mod class;
pub mod error;
pub mod header;
pub mod message;
pub mod name;
pub mod opcode;
pub mod question;
pub mod rcode;
pub mod record;
pub mod rtype;
pub mod wire;

pub use class::RecordClass;
pub use error::{Error, Result};
pub use header::{HEADER_SIZE, Header, HeaderFlags};
pub use message::Message;
pub use name::Name;
pub use opcode::OpCode;
pub use question::Question;
pub use rcode::ResponseCode;
pub use record::{RData, ResourceRecord};
pub use rtype::RecordType;
pub use wire::WireReader;
