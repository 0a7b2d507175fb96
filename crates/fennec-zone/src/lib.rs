//! # fennec-zone
//!
//! RFC 1035 master-file parsing for locally hosted records.
//!
//! Each resource record in a zone file becomes one single-answer cache
//! entry, keyed by its owner name and type, destined for the hosted cache.
//! The parser covers the directives and record types a hosting file
//! actually uses (`$ORIGIN`, `$TTL`, parenthesized continuation, comments,
//! A/AAAA/CNAME/NS/PTR/MX/TXT/SOA); anything else is a parse error, which
//! is fatal at startup.

use fennec_cache::CachedResponse;
use fennec_proto::{Message, Name, RData, RecordType, ResourceRecord};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Zone parsing error.
#[derive(Error, Debug)]
pub enum ZoneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Result type for zone operations.
pub type Result<T> = std::result::Result<T, ZoneError>;

/// Default TTL applied when a file sets neither `$TTL` nor per-record TTLs.
const DEFAULT_TTL: u32 = 3_600;

fn parse_error(line: usize, message: impl Into<String>) -> ZoneError {
    ZoneError::Parse {
        line,
        message: message.into(),
    }
}

/// Reads and parses a zone file from disk.
pub fn load_zone_file(path: impl AsRef<Path>) -> Result<Vec<CachedResponse>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let responses = parse_zone(&text)?;
    debug!(
        file = %path.as_ref().display(),
        records = responses.len(),
        "loaded zone file"
    );
    Ok(responses)
}

/// Parses the full text of a zone file into hosted-cache entries.
pub fn parse_zone(text: &str) -> Result<Vec<CachedResponse>> {
    let mut parser = ZoneParser::default();
    let mut responses = Vec::new();

    let mut lines = text.lines().enumerate();
    while let Some((idx, raw)) = lines.next() {
        let line_no = idx + 1;
        // Comments go before continuation handling so a trailing comment on
        // a parenthesized line cannot hide the closing parenthesis.
        let mut logical = strip_comment(raw);

        // Parenthesized records continue onto following lines.
        while paren_depth(&logical) > 0 {
            match lines.next() {
                Some((_, next)) => {
                    logical.push(' ');
                    logical.push_str(&strip_comment(next));
                }
                None => return Err(parse_error(line_no, "unclosed parenthesis")),
            }
        }

        if let Some(response) = parser.parse_line(&logical, line_no)? {
            responses.push(response);
        }
    }

    Ok(responses)
}

/// Drops everything from the first comment character outside quotes.
fn strip_comment(line: &str) -> String {
    let mut in_quotes = false;
    for (idx, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return line[..idx].to_string(),
            _ => {}
        }
    }
    line.to_string()
}

/// Nesting depth of unclosed parentheses outside quotes.
fn paren_depth(line: &str) -> i32 {
    let mut depth = 0;
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Splits a line into tokens, honoring quoted strings, stripping comments,
/// and discarding grouping parentheses.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                quoted_token = true;
            }
            ';' if !in_quotes => break,
            '(' | ')' if !in_quotes => {}
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted_token {
                    tokens.push(current.clone());
                    current.clear();
                    quoted_token = false;
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || quoted_token {
        tokens.push(current);
    }
    tokens
}

#[derive(Default)]
struct ZoneParser {
    origin: Option<String>,
    default_ttl: Option<u32>,
    last_owner: Option<String>,
}

impl ZoneParser {
    fn parse_line(&mut self, line: &str, line_no: usize) -> Result<Option<CachedResponse>> {
        let starts_indented = line.starts_with(|c: char| c.is_whitespace());
        let tokens = tokenize(line);
        if tokens.is_empty() {
            return Ok(None);
        }

        match tokens[0].as_str() {
            "$ORIGIN" => {
                let origin = tokens
                    .get(1)
                    .ok_or_else(|| parse_error(line_no, "$ORIGIN requires a name"))?;
                if !origin.ends_with('.') {
                    return Err(parse_error(line_no, "$ORIGIN must be absolute"));
                }
                self.origin = Some(origin.clone());
                return Ok(None);
            }
            "$TTL" => {
                let ttl = tokens
                    .get(1)
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| parse_error(line_no, "$TTL requires a number"))?;
                self.default_ttl = Some(ttl);
                return Ok(None);
            }
            directive if directive.starts_with('$') => {
                return Err(parse_error(
                    line_no,
                    format!("unsupported directive [{}]", directive),
                ));
            }
            _ => {}
        }

        self.parse_record(&tokens, starts_indented, line_no)
            .map(Some)
    }

    fn parse_record(
        &mut self,
        tokens: &[String],
        starts_indented: bool,
        line_no: usize,
    ) -> Result<CachedResponse> {
        let mut pos = 0;

        let owner = if starts_indented {
            self.last_owner
                .clone()
                .ok_or_else(|| parse_error(line_no, "record has no owner name"))?
        } else {
            let raw = &tokens[0];
            pos = 1;
            self.qualify(raw, line_no)?
        };
        self.last_owner = Some(owner.clone());

        // TTL and class may appear in either order before the type.
        let mut ttl: Option<u32> = None;
        loop {
            let token = tokens
                .get(pos)
                .ok_or_else(|| parse_error(line_no, "record is missing a type"))?;
            if let Ok(parsed) = token.parse::<u32>() {
                ttl = Some(parsed);
                pos += 1;
            } else if token.eq_ignore_ascii_case("IN") {
                pos += 1;
            } else {
                break;
            }
        }

        let type_token = &tokens[pos];
        let rtype = RecordType::from_str(type_token)
            .map_err(|_| parse_error(line_no, format!("unknown record type [{}]", type_token)))?;
        let rdata_tokens = &tokens[pos + 1..];

        let ttl = ttl.or(self.default_ttl).unwrap_or(DEFAULT_TTL);
        let rdata = self.parse_rdata(rtype, rdata_tokens, line_no)?;

        let name = Name::from_str(&owner)
            .map_err(|e| parse_error(line_no, format!("bad owner name [{}]: {}", owner, e)))?;
        let record = ResourceRecord::new(name, rtype, ttl, rdata);

        let mut message = Message::default();
        message.add_answer(record);
        Ok(CachedResponse::new(&owner, rtype, message))
    }

    fn parse_rdata(&self, rtype: RecordType, tokens: &[String], line_no: usize) -> Result<RData> {
        let field = |idx: usize| {
            tokens
                .get(idx)
                .ok_or_else(|| parse_error(line_no, format!("{} record is missing rdata", rtype)))
        };

        match rtype {
            RecordType::A => {
                let addr = field(0)?
                    .parse()
                    .map_err(|_| parse_error(line_no, "invalid IPv4 address"))?;
                Ok(RData::A(addr))
            }
            RecordType::AAAA => {
                let addr = field(0)?
                    .parse()
                    .map_err(|_| parse_error(line_no, "invalid IPv6 address"))?;
                Ok(RData::Aaaa(addr))
            }
            RecordType::CNAME => Ok(RData::Cname(self.rdata_name(field(0)?, line_no)?)),
            RecordType::NS => Ok(RData::Ns(self.rdata_name(field(0)?, line_no)?)),
            RecordType::PTR => Ok(RData::Ptr(self.rdata_name(field(0)?, line_no)?)),
            RecordType::MX => {
                let preference = field(0)?
                    .parse()
                    .map_err(|_| parse_error(line_no, "invalid MX preference"))?;
                let exchange = self.rdata_name(field(1)?, line_no)?;
                Ok(RData::Mx {
                    preference,
                    exchange,
                })
            }
            RecordType::TXT => {
                if tokens.is_empty() {
                    return Err(parse_error(line_no, "TXT record is missing rdata"));
                }
                Ok(RData::Txt(
                    tokens.iter().map(|t| t.as_bytes().to_vec()).collect(),
                ))
            }
            RecordType::SOA => Ok(RData::Soa {
                mname: self.rdata_name(field(0)?, line_no)?,
                rname: self.rdata_name(field(1)?, line_no)?,
                serial: parse_u32(field(2)?, "serial", line_no)?,
                refresh: parse_u32(field(3)?, "refresh", line_no)?,
                retry: parse_u32(field(4)?, "retry", line_no)?,
                expire: parse_u32(field(5)?, "expire", line_no)?,
                minimum: parse_u32(field(6)?, "minimum", line_no)?,
            }),
            other => Err(parse_error(
                line_no,
                format!("unsupported record type [{}]", other),
            )),
        }
    }

    /// Qualifies a possibly-relative name against the origin.
    fn qualify(&self, raw: &str, line_no: usize) -> Result<String> {
        if raw == "@" {
            return self
                .origin
                .clone()
                .ok_or_else(|| parse_error(line_no, "@ used without $ORIGIN"));
        }
        if raw.ends_with('.') {
            return Ok(raw.to_string());
        }
        match &self.origin {
            Some(origin) => Ok(format!("{}.{}", raw, origin)),
            None => Err(parse_error(
                line_no,
                format!("relative name [{}] without $ORIGIN", raw),
            )),
        }
    }

    fn rdata_name(&self, raw: &str, line_no: usize) -> Result<Name> {
        let qualified = self.qualify(raw, line_no)?;
        Name::from_str(&qualified)
            .map_err(|e| parse_error(line_no, format!("bad name [{}]: {}", qualified, e)))
    }
}

fn parse_u32(token: &str, what: &str, line_no: usize) -> Result<u32> {
    token
        .parse()
        .map_err(|_| parse_error(line_no, format!("invalid SOA {}", what)))
}
