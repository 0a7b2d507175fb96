//! Upstream resolver identities.

/// Default port for DNS over TLS.
pub const DOT_PORT: u16 = 853;

/// One configured upstream resolver.
///
/// Identity is the name; the dial address is either configured explicitly or
/// derived as `name:853`. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// Host name of the resolver (also the TLS server name).
    pub name: String,

    /// Nominal weight of this upstream. Selection does not read it: the
    /// pool orders upstreams by the cumulative per-address mean RTT it
    /// tracks itself.
    pub weight: u32,

    /// Explicit dial address, overriding the derived one.
    pub address: Option<String>,
}

impl Upstream {
    /// Creates an upstream from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: 0,
            address: None,
        }
    }

    /// Sets an explicit dial address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Returns the dial address: the explicit one, or `name:853`.
    pub fn address(&self) -> String {
        match &self.address {
            Some(address) => address.clone(),
            None => format!("{}:{}", self.name, DOT_PORT),
        }
    }

    /// Returns the host part of the dial address, used as the TLS server
    /// name.
    pub fn host(&self) -> &str {
        let address = self.address.as_deref().unwrap_or(&self.name);
        match address.rfind(':') {
            Some(idx) if address[idx + 1..].chars().all(|c| c.is_ascii_digit()) => &address[..idx],
            _ => address,
        }
    }
}
