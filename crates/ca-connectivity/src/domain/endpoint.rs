//! # Endpoint Model
//!
//! A [`RemoteEndpoint`] names one remote participant on one transport.
//! Endpoints are plain owned values: whoever creates one owns it, and dropping
//! it releases everything it holds. Inbound callbacks receive `&RemoteEndpoint`
//! and must clone it to keep it past the call.
//!
//! ## URI Syntax
//!
//! ```text
//! coap://10.11.12.13:4545/resource_uri      IP literal, explicit port
//! coap://[fe80::1]/resource_uri             bracketed IPv6, default port
//! coaps://device.local/a/b?x=1              host name, secure default port
//! coap://10:11:12:13:45:45/resource_uri     Bluetooth MAC, no port allowed
//! ```

use std::any::Any;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::Arc;

use super::connectivity::{ConnectivityMask, ConnectivityType};
use super::errors::{CaError, CaResult};

/// Default port for the `coap` scheme.
pub const COAP_DEFAULT_PORT: u16 = 5683;

/// Default port for the `coaps` scheme.
pub const COAPS_DEFAULT_PORT: u16 = 5684;

/// Resource path used when a URI carries none.
pub const ROOT_RESOURCE: &str = "/";

// =============================================================================
// MAC ADDRESS
// =============================================================================

/// 48-bit link-layer address, written `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// All-ones broadcast address.
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = CaError;

    fn from_str(s: &str) -> CaResult<Self> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for slot in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| CaError::invalid(format!("MAC address too short: {s}")))?;
            *slot = parse_hex_octet(part)
                .ok_or_else(|| CaError::invalid(format!("bad MAC octet {part:?} in {s}")))?;
        }
        if parts.next().is_some() {
            return Err(CaError::invalid(format!("MAC address too long: {s}")));
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

fn parse_hex_octet(part: &str) -> Option<u8> {
    if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(part, 16).ok()
}

// =============================================================================
// ENDPOINT ADDRESS
// =============================================================================

/// Transport-specific address of a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndpointAddress {
    /// IP-family address. `host` is an IP literal (IPv6 without brackets) or a
    /// host name left for the adapter to resolve.
    Ip { host: String, port: u16 },
    /// Link-layer address.
    Mac(MacAddress),
}

impl EndpointAddress {
    /// The host part: IP literal, host name or MAC string.
    #[must_use]
    pub fn host(&self) -> String {
        match self {
            Self::Ip { host, .. } => host.clone(),
            Self::Mac(mac) => mac.to_string(),
        }
    }

    /// Port for IP addresses; 0 for link-layer ones.
    #[must_use]
    pub fn port(&self) -> u16 {
        match self {
            Self::Ip { port, .. } => *port,
            Self::Mac(_) => 0,
        }
    }

    /// Whether the address suits the given transport.
    #[must_use]
    pub fn fits(&self, ty: ConnectivityType) -> bool {
        match self {
            Self::Ip { .. } => ty.is_ip_family(),
            Self::Mac(_) => ty.is_link_layer(),
        }
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Ip { host, port } => write!(f, "{host}:{port}"),
            Self::Mac(mac) => write!(f, "{mac}"),
        }
    }
}

// =============================================================================
// REMOTE ENDPOINT
// =============================================================================

/// Opaque application data attached to an endpoint.
pub type EndpointContext = Arc<dyn Any + Send + Sync>;

/// One addressable remote participant on a specific transport.
#[derive(Clone)]
pub struct RemoteEndpoint {
    pub connectivity_type: ConnectivityType,
    pub address: EndpointAddress,
    /// Resource path plus query, always starting with `/`.
    pub resource_uri: String,
    /// True when built by [`RemoteEndpoint::from_uri`].
    pub resolved_from_uri: bool,
    /// Application data; never inspected by this crate.
    pub context: Option<EndpointContext>,
}

impl RemoteEndpoint {
    /// Build an endpoint from a transport address, as adapters do for inbound
    /// packets.
    ///
    /// # Errors
    ///
    /// `InvalidParam` if the address does not belong to the transport family.
    pub fn new(connectivity_type: ConnectivityType, address: EndpointAddress) -> CaResult<Self> {
        if !address.fits(connectivity_type) {
            return Err(CaError::invalid(format!(
                "address {address} does not fit transport {connectivity_type}"
            )));
        }
        Ok(Self {
            connectivity_type,
            address,
            resource_uri: ROOT_RESOURCE.to_string(),
            resolved_from_uri: false,
            context: None,
        })
    }

    /// Parse a `coap`/`coaps` URI into an endpoint.
    ///
    /// IP literals and host names yield [`ConnectivityType::Ip`]; six
    /// colon-separated hex octets yield [`ConnectivityType::BtEdr`].
    ///
    /// # Errors
    ///
    /// `InvalidParam` for any malformed URI. No endpoint is produced.
    pub fn from_uri(uri: &str) -> CaResult<Self> {
        let parsed = ParsedUri::parse(uri)?;
        let authority = parsed.authority.ok_or_else(|| {
            CaError::invalid(format!("URI has no concrete host: {uri}"))
        })?;
        let (connectivity_type, address) = parse_authority(authority, parsed.default_port)?;
        Ok(Self {
            connectivity_type,
            address,
            resource_uri: parsed.resource,
            resolved_from_uri: true,
            context: None,
        })
    }

    /// Attach application data.
    #[must_use]
    pub fn with_context(mut self, context: EndpointContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Replace the resource path.
    #[must_use]
    pub fn with_resource_uri(mut self, resource_uri: impl Into<String>) -> Self {
        self.resource_uri = resource_uri.into();
        self
    }

    /// Move the endpoint to another transport of the same address family,
    /// e.g. from `Ip` to `WiFi`.
    ///
    /// # Errors
    ///
    /// `InvalidParam` when crossing between IP and link-layer families.
    pub fn with_connectivity_type(mut self, ty: ConnectivityType) -> CaResult<Self> {
        if !self.address.fits(ty) {
            return Err(CaError::invalid(format!(
                "cannot move {} endpoint to {ty}",
                self.connectivity_type
            )));
        }
        self.connectivity_type = ty;
        Ok(self)
    }

    /// The application context downcast to `T`, if present and of that type.
    #[must_use]
    pub fn context_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.context.as_deref().and_then(|c| c.downcast_ref::<T>())
    }
}

impl fmt::Debug for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEndpoint")
            .field("connectivity_type", &self.connectivity_type)
            .field("address", &self.address)
            .field("resource_uri", &self.resource_uri)
            .field("resolved_from_uri", &self.resolved_from_uri)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

/// Context is application data and does not take part in equality.
impl PartialEq for RemoteEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.connectivity_type == other.connectivity_type
            && self.address == other.address
            && self.resource_uri == other.resource_uri
            && self.resolved_from_uri == other.resolved_from_uri
    }
}

impl Eq for RemoteEndpoint {}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            self.connectivity_type, self.address, self.resource_uri
        )
    }
}

// =============================================================================
// GROUP ENDPOINT
// =============================================================================

/// A multicast destination set: every selected transport in `connectivity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEndpoint {
    pub connectivity: ConnectivityMask,
    pub resource_uri: String,
}

impl GroupEndpoint {
    #[must_use]
    pub fn new(connectivity: ConnectivityMask, resource_uri: impl Into<String>) -> Self {
        Self {
            connectivity,
            resource_uri: resource_uri.into(),
        }
    }
}

// =============================================================================
// URI PARSING
// =============================================================================

/// Scheme, authority and resource split out of a URI.
///
/// `authority` is `None` for a wildcard (`*`) or empty host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedUri<'a> {
    pub default_port: u16,
    pub authority: Option<&'a str>,
    pub resource: String,
}

impl<'a> ParsedUri<'a> {
    pub(crate) fn parse(uri: &'a str) -> CaResult<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| CaError::invalid(format!("URI has no scheme: {uri}")))?;
        let default_port = if scheme.eq_ignore_ascii_case("coap") {
            COAP_DEFAULT_PORT
        } else if scheme.eq_ignore_ascii_case("coaps") {
            COAPS_DEFAULT_PORT
        } else {
            return Err(CaError::invalid(format!("unsupported scheme: {scheme}")));
        };

        let split_at = rest.find(&['/', '?'][..]).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(split_at);
        let resource = normalize_resource(tail)?;
        let authority = match authority {
            "" | "*" => None,
            other => Some(other),
        };
        Ok(Self {
            default_port,
            authority,
            resource,
        })
    }
}

/// Turn a path/query tail into a resource URI starting with `/`.
pub(crate) fn normalize_resource(tail: &str) -> CaResult<String> {
    if tail.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CaError::invalid(format!("resource contains whitespace: {tail:?}")));
    }
    Ok(match tail {
        "" => ROOT_RESOURCE.to_string(),
        t if t.starts_with('?') => format!("/{t}"),
        t => t.to_string(),
    })
}

fn parse_authority(
    authority: &str,
    default_port: u16,
) -> CaResult<(ConnectivityType, EndpointAddress)> {
    if let Some(inner) = authority.strip_prefix('[') {
        let (addr, after) = inner
            .split_once(']')
            .ok_or_else(|| CaError::invalid(format!("unterminated IPv6 literal: {authority}")))?;
        let v6: Ipv6Addr = addr
            .parse()
            .map_err(|_| CaError::invalid(format!("bad IPv6 literal: {addr}")))?;
        let port = match after {
            "" => default_port,
            p => parse_port(p.strip_prefix(':').ok_or_else(|| {
                CaError::invalid(format!("junk after IPv6 literal: {after}"))
            })?)?,
        };
        return Ok((
            ConnectivityType::Ip,
            EndpointAddress::Ip {
                host: v6.to_string(),
                port,
            },
        ));
    }

    let colons = authority.matches(':').count();
    if colons >= 2 {
        let parts: Vec<&str> = authority.split(':').collect();
        let hex_prefix = parts.len() >= 6 && parts[..6].iter().all(|p| parse_hex_octet(p).is_some());
        return match (hex_prefix, parts.len()) {
            (true, 6) => Ok((
                ConnectivityType::BtEdr,
                EndpointAddress::Mac(authority.parse()?),
            )),
            (true, 7) => Err(CaError::invalid(format!(
                "port not allowed on link-layer address: {authority}"
            ))),
            _ => Err(CaError::invalid(format!(
                "unbracketed IPv6 or malformed address: {authority}"
            ))),
        };
    }

    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, parse_port(port)?),
        None => (authority, default_port),
    };
    validate_host(host)?;
    let host = match host.parse::<Ipv4Addr>() {
        Ok(v4) => v4.to_string(),
        Err(_) => host.to_ascii_lowercase(),
    };
    Ok((ConnectivityType::Ip, EndpointAddress::Ip { host, port }))
}

fn parse_port(s: &str) -> CaResult<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CaError::invalid(format!("bad port: {s:?}")));
    }
    match s.parse::<u16>() {
        Ok(0) | Err(_) => Err(CaError::invalid(format!("port out of range: {s}"))),
        Ok(p) => Ok(p),
    }
}

fn validate_host(host: &str) -> CaResult<()> {
    if host.is_empty() {
        return Err(CaError::invalid("empty host"));
    }
    if host.parse::<Ipv4Addr>().is_ok() {
        return Ok(());
    }
    let labels: Vec<&str> = host.split('.').collect();
    let label_ok = |l: &&str| {
        !l.is_empty()
            && !l.starts_with('-')
            && !l.ends_with('-')
            && l.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    };
    if !labels.iter().all(label_ok) {
        return Err(CaError::invalid(format!("bad host name: {host}")));
    }
    // A dotted all-numeric name that is not a valid IPv4 literal is a typo.
    if labels.iter().all(|l| l.bytes().all(|b| b.is_ascii_digit())) {
        return Err(CaError::invalid(format!("bad IPv4 literal: {host}")));
    }
    Ok(())
}
