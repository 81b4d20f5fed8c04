//! Packed socket-address codec.
//!
//! The messaging core describes every peer address with a fixed 26-byte
//! structure whose layout is owned by the core and must not change:
//!
//! | offset   | len | field                                        |
//! |----------|-----|----------------------------------------------|
//! | 0        | 1   | family tag (2 = IPv4, anything else = IPv6)  |
//! | 1..8     | 7   | reserved                                     |
//! | 8..24    | 16  | address (IPv4 occupies 8..12)                |
//! | 24..26   | 2   | port, big-endian                             |
//!
//! Reserved and unused address bytes are zero on encode and ignored on decode.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TransportError};

/// Size of the packed endpoint structure in bytes.
pub const PACKED_ENDPOINT_LEN: usize = 26;

/// Family tag the core uses for IPv4.
pub const FAMILY_TAG_IPV4: u8 = 2;
/// Family tag written for IPv6. Any tag other than [`FAMILY_TAG_IPV4`] decodes as IPv6.
pub const FAMILY_TAG_IPV6: u8 = 10;

const ADDRESS_OFFSET: usize = 8;
const IPV4_LEN: usize = 4;
const IPV6_LEN: usize = 16;
const PORT_OFFSET: usize = 24;

/// Address family of a virtual socket or endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Map the core's numeric family tag.
    pub fn from_raw(tag: u8) -> Result<Self> {
        match tag {
            FAMILY_TAG_IPV4 => Ok(AddressFamily::Ipv4),
            FAMILY_TAG_IPV6 => Ok(AddressFamily::Ipv6),
            other => Err(TransportError::UnsupportedFamily(format!(
                "family tag {other}"
            ))),
        }
    }

    pub const fn tag(self) -> u8 {
        match self {
            AddressFamily::Ipv4 => FAMILY_TAG_IPV4,
            AddressFamily::Ipv6 => FAMILY_TAG_IPV6,
        }
    }

    /// Family of `ip`, treating IPv4-mapped IPv6 addresses as IPv4.
    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(v6) if v6.to_ipv4_mapped().is_some() => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => f.write_str("ipv4"),
            AddressFamily::Ipv6 => f.write_str("ipv6"),
        }
    }
}

/// How IPv4 addresses are presented once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ipv4Form {
    /// `192.0.2.1`
    #[default]
    DottedQuad,
    /// `::ffff:192.0.2.1`, for hosts that only speak IPv6 sockets.
    Mapped,
}

/// Logical peer address: IP literal plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<IpAddr>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Parse an IPv4 or IPv6 literal. Host names are not resolved.
    pub fn parse(literal: &str, port: u16) -> Result<Self> {
        let trimmed = literal
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']');
        trimmed
            .parse::<IpAddr>()
            .map(|address| Self::new(address, port))
            .map_err(|_| TransportError::UnsupportedFamily(format!("not an IP literal: {literal}")))
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(self.address)
    }

    /// Re-express an IPv4 address in the requested form; IPv6 addresses that are
    /// not IPv4-mapped pass through untouched.
    pub fn with_ipv4_form(self, form: Ipv4Form) -> Self {
        let address = match (form, self.address) {
            (Ipv4Form::Mapped, IpAddr::V4(v4)) => IpAddr::V6(v4.to_ipv6_mapped()),
            (Ipv4Form::DottedQuad, IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            },
            (_, other) => other,
        };
        Self { address, ..self }
    }

    /// Address usable as a destination on a socket of `family`.
    ///
    /// Dual-stack IPv6 sockets only accept IPv6 destinations, so IPv4 peers are
    /// mapped; IPv4 sockets get the dotted-quad form back.
    pub fn for_socket(self, family: AddressFamily) -> Self {
        match family {
            AddressFamily::Ipv4 => self.with_ipv4_form(Ipv4Form::DottedQuad),
            AddressFamily::Ipv6 => self.with_ipv4_form(Ipv4Form::Mapped),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.socket_addr(), f)
    }
}

/// The 26-byte wire form of an [`Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedEndpoint([u8; PACKED_ENDPOINT_LEN]);

impl PackedEndpoint {
    /// Copy the first 26 bytes of `buf`.
    pub fn from_slice(buf: &[u8]) -> Result<Self> {
        let bytes: [u8; PACKED_ENDPOINT_LEN] = buf
            .get(..PACKED_ENDPOINT_LEN)
            .and_then(|head| head.try_into().ok())
            .ok_or(TransportError::MalformedEndpoint {
                len: buf.len(),
                expected: PACKED_ENDPOINT_LEN,
            })?;
        Ok(Self(bytes))
    }

    pub fn encode(endpoint: &Endpoint) -> Self {
        encode(endpoint)
    }

    pub fn decode(&self, form: Ipv4Form) -> Endpoint {
        // A full-length buffer always decodes.
        decode_array(&self.0, form)
    }

    pub fn family_tag(&self) -> u8 {
        self.0[0]
    }

    pub fn as_bytes(&self) -> &[u8; PACKED_ENDPOINT_LEN] {
        &self.0
    }
}

impl From<[u8; PACKED_ENDPOINT_LEN]> for PackedEndpoint {
    fn from(bytes: [u8; PACKED_ENDPOINT_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for PackedEndpoint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encode `endpoint` into the packed structure.
///
/// The address is written as given: IPv4-mapped IPv6 addresses keep the IPv6 tag,
/// so `decode(encode(e)) == e` for every endpoint.
pub fn encode(endpoint: &Endpoint) -> PackedEndpoint {
    let mut bytes = [0u8; PACKED_ENDPOINT_LEN];
    match endpoint.address {
        IpAddr::V4(v4) => {
            bytes[0] = FAMILY_TAG_IPV4;
            bytes[ADDRESS_OFFSET..ADDRESS_OFFSET + IPV4_LEN].copy_from_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            bytes[0] = FAMILY_TAG_IPV6;
            bytes[ADDRESS_OFFSET..ADDRESS_OFFSET + IPV6_LEN].copy_from_slice(&v6.octets());
        }
    }
    bytes[PORT_OFFSET..].copy_from_slice(&endpoint.port.to_be_bytes());
    PackedEndpoint(bytes)
}

/// Decode a packed endpoint, presenting IPv4 addresses as dotted quads.
pub fn decode(buf: &[u8]) -> Result<Endpoint> {
    decode_with_form(buf, Ipv4Form::default())
}

pub fn decode_with_form(buf: &[u8], form: Ipv4Form) -> Result<Endpoint> {
    PackedEndpoint::from_slice(buf).map(|packed| packed.decode(form))
}

fn decode_array(buf: &[u8; PACKED_ENDPOINT_LEN], form: Ipv4Form) -> Endpoint {
    let port = u16::from_be_bytes([buf[PORT_OFFSET], buf[PORT_OFFSET + 1]]);

    if buf[0] == FAMILY_TAG_IPV4 {
        let v4 = Ipv4Addr::new(
            buf[ADDRESS_OFFSET],
            buf[ADDRESS_OFFSET + 1],
            buf[ADDRESS_OFFSET + 2],
            buf[ADDRESS_OFFSET + 3],
        );
        return Endpoint::new(v4, port).with_ipv4_form(form);
    }

    let mut octets = [0u8; IPV6_LEN];
    octets.copy_from_slice(&buf[ADDRESS_OFFSET..ADDRESS_OFFSET + IPV6_LEN]);
    Endpoint::new(Ipv6Addr::from(octets), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_layout_matches_core() {
        let endpoint = Endpoint::parse("192.0.2.1", 33445).unwrap();
        let packed = encode(&endpoint);
        let bytes = packed.as_bytes();

        assert_eq!(bytes[0], FAMILY_TAG_IPV4);
        assert_eq!(&bytes[1..8], &[0u8; 7]);
        assert_eq!(&bytes[8..12], &[192, 0, 2, 1]);
        assert_eq!(&bytes[12..24], &[0u8; 12]);
        assert_eq!(bytes[24] as u16 * 256 + bytes[25] as u16, 33445);

        let decoded = decode(bytes).unwrap();
        assert_eq!(decoded.address.to_string(), "192.0.2.1");
        assert_eq!(decoded.port, 33445);
    }

    #[test]
    fn ipv6_roundtrip() {
        let endpoint = Endpoint::parse("[2001:db8::7]", 443).unwrap();
        let packed = encode(&endpoint);
        assert_eq!(packed.family_tag(), FAMILY_TAG_IPV6);
        assert_eq!(decode(packed.as_bytes()).unwrap(), endpoint);
    }

    #[test]
    fn mapped_form_prefixes_ipv4() {
        let packed = encode(&Endpoint::parse("198.51.100.20", 9000).unwrap());
        let decoded = decode_with_form(packed.as_bytes(), Ipv4Form::Mapped).unwrap();
        assert_eq!(decoded.address.to_string(), "::ffff:198.51.100.20");
        assert_eq!(decoded.port, 9000);
    }

    #[test]
    fn mapped_input_keeps_ipv6_tag() {
        let mapped = Endpoint::parse("::ffff:192.0.2.1", 33445).unwrap();
        let packed = encode(&mapped);
        assert_eq!(packed.family_tag(), FAMILY_TAG_IPV6);
        let expected = Ipv4Addr::new(192, 0, 2, 1).to_ipv6_mapped().octets();
        assert_eq!(&packed.as_bytes()[8..24], &expected);
        assert_eq!(decode(packed.as_bytes()).unwrap(), mapped);
        assert_eq!(packed.decode(Ipv4Form::Mapped), mapped);
    }

    #[test]
    fn unknown_tag_decodes_as_ipv6() {
        let mut raw = [0u8; PACKED_ENDPOINT_LEN];
        raw[0] = 0x7f;
        raw[8..24].copy_from_slice(&Ipv6Addr::LOCALHOST.octets());
        raw[24..].copy_from_slice(&1234u16.to_be_bytes());

        let decoded = decode(&raw).unwrap();
        assert_eq!(decoded, Endpoint::new(Ipv6Addr::LOCALHOST, 1234));
    }

    #[test]
    fn reserved_bytes_are_ignored() {
        let mut raw = *encode(&Endpoint::parse("203.0.113.9", 53).unwrap()).as_bytes();
        raw[1..8].copy_from_slice(&[0xAA; 7]);
        raw[12..24].copy_from_slice(&[0x55; 12]);
        assert_eq!(
            decode(&raw).unwrap(),
            Endpoint::parse("203.0.113.9", 53).unwrap()
        );
    }

    #[test]
    fn short_buffer_is_malformed() {
        let err = decode(&[FAMILY_TAG_IPV4; 25]).unwrap_err();
        assert!(matches!(
            err,
            TransportError::MalformedEndpoint { len: 25, expected: 26 }
        ));
    }

    #[test]
    fn longer_buffer_uses_first_26_bytes() {
        let mut raw = encode(&Endpoint::parse("192.0.2.1", 1).unwrap())
            .as_bytes()
            .to_vec();
        raw.extend_from_slice(b"trailing payload");
        assert_eq!(decode(&raw).unwrap().port, 1);
    }

    #[test]
    fn hostnames_are_rejected() {
        assert!(matches!(
            Endpoint::parse("node.example", 1),
            Err(TransportError::UnsupportedFamily(_))
        ));
    }

    #[test]
    fn family_tags() {
        assert_eq!(AddressFamily::from_raw(2).unwrap(), AddressFamily::Ipv4);
        assert_eq!(AddressFamily::from_raw(10).unwrap(), AddressFamily::Ipv6);
        assert!(AddressFamily::from_raw(130).is_err());
    }

    #[test]
    fn destination_follows_socket_family() {
        let v4 = Endpoint::parse("192.0.2.1", 1).unwrap();
        assert_eq!(
            v4.for_socket(AddressFamily::Ipv6).address.to_string(),
            "::ffff:192.0.2.1"
        );
        assert_eq!(v4.for_socket(AddressFamily::Ipv6).for_socket(AddressFamily::Ipv4), v4);
    }
}
