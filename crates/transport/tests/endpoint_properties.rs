use proptest::prelude::*;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use toxbridge_transport::{
    decode, decode_with_form, encode, Endpoint, Ipv4Form, TransportError, PACKED_ENDPOINT_LEN,
};

// Codec invariants over arbitrary addresses and buffers

fn arbitrary_ipv4() -> impl Strategy<Value = IpAddr> {
    any::<[u8; 4]>().prop_map(|octets| IpAddr::V4(Ipv4Addr::from(octets)))
}

fn arbitrary_ipv6() -> impl Strategy<Value = IpAddr> {
    prop_oneof![
        any::<[u8; 16]>().prop_map(Ipv6Addr::from),
        any::<[u8; 4]>().prop_map(|octets| Ipv4Addr::from(octets).to_ipv6_mapped()),
    ]
    .prop_map(IpAddr::V6)
}

fn arbitrary_endpoint() -> impl Strategy<Value = Endpoint> {
    (prop_oneof![arbitrary_ipv4(), arbitrary_ipv6()], any::<u16>())
        .prop_map(|(address, port)| Endpoint::new(address, port))
}

proptest! {
    #[test]
    fn decode_inverts_encode(endpoint in arbitrary_endpoint()) {
        let packed = encode(&endpoint);
        prop_assert_eq!(decode(packed.as_bytes()).unwrap(), endpoint);
    }

    #[test]
    fn mapped_form_roundtrips_mapped_endpoints(octets in any::<[u8; 4]>(), port in any::<u16>()) {
        let endpoint = Endpoint::new(Ipv4Addr::from(octets).to_ipv6_mapped(), port);
        let packed = encode(&endpoint);
        prop_assert_eq!(decode_with_form(packed.as_bytes(), Ipv4Form::Mapped).unwrap(), endpoint);
    }

    #[test]
    fn mapped_form_presents_every_endpoint_as_ipv6(endpoint in arbitrary_endpoint()) {
        let packed = encode(&endpoint);
        let decoded = decode_with_form(packed.as_bytes(), Ipv4Form::Mapped).unwrap();
        prop_assert_eq!(decoded, endpoint.with_ipv4_form(Ipv4Form::Mapped));
        prop_assert!(decoded.address.is_ipv6());
    }

    #[test]
    fn port_is_big_endian_at_offset_24(endpoint in arbitrary_endpoint()) {
        let bytes = *encode(&endpoint).as_bytes();
        prop_assert_eq!(u16::from(bytes[24]) * 256 + u16::from(bytes[25]), endpoint.port);
    }

    #[test]
    fn short_buffers_are_malformed(buf in prop::collection::vec(any::<u8>(), 0..PACKED_ENDPOINT_LEN)) {
        let len = buf.len();
        let is_malformed = matches!(
            decode(&buf),
            Err(TransportError::MalformedEndpoint { len: l, .. }) if l == len
        );
        prop_assert!(is_malformed);
    }

    #[test]
    fn full_buffers_always_decode(buf in prop::collection::vec(any::<u8>(), PACKED_ENDPOINT_LEN..64)) {
        prop_assert!(decode(&buf).is_ok());
    }
}
