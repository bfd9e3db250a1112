//! Layer-by-layer parsers driven by a [`HdrCursor`].
//!
//! Every parser either consumes exactly its header or fails without reading
//! past the packet. Loops are bounded by compile-time constants only.

use crate::cursor::{HdrCursor, ParseError};
use crate::headers::{EthHdr, Ipv4Hdr, Ipv6Hdr, OspaHdr, UdpHdr, VlanHdr};
use crate::{ETH_P_8021AD, ETH_P_8021Q, OSPA_BODY_MIN_SIZE, OSPA_CTRL_VERSION, VLAN_MAX_DEPTH};

/// VLAN ids collected while unwrapping tags
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct CollectVlans {
    pub id: [u16; VLAN_MAX_DEPTH],
    pub depth: u8,
}

/// `h_proto` is in network byte order.
#[inline(always)]
pub fn proto_is_vlan(h_proto: u16) -> bool {
    h_proto == ETH_P_8021Q.to_be() || h_proto == ETH_P_8021AD.to_be()
}

/// Parse the Ethernet header and skip up to `VLAN_MAX_DEPTH` VLAN tags.
///
/// Returns the Ethernet header (still pointing at the original header, so
/// callers can inspect its own ethertype for VLAN flags) and the innermost
/// ethertype found, in network byte order. Running out of bytes while
/// unwrapping tags is not an error: what was consumed so far is kept.
#[inline(always)]
pub fn parse_ethhdr_vlan<'a>(
    nh: &mut HdrCursor<'a>,
    mut vlans: Option<&mut CollectVlans>,
) -> Result<(&'a EthHdr, u16), ParseError> {
    let eth = nh.advance::<EthHdr>()?;
    let mut h_proto = eth.ether_type_be();

    for i in 0..VLAN_MAX_DEPTH {
        if !proto_is_vlan(h_proto) {
            break;
        }

        let vlh = match nh.advance::<VlanHdr>() {
            Ok(vlh) => vlh,
            Err(_) => break,
        };

        h_proto = vlh.encapsulated_proto_be();
        if let Some(collect) = vlans.as_deref_mut() {
            collect.id[i] = vlh.vlan_id();
            collect.depth = i as u8 + 1;
        }
    }

    Ok((eth, h_proto))
}

#[inline(always)]
pub fn parse_ethhdr<'a>(nh: &mut HdrCursor<'a>) -> Result<(&'a EthHdr, u16), ParseError> {
    parse_ethhdr_vlan(nh, None)
}

/// Parse a variable-length IPv4 header, returns it with its protocol field.
#[inline(always)]
pub fn parse_iphdr<'a>(nh: &mut HdrCursor<'a>) -> Result<(&'a Ipv4Hdr, u8), ParseError> {
    let iph = nh.peek::<Ipv4Hdr>()?;

    let hdrsize = iph.header_len();
    if hdrsize < Ipv4Hdr::LEN {
        return Err(ParseError::BadLength);
    }

    nh.advance_bytes(hdrsize)?;
    Ok((iph, iph.proto))
}

/// Parse the fixed IPv6 header, returns it with its next-header field.
/// Extension headers are not walked.
#[inline(always)]
pub fn parse_ip6hdr<'a>(nh: &mut HdrCursor<'a>) -> Result<(&'a Ipv6Hdr, u8), ParseError> {
    let ip6h = nh.advance::<Ipv6Hdr>()?;
    Ok((ip6h, ip6h.next_header))
}

/// Parse the UDP header, returns it with the declared payload length.
/// The payload itself is not consumed.
#[inline(always)]
pub fn parse_udphdr<'a>(nh: &mut HdrCursor<'a>) -> Result<(&'a UdpHdr, u16), ParseError> {
    let udph = nh.advance::<UdpHdr>()?;

    let len = i32::from(udph.len()) - UdpHdr::LEN as i32;
    if len < 0 {
        return Err(ParseError::BadLength);
    }

    Ok((udph, len as u16))
}

#[inline(always)]
pub fn parse_ospahdr<'a>(nh: &mut HdrCursor<'a>) -> Result<&'a OspaHdr, ParseError> {
    nh.advance::<OspaHdr>()
}

/// Cheap plausibility filter applied after the OpenSPA header was consumed.
///
/// `false` means the datagram is definitely not OpenSPA: the body left after
/// the header is too short, or the control byte carries another version.
#[inline(always)]
pub fn potentially_ospa_packet(nh: &HdrCursor<'_>, ospah: &OspaHdr) -> bool {
    if nh.remaining() < OSPA_BODY_MIN_SIZE {
        return false;
    }

    ospah.version() == OSPA_CTRL_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ETH_P_IP, ETH_P_IPV6, IPPROTO_UDP};

    fn eth(ether_type: u16) -> Vec<u8> {
        let mut v = vec![0xff; 12];
        v.extend_from_slice(&ether_type.to_be_bytes());
        v
    }

    fn vlan(id: u16, inner: u16) -> Vec<u8> {
        let mut v = (0x2000 | id).to_be_bytes().to_vec();
        v.extend_from_slice(&inner.to_be_bytes());
        v
    }

    #[test]
    fn test_eth_without_vlan() {
        let buf = eth(ETH_P_IP);
        let mut nh = HdrCursor::new(&buf);
        let (_, proto) = parse_ethhdr(&mut nh).unwrap();
        assert_eq!(u16::from_be(proto), ETH_P_IP);
        assert_eq!(nh.offset(), EthHdr::LEN);
    }

    #[test]
    fn test_eth_too_short() {
        let buf = [0u8; EthHdr::LEN - 1];
        let mut nh = HdrCursor::new(&buf);
        assert_eq!(parse_ethhdr(&mut nh).err(), Some(ParseError::Truncated));
    }

    #[test]
    fn test_vlan_stack_collects_ids() {
        let mut buf = eth(ETH_P_8021AD);
        buf.extend(vlan(10, ETH_P_8021Q));
        buf.extend(vlan(20, ETH_P_IPV6));
        let mut nh = HdrCursor::new(&buf);
        let mut vlans = CollectVlans::default();

        let (ethh, proto) = parse_ethhdr_vlan(&mut nh, Some(&mut vlans)).unwrap();
        assert_eq!(u16::from_be(proto), ETH_P_IPV6);
        // Ethernet view still shows the outer tag type
        assert_eq!(u16::from_be(ethh.ether_type_be()), ETH_P_8021AD);
        assert_eq!(vlans.id, [10, 20]);
        assert_eq!(vlans.depth, 2);
        assert_eq!(nh.offset(), EthHdr::LEN + 2 * VlanHdr::LEN);
    }

    #[test]
    fn test_vlan_depth_is_capped() {
        let mut buf = eth(ETH_P_8021Q);
        buf.extend(vlan(1, ETH_P_8021Q));
        buf.extend(vlan(2, ETH_P_8021Q));
        buf.extend(vlan(3, ETH_P_IP));
        let mut nh = HdrCursor::new(&buf);

        let (_, proto) = parse_ethhdr(&mut nh).unwrap();
        // Third tag is left in place, last discovered type is a VLAN type
        assert_eq!(u16::from_be(proto), ETH_P_8021Q);
        assert_eq!(nh.offset(), EthHdr::LEN + 2 * VlanHdr::LEN);
    }

    #[test]
    fn test_truncated_vlan_is_not_an_error() {
        let mut buf = eth(ETH_P_8021Q);
        buf.extend_from_slice(&[0x00, 0x05]);
        let mut nh = HdrCursor::new(&buf);

        let (_, proto) = parse_ethhdr(&mut nh).unwrap();
        assert_eq!(u16::from_be(proto), ETH_P_8021Q);
        assert_eq!(nh.offset(), EthHdr::LEN);
    }

    #[test]
    fn test_ipv4_with_options() {
        let mut buf = vec![0x46, 0, 0, 0, 0, 0, 0, 0, 64, IPPROTO_UDP, 0, 0];
        buf.extend_from_slice(&[10, 0, 0, 1, 10, 0, 0, 2]);
        buf.extend_from_slice(&[1, 1, 1, 1]); // 4 bytes of options
        buf.extend_from_slice(&[0xAB; 3]);
        let mut nh = HdrCursor::new(&buf);

        let (_, proto) = parse_iphdr(&mut nh).unwrap();
        assert_eq!(proto, IPPROTO_UDP);
        assert_eq!(nh.offset(), 24);
        assert_eq!(nh.remaining(), 3);
    }

    #[test]
    fn test_ipv4_ihl_below_minimum() {
        let mut buf = vec![0u8; 40];
        buf[0] = 0x44;
        let mut nh = HdrCursor::new(&buf);
        assert_eq!(parse_iphdr(&mut nh).err(), Some(ParseError::BadLength));
    }

    #[test]
    fn test_ipv4_options_truncated() {
        let mut buf = vec![0u8; 30];
        buf[0] = 0x4F; // declares 60 bytes
        let mut nh = HdrCursor::new(&buf);
        assert_eq!(parse_iphdr(&mut nh).err(), Some(ParseError::Truncated));
        assert_eq!(nh.offset(), 0);
    }

    #[test]
    fn test_ipv6_fixed_header() {
        let mut buf = vec![0u8; Ipv6Hdr::LEN];
        buf[0] = 0x60;
        buf[6] = IPPROTO_UDP;
        let mut nh = HdrCursor::new(&buf);
        let (ip6h, proto) = parse_ip6hdr(&mut nh).unwrap();
        assert_eq!(proto, IPPROTO_UDP);
        assert_eq!(ip6h.version(), 6);
        assert_eq!(nh.remaining(), 0);

        let mut nh = HdrCursor::new(&buf[..Ipv6Hdr::LEN - 1]);
        assert!(parse_ip6hdr(&mut nh).is_err());
    }

    #[test]
    fn test_udp_payload_len() {
        let buf = [0x30, 0x39, 0x30, 0x39, 0x00, 0x40, 0, 0];
        let mut nh = HdrCursor::new(&buf);
        let (udph, len) = parse_udphdr(&mut nh).unwrap();
        assert_eq!(udph.dest(), 12345);
        assert_eq!(len, 56);
    }

    #[test]
    fn test_udp_len_shorter_than_header() {
        let buf = [0, 1, 0, 2, 0x00, 0x07, 0, 0];
        let mut nh = HdrCursor::new(&buf);
        assert_eq!(parse_udphdr(&mut nh).err(), Some(ParseError::BadLength));

        let buf = [0, 1, 0, 2, 0x00, 0x08, 0, 0];
        let mut nh = HdrCursor::new(&buf);
        assert_eq!(parse_udphdr(&mut nh).unwrap().1, 0);
    }

    #[test]
    fn test_plausibility_needs_min_body_and_version() {
        let mut buf = vec![0x20, 1, 1, 0, 0, 0, 0, 1];
        buf.extend(vec![0u8; OSPA_BODY_MIN_SIZE]);

        let mut nh = HdrCursor::new(&buf);
        let ospah = parse_ospahdr(&mut nh).unwrap();
        assert!(potentially_ospa_packet(&nh, ospah));

        let mut nh = HdrCursor::new(&buf[..buf.len() - 1]);
        let ospah = parse_ospahdr(&mut nh).unwrap();
        assert!(!potentially_ospa_packet(&nh, ospah));

        buf[0] = 0x10;
        let mut nh = HdrCursor::new(&buf);
        let ospah = parse_ospahdr(&mut nh).unwrap();
        assert!(!potentially_ospa_packet(&nh, ospah));
    }
}
