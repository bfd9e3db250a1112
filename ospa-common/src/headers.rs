//! Wire layouts consumed by the gate.
//!
//! Multi-byte fields are kept as byte arrays so every header has alignment 1
//! and can be viewed in place at any packet offset.

use crate::{OSPA_CTRL_VERSION_MASK, OSPA_CTRL_VERSION_OFFSET, VLAN_VID_MASK};

/// Marker for structs that can be read in place from packet memory.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, have alignment 1 and be valid for
/// every bit pattern.
pub unsafe trait Header: Sized {}

// ============================================================
// LINK LAYER
// ============================================================

#[repr(C)]
pub struct EthHdr {
    pub dst_addr: [u8; 6],
    pub src_addr: [u8; 6],
    pub ether_type: [u8; 2],
}

impl EthHdr {
    pub const LEN: usize = 14;

    /// EtherType exactly as on the wire (network byte order)
    #[inline(always)]
    pub fn ether_type_be(&self) -> u16 {
        u16::from_ne_bytes(self.ether_type)
    }
}

/// 802.1Q / 802.1AD tag following the Ethernet addresses
#[repr(C)]
pub struct VlanHdr {
    /// Priority (3 bits), DEI (1 bit), VLAN ID (12 bits)
    pub tci: [u8; 2],
    pub encapsulated_proto: [u8; 2],
}

impl VlanHdr {
    pub const LEN: usize = 4;

    #[inline(always)]
    pub fn vlan_id(&self) -> u16 {
        u16::from_be_bytes(self.tci) & VLAN_VID_MASK
    }

    #[inline(always)]
    pub fn encapsulated_proto_be(&self) -> u16 {
        u16::from_ne_bytes(self.encapsulated_proto)
    }
}

// ============================================================
// NETWORK LAYER
// ============================================================

#[repr(C)]
pub struct Ipv4Hdr {
    pub version_ihl: u8,
    pub tos: u8,
    pub tot_len: [u8; 2],
    pub id: [u8; 2],
    pub frag_off: [u8; 2],
    pub ttl: u8,
    pub proto: u8,
    pub check: [u8; 2],
    pub src_addr: [u8; 4],
    pub dst_addr: [u8; 4],
}

impl Ipv4Hdr {
    /// Fixed part, the minimum legal header size
    pub const LEN: usize = 20;

    pub fn ihl(&self) -> u8 {
        self.version_ihl & 0x0F
    }

    /// Header length in bytes as declared by IHL
    #[inline(always)]
    pub fn header_len(&self) -> usize {
        self.ihl() as usize * 4
    }
}

/// IPv6 Base Header (40 bytes fixed)
#[repr(C)]
pub struct Ipv6Hdr {
    /// Version (4 bits), Traffic Class (8 bits), Flow Label (20 bits)
    pub version_tc_flow: [u8; 4],
    /// Payload length (excluding this header)
    pub payload_len: [u8; 2],
    /// Next header type (protocol or extension)
    pub next_header: u8,
    pub hop_limit: u8,
    pub src_addr: [u8; 16],
    pub dst_addr: [u8; 16],
}

impl Ipv6Hdr {
    pub const LEN: usize = 40;

    #[inline(always)]
    pub fn version(&self) -> u8 {
        self.version_tc_flow[0] >> 4
    }
}

// ============================================================
// TRANSPORT LAYER
// ============================================================

#[repr(C)]
pub struct UdpHdr {
    pub source: [u8; 2],
    pub dest: [u8; 2],
    /// Header + payload length
    pub len: [u8; 2],
    pub check: [u8; 2],
}

impl UdpHdr {
    pub const LEN: usize = 8;

    #[inline(always)]
    pub fn source(&self) -> u16 {
        u16::from_be_bytes(self.source)
    }

    #[inline(always)]
    pub fn dest(&self) -> u16 {
        u16::from_be_bytes(self.dest)
    }

    #[inline(always)]
    pub fn len(&self) -> u16 {
        u16::from_be_bytes(self.len)
    }
}

// ============================================================
// OPENSPA
// ============================================================

#[repr(C)]
pub struct OspaHdr {
    /// Control field, bits 4-6 carry the protocol version
    pub ctrl: u8,
    /// Transaction ID
    pub tid: u8,
    pub cipher_suite: u8,
    pub reserved: u8,
    pub adk_proof: [u8; 4],
}

impl OspaHdr {
    pub const LEN: usize = 8;

    #[inline(always)]
    pub fn version(&self) -> u8 {
        (self.ctrl & OSPA_CTRL_VERSION_MASK) >> OSPA_CTRL_VERSION_OFFSET
    }

    /// ADK proof in host byte order
    #[inline(always)]
    pub fn adk_proof(&self) -> u32 {
        u32::from_be_bytes(self.adk_proof)
    }
}

unsafe impl Header for EthHdr {}
unsafe impl Header for VlanHdr {}
unsafe impl Header for Ipv4Hdr {}
unsafe impl Header for Ipv6Hdr {}
unsafe impl Header for UdpHdr {}
unsafe impl Header for OspaHdr {}

const _: () = {
    use core::mem::{align_of, size_of};

    assert!(size_of::<EthHdr>() == EthHdr::LEN && align_of::<EthHdr>() == 1);
    assert!(size_of::<VlanHdr>() == VlanHdr::LEN && align_of::<VlanHdr>() == 1);
    assert!(size_of::<Ipv4Hdr>() == Ipv4Hdr::LEN && align_of::<Ipv4Hdr>() == 1);
    assert!(size_of::<Ipv6Hdr>() == Ipv6Hdr::LEN && align_of::<Ipv6Hdr>() == 1);
    assert!(size_of::<UdpHdr>() == UdpHdr::LEN && align_of::<UdpHdr>() == 1);
    assert!(size_of::<OspaHdr>() == OspaHdr::LEN && align_of::<OspaHdr>() == 1);
};
