//! ICMP Echo Request/Reply frames.

use std::net::Ipv4Addr;

use bytes::Bytes;
use pnet::packet::{
    ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket},
    icmp::{
        self, echo_reply, echo_request, IcmpPacket, IcmpTypes, MutableIcmpPacket,
    },
    ip::IpNextHeaderProtocols,
    ipv4::{self, Ipv4Packet, MutableIpv4Packet},
    Packet,
};
use pnet::util::MacAddr;

const ETHER_HEADER_LEN: usize = 14;
const IPV4_HEADER_LEN: usize = 20;
const ICMP_ECHO_HEADER_LEN: usize = 8;

/// TTL stamped on every generated frame.
const TTL: u8 = 64;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame too short for an ethernet/IPv4/ICMP echo message")]
    Truncated,
    #[error("not an IPv4 frame")]
    NotIpv4,
    #[error("not an ICMP packet")]
    NotIcmp,
    #[error("not an ICMP echo request")]
    NotEchoRequest,
}

/// An inbound ICMP Echo Request, copied out of the capture buffer.
///
/// The fields are owned rather than borrowed so the capture loop can reuse
/// its receive buffer while reply tasks still hold the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    /// Link-layer source of the original frame; the reply goes straight
    /// back to this hardware address, no address resolution needed.
    pub src_mac: MacAddr,
    /// Network-layer source (the pinging host).
    pub src_ip: Ipv4Addr,
    /// Network-layer destination (the simulated host).
    pub dst_ip: Ipv4Addr,
    /// Echo identifier, echoed verbatim.
    pub identifier: u16,
    /// Echo sequence number, echoed verbatim.
    pub sequence: u16,
    /// Echo payload, echoed verbatim. May be empty.
    pub payload: Bytes,
}

impl EchoRequest {
    /// Parses a raw ethernet frame into an owned echo request context.
    pub fn parse(frame: &[u8]) -> Result<Self, ParseError> {
        let ether = EthernetPacket::new(frame).ok_or(ParseError::Truncated)?;
        if ether.get_ethertype() != EtherTypes::Ipv4 {
            return Err(ParseError::NotIpv4);
        }

        let ip = Ipv4Packet::new(ether.payload()).ok_or(ParseError::Truncated)?;
        if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
            return Err(ParseError::NotIcmp);
        }

        let header = IcmpPacket::new(ip.payload()).ok_or(ParseError::Truncated)?;
        if header.get_icmp_type() != IcmpTypes::EchoRequest {
            return Err(ParseError::NotEchoRequest);
        }
        let echo = echo_request::EchoRequestPacket::new(ip.payload())
            .ok_or(ParseError::Truncated)?;

        Ok(Self {
            src_mac: ether.get_source(),
            src_ip: ip.get_source(),
            dst_ip: ip.get_destination(),
            identifier: echo.get_identifier(),
            sequence: echo.get_sequence_number(),
            payload: Bytes::copy_from_slice(echo.payload()),
        })
    }
}

/// A fully assembled Echo Reply frame whose checksum fields are still zeroed.
///
/// The builder deliberately leaves both the IPv4 and the ICMP checksum
/// invalid; the transmission layer calls [`ReplyFrame::seal`] right before
/// the frame leaves the process. This keeps [`build_reply`] a pure,
/// I/O-free transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFrame {
    buf: Vec<u8>,
}

impl ReplyFrame {
    /// Total frame length in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Read access to the unsealed frame; checksum fields are zero.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Computes the ICMP and IPv4 checksums and returns the final frame.
    pub fn seal(mut self) -> Bytes {
        write_checksums(&mut self.buf);
        self.buf.into()
    }
}

/// Fills in the ICMP and IPv4 checksum fields of an assembled echo frame.
fn write_checksums(buf: &mut [u8]) {
    let icmp_offset = ETHER_HEADER_LEN + IPV4_HEADER_LEN;

    let icmp_checksum = {
        let packet = IcmpPacket::new(&buf[icmp_offset..])
            .expect("frame buffer holds a full icmp message");
        icmp::checksum(&packet)
    };
    MutableIcmpPacket::new(&mut buf[icmp_offset..])
        .expect("frame buffer holds a full icmp message")
        .set_checksum(icmp_checksum);

    let ip_checksum = {
        let packet = Ipv4Packet::new(&buf[ETHER_HEADER_LEN..])
            .expect("frame buffer holds a full ipv4 header");
        ipv4::checksum(&packet)
    };
    MutableIpv4Packet::new(&mut buf[ETHER_HEADER_LEN..])
        .expect("frame buffer holds a full ipv4 header")
        .set_checksum(ip_checksum);
}

/// Writes the ethernet and IPv4 headers shared by requests and replies.
///
/// Checksum stays zero; total length covers the IPv4 header plus `icmp_len`.
fn write_outer_headers(
    buf: &mut [u8],
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    icmp_len: usize,
) {
    let mut ether = MutableEthernetPacket::new(buf).expect("buffer sized for ethernet header");
    ether.set_destination(dst_mac);
    ether.set_source(src_mac);
    ether.set_ethertype(EtherTypes::Ipv4);

    let mut ip = MutableIpv4Packet::new(&mut buf[ETHER_HEADER_LEN..])
        .expect("buffer sized for ipv4 header");
    ip.set_version(4);
    ip.set_header_length(5);
    ip.set_total_length((IPV4_HEADER_LEN + icmp_len) as u16);
    ip.set_ttl(TTL);
    ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
    ip.set_source(src_ip);
    ip.set_destination(dst_ip);
}

/// Builds the mirrored Echo Reply for `request`.
///
/// Network-layer addresses are swapped: the reply claims the pinged address
/// as its source and is addressed to the requester. At the link layer it is
/// sent from `local_mac` directly back to the requester's hardware address.
/// Identifier, sequence number and payload are carried over verbatim.
/// Checksums are left zeroed; see [`ReplyFrame::seal`].
pub fn build_reply(request: &EchoRequest, local_mac: MacAddr) -> ReplyFrame {
    let icmp_len = ICMP_ECHO_HEADER_LEN + request.payload.len();
    let mut buf = vec![0u8; ETHER_HEADER_LEN + IPV4_HEADER_LEN + icmp_len];

    write_outer_headers(
        &mut buf,
        local_mac,
        request.src_mac,
        request.dst_ip,
        request.src_ip,
        icmp_len,
    );

    let mut echo = echo_reply::MutableEchoReplyPacket::new(
        &mut buf[ETHER_HEADER_LEN + IPV4_HEADER_LEN..],
    )
    .expect("buffer sized for icmp echo");
    echo.set_icmp_type(IcmpTypes::EchoReply);
    echo.set_icmp_code(echo_reply::IcmpCodes::NoCode);
    echo.set_identifier(request.identifier);
    echo.set_sequence_number(request.sequence);
    echo.set_payload(&request.payload);

    ReplyFrame { buf }
}

/// Builds a complete, sealed Echo Request frame, the inverse of
/// [`EchoRequest::parse`]. Used by traffic generation and tests.
pub fn build_echo_request(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    identifier: u16,
    sequence: u16,
    payload: &[u8],
) -> Bytes {
    let icmp_len = ICMP_ECHO_HEADER_LEN + payload.len();
    let mut buf = vec![0u8; ETHER_HEADER_LEN + IPV4_HEADER_LEN + icmp_len];

    write_outer_headers(&mut buf, src_mac, dst_mac, src_ip, dst_ip, icmp_len);

    {
        let mut echo = echo_request::MutableEchoRequestPacket::new(
            &mut buf[ETHER_HEADER_LEN + IPV4_HEADER_LEN..],
        )
        .expect("buffer sized for icmp echo");
        echo.set_icmp_type(IcmpTypes::EchoRequest);
        echo.set_icmp_code(echo_request::IcmpCodes::NoCode);
        echo.set_identifier(identifier);
        echo.set_sequence_number(sequence);
        echo.set_payload(payload);
    }

    write_checksums(&mut buf);
    buf.into()
}
