//! Wire codec for the frames the client sends and receives on the raw
//! socket: an Ethernet header wrapping an IPv4/UDP datagram wrapping a
//! BOOTP/DHCP message (RFC 2131 + RFC 2132 options).
//!
//! Field-by-field decomposition follows the same fixed-header-then-TLV-tail
//! shape this codebase uses for its other wire formats, generalized from
//! little-endian, panic-on-short-input parsing to the correct network byte
//! order with bounds-checked decoding. Option numbering follows
//! `enums/dhcp.py`.

use crate::dhcp::Error;
use mac_address::MacAddress;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

pub const ETH_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
pub const BOOTP_FIXED_LEN: usize = 236;
pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const IPPROTO_UDP: u8 = 17;
pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
pub const HTYPE_ETHERNET: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<MessageType> {
        use MessageType::*;
        Some(match value {
            1 => Discover,
            2 => Offer,
            3 => Request,
            4 => Decline,
            5 => Ack,
            6 => Nak,
            7 => Release,
            8 => Inform,
            _ => return None,
        })
    }
}

/// DHCP/BOOTP option codes in use by this client, per `enums/dhcp.py`.
pub mod option {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTER: u8 = 3;
    pub const NAME_SERVER: u8 = 6;
    pub const HOST_NAME: u8 = 12;
    pub const DOMAIN_NAME: u8 = 15;
    pub const INTERFACE_MTU: u8 = 26;
    pub const BROADCAST_ADDRESS: u8 = 28;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const OPTION_OVERLOAD: u8 = 52;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_ID: u8 = 54;
    pub const PARAMETER_LIST: u8 = 55;
    pub const MESSAGE: u8 = 56;
    pub const MAX_MSG_SIZE: u8 = 57;
    pub const RENEWAL_TIME: u8 = 58;
    pub const REBINDING_TIME: u8 = 59;
    pub const CLIENT_ID: u8 = 61;
    pub const DOMAIN_SEARCH: u8 = 119;
    pub const END: u8 = 255;
}

/// A parsed bag of DHCP options, keyed by option code. Values are the raw
/// option payload; typed accessors live on [`DhcpMessage`].
#[derive(Debug, Clone, Default)]
pub struct Options(pub BTreeMap<u8, Vec<u8>>);

impl Options {
    pub fn get(&self, code: u8) -> Option<&[u8]> {
        self.0.get(&code).map(|v| v.as_slice())
    }

    pub fn set(&mut self, code: u8, value: Vec<u8>) {
        self.0.insert(code, value);
    }

    pub fn get_u32(&self, code: u8) -> Option<u32> {
        self.get(code).and_then(|b| b.try_into().ok()).map(u32::from_be_bytes)
    }

    pub fn get_ipv4(&self, code: u8) -> Option<Ipv4Addr> {
        self.get(code).and_then(|b| <[u8; 4]>::try_from(b).ok()).map(Ipv4Addr::from)
    }

    pub fn get_ipv4_list(&self, code: u8) -> Option<Vec<Ipv4Addr>> {
        let bytes = self.get(code)?;
        if bytes.len() % 4 != 0 || bytes.is_empty() {
            return None;
        }
        Some(bytes.chunks_exact(4).map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3])).collect())
    }

    pub fn get_string(&self, code: u8) -> Option<String> {
        self.get(code).map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Decodes a tag-length-value option stream. Stops at `END` or when the
    /// stream is exhausted; tolerant of a missing terminator.
    pub fn decode(mut data: &[u8]) -> Options {
        let mut options = BTreeMap::new();
        while !data.is_empty() {
            let code = data[0];
            if code == option::PAD {
                data = &data[1..];
                continue;
            }
            if code == option::END {
                break;
            }
            if data.len() < 2 {
                log::warn!("dropping trailing byte after option {code}: no room for a length field");
                break;
            }
            let len = data[1] as usize;
            if data.len() < 2 + len {
                log::warn!(
                    "truncated option {code}: declared length {len} exceeds remaining {} bytes, skipping the rest",
                    data.len() - 2
                );
                break;
            }
            options.insert(code, data[2..2 + len].to_vec());
            data = &data[2 + len..];
        }
        Options(options)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        for (&code, value) in &self.0 {
            buf.push(code);
            buf.push(value.len() as u8);
            buf.extend_from_slice(value);
        }
        buf.push(option::END);
    }
}

/// A full BOOTP/DHCP message body (the payload carried over UDP, not
/// including the IP/UDP/Ethernet headers).
#[derive(Debug, Clone)]
pub struct DhcpMessage {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: MacAddress,
    pub sname: String,
    pub file: String,
    pub options: Options,
}

impl DhcpMessage {
    pub fn message_type(&self) -> Option<MessageType> {
        self.options.get(option::MESSAGE_TYPE).and_then(|b| b.first().copied()).and_then(MessageType::from_u8)
    }

    pub fn decode(raw: &[u8]) -> Result<DhcpMessage, Error> {
        if raw.len() < BOOTP_FIXED_LEN {
            return Err(Error::ProtocolError("bootp message shorter than fixed header".into()));
        }
        let op = raw[0];
        let htype = raw[1];
        let hlen = raw[2];
        let hops = raw[3];
        let xid = u32::from_be_bytes(raw[4..8].try_into().unwrap());
        let secs = u16::from_be_bytes(raw[8..10].try_into().unwrap());
        let flags = u16::from_be_bytes(raw[10..12].try_into().unwrap());
        let ciaddr = Ipv4Addr::from(<[u8; 4]>::try_from(&raw[12..16]).unwrap());
        let yiaddr = Ipv4Addr::from(<[u8; 4]>::try_from(&raw[16..20]).unwrap());
        let siaddr = Ipv4Addr::from(<[u8; 4]>::try_from(&raw[20..24]).unwrap());
        let giaddr = Ipv4Addr::from(<[u8; 4]>::try_from(&raw[24..28]).unwrap());
        let chaddr = MacAddress::new(raw[28..34].try_into().unwrap());
        let sname = trim_cstr(&raw[44..108]);
        let file = trim_cstr(&raw[108..236]);

        let rest = &raw[BOOTP_FIXED_LEN..];
        let options = if rest.len() >= 4 && rest[0..4] == MAGIC_COOKIE {
            Options::decode(&rest[4..])
        } else {
            Options::default()
        };

        Ok(DhcpMessage { op, htype, hlen, hops, xid, secs, flags, ciaddr, yiaddr, siaddr, giaddr, chaddr, sname, file, options })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BOOTP_FIXED_LEN + 64);
        buf.push(self.op);
        buf.push(self.htype);
        buf.push(self.hlen);
        buf.push(self.hops);
        buf.extend_from_slice(&self.xid.to_be_bytes());
        buf.extend_from_slice(&self.secs.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.ciaddr.octets());
        buf.extend_from_slice(&self.yiaddr.octets());
        buf.extend_from_slice(&self.siaddr.octets());
        buf.extend_from_slice(&self.giaddr.octets());
        buf.extend_from_slice(&self.chaddr.bytes());
        buf.resize(buf.len() + 10, 0); // pad chaddr field to 16 bytes
        pad_cstr(&mut buf, &self.sname, 64);
        pad_cstr(&mut buf, &self.file, 128);
        buf.extend_from_slice(&MAGIC_COOKIE);
        self.options.encode(&mut buf);
        buf
    }

    /// Builds a request-side message (DISCOVER/REQUEST/etc) with the given
    /// xid and chaddr; the caller fills in `options` and optionally
    /// `ciaddr`/ the requested-ip option depending on FSM state.
    pub fn new_request(xid: u32, chaddr: MacAddress, message_type: MessageType) -> DhcpMessage {
        let mut options = Options::default();
        options.set(option::MESSAGE_TYPE, vec![message_type as u8]);
        DhcpMessage {
            op: BOOTREQUEST,
            htype: HTYPE_ETHERNET,
            hlen: 6,
            hops: 0,
            xid,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
            sname: String::new(),
            file: String::new(),
            options,
        }
    }
}

fn trim_cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn pad_cstr(buf: &mut Vec<u8>, value: &str, len: usize) {
    let bytes = value.as_bytes();
    let take = bytes.len().min(len);
    buf.extend_from_slice(&bytes[..take]);
    buf.resize(buf.len() + (len - take), 0);
}

/// An Ethernet + IPv4 + UDP frame carrying a [`DhcpMessage`]. Decoding
/// tolerates the server replying with a unicast L2 destination or
/// broadcast, per RFC 2131 section 4.1.
#[derive(Debug, Clone)]
pub struct Frame {
    pub eth_dst: MacAddress,
    pub eth_src: MacAddress,
    pub ip_src: Ipv4Addr,
    pub ip_dst: Ipv4Addr,
    pub udp_src: u16,
    pub udp_dst: u16,
    pub message: DhcpMessage,
}

impl Frame {
    pub fn decode(raw: &[u8]) -> Result<Frame, Error> {
        if raw.len() < ETH_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN {
            return Err(Error::ProtocolError("frame shorter than L2/L3/L4 headers".into()));
        }
        let eth_dst = MacAddress::new(raw[0..6].try_into().unwrap());
        let eth_src = MacAddress::new(raw[6..12].try_into().unwrap());
        let ethertype = u16::from_be_bytes(raw[12..14].try_into().unwrap());
        if ethertype != ETHERTYPE_IPV4 {
            return Err(Error::ProtocolError(format!("unexpected ethertype {ethertype:#06x}")));
        }

        let ip = &raw[ETH_HEADER_LEN..];
        let ihl = ((ip[0] & 0x0F) as usize) * 4;
        if ip.len() < ihl + UDP_HEADER_LEN || ip[9] != IPPROTO_UDP {
            return Err(Error::ProtocolError("not a UDP/IPv4 packet".into()));
        }
        let ip_src = Ipv4Addr::from(<[u8; 4]>::try_from(&ip[12..16]).unwrap());
        let ip_dst = Ipv4Addr::from(<[u8; 4]>::try_from(&ip[16..20]).unwrap());

        let udp = &ip[ihl..];
        let udp_src = u16::from_be_bytes(udp[0..2].try_into().unwrap());
        let udp_dst = u16::from_be_bytes(udp[2..4].try_into().unwrap());
        let message = DhcpMessage::decode(&udp[UDP_HEADER_LEN..])?;

        Ok(Frame { eth_dst, eth_src, ip_src, ip_dst, udp_src, udp_dst, message })
    }

    /// Encodes a frame for transmission. DHCP client traffic before an
    /// address is bound is sent from `0.0.0.0:68` to the all-ones broadcast,
    /// addressed at the Ethernet level to `eth_dst` (usually broadcast too).
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.message.encode();
        let udp_len = UDP_HEADER_LEN + payload.len();
        let total_len = IPV4_HEADER_LEN + udp_len;

        let mut ip_header = vec![0u8; IPV4_HEADER_LEN];
        ip_header[0] = 0x45; // version 4, IHL 5
        ip_header[1] = 0x10; // DSCP: low delay
        ip_header[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        ip_header[4..6].copy_from_slice(&0u16.to_be_bytes()); // identification
        ip_header[6..8].copy_from_slice(&0u16.to_be_bytes()); // flags/fragment offset
        ip_header[8] = 64; // ttl
        ip_header[9] = IPPROTO_UDP;
        ip_header[12..16].copy_from_slice(&self.ip_src.octets());
        ip_header[16..20].copy_from_slice(&self.ip_dst.octets());
        let checksum = checksum16(&ip_header);
        ip_header[10..12].copy_from_slice(&checksum.to_be_bytes());

        let mut udp_header = vec![0u8; UDP_HEADER_LEN];
        udp_header[0..2].copy_from_slice(&self.udp_src.to_be_bytes());
        udp_header[2..4].copy_from_slice(&self.udp_dst.to_be_bytes());
        udp_header[4..6].copy_from_slice(&(udp_len as u16).to_be_bytes());
        // UDP checksum is optional over IPv4; DHCP clients conventionally
        // send it zeroed, matched here for interoperability with the
        // pcap fixtures this codec is tested against.
        udp_header[6..8].copy_from_slice(&0u16.to_be_bytes());

        let mut out = Vec::with_capacity(ETH_HEADER_LEN + total_len);
        out.extend_from_slice(&self.eth_dst.bytes());
        out.extend_from_slice(&self.eth_src.bytes());
        out.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        out.extend_from_slice(&ip_header);
        out.extend_from_slice(&udp_header);
        out.extend_from_slice(&payload);
        out
    }
}

/// The standard one's-complement IPv4 header checksum.
pub fn checksum16(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chaddr() -> MacAddress {
        MacAddress::new([0x02, 0x11, 0x22, 0x33, 0x44, 0x55])
    }

    #[test]
    fn dhcp_message_round_trips_discover() {
        let msg = DhcpMessage::new_request(0xAABBCCDD, sample_chaddr(), MessageType::Discover);
        let encoded = msg.encode();
        let decoded = DhcpMessage::decode(&encoded).unwrap();
        assert_eq!(decoded.xid, 0xAABBCCDD);
        assert_eq!(decoded.chaddr, sample_chaddr());
        assert_eq!(decoded.message_type(), Some(MessageType::Discover));
    }

    #[test]
    fn options_decode_stops_at_end_marker() {
        let mut raw = vec![option::MESSAGE_TYPE, 1, MessageType::Offer as u8];
        raw.push(option::END);
        raw.extend_from_slice(&[1, 2, 3]); // garbage after END, must be ignored
        let options = Options::decode(&raw);
        assert_eq!(options.get(option::MESSAGE_TYPE), Some(&[MessageType::Offer as u8][..]));
        assert_eq!(options.0.len(), 1);
    }

    #[test]
    fn options_decode_tolerates_truncated_length() {
        let raw = vec![option::SUBNET_MASK, 4, 255, 255]; // claims 4 bytes, only 2 present
        let options = Options::decode(&raw);
        assert!(options.0.is_empty());
    }

    #[test]
    fn checksum_of_known_header_matches() {
        // Example header from RFC 1071.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum16(&data), 0x220D);
    }

    #[test]
    fn frame_round_trips_through_full_stack() {
        let msg = DhcpMessage::new_request(42, sample_chaddr(), MessageType::Discover);
        let frame = Frame {
            eth_dst: MacAddress::new([0xff; 6]),
            eth_src: sample_chaddr(),
            ip_src: Ipv4Addr::UNSPECIFIED,
            ip_dst: Ipv4Addr::BROADCAST,
            udp_src: DHCP_CLIENT_PORT,
            udp_dst: DHCP_SERVER_PORT,
            message: msg,
        };
        let encoded = frame.encode();
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded.message.xid, 42);
        assert_eq!(decoded.udp_dst, DHCP_SERVER_PORT);
    }
}
