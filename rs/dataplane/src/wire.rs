//! SCION header and path wire format.
//!
//! Decoding of the common and address headers, an in-place view over the
//! standard SCION path, and the hop-field MAC helpers. All accessors take
//! the relevant buffer slice explicitly so a caller can hold the packet
//! immutably while inspecting it and mutably only when committing changes.

use std::net::IpAddr;
use std::time::Duration;

use cion_base_types::Ia;
use hmac::Mac;

use crate::PacketError;

/// Path type value of the standard SCION path.
pub const PATH_TYPE_SCION: u8 = 1;

/// Size of the common header in bytes.
pub const COMMON_HEADER_LEN: usize = 12;
/// Size of one info field in bytes.
pub const INFO_FIELD_LEN: usize = 8;
/// Size of one hop field in bytes.
pub const HOP_FIELD_LEN: usize = 12;
/// Size of the path meta header in bytes.
pub const PATH_META_LEN: usize = 4;
/// Number of MAC bytes carried in a hop field.
pub const MAC_LEN: usize = 6;

/// Keyed MAC instance used for hop-field verification.
pub type HopFieldMac = hmac::Hmac<sha2::Sha256>;

/// One exp-time unit is 24h / 256.
const EXP_TIME_UNIT_MS: u64 = 24 * 60 * 60 * 1000 / 256;

fn malformed(msg: &str) -> PacketError {
    PacketError::InvalidPacket(msg.to_string())
}

/// Fixed and address header fields the forwarder needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub dst_ia: Ia,
    pub src_ia: Ia,
    pub dst_host: IpAddr,
    pub path_type: u8,
    /// Offset of the path header within the packet.
    pub path_offset: usize,
    /// Length of the path header in bytes.
    pub path_len: usize,
}

/// Decodes the common and address headers of a SCION packet.
pub fn decode_header(packet: &[u8]) -> Result<Header, PacketError> {
    if packet.len() < COMMON_HEADER_LEN {
        return Err(malformed("packet shorter than the common header"));
    }
    let version = packet[0] >> 4;
    if version != 0 {
        return Err(malformed("unsupported header version"));
    }
    let hdr_len = packet[5] as usize * 4;
    let path_type = packet[8];
    let dst_addr_len = host_addr_len(packet[9] >> 6, packet[9] >> 4 & 0x3)?;
    let src_addr_len = host_addr_len(packet[9] >> 2 & 0x3, packet[9] & 0x3)?;

    let path_offset = COMMON_HEADER_LEN + 16 + dst_addr_len + src_addr_len;
    if hdr_len < path_offset || packet.len() < hdr_len {
        return Err(malformed("header length out of bounds"));
    }

    let dst_ia = Ia::from_u64(u64::from_be_bytes(
        packet[12..20].try_into().expect("eight bytes"),
    ));
    let src_ia = Ia::from_u64(u64::from_be_bytes(
        packet[20..28].try_into().expect("eight bytes"),
    ));
    let dst_host = decode_host(&packet[28..28 + dst_addr_len]);

    Ok(Header {
        dst_ia,
        src_ia,
        dst_host,
        path_type,
        path_offset,
        path_len: hdr_len - path_offset,
    })
}

fn host_addr_len(addr_type: u8, addr_len_code: u8) -> Result<usize, PacketError> {
    // Only IP host addresses are supported: type 0 with a 4-byte (IPv4) or
    // 16-byte (IPv6) length code.
    match (addr_type, addr_len_code) {
        (0, 0) => Ok(4),
        (0, 3) => Ok(16),
        _ => Err(malformed("unsupported host address type")),
    }
}

fn decode_host(raw: &[u8]) -> IpAddr {
    match raw.len() {
        4 => IpAddr::from(<[u8; 4]>::try_from(raw).expect("four bytes")),
        _ => IpAddr::from(<[u8; 16]>::try_from(raw).expect("sixteen bytes")),
    }
}

/// The path meta header: current pointers and segment lengths.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PathMeta {
    pub curr_inf: u8,
    pub curr_hf: u8,
    pub seg_len: [u8; 3],
}

impl PathMeta {
    pub fn decode(raw: u32) -> PathMeta {
        PathMeta {
            curr_inf: (raw >> 30) as u8,
            curr_hf: (raw >> 24 & 0x3f) as u8,
            seg_len: [
                (raw >> 12 & 0x3f) as u8,
                (raw >> 6 & 0x3f) as u8,
                (raw & 0x3f) as u8,
            ],
        }
    }

    pub fn encode(&self) -> u32 {
        (self.curr_inf as u32) << 30
            | (self.curr_hf as u32) << 24
            | (self.seg_len[0] as u32) << 12
            | (self.seg_len[1] as u32) << 6
            | self.seg_len[2] as u32
    }
}

/// One info field: per-segment direction, MAC accumulator and timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoField {
    pub cons_dir: bool,
    pub seg_id: u16,
    pub timestamp: u32,
}

impl InfoField {
    pub fn decode(raw: &[u8]) -> InfoField {
        InfoField {
            cons_dir: raw[0] & 0x1 != 0,
            seg_id: u16::from_be_bytes([raw[2], raw[3]]),
            timestamp: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0] = self.cons_dir as u8;
        out[1] = 0;
        out[2..4].copy_from_slice(&self.seg_id.to_be_bytes());
        out[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
    }

    /// Folds a hop-field MAC into the segment accumulator.
    pub fn update_seg_id(&mut self, mac: [u8; MAC_LEN]) {
        self.seg_id ^= u16::from_be_bytes([mac[0], mac[1]]);
    }
}

/// One hop field: interface pair, expiry and MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopField {
    pub cons_ingress: u16,
    pub cons_egress: u16,
    pub exp_time: u8,
    pub mac: [u8; MAC_LEN],
}

impl HopField {
    pub fn decode(raw: &[u8]) -> HopField {
        HopField {
            exp_time: raw[1],
            cons_ingress: u16::from_be_bytes([raw[2], raw[3]]),
            cons_egress: u16::from_be_bytes([raw[4], raw[5]]),
            mac: raw[6..12].try_into().expect("six bytes"),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0] = 0;
        out[1] = self.exp_time;
        out[2..4].copy_from_slice(&self.cons_ingress.to_be_bytes());
        out[4..6].copy_from_slice(&self.cons_egress.to_be_bytes());
        out[6..12].copy_from_slice(&self.mac);
    }
}

/// In-place view over a standard SCION path.
///
/// The view holds the decoded meta header plus derived counts; field
/// accessors and mutators take the path buffer explicitly.
#[derive(Debug, Clone, Copy)]
pub struct RawPath {
    pub meta: PathMeta,
    num_inf: usize,
    num_hops: usize,
}

impl RawPath {
    pub fn parse(buf: &[u8]) -> Result<RawPath, PacketError> {
        if buf.len() < PATH_META_LEN {
            return Err(malformed("path shorter than the meta header"));
        }
        let meta = PathMeta::decode(u32::from_be_bytes(
            buf[..PATH_META_LEN].try_into().expect("four bytes"),
        ));
        let mut num_inf = 0;
        let mut num_hops = 0;
        for (i, len) in meta.seg_len.iter().enumerate() {
            if *len == 0 {
                continue;
            }
            if i != num_inf {
                return Err(malformed("non-contiguous path segments"));
            }
            num_inf = i + 1;
            num_hops += *len as usize;
        }
        if num_inf == 0 {
            return Err(malformed("path without segments"));
        }
        let path = RawPath { meta, num_inf, num_hops };
        if buf.len() < path.len() {
            return Err(malformed("path header truncated"));
        }
        if meta.curr_inf as usize >= num_inf || meta.curr_hf as usize >= num_hops {
            return Err(malformed("path pointer out of bounds"));
        }
        if meta.curr_inf as usize != path.segment_of(meta.curr_hf) {
            return Err(malformed("path pointers are inconsistent"));
        }
        Ok(path)
    }

    pub fn num_info_fields(&self) -> usize {
        self.num_inf
    }

    pub fn num_hop_fields(&self) -> usize {
        self.num_hops
    }

    /// Byte length of the encoded path.
    pub fn len(&self) -> usize {
        PATH_META_LEN + self.num_inf * INFO_FIELD_LEN + self.num_hops * HOP_FIELD_LEN
    }

    /// Index of the segment the given hop field belongs to.
    fn segment_of(&self, hf: u8) -> usize {
        let mut remaining = hf as usize;
        for (i, len) in self.meta.seg_len[..self.num_inf].iter().enumerate() {
            if remaining < *len as usize {
                return i;
            }
            remaining -= *len as usize;
        }
        self.num_inf - 1
    }

    fn info_offset(&self, index: usize) -> usize {
        PATH_META_LEN + index * INFO_FIELD_LEN
    }

    fn hop_offset(&self, index: usize) -> usize {
        PATH_META_LEN + self.num_inf * INFO_FIELD_LEN + index * HOP_FIELD_LEN
    }

    pub fn current_info_field(&self, buf: &[u8]) -> InfoField {
        let offset = self.info_offset(self.meta.curr_inf as usize);
        InfoField::decode(&buf[offset..offset + INFO_FIELD_LEN])
    }

    pub fn current_hop_field(&self, buf: &[u8]) -> HopField {
        let offset = self.hop_offset(self.meta.curr_hf as usize);
        HopField::decode(&buf[offset..offset + HOP_FIELD_LEN])
    }

    /// Writes an info field back into the path buffer.
    pub fn set_info_field(
        &self,
        buf: &mut [u8],
        info: &InfoField,
        index: usize,
    ) -> Result<(), PacketError> {
        if index >= self.num_inf {
            return Err(malformed("info field index out of bounds"));
        }
        let offset = self.info_offset(index);
        info.encode(&mut buf[offset..offset + INFO_FIELD_LEN]);
        Ok(())
    }

    /// Advances the path pointer by one hop and serialises the meta header.
    pub fn inc_path(&mut self, buf: &mut [u8]) -> Result<(), PacketError> {
        let next = self.meta.curr_hf as usize + 1;
        if next >= self.num_hops {
            return Err(PacketError::PathOverflow);
        }
        self.meta.curr_hf = next as u8;
        self.meta.curr_inf = self.segment_of(self.meta.curr_hf) as u8;
        buf[..PATH_META_LEN].copy_from_slice(&self.meta.encode().to_be_bytes());
        Ok(())
    }
}

/// Computes the hop-field MAC over the info and hop fields.
///
/// The MAC input is the fixed 16-byte block chaining the segment
/// accumulator, timestamp, expiry and the interface pair. The hasher is a
/// long-lived keyed instance; it is reset by finalisation.
pub fn mac(
    hasher: &mut HopFieldMac,
    info: &InfoField,
    hop: &HopField,
    input: &mut [u8; 16],
) -> [u8; MAC_LEN] {
    input[0] = 0;
    input[1] = 0;
    input[2..4].copy_from_slice(&info.seg_id.to_be_bytes());
    input[4..8].copy_from_slice(&info.timestamp.to_be_bytes());
    input[8] = 0;
    input[9] = hop.exp_time;
    input[10..12].copy_from_slice(&hop.cons_ingress.to_be_bytes());
    input[12..14].copy_from_slice(&hop.cons_egress.to_be_bytes());
    input[14] = 0;
    input[15] = 0;

    hasher.update(input.as_slice());
    let digest = hasher.finalize_reset().into_bytes();
    digest[..MAC_LEN].try_into().expect("digest longer than the MAC")
}

/// Maps an 8-bit exp-time value to the relative expiry duration,
/// `(ExpTime + 1) · 24h / 256`.
pub fn exp_time_to_duration(exp_time: u8) -> Duration {
    Duration::from_millis((exp_time as u64 + 1) * EXP_TIME_UNIT_MS)
}
