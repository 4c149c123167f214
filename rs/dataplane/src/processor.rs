use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use cion_base_types::Ia;
use hmac::Mac;
use subtle::ConstantTimeEq;

use crate::wire::{self, HopFieldMac};
use crate::PacketError;

/// Ingress identifier of packets entering from the local host.
pub const INTERNAL_INTERFACE: u16 = 0;

/// Where a processed packet has to be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextHop {
    /// Egress SCION interface, [`INTERNAL_INTERFACE`] for local delivery.
    pub interface: u16,
    /// Underlay address to send the packet to. For local delivery the port
    /// is zero and the address is the packet's destination host.
    pub addr: SocketAddr,
}

/// Per-packet scratch state: the keyed MAC instance and its input block.
///
/// Processors are pooled by the forwarder; a processor must not be held
/// across packets.
struct Processor {
    mac: HopFieldMac,
    mac_input: [u8; 16],
}

impl Processor {
    fn new(key: &[u8]) -> Processor {
        Processor {
            mac: HopFieldMac::new_from_slice(key).expect("HMAC accepts any key length"),
            mac_input: [0u8; 16],
        }
    }

    fn process(
        &mut self,
        packet: &mut [u8],
        ingress_id: u16,
        local_ia: Ia,
        external_next_hops: &HashMap<u16, SocketAddr>,
    ) -> Result<NextHop, PacketError> {
        let header = wire::decode_header(packet)?;
        if header.path_type != wire::PATH_TYPE_SCION {
            return Err(PacketError::InvalidPacket(format!(
                "unsupported path type {}",
                header.path_type
            )));
        }
        let path_end = header.path_offset + header.path_len;
        let mut path = wire::RawPath::parse(&packet[header.path_offset..path_end])?;
        let mut info = path.current_info_field(&packet[header.path_offset..path_end]);
        let hop = path.current_hop_field(&packet[header.path_offset..path_end]);

        let expiry_ms = info.timestamp as u128 * 1000
            + wire::exp_time_to_duration(hop.exp_time).as_millis();
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("wall clock after the epoch")
            .as_millis();
        if now_ms > expiry_ms {
            return Err(PacketError::HopExpired);
        }

        let (resolved_ingress, resolved_egress) = if info.cons_dir {
            (hop.cons_ingress, hop.cons_egress)
        } else {
            (hop.cons_egress, hop.cons_ingress)
        };

        // Against construction direction the accumulator absorbs the hop MAC
        // before verification. The write-back is deferred until all checks
        // have passed.
        let mut info_dirty = false;
        if ingress_id != INTERNAL_INTERFACE && !info.cons_dir {
            info.update_seg_id(hop.mac);
            info_dirty = true;
        }

        if ingress_id != INTERNAL_INTERFACE && ingress_id != resolved_ingress {
            return Err(PacketError::IngressMismatch {
                expected: resolved_ingress,
                actual: ingress_id,
            });
        }

        let expected = wire::mac(&mut self.mac, &info, &hop, &mut self.mac_input);
        if !bool::from(expected.ct_eq(&hop.mac)) {
            return Err(PacketError::MacInvalid);
        }

        if ingress_id != INTERNAL_INTERFACE && resolved_egress == INTERNAL_INTERFACE {
            if header.dst_ia != local_ia {
                return Err(PacketError::LocalDestinationMismatch);
            }
            let path_buf = &mut packet[header.path_offset..path_end];
            if info_dirty {
                path.set_info_field(path_buf, &info, path.meta.curr_inf as usize)?;
            }
            return Ok(NextHop {
                interface: INTERNAL_INTERFACE,
                addr: SocketAddr::new(header.dst_host, 0),
            });
        }

        if ingress_id == INTERNAL_INTERFACE && resolved_egress == INTERNAL_INTERFACE {
            return Err(PacketError::EgressZeroFromInternal);
        }

        let next_hop = *external_next_hops
            .get(&resolved_egress)
            .ok_or(PacketError::UnknownExternalInterface(resolved_egress))?;

        // In construction direction the accumulator absorbs the MAC on the
        // way out.
        if info.cons_dir {
            info.update_seg_id(hop.mac);
            info_dirty = true;
        }

        // Overflow is detected before any buffer mutation so errors leave
        // the packet byte-identical.
        if path.meta.curr_hf as usize + 1 >= path.num_hop_fields() {
            return Err(PacketError::PathOverflow);
        }
        let curr_inf = path.meta.curr_inf as usize;
        let path_buf = &mut packet[header.path_offset..path_end];
        if info_dirty {
            path.set_info_field(path_buf, &info, curr_inf)?;
        }
        path.inc_path(path_buf)?;

        Ok(NextHop { interface: resolved_egress, addr: next_hop })
    }
}

/// The data-plane forwarding engine.
///
/// Owns the write-once interface table and the processor pool. `process`
/// may be called concurrently as long as the packet buffers are disjoint.
pub struct Forwarder {
    local_ia: Ia,
    key: Vec<u8>,
    external_next_hops: HashMap<u16, SocketAddr>,
    pool: Mutex<Vec<Processor>>,
}

impl Forwarder {
    pub fn new(local_ia: Ia, key: &[u8], external_next_hops: HashMap<u16, SocketAddr>) -> Forwarder {
        Forwarder {
            local_ia,
            key: key.to_vec(),
            external_next_hops,
            pool: Mutex::new(Vec::new()),
        }
    }

    pub fn local_ia(&self) -> Ia {
        self.local_ia
    }

    /// Underlay address of the peer router behind an external interface.
    pub fn external_next_hop(&self, interface: u16) -> Option<SocketAddr> {
        self.external_next_hops.get(&interface).copied()
    }

    /// Processes one packet in place.
    ///
    /// `ingress_id` zero means the packet entered from the local host. On
    /// success the buffer holds the updated path; on error it is untouched.
    pub fn process(&self, packet: &mut [u8], ingress_id: u16) -> Result<NextHop, PacketError> {
        let mut processor = self
            .pool
            .lock()
            .expect("forwarder pool is never poisoned")
            .pop()
            .unwrap_or_else(|| Processor::new(&self.key));
        let result = processor.process(packet, ingress_id, self.local_ia, &self.external_next_hops);
        self.pool
            .lock()
            .expect("forwarder pool is never poisoned")
            .push(processor);
        result
    }
}
