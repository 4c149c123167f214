use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use slog::{debug, info, warn, Logger};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::processor::{Forwarder, INTERNAL_INTERFACE};
use crate::PacketError;

/// UDP port SCION end hosts listen on for data-plane traffic. Local
/// deliveries resolve to it since the next-hop carries no port.
const END_HOST_PORT: u16 = 30041;

/// Largest datagram the receive loops accept.
const MAX_DATAGRAM: usize = 65535;

/// Socket runner of the data plane.
///
/// Binds one underlay socket per configured external interface plus the
/// internal host-facing socket. Each socket receives on its own task; a
/// received packet is processed to completion by the forwarder and emitted
/// on the socket of the resolved egress interface.
pub struct Dataplane {
    log: Logger,
    forwarder: Arc<Forwarder>,
    sockets: HashMap<u16, Arc<UdpSocket>>,
}

impl Dataplane {
    /// Binds all sockets. `interface_addrs` maps each external interface to
    /// its local underlay bind address; `internal_addr` serves the local
    /// host.
    pub async fn bind(
        log: Logger,
        forwarder: Arc<Forwarder>,
        internal_addr: SocketAddr,
        interface_addrs: &HashMap<u16, SocketAddr>,
    ) -> io::Result<Dataplane> {
        let mut sockets = HashMap::new();
        sockets.insert(
            INTERNAL_INTERFACE,
            Arc::new(UdpSocket::bind(internal_addr).await?),
        );
        for (interface, addr) in interface_addrs {
            sockets.insert(*interface, Arc::new(UdpSocket::bind(addr).await?));
        }
        Ok(Dataplane { log, forwarder, sockets })
    }

    /// Local address a given interface socket is bound to.
    pub fn local_addr(&self, interface: u16) -> Option<SocketAddr> {
        self.sockets.get(&interface).and_then(|s| s.local_addr().ok())
    }

    /// Spawns the per-socket receive loops. The returned handle resolves
    /// once a shutdown has been signalled and all loops have stopped.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let Dataplane { log, forwarder, sockets } = self;
        let by_egress: Arc<HashMap<u16, Arc<UdpSocket>>> = Arc::new(sockets);

        let mut tasks = Vec::new();
        for (interface, socket) in by_egress.iter() {
            let loop_task = ReceiveLoop {
                log: log.clone(),
                forwarder: forwarder.clone(),
                ingress_id: *interface,
                socket: socket.clone(),
                by_egress: by_egress.clone(),
            };
            tasks.push(tokio::spawn(loop_task.run(shutdown.clone())));
        }
        tokio::spawn(async move {
            for task in tasks {
                let _ = task.await;
            }
            info!(log, "data plane stopped");
        })
    }
}

struct ReceiveLoop {
    log: Logger,
    forwarder: Arc<Forwarder>,
    ingress_id: u16,
    socket: Arc<UdpSocket>,
    by_egress: Arc<HashMap<u16, Arc<UdpSocket>>>,
}

impl ReceiveLoop {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };
            let len = match received {
                Ok((len, _)) => len,
                Err(e) => {
                    warn!(self.log, "underlay receive failed";
                        "interface" => self.ingress_id, "error" => %e);
                    continue;
                }
            };
            self.handle_packet(&mut buf[..len]).await;
        }
    }

    async fn handle_packet(&self, packet: &mut [u8]) {
        let next_hop = match self.forwarder.process(packet, self.ingress_id) {
            Ok(next_hop) => next_hop,
            Err(e) => {
                self.log_drop(&e);
                return;
            }
        };
        let Some(out) = self.by_egress.get(&next_hop.interface) else {
            warn!(self.log, "no socket for egress interface";
                "interface" => next_hop.interface);
            return;
        };
        let mut addr = next_hop.addr;
        if next_hop.interface == INTERNAL_INTERFACE {
            addr.set_port(END_HOST_PORT);
        }
        if let Err(e) = out.send_to(packet, addr).await {
            warn!(self.log, "underlay send failed";
                "interface" => next_hop.interface, "addr" => %addr, "error" => %e);
        }
    }

    fn log_drop(&self, err: &PacketError) {
        match err {
            PacketError::InvalidPacket(_) | PacketError::HopExpired => {
                debug!(self.log, "dropping packet";
                    "interface" => self.ingress_id, "reason" => %err);
            }
            PacketError::IngressMismatch { .. } | PacketError::LocalDestinationMismatch => {
                info!(self.log, "dropping packet";
                    "interface" => self.ingress_id, "reason" => %err);
            }
            _ => {
                warn!(self.log, "dropping packet";
                    "interface" => self.ingress_id, "reason" => %err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use cion_base_types::Ia;

    use super::*;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transit_packets_reach_the_next_hop_underlay() {
        // The "peer router" behind egress interface 2.
        let peer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let local_ia: Ia = "1-ff00:0:1".parse().unwrap();
        let next_hops = HashMap::from([(2u16, peer_addr)]);
        let forwarder = Arc::new(Forwarder::new(local_ia, b"runner test key", next_hops));

        let interface_addrs = HashMap::from([
            (1u16, SocketAddr::from((Ipv4Addr::LOCALHOST, 0))),
            (2u16, SocketAddr::from((Ipv4Addr::LOCALHOST, 0))),
        ]);
        let dataplane = Dataplane::bind(
            test_logger(),
            forwarder,
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            &interface_addrs,
        )
        .await
        .unwrap();
        let ingress_addr = dataplane.local_addr(1).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = dataplane.start(shutdown_rx);

        // A transit packet entering on interface 1, leaving on interface 2.
        let packet = crate::processor::testing::transit_packet(
            "1-ff00:0:2".parse().unwrap(),
            b"runner test key",
        );
        let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        sender.send_to(&packet, ingress_addr).await.unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), peer.recv_from(&mut buf))
            .await
            .expect("forwarded packet should arrive")
            .unwrap();
        assert_eq!(len, packet.len());
        // The forwarded packet differs from the input only in the advanced
        // path pointer.
        assert_ne!(&buf[..len], packet.as_slice());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
