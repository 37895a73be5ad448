//! UDP over IPv6: demultiplexes datagrams by destination port.

use crate::dispatch::DispatchMap;
use fakenet_core::error::FakenetResult;
use fakenet_core::wire::ipv6::{NextHeader, Packet};
use fakenet_core::wire::udp::Datagram;
use std::net::Ipv6Addr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A datagram delivered to a bound port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub src: Ipv6Addr,
    pub src_port: u16,
    pub dest: Ipv6Addr,
    pub payload: Vec<u8>,
}

/// Handle for binding ports. Cheap to clone.
#[derive(Clone)]
pub struct UdpEndpoint {
    ports: Arc<DispatchMap<u16, Received>>,
}

impl UdpEndpoint {
    /// Datagrams addressed to `port`. Binding a port again replaces the
    /// earlier receiver.
    pub fn bind(&self, port: u16) -> mpsc::Receiver<Received> {
        self.ports.register(port)
    }
}

pub struct UdpLayer {
    incoming: mpsc::Receiver<Packet>,
    ports: Arc<DispatchMap<u16, Received>>,
}

impl UdpLayer {
    pub fn new(upper_layers: &DispatchMap<NextHeader, Packet>) -> Self {
        Self {
            incoming: upper_layers.register(NextHeader::Udp),
            ports: Arc::new(DispatchMap::new()),
        }
    }

    pub fn endpoint(&self) -> UdpEndpoint {
        UdpEndpoint {
            ports: self.ports.clone(),
        }
    }

    pub async fn run(mut self) -> FakenetResult<()> {
        while let Some(packet) = self.incoming.recv().await {
            let datagram = match Datagram::parse(&packet.payload, &packet.src, &packet.dest) {
                Ok(datagram) => datagram,
                Err(e) => {
                    tracing::debug!(error = %e, src = %packet.src, "dropping udp datagram");
                    continue;
                }
            };

            let port = datagram.dest_port;
            let received = Received {
                src: packet.src,
                src_port: datagram.src_port,
                dest: packet.dest,
                payload: datagram.payload,
            };
            if !self.ports.dispatch(port, received).await {
                tracing::debug!(port, src = %packet.src, "datagram for unbound port");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv6Addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);
    const DEST: Ipv6Addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);

    fn packet(datagram: &Datagram) -> Packet {
        Packet::new(SRC, DEST, NextHeader::Udp, datagram.encode(&SRC, &DEST))
    }

    #[tokio::test]
    async fn datagrams_reach_the_bound_port() {
        let upper = DispatchMap::new();
        let layer = UdpLayer::new(&upper);
        let mut bound = layer.endpoint().bind(5353);
        tokio::spawn(layer.run());

        let other_port = Datagram {
            src_port: 1000,
            dest_port: 9,
            payload: b"nobody".to_vec(),
        };
        let wanted = Datagram {
            src_port: 1000,
            dest_port: 5353,
            payload: b"hello".to_vec(),
        };
        let mut corrupt = packet(&wanted);
        corrupt.payload[8] ^= 0xff;

        for p in [packet(&other_port), corrupt, packet(&wanted)] {
            assert!(upper.dispatch(NextHeader::Udp, p).await);
        }

        assert_eq!(
            bound.recv().await.unwrap(),
            Received {
                src: SRC,
                src_port: 1000,
                dest: DEST,
                payload: b"hello".to_vec(),
            }
        );
        assert!(bound.try_recv().is_err());
    }
}
