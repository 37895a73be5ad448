//! Answers ARP requests for the node's IPv4 addresses.

use crate::interface::Interface;
use crate::status::StatusBoard;
use fakenet_core::error::{FakenetError, FakenetResult};
use fakenet_core::wire::arp::{Opcode, Packet};
use fakenet_core::wire::{EtherType, Frame};
use fakenet_core::MacAddress;
use std::net::Ipv4Addr;
use tokio::sync::mpsc;

pub struct ArpResponder {
    mac: MacAddress,
    addresses: Vec<Ipv4Addr>,
    incoming: mpsc::Receiver<Frame>,
    outgoing: mpsc::Sender<Frame>,
}

impl ArpResponder {
    /// Registers for ARP frames and publishes `addresses` in the status.
    pub fn new(
        interface: &Interface,
        addresses: Vec<Ipv4Addr>,
        status: &StatusBoard,
    ) -> FakenetResult<Self> {
        status
            .update()
            .child("interface")
            .field("ipv4_addresses", &addresses)
            .write()?;

        Ok(Self {
            mac: interface.mac(),
            addresses,
            incoming: interface.register(EtherType::Arp),
            outgoing: interface.writer(),
        })
    }

    pub async fn run(mut self) -> FakenetResult<()> {
        while let Some(frame) = self.incoming.recv().await {
            let packet = match Packet::parse(&frame.payload) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::debug!(error = %e, "dropping arp packet");
                    continue;
                }
            };

            if let Some(reply) = self.reply_to(&packet) {
                tracing::debug!(ip = %packet.dest_ip, to = %packet.src_mac, "answering arp request");
                self.outgoing
                    .send(reply)
                    .await
                    .map_err(|_| FakenetError::Channel("interface writer closed".into()))?;
            }
        }

        Ok(())
    }

    fn reply_to(&self, request: &Packet) -> Option<Frame> {
        if request.opcode != Opcode::Request || !self.addresses.contains(&request.dest_ip) {
            return None;
        }

        Some(Frame {
            dest: request.src_mac,
            src: self.mac,
            ethertype: EtherType::Arp,
            payload: Packet {
                opcode: Opcode::Reply,
                src_mac: self.mac,
                src_ip: request.dest_ip,
                dest_mac: request.src_mac,
                dest_ip: request.src_ip,
            }
            .encode(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakenet_link::MemoryLink;
    use std::sync::Arc;

    const OURS: MacAddress = MacAddress([2, 0, 0, 0, 0, 1]);
    const REQUESTER: MacAddress = MacAddress([0, 10, 245, 109, 188, 132]);

    fn responder() -> ArpResponder {
        let (link, _peer) = MemoryLink::pair("mem0");
        let interface = Interface::new(Arc::new(link), OURS);
        ArpResponder::new(
            &interface,
            vec![Ipv4Addr::new(10, 0, 0, 2)],
            &StatusBoard::detached(),
        )
        .unwrap()
    }

    fn request_for(ip: Ipv4Addr) -> Packet {
        Packet {
            opcode: Opcode::Request,
            src_mac: REQUESTER,
            src_ip: Ipv4Addr::new(10, 0, 1, 235),
            dest_mac: MacAddress::default(),
            dest_ip: ip,
        }
    }

    #[test]
    fn request_for_our_address_gets_a_reply() {
        let reply = responder()
            .reply_to(&request_for(Ipv4Addr::new(10, 0, 0, 2)))
            .unwrap();

        assert_eq!(reply.dest, REQUESTER);
        assert_eq!(reply.src, OURS);
        assert_eq!(
            Packet::parse(&reply.payload).unwrap(),
            Packet {
                opcode: Opcode::Reply,
                src_mac: OURS,
                src_ip: Ipv4Addr::new(10, 0, 0, 2),
                dest_mac: REQUESTER,
                dest_ip: Ipv4Addr::new(10, 0, 1, 235),
            }
        );
    }

    #[test]
    fn other_addresses_and_replies_are_ignored() {
        let responder = responder();
        assert!(responder
            .reply_to(&request_for(Ipv4Addr::new(10, 0, 0, 3)))
            .is_none());

        let mut reply = request_for(Ipv4Addr::new(10, 0, 0, 2));
        reply.opcode = Opcode::Reply;
        assert!(responder.reply_to(&reply).is_none());
    }

    #[test]
    fn addresses_are_published() {
        let (link, _peer) = MemoryLink::pair("mem0");
        let interface = Interface::new(Arc::new(link), OURS);
        let status = StatusBoard::detached();
        let _responder =
            ArpResponder::new(&interface, vec![Ipv4Addr::new(10, 0, 0, 2)], &status).unwrap();

        assert_eq!(
            status.snapshot()["interface"]["ipv4_addresses"],
            serde_json::json!(["10.0.0.2"])
        );
    }
}
