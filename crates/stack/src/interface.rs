//! Ethernet interface: demultiplexes received frames by EtherType and
//! serializes outgoing frames onto the link.

use crate::dispatch::{DispatchMap, CHANNEL_CAPACITY};
use fakenet_core::error::{FakenetError, FakenetResult};
use fakenet_core::wire::{hexdump, EtherType, Frame, FRAME_SIZE};
use fakenet_core::MacAddress;
use fakenet_link::FrameLink;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

pub struct Interface {
    link: Arc<dyn FrameLink>,
    mac: MacAddress,
    receivers: Arc<DispatchMap<EtherType, Frame>>,
    writer: mpsc::Sender<Frame>,
    outgoing: mpsc::Receiver<Frame>,
}

impl Interface {
    pub fn new(link: Arc<dyn FrameLink>, mac: MacAddress) -> Self {
        let (writer, outgoing) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            link,
            mac,
            receivers: Arc::new(DispatchMap::new()),
            writer,
            outgoing,
        }
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn name(&self) -> &str {
        self.link.name()
    }

    /// Frames of `ethertype` addressed to us.
    pub fn register(&self, ethertype: EtherType) -> mpsc::Receiver<Frame> {
        self.receivers.register(ethertype)
    }

    /// Queue for frames to send. The source address is not rewritten.
    pub fn writer(&self) -> mpsc::Sender<Frame> {
        self.writer.clone()
    }

    /// Spawns the receive and transmit loops.
    pub fn run(self, tasks: &mut JoinSet<FakenetResult<()>>) {
        let Interface {
            link,
            mac,
            receivers,
            writer,
            outgoing,
        } = self;
        // Our own handle must not keep the transmit loop alive.
        drop(writer);

        tasks.spawn(receive_loop(link.clone(), mac, receivers));
        tasks.spawn(transmit_loop(link, outgoing));
    }
}

/// Whether a frame sent to `dest` is meant for the interface owning `mac`.
fn accepts(mac: MacAddress, dest: MacAddress) -> bool {
    dest == mac || dest.is_broadcast() || dest.is_multicast()
}

async fn receive_loop(
    link: Arc<dyn FrameLink>,
    mac: MacAddress,
    receivers: Arc<DispatchMap<EtherType, Frame>>,
) -> FakenetResult<()> {
    let mut buf = vec![0u8; FRAME_SIZE];

    loop {
        let len = link.recv_frame(&mut buf).await?;
        let bytes = &buf[..len];

        let frame = match Frame::parse(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, len, "dropping malformed frame");
                tracing::trace!("\n{}", hexdump(bytes));
                continue;
            }
        };

        if !accepts(mac, frame.dest) {
            tracing::trace!(%frame, "not addressed to us");
            continue;
        }

        tracing::trace!(%frame, "received");
        let ethertype = frame.ethertype;
        if !receivers.dispatch(ethertype, frame).await {
            tracing::trace!("\n{}", hexdump(bytes));
        }
    }
}

async fn transmit_loop(
    link: Arc<dyn FrameLink>,
    mut outgoing: mpsc::Receiver<Frame>,
) -> FakenetResult<()> {
    while let Some(frame) = outgoing.recv().await {
        tracing::trace!(%frame, "sending");
        link.send_frame(&frame.encode()).await?;
    }

    Err(FakenetError::Channel(format!(
        "{}: all frame writers dropped",
        link.name()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakenet_link::MemoryLink;

    const OURS: MacAddress = MacAddress([2, 0, 0, 0, 0, 1]);
    const THEIRS: MacAddress = MacAddress([2, 0, 0, 0, 0, 2]);

    fn frame_to(dest: MacAddress, ethertype: EtherType) -> Frame {
        Frame {
            dest,
            src: THEIRS,
            ethertype,
            payload: vec![0xab; 46],
        }
    }

    #[test]
    fn destination_filter() {
        assert!(accepts(OURS, OURS));
        assert!(accepts(OURS, MacAddress::BROADCAST));
        assert!(accepts(OURS, MacAddress([0x33, 0x33, 0, 0, 0, 1])));
        assert!(!accepts(OURS, THEIRS));
    }

    #[tokio::test]
    async fn frames_are_dispatched_by_ethertype() {
        let (link, mut peer) = MemoryLink::pair("mem0");
        let interface = Interface::new(Arc::new(link), OURS);
        let mut arp = interface.register(EtherType::Arp);
        let mut ipv6 = interface.register(EtherType::Ipv6);
        let writer = interface.writer();

        let mut tasks = JoinSet::new();
        interface.run(&mut tasks);

        peer.inject(frame_to(THEIRS, EtherType::Arp).encode()).await.unwrap();
        peer.inject(frame_to(OURS, EtherType::Ipv6).encode()).await.unwrap();
        peer.inject(frame_to(OURS, EtherType::Unknown(0x88cc)).encode())
            .await
            .unwrap();
        peer.inject(frame_to(MacAddress::BROADCAST, EtherType::Arp).encode())
            .await
            .unwrap();

        assert_eq!(ipv6.recv().await.unwrap().dest, OURS);
        assert_eq!(arp.recv().await.unwrap().dest, MacAddress::BROADCAST);

        let reply = Frame {
            dest: THEIRS,
            src: OURS,
            ethertype: EtherType::Arp,
            payload: vec![1, 2, 3],
        };
        writer.send(reply.clone()).await.unwrap();
        assert_eq!(peer.next_frame().await, Some(reply.encode()));
    }
}
