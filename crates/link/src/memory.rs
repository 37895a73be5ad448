//! In-process link: the node on one end, a test (or another program) on the
//! other.

use crate::FrameLink;
use async_trait::async_trait;
use fakenet_core::error::{FakenetError, FakenetResult};
use tokio::sync::{mpsc, Mutex};

const CHANNEL_CAPACITY: usize = 1024;

/// Node side of an in-memory link.
pub struct MemoryLink {
    name: String,
    inbound: Mutex<mpsc::Receiver<Vec<u8>>>,
    outbound: mpsc::Sender<Vec<u8>>,
}

/// Far side of a [`MemoryLink`]: injects frames and observes what the node sends.
pub struct MemoryPeer {
    to_node: mpsc::Sender<Vec<u8>>,
    from_node: mpsc::Receiver<Vec<u8>>,
}

impl MemoryLink {
    pub fn pair(name: impl Into<String>) -> (MemoryLink, MemoryPeer) {
        let (to_node, inbound) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound, from_node) = mpsc::channel(CHANNEL_CAPACITY);

        (
            MemoryLink {
                name: name.into(),
                inbound: Mutex::new(inbound),
                outbound,
            },
            MemoryPeer { to_node, from_node },
        )
    }
}

#[async_trait]
impl FrameLink for MemoryLink {
    /// Frames longer than `buf` are truncated, as a short read on a TAP fd is.
    async fn recv_frame(&self, buf: &mut [u8]) -> FakenetResult<usize> {
        let frame = self
            .inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| FakenetError::Channel(format!("{}: peer closed", self.name)))?;

        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(len)
    }

    async fn send_frame(&self, frame: &[u8]) -> FakenetResult<()> {
        self.outbound
            .send(frame.to_vec())
            .await
            .map_err(|_| FakenetError::Channel(format!("{}: peer closed", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl MemoryPeer {
    pub async fn inject(&self, frame: impl Into<Vec<u8>>) -> FakenetResult<()> {
        self.to_node
            .send(frame.into())
            .await
            .map_err(|_| FakenetError::Channel("memory link closed".into()))
    }

    /// Next frame sent by the node, or `None` once the node side is gone.
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.from_node.recv().await
    }

    pub fn try_next_frame(&mut self) -> Option<Vec<u8>> {
        self.from_node.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_cross_in_both_directions() {
        let (link, mut peer) = MemoryLink::pair("mem0");

        peer.inject(vec![1, 2, 3]).await.unwrap();
        let mut buf = [0u8; 16];
        let len = link.recv_frame(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);

        link.send_frame(&[4, 5]).await.unwrap();
        assert_eq!(peer.next_frame().await, Some(vec![4, 5]));
        assert_eq!(peer.try_next_frame(), None);
        assert_eq!(link.name(), "mem0");
    }

    #[tokio::test]
    async fn long_frames_are_truncated() {
        let (link, peer) = MemoryLink::pair("mem0");
        peer.inject(vec![7u8; 32]).await.unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(link.recv_frame(&mut buf).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn dropped_peer_closes_the_link() {
        let (link, peer) = MemoryLink::pair("mem0");
        drop(peer);

        let mut buf = [0u8; 8];
        assert!(matches!(
            link.recv_frame(&mut buf).await,
            Err(FakenetError::Channel(_))
        ));
        assert!(link.send_frame(&[1]).await.is_err());
    }
}
