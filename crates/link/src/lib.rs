//! Frame link abstraction: where Ethernet frames come from and go to.

pub mod memory;
#[cfg(target_os = "linux")]
pub mod tap;

use async_trait::async_trait;
use fakenet_core::error::FakenetResult;

pub use memory::{MemoryLink, MemoryPeer};
#[cfg(target_os = "linux")]
pub use tap::TapDevice;

/// A point-to-point carrier of whole Ethernet frames.
#[async_trait]
pub trait FrameLink: Send + Sync {
    /// Receives one frame into `buf`, returning its length.
    async fn recv_frame(&self, buf: &mut [u8]) -> FakenetResult<usize>;
    async fn send_frame(&self, frame: &[u8]) -> FakenetResult<()>;
    fn name(&self) -> &str;
}
