//! Wires the protocol actors of one node onto a link.

use crate::arp::ArpResponder;
use crate::interface::Interface;
use crate::ipv6::Ipv6Node;
use crate::status::StatusBoard;
use crate::udp::{UdpEndpoint, UdpLayer};
use fakenet_core::error::{FakenetError, FakenetResult};
use fakenet_core::NodeConfig;
use fakenet_link::FrameLink;
use std::sync::Arc;
use tokio::task::JoinSet;

pub struct Node;

impl Node {
    /// Spawns every actor of the node. Must be called inside a tokio runtime.
    pub fn start(
        config: NodeConfig,
        link: Arc<dyn FrameLink>,
        status: StatusBoard,
    ) -> FakenetResult<NodeHandle> {
        let interface = Interface::new(link, config.ether_address);
        tracing::info!(
            interface = interface.name(),
            mac = %config.ether_address,
            "starting node"
        );

        let mut tasks = JoinSet::new();

        if let Some(address) = config.ipv4_address {
            let arp = ArpResponder::new(&interface, vec![address], &status)?;
            tasks.spawn(arp.run());
        }

        let ipv6 = Ipv6Node::new(&interface, config.ipv6, status);
        let udp = UdpLayer::new(&ipv6.upper_layers());
        let endpoint = udp.endpoint();
        tasks.spawn(ipv6.run());
        tasks.spawn(udp.run());

        interface.run(&mut tasks);

        Ok(NodeHandle {
            tasks,
            udp: endpoint,
        })
    }
}

/// Owns the running actors. Dropping it aborts them.
pub struct NodeHandle {
    tasks: JoinSet<FakenetResult<()>>,
    udp: UdpEndpoint,
}

impl NodeHandle {
    pub fn udp(&self) -> &UdpEndpoint {
        &self.udp
    }

    /// Resolves when the first actor exits, with that actor's result.
    pub async fn wait(&mut self) -> FakenetResult<()> {
        match self.tasks.join_next().await {
            Some(Ok(result)) => result,
            Some(Err(e)) => Err(FakenetError::Internal(format!("actor task failed: {e}"))),
            None => Ok(()),
        }
    }
}
