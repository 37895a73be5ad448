//! IPv6 host: stateless address autoconfiguration (RFC 4862), the parts of
//! Neighbor Discovery (RFC 4861) a host needs without a neighbor cache, and
//! MLDv2 listener reports (RFC 3810).
//!
//! One actor owns the address table, the joined multicast groups and all
//! protocol timers. Packets for other next headers are handed on through
//! [`Ipv6Node::upper_layers`].

mod address;

pub use address::INFINITE_LIFETIME;

use crate::dispatch::DispatchMap;
use crate::interface::Interface;
use crate::status::StatusBoard;
use address::{lifetime_deadline, timer_deadline, two_hour_rule, InterfaceAddress};
use fakenet_core::addr::{
    interface_id_eui64, interface_id_random, ALL_MLDV2_ROUTERS, ALL_NODES, ALL_ROUTERS,
    LINK_LOCAL_PREFIX,
};
use fakenet_core::error::{FakenetError, FakenetResult};
use fakenet_core::wire::icmpv6::{
    find_option, Echo, Message, MldRecord, MldRecordType, NdOption, PrefixInformation,
    RouterAdvertisement,
};
use fakenet_core::wire::ipv6::{
    ExtensionHeader, HopByHopOption, NextHeader, Packet, RouterAlertType, DEFAULT_HOP_LIMIT,
};
use fakenet_core::wire::{EtherType, Frame};
use fakenet_core::{
    AddressOrigin, AddressState, InterfaceIdMode, Ipv6AddrExt, Ipv6Config, MacAddress,
};
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::time::DelayQueue;

/// Hop limit required on every Neighbor Discovery message.
const ND_HOP_LIMIT: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Dad(Ipv6Addr),
    Lifetime(Ipv6Addr),
    RouterSolicitation,
}

pub struct Ipv6Node {
    mac: MacAddress,
    config: Ipv6Config,
    interface_id: Ipv6Addr,
    incoming: mpsc::Receiver<Frame>,
    outgoing: mpsc::Sender<Frame>,
    upper: Arc<DispatchMap<NextHeader, Packet>>,
    status: StatusBoard,
    addresses: Vec<InterfaceAddress>,
    groups: BTreeSet<Ipv6Addr>,
    timers: DelayQueue<Timer>,
    rng: StdRng,
    router_found: bool,
    solicitations_sent: u8,
    disabled: bool,
}

impl Ipv6Node {
    pub fn new(interface: &Interface, config: Ipv6Config, status: StatusBoard) -> Self {
        let mut rng = StdRng::from_entropy();
        let interface_id = match config.interface_id {
            InterfaceIdMode::Random => interface_id_random(&mut rng),
            InterfaceIdMode::Eui64 => interface_id_eui64(&interface.mac()),
        };

        Self {
            mac: interface.mac(),
            config,
            interface_id,
            incoming: interface.register(EtherType::Ipv6),
            outgoing: interface.writer(),
            upper: Arc::new(DispatchMap::new()),
            status,
            addresses: Vec::new(),
            groups: BTreeSet::new(),
            timers: DelayQueue::new(),
            rng,
            router_found: false,
            solicitations_sent: 0,
            disabled: false,
        }
    }

    /// Where packets for non-ICMPv6 next headers are delivered.
    pub fn upper_layers(&self) -> Arc<DispatchMap<NextHeader, Packet>> {
        self.upper.clone()
    }

    pub async fn run(mut self) -> FakenetResult<()> {
        self.start()?;

        loop {
            tokio::select! {
                Some(expired) = self.timers.next(), if !self.timers.is_empty() => {
                    self.on_timer(expired.into_inner()).await?;
                }
                frame = self.incoming.recv() => match frame {
                    Some(frame) => self.on_frame(frame).await?,
                    None => return Ok(()),
                },
            }
        }
    }

    fn start(&mut self) -> FakenetResult<()> {
        let link_local = self.interface_id.combine_subnet(&LINK_LOCAL_PREFIX)?;
        let entry = InterfaceAddress::new(
            link_local,
            AddressOrigin::LinkLocal,
            self.config.dup_addr_detect_transmits,
        );
        self.addresses.push(entry);
        self.publish(link_local)?;

        let delay = self.random_delay(self.config.max_rtr_solicitation_delay());
        tracing::info!(address = %link_local, delay_ms = delay.as_millis() as u64, "starting autoconfiguration");
        self.timers.insert(Timer::Dad(link_local), delay);
        Ok(())
    }

    fn random_delay(&mut self, max: Duration) -> Duration {
        if max.is_zero() {
            Duration::ZERO
        } else {
            self.rng.gen_range(Duration::ZERO..max)
        }
    }

    // -----------------------------------------------------------------------
    // Address table
    // -----------------------------------------------------------------------

    fn entry(&self, address: &Ipv6Addr) -> Option<&InterfaceAddress> {
        self.addresses.iter().find(|a| a.address == *address)
    }

    fn entry_mut(&mut self, address: &Ipv6Addr) -> Option<&mut InterfaceAddress> {
        self.addresses.iter_mut().find(|a| a.address == *address)
    }

    /// The usable link-local address, if DAD has finished for it.
    fn link_local(&self) -> Option<Ipv6Addr> {
        self.addresses
            .iter()
            .find(|a| a.origin == AddressOrigin::LinkLocal && a.state.is_assigned())
            .map(|a| a.address)
    }

    fn accepts(&self, dest: &Ipv6Addr) -> bool {
        self.groups.contains(dest)
            || self
                .entry(dest)
                .is_some_and(|entry| entry.state.is_assigned())
    }

    fn set_state(&mut self, address: Ipv6Addr, state: AddressState) -> FakenetResult<()> {
        if let Some(entry) = self.entry_mut(&address) {
            entry.state = state;
            tracing::info!(%address, %state, "address state changed");
        }
        self.publish(address)
    }

    fn publish(&self, address: Ipv6Addr) -> FakenetResult<()> {
        let update = self.status.update().child("interface").child("addresses");
        match self.entry(&address) {
            Some(entry) => update.field(address.to_string(), entry.status()).write(),
            None => update.remove(address.to_string()).write(),
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    async fn on_timer(&mut self, timer: Timer) -> FakenetResult<()> {
        if self.disabled {
            return Ok(());
        }

        match timer {
            Timer::Dad(address) => self.on_dad_timer(address).await,
            Timer::Lifetime(address) => self.on_lifetime_timer(address).await,
            Timer::RouterSolicitation => self.on_solicitation_timer().await,
        }
    }

    async fn on_dad_timer(&mut self, address: Ipv6Addr) -> FakenetResult<()> {
        let Some((state, transmits_remaining)) = self
            .entry(&address)
            .map(|entry| (entry.state, entry.dad_transmits_remaining))
        else {
            return Ok(());
        };

        match state {
            AddressState::New => {
                let new_groups: Vec<Ipv6Addr> = [ALL_NODES, address.solicited_node_multicast()]
                    .into_iter()
                    .filter(|group| !self.groups.contains(group))
                    .collect();
                self.groups.extend(new_groups.iter().copied());
                self.send_mld_report(MldRecordType::ChangeToExclude, &new_groups)
                    .await?;

                if self.config.dup_addr_detect_transmits == 0 {
                    return self.on_address_valid(address);
                }

                self.send_dad_solicitation(address).await?;
                self.set_state(address, AddressState::Tentative)
            }
            AddressState::Tentative if transmits_remaining > 0 => {
                self.send_dad_solicitation(address).await
            }
            AddressState::Tentative => self.on_address_valid(address),
            _ => Ok(()),
        }
    }

    async fn send_dad_solicitation(&mut self, address: Ipv6Addr) -> FakenetResult<()> {
        let group = address.solicited_node_multicast();
        self.send_icmpv6(
            Ipv6Addr::UNSPECIFIED,
            group,
            group.multicast_mac(),
            Message::NeighborSolicitation {
                target: address,
                options: vec![],
            },
        )
        .await?;

        if let Some(entry) = self.entry_mut(&address) {
            entry.dad_transmits_remaining = entry.dad_transmits_remaining.saturating_sub(1);
        }
        tracing::debug!(%address, "sent duplicate address detection solicitation");
        self.timers
            .insert(Timer::Dad(address), self.config.retrans_timer());
        Ok(())
    }

    fn on_address_valid(&mut self, address: Ipv6Addr) -> FakenetResult<()> {
        self.set_state(address, AddressState::Valid)?;
        self.schedule_lifetime(address);

        let is_link_local = self
            .entry(&address)
            .is_some_and(|entry| entry.origin == AddressOrigin::LinkLocal);
        if is_link_local && self.config.max_rtr_solicitations > 0 {
            let delay = self.random_delay(self.config.max_rtr_solicitation_delay());
            self.timers.insert(Timer::RouterSolicitation, delay);
        }
        Ok(())
    }

    /// Arms, moves or cancels the one `Lifetime` timer of `address`.
    fn schedule_lifetime(&mut self, address: Ipv6Addr) {
        let Some(entry) = self.addresses.iter_mut().find(|a| a.address == address) else {
            return;
        };

        match (entry.next_deadline(), entry.lifetime_timer) {
            (Some(deadline), Some(key)) => {
                self.timers.reset_at(&key, timer_deadline(Instant::now(), deadline));
            }
            (Some(deadline), None) => {
                let when = timer_deadline(Instant::now(), deadline);
                entry.lifetime_timer = Some(self.timers.insert_at(Timer::Lifetime(address), when));
            }
            (None, Some(key)) => {
                self.timers.remove(&key);
                entry.lifetime_timer = None;
            }
            (None, None) => {}
        }
    }

    /// Fires at the next deadline of `address`, or earlier when that deadline
    /// is too far out for the queue; then re-arms.
    async fn on_lifetime_timer(&mut self, address: Ipv6Addr) -> FakenetResult<()> {
        let now = Instant::now();
        let Some(entry) = self.entry_mut(&address) else {
            return Ok(());
        };
        entry.lifetime_timer = None;
        let expired = entry.is_expired(now);
        let deprecate = entry.state == AddressState::Valid && entry.is_past_preferred(now);

        if expired {
            tracing::info!(%address, "valid lifetime expired");
            self.addresses.retain(|a| a.address != address);
            self.leave_solicited_node_group(address).await?;
            return self.publish(address);
        }

        if deprecate {
            self.set_state(address, AddressState::Deprecated)?;
        }
        self.schedule_lifetime(address);
        Ok(())
    }

    async fn on_solicitation_timer(&mut self) -> FakenetResult<()> {
        if self.router_found || self.solicitations_sent >= self.config.max_rtr_solicitations {
            return Ok(());
        }
        let Some(src) = self.link_local() else {
            return Ok(());
        };

        self.send_icmpv6(
            src,
            ALL_ROUTERS,
            ALL_ROUTERS.multicast_mac(),
            Message::RouterSolicitation {
                options: vec![NdOption::SourceLinkLayerAddress(self.mac)],
            },
        )
        .await?;
        self.solicitations_sent += 1;
        tracing::debug!(count = self.solicitations_sent, "sent router solicitation");

        if self.solicitations_sent < self.config.max_rtr_solicitations {
            self.timers.insert(
                Timer::RouterSolicitation,
                self.config.rtr_solicitation_interval(),
            );
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Receive path
    // -----------------------------------------------------------------------

    async fn on_frame(&mut self, frame: Frame) -> FakenetResult<()> {
        if self.disabled {
            tracing::trace!("ipv6 disabled, dropping packet");
            return Ok(());
        }

        let packet = match Packet::parse(&frame.payload) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!(error = %e, "dropping ipv6 packet");
                return Ok(());
            }
        };

        if !self.accepts(&packet.dest) {
            tracing::trace!(dest = %packet.dest, "not addressed to us");
            return Ok(());
        }

        if let Some(option) = packet.hop_by_hop_options().find(|o| o.action() != 0) {
            tracing::debug!(?option, "unrecognized hop-by-hop option, dropping packet");
            return Ok(());
        }

        match packet.next_header {
            NextHeader::Icmpv6 => self.on_icmpv6(frame.src, packet).await,
            next_header => {
                self.upper.dispatch(next_header, packet).await;
                Ok(())
            }
        }
    }

    async fn on_icmpv6(&mut self, frame_src: MacAddress, packet: Packet) -> FakenetResult<()> {
        let message = match Message::parse(&packet.payload, &packet.src, &packet.dest) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, src = %packet.src, "dropping icmpv6 message");
                return Ok(());
            }
        };

        match message {
            Message::NeighborSolicitation { target, options } => {
                self.on_neighbor_solicitation(frame_src, &packet, target, &options)
                    .await
            }
            Message::NeighborAdvertisement { target, .. } => {
                self.on_neighbor_advertisement(&packet, target).await
            }
            Message::EchoRequest(echo) => self.on_echo_request(frame_src, &packet, echo).await,
            Message::RouterAdvertisement(ra) => self.on_router_advertisement(&packet, ra).await,
            Message::MulticastListenerQuery { multicast_address } => {
                tracing::debug!(%multicast_address, "answering multicast listener query");
                let groups: Vec<Ipv6Addr> = self.groups.iter().copied().collect();
                self.send_mld_report(MldRecordType::ModeIsExclude, &groups)
                    .await
            }
            other => {
                tracing::debug!(message_type = %other.message_type(), src = %packet.src, "ignoring icmpv6 message");
                Ok(())
            }
        }
    }

    async fn on_neighbor_solicitation(
        &mut self,
        frame_src: MacAddress,
        packet: &Packet,
        target: Ipv6Addr,
        options: &[NdOption],
    ) -> FakenetResult<()> {
        if packet.hop_limit != ND_HOP_LIMIT {
            tracing::debug!(hop_limit = packet.hop_limit, "neighbor solicitation with bad hop limit");
            return Ok(());
        }
        let Some(state) = self.entry(&target).map(|entry| entry.state) else {
            return Ok(());
        };

        match state {
            AddressState::Tentative if packet.src.is_unspecified() => {
                tracing::warn!(address = %target, "another node is claiming our tentative address");
                self.mark_duplicate(target).await
            }
            state if state.is_assigned() => {
                let (dest, dest_mac, solicited) = if packet.src.is_unspecified() {
                    (ALL_NODES, ALL_NODES.multicast_mac(), false)
                } else {
                    let slla = find_option(options, |o| match o {
                        NdOption::SourceLinkLayerAddress(mac) => Some(*mac),
                        _ => None,
                    });
                    (packet.src, slla.unwrap_or(frame_src), true)
                };

                self.send_icmpv6(
                    target,
                    dest,
                    dest_mac,
                    Message::NeighborAdvertisement {
                        router: false,
                        solicited,
                        override_flag: true,
                        target,
                        options: vec![NdOption::TargetLinkLayerAddress(self.mac)],
                    },
                )
                .await
            }
            _ => Ok(()),
        }
    }

    async fn on_neighbor_advertisement(
        &mut self,
        packet: &Packet,
        target: Ipv6Addr,
    ) -> FakenetResult<()> {
        if packet.hop_limit != ND_HOP_LIMIT {
            return Ok(());
        }

        match self.entry(&target).map(|entry| entry.state) {
            Some(AddressState::Tentative) => {
                tracing::warn!(address = %target, "neighbor advertisement for our tentative address");
                self.mark_duplicate(target).await
            }
            Some(state) if state.is_assigned() => {
                tracing::warn!(address = %target, src = %packet.src, "another node advertises our address");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn on_echo_request(
        &mut self,
        frame_src: MacAddress,
        packet: &Packet,
        echo: Echo,
    ) -> FakenetResult<()> {
        if packet.src.is_unspecified() {
            return Ok(());
        }
        let src = if packet.dest.is_multicast() {
            match self.link_local() {
                Some(address) => address,
                None => return Ok(()),
            }
        } else {
            packet.dest
        };

        tracing::debug!(from = %packet.src, sequence = echo.sequence, "answering echo request");
        self.send_icmpv6(src, packet.src, frame_src, Message::EchoReply(echo))
            .await
    }

    async fn on_router_advertisement(
        &mut self,
        packet: &Packet,
        ra: RouterAdvertisement,
    ) -> FakenetResult<()> {
        if !packet.src.is_link_local_unicast() || packet.hop_limit != ND_HOP_LIMIT {
            tracing::debug!(src = %packet.src, hop_limit = packet.hop_limit, "invalid router advertisement");
            return Ok(());
        }

        if !self.router_found {
            tracing::info!(router = %packet.src, "found router");
            self.router_found = true;
        }

        for option in &ra.options {
            if let NdOption::PrefixInformation(info) = option {
                self.on_prefix_information(info).await?;
            }
        }
        Ok(())
    }

    async fn on_prefix_information(&mut self, info: &PrefixInformation) -> FakenetResult<()> {
        if !info.autonomous
            || info.prefix.is_link_local_unicast()
            || info.preferred_lifetime > info.valid_lifetime
        {
            tracing::debug!(prefix = %info.prefix, "prefix not usable for autoconfiguration");
            return Ok(());
        }
        if info.prefix_length != 64 {
            tracing::debug!(prefix = %info.prefix, prefix_length = info.prefix_length, "prefix length does not fit the interface identifier");
            return Ok(());
        }

        let now = Instant::now();
        let prefix = info.prefix.prefix(64);
        let existing = self
            .addresses
            .iter()
            .position(|a| a.origin == AddressOrigin::Autoconf && a.address.prefix(64) == prefix);

        match existing {
            Some(index) => {
                let entry = &mut self.addresses[index];
                if entry.state == AddressState::Duplicate {
                    return Ok(());
                }

                entry.valid_until = two_hour_rule(now, entry.valid_until, info.valid_lifetime);
                entry.preferred_until = lifetime_deadline(now, info.preferred_lifetime);
                let address = entry.address;
                let undeprecate =
                    entry.state == AddressState::Deprecated && !entry.is_past_preferred(now);
                let assigned = entry.state.is_assigned();

                if undeprecate {
                    self.set_state(address, AddressState::Valid)?;
                }
                if assigned {
                    self.schedule_lifetime(address);
                }
                Ok(())
            }
            None if info.valid_lifetime > 0 => {
                let address = match self.interface_id.combine_subnet(&prefix) {
                    Ok(address) => address,
                    Err(e) => {
                        tracing::debug!(error = %e, "cannot form address from prefix");
                        return Ok(());
                    }
                };

                let mut entry = InterfaceAddress::new(
                    address,
                    AddressOrigin::Autoconf,
                    self.config.dup_addr_detect_transmits,
                );
                entry.valid_until = lifetime_deadline(now, info.valid_lifetime);
                entry.preferred_until = lifetime_deadline(now, info.preferred_lifetime);
                self.addresses.push(entry);

                tracing::info!(%address, "forming address from advertised prefix");
                self.publish(address)?;
                self.timers.insert(Timer::Dad(address), Duration::ZERO);
                Ok(())
            }
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Duplicates and group membership
    // -----------------------------------------------------------------------

    async fn mark_duplicate(&mut self, address: Ipv6Addr) -> FakenetResult<()> {
        self.set_state(address, AddressState::Duplicate)?;
        self.leave_solicited_node_group(address).await?;

        let is_link_local = self
            .entry(&address)
            .is_some_and(|entry| entry.origin == AddressOrigin::LinkLocal);
        if is_link_local {
            tracing::error!(%address, "link-local address is a duplicate, disabling ipv6");
            self.disabled = true;
            self.timers.clear();
            for entry in &mut self.addresses {
                entry.lifetime_timer = None;
            }
        }
        Ok(())
    }

    /// Leaves the solicited-node group of `address` unless another live address shares it.
    async fn leave_solicited_node_group(&mut self, address: Ipv6Addr) -> FakenetResult<()> {
        let group = address.solicited_node_multicast();
        let still_needed = self.addresses.iter().any(|a| {
            a.address != address
                && a.state != AddressState::Duplicate
                && a.address.solicited_node_multicast() == group
        });

        if !still_needed && self.groups.remove(&group) {
            self.send_mld_report(MldRecordType::ChangeToInclude, &[group])
                .await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transmit path
    // -----------------------------------------------------------------------

    async fn send_mld_report(
        &mut self,
        record_type: MldRecordType,
        groups: &[Ipv6Addr],
    ) -> FakenetResult<()> {
        if groups.is_empty() {
            return Ok(());
        }

        let records = groups
            .iter()
            .map(|group| MldRecord {
                record_type,
                multicast_address: *group,
                sources: vec![],
            })
            .collect();
        let src = self.link_local().unwrap_or(Ipv6Addr::UNSPECIFIED);

        self.send_icmpv6(
            src,
            ALL_MLDV2_ROUTERS,
            ALL_MLDV2_ROUTERS.multicast_mac(),
            Message::MldV2Report(records),
        )
        .await
    }

    async fn send_icmpv6(
        &mut self,
        src: Ipv6Addr,
        dest: Ipv6Addr,
        dest_mac: MacAddress,
        message: Message,
    ) -> FakenetResult<()> {
        let is_mld = matches!(message, Message::MldV2Report(_));
        let hop_limit = match message {
            Message::MldV2Report(_) => 1,
            Message::RouterSolicitation { .. }
            | Message::RouterAdvertisement(_)
            | Message::NeighborSolicitation { .. }
            | Message::NeighborAdvertisement { .. } => ND_HOP_LIMIT,
            _ => DEFAULT_HOP_LIMIT,
        };

        let mut packet = Packet::new(src, dest, NextHeader::Icmpv6, message.encode(&src, &dest))
            .with_hop_limit(hop_limit);
        if is_mld {
            packet = packet.with_extension_header(ExtensionHeader::HopByHopOptions(vec![
                HopByHopOption::RouterAlert(RouterAlertType::Mld),
            ]));
        }

        tracing::trace!(%src, %dest, message_type = %message.message_type(), "sending icmpv6");
        self.outgoing
            .send(Frame {
                dest: dest_mac,
                src: self.mac,
                ethertype: EtherType::Ipv6,
                payload: packet.encode(),
            })
            .await
            .map_err(|_| FakenetError::Channel("interface writer closed".into()))
    }
}
