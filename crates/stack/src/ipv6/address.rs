//! Per-address bookkeeping and RFC 4862 lifetime arithmetic.

use fakenet_core::{AddressOrigin, AddressState, AddressStatus};
use std::net::Ipv6Addr;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::time::delay_queue;

/// Lifetime value meaning "forever" in Prefix Information options.
pub const INFINITE_LIFETIME: u32 = u32::MAX;

const TWO_HOURS: Duration = Duration::from_secs(2 * 60 * 60);

/// Longest delay handed to the timer queue, which rejects deadlines more than
/// about two years out. Later deadlines are reached by re-arming.
pub(crate) const MAX_TIMER_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub(crate) struct InterfaceAddress {
    pub address: Ipv6Addr,
    pub prefix_length: u8,
    pub origin: AddressOrigin,
    pub state: AddressState,
    pub dad_transmits_remaining: u8,
    /// `None` is infinite.
    pub preferred_until: Option<Instant>,
    pub valid_until: Option<Instant>,
    /// Pending `Lifetime` timer, if armed.
    pub lifetime_timer: Option<delay_queue::Key>,
}

impl InterfaceAddress {
    pub fn new(address: Ipv6Addr, origin: AddressOrigin, dad_transmits: u8) -> Self {
        Self {
            address,
            prefix_length: 64,
            origin,
            state: AddressState::New,
            dad_transmits_remaining: dad_transmits,
            preferred_until: None,
            valid_until: None,
            lifetime_timer: None,
        }
    }

    pub fn status(&self) -> AddressStatus {
        AddressStatus {
            state: self.state,
            origin: self.origin,
            prefix_length: self.prefix_length,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.valid_until.is_some_and(|until| until <= now)
    }

    pub fn is_past_preferred(&self, now: Instant) -> bool {
        self.preferred_until.is_some_and(|until| until <= now)
    }

    /// The next instant at which the lifetime timer must look at this address.
    pub fn next_deadline(&self) -> Option<Instant> {
        let preferred = match self.state {
            AddressState::Valid => self.preferred_until,
            _ => None,
        };
        match (preferred, self.valid_until) {
            (Some(p), Some(v)) => Some(p.min(v)),
            (p, v) => p.or(v),
        }
    }
}

/// Converts an advertised lifetime in seconds into a deadline.
pub(crate) fn lifetime_deadline(now: Instant, seconds: u32) -> Option<Instant> {
    (seconds != INFINITE_LIFETIME).then(|| now + Duration::from_secs(u64::from(seconds)))
}

/// When the timer queue should next wake up for `deadline`.
pub(crate) fn timer_deadline(now: Instant, deadline: Instant) -> Instant {
    deadline.min(now + MAX_TIMER_DELAY)
}

/// New valid deadline for an existing address (RFC 4862 §5.5.3 e).
///
/// Stops an unauthenticated advertisement from cutting a long lifetime
/// below two hours.
pub(crate) fn two_hour_rule(now: Instant, current: Option<Instant>, received: u32) -> Option<Instant> {
    let received_duration =
        (received != INFINITE_LIFETIME).then(|| Duration::from_secs(u64::from(received)));
    let remaining = current.map(|until| until.saturating_duration_since(now));

    let exceeds = |a: Option<Duration>, b: Option<Duration>| match (a, b) {
        (None, Some(_)) => true,
        (Some(a), Some(b)) => a > b,
        (_, None) => false,
    };

    if exceeds(received_duration, Some(TWO_HOURS)) || exceeds(received_duration, remaining) {
        lifetime_deadline(now, received)
    } else if remaining.is_some_and(|r| r <= TWO_HOURS) {
        current
    } else {
        Some(now + TWO_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn infinite_lifetime_has_no_deadline() {
        let now = Instant::now();
        assert_eq!(lifetime_deadline(now, INFINITE_LIFETIME), None);
        assert_eq!(lifetime_deadline(now, 30), Some(now + secs(30)));
    }

    #[test]
    fn far_deadlines_are_capped() {
        let now = Instant::now();
        assert_eq!(timer_deadline(now, now + secs(60)), now + secs(60));

        let far = lifetime_deadline(now, INFINITE_LIFETIME - 1).unwrap();
        assert_eq!(timer_deadline(now, far), now + MAX_TIMER_DELAY);
    }

    #[test]
    fn long_received_lifetime_is_taken() {
        let now = Instant::now();
        assert_eq!(
            two_hour_rule(now, Some(now + secs(60)), 3 * 3600),
            Some(now + secs(3 * 3600))
        );
    }

    #[test]
    fn lifetime_longer_than_remaining_is_taken() {
        let now = Instant::now();
        assert_eq!(
            two_hour_rule(now, Some(now + secs(60)), 600),
            Some(now + secs(600))
        );
    }

    #[test]
    fn short_remaining_lifetime_is_kept() {
        let now = Instant::now();
        let current = Some(now + secs(3600));
        assert_eq!(two_hour_rule(now, current, 10), current);
    }

    #[test]
    fn long_remaining_lifetime_is_cut_to_two_hours() {
        let now = Instant::now();
        assert_eq!(
            two_hour_rule(now, Some(now + secs(5 * 3600)), 10),
            Some(now + TWO_HOURS)
        );
        assert_eq!(two_hour_rule(now, None, 10), Some(now + TWO_HOURS));
    }

    #[test]
    fn infinite_received_lifetime_wins() {
        let now = Instant::now();
        assert_eq!(two_hour_rule(now, Some(now + secs(60)), INFINITE_LIFETIME), None);
    }

    #[test]
    fn next_deadline_ignores_preferred_once_deprecated() {
        let now = Instant::now();
        let mut entry = InterfaceAddress::new(
            "2001:db8::1".parse().unwrap(),
            AddressOrigin::Autoconf,
            1,
        );
        entry.preferred_until = Some(now + secs(10));
        entry.valid_until = Some(now + secs(20));

        entry.state = AddressState::Valid;
        assert_eq!(entry.next_deadline(), Some(now + secs(10)));

        entry.state = AddressState::Deprecated;
        assert_eq!(entry.next_deadline(), Some(now + secs(20)));
    }
}
