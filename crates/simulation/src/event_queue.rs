//! Event queue with deterministic ordering.

use skycast_core::{Event, EventPriority, TimerId, TimerScheduler};
use skycast_types::NodeId;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

/// Position of an event in the queue.
///
/// At one instant a refresh (a timer) must finish before any packet is
/// arbitrated against the tables it rebuilds, and arrivals must be handled
/// before sources emit into the new epoch. Within one priority, refresh and
/// unbind timers (no node) run first, then nodes in ascending id, then
/// scheduling order.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    /// Node handling the event; `None` for refresh and unbind timers.
    pub node: Option<NodeId>,
    /// Scheduling order, so copies sent over one link arrive in order.
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, event: &Event, node: Option<NodeId>, sequence: u64) -> Self {
        Self {
            time,
            priority: event.priority(),
            node,
            sequence,
        }
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| self.node.cmp(&other.node))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending events plus the current simulation time.
///
/// Timers requested through [`TimerScheduler`] become network-wide events
/// relative to [`EventQueue::now`].
#[derive(Debug, Default)]
pub struct EventQueue {
    events: BTreeMap<EventKey, Event>,
    sequence: u64,
    now: Duration,
    timers_set: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of timers requested so far.
    pub fn timers_set(&self) -> u64 {
        self.timers_set
    }

    /// Schedule an event.
    pub fn schedule(&mut self, node: Option<NodeId>, time: Duration, event: Event) -> EventKey {
        self.sequence += 1;
        let key = EventKey::new(time, &event, node, self.sequence);
        self.events.insert(key, event);
        key
    }

    /// Pop the next event due at or before `end_time`, advancing the clock to it.
    pub fn pop_until(&mut self, end_time: Duration) -> Option<(EventKey, Event)> {
        let (&key, _) = self.events.first_key_value()?;
        if key.time > end_time {
            return None;
        }
        let (key, event) = self.events.pop_first()?;
        self.now = key.time;
        Some((key, event))
    }

    /// Move the clock forward to `time` if it lies in the future.
    pub fn advance_to(&mut self, time: Duration) {
        if self.now < time {
            self.now = time;
        }
    }
}

impl TimerScheduler for EventQueue {
    fn set_timer(&mut self, id: TimerId, delay: Duration) {
        let event = match id {
            TimerId::Refresh { epoch_ns } => Event::RefreshTimer { epoch_ns },
            TimerId::UnbindLink(binding) => Event::UnbindLinkTimer { binding },
        };
        self.timers_set += 1;
        let time = self.now + delay;
        self.schedule(None, time, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use skycast_core::Packet;
    use skycast_types::{GroupAddress, Origin, RequestId, ROUTE_GROUP_BASE};

    fn arrival(request: u64, seq: u8) -> Event {
        Event::PacketReceived {
            packet: Packet {
                request: RequestId(request),
                source: 0,
                origin: Origin::new(0, 1),
                group: GroupAddress::for_request(ROUTE_GROUP_BASE, RequestId(request)),
                ttl: 64,
                header: Bytes::from(vec![seq]),
            },
            interface: 1,
        }
    }

    fn burst(request: u64) -> Event {
        Event::BurstTick {
            request: RequestId(request),
        }
    }

    fn drain(queue: &mut EventQueue, until: Duration) -> Vec<(Option<NodeId>, &'static str)> {
        std::iter::from_fn(|| queue.pop_until(until))
            .map(|(key, event)| (key.node, event.type_name()))
            .collect()
    }

    #[test]
    fn test_earlier_arrival_pops_first() {
        let mut queue = EventQueue::new();
        queue.schedule(Some(0), Duration::from_millis(2), arrival(0, 0));
        queue.schedule(Some(5), Duration::from_millis(1), arrival(0, 1));

        let (key, _) = queue.pop_until(Duration::from_millis(2)).unwrap();
        assert_eq!(key.node, Some(5));
        assert_eq!(queue.now(), Duration::from_millis(1));
    }

    #[test]
    fn test_refresh_precedes_arrivals_and_bursts_at_epoch_start() {
        let mut queue = EventQueue::new();
        let epoch = Duration::from_millis(100);
        queue.schedule(Some(3), epoch, burst(0));
        queue.schedule(Some(1), epoch, arrival(0, 0));
        queue.schedule(None, epoch, Event::RefreshTimer { epoch_ns: 100_000_000 });

        assert_eq!(
            drain(&mut queue, epoch),
            vec![
                (None, "RefreshTimer"),
                (Some(1), "PacketReceived"),
                (Some(3), "BurstTick"),
            ]
        );
    }

    #[test]
    fn test_simultaneous_arrivals_by_node_then_send_order() {
        let mut queue = EventQueue::new();
        let at = Duration::from_millis(7);
        queue.schedule(Some(2), at, arrival(0, 0));
        queue.schedule(Some(1), at, arrival(1, 0));
        queue.schedule(Some(2), at, arrival(0, 1));

        let order: Vec<_> = std::iter::from_fn(|| queue.pop_until(at))
            .map(|(key, event)| match event {
                Event::PacketReceived { packet, .. } => (key.node, packet.header[0]),
                other => panic!("unexpected {}", other.type_name()),
            })
            .collect();
        assert_eq!(order, vec![(Some(1), 0), (Some(2), 0), (Some(2), 1)]);
    }

    #[test]
    fn test_events_after_horizon_stay_queued() {
        let mut queue = EventQueue::new();
        queue.schedule(Some(0), Duration::from_millis(10), burst(4));
        assert!(queue.pop_until(Duration::from_millis(9)).is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.now(), Duration::ZERO);
    }

    #[test]
    fn test_timers_are_relative_to_now() {
        let mut queue = EventQueue::new();
        queue.advance_to(Duration::from_millis(100));
        queue.set_timer(
            TimerId::Refresh {
                epoch_ns: 200_000_000,
            },
            Duration::from_millis(100),
        );
        assert_eq!(queue.timers_set(), 1);
        assert!(queue.pop_until(Duration::from_millis(199)).is_none());
        let (key, event) = queue.pop_until(Duration::from_millis(200)).unwrap();
        assert_eq!(key.time, Duration::from_millis(200));
        assert_eq!(key.node, None);
        assert!(matches!(
            event,
            Event::RefreshTimer {
                epoch_ns: 200_000_000
            }
        ));
    }
}
