//! Link-layer bindings on shared satellite/ground channels.
//!
//! A ground station's uplink and a satellite's downlink are shared channels:
//! one interface faces many peers. A multicast frame sent on such an
//! interface only reaches the peers bound to its group. Bindings carry the
//! refresh generation that last needed them; a binding not renewed by the
//! current generation is stale and is removed once its grace period ends,
//! so packets already in flight on the old tree still arrive.

use skycast_types::{GroupAddress, InterfaceIndex, LinkBinding, NodeId};
use std::collections::BTreeMap;
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct LinkBindingTable {
    bindings: BTreeMap<LinkBinding, u64>,
    generation: u64,
}

impl LinkBindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn contains(&self, binding: &LinkBinding) -> bool {
        self.bindings.contains_key(binding)
    }

    /// Start a new generation. Returns its number.
    pub fn begin_epoch(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Bind (or renew) `binding` for the current generation. Returns `true`
    /// if the binding did not exist yet.
    pub fn bind(&mut self, binding: LinkBinding) -> bool {
        let created = self.bindings.insert(binding, self.generation).is_none();
        if created {
            trace!(?binding, generation = self.generation, "Bound link");
        }
        created
    }

    /// Bindings that became stale with the current generation: last needed
    /// by the previous one and not renewed since.
    pub fn newly_stale(&self) -> Vec<LinkBinding> {
        let previous = self.generation.saturating_sub(1);
        self.bindings
            .iter()
            .filter(|(_, &generation)| generation == previous && previous < self.generation)
            .map(|(&binding, _)| binding)
            .collect()
    }

    /// Remove `binding` unless the current generation renewed it.
    pub fn unbind_if_stale(&mut self, binding: &LinkBinding) -> bool {
        match self.bindings.get(binding) {
            Some(&generation) if generation < self.generation => {
                self.bindings.remove(binding);
                debug!(?binding, "Removed stale link binding");
                true
            }
            _ => false,
        }
    }

    /// Peers that receive `group` frames sent by `node` on `interface`, with
    /// the interface each receives on.
    pub fn receivers(
        &self,
        group: GroupAddress,
        node: NodeId,
        interface: InterfaceIndex,
    ) -> Vec<(NodeId, InterfaceIndex)> {
        let from = LinkBinding {
            group,
            from_node: node,
            from_interface: interface,
            to_node: NodeId::MIN,
            to_interface: InterfaceIndex::MIN,
        };
        let to = LinkBinding {
            to_node: NodeId::MAX,
            to_interface: InterfaceIndex::MAX,
            ..from
        };
        self.bindings
            .range(from..=to)
            .map(|(b, _)| (b.to_node, b.to_interface))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skycast_types::{RequestId, ROUTE_GROUP_BASE};

    fn binding(request: u64, to_node: NodeId) -> LinkBinding {
        LinkBinding {
            group: GroupAddress::for_request(ROUTE_GROUP_BASE, RequestId(request)),
            from_node: 5,
            from_interface: 1,
            to_node,
            to_interface: 1,
        }
    }

    #[test]
    fn test_receivers_filter_by_group_and_sender() {
        let mut table = LinkBindingTable::new();
        table.begin_epoch();
        table.bind(binding(0, 1));
        table.bind(binding(0, 2));
        table.bind(binding(1, 3));

        let group = GroupAddress::for_request(ROUTE_GROUP_BASE, RequestId(0));
        assert_eq!(table.receivers(group, 5, 1), vec![(1, 1), (2, 1)]);
        assert!(table.receivers(group, 5, 2).is_empty());
        assert!(table.receivers(group, 4, 1).is_empty());
    }

    #[test]
    fn test_renewed_binding_survives_unbind() {
        let mut table = LinkBindingTable::new();
        table.begin_epoch();
        assert!(table.bind(binding(0, 1)));
        table.bind(binding(0, 2));

        table.begin_epoch();
        assert!(!table.bind(binding(0, 1)));
        assert_eq!(table.newly_stale(), vec![binding(0, 2)]);

        assert!(!table.unbind_if_stale(&binding(0, 1)));
        assert!(table.unbind_if_stale(&binding(0, 2)));
        assert!(!table.contains(&binding(0, 2)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_stale_binding_reported_once() {
        let mut table = LinkBindingTable::new();
        table.begin_epoch();
        table.bind(binding(0, 1));
        table.begin_epoch();
        assert_eq!(table.newly_stale().len(), 1);
        table.begin_epoch();
        assert!(table.newly_stale().is_empty());
    }

    #[test]
    fn test_binding_renewed_before_timer_fires() {
        let mut table = LinkBindingTable::new();
        table.begin_epoch();
        table.bind(binding(0, 1));
        table.begin_epoch();
        // Reported stale, then needed again by the following epoch.
        assert_eq!(table.newly_stale(), vec![binding(0, 1)]);
        table.begin_epoch();
        table.bind(binding(0, 1));
        assert!(!table.unbind_if_stale(&binding(0, 1)));
        assert!(table.contains(&binding(0, 1)));
    }
}
