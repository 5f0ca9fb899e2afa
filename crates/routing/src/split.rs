//! Splitting requests that leave their source through several next hops.
//!
//! The source emits exactly one copy per packet, so a request whose
//! destinations are reached through different first hops cannot be served
//! by one tree. Splitting groups the destinations by the (next hop, egress
//! interface) pair chosen at the source and turns each group into its own
//! request, tagged with the id it came from.
//!
//! Over time-varying state the grouping can change at a refresh boundary.
//! [`split_schedule_over`] then first cuts the request in time at that
//! boundary, so every part keeps one grouping for its whole lifetime.

use crate::SynthesisError;
use skycast_types::{
    InterfaceIndex, MulticastRequest, NodeId, RequestId, SnapshotError, SnapshotSource,
    UnicastSnapshot,
};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info};

/// Metadata key recording which request a split part came from.
pub const ORIGIN_ID_KEY: &str = "origin_id";

/// Errors splitting a schedule over a sequence of epochs.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("failed to load unicast state of epoch {epoch_ns} ns: {source}")]
    Snapshot {
        epoch_ns: u64,
        #[source]
        source: SnapshotError,
    },

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

type SourceGroups = BTreeMap<(NodeId, InterfaceIndex), BTreeSet<NodeId>>;

/// Destinations of `request` grouped by the first hop taken at its source.
fn source_groups(
    request: &MulticastRequest,
    snapshot: &UnicastSnapshot,
) -> Result<SourceGroups, SynthesisError> {
    let mut groups = SourceGroups::new();
    for &destination in &request.destinations {
        if destination == request.source {
            return Err(SynthesisError::SelfDestination {
                request: request.id,
                node: destination,
            });
        }
        let hop = snapshot
            .next_hop(request.source, destination)
            .map_err(|error| SynthesisError::Unicast {
                request: request.id,
                error,
            })?;
        groups
            .entry((hop.node, hop.out_interface))
            .or_default()
            .insert(destination);
    }
    Ok(groups)
}

/// `metadata` with `origin_id=<id>` set, keeping every other pair.
fn tag_origin(metadata: &str, id: RequestId) -> String {
    let tag = format!("{ORIGIN_ID_KEY}={id}");
    let mut pairs: Vec<&str> = metadata
        .split(';')
        .filter(|pair| !pair.trim().is_empty())
        .filter(|pair| {
            pair.split_once('=')
                .map_or(true, |(key, _)| key.trim() != ORIGIN_ID_KEY)
        })
        .collect();
    pairs.push(&tag);
    pairs.join(";")
}

/// Split `request` into one request per distinct first hop at its source.
///
/// Parts keep the id of `request`; [`split_schedule`] renumbers them.
pub fn split_at_source(
    request: &MulticastRequest,
    snapshot: &UnicastSnapshot,
) -> Result<Vec<MulticastRequest>, SynthesisError> {
    let metadata = tag_origin(&request.metadata, request.id);
    Ok(source_groups(request, snapshot)?
        .into_values()
        .map(|destinations| MulticastRequest {
            destinations,
            metadata: metadata.clone(),
            ..request.clone()
        })
        .collect())
}

/// Cut `request` at `at_ns` into `[start, at_ns)` and `[at_ns, end)`.
///
/// `at_ns` must lie strictly inside the request.
fn fork_at(request: MulticastRequest, at_ns: u64) -> (MulticastRequest, MulticastRequest) {
    let end_ns = request.end_time_ns();
    let head = MulticastRequest {
        duration_ns: at_ns - request.start_time_ns,
        ..request.clone()
    };
    let tail = MulticastRequest {
        start_time_ns: at_ns,
        duration_ns: end_ns - at_ns,
        ..request
    };
    (head, tail)
}

/// Order parts by start time (stable) and renumber them from 0.
fn renumber(parts: &mut [MulticastRequest]) {
    parts.sort_by_key(|r| r.start_time_ns);
    for (index, part) in parts.iter_mut().enumerate() {
        part.id = RequestId(index as u64);
    }
}

/// Split every request of a schedule at its source, then order the parts by
/// start time (stable) and renumber them from 0.
pub fn split_schedule(
    requests: &[MulticastRequest],
    snapshot: &UnicastSnapshot,
) -> Result<Vec<MulticastRequest>, SynthesisError> {
    let mut parts = Vec::with_capacity(requests.len());
    for request in requests {
        parts.extend(split_at_source(request, snapshot)?);
    }
    renumber(&mut parts);
    info!(
        requests = requests.len(),
        parts = parts.len(),
        "Split schedule at sources"
    );
    Ok(parts)
}

fn load_epoch(
    source: &mut impl SnapshotSource,
    epoch_ns: u64,
) -> Result<UnicastSnapshot, SplitError> {
    source
        .load(epoch_ns)
        .map_err(|source| SplitError::Snapshot { epoch_ns, source })
}

/// Split a schedule against the unicast state of every refresh epoch.
///
/// Epochs are `0, interval_ns, 2 * interval_ns, ...` below `end_ns`, loaded
/// in order from `source`. A request still running across an epoch boundary
/// where its source grouping changes is cut at that boundary. Each time slice
/// is then split against the state it is routed with. With `interval_ns` of
/// 0 or at least `end_ns` only epoch 0 is used.
pub fn split_schedule_over(
    requests: &[MulticastRequest],
    source: &mut impl SnapshotSource,
    interval_ns: u64,
    end_ns: u64,
) -> Result<Vec<MulticastRequest>, SplitError> {
    let mut open = requests.to_vec();
    let mut parts = Vec::with_capacity(requests.len());
    let mut forks = 0usize;
    let mut previous = load_epoch(source, 0)?;
    let mut epoch_ns = interval_ns;

    while interval_ns > 0 && epoch_ns < end_ns {
        let current = load_epoch(source, epoch_ns)?;
        let mut still_open = Vec::with_capacity(open.len());
        for request in open {
            if request.start_time_ns >= epoch_ns {
                still_open.push(request);
            } else if request.end_time_ns() <= epoch_ns {
                parts.extend(split_at_source(&request, &previous)?);
            } else if source_groups(&request, &previous)? != source_groups(&request, &current)? {
                debug!(request = %request.id, epoch_ns, "Source grouping changed, forking request");
                let (head, tail) = fork_at(request, epoch_ns);
                parts.extend(split_at_source(&head, &previous)?);
                still_open.push(tail);
                forks += 1;
            } else {
                still_open.push(request);
            }
        }
        open = still_open;
        previous = current;
        epoch_ns += interval_ns;
    }
    for request in &open {
        parts.extend(split_at_source(request, &previous)?);
    }

    renumber(&mut parts);
    info!(
        requests = requests.len(),
        forks,
        parts = parts.len(),
        "Split schedule at sources over epochs"
    );
    Ok(parts)
}

/// The id recorded by [`split_at_source`] in a part's metadata.
pub fn origin_id(request: &MulticastRequest) -> Option<RequestId> {
    request
        .metadata
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == ORIGIN_ID_KEY)
        .and_then(|(_, value)| value.trim().parse().ok())
        .map(RequestId)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Star with centre 0 and leaves 1..=3, all talking through the centre.
    fn star_snapshot() -> UnicastSnapshot {
        let mut snapshot = UnicastSnapshot::new(0, 4);
        for leaf in 1..4 {
            snapshot.add_link(0, leaf, leaf, 1);
            snapshot.next_hops.set(0, leaf, vec![leaf]);
            snapshot.next_hops.set(leaf, 0, vec![0]);
            for other in 1..4 {
                if other != leaf {
                    snapshot.next_hops.set(leaf, other, vec![0]);
                }
            }
        }
        snapshot
    }

    #[test]
    fn test_fan_out_at_source_is_split() {
        let request = MulticastRequest::new(RequestId(7), 0, [1, 2, 3], 10.0, 5, 100);
        let parts = split_at_source(&request, &star_snapshot()).unwrap();
        assert_eq!(parts.len(), 3);
        for (part, leaf) in parts.iter().zip(1..) {
            assert_eq!(part.destinations, BTreeSet::from([leaf]));
            assert_eq!(part.start_time_ns, 5);
            assert_eq!(origin_id(part), Some(RequestId(7)));
        }
    }

    #[test]
    fn test_single_egress_stays_whole() {
        let request = MulticastRequest::new(RequestId(2), 1, [2, 3], 10.0, 0, 100);
        let parts = split_at_source(&request, &star_snapshot()).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].destinations, request.destinations);
        assert_eq!(parts[0].metadata, "origin_id=2");
    }

    #[test]
    fn test_schedule_is_resorted_and_renumbered() {
        let requests = vec![
            MulticastRequest::new(RequestId(0), 0, [1, 2], 10.0, 100, 100),
            MulticastRequest::new(RequestId(1), 3, [1], 10.0, 50, 100),
        ];
        let parts = split_schedule(&requests, &star_snapshot()).unwrap();
        let summary: Vec<_> = parts
            .iter()
            .map(|p| (p.id.value(), p.source, p.start_time_ns, origin_id(p)))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, 3, 50, Some(RequestId(1))),
                (1, 0, 100, Some(RequestId(0))),
                (2, 0, 100, Some(RequestId(0))),
            ]
        );
    }

    #[test]
    fn test_existing_metadata_is_kept() {
        let request = MulticastRequest::new(RequestId(7), 0, [1, 2], 10.0, 0, 100)
            .with_metadata("foo=bar");
        let parts = split_at_source(&request, &star_snapshot()).unwrap();
        assert_eq!(parts.len(), 2);
        for part in &parts {
            assert_eq!(part.metadata, "foo=bar;origin_id=7");
            assert_eq!(origin_id(part), Some(RequestId(7)));
        }
    }

    #[test]
    fn test_resplitting_replaces_origin_tag() {
        let request = MulticastRequest::new(RequestId(4), 0, [1], 10.0, 0, 100)
            .with_metadata("origin_id=1;foo=bar");
        let parts = split_at_source(&request, &star_snapshot()).unwrap();
        assert_eq!(parts[0].metadata, "foo=bar;origin_id=4");
    }

    /// Snapshots stored per exact epoch.
    struct Epochs(BTreeMap<u64, UnicastSnapshot>);

    impl SnapshotSource for Epochs {
        fn load(&mut self, epoch_ns: u64) -> Result<UnicastSnapshot, SnapshotError> {
            self.0
                .get(&epoch_ns)
                .cloned()
                .ok_or(SnapshotError::Missing { epoch_ns })
        }
    }

    /// Node 0 reaches 3 through 1, and 2 either through 1 or directly.
    fn egress_snapshot(epoch_ns: u64, direct_to_2: bool) -> UnicastSnapshot {
        let mut snapshot = UnicastSnapshot::new(epoch_ns, 4);
        snapshot.add_link(0, 1, 1, 1);
        snapshot.add_link(0, 2, 2, 1);
        snapshot
            .next_hops
            .set(0, 2, vec![if direct_to_2 { 2 } else { 1 }]);
        snapshot.next_hops.set(0, 3, vec![1]);
        snapshot
    }

    fn changing_egress() -> Epochs {
        Epochs(BTreeMap::from([
            (0, egress_snapshot(0, false)),
            (100, egress_snapshot(100, true)),
            (200, egress_snapshot(200, true)),
        ]))
    }

    #[test]
    fn test_request_is_forked_where_source_grouping_changes() {
        let requests = vec![
            MulticastRequest::new(RequestId(0), 0, [2, 3], 10.0, 50, 200),
            MulticastRequest::new(RequestId(1), 0, [3], 10.0, 120, 10),
        ];
        let parts = split_schedule_over(&requests, &mut changing_egress(), 100, 300).unwrap();
        let summary: Vec<_> = parts
            .iter()
            .map(|p| {
                (
                    p.id.value(),
                    p.start_time_ns,
                    p.duration_ns,
                    p.destinations.iter().copied().collect::<Vec<_>>(),
                    origin_id(p),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, 50, 50, vec![2, 3], Some(RequestId(0))),
                (1, 100, 150, vec![3], Some(RequestId(0))),
                (2, 100, 150, vec![2], Some(RequestId(0))),
                (3, 120, 10, vec![3], Some(RequestId(1))),
            ]
        );
    }

    #[test]
    fn test_single_epoch_matches_plain_split() {
        let requests = vec![MulticastRequest::new(RequestId(0), 0, [2, 3], 10.0, 50, 200)];
        let parts = split_schedule_over(&requests, &mut changing_egress(), 300, 300).unwrap();
        let plain = split_schedule(&requests, &egress_snapshot(0, false)).unwrap();
        assert_eq!(parts, plain);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].duration_ns, 200);
    }

    #[test]
    fn test_missing_epoch_is_reported() {
        let mut source = Epochs(BTreeMap::from([(0, egress_snapshot(0, false))]));
        let requests = vec![MulticastRequest::new(RequestId(0), 0, [3], 10.0, 0, 250)];
        let err = split_schedule_over(&requests, &mut source, 100, 300).unwrap_err();
        assert!(matches!(err, SplitError::Snapshot { epoch_ns: 100, .. }));
    }

    #[test]
    fn test_origin_id_absent() {
        let request = MulticastRequest::new(RequestId(0), 0, [1], 10.0, 0, 1);
        assert_eq!(origin_id(&request), None);
    }
}
