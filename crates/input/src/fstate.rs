//! Unicast forwarding state files.
//!
//! A routes directory holds one `fstate_<epoch_ns>.txt` per epoch. Each line
//! reads `current,target,next_hop,my_interface,next_interface`; a
//! `-1,-1,-1` triple marks the destination unreachable. Interface numbers in
//! the file skip the loopback interface, so they are stored shifted by one.
//!
//! The first file describes the full state and each later file only the
//! entries that changed, so [`FstateDirectory`] applies every file on top of
//! the snapshot of the previous epoch.

use skycast_types::{NodeId, SnapshotError, SnapshotSource, UnicastSnapshot};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn malformed(line: usize, reason: impl Into<String>) -> SnapshotError {
    SnapshotError::Malformed {
        line,
        reason: reason.into(),
    }
}

fn parse_node(line: usize, what: &str, value: &str, num_nodes: u32) -> Result<NodeId, SnapshotError> {
    let node: NodeId = value
        .trim()
        .parse()
        .map_err(|_| malformed(line, format!("invalid {what} {value:?}")))?;
    if node >= num_nodes {
        return Err(malformed(
            line,
            format!("{what} {node} outside 0..{num_nodes}"),
        ));
    }
    Ok(node)
}

fn parse_signed(line: usize, what: &str, value: &str) -> Result<i64, SnapshotError> {
    value
        .trim()
        .parse()
        .map_err(|_| malformed(line, format!("invalid {what} {value:?}")))
}

/// Apply the records of one fstate file to `snapshot`.
pub fn apply_records(reader: impl BufRead, snapshot: &mut UnicastSnapshot) -> Result<usize, SnapshotError> {
    let num_nodes = snapshot.num_nodes;
    let mut records = 0;

    for (index, raw) in reader.lines().enumerate() {
        let line = index + 1;
        let raw = raw.map_err(|e| malformed(line, e.to_string()))?;
        if raw.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = raw.split(',').collect();
        if fields.len() != 5 {
            return Err(malformed(
                line,
                format!("expected 5 fields, found {}", fields.len()),
            ));
        }

        let current = parse_node(line, "current node", fields[0], num_nodes)?;
        let target = parse_node(line, "target node", fields[1], num_nodes)?;
        let next = parse_signed(line, "next hop", fields[2])?;
        let my_if = parse_signed(line, "interface", fields[3])?;
        let next_if = parse_signed(line, "next hop interface", fields[4])?;

        match (next, my_if, next_if) {
            (-1, -1, -1) => snapshot.next_hops.set_drop(current, target),
            (next, my_if, next_if) if next >= 0 && my_if >= 0 && next_if >= 0 => {
                let next = parse_node(line, "next hop", fields[2], num_nodes)?;
                let (my_if, next_if) = match (u32::try_from(my_if + 1), u32::try_from(next_if + 1)) {
                    (Ok(a), Ok(b)) => (a, b),
                    _ => return Err(malformed(line, "interface index out of range")),
                };
                snapshot.next_hops.set(current, target, vec![next]);
                snapshot.add_link(current, my_if, next, next_if);
            }
            _ => {
                return Err(malformed(
                    line,
                    "next hop and interfaces must all be -1 or all be valid",
                ))
            }
        }
        records += 1;
    }

    Ok(records)
}

/// Parse one complete fstate file into a fresh snapshot.
pub fn parse_snapshot(
    reader: impl BufRead,
    epoch_ns: u64,
    num_nodes: u32,
) -> Result<UnicastSnapshot, SnapshotError> {
    let mut snapshot = UnicastSnapshot::new(epoch_ns, num_nodes);
    apply_records(reader, &mut snapshot)?;
    Ok(snapshot)
}

/// Path of the fstate file of `epoch_ns` inside `dir`.
pub fn fstate_path(dir: &Path, epoch_ns: u64) -> PathBuf {
    dir.join(format!("fstate_{epoch_ns}.txt"))
}

/// Snapshot source reading `fstate_<t>.txt` files from a directory.
#[derive(Debug, Clone)]
pub struct FstateDirectory {
    dir: PathBuf,
    num_nodes: u32,
    current: Option<UnicastSnapshot>,
}

impl FstateDirectory {
    pub fn new(dir: impl Into<PathBuf>, num_nodes: u32) -> Self {
        Self {
            dir: dir.into(),
            num_nodes,
            current: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SnapshotSource for FstateDirectory {
    fn load(&mut self, epoch_ns: u64) -> Result<UnicastSnapshot, SnapshotError> {
        let path = fstate_path(&self.dir, epoch_ns);
        if !path.exists() {
            return Err(SnapshotError::Missing { epoch_ns });
        }
        let file = File::open(&path).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;

        // A file that fails to apply leaves the previous epoch's state intact.
        let mut snapshot = match &self.current {
            Some(current) => current.clone(),
            None => UnicastSnapshot::new(epoch_ns, self.num_nodes),
        };
        snapshot.epoch_ns = epoch_ns;
        let records = apply_records(BufReader::new(file), &mut snapshot)?;
        info!(epoch_ns, records, path = %path.display(), "Loaded unicast forwarding state");

        self.current = Some(snapshot.clone());
        Ok(snapshot)
    }
}

/// Snapshot source over prebuilt snapshots.
///
/// An epoch without its own snapshot reuses the latest earlier one, which
/// makes a single snapshot at 0 describe a static topology.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshots {
    snapshots: BTreeMap<u64, UnicastSnapshot>,
}

impl InMemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that always yields `snapshot`.
    pub fn fixed(snapshot: UnicastSnapshot) -> Self {
        let mut source = Self::new();
        source.insert(UnicastSnapshot {
            epoch_ns: 0,
            ..snapshot
        });
        source
    }

    pub fn insert(&mut self, snapshot: UnicastSnapshot) {
        self.snapshots.insert(snapshot.epoch_ns, snapshot);
    }

    pub fn with_snapshot(mut self, snapshot: UnicastSnapshot) -> Self {
        self.insert(snapshot);
        self
    }
}

impl SnapshotSource for InMemorySnapshots {
    fn load(&mut self, epoch_ns: u64) -> Result<UnicastSnapshot, SnapshotError> {
        let (_, snapshot) = self
            .snapshots
            .range(..=epoch_ns)
            .next_back()
            .ok_or(SnapshotError::Missing { epoch_ns })?;
        debug!(epoch_ns, from_epoch_ns = snapshot.epoch_ns, "Loaded in-memory snapshot");
        Ok(UnicastSnapshot {
            epoch_ns,
            ..snapshot.clone()
        })
    }
}
