//! Multicast schedule CSV.
//!
//! One request per line:
//!
//! ```text
//! id,source,member_count,dst dst ...,rate_mbps,start_ns,duration_ns,additional,metadata
//! ```
//!
//! The destination list may be wrapped in double quotes. Ids must count up
//! from 0 by one and start times must be weakly ascending.

use skycast_types::{MulticastRequest, NodeId, NodeRoles, RequestId};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const FIELD_COUNT: usize = 9;

/// Errors raised while reading a schedule. Line numbers are 1-based.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("failed to read schedule {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: failed to read: {source}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: expected 9 fields, found {found}")]
    FieldCount { line: usize, found: usize },

    #[error("line {line}: invalid {field} {value:?}")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: id {found} is not ascending by one (expected {expected})")]
    IdNotAscending { line: usize, expected: u64, found: u64 },

    #[error("line {line}: member count {expected} but {found} destinations listed")]
    MemberCountMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: request has no destinations")]
    NoDestinations { line: usize },

    #[error("line {line}: target rate must be positive")]
    NonPositiveRate { line: usize },

    #[error("line {line}: start time {start_ns} is before the previous start {previous_ns}")]
    StartNotAscending {
        line: usize,
        previous_ns: u64,
        start_ns: u64,
    },

    #[error("line {line}: source {node} is also a destination")]
    SourceIsDestination { line: usize, node: NodeId },

    #[error("line {line}: node {node} is not a valid endpoint")]
    InvalidEndpoint { line: usize, node: NodeId },

    #[error("line {line}: start time {start_ns} is not before the simulation end {end_ns}")]
    StartAfterEnd {
        line: usize,
        start_ns: u64,
        end_ns: u64,
    },
}

fn parse_field<T: std::str::FromStr>(
    line: usize,
    field: &'static str,
    value: &str,
) -> Result<T, ScheduleError> {
    value
        .trim()
        .parse()
        .map_err(|_| ScheduleError::InvalidNumber {
            line,
            field,
            value: value.to_string(),
        })
}

/// Parse and validate a schedule.
///
/// Endpoints must be ground stations of `roles`, and every request must
/// start before `end_ns`. Blank lines are skipped.
pub fn parse_schedule(
    reader: impl BufRead,
    roles: &NodeRoles,
    end_ns: u64,
) -> Result<Vec<MulticastRequest>, ScheduleError> {
    let mut requests = Vec::new();
    let mut previous_start = 0u64;

    for (index, raw) in reader.lines().enumerate() {
        let line = index + 1;
        let raw = raw.map_err(|source| ScheduleError::Read { line, source })?;
        if raw.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = raw.split(',').collect();
        if fields.len() != FIELD_COUNT {
            return Err(ScheduleError::FieldCount {
                line,
                found: fields.len(),
            });
        }

        let id: u64 = parse_field(line, "id", fields[0])?;
        let expected = requests.len() as u64;
        if id != expected {
            return Err(ScheduleError::IdNotAscending {
                line,
                expected,
                found: id,
            });
        }

        let source: NodeId = parse_field(line, "source node", fields[1])?;
        let member_count: usize = parse_field(line, "member count", fields[2])?;

        let members = fields[3].trim().trim_matches('"');
        let listed: Vec<NodeId> = members
            .split_whitespace()
            .map(|token| parse_field(line, "destination node", token))
            .collect::<Result<_, _>>()?;
        let destinations: BTreeSet<NodeId> = listed.iter().copied().collect();
        if listed.len() != member_count || destinations.len() != member_count {
            return Err(ScheduleError::MemberCountMismatch {
                line,
                expected: member_count,
                found: destinations.len(),
            });
        }
        if destinations.is_empty() {
            return Err(ScheduleError::NoDestinations { line });
        }

        let rate: f64 = parse_field(line, "target rate", fields[4])?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ScheduleError::NonPositiveRate { line });
        }

        let start_ns: u64 = parse_field(line, "start time", fields[5])?;
        let duration_ns: u64 = parse_field(line, "duration", fields[6])?;

        if start_ns < previous_start {
            return Err(ScheduleError::StartNotAscending {
                line,
                previous_ns: previous_start,
                start_ns,
            });
        }
        previous_start = start_ns;

        if destinations.contains(&source) {
            return Err(ScheduleError::SourceIsDestination { line, node: source });
        }
        if let Some(&node) = std::iter::once(&source)
            .chain(&destinations)
            .find(|&&node| !roles.is_ground_station(node))
        {
            return Err(ScheduleError::InvalidEndpoint { line, node });
        }
        if start_ns >= end_ns {
            return Err(ScheduleError::StartAfterEnd {
                line,
                start_ns,
                end_ns,
            });
        }

        let mut request = MulticastRequest::new(
            RequestId(id),
            source,
            destinations,
            rate,
            start_ns,
            duration_ns,
        );
        request.additional_parameters = fields[7].to_string();
        request.metadata = fields[8].to_string();
        debug!(
            request = %request.id,
            source,
            destinations = request.destinations.len(),
            "Read multicast request"
        );
        requests.push(request);
    }

    Ok(requests)
}

/// Read and validate the schedule file at `path`.
pub fn read_schedule(
    path: impl AsRef<Path>,
    roles: &NodeRoles,
    end_ns: u64,
) -> Result<Vec<MulticastRequest>, ScheduleError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ScheduleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let requests = parse_schedule(BufReader::new(file), roles, end_ns)?;
    info!(path = %path.display(), requests = requests.len(), "Loaded multicast schedule");
    Ok(requests)
}

/// Write `requests` in schedule format, one line each.
pub fn write_schedule(mut writer: impl Write, requests: &[MulticastRequest]) -> io::Result<()> {
    for request in requests {
        let destinations = request
            .destinations
            .iter()
            .map(NodeId::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{}",
            request.id,
            request.source,
            request.destinations.len(),
            destinations,
            request.target_rate_mbps,
            request.start_time_ns,
            request.duration_ns,
            request.additional_parameters,
            request.metadata,
        )?;
    }
    writer.flush()
}
