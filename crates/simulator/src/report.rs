//! End-of-run summary.

use skycast_routing::split::origin_id;
use skycast_simulation::{RequestStats, SimulationStats};
use skycast_types::{MulticastRequest, NodeId, RequestId};
use std::time::Duration;

/// Traffic of one request over the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestReport {
    pub id: RequestId,
    /// Request this one was split from, if any.
    pub split_from: Option<RequestId>,
    pub source: NodeId,
    pub destinations: usize,
    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub delivery_ratio: f64,
}

/// Results of a completed run.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub end_time: Duration,
    pub stats: SimulationStats,
    pub requests: Vec<RequestReport>,
}

impl SimulationReport {
    pub fn new(
        end_time: Duration,
        stats: SimulationStats,
        requests: &[MulticastRequest],
        request_stats: impl Fn(RequestId) -> Option<RequestStats>,
    ) -> Self {
        let requests = requests
            .iter()
            .map(|request| {
                let counters = request_stats(request.id).unwrap_or_default();
                RequestReport {
                    id: request.id,
                    split_from: origin_id(request),
                    source: request.source,
                    destinations: request.destinations.len(),
                    packets_sent: counters.packets_sent,
                    packets_delivered: counters.packets_delivered,
                    delivery_ratio: counters.delivery_ratio(),
                }
            })
            .collect();
        Self {
            end_time,
            stats,
            requests,
        }
    }

    /// Delivered over expected deliveries across all requests.
    pub fn overall_delivery_ratio(&self) -> f64 {
        let expected: u64 = self
            .requests
            .iter()
            .map(|r| r.packets_sent * r.destinations as u64)
            .sum();
        if expected == 0 {
            1.0
        } else {
            self.stats.packets_delivered as f64 / expected as f64
        }
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        let stats = &self.stats;
        println!("\n=== Simulation Summary ===");
        println!("Simulated time:     {:.3} s", self.end_time.as_secs_f64());
        println!("Events processed:   {}", stats.events_processed);
        println!("Refreshes:          {}", stats.refreshes);
        println!("Entries installed:  {}", stats.entries_installed);
        println!("Bindings removed:   {}", stats.bindings_removed);

        println!("\n=== Traffic ===");
        println!("Packets sent:       {}", stats.packets_sent);
        println!("Copies forwarded:   {}", stats.copies_forwarded);
        println!("Packets delivered:  {}", stats.packets_delivered);
        println!(
            "Dropped:            {} (no route {}, ttl {}, unresolved {})",
            stats.dropped(),
            stats.dropped_no_route,
            stats.dropped_ttl,
            stats.dropped_unresolved
        );
        println!(
            "Delivery ratio:     {:.2}%",
            self.overall_delivery_ratio() * 100.0
        );

        if self.requests.is_empty() {
            return;
        }
        println!("\n=== Requests ===");
        println!(
            "{:>6} {:>10} {:>6} {:>6} {:>10} {:>10} {:>8}",
            "id", "split_from", "src", "dsts", "sent", "delivered", "ratio"
        );
        for r in &self.requests {
            let split_from = r
                .split_from
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            println!(
                "{:>6} {:>10} {:>6} {:>6} {:>10} {:>10} {:>7.2}%",
                r.id,
                split_from,
                r.source,
                r.destinations,
                r.packets_sent,
                r.packets_delivered,
                r.delivery_ratio * 100.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_collects_request_counters() {
        let requests = vec![
            MulticastRequest::new(RequestId(0), 0, [1, 2], 10.0, 0, 10),
            MulticastRequest::new(RequestId(1), 0, [3], 10.0, 0, 10).with_metadata("origin_id=0"),
        ];
        let stats = SimulationStats {
            packets_delivered: 9,
            ..SimulationStats::default()
        };
        let report = SimulationReport::new(Duration::from_secs(1), stats, &requests, |id| {
            Some(RequestStats {
                destinations: if id == RequestId(0) { 2 } else { 1 },
                packets_sent: 4,
                packets_delivered: if id == RequestId(0) { 8 } else { 1 },
            })
        });

        assert_eq!(report.requests[0].split_from, None);
        assert_eq!(report.requests[1].split_from, Some(RequestId(0)));
        assert_eq!(report.requests[1].delivery_ratio, 0.25);
        assert!((report.overall_delivery_ratio() - 0.75).abs() < 1e-9);
    }
}
