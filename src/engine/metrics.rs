//! Engine metrics.
//!
//! Aggregates only. Nothing here identifies a session or carries key material.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters updated on the hot path.
#[derive(Debug, Default)]
pub struct EngineCounters {
    total_bytes: AtomicU64,
    total_packets: AtomicU64,
    handshakes_completed: AtomicU64,
    auth_failures: AtomicU64,
    rekeys: AtomicU64,
    sessions_swept: AtomicU64,
}

impl EngineCounters {
    /// Count one data packet of `bytes` payload bytes.
    pub fn add_packet(&self, bytes: usize) {
        self.total_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.total_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed handshake.
    pub fn increment_handshakes(&self) {
        self.handshakes_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an authentication failure.
    pub fn increment_auth_failures(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed rekey.
    pub fn increment_rekeys(&self) {
        self.rekeys.fetch_add(1, Ordering::Relaxed);
    }

    /// Count swept sessions.
    pub fn add_swept(&self, count: usize) {
        self.sessions_swept.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Payload bytes seen by the data path.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Data packets seen by the data path.
    pub fn total_packets(&self) -> u64 {
        self.total_packets.load(Ordering::Relaxed)
    }

    /// Handshakes that installed keys.
    pub fn handshakes_completed(&self) -> u64 {
        self.handshakes_completed.load(Ordering::Relaxed)
    }

    /// Failed tag or identity checks.
    pub fn auth_failures(&self) -> u64 {
        self.auth_failures.load(Ordering::Relaxed)
    }

    /// Rekeys completed.
    pub fn rekeys(&self) -> u64 {
        self.rekeys.load(Ordering::Relaxed)
    }

    /// Sessions removed by the sweeper.
    pub fn sessions_swept(&self) -> u64 {
        self.sessions_swept.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Sessions neither closing nor closed
    pub active_sessions: usize,
    /// Payload bytes through the data path
    pub total_bytes: u64,
    /// Data packets through the data path
    pub total_packets: u64,
    /// Mean amplification entropy estimate
    pub avg_entropy_estimate: f64,
    /// Mean amplification agreement error rate
    pub avg_agreement_error_rate: f64,
    /// Handshakes and rekeys that installed keys
    pub handshakes_completed: u64,
    /// Failed tag or identity checks
    pub auth_failures: u64,
    /// Completed rekeys
    pub rekeys: u64,
    /// Sessions removed by the sweeper
    pub sessions_swept: u64,
}

impl MetricsSnapshot {
    /// Mean payload size per packet.
    pub fn avg_packet_size(&self) -> f64 {
        if self.total_packets == 0 {
            0.0
        } else {
            self.total_bytes as f64 / self.total_packets as f64
        }
    }

    /// Format metrics as a simple text report.
    pub fn format_report(&self) -> String {
        format!(
            r#"XTLS-Reality Engine Metrics
===========================
Sessions:
  Active:     {}
  Handshakes: {}
  Rekeys:     {}
  Swept:      {}

Traffic:
  Bytes:       {}
  Packets:     {}
  Avg Payload: {:.1} bytes

Amplification:
  Entropy Estimate:     {:.3}
  Agreement Error Rate: {:.3}

Errors:
  Auth Failures: {}
"#,
            self.active_sessions,
            self.handshakes_completed,
            self.rekeys,
            self.sessions_swept,
            self.total_bytes,
            self.total_packets,
            self.avg_packet_size(),
            self.avg_entropy_estimate,
            self.avg_agreement_error_rate,
            self.auth_failures,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let counters = EngineCounters::default();
        counters.add_packet(100);
        counters.add_packet(50);
        counters.increment_handshakes();
        counters.increment_auth_failures();
        counters.add_swept(3);

        assert_eq!(counters.total_bytes(), 150);
        assert_eq!(counters.total_packets(), 2);
        assert_eq!(counters.handshakes_completed(), 1);
        assert_eq!(counters.auth_failures(), 1);
        assert_eq!(counters.rekeys(), 0);
        assert_eq!(counters.sessions_swept(), 3);
    }

    #[test]
    fn test_report() {
        let snapshot = MetricsSnapshot {
            active_sessions: 2,
            total_bytes: 1000,
            total_packets: 4,
            avg_entropy_estimate: 1.0,
            ..Default::default()
        };

        assert!((snapshot.avg_packet_size() - 250.0).abs() < f64::EPSILON);
        let report = snapshot.format_report();
        assert!(report.contains("Active:     2"));
        assert!(report.contains("Avg Payload: 250.0 bytes"));
        assert_eq!(MetricsSnapshot::default().avg_packet_size(), 0.0);
    }
}
