//! Bounded per-device transaction audit trail
//!
//! Write-only from the gateway's perspective; external diagnostics tooling
//! reads it back by device id. Each device keeps its most recent records
//! (newest first) under a cap and a short TTL.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rentbox_protocol::{now_secs, timing};
use serde::Serialize;

/// One parsed device exchange, kept for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    /// Command code, e.g. "0x31"
    pub cmd: String,
    /// Raw frame as uppercase hex
    pub raw: String,
    /// Structured parse result, if the handler produced one
    pub parsed: Option<serde_json::Value>,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    #[serde(skip)]
    recorded_at: Instant,
}

impl TransactionRecord {
    pub fn new(command: u8, raw_hex: String, parsed: Option<serde_json::Value>) -> Self {
        Self {
            cmd: format!("0x{:02X}", command),
            raw: raw_hex,
            parsed,
            timestamp: now_secs(),
            recorded_at: Instant::now(),
        }
    }
}

/// Most-recent-first transaction log, capped and TTL-bounded per device
pub struct TransactionLog {
    cap: usize,
    ttl: Duration,
    records: DashMap<String, VecDeque<TransactionRecord>>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::with_limits(timing::AUDIT_CAP_PER_DEVICE, timing::AUDIT_TTL)
    }

    pub fn with_limits(cap: usize, ttl: Duration) -> Self {
        Self {
            cap,
            ttl,
            records: DashMap::new(),
        }
    }

    /// Append a record for the device, pruning expired and over-cap entries
    pub fn push(&self, device_id: &str, record: TransactionRecord) {
        let mut entry = self.records.entry(device_id.to_string()).or_default();
        entry.push_front(record);
        Self::prune(&mut entry, self.cap, self.ttl);
    }

    /// Read back the most recent records, optionally filtered by command code
    ///
    /// `cmd_filter` takes the same "0xNN" form the records carry.
    pub fn recent(
        &self,
        device_id: &str,
        cmd_filter: Option<&str>,
        limit: usize,
    ) -> Vec<TransactionRecord> {
        let now = Instant::now();
        match self.records.get(device_id) {
            Some(entry) => entry
                .iter()
                .filter(|r| now.duration_since(r.recorded_at) < self.ttl)
                .filter(|r| cmd_filter.map(|f| r.cmd == f).unwrap_or(true))
                .take(limit)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    fn prune(entry: &mut VecDeque<TransactionRecord>, cap: usize, ttl: Duration) {
        let now = Instant::now();
        while entry.len() > cap {
            entry.pop_back();
        }
        while entry
            .back()
            .map(|r| now.duration_since(r.recorded_at) >= ttl)
            .unwrap_or(false)
        {
            entry.pop_back();
        }
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}
