// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Statistics tracking for forwarding units
//!
//! Every [`PortForwarder`](super::PortForwarder) owns one [`ForwardingStats`]
//! shared by all of its connection handlers. Counters are updated with plain
//! atomic adds; readers see each field independently, never a consistent
//! tuple across fields.

use crate::utils::format_duration;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Traffic and connection counters for one forwarding unit
#[derive(Debug, Default)]
pub struct ForwardingStats {
    /// Bytes copied from clients to the target
    bytes_up: AtomicU64,
    /// Bytes copied from the target to clients
    bytes_down: AtomicU64,
    /// Connections that have fully completed, successful or not
    total_handled: AtomicU64,
    /// Connections between accept and teardown
    active: AtomicI64,
}

/// Point-in-time read of [`ForwardingStats`]
///
/// Fields are loaded one after another, so a snapshot taken while
/// connections are finishing may mix values from before and after.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub total_handled: u64,
    pub active: i64,
}

impl ForwardingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total bytes uploaded (client → target)
    pub fn bytes_up(&self) -> u64 {
        self.bytes_up.load(Ordering::Relaxed)
    }

    /// Get total bytes downloaded (target → client)
    pub fn bytes_down(&self) -> u64 {
        self.bytes_down.load(Ordering::Relaxed)
    }

    /// Get the number of completed connections
    pub fn total_handled(&self) -> u64 {
        self.total_handled.load(Ordering::Relaxed)
    }

    /// Get the number of active connections
    pub fn active(&self) -> i64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_up: self.bytes_up(),
            bytes_down: self.bytes_down(),
            total_handled: self.total_handled(),
            active: self.active(),
        }
    }

    pub(crate) fn inc_active(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dec_active(&self) {
        let previous = self.active.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "active connection count went negative");
    }

    pub(crate) fn inc_handled(&self) {
        self.total_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_bytes(&self, up: u64, down: u64) {
        self.bytes_up.fetch_add(up, Ordering::Relaxed);
        self.bytes_down.fetch_add(down, Ordering::Relaxed);
    }
}

/// Accounting for one connection session
///
/// Creating the guard counts the connection as active. Dropping it, on any
/// exit path of the handler, folds the recorded byte counts into the unit's
/// stats, decrements `active`, increments `total_handled` and logs the
/// completion line.
#[derive(Debug)]
pub struct ConnectionGuard {
    conn_id: u64,
    started_at: Instant,
    stats: Arc<ForwardingStats>,
    bytes_up: u64,
    bytes_down: u64,
}

impl ConnectionGuard {
    pub fn new(conn_id: u64, stats: Arc<ForwardingStats>) -> Self {
        stats.inc_active();
        Self {
            conn_id,
            started_at: Instant::now(),
            stats,
            bytes_up: 0,
            bytes_down: 0,
        }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Record the bytes moved by this session's relay
    pub fn record(&mut self, bytes_up: u64, bytes_down: u64) {
        self.bytes_up += bytes_up;
        self.bytes_down += bytes_down;
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        info!(
            "{} Done. Uptime: {} Uploaded: {} bytes Downloaded: {} bytes",
            self.conn_id,
            format_duration(self.uptime()),
            self.bytes_up,
            self.bytes_down
        );
        self.stats.add_bytes(self.bytes_up, self.bytes_down);
        self.stats.dec_active();
        self.stats.inc_handled();
    }
}
