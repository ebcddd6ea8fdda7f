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

//! TCP port forwarding engine for bfwd
//!
//! This module implements a byte-transparent, multi-binding TCP forwarder:
//! every configured binding listens on a local address and relays each
//! accepted connection to a fixed target address.
//!
//! # Architecture
//!
//! ```text
//! [ForwardingManager] → N × [PortForwarder] → per-connection handler → [Tunnel]
//!    owns id generator      bind + accept loop    dial + cleanup          two copy tasks
//! ```
//!
//! - **ForwardingSpec**: Parsing of `[bind_host]:bind_port::target_host:target_port`
//! - **ForwardingManager**: Binds every unit up front and runs them concurrently
//! - **PortForwarder**: One listener, fire-and-forget dispatch per connection
//! - **Tunnel**: Bidirectional copy with per-direction byte accounting
//! - **ForwardingStats**: Lock-free counters shared by all connections of a unit
//!
//! # Error policy
//!
//! Bind and accept failures are fatal for the whole process ([`ForwardingError`]).
//! Dial and relay failures are absorbed at the connection boundary
//! ([`ConnectionError`]) and only show up in logs and counters.

pub mod error;
pub mod forwarder;
pub mod handler;
pub mod manager;
pub mod reporter;
pub mod spec;
pub mod stats;
pub mod tunnel;

// Re-export key types for convenience
pub use error::{ConnectionError, ForwardingError};
pub use forwarder::PortForwarder;
pub use manager::{ConnectionIdGenerator, ForwardingManager, ForwardingUnit};
pub use reporter::StatusReporter;
pub use spec::ForwardingSpec;
pub use stats::{ConnectionGuard, ForwardingStats, StatsSnapshot};
pub use tunnel::{Tunnel, TunnelStats};

use std::time::Duration;

/// Default timeout for dialing a forwarding target
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default interval between status reports
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 30;

/// Runtime configuration shared by all forwarding units
#[derive(Debug, Clone)]
pub struct ForwardingConfig {
    /// Upper bound on how long dialing a target may take
    pub connect_timeout: Duration,
    /// Buffer size for each copy direction of a tunnel
    pub buffer_size: usize,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            buffer_size: 16 * 1024,
        }
    }
}

impl ForwardingConfig {
    /// Override the dial timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
