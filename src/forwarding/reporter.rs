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

//! Periodic status reporting
//!
//! The reporter only reads counters; it never influences forwarding.

use super::manager::ForwardingUnit;
use crate::utils::format_bytes;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Logs one status line per forwarding unit on a fixed interval
#[derive(Debug)]
pub struct StatusReporter {
    units: Vec<ForwardingUnit>,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(units: Vec<ForwardingUnit>, interval: Duration) -> Self {
        Self { units, interval }
    }

    /// Run the reporter on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Report forever; the first report is immediate
    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.report();
        }
    }

    /// Emit one round of status lines
    pub fn report(&self) {
        for unit in &self.units {
            info!("{}", status_line(unit));
        }
    }
}

/// Format the status line for one unit
pub fn status_line(unit: &ForwardingUnit) -> String {
    let stats = unit.stats.snapshot();
    let spec = &unit.spec;
    format!(
        "* STATUS for {}:{}->{}:{} Up {} b ({}); Down {} b ({}); Active {}; Total {}",
        spec.bind_host,
        spec.bind_port,
        spec.target_host,
        spec.target_port,
        stats.bytes_up,
        format_bytes(stats.bytes_up),
        stats.bytes_down,
        format_bytes(stats.bytes_down),
        stats.active,
        stats.total_handled
    )
}
