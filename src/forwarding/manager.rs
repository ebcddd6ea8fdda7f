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

//! ForwardingManager - supervisor for all forwarding units
//!
//! The manager binds every configured unit before any of them starts
//! accepting, then runs all accept loops concurrently. It owns the
//! process-wide [`ConnectionIdGenerator`] and hands each unit a shared
//! reference, so connection ids are unique across units without global state.
//!
//! # Example Usage
//!
//! ```no_run
//! use bfwd::forwarding::{ForwardingConfig, ForwardingManager, ForwardingSpec};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let specs = vec![ForwardingSpec::parse(":2222::internal.example.com:22")?];
//! let manager = ForwardingManager::bind_all(specs, ForwardingConfig::default()).await?;
//!
//! for unit in manager.units() {
//!     println!("{} active: {}", unit.spec, unit.stats.active());
//! }
//!
//! // Runs until a listener fails
//! manager.run().await?;
//! # Ok(())
//! # }
//! ```

use super::error::{ForwardingError, ForwardingResult};
use super::forwarder::PortForwarder;
use super::spec::ForwardingSpec;
use super::stats::ForwardingStats;
use super::ForwardingConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Monotonic source of connection ids shared by all units
#[derive(Debug, Default)]
pub struct ConnectionIdGenerator {
    last: AtomicU64,
}

impl ConnectionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id; the first one handed out is 1
    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

/// Read-side view of a forwarding unit, for status reporting
#[derive(Debug, Clone)]
pub struct ForwardingUnit {
    /// The binding this unit serves
    pub spec: ForwardingSpec,
    /// Address the listener is bound to
    pub local_addr: SocketAddr,
    /// Live counters of the unit
    pub stats: Arc<ForwardingStats>,
}

/// Central owner of all forwarding units
#[derive(Debug)]
pub struct ForwardingManager {
    config: ForwardingConfig,
    ids: Arc<ConnectionIdGenerator>,
    forwarders: Vec<PortForwarder>,
}

impl ForwardingManager {
    /// Create a manager with no units
    pub fn new(config: ForwardingConfig) -> Self {
        Self {
            config,
            ids: Arc::new(ConnectionIdGenerator::new()),
            forwarders: Vec::new(),
        }
    }

    /// Create a manager and bind a unit for each spec
    ///
    /// Fails on the first listener that cannot be bound.
    pub async fn bind_all(
        specs: impl IntoIterator<Item = ForwardingSpec>,
        config: ForwardingConfig,
    ) -> ForwardingResult<Self> {
        let mut manager = Self::new(config);
        for spec in specs {
            manager.add_forwarding(spec).await?;
        }
        Ok(manager)
    }

    /// Bind a new unit and return the address it listens on
    pub async fn add_forwarding(&mut self, spec: ForwardingSpec) -> ForwardingResult<SocketAddr> {
        let forwarder =
            PortForwarder::bind(spec, Arc::clone(&self.ids), self.config.clone()).await?;
        let local_addr = forwarder.local_addr();
        self.forwarders.push(forwarder);
        Ok(local_addr)
    }

    /// Spec, address and stats of every bound unit, in configuration order
    pub fn units(&self) -> Vec<ForwardingUnit> {
        self.forwarders
            .iter()
            .map(|f| ForwardingUnit {
                spec: f.spec().clone(),
                local_addr: f.local_addr(),
                stats: f.stats(),
            })
            .collect()
    }

    /// Shared connection id generator
    pub fn id_generator(&self) -> Arc<ConnectionIdGenerator> {
        Arc::clone(&self.ids)
    }

    pub fn len(&self) -> usize {
        self.forwarders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forwarders.is_empty()
    }

    /// Run every unit concurrently
    ///
    /// Units run until one of them fails; that failure is returned and the
    /// remaining units are dropped with the manager.
    pub async fn run(self) -> ForwardingResult<()> {
        let mut tasks = JoinSet::new();

        info!("Starting {} forwarding unit(s)", self.forwarders.len());
        for forwarder in self.forwarders {
            let name = forwarder.spec().to_string();
            debug!("Spawning accept loop for {}", name);
            tasks.spawn(async move { (name, forwarder.run().await) });
        }

        match tasks.join_next().await {
            None => Ok(()),
            Some(Ok((_, Err(e)))) => Err(e),
            Some(Ok((name, Ok(())))) => Err(ForwardingError::UnitTerminated {
                name,
                reason: "accept loop exited".to_string(),
            }),
            Some(Err(e)) => Err(ForwardingError::UnitTerminated {
                name: "unknown".to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
