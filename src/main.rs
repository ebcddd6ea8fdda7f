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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use bfwd::{
    cli::Cli,
    forwarding::{ForwardingManager, StatusReporter},
    utils::init_logging,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.bindings.is_empty() {
        Cli::print_usage();
        std::process::exit(1);
    }

    init_logging(cli.log_level);
    info!("Setting logging level to {}", cli.log_level);

    if let Err(e) = run(cli).await {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let specs = cli.forwarding_specs()?;

    let manager = ForwardingManager::bind_all(specs, cli.forwarding_config())
        .await
        .context("Failed to start forwarding")?;

    let reporter = StatusReporter::new(manager.units(), cli.report_interval()).spawn();

    // Only returns when a listener fails
    let result = manager.run().await;
    reporter.abort();

    result.context("Forwarding stopped")
}
