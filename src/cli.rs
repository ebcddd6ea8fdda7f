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

use crate::forwarding::{
    ForwardingConfig, ForwardingSpec, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REPORT_INTERVAL_SECS,
};
use clap::{CommandFactory, Parser};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "bfwd",
    version,
    about = "Multi-binding TCP port forwarder",
    long_about = "bfwd listens on one or more local addresses and relays every accepted TCP connection\nto the target address configured for that listener. Traffic is forwarded byte for byte\nin both directions until either side closes. Per-binding traffic and connection counters\nare reported periodically.",
    after_help = "EXAMPLES:\n  Forward port 2222 on all interfaces:  bfwd -b :2222::internal.example.com:22\n  Several bindings at once:             bfwd -b 127.0.0.1:8080::web:80 -b :5433::db:5432\n  Only warnings and errors:             bfwd --loglevel 300 -b :2222::internal.example.com:22"
)]
pub struct Cli {
    #[arg(
        short = 'b',
        long = "bind",
        value_name = "SPEC",
        help = "(repeatable) Binding in [bind_address]:port::target_address:port format\nExample: :22::remote.host.com:22\nAn empty bind address listens on all interfaces"
    )]
    pub bindings: Vec<String>,

    #[arg(
        long = "loglevel",
        value_name = "N",
        default_value = "0",
        help = "Log level (0 for everything, higher is less)\nMessages at or below N are suppressed: trace=100, debug=200, info=300,\nwarn=400, error=500, fatal=600. RUST_LOG overrides this value"
    )]
    pub log_level: u32,

    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Timeout for connecting to a target"
    )]
    pub connect_timeout: u64,

    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = DEFAULT_REPORT_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Interval between status reports"
    )]
    pub report_interval: u64,
}

impl Cli {
    /// Parse every `--bind` value, failing on the first malformed one
    pub fn forwarding_specs(&self) -> anyhow::Result<Vec<ForwardingSpec>> {
        Ok(ForwardingSpec::parse_all(&self.bindings)?)
    }

    /// Engine configuration derived from the flags
    pub fn forwarding_config(&self) -> ForwardingConfig {
        ForwardingConfig::default().with_connect_timeout(Duration::from_secs(self.connect_timeout))
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval)
    }

    /// Print usage to stderr
    pub fn print_usage() {
        let mut command = Self::command();
        let _ = command.write_help(&mut std::io::stderr());
    }
}
