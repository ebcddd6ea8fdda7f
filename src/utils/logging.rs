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

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Severity of trace messages on the numeric log level scale
pub const LOG_LEVEL_TRACE: u32 = 100;
pub const LOG_LEVEL_DEBUG: u32 = 200;
pub const LOG_LEVEL_INFO: u32 = 300;
pub const LOG_LEVEL_WARN: u32 = 400;
pub const LOG_LEVEL_ERROR: u32 = 500;
pub const LOG_LEVEL_FATAL: u32 = 600;

/// Map a numeric log level to the most verbose level still emitted
///
/// Messages whose severity is at or below `log_level` are suppressed, so 0
/// shows everything and 600 or more shows nothing.
///
/// There is no fatal level in `tracing`; fatal messages are emitted at error
/// level. A level in 500..600 is therefore approximated as ERROR and still
/// shows error lines, not only fatal ones.
pub fn level_filter(log_level: u32) -> LevelFilter {
    if log_level < LOG_LEVEL_TRACE {
        LevelFilter::TRACE
    } else if log_level < LOG_LEVEL_DEBUG {
        LevelFilter::DEBUG
    } else if log_level < LOG_LEVEL_INFO {
        LevelFilter::INFO
    } else if log_level < LOG_LEVEL_WARN {
        LevelFilter::WARN
    } else if log_level < LOG_LEVEL_FATAL {
        LevelFilter::ERROR
    } else {
        LevelFilter::OFF
    }
}

/// Create an environment filter based on the numeric log level
pub fn create_env_filter(log_level: u32) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        // RUST_LOG wins so dependency logs can be enabled when debugging
        EnvFilter::from_default_env()
    } else {
        let level = level_filter(log_level).to_string().to_lowercase();
        EnvFilter::new(format!("bfwd={level}"))
    }
}

/// Initialize console logging
pub fn init_logging(log_level: u32) {
    let filter = create_env_filter(log_level);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
