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

//! Error types for the forwarding engine.
//!
//! Errors are split by blast radius:
//!
//! - [`ForwardingError`]: startup and listener failures, fatal for the process
//! - [`ConnectionError`]: failures of a single relayed connection, never
//!   propagated past the connection handler

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Fatal errors of the forwarding engine.
#[derive(Debug, Error)]
pub enum ForwardingError {
    /// A binding specification could not be parsed or validated.
    #[error("Invalid spec: {spec} ({reason})")]
    InvalidSpec {
        /// The offending specification text.
        spec: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The listener for a binding could not be created.
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        /// The `host:port` we tried to bind.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Accepting on an established listener failed.
    #[error("Error accepting connection on {addr}: {source}")]
    Accept {
        /// The listener address.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A forwarding unit task ended abnormally.
    #[error("Forwarding unit {name} terminated: {reason}")]
    UnitTerminated {
        /// Display form of the unit's binding.
        name: String,
        /// Why it stopped.
        reason: String,
    },
}

impl ForwardingError {
    pub(crate) fn invalid_spec(spec: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

/// Per-connection errors, absorbed by the connection handler.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Dialing the target failed.
    #[error("can't connect to {target}: {source}")]
    Dial {
        /// The `host:port` we dialed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Dialing the target did not complete in time.
    #[error("can't connect to {target}: timed out after {timeout:?}")]
    DialTimeout {
        /// The `host:port` we dialed.
        target: String,
        /// The configured connect timeout.
        timeout: Duration,
    },

    /// The relay ended with an I/O error in one direction.
    #[error("relay error: {0}")]
    Relay(#[source] std::io::Error),
}

/// Result type for fatal forwarding operations.
pub type ForwardingResult<T> = Result<T, ForwardingError>;
