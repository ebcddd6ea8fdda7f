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

//! Binding specification parsing
//!
//! A binding pairs a listen address with a target address:
//!
//! - `[bind_host]:bind_port::target_host:target_port`
//!
//! An empty `bind_host` listens on all IPv4 interfaces.
//!
//! # Examples
//!
//! ```rust
//! use bfwd::forwarding::spec::ForwardingSpec;
//!
//! // All interfaces, port 2222 -> internal.example.com:22
//! let spec = ForwardingSpec::parse(":2222::internal.example.com:22").unwrap();
//! assert_eq!(spec.bind_port, 2222);
//! assert_eq!(spec.target_host, "internal.example.com");
//!
//! // Loopback only
//! let spec = ForwardingSpec::parse("127.0.0.1:8080::10.0.0.5:80").unwrap();
//! assert_eq!(spec.bind_host, "127.0.0.1");
//! ```

use super::error::{ForwardingError, ForwardingResult};
use std::fmt;
use std::str::FromStr;

/// Separator between the listen half and the target half of a binding
const SPEC_SEPARATOR: &str = "::";

/// Host used when the bind host is left empty
const ANY_IPV4: &str = "0.0.0.0";

/// Host dialed when the target host is left empty
const LOCAL_HOST: &str = "127.0.0.1";

/// One configured binding: where to listen and where to relay to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForwardingSpec {
    /// Listen host; empty means all interfaces
    pub bind_host: String,
    /// Listen port; 0 asks the OS for an ephemeral port
    pub bind_port: u16,
    /// Target host name or address
    pub target_host: String,
    /// Target port
    pub target_port: u16,
}

impl ForwardingSpec {
    /// Build a specification from its parts
    pub fn new(
        bind_host: impl Into<String>,
        bind_port: u16,
        target_host: impl Into<String>,
        target_port: u16,
    ) -> Self {
        Self {
            bind_host: bind_host.into(),
            bind_port,
            target_host: target_host.into(),
            target_port,
        }
    }

    /// Parse a binding specification
    ///
    /// Format: `[bind_host]:bind_port::target_host:target_port`
    ///
    /// The input is split on the first `::`, then each half on its first `:`.
    /// Both ports must be decimal numbers that fit in a `u16`.
    pub fn parse(spec: &str) -> ForwardingResult<Self> {
        let (listen_part, target_part) = spec
            .split_once(SPEC_SEPARATOR)
            .ok_or_else(|| ForwardingError::invalid_spec(spec, "missing '::' separator"))?;

        let (bind_host, bind_port) = split_host_port(spec, listen_part, "bind")?;
        let (target_host, target_port) = split_host_port(spec, target_part, "target")?;

        Ok(Self {
            bind_host: bind_host.to_string(),
            bind_port,
            target_host: target_host.to_string(),
            target_port,
        })
    }

    /// Parse and validate every specification, failing on the first bad one
    pub fn parse_all<S: AsRef<str>>(specs: &[S]) -> ForwardingResult<Vec<Self>> {
        specs
            .iter()
            .map(|s| {
                let spec = Self::parse(s.as_ref())?;
                spec.validate()?;
                Ok(spec)
            })
            .collect()
    }

    /// Validate that a parsed specification can actually be served
    pub fn validate(&self) -> ForwardingResult<()> {
        if self.target_port == 0 {
            return Err(ForwardingError::invalid_spec(
                &self.to_string(),
                "target port cannot be 0",
            ));
        }
        Ok(())
    }

    /// Host the listener binds to
    pub fn listen_host(&self) -> &str {
        if self.bind_host.is_empty() {
            ANY_IPV4
        } else {
            &self.bind_host
        }
    }

    /// Host the handler dials
    pub fn dial_host(&self) -> &str {
        if self.target_host.is_empty() {
            LOCAL_HOST
        } else {
            &self.target_host
        }
    }

    /// Listen address in `host:port` form, for display and errors
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host(), self.bind_port)
    }

    /// Target address in `host:port` form, for display and errors
    pub fn target_addr(&self) -> String {
        format!("{}:{}", self.dial_host(), self.target_port)
    }

    /// Check if the bind port requires elevated privileges (< 1024)
    pub fn requires_root(&self) -> bool {
        self.bind_port != 0 && self.bind_port < 1024
    }
}

fn split_host_port<'a>(
    spec: &str,
    part: &'a str,
    side: &str,
) -> ForwardingResult<(&'a str, u16)> {
    let (host, port) = part
        .split_once(':')
        .ok_or_else(|| ForwardingError::invalid_spec(spec, format!("missing ':' in {side} address")))?;

    let port = port
        .parse::<u16>()
        .map_err(|_| ForwardingError::invalid_spec(spec, format!("invalid {side} port '{port}'")))?;

    Ok((host, port))
}

impl FromStr for ForwardingSpec {
    type Err = ForwardingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ForwardingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}::{}:{}",
            self.bind_host, self.bind_port, self.target_host, self.target_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_bind_host() {
        let spec = ForwardingSpec::parse(":2222::internal.example.com:22").unwrap();
        assert_eq!(spec.bind_host, "");
        assert_eq!(spec.bind_port, 2222);
        assert_eq!(spec.target_host, "internal.example.com");
        assert_eq!(spec.target_port, 22);
        assert_eq!(spec.listen_addr(), "0.0.0.0:2222");
    }

    #[test]
    fn test_parse_explicit_bind_host() {
        let spec = ForwardingSpec::parse("127.0.0.1:19999::127.0.0.1:19998").unwrap();
        assert_eq!(spec, ForwardingSpec::new("127.0.0.1", 19999, "127.0.0.1", 19998));
        assert_eq!(spec.target_addr(), "127.0.0.1:19998");
    }

    #[test]
    fn test_parse_via_from_str() {
        let spec: ForwardingSpec = "10.0.0.1:8080::backend:80".parse().unwrap();
        assert_eq!(spec.bind_host, "10.0.0.1");
        assert_eq!(spec.target_host, "backend");
    }

    #[test]
    fn test_display_round_trip() {
        for text in [":2222::internal.example.com:22", "127.0.0.1:80::web:8080"] {
            let spec = ForwardingSpec::parse(text).unwrap();
            assert_eq!(spec.to_string(), text);
        }
    }

    #[test]
    fn test_empty_target_host_dials_localhost() {
        let spec = ForwardingSpec::parse(":8080:::80").unwrap();
        assert_eq!(spec.target_host, "");
        assert_eq!(spec.dial_host(), "127.0.0.1");
    }

    #[test]
    fn test_invalid_specifications() {
        // Missing '::'
        assert!(ForwardingSpec::parse("127.0.0.1:80:host:22").is_err());
        assert!(ForwardingSpec::parse("invalid").is_err());
        // Missing ':' in either half
        assert!(ForwardingSpec::parse("8080::host:22").is_err());
        assert!(ForwardingSpec::parse(":8080::host").is_err());
        // Non-numeric ports
        assert!(ForwardingSpec::parse(":http::host:22").is_err());
        assert!(ForwardingSpec::parse(":8080::host:ssh").is_err());
        assert!(ForwardingSpec::parse(":::host:22").is_err());
        // Out of range
        assert!(ForwardingSpec::parse(":70000::host:22").is_err());
        assert!(ForwardingSpec::parse(":8080::host:-1").is_err());
    }

    #[test]
    fn test_error_names_offending_spec() {
        let err = ForwardingSpec::parse(":8080::host").unwrap_err();
        assert!(err.to_string().contains(":8080::host"));
    }

    #[test]
    fn test_parse_all() {
        let specs = ForwardingSpec::parse_all(&[":1::a:1", ":2::b:2"]).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].target_host, "b");

        let err = ForwardingSpec::parse_all(&[":1::a:1", "broken"]).unwrap_err();
        assert!(err.to_string().contains("broken"));

        assert!(ForwardingSpec::parse_all(&[":1::a:0"]).is_err());
    }

    #[test]
    fn test_requires_root() {
        assert!(ForwardingSpec::new("", 80, "web", 8080).requires_root());
        assert!(!ForwardingSpec::new("", 8080, "web", 80).requires_root());
        assert!(!ForwardingSpec::new("", 0, "web", 80).requires_root());
    }
}
