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

//! Forwarding unit: one listener relaying to one target
//!
//! ```text
//! [Client] → [Listener] → [Handler task] → [Target Host:Port]
//!              ↑ bind_host:bind_port          ↑ target_host:target_port
//! ```
//!
//! The listener is bound exactly once in [`PortForwarder::bind`]. The accept
//! loop hands every connection to its own task and never waits for one to
//! finish; there is no cap on concurrent connections.

use super::error::{ForwardingError, ForwardingResult};
use super::handler::ConnectionHandler;
use super::manager::ConnectionIdGenerator;
use super::spec::ForwardingSpec;
use super::stats::ForwardingStats;
use super::ForwardingConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// A bound forwarding unit
#[derive(Debug)]
pub struct PortForwarder {
    spec: Arc<ForwardingSpec>,
    listener: TcpListener,
    local_addr: SocketAddr,
    ids: Arc<ConnectionIdGenerator>,
    stats: Arc<ForwardingStats>,
    handler: ConnectionHandler,
}

impl PortForwarder {
    /// Bind the listener for `spec`
    ///
    /// Connection ids are drawn from `ids`, which is shared with every other
    /// unit of the process.
    pub async fn bind(
        spec: ForwardingSpec,
        ids: Arc<ConnectionIdGenerator>,
        config: ForwardingConfig,
    ) -> ForwardingResult<Self> {
        let listener = TcpListener::bind((spec.listen_host(), spec.bind_port))
            .await
            .map_err(|source| {
                if spec.requires_root() {
                    warn!(
                        "Port {} is privileged; binding it may require elevated permissions",
                        spec.bind_port
                    );
                }
                ForwardingError::Bind {
                    addr: spec.listen_addr(),
                    source,
                }
            })?;

        let local_addr = listener.local_addr().map_err(|source| ForwardingError::Bind {
            addr: spec.listen_addr(),
            source,
        })?;

        let spec = Arc::new(spec);
        let stats = Arc::new(ForwardingStats::new());
        let handler = ConnectionHandler::new(Arc::clone(&spec), Arc::clone(&stats), config);

        info!("Listening {} -> {}", local_addr, spec.target_addr());

        Ok(Self {
            spec,
            listener,
            local_addr,
            ids,
            stats,
            handler,
        })
    }

    pub fn spec(&self) -> &ForwardingSpec {
        &self.spec
    }

    /// Address the listener actually bound, with ephemeral ports resolved
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handle to this unit's counters
    pub fn stats(&self) -> Arc<ForwardingStats> {
        Arc::clone(&self.stats)
    }

    /// Accept connections forever
    ///
    /// Only returns when `accept` itself fails; the caller treats that as
    /// fatal for the process.
    pub async fn run(self) -> ForwardingResult<()> {
        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(source) => {
                    error!("Error accepting connection on {}: {}", self.local_addr, source);
                    return Err(ForwardingError::Accept {
                        addr: self.local_addr,
                        source,
                    });
                }
            };

            let conn_id = self.ids.next_id();
            info!("{} Accepted from {} to {}", conn_id, peer_addr, self.local_addr);

            // Fire and forget; the handler owns all per-connection cleanup
            self.handler.spawn(stream, peer_addr, conn_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let spec = ForwardingSpec::new("127.0.0.1", 0, "127.0.0.1", 9);
        let forwarder = PortForwarder::bind(
            spec.clone(),
            Arc::new(ConnectionIdGenerator::new()),
            ForwardingConfig::default(),
        )
        .await
        .unwrap();

        assert_ne!(forwarder.local_addr().port(), 0);
        assert_eq!(forwarder.spec(), &spec);
        assert_eq!(forwarder.stats().snapshot().total_handled, 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let spec = ForwardingSpec::new("127.0.0.1", port, "127.0.0.1", 9);
        let err = PortForwarder::bind(
            spec,
            Arc::new(ConnectionIdGenerator::new()),
            ForwardingConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ForwardingError::Bind { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }

    #[tokio::test]
    async fn test_accept_loop_forwards() {
        let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target_port = target.local_addr().unwrap().port();

        let forwarder = PortForwarder::bind(
            ForwardingSpec::new("127.0.0.1", 0, "127.0.0.1", target_port),
            Arc::new(ConnectionIdGenerator::new()),
            ForwardingConfig::default(),
        )
        .await
        .unwrap();
        let addr = forwarder.local_addr();
        let unit = tokio::spawn(forwarder.run());

        let mut client = TcpStream::connect(addr).await.unwrap();
        let (mut upstream, _) = target.accept().await.unwrap();

        client.write_all(b"abc").await.unwrap();
        let mut buf = [0u8; 3];
        upstream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");

        unit.abort();
    }
}
