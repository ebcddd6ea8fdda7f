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

//! Per-connection handling for forwarding units
//!
//! A handler owns one accepted inbound socket: it dials the target, runs the
//! [`Tunnel`] and publishes the session's accounting. Dial and relay errors
//! stop at this boundary; they are logged and counted, never returned to the
//! accept loop.

use super::error::ConnectionError;
use super::spec::ForwardingSpec;
use super::stats::{ConnectionGuard, ForwardingStats};
use super::tunnel::{Tunnel, TunnelStats};
use super::ForwardingConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Dispatches accepted connections of one forwarding unit
#[derive(Debug, Clone)]
pub struct ConnectionHandler {
    spec: Arc<ForwardingSpec>,
    stats: Arc<ForwardingStats>,
    config: ForwardingConfig,
}

impl ConnectionHandler {
    pub fn new(
        spec: Arc<ForwardingSpec>,
        stats: Arc<ForwardingStats>,
        config: ForwardingConfig,
    ) -> Self {
        Self {
            spec,
            stats,
            config,
        }
    }

    /// Spawn a handler task for an accepted connection
    ///
    /// The accept loop does not wait on the returned handle.
    pub fn spawn(&self, inbound: TcpStream, peer_addr: SocketAddr, conn_id: u64) -> JoinHandle<()> {
        let handler = self.clone();
        tokio::spawn(async move { handler.handle(inbound, peer_addr, conn_id).await })
    }

    /// Handle a single connection from start to teardown
    pub async fn handle(&self, inbound: TcpStream, peer_addr: SocketAddr, conn_id: u64) {
        // Dropped last: sockets close first, then the session is accounted
        let mut guard = ConnectionGuard::new(conn_id, Arc::clone(&self.stats));

        if let Err(e) = self.relay(inbound, peer_addr, &mut guard).await {
            warn!("{} Client {} {}", conn_id, peer_addr, e);
        }
    }

    async fn relay(
        &self,
        inbound: TcpStream,
        peer_addr: SocketAddr,
        guard: &mut ConnectionGuard,
    ) -> Result<(), ConnectionError> {
        let outbound = dial(&self.spec, self.config.connect_timeout).await?;

        match outbound.local_addr() {
            Ok(via) => info!(
                "{} Client {} connected to host {} via {}",
                guard.conn_id(),
                peer_addr,
                self.spec.dial_host(),
                via
            ),
            Err(_) => info!(
                "{} Client {} connected to host {}",
                guard.conn_id(),
                peer_addr,
                self.spec.dial_host()
            ),
        }

        let tunnel_stats = TunnelStats::new();
        let result = Tunnel::run(inbound, outbound, &tunnel_stats, self.config.buffer_size).await;
        guard.record(tunnel_stats.bytes_up(), tunnel_stats.bytes_down());

        debug!(
            "{} Tunnel for {} finished after {:?}",
            guard.conn_id(),
            peer_addr,
            tunnel_stats.duration()
        );

        result
    }
}

/// Dial the target of `spec`, giving up after `timeout`
pub async fn dial(spec: &ForwardingSpec, timeout: Duration) -> Result<TcpStream, ConnectionError> {
    let connect = TcpStream::connect((spec.dial_host(), spec.target_port));

    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ConnectionError::Dial {
            target: spec.target_addr(),
            source,
        }),
        Err(_) => Err(ConnectionError::DialTimeout {
            target: spec.target_addr(),
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpSocket};
    use tokio::time::timeout;

    /// A port nothing listens on: bind, read the port, release it
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    /// A listener whose accept queue is full, so further connects hang
    async fn saturated_listener() -> (TcpListener, Vec<TcpStream>) {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut queued = Vec::new();
        let wait = Duration::from_millis(200);
        while let Ok(Ok(stream)) = timeout(wait, TcpStream::connect(addr)).await {
            queued.push(stream);
            assert!(queued.len() < 64, "accept queue never filled");
        }
        (listener, queued)
    }

    async fn accepted_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (inbound, peer) = accepted.unwrap();
        (client.unwrap(), inbound, peer)
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let port = closed_port().await;
        let spec = ForwardingSpec::new("127.0.0.1", 0, "127.0.0.1", port);

        let err = dial(&spec, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Dial { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }

    #[tokio::test]
    async fn test_dial_failure_is_accounted() {
        let port = closed_port().await;
        let spec = Arc::new(ForwardingSpec::new("127.0.0.1", 0, "127.0.0.1", port));
        let stats = Arc::new(ForwardingStats::new());
        let handler = ConnectionHandler::new(spec, Arc::clone(&stats), ForwardingConfig::default());

        let (mut client, inbound, peer) = accepted_pair().await;
        handler.handle(inbound, peer, 1).await;

        assert_eq!(stats.active(), 0);
        assert_eq!(stats.total_handled(), 1);

        // The inbound side was closed by the handler
        let mut buf = [0u8; 4];
        assert_eq!(client.read(&mut buf).await.unwrap_or(0), 0);
    }

    #[tokio::test]
    async fn test_handler_relays_and_accounts() {
        let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target_port = target.local_addr().unwrap().port();
        let spec = Arc::new(ForwardingSpec::new("127.0.0.1", 0, "127.0.0.1", target_port));
        let stats = Arc::new(ForwardingStats::new());
        let handler = ConnectionHandler::new(spec, Arc::clone(&stats), ForwardingConfig::default());

        let (mut client, inbound, peer) = accepted_pair().await;
        let task = handler.spawn(inbound, peer, 42);

        let (mut upstream, _) = target.accept().await.unwrap();
        assert_eq!(stats.active(), 1);

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        upstream.read_exact(&mut buf).await.unwrap();
        upstream.write_all(b"hi").await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();

        drop(client);
        task.await.unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.bytes_up, 5);
        assert_eq!(snapshot.bytes_down, 2);
        assert_eq!(snapshot.active, 0);
        assert_eq!(snapshot.total_handled, 1);
    }

    #[tokio::test]
    async fn test_dial_timeout_is_accounted() {
        let (listener, _queued) = saturated_listener().await;
        let port = listener.local_addr().unwrap().port();
        let spec = Arc::new(ForwardingSpec::new("127.0.0.1", 0, "127.0.0.1", port));

        let err = dial(&spec, Duration::from_millis(300)).await.unwrap_err();
        assert!(matches!(err, ConnectionError::DialTimeout { .. }));

        let stats = Arc::new(ForwardingStats::new());
        let config = ForwardingConfig::default().with_connect_timeout(Duration::from_millis(300));
        let handler = ConnectionHandler::new(spec, Arc::clone(&stats), config);

        let (mut client, inbound, peer) = accepted_pair().await;
        handler.handle(inbound, peer, 1).await;

        assert_eq!(stats.active(), 0);
        assert_eq!(stats.total_handled(), 1);
        let mut buf = [0u8; 4];
        assert_eq!(client.read(&mut buf).await.unwrap_or(0), 0);
    }
}
