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

//! Bidirectional data tunneling between two TCP connections
//!
//! This module provides the byte pump used by every forwarded connection.
//!
//! # Architecture
//!
//! The tunnel consists of two concurrent tasks:
//! - **Up**: Reads from the inbound socket, writes to the outbound socket
//! - **Down**: Reads from the outbound socket, writes to the inbound socket
//!
//! When either task reaches end-of-stream or an error, it shuts down the
//! socket it was writing to and signals its sibling to stop, so closing one
//! side tears the whole connection down. The tunnel only returns after both
//! tasks have finished, which keeps the byte counters final by the time the
//! caller reads them.

use super::error::ConnectionError;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Statistics for a tunnel session
#[derive(Debug)]
pub struct TunnelStats {
    /// Bytes transferred from inbound to outbound
    pub bytes_up: Arc<AtomicU64>,
    /// Bytes transferred from outbound to inbound
    pub bytes_down: Arc<AtomicU64>,
    /// Start time of the tunnel
    pub started_at: Instant,
    /// Number of I/O errors encountered
    pub error_count: Arc<AtomicU64>,
}

impl Default for TunnelStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelStats {
    pub fn new() -> Self {
        Self {
            bytes_up: Arc::new(AtomicU64::new(0)),
            bytes_down: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
            error_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn bytes_up(&self) -> u64 {
        self.bytes_up.load(Ordering::Relaxed)
    }

    pub fn bytes_down(&self) -> u64 {
        self.bytes_down.load(Ordering::Relaxed)
    }

    /// Get total bytes transferred in both directions
    pub fn total_bytes(&self) -> u64 {
        self.bytes_up() + self.bytes_down()
    }

    /// Get duration since tunnel started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Get error count
    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

/// Bidirectional tunnel between an inbound and an outbound TCP connection
pub struct Tunnel;

impl Tunnel {
    /// Relay data between `inbound` and `outbound` until both directions end
    ///
    /// Byte counts accumulate into `stats` as data moves, so they stay valid
    /// when a direction fails midway. An error in either direction is
    /// reported as [`ConnectionError::Relay`] after both tasks have joined.
    pub async fn run(
        inbound: TcpStream,
        outbound: TcpStream,
        stats: &TunnelStats,
        buffer_size: usize,
    ) -> Result<(), ConnectionError> {
        let (inbound_read, inbound_write) = inbound.into_split();
        let (outbound_read, outbound_write) = outbound.into_split();
        let done = CancellationToken::new();

        trace!("Starting bidirectional tunnel");

        let up = tokio::spawn(pump(
            inbound_read,
            outbound_write,
            Arc::clone(&stats.bytes_up),
            done.clone(),
            buffer_size,
        ));
        let down = tokio::spawn(pump(
            outbound_read,
            inbound_write,
            Arc::clone(&stats.bytes_down),
            done.clone(),
            buffer_size,
        ));

        // Join, never race: counters are final only once both tasks are done
        let (up_result, down_result) = tokio::join!(up, down);

        let mut first_error = None;
        for (direction, result) in [("up", flatten(up_result)), ("down", flatten(down_result))] {
            if let Err(e) = result {
                stats.error_count.fetch_add(1, Ordering::Relaxed);
                debug!("Tunnel {} direction failed: {}", direction, e);
                first_error.get_or_insert(e);
            }
        }

        debug!(
            "Tunnel completed: {} bytes up, {} bytes down, {} errors, duration: {:?}",
            stats.bytes_up(),
            stats.bytes_down(),
            stats.errors(),
            stats.duration()
        );

        match first_error {
            Some(e) => Err(ConnectionError::Relay(e)),
            None => Ok(()),
        }
    }
}

fn flatten(result: Result<io::Result<()>, JoinError>) -> io::Result<()> {
    result.unwrap_or_else(|e| Err(io::Error::other(e)))
}

/// Peer went away; treated as a normal end of stream
fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

/// Copy one direction until EOF, error or sibling shutdown
async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    counter: Arc<AtomicU64>,
    done: CancellationToken,
    buffer_size: usize,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size];

    let result = 'copy: loop {
        let n = tokio::select! {
            read = reader.read(&mut buffer) => match read {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(e),
            },
            _ = done.cancelled() => break Ok(()),
        };

        let mut offset = 0;
        while offset < n {
            let written = tokio::select! {
                written = writer.write(&buffer[offset..n]) => match written {
                    Ok(0) => break 'copy Err(io::ErrorKind::WriteZero.into()),
                    Ok(written) => written,
                    Err(e) => break 'copy Err(e),
                },
                _ = done.cancelled() => break 'copy Ok(()),
            };

            // Counted per write so a chunk cut short still shows up
            counter.fetch_add(written as u64, Ordering::Relaxed);
            offset += written;
        }
    };

    if let Err(e) = writer.shutdown().await {
        trace!("Shutdown after copy failed: {}", e);
    }
    done.cancel();

    match result {
        Err(e) if is_disconnect(&e) => {
            trace!("Peer closed connection: {}", e);
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    /// Returns (our end, their end) of a loopback connection
    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[test]
    fn test_tunnel_stats() {
        let stats = TunnelStats::new();

        assert_eq!(stats.total_bytes(), 0);
        assert_eq!(stats.errors(), 0);

        stats.bytes_up.store(100, Ordering::Relaxed);
        stats.bytes_down.store(200, Ordering::Relaxed);
        stats.error_count.store(1, Ordering::Relaxed);

        assert_eq!(stats.total_bytes(), 300);
        assert_eq!(stats.errors(), 1);
    }

    #[tokio::test]
    async fn test_tunnel_counts_each_direction() {
        // client <-> [inbound | tunnel | outbound] <-> target
        let (mut client, inbound) = socket_pair().await;
        let (outbound, mut target) = socket_pair().await;

        let stats = Arc::new(TunnelStats::new());
        let tunnel_stats = Arc::clone(&stats);
        let tunnel = tokio::spawn(async move {
            Tunnel::run(inbound, outbound, &tunnel_stats, 1024).await
        });

        let upload = vec![0xabu8; 5000];
        client.write_all(&upload).await.unwrap();
        let mut received = vec![0u8; upload.len()];
        target.read_exact(&mut received).await.unwrap();
        assert_eq!(received, upload);

        target.write_all(b"response").await.unwrap();
        let mut reply = [0u8; 8];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"response");

        drop(client);
        tunnel.await.unwrap().unwrap();

        assert_eq!(stats.bytes_up(), 5000);
        assert_eq!(stats.bytes_down(), 8);
        assert_eq!(stats.errors(), 0);
    }

    #[tokio::test]
    async fn test_inbound_close_closes_outbound() {
        let (client, inbound) = socket_pair().await;
        let (outbound, mut target) = socket_pair().await;

        let stats = TunnelStats::new();
        drop(client);
        Tunnel::run(inbound, outbound, &stats, 1024).await.unwrap();

        // Target observes end-of-stream even though it never wrote anything
        let mut buf = [0u8; 16];
        let n = target.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(stats.total_bytes(), 0);
    }

    #[tokio::test]
    async fn test_outbound_close_closes_inbound() {
        let (mut client, inbound) = socket_pair().await;
        let (outbound, mut target) = socket_pair().await;

        let stats = Arc::new(TunnelStats::new());
        let tunnel_stats = Arc::clone(&stats);
        let tunnel = tokio::spawn(async move {
            Tunnel::run(inbound, outbound, &tunnel_stats, 1024).await
        });

        target.write_all(b"bye").await.unwrap();
        target.shutdown().await.unwrap();
        drop(target);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");

        tunnel.await.unwrap().unwrap();
        assert_eq!(stats.bytes_down(), 3);
    }

    #[tokio::test]
    async fn test_chunk_cut_short_is_counted() {
        let (mut client, inbound) = socket_pair().await;
        let (outbound, mut target) = socket_pair().await;

        let stats = Arc::new(TunnelStats::new());
        let tunnel_stats = Arc::clone(&stats);
        let tunnel = tokio::spawn(async move {
            Tunnel::run(inbound, outbound, &tunnel_stats, 64 * 1024).await
        });

        // Target does not read, so the up direction stalls mid-chunk
        let flood = tokio::spawn(async move {
            let chunk = vec![0x5au8; 64 * 1024];
            while client.write_all(&chunk).await.is_ok() {}
        });
        sleep(Duration::from_millis(500)).await;

        // Closing the down direction cancels the stalled up direction
        target.shutdown().await.unwrap();

        let mut delivered = 0u64;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            match target.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => delivered += n as u64,
            }
        }

        let _ = tunnel.await.unwrap();
        flood.abort();

        assert!(delivered > 0);
        assert_eq!(stats.bytes_up(), delivered);
    }
}
