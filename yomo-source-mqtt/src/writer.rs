// Copyright 2025 The YoMo Authors.
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

//! Outbound sink towards the downstream YoMo zipper.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Default bound on connecting to the zipper and on each write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Write-capable channel to the downstream stream-processing engine.
///
/// Implementations own any timeout or reconnect behaviour; callers never
/// retry.
#[async_trait]
pub trait SourceWriter: Send + Sync {
    /// Write `buf` downstream, returning the number of bytes written.
    async fn write(&self, buf: &[u8]) -> Result<usize>;
}

/// [`SourceWriter`] streaming buffers over a TCP connection to the zipper.
///
/// Connects on first write. Connect and send are each bounded by the
/// writer's timeout. A failed or timed-out write drops the connection so
/// that the next write dials again.
pub struct TcpWriter {
    addr: String,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpWriter {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
            stream: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl SourceWriter for TcpWriter {
    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut guard = self.stream.lock().await;

        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => {
                let stream = timeout(self.timeout, TcpStream::connect(&self.addr))
                    .await
                    .map_err(|_| {
                        anyhow!(
                            "connect to zipper at {} timed out after {:?}",
                            self.addr,
                            self.timeout
                        )
                    })?
                    .with_context(|| format!("failed to connect to zipper at {}", self.addr))?;
                info!("Connected to zipper at {}", self.addr);
                stream
            }
        };

        match timeout(self.timeout, send(&mut stream, buf)).await {
            Ok(Ok(())) => {
                *guard = Some(stream);
                Ok(buf.len())
            }
            Ok(Err(e)) => {
                debug!("Dropping zipper connection to {} after write error", self.addr);
                Err(anyhow::Error::new(e).context(format!("write to zipper at {} failed", self.addr)))
            }
            Err(_) => {
                debug!("Dropping zipper connection to {} after write timeout", self.addr);
                Err(anyhow!(
                    "write to zipper at {} timed out after {:?}",
                    self.addr,
                    self.timeout
                ))
            }
        }
    }
}

async fn send(stream: &mut TcpStream, buf: &[u8]) -> std::io::Result<()> {
    stream.write_all(buf).await?;
    stream.flush().await
}
