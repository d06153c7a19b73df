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

//! Per-message handlers invoked by the [`Runner`](crate::Runner).

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{error, info, warn};

use crate::mapper::{self, NoiseData};
use crate::utils;
use crate::writer::SourceWriter;

/// Callback invoked once for every MQTT message on the subscribed topic.
///
/// The returned error goes back to the runner, which owns any drop or
/// retry decision.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, topic: &str, payload: &[u8], writer: &dyn SourceWriter) -> Result<()>;
}

/// Reshapes `{"noise": <int>}` readings into [`NoiseData`] and forwards them.
///
/// Stateless: safe to call concurrently for distinct messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseHandler;

#[async_trait]
impl Handler for NoiseHandler {
    async fn handle(&self, topic: &str, payload: &[u8], writer: &dyn SourceWriter) -> Result<()> {
        info!(
            "receive: topic={topic}, payload={}",
            String::from_utf8_lossy(payload)
        );

        // A bad payload still produces a record, with noise 0.
        let (reading, decode_err) = mapper::decode(payload);
        if let Some(e) = decode_err {
            warn!("Unmarshal payload error: {e}");
        }

        let data = NoiseData::from_reading(&reading, utils::now_ms(), utils::ip_addr());
        let sending_buf = data.encode().context("failed to encode noise data")?;

        if let Err(e) = writer.write(&sending_buf).await {
            error!(
                "stream.Write error: {e}, sendingBuf=0x{}",
                hex::encode(&sending_buf)
            );
            return Err(e);
        }

        info!("write: sendingBuf={}", String::from_utf8_lossy(&sending_buf));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_log;
    use log::Level;
    use std::sync::Mutex;

    const TARGET: &str = "yomo_source_mqtt::handler";

    #[derive(Default)]
    struct RecordingWriter {
        writes: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingWriter {
        fn writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SourceWriter for RecordingWriter {
        async fn write(&self, buf: &[u8]) -> Result<usize> {
            self.writes.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }
    }

    struct FailingWriter;

    #[async_trait]
    impl SourceWriter for FailingWriter {
        async fn write(&self, _buf: &[u8]) -> Result<usize> {
            Err(anyhow::anyhow!("zipper unavailable"))
        }
    }

    fn parse(buf: &[u8]) -> NoiseData {
        serde_json::from_slice(buf).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_noise_with_time_and_address() {
        let writer = RecordingWriter::default();
        let before = utils::now_ms();

        NoiseHandler
            .handle("sensors/room1", br#"{"noise":46}"#, &writer)
            .await
            .unwrap();

        let after = utils::now_ms();
        let writes = writer.writes();
        assert_eq!(writes.len(), 1);

        let data = parse(&writes[0]);
        assert_eq!(data.noise, 46.0);
        assert!(data.time >= before && data.time <= after);
        assert_eq!(data.from, utils::ip_addr());
    }

    #[tokio::test]
    async fn test_missing_noise_forwards_zero() {
        let writer = RecordingWriter::default();
        NoiseHandler.handle("sensors/room1", b"{}", &writer).await.unwrap();

        let data = parse(&writer.writes()[0]);
        assert_eq!(data.noise, 0.0);
        assert!(!data.from.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_still_forwards() {
        let writer = RecordingWriter::default();
        NoiseHandler
            .handle("sensors/room1", b"not json", &writer)
            .await
            .unwrap();

        let writes = writer.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(parse(&writes[0]).noise, 0.0);
    }

    #[tokio::test]
    async fn test_repeated_calls_share_address_and_advance_time() {
        let writer = RecordingWriter::default();
        for _ in 0..3 {
            NoiseHandler
                .handle("sensors/room1", br#"{"noise":1}"#, &writer)
                .await
                .unwrap();
        }

        let records: Vec<NoiseData> = writer.writes().iter().map(|b| parse(b)).collect();
        assert_eq!(records.len(), 3);
        for pair in records.windows(2) {
            assert!(pair[1].time >= pair[0].time);
            assert_eq!(pair[1].from, pair[0].from);
        }
    }

    #[tokio::test]
    async fn test_write_error_is_returned_unchanged() {
        let err = NoiseHandler
            .handle("sensors/room1", br#"{"noise":46}"#, &FailingWriter)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "zipper unavailable");
    }

    #[tokio::test]
    async fn test_success_logs_receipt_and_write_only() {
        test_log::start();
        let writer = RecordingWriter::default();

        NoiseHandler
            .handle("sensors/room1", br#"{"noise":46}"#, &writer)
            .await
            .unwrap();

        let logs = test_log::take(TARGET);
        assert_eq!(logs.len(), 2, "unexpected log lines: {logs:?}");
        assert_eq!(logs[0].level, Level::Info);
        assert_eq!(logs[0].message, r#"receive: topic=sensors/room1, payload={"noise":46}"#);
        assert_eq!(logs[1].level, Level::Info);
        let sent = String::from_utf8(writer.writes()[0].clone()).unwrap();
        assert_eq!(logs[1].message, format!("write: sendingBuf={sent}"));
    }

    #[tokio::test]
    async fn test_malformed_payload_logs_decode_error() {
        test_log::start();
        let writer = RecordingWriter::default();

        NoiseHandler
            .handle("sensors/room1", b"not json", &writer)
            .await
            .unwrap();

        let logs = test_log::take(TARGET);
        assert_eq!(logs.len(), 3, "unexpected log lines: {logs:?}");
        assert_eq!(logs[0].message, "receive: topic=sensors/room1, payload=not json");
        assert_eq!(logs[1].level, Level::Warn);
        assert!(
            logs[1].message.starts_with("Unmarshal payload error: invalid JSON"),
            "unexpected decode log: {}",
            logs[1].message
        );
        assert!(logs[2].message.starts_with("write: sendingBuf="));
    }

    #[tokio::test]
    async fn test_write_error_logs_attempted_buffer() {
        test_log::start();

        NoiseHandler
            .handle("sensors/room1", br#"{"noise":46}"#, &FailingWriter)
            .await
            .unwrap_err();

        let logs = test_log::take(TARGET);
        assert_eq!(logs.len(), 2, "unexpected log lines: {logs:?}");
        assert_eq!(logs[1].level, Level::Error);

        let dump = logs[1]
            .message
            .strip_prefix("stream.Write error: zipper unavailable, sendingBuf=0x")
            .unwrap_or_else(|| panic!("unexpected write error log: {}", logs[1].message));
        let attempted = parse(&hex::decode(dump).unwrap());
        assert_eq!(attempted.noise, 46.0);
        assert_eq!(attempted.from, utils::ip_addr());
        assert!(!logs.iter().any(|l| l.message.starts_with("write:")));
    }
}
