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

//! Runner owning the MQTT subscription and feeding messages to a [`Handler`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use log::{error, info, warn};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, Publish};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::SourceConfig;
use crate::handler::Handler;
use crate::writer::SourceWriter;

const CHANNEL_CAPACITY: usize = 100;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Subscribes to the configured MQTT topic and invokes the handler for every
/// publish, one message at a time, with the shared [`SourceWriter`].
///
/// Handler errors are logged and the message is dropped; the connection to
/// the broker is re-established by rumqttc on the next poll. The event loop
/// is not polled while a message is being handled, so writers must bound
/// their own latency well below the MQTT keep-alive. A shutdown request
/// interrupts an in-flight message.
pub struct Runner {
    config: SourceConfig,
    handler: Arc<dyn Handler>,
    writer: Arc<dyn SourceWriter>,
    /// MQTT client handle (set on start, cleared on stop).
    client: Arc<RwLock<Option<AsyncClient>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Messages whose handler returned an error.
    dropped: Arc<AtomicU64>,
}

impl Runner {
    pub fn new(
        config: SourceConfig,
        handler: Arc<dyn Handler>,
        writer: Arc<dyn SourceWriter>,
    ) -> Self {
        Self {
            config,
            handler,
            writer,
            client: Arc::new(RwLock::new(None)),
            shutdown_tx: Mutex::new(None),
            task: Mutex::new(None),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Number of messages dropped because the handler failed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Connect to the broker and spawn the event loop.
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            bail!("[{}] runner already started", self.config.name);
        }

        let qos = self.config.qos()?;
        info!(
            "[{}] Starting MQTT source (broker={}:{}, topic={}, zipper={})",
            self.config.name,
            self.config.broker_host,
            self.config.port,
            self.config.topic,
            self.config.zipper_addr
        );

        let mut mqtt_opts = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker_host,
            self.config.port,
        );
        mqtt_opts.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            mqtt_opts.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, CHANNEL_CAPACITY);
        *self.client.write().await = Some(client.clone());

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let name = self.config.name.clone();
        let topic = self.config.topic.clone();
        let handler = self.handler.clone();
        let writer = self.writer.clone();
        let dropped = self.dropped.clone();

        let handle = tokio::spawn(async move {
            info!("[{name}] MQTT event loop started");
            'events: loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => {
                        info!("[{name}] Shutdown signal received");
                        break;
                    }
                    event = eventloop.poll() => {
                        match event {
                            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                                // Subscribe on every connect so reconnects with a
                                // clean session keep receiving.
                                match client.try_subscribe(&topic, qos) {
                                    Ok(()) => info!("[{name}] Subscribed to topic: {topic}"),
                                    Err(e) => error!("[{name}] MQTT subscribe failed: {e}"),
                                }
                            }
                            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                                tokio::select! {
                                    biased;
                                    _ = &mut shutdown_rx => {
                                        warn!(
                                            "[{name}] Shutdown signal received while handling message on topic '{}'",
                                            publish.topic
                                        );
                                        break 'events;
                                    }
                                    handled = dispatch(&name, handler.as_ref(), writer.as_ref(), &publish) => {
                                        if !handled {
                                            dropped.fetch_add(1, Ordering::Relaxed);
                                        }
                                    }
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("[{name}] MQTT connection error (will reconnect): {e}");
                                tokio::select! {
                                    biased;
                                    _ = &mut shutdown_rx => {
                                        info!("[{name}] Shutdown signal received");
                                        break 'events;
                                    }
                                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                                }
                            }
                        }
                    }
                }
            }
        });

        *task = Some(handle);
        info!("[{}] MQTT source started", self.config.name);
        Ok(())
    }

    /// Disconnect from the broker and wait for the event loop to finish.
    pub async fn stop(&self) -> Result<()> {
        if let Some(client) = self.client.write().await.take() {
            let _ = client.disconnect().await;
        }
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                error!("[{}] MQTT event loop task failed: {e}", self.config.name);
            }
        }
        info!("[{}] MQTT source stopped", self.config.name);
        Ok(())
    }

    /// Run until `signal` completes, then stop.
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.stop().await
    }

    /// Run until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {e}");
            }
        })
        .await
    }
}

/// Hand one publish to the handler. Returns whether it succeeded.
async fn dispatch(
    name: &str,
    handler: &dyn Handler,
    writer: &dyn SourceWriter,
    publish: &Publish,
) -> bool {
    match handler.handle(&publish.topic, &publish.payload, writer).await {
        Ok(()) => true,
        Err(e) => {
            error!(
                "[{name}] Failed to handle message on topic '{}': {e:#}",
                publish.topic
            );
            false
        }
    }
}
