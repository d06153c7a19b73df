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

//! Configuration types for the MQTT source runner.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use rumqttc::QoS;
use serde::Deserialize;

pub const DEFAULT_NAME: &str = "yomo-source";
pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_TOPIC: &str = "#";
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
pub const DEFAULT_QOS: u8 = 1;
pub const DEFAULT_ZIPPER_TIMEOUT_MS: u64 = 5_000;

pub const ENV_ZIPPER_ADDR: &str = "YOMO_SOURCE_MQTT_ZIPPER_ADDR";
pub const ENV_SERVER_ADDR: &str = "YOMO_SOURCE_MQTT_SERVER_ADDR";
pub const ENV_TOPIC: &str = "YOMO_SOURCE_MQTT_TOPIC";
pub const ENV_NAME: &str = "YOMO_SOURCE_MQTT_NAME";
pub const ENV_CLIENT_ID: &str = "YOMO_SOURCE_MQTT_CLIENT_ID";
pub const ENV_USERNAME: &str = "YOMO_SOURCE_MQTT_USERNAME";
pub const ENV_PASSWORD: &str = "YOMO_SOURCE_MQTT_PASSWORD";
pub const ENV_ZIPPER_TIMEOUT_MS: &str = "YOMO_SOURCE_MQTT_ZIPPER_TIMEOUT_MS";

/// Configuration for the MQTT source runner.
///
/// Deserialized configs only need `zipper_addr` and `broker_host`; every
/// other field falls back to the same default as the builder.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Name identifying this source to the zipper and in logs.
    #[serde(default = "default_name")]
    pub name: String,
    /// Downstream zipper address (`host:port`).
    pub zipper_addr: String,
    /// Bound on connecting to and writing to the zipper, in milliseconds
    /// (default: 5000).
    #[serde(default = "default_zipper_timeout_ms")]
    pub zipper_timeout_ms: u64,
    /// MQTT broker hostname or IP.
    pub broker_host: String,
    /// MQTT broker port (default: 1883).
    #[serde(default = "default_port")]
    pub port: u16,
    /// MQTT topic filter to subscribe to (default: `"#"`).
    #[serde(default = "default_topic")]
    pub topic: String,
    /// MQTT client ID. Defaults to `"{name}-{uuid}"`.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Optional MQTT username, used only together with `password`.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional MQTT password.
    #[serde(default)]
    pub password: Option<String>,
    /// MQTT keep-alive interval in seconds (default: 30).
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Subscription QoS level, 0..=2 (default: 1).
    #[serde(default = "default_qos")]
    pub qos: u8,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_zipper_timeout_ms() -> u64 {
    DEFAULT_ZIPPER_TIMEOUT_MS
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_client_id() -> String {
    client_id_for(DEFAULT_NAME)
}

fn default_keep_alive_secs() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}

fn default_qos() -> u8 {
    DEFAULT_QOS
}

fn client_id_for(name: &str) -> String {
    format!("{name}-{}", uuid::Uuid::new_v4())
}

impl SourceConfig {
    /// Start building a new config with the required fields.
    pub fn builder(
        name: impl Into<String>,
        zipper_addr: impl Into<String>,
        broker_host: impl Into<String>,
    ) -> SourceConfigBuilder {
        let name = name.into();
        SourceConfigBuilder {
            client_id: client_id_for(&name),
            name,
            zipper_addr: zipper_addr.into(),
            zipper_timeout_ms: DEFAULT_ZIPPER_TIMEOUT_MS,
            broker_host: broker_host.into(),
            port: DEFAULT_PORT,
            topic: DEFAULT_TOPIC.to_string(),
            username: None,
            password: None,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            qos: DEFAULT_QOS,
        }
    }

    /// Load the config from `YOMO_SOURCE_MQTT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the config through an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let zipper_addr = var(ENV_ZIPPER_ADDR).ok_or_else(|| anyhow!("{ENV_ZIPPER_ADDR} not set"))?;
        let server_addr = var(ENV_SERVER_ADDR).ok_or_else(|| anyhow!("{ENV_SERVER_ADDR} not set"))?;
        let (broker_host, port) = parse_server_addr(&server_addr)
            .with_context(|| format!("invalid {ENV_SERVER_ADDR}"))?;
        let name = var(ENV_NAME).unwrap_or_else(|| DEFAULT_NAME.to_string());

        let mut builder = SourceConfig::builder(name, zipper_addr, broker_host).port(port);
        if let Some(topic) = var(ENV_TOPIC) {
            builder = builder.topic(topic);
        }
        if let Some(client_id) = var(ENV_CLIENT_ID) {
            builder = builder.client_id(client_id);
        }
        if let Some(username) = var(ENV_USERNAME) {
            builder = builder.username(username);
        }
        if let Some(password) = var(ENV_PASSWORD) {
            builder = builder.password(password);
        }
        if let Some(ms) = var(ENV_ZIPPER_TIMEOUT_MS) {
            let ms = ms
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid {ENV_ZIPPER_TIMEOUT_MS} '{ms}'"))?;
            builder = builder.zipper_timeout_ms(ms);
        }
        Ok(builder.build())
    }

    pub fn zipper_timeout(&self) -> Duration {
        Duration::from_millis(self.zipper_timeout_ms)
    }

    pub fn qos(&self) -> Result<QoS> {
        match self.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => bail!("invalid MQTT QoS {other}"),
        }
    }
}

/// Split a broker address such as `tcp://localhost:1883` into host and port.
///
/// The scheme is optional and the port defaults to 1883. IPv6 hosts must be
/// bracketed, e.g. `[::1]:1883`; the brackets are stripped from the host.
pub fn parse_server_addr(addr: &str) -> Result<(String, u16)> {
    let addr = addr.trim();
    let addr = ["tcp://", "mqtt://"]
        .iter()
        .find_map(|scheme| addr.strip_prefix(scheme))
        .unwrap_or(addr)
        .trim_end_matches('/');

    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("unterminated '[' in '{addr}'"))?;
        let port = match tail {
            "" => None,
            _ => Some(
                tail.strip_prefix(':')
                    .ok_or_else(|| anyhow!("unexpected '{tail}' after ']' in '{addr}'"))?,
            ),
        };
        (host, port)
    } else {
        match addr.rsplit_once(':') {
            Some((host, _)) if host.contains(':') => {
                bail!("IPv6 host must be bracketed, e.g. '[::1]:1883', got '{addr}'")
            }
            Some((host, port)) => (host, Some(port)),
            None => (addr, None),
        }
    };

    let port = match port {
        Some(port) => port
            .parse::<u16>()
            .with_context(|| format!("invalid port '{port}'"))?,
        None => DEFAULT_PORT,
    };

    if host.is_empty() {
        bail!("missing host in '{addr}'");
    }
    Ok((host.to_string(), port))
}

/// Builder for [`SourceConfig`].
pub struct SourceConfigBuilder {
    name: String,
    zipper_addr: String,
    zipper_timeout_ms: u64,
    broker_host: String,
    port: u16,
    topic: String,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
    keep_alive_secs: u64,
    qos: u8,
}

impl SourceConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn zipper_timeout_ms(mut self, ms: u64) -> Self {
        self.zipper_timeout_ms = ms;
        self
    }

    pub fn keep_alive_secs(mut self, secs: u64) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    pub fn qos(mut self, qos: u8) -> Self {
        self.qos = qos;
        self
    }

    /// Build the config.
    pub fn build(self) -> SourceConfig {
        SourceConfig {
            name: self.name,
            zipper_addr: self.zipper_addr,
            zipper_timeout_ms: self.zipper_timeout_ms,
            broker_host: self.broker_host,
            port: self.port,
            topic: self.topic,
            client_id: self.client_id,
            username: self.username,
            password: self.password,
            keep_alive_secs: self.keep_alive_secs,
            qos: self.qos,
        }
    }
}
