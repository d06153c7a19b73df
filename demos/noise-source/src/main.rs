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

//! Noise source: reads `{"noise": <int>}` readings from MQTT and streams
//! them to a YoMo zipper.
//!
//! Configured through `YOMO_SOURCE_MQTT_ZIPPER_ADDR` and
//! `YOMO_SOURCE_MQTT_SERVER_ADDR` (plus the optional `YOMO_SOURCE_MQTT_*`
//! variables understood by [`SourceConfig::from_env`]).

use std::sync::Arc;

use anyhow::Result;
use log::info;
use yomo_source_mqtt::{NoiseHandler, Runner, SourceConfig, TcpWriter};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = SourceConfig::from_env()?;
    info!("Starting {} ...", config.name);

    let writer = TcpWriter::new(&config.zipper_addr).with_timeout(config.zipper_timeout());
    let runner = Runner::new(config, Arc::new(NoiseHandler), Arc::new(writer));

    // Runs until Ctrl-C.
    runner.run().await?;

    info!("{} stopped", runner.name());
    Ok(())
}
