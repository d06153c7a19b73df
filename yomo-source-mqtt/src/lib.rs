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

//! MQTT source for YoMo.
//!
//! Subscribes to an MQTT topic, reshapes each JSON sensor payload into a
//! [`NoiseData`] record stamped with the local time and address, and streams
//! the result to a downstream YoMo zipper through a [`SourceWriter`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use yomo_source_mqtt::{NoiseHandler, Runner, SourceConfig, TcpWriter};
//!
//! let config = SourceConfig::builder("yomo-source", "localhost:9000", "localhost")
//!     .port(1883)
//!     .topic("sensors/#")
//!     .build();
//!
//! let writer = TcpWriter::new(&config.zipper_addr).with_timeout(config.zipper_timeout());
//! let runner = Runner::new(config, Arc::new(NoiseHandler), Arc::new(writer));
//! runner.run().await?;
//! ```

pub mod config;
pub mod handler;
pub mod mapper;
pub mod runner;
pub mod utils;
pub mod writer;

#[cfg(test)]
mod test_log;

pub use config::{SourceConfig, SourceConfigBuilder};
pub use handler::{Handler, NoiseHandler};
pub use mapper::{DecodeError, InboundReading, NoiseData};
pub use runner::Runner;
pub use writer::{SourceWriter, TcpWriter};
