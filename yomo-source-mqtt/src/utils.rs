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

//! Process-wide clock and network identity queries.

use std::net::{Ipv4Addr, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::debug;

/// Address used only to pick the outbound interface; no packet is sent.
const PROBE_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 80);

const FALLBACK_ADDR: &str = "127.0.0.1";

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0));
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

/// Local IPv4 address of the interface used for outbound traffic.
///
/// Connecting a UDP socket only resolves a route, so this works offline as
/// long as a default route exists. Falls back to the loopback address.
pub fn ip_addr() -> String {
    match outbound_addr() {
        Ok(addr) => addr,
        Err(e) => {
            debug!("Failed to resolve outbound address, using {FALLBACK_ADDR}: {e}");
            FALLBACK_ADDR.to_string()
        }
    }
}

fn outbound_addr() -> std::io::Result<String> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(PROBE_ADDR)?;
    Ok(socket.local_addr()?.ip().to_string())
}
