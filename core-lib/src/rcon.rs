// Copyright 2026 The Warden Authors.
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

//! The remote-console side channel.
//!
//! The wire client is an external collaborator behind the [`RconClient`]
//! trait; this manager owns at most one of them behind a lock and makes
//! sure no failure escapes: a dead or absent connection means `None`.

use std::io;
use std::sync::Mutex;

/// A connected remote-console client.
pub trait RconClient: Send {
    fn send_command(&mut self, command: &str) -> io::Result<String>;
    fn disconnect(&mut self) -> io::Result<()>;
}

pub struct RconManager {
    client: Mutex<Option<Box<dyn RconClient>>>,
}

impl RconManager {
    pub fn new() -> Self {
        RconManager { client: Mutex::new(None) }
    }

    pub fn is_running(&self) -> bool {
        self.client.lock().unwrap().is_some()
    }

    /// Installs a connected client, replacing (and disconnecting) any
    /// previous one.
    pub fn attach(&self, client: Box<dyn RconClient>) {
        let mut slot = self.client.lock().unwrap();
        if let Some(mut old) = slot.take() {
            if let Err(err) = old.disconnect() {
                warn!("failed to disconnect previous rcon client: {}", err);
            }
        }
        info!("rcon connected");
        *slot = Some(client);
    }

    pub fn disconnect(&self) {
        let mut slot = self.client.lock().unwrap();
        if let Some(mut client) = slot.take() {
            match client.disconnect() {
                Ok(()) => info!("rcon disconnected"),
                Err(err) => warn!("failed to disconnect rcon: {}", err),
            }
        }
    }

    /// Sends a command, synchronously. Returns `None` when rcon is not
    /// connected or the query failed.
    pub fn send_command(&self, command: &str) -> Option<String> {
        let mut slot = self.client.lock().unwrap();
        match slot.as_mut() {
            Some(client) => match client.send_command(command) {
                Ok(response) => Some(response),
                Err(err) => {
                    warn!("rcon query {:?} failed: {}", command, err);
                    None
                }
            },
            None => None,
        }
    }
}

impl Default for RconManager {
    fn default() -> Self {
        RconManager::new()
    }
}
