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

//! Permission levels and the per-player permission table.
//!
//! Persistence of the table is the business of an outer layer; the core
//! only keeps the in-memory mapping.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

/// The ordered permission levels a command source can hold.
///
/// Levels can be referred to by name (case insensitive) or by their number,
/// `0` through `4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Guest = 0,
    User = 1,
    Helper = 2,
    Admin = 3,
    Owner = 4,
}

pub const MINIMUM_PERMISSION_LEVEL: PermissionLevel = PermissionLevel::Guest;
pub const CONSOLE_PERMISSION_LEVEL: PermissionLevel = PermissionLevel::Owner;

impl PermissionLevel {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            PermissionLevel::Guest => "guest",
            PermissionLevel::User => "user",
            PermissionLevel::Helper => "helper",
            PermissionLevel::Admin => "admin",
            PermissionLevel::Owner => "owner",
        }
    }

    pub fn from_value(value: u64) -> Option<PermissionLevel> {
        match value {
            0 => Some(PermissionLevel::Guest),
            1 => Some(PermissionLevel::User),
            2 => Some(PermissionLevel::Helper),
            3 => Some(PermissionLevel::Admin),
            4 => Some(PermissionLevel::Owner),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<PermissionLevel> {
        match name.to_ascii_lowercase().as_str() {
            "guest" => Some(PermissionLevel::Guest),
            "user" => Some(PermissionLevel::User),
            "helper" => Some(PermissionLevel::Helper),
            "admin" => Some(PermissionLevel::Admin),
            "owner" => Some(PermissionLevel::Owner),
            _ => None,
        }
    }

    /// Accepts a level given as a JSON number, a numeric string, or a name.
    pub fn from_json(value: &Value) -> Option<PermissionLevel> {
        match value {
            Value::Number(n) => n.as_u64().and_then(PermissionLevel::from_value),
            Value::String(s) => match s.parse::<u64>() {
                Ok(n) => PermissionLevel::from_value(n),
                Err(_) => PermissionLevel::from_name(s),
            },
            _ => None,
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The in-memory player permission table.
pub struct PermissionManager {
    default_level: PermissionLevel,
    players: HashMap<String, PermissionLevel>,
}

impl PermissionManager {
    pub fn new(default_level: PermissionLevel) -> Self {
        PermissionManager { default_level, players: HashMap::new() }
    }

    pub fn get_player_level(&self, player: &str) -> PermissionLevel {
        self.players.get(player).copied().unwrap_or(self.default_level)
    }

    pub fn set_player_level(&mut self, player: &str, level: PermissionLevel) {
        info!("permission level of {} set to {}", player, level);
        self.players.insert(player.to_string(), level);
    }

    pub fn remove_player(&mut self, player: &str) {
        self.players.remove(player);
    }
}
