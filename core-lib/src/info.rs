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

//! The `Info` record emitted by the child process I/O pump.
//!
//! The pump itself (pty capture, line framing, encoding) lives outside the
//! core; the core only consumes the structured records it produces.

use crate::command::CommandSource;
use crate::handle::ServerHandle;
use crate::permission::{PermissionLevel, CONSOLE_PERMISSION_LEVEL};

/// Where a line of input came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfoOrigin {
    Console,
    Player(String),
}

/// One structured record from the supervised process' I/O stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub origin: InfoOrigin,
    /// The logical text, e.g. the chat message with decorations stripped.
    pub content: String,
    /// The raw line as read from the stream.
    pub raw: String,
}

impl Info {
    pub fn console<S: Into<String>>(content: S) -> Info {
        let content = content.into();
        Info { origin: InfoOrigin::Console, raw: content.clone(), content }
    }

    pub fn player<N: Into<String>, S: Into<String>>(player: N, content: S) -> Info {
        let content = content.into();
        Info { origin: InfoOrigin::Player(player.into()), raw: content.clone(), content }
    }

    pub fn is_player(&self) -> bool {
        matches!(self.origin, InfoOrigin::Player(_))
    }

    pub fn player_name(&self) -> Option<&str> {
        match self.origin {
            InfoOrigin::Player(ref name) => Some(name),
            InfoOrigin::Console => None,
        }
    }

    /// Project this record to a command source that can execute commands
    /// and receive replies.
    pub fn to_command_source(&self, handle: &ServerHandle) -> Box<dyn CommandSource> {
        match self.origin {
            InfoOrigin::Console => Box::new(ConsoleSource),
            InfoOrigin::Player(ref name) => {
                Box::new(PlayerSource { name: name.clone(), handle: handle.clone() })
            }
        }
    }
}

/// The daemon console. Replies go to the log; permission is absolute.
pub struct ConsoleSource;

impl CommandSource for ConsoleSource {
    fn name(&self) -> &str {
        "console"
    }

    fn is_player(&self) -> bool {
        false
    }

    fn permission_level(&self) -> PermissionLevel {
        CONSOLE_PERMISSION_LEVEL
    }

    fn reply(&self, message: &str) {
        info!("{}", message);
    }
}

/// An in-game player; replies are routed through the server's tell command.
pub struct PlayerSource {
    name: String,
    handle: ServerHandle,
}

impl CommandSource for PlayerSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_player(&self) -> bool {
        true
    }

    fn permission_level(&self) -> PermissionLevel {
        self.handle.get_player_permission_level(&self.name)
    }

    fn reply(&self, message: &str) {
        self.handle.tell(&self.name, message);
    }
}
