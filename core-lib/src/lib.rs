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

//! The main library for the warden supervisor daemon.
//!
//! Warden wraps a long-running game server process: it parses the child's
//! textual output into events, dispatches them to hot-reloadable plugins
//! through a bounded reactor, and exposes a typed command tree DSL for
//! in-game administration. The binary crate wires the outward seams (the
//! child process I/O pump, the plugin subprocess loader, the rcon wire
//! client); everything in here is process-agnostic and testable in-place.

#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate serde_json;
extern crate toml;
extern crate warden_rpc;

#[cfg(test)]
extern crate tempdir;

pub mod command;
pub mod config;
pub mod handle;
pub mod info;
pub mod permission;
pub mod plugins;
pub mod rcon;
pub mod reactor;
pub mod supervisor;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::command::{
    ArgumentNode, CommandContext, CommandError, CommandErrorKind, CommandSource,
    IllegalNodeOperation, ParsedValue,
};
pub use crate::config::Config;
pub use crate::handle::{IllegalCall, ServerHandle, ServerOutput};
pub use crate::info::{Info, InfoOrigin};
pub use crate::permission::PermissionLevel;
pub use crate::plugins::manager::PluginOperationResult;
pub use crate::plugins::process::ProcessUnitLoader;
pub use crate::supervisor::Supervisor;
pub use crate::version::{Version, VersionParsingError, VersionRequirement};
