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

//! Plugin units backed by child processes.
//!
//! A plugin file is launched with piped stdio and spoken to over the
//! warden RPC protocol:
//!
//! - `initialize` (daemon → plugin, request): the response carries the
//!   metadata dictionary plus declarative registrations (listeners,
//!   command trees, help entries).
//! - `plugin_load` / `plugin_unload` (daemon → plugin, request): lifecycle
//!   events, forwarded synchronously; a `plugin_load` response may carry
//!   further registrations.
//! - `event` (daemon → plugin, notification): every other event.
//! - `command` (daemon → plugin, notification): a terminal command
//!   callback fired, with the parsed context.
//! - `export` (daemon → plugin, request): state to carry across a reload.
//! - facade calls (plugin → daemon): `execute`, `tell`, `say`,
//!   `dispatch_event` as notifications; `rcon_query`,
//!   `get_permission_level`, `set_permission_level`, `get_plugin_list`,
//!   `get_plugin_export` as requests.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use serde_json::Value;

use warden_rpc::{Handler, RemoteError, RpcCall, RpcLoop, RpcPeer};

use crate::command::ArgumentNode;
use crate::handle::ServerHandle;
use crate::permission::{PermissionLevel, MINIMUM_PERMISSION_LEVEL};
use super::registry::{DEFAULT_LISTENER_PRIORITY, PLUGIN_LOAD_EVENT, PLUGIN_UNLOAD_EVENT};
use super::{PluginUnit, UnitError, UnitLoader};

/// Spawns plugin executables and speaks the RPC protocol to them.
pub struct ProcessUnitLoader {
    /// Interpreter to run plugin files with, e.g. `python3`. When absent
    /// the plugin file itself must be executable.
    interpreter: Option<PathBuf>,
}

impl ProcessUnitLoader {
    pub fn new(interpreter: Option<PathBuf>) -> Self {
        ProcessUnitLoader { interpreter }
    }
}

impl UnitLoader for ProcessUnitLoader {
    fn load_unit(
        &self,
        path: &Path,
        handle: &ServerHandle,
    ) -> Result<Box<dyn PluginUnit>, UnitError> {
        debug!("starting plugin process for {}", path.display());
        let mut command = match self.interpreter {
            Some(ref interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(path);
                command
            }
            None => Command::new(path),
        };
        let mut child = command.stdin(Stdio::piped()).stdout(Stdio::piped()).spawn()?;
        let child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| UnitError::Protocol("plugin process has no stdin".to_string()))?;
        let child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| UnitError::Protocol("plugin process has no stdout".to_string()))?;

        let mut rpc_loop = RpcLoop::new(Box::new(child_stdin));
        let peer = rpc_loop.get_peer();
        let mut facade = FacadeHandler { handle: handle.clone() };
        let name = format!(
            "plugin-rpc-{}",
            path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
        );
        let reader = thread::Builder::new().name(name).spawn(move || {
            if let Err(err) = rpc_loop.mainloop(|| BufReader::new(child_stdout), &mut facade) {
                warn!("plugin rpc stream ended abnormally: {}", err);
            }
        })?;

        // handshake; blocks until the unit answers or its stream closes
        let response = peer.send_rpc_request("initialize", &json!({}))?;
        let init: InitResponse = serde_json::from_value(response)
            .map_err(|err| UnitError::Protocol(format!("bad initialize response: {}", err)))?;

        Ok(Box::new(ProcessUnit { peer, child, reader: Some(reader), init }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Registrations {
    listeners: Vec<ListenerDecl>,
    commands: Vec<Value>,
    help: Vec<HelpDecl>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InitResponse {
    metadata: Value,
    #[serde(flatten)]
    registrations: Registrations,
}

#[derive(Debug, Deserialize)]
struct ListenerDecl {
    event: String,
    #[serde(default)]
    priority: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct HelpDecl {
    prefix: String,
    message: String,
    #[serde(default)]
    permission: Option<Value>,
}

struct ProcessUnit {
    peer: RpcPeer,
    child: Child,
    reader: Option<thread::JoinHandle<()>>,
    init: InitResponse,
}

impl PluginUnit for ProcessUnit {
    fn metadata(&self) -> Result<Value, UnitError> {
        Ok(self.init.metadata.clone())
    }

    fn bootstrap(&mut self, handle: &ServerHandle) -> Result<(), UnitError> {
        apply_registrations(handle, &self.peer, &self.init.registrations)
    }

    fn export(&self) -> Option<Value> {
        match self.peer.send_rpc_request("export", &json!({})) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(err) => {
                debug!("plugin offered no export: {}", err);
                None
            }
        }
    }

    fn teardown(&mut self) {
        self.peer.send_rpc_notification("shutdown", &json!({}));
        if let Err(err) = self.child.kill() {
            debug!("plugin process already exited: {}", err);
        }
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for ProcessUnit {
    fn drop(&mut self) {
        if self.reader.is_some() {
            self.teardown();
        }
    }
}

/// Turns declarative registrations into facade calls. Runs inside the
/// plugin's scope, either at bootstrap or while a `plugin_load` listener
/// is executing.
fn apply_registrations(
    handle: &ServerHandle,
    peer: &RpcPeer,
    registrations: &Registrations,
) -> Result<(), UnitError> {
    for decl in &registrations.listeners {
        let priority = decl.priority.unwrap_or(DEFAULT_LISTENER_PRIORITY);
        let callback = listener_callback(peer.clone(), decl.event.clone());
        handle
            .add_event_listener(&decl.event, priority, callback)
            .map_err(|err| UnitError::Protocol(err.to_string()))?;
    }
    for decl in &registrations.commands {
        let root = build_command_node(decl, peer)?;
        handle.add_command(root).map_err(|err| UnitError::Protocol(err.to_string()))?;
    }
    for decl in &registrations.help {
        let permission = decl
            .permission
            .as_ref()
            .and_then(PermissionLevel::from_json)
            .unwrap_or(MINIMUM_PERMISSION_LEVEL);
        handle
            .add_help_message(&decl.prefix, &decl.message, permission)
            .map_err(|err| UnitError::Protocol(err.to_string()))?;
    }
    Ok(())
}

/// The forwarding callable registered for one declared listener.
///
/// Lifecycle events go out as synchronous requests: the plugin must have
/// handled `plugin_load` before the operation continues (its response may
/// register more), and `plugin_unload` must be acknowledged before the
/// process is killed. Everything else is fire-and-forget.
fn listener_callback(
    peer: RpcPeer,
    event: String,
) -> impl Fn(&ServerHandle, &[Value]) + Send + Sync {
    move |handle, args| {
        if event == PLUGIN_LOAD_EVENT {
            let old = args.get(0).cloned().unwrap_or(Value::Null);
            match peer.send_rpc_request("plugin_load", &json!({ "old": old })) {
                Ok(response) => match serde_json::from_value::<Registrations>(response) {
                    Ok(more) => {
                        if let Err(err) = apply_registrations(handle, &peer, &more) {
                            warn!("late registrations rejected: {}", err);
                        }
                    }
                    Err(err) => debug!("plugin_load response carried no registrations: {}", err),
                },
                Err(err) => warn!("plugin failed to handle plugin_load: {}", err),
            }
        } else if event == PLUGIN_UNLOAD_EVENT {
            if let Err(err) = peer.send_rpc_request("plugin_unload", &json!({})) {
                debug!("plugin did not acknowledge plugin_unload: {}", err);
            }
        } else {
            peer.send_rpc_notification("event", &json!({ "event": event, "args": args }));
        }
    }
}

/// Builds a real argument node tree from its JSON declaration.
///
/// A literal node is `{"literal": "!!word"}` (or a list of words); an
/// argument node is `{"type": "integer", "name": "n"}` with optional
/// `min`/`max` and `allow_empty`. Any node may carry `children`, a
/// `permission` gate and a `runs` callback id.
fn build_command_node(decl: &Value, peer: &RpcPeer) -> Result<ArgumentNode, UnitError> {
    let protocol = |msg: String| UnitError::Protocol(msg);
    let obj = decl
        .as_object()
        .ok_or_else(|| protocol("command declaration must be an object".to_string()))?;

    let mut node = if let Some(literal) = obj.get("literal") {
        let words: Vec<String> = match literal {
            Value::String(word) => vec![word.clone()],
            Value::Array(words) => {
                words.iter().filter_map(Value::as_str).map(String::from).collect()
            }
            other => {
                return Err(protocol(format!("bad literal declaration: {}", other)));
            }
        };
        if words.is_empty() || words.iter().any(|w| w.is_empty() || w.contains(' ')) {
            return Err(protocol(format!("bad literal keywords: {:?}", words)));
        }
        ArgumentNode::literals(words)
    } else {
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| protocol("argument node requires a type".to_string()))?;
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| protocol("argument node requires a name".to_string()))?;
        let mut node = match kind {
            "integer" => ArgumentNode::integer(name),
            "float" => ArgumentNode::float(name),
            "number" => ArgumentNode::number(name),
            "text" => ArgumentNode::text(name),
            "quotable_text" => ArgumentNode::quotable_text(name),
            "greedy_text" => ArgumentNode::greedy_text(name),
            other => return Err(protocol(format!("unknown node type {:?}", other))),
        };
        if matches!(kind, "integer" | "float" | "number") {
            let min = obj.get("min").and_then(Value::as_f64);
            let max = obj.get("max").and_then(Value::as_f64);
            if let (Some(min), Some(max)) = (min, max) {
                node = node.in_range(min, max);
            }
        }
        if kind == "quotable_text" && obj.get("allow_empty").and_then(Value::as_bool) == Some(true)
        {
            node = node.allow_empty();
        }
        node
    };

    if let Some(permission) = obj.get("permission") {
        match PermissionLevel::from_json(permission) {
            Some(level) => {
                node = node.requires(move |source| source.permission_level() >= level);
            }
            None => return Err(protocol(format!("bad permission gate: {}", permission))),
        }
    }

    if let Some(callback_id) = obj.get("runs").and_then(Value::as_str) {
        let peer = peer.clone();
        let callback_id = callback_id.to_string();
        node = node.runs(move |source, context| {
            peer.send_rpc_notification(
                "command",
                &json!({
                    "callback": callback_id,
                    "source": { "name": source.name(), "is_player": source.is_player() },
                    "context": context,
                }),
            );
        });
    }

    if let Some(children) = obj.get("children").and_then(Value::as_array) {
        for child in children {
            let child_node = build_command_node(child, peer)?;
            node = node.then(child_node).map_err(|err| protocol(err.to_string()))?;
        }
    }
    Ok(node)
}

/// Serves facade calls arriving from the plugin process. Runs on the
/// plugin's RPC reader thread; anything that must happen on the reactor
/// is enqueued by the facade itself.
struct FacadeHandler {
    handle: ServerHandle,
}

impl Handler for FacadeHandler {
    fn handle_notification(&mut self, rpc: RpcCall) {
        let params = &rpc.params;
        match rpc.method.as_str() {
            "execute" => {
                if let Some(text) = params.get("text").and_then(Value::as_str) {
                    self.handle.execute(text);
                }
            }
            "tell" => {
                let player = params.get("player").and_then(Value::as_str);
                let message = params.get("message").and_then(Value::as_str);
                if let (Some(player), Some(message)) = (player, message) {
                    self.handle.tell(player, message);
                }
            }
            "say" => {
                if let Some(message) = params.get("message").and_then(Value::as_str) {
                    self.handle.say(message);
                }
            }
            "dispatch_event" => {
                let event = params.get("event").and_then(Value::as_str);
                let args = params
                    .get("args")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                if let Some(event) = event {
                    self.handle.dispatch_event(event, args);
                }
            }
            other => warn!("unknown notification {:?} from plugin", other),
        }
    }

    fn handle_request(&mut self, rpc: RpcCall) -> Result<Value, RemoteError> {
        let params = &rpc.params;
        let missing = || RemoteError::InvalidParams(None);
        match rpc.method.as_str() {
            "rcon_query" => {
                let command = params.get("command").and_then(Value::as_str).ok_or_else(missing)?;
                Ok(self.handle.rcon_query(command).map(Value::String).unwrap_or(Value::Null))
            }
            "get_permission_level" => {
                let player = params.get("player").and_then(Value::as_str).ok_or_else(missing)?;
                Ok(json!(self.handle.get_player_permission_level(player).value()))
            }
            "set_permission_level" => {
                let player = params.get("player").and_then(Value::as_str).ok_or_else(missing)?;
                let level = params
                    .get("level")
                    .and_then(PermissionLevel::from_json)
                    .ok_or_else(missing)?;
                self.handle.set_permission_level(player, level);
                Ok(Value::Null)
            }
            "get_plugin_list" => Ok(json!(self.handle.get_plugin_list())),
            "get_plugin_export" => {
                let plugin_id = params.get("id").and_then(Value::as_str).ok_or_else(missing)?;
                Ok(self.handle.get_plugin_export(plugin_id).unwrap_or(Value::Null))
            }
            _ => Err(RemoteError::MethodNotFound(None)),
        }
    }
}
