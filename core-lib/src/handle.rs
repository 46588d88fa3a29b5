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

//! The supervisory facade: the single object handed to plugin code.
//!
//! Two guards protect it. Registration methods demand a current plugin
//! (they only work while the reactor is delivering an event to a plugin),
//! and plugin management methods demand a reactor worker thread, so that
//! plugin-set mutations stay on the reactor serialization domain.

use std::cell::Cell;
use std::error;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::command::{ArgumentNode, CommandErrorKind, CommandSource};
use crate::info::{Info, InfoOrigin};
use crate::permission::{PermissionLevel, PermissionManager};
use crate::plugins::manager::{PluginManager, PluginOperationResult};
use crate::plugins::registry::{
    EventListener, HelpMessage, RegistryCell, GENERAL_INFO_EVENT,
};
use crate::rcon::RconManager;
use crate::reactor::{self, TaskExecutor};

/// A facade method was called from a context it does not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IllegalCall {
    /// A registration method was called while no plugin event was being
    /// delivered on this thread.
    NotInPluginScope,
    /// A plugin management method was called off the reactor worker
    /// threads.
    NotOnReactorThread,
    /// A plugin management method was called from inside another plugin
    /// operation on the same thread.
    ReentrantPluginOperation,
}

impl fmt::Display for IllegalCall {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IllegalCall::NotInPluginScope => {
                write!(f, "this method requires a current plugin; call it from a plugin event")
            }
            IllegalCall::NotOnReactorThread => {
                write!(f, "this method must run on a reactor worker thread")
            }
            IllegalCall::ReentrantPluginOperation => {
                write!(f, "plugin operations cannot be nested")
            }
        }
    }
}

impl error::Error for IllegalCall {}

/// The write half of the supervised process' standard input. The real I/O
/// pump lives outside the core.
pub trait ServerOutput: Send {
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

thread_local! {
    static IN_PLUGIN_OPERATION: Cell<bool> = Cell::new(false);
}

struct OperationGuard;

impl OperationGuard {
    fn enter() -> Result<OperationGuard, IllegalCall> {
        if IN_PLUGIN_OPERATION.with(|flag| flag.get()) {
            return Err(IllegalCall::ReentrantPluginOperation);
        }
        IN_PLUGIN_OPERATION.with(|flag| flag.set(true));
        Ok(OperationGuard)
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        IN_PLUGIN_OPERATION.with(|flag| flag.set(false));
    }
}

/// The interface plugins call into. Cheap to clone; every clone refers to
/// the same supervisor.
#[derive(Clone)]
pub struct ServerHandle {
    pub(crate) executor: Arc<TaskExecutor>,
    pub(crate) plugin_manager: Arc<Mutex<PluginManager>>,
    pub(crate) registry: Arc<RegistryCell>,
    pub(crate) output: Arc<Mutex<Box<dyn ServerOutput>>>,
    pub(crate) rcon: Arc<RconManager>,
    pub(crate) permissions: Arc<Mutex<PermissionManager>>,
    pub(crate) command_prefix: Arc<str>,
}

impl ServerHandle {
    // ------------------------------------------------------------------
    //  Text interaction
    // ------------------------------------------------------------------

    /// Writes one command line to the supervised process' standard input.
    pub fn execute(&self, text: &str) {
        debug!("executing {:?}", text);
        let mut output = self.output.lock().unwrap();
        if let Err(err) = output.write_line(text) {
            warn!("failed to write to the server process: {}", err);
        }
    }

    /// Sends a message to one player, serialized to the server's JSON text
    /// form.
    pub fn tell(&self, player: &str, message: &str) {
        let payload = Value::String(message.to_string()).to_string();
        self.execute(&format!("tellraw {} {}", player, payload));
    }

    /// Broadcasts a message to everyone in game.
    pub fn say(&self, message: &str) {
        self.tell("@a", message);
    }

    /// Replies to the source of an info record: players are told in game,
    /// console output goes to the log.
    pub fn reply(&self, info: &Info, message: &str) {
        match info.origin {
            InfoOrigin::Player(ref player) => self.tell(player, message),
            InfoOrigin::Console => info!("{}", message),
        }
    }

    // ------------------------------------------------------------------
    //  Events
    // ------------------------------------------------------------------

    /// Dispatches an event to all subscribed listeners. Runs inline when
    /// called from a reactor worker, otherwise the dispatch is enqueued.
    pub fn dispatch_event(&self, event: &str, args: Vec<Value>) {
        let event = event.to_string();
        self.executor.execute_or_enqueue(
            self,
            Box::new(move |handle| handle.dispatch_event_now(&event, &args)),
        );
    }

    /// Delivers one event against the current registry snapshot. Listener
    /// changes made during this dispatch take effect from the next event.
    pub(crate) fn dispatch_event_now(&self, event: &str, args: &[Value]) {
        debug!("dispatching event {:?}", event);
        let registry = self.registry.snapshot();
        for listener in registry.listeners_for(event) {
            let _scope = reactor::enter_plugin_scope(listener.scope().clone());
            listener.execute(self, args);
        }
    }

    /// Handles one info record: command execution first, then the general
    /// info event.
    pub(crate) fn process_info(&self, info: &Info) {
        if info.content.starts_with(self.command_prefix.as_ref()) {
            self.try_execute_command(info);
        }
        let payload = serde_json::to_value(info).unwrap_or(Value::Null);
        self.dispatch_event_now(GENERAL_INFO_EVENT, &[payload]);
    }

    fn try_execute_command(&self, info: &Info) {
        let source = info.to_command_source(self);
        let registry = self.registry.snapshot();
        for root in &registry.commands {
            match root.execute(source.as_ref(), &info.content) {
                Ok(()) => return,
                Err(ref err) if *err.kind() == CommandErrorKind::UnknownRootArgument => continue,
                Err(err) => {
                    source.reply(&err.to_string());
                    return;
                }
            }
        }
        source.reply(&format!("unknown command: {}", info.content));
    }

    // ------------------------------------------------------------------
    //  Plugin registry (requires a current plugin)
    // ------------------------------------------------------------------

    /// Registers an event listener for the current plugin.
    pub fn add_event_listener<F>(
        &self,
        event: &str,
        priority: i32,
        listener: F,
    ) -> Result<(), IllegalCall>
    where
        F: Fn(&ServerHandle, &[Value]) + Send + Sync + 'static,
    {
        let scope = reactor::current_plugin_scope().ok_or(IllegalCall::NotInPluginScope)?;
        let registry = scope.registry.clone();
        registry
            .lock()
            .unwrap()
            .add_event_listener(event, EventListener::new(scope, priority, Arc::new(listener)));
        Ok(())
    }

    /// Registers a command tree root for the current plugin.
    pub fn add_command(&self, root: ArgumentNode) -> Result<(), IllegalCall> {
        let scope = reactor::current_plugin_scope().ok_or(IllegalCall::NotInPluginScope)?;
        scope.registry.lock().unwrap().add_command(Arc::new(root));
        Ok(())
    }

    /// Registers a help entry for the current plugin.
    pub fn add_help_message(
        &self,
        prefix: &str,
        message: &str,
        permission: PermissionLevel,
    ) -> Result<(), IllegalCall> {
        let scope = reactor::current_plugin_scope().ok_or(IllegalCall::NotInPluginScope)?;
        let help = HelpMessage {
            plugin_id: scope.id.clone(),
            prefix: prefix.to_string(),
            message: message.to_string(),
            permission,
        };
        scope.registry.lock().unwrap().add_help_message(help);
        Ok(())
    }

    // ------------------------------------------------------------------
    //  Plugin management (requires a reactor worker thread)
    // ------------------------------------------------------------------

    pub fn load_plugin(&self, path: &std::path::Path) -> Result<PluginOperationResult, IllegalCall> {
        let path = path.to_path_buf();
        self.plugin_operation(move |manager, handle| manager.load_plugin(handle, &path))
    }

    pub fn unload_plugin(&self, plugin_id: &str) -> Result<PluginOperationResult, IllegalCall> {
        let plugin_id = plugin_id.to_string();
        self.plugin_operation(move |manager, handle| manager.unload_plugin(handle, &plugin_id))
    }

    pub fn reload_plugin(&self, plugin_id: &str) -> Result<PluginOperationResult, IllegalCall> {
        let plugin_id = plugin_id.to_string();
        self.plugin_operation(move |manager, handle| manager.reload_plugin(handle, &plugin_id))
    }

    pub fn enable_plugin(&self, path: &std::path::Path) -> Result<PluginOperationResult, IllegalCall> {
        let path = path.to_path_buf();
        self.plugin_operation(move |manager, handle| manager.enable_plugin(handle, &path))
    }

    pub fn disable_plugin(&self, plugin_id: &str) -> Result<PluginOperationResult, IllegalCall> {
        let plugin_id = plugin_id.to_string();
        self.plugin_operation(move |manager, handle| manager.disable_plugin(handle, &plugin_id))
    }

    pub fn refresh_all_plugins(&self) -> Result<PluginOperationResult, IllegalCall> {
        self.plugin_operation(|manager, handle| manager.refresh_all_plugins(handle))
    }

    pub fn refresh_changed_plugins(&self) -> Result<PluginOperationResult, IllegalCall> {
        self.plugin_operation(|manager, handle| manager.refresh_changed_plugins(handle))
    }

    fn plugin_operation<F>(&self, op: F) -> Result<PluginOperationResult, IllegalCall>
    where
        F: FnOnce(&mut PluginManager, &ServerHandle) -> PluginOperationResult,
    {
        if !reactor::is_reactor_thread() {
            return Err(IllegalCall::NotOnReactorThread);
        }
        let _guard = OperationGuard::enter()?;
        let mut manager = self.plugin_manager.lock().unwrap();
        Ok(op(&mut manager, self))
    }

    // ------------------------------------------------------------------
    //  Queries
    // ------------------------------------------------------------------

    /// Ids of the plugins contributing to the current registry snapshot.
    pub fn get_plugin_list(&self) -> Vec<String> {
        self.registry.snapshot().plugin_ids.clone()
    }

    /// A loaded plugin's export object, if any. Unavailable while a plugin
    /// operation is in flight.
    pub fn get_plugin_export(&self, plugin_id: &str) -> Option<Value> {
        let manager = self.plugin_manager.try_lock().ok()?;
        manager.plugin_export(plugin_id)
    }

    pub fn get_permission_level(&self, source: &dyn CommandSource) -> PermissionLevel {
        source.permission_level()
    }

    pub fn get_player_permission_level(&self, player: &str) -> PermissionLevel {
        self.permissions.lock().unwrap().get_player_level(player)
    }

    pub fn set_permission_level(&self, player: &str, level: PermissionLevel) {
        self.permissions.lock().unwrap().set_player_level(player, level);
    }

    /// Queries the remote console. `None` when rcon is not connected or
    /// the query failed.
    pub fn rcon_query(&self, command: &str) -> Option<String> {
        self.rcon.send_command(command)
    }

    pub fn is_rcon_running(&self) -> bool {
        self.rcon.is_running()
    }
}
