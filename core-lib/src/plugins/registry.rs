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

//! Per-plugin registries and the process-wide aggregate.
//!
//! Every plugin owns a `PluginRegistry` holding what it declared: command
//! tree roots, event listeners and help entries. After each plugin-set
//! change the manager merges them into a fresh `PluginManagerRegistry` and
//! swaps it in atomically, so a concurrent event dispatch observes either
//! the old or the new aggregate, never a partial one.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::command::ArgumentNode;
use crate::handle::ServerHandle;
use crate::permission::PermissionLevel;
use crate::reactor::PluginScope;

/// Priority assigned to listeners that do not ask for one. Lower fires
/// first.
pub const DEFAULT_LISTENER_PRIORITY: i32 = 1000;

/// Dispatched to a plugin right after it becomes ready; args are
/// `[old_export_or_null]`.
pub const PLUGIN_LOAD_EVENT: &str = "plugin_load";
/// Dispatched to a plugin as it is being evicted; args are empty.
pub const PLUGIN_UNLOAD_EVENT: &str = "plugin_unload";
/// Dispatched for every info record from the supervised process; args are
/// `[info]`.
pub const GENERAL_INFO_EVENT: &str = "info";

/// The callable of an event listener.
pub type ListenerCallback = Arc<dyn Fn(&ServerHandle, &[Value]) + Send + Sync>;

/// One registered event listener. Carries its owning plugin's scope so
/// dispatch can establish the current-plugin slot without consulting the
/// plugin manager.
#[derive(Clone)]
pub struct EventListener {
    scope: PluginScope,
    pub priority: i32,
    callback: ListenerCallback,
}

impl EventListener {
    pub fn new(scope: PluginScope, priority: i32, callback: ListenerCallback) -> Self {
        EventListener { scope, priority, callback }
    }

    pub fn plugin_id(&self) -> &str {
        &self.scope.id
    }

    pub fn scope(&self) -> &PluginScope {
        &self.scope
    }

    /// Invokes the listener, containing panics so siblings still run.
    pub fn execute(&self, handle: &ServerHandle, args: &[Value]) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(handle, args)));
        if let Err(payload) = result {
            error!(
                "listener of plugin {} panicked: {}",
                self.scope.id,
                describe_panic(payload.as_ref())
            );
        }
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("plugin", &self.scope.id)
            .field("priority", &self.priority)
            .finish()
    }
}

fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A help entry shown by the built-in help command.
#[derive(Debug, Clone)]
pub struct HelpMessage {
    pub plugin_id: String,
    pub prefix: String,
    pub message: String,
    pub permission: PermissionLevel,
}

/// What one plugin has registered. Cleared when the plugin is removed.
#[derive(Default)]
pub struct PluginRegistry {
    pub commands: Vec<Arc<ArgumentNode>>,
    pub event_listeners: HashMap<String, Vec<EventListener>>,
    pub help_messages: Vec<HelpMessage>,
}

impl PluginRegistry {
    pub fn add_command(&mut self, root: Arc<ArgumentNode>) {
        self.commands.push(root);
    }

    pub fn add_event_listener(&mut self, event: &str, listener: EventListener) {
        self.event_listeners.entry(event.to_string()).or_insert_with(Vec::new).push(listener);
    }

    pub fn add_help_message(&mut self, help: HelpMessage) {
        self.help_messages.push(help);
    }

    /// Listeners for one event in firing order. A stable sort keeps
    /// insertion order among equal priorities.
    pub fn listeners_for(&self, event: &str) -> Vec<EventListener> {
        let mut listeners =
            self.event_listeners.get(event).cloned().unwrap_or_default();
        listeners.sort_by_key(|listener| listener.priority);
        listeners
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.event_listeners.clear();
        self.help_messages.clear();
    }
}

/// The merged view over every loaded plugin's registry.
#[derive(Default)]
pub struct PluginManagerRegistry {
    pub event_listeners: HashMap<String, Vec<EventListener>>,
    pub commands: Vec<Arc<ArgumentNode>>,
    pub help_messages: Vec<HelpMessage>,
    /// Ids of the plugins that contributed, in collection order.
    pub plugin_ids: Vec<String>,
}

impl PluginManagerRegistry {
    pub fn collect(&mut self, plugin_id: &str, registry: &PluginRegistry) {
        self.plugin_ids.push(plugin_id.to_string());
        self.commands.extend(registry.commands.iter().cloned());
        self.help_messages.extend(registry.help_messages.iter().cloned());
        for (event, listeners) in &registry.event_listeners {
            self.event_listeners
                .entry(event.clone())
                .or_insert_with(Vec::new)
                .extend(listeners.iter().cloned());
        }
    }

    /// Sorts every listener list. Must run after the last `collect`.
    pub fn arrange(&mut self) {
        for listeners in self.event_listeners.values_mut() {
            listeners.sort_by_key(|listener| listener.priority);
        }
    }

    pub fn listeners_for(&self, event: &str) -> &[EventListener] {
        self.event_listeners.get(event).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Holder of the current aggregate, swapped wholesale on rebuild.
pub struct RegistryCell(Mutex<Arc<PluginManagerRegistry>>);

impl RegistryCell {
    pub fn new() -> Self {
        RegistryCell(Mutex::new(Arc::new(PluginManagerRegistry::default())))
    }

    /// The current aggregate. Dispatch holds the `Arc`, so an in-flight
    /// event keeps observing the snapshot it started with.
    pub fn snapshot(&self) -> Arc<PluginManagerRegistry> {
        self.0.lock().unwrap().clone()
    }

    pub fn swap(&self, registry: Arc<PluginManagerRegistry>) {
        *self.0.lock().unwrap() = registry;
    }
}

impl Default for RegistryCell {
    fn default() -> Self {
        RegistryCell::new()
    }
}
