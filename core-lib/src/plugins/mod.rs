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

//! Plugins and their lifecycle.
//!
//! A plugin is one file on disk, realized at runtime by a [`PluginUnit`]:
//! an addressable code unit with a metadata record and registration
//! callbacks. The production unit is a child process speaking the warden
//! RPC protocol (see [`process`]); tests substitute local units.
//!
//! State machine: `Uninitialized → Loading → Loaded → Ready → Unloading →
//! Unloaded`, with `Loading → Unloading` on load failure. No other
//! transitions are legal.

pub mod dep_walker;
pub mod manager;
pub mod metadata;
pub mod process;
pub mod registry;

use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde_json::Value;

use crate::handle::ServerHandle;
use crate::reactor::{self, PluginScope};
use self::metadata::MetaData;
use self::registry::PluginRegistry;

/// Suffix of an enabled plugin file.
pub const PLUGIN_FILE_SUFFIX: &str = ".py";
/// Suffix appended to a plugin file while it is disabled.
pub const DISABLED_PLUGIN_FILE_SUFFIX: &str = ".disabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Uninitialized,
    Loading,
    Loaded,
    Ready,
    Unloading,
    Unloaded,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PluginState::Uninitialized => "uninitialized",
            PluginState::Loading => "loading",
            PluginState::Loaded => "loaded",
            PluginState::Ready => "ready",
            PluginState::Unloading => "unloading",
            PluginState::Unloaded => "unloaded",
        };
        write!(f, "{}", name)
    }
}

/// A failure while loading or talking to a code unit.
#[derive(Debug)]
pub enum UnitError {
    Io(io::Error),
    Rpc(warden_rpc::Error),
    /// The unit misbehaved at the protocol level.
    Protocol(String),
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnitError::Io(err) => write!(f, "io error: {}", err),
            UnitError::Rpc(err) => write!(f, "rpc error: {}", err),
            UnitError::Protocol(msg) => write!(f, "protocol error: {}", msg),
        }
    }
}

impl error::Error for UnitError {}

impl From<io::Error> for UnitError {
    fn from(err: io::Error) -> UnitError {
        UnitError::Io(err)
    }
}

impl From<warden_rpc::Error> for UnitError {
    fn from(err: warden_rpc::Error) -> UnitError {
        UnitError::Rpc(err)
    }
}

/// A live code unit backing one plugin.
pub trait PluginUnit: Send {
    /// The unit's raw metadata dictionary.
    fn metadata(&self) -> Result<Value, UnitError>;

    /// Runs the unit's registration entry point, the analog of module
    /// level code. Called with the plugin's scope already entered, so the
    /// facade registration methods work.
    fn bootstrap(&mut self, handle: &ServerHandle) -> Result<(), UnitError>;

    /// The state handed to the unit's successor across a reload.
    fn export(&self) -> Option<Value>;

    /// Final teardown. Must not fail; problems are logged and swallowed.
    fn teardown(&mut self);
}

/// Creates units from plugin files. The seam between the manager and the
/// concrete plugin technology.
pub trait UnitLoader: Send {
    fn load_unit(
        &self,
        path: &Path,
        handle: &ServerHandle,
    ) -> Result<Box<dyn PluginUnit>, UnitError>;
}

/// A cheap stable fingerprint for change detection.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fingerprint {
    size: u64,
    mtime: SystemTime,
}

fn fingerprint_of(path: &Path) -> Option<Fingerprint> {
    let meta = fs::metadata(path).ok()?;
    let mtime = meta.modified().ok()?;
    Some(Fingerprint { size: meta.len(), mtime })
}

/// The file stem a plugin id falls back to when metadata has none.
fn fallback_id_for(path: &Path) -> String {
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default()
}

/// One loaded plugin: its metadata, registry, state and live unit.
pub struct Plugin {
    file_path: PathBuf,
    metadata: MetaData,
    state: PluginState,
    fingerprint: Option<Fingerprint>,
    registry: Arc<Mutex<PluginRegistry>>,
    unit: Option<Box<dyn PluginUnit>>,
    /// The previous incarnation's export, delivered to the next
    /// `plugin_load` event and then cleared.
    old_export: Option<Value>,
}

impl Plugin {
    /// Loads a plugin from a file: spawns the unit, builds metadata, and
    /// runs the unit's registrations inside the new plugin's scope.
    ///
    /// On failure nothing is left behind; the half-built unit is torn down
    /// when dropped.
    pub fn load(
        loader: &dyn UnitLoader,
        path: &Path,
        handle: &ServerHandle,
    ) -> Result<Plugin, UnitError> {
        debug!("loading plugin from {}", path.display());
        let mut unit = loader.load_unit(path, handle)?;
        let raw = unit.metadata()?;
        let metadata = MetaData::from_value(&raw, &fallback_id_for(path));
        let registry = Arc::new(Mutex::new(PluginRegistry::default()));

        {
            let scope = PluginScope { id: metadata.id.clone(), registry: registry.clone() };
            let _guard = reactor::enter_plugin_scope(scope);
            unit.bootstrap(handle)?;
        }

        Ok(Plugin {
            file_path: path.to_path_buf(),
            fingerprint: fingerprint_of(path),
            metadata,
            state: PluginState::Loaded,
            registry,
            unit: Some(unit),
            old_export: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn registry(&self) -> &Arc<Mutex<PluginRegistry>> {
        &self.registry
    }

    pub fn scope(&self) -> PluginScope {
        PluginScope { id: self.metadata.id.clone(), registry: self.registry.clone() }
    }

    pub fn in_state(&self, states: &[PluginState]) -> bool {
        states.contains(&self.state)
    }

    fn assert_state(&self, expected: PluginState) {
        if self.state != expected {
            error!(
                "plugin {} is {} where {} was expected",
                self.metadata.id, self.state, expected
            );
        }
    }

    /// `Loaded → Ready`, after the dependency check passed.
    pub fn ready(&mut self) {
        self.assert_state(PluginState::Loaded);
        self.state = PluginState::Ready;
    }

    /// Begins eviction. The unit stays alive until `remove` so the unload
    /// event can still reach it.
    pub fn start_unloading(&mut self) {
        self.state = PluginState::Unloading;
    }

    /// Final removal: tear the unit down, clear the registry.
    pub fn remove(&mut self) {
        self.assert_state(PluginState::Unloading);
        if let Some(mut unit) = self.unit.take() {
            unit.teardown();
        }
        self.registry.lock().unwrap().clear();
        self.state = PluginState::Unloaded;
    }

    /// Unload then load in place, carrying the old unit's export over to
    /// the next `plugin_load` dispatch. On failure the plugin is left in
    /// `Unloading` for the caller to evict.
    pub fn reload(
        &mut self,
        loader: &dyn UnitLoader,
        handle: &ServerHandle,
    ) -> Result<(), UnitError> {
        self.assert_state(PluginState::Ready);
        self.old_export = self.unit.as_ref().and_then(|unit| unit.export());
        self.state = PluginState::Unloading;
        if let Some(mut unit) = self.unit.take() {
            unit.teardown();
        }
        self.registry.lock().unwrap().clear();

        self.state = PluginState::Loading;
        match self.load_unit_in_place(loader, handle) {
            Ok(()) => {
                self.state = PluginState::Loaded;
                Ok(())
            }
            Err(err) => {
                self.state = PluginState::Unloading;
                Err(err)
            }
        }
    }

    fn load_unit_in_place(
        &mut self,
        loader: &dyn UnitLoader,
        handle: &ServerHandle,
    ) -> Result<(), UnitError> {
        let mut unit = loader.load_unit(&self.file_path, handle)?;
        let raw = unit.metadata()?;
        self.metadata = MetaData::from_value(&raw, &fallback_id_for(&self.file_path));
        self.fingerprint = fingerprint_of(&self.file_path);
        {
            let scope = PluginScope {
                id: self.metadata.id.clone(),
                registry: self.registry.clone(),
            };
            let _guard = reactor::enter_plugin_scope(scope);
            unit.bootstrap(handle)?;
        }
        self.unit = Some(unit);
        Ok(())
    }

    /// Delivers one event to this plugin's own listeners, in priority
    /// order, with the plugin scope entered around each call.
    pub fn receive_event(&self, handle: &ServerHandle, event: &str, args: &[Value]) {
        let listeners = self.registry.lock().unwrap().listeners_for(event);
        for listener in listeners {
            let _guard = reactor::enter_plugin_scope(self.scope());
            listener.execute(handle, args);
        }
    }

    pub fn take_old_export(&mut self) -> Option<Value> {
        self.old_export.take()
    }

    pub fn export(&self) -> Option<Value> {
        self.unit.as_ref().and_then(|unit| unit.export())
    }

    pub fn file_exists(&self) -> bool {
        self.file_path.is_file()
    }

    /// Whether the backing file changed since load, by size + mtime.
    pub fn file_changed(&self) -> bool {
        fingerprint_of(&self.file_path) != self.fingerprint
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.metadata.id)
            .field("version", &self.metadata.version.to_string())
            .field("state", &self.state)
            .field("path", &self.file_path)
            .finish()
    }
}
