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

//! Orchestration of the plugin set.
//!
//! Every public operation runs the same post-process after its file-level
//! changes: a dependency check that evicts plugins with unmet
//! requirements, event dispatch (`plugin_load` in dependency-topological
//! order, `plugin_unload` in reverse), and a wholesale rebuild of the
//! aggregate registry. Afterwards every tracked plugin is `Ready`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::handle::ServerHandle;
use super::dep_walker;
use super::metadata::MetaData;
use super::registry::{
    PluginManagerRegistry, RegistryCell, PLUGIN_LOAD_EVENT, PLUGIN_UNLOAD_EVENT,
};
use super::{Plugin, PluginState, UnitLoader, DISABLED_PLUGIN_FILE_SUFFIX, PLUGIN_FILE_SUFFIX};

/// The outcome of one sub-phase: which plugins (by id, or file path for
/// failed loads) succeeded and which failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SingleOperationResult {
    pub success: Vec<String>,
    pub failure: Vec<String>,
}

impl SingleOperationResult {
    pub fn record<S: Into<String>>(&mut self, item: S, success: bool) {
        if success {
            self.success.push(item.into());
        } else {
            self.failure.push(item.into());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.success.is_empty() && self.failure.is_empty()
    }
}

/// The structured outcome of a manager operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginOperationResult {
    pub load: SingleOperationResult,
    pub unload: SingleOperationResult,
    pub reload: SingleOperationResult,
    pub dependency_check: SingleOperationResult,
}

impl PluginOperationResult {
    /// Whether the operation changed nothing at the file level.
    pub fn is_noop(&self) -> bool {
        self.load.is_empty() && self.unload.is_empty() && self.reload.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "loaded {}, unloaded {}, reloaded {}, load failures {}, dependency failures {}",
            self.load.success.len(),
            self.unload.success.len(),
            self.reload.success.len(),
            self.load.failure.len() + self.reload.failure.len(),
            self.dependency_check.failure.len(),
        )
    }
}

/// State a single operation accumulates across phases A and B.
#[derive(Default)]
struct PendingOperation {
    load: SingleOperationResult,
    unload: SingleOperationResult,
    reload: SingleOperationResult,
    /// Plugins removed from tracking, still alive to receive their unload
    /// event.
    evicted: Vec<Plugin>,
}

pub struct PluginManager {
    plugin_folders: Vec<PathBuf>,
    loader: Box<dyn UnitLoader>,
    plugins: BTreeMap<String, Plugin>,
    plugin_file_path: HashMap<PathBuf, String>,
    registry_cell: Arc<RegistryCell>,
}

impl PluginManager {
    pub fn new(
        loader: Box<dyn UnitLoader>,
        plugin_folders: Vec<PathBuf>,
        registry_cell: Arc<RegistryCell>,
    ) -> Self {
        PluginManager {
            plugin_folders,
            loader,
            plugins: BTreeMap::new(),
            plugin_file_path: HashMap::new(),
            registry_cell,
        }
    }

    pub fn get_plugin(&self, plugin_id: &str) -> Option<&Plugin> {
        self.plugins.get(plugin_id)
    }

    pub fn plugin_ids(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn contains_plugin_id(&self, plugin_id: &str) -> bool {
        self.plugins.contains_key(plugin_id)
    }

    pub fn contains_plugin_file(&self, path: &Path) -> bool {
        self.plugin_file_path.contains_key(path)
    }

    /// The export of a loaded plugin's unit, for cross-plugin access.
    pub fn plugin_export(&self, plugin_id: &str) -> Option<Value> {
        self.plugins.get(plugin_id).and_then(Plugin::export)
    }

    // ------------------------------------------------------------------
    //  Single plugin operations
    // ------------------------------------------------------------------

    /// Attempts one load. On success the plugin is tracked and its id
    /// returned; a load error or a duplicate id drops the newcomer and
    /// leaves the set untouched.
    fn load_single(&mut self, handle: &ServerHandle, path: &Path) -> Option<String> {
        match Plugin::load(self.loader.as_ref(), path, handle) {
            Err(err) => {
                error!("failed to load plugin from {}: {}", path.display(), err);
                None
            }
            Ok(mut plugin) => {
                let id = plugin.id().to_string();
                if let Some(existing) = self.plugins.get(&id) {
                    error!(
                        "duplicate plugin id {}: {} conflicts with already loaded {}",
                        id,
                        path.display(),
                        existing.file_path().display()
                    );
                    plugin.start_unloading();
                    plugin.remove();
                    return None;
                }
                info!(
                    "loaded plugin {} v{} from {}",
                    id,
                    plugin.metadata().version,
                    path.display()
                );
                self.plugin_file_path.insert(path.to_path_buf(), id.clone());
                self.plugins.insert(id.clone(), plugin);
                Some(id)
            }
        }
    }

    /// Removes a plugin from tracking and hands it back for the event
    /// phase. The plugin enters `Unloading`.
    fn unload_single(&mut self, plugin_id: &str) -> Option<Plugin> {
        let mut plugin = self.plugins.remove(plugin_id)?;
        self.plugin_file_path.remove(plugin.file_path());
        plugin.start_unloading();
        info!("unloading plugin {}", plugin_id);
        Some(plugin)
    }

    // ------------------------------------------------------------------
    //  Phase A: collect and apply file level changes
    // ------------------------------------------------------------------

    fn collect_and_process_new_plugins(
        &mut self,
        handle: &ServerHandle,
        filter: &dyn Fn(&Path) -> bool,
        specific: Option<PathBuf>,
    ) -> SingleOperationResult {
        let mut result = SingleOperationResult::default();
        let candidates = match specific {
            Some(path) => vec![path],
            None => self.scan_plugin_files(),
        };
        for path in candidates {
            if self.contains_plugin_file(&path) || !filter(&path) {
                continue;
            }
            match self.load_single(handle, &path) {
                Some(id) => result.success.push(id),
                None => result.failure.push(path.display().to_string()),
            }
        }
        result
    }

    fn collect_and_remove_plugins(
        &mut self,
        filter: &dyn Fn(&Plugin) -> bool,
        specific: Option<&str>,
    ) -> (SingleOperationResult, Vec<Plugin>) {
        let mut result = SingleOperationResult::default();
        let mut evicted = Vec::new();
        let candidates: Vec<String> = match specific {
            Some(id) => vec![id.to_string()],
            None => self.plugin_ids(),
        };
        for id in candidates {
            let matches = match self.plugins.get(&id) {
                Some(plugin) => filter(plugin),
                None => false,
            };
            if !matches {
                continue;
            }
            if let Some(plugin) = self.unload_single(&id) {
                result.success.push(id);
                evicted.push(plugin);
            }
        }
        (result, evicted)
    }

    fn reload_ready_plugins(
        &mut self,
        handle: &ServerHandle,
        filter: &dyn Fn(&Plugin) -> bool,
        specific: Option<&str>,
    ) -> (SingleOperationResult, Vec<Plugin>) {
        let mut result = SingleOperationResult::default();
        let mut evicted = Vec::new();
        let candidates: Vec<String> = match specific {
            Some(id) => vec![id.to_string()],
            None => self.plugin_ids(),
        };
        for id in candidates {
            let eligible = match self.plugins.get(&id) {
                Some(plugin) => plugin.state() == PluginState::Ready && filter(plugin),
                None => false,
            };
            if !eligible {
                continue;
            }
            // lift the plugin out so the loader can be borrowed alongside
            let mut plugin = match self.plugins.remove(&id) {
                Some(plugin) => plugin,
                None => continue,
            };
            match plugin.reload(self.loader.as_ref(), handle) {
                Ok(()) => {
                    info!("reloaded plugin {}", plugin.id());
                    let new_id = plugin.id().to_string();
                    self.plugin_file_path
                        .insert(plugin.file_path().to_path_buf(), new_id.clone());
                    self.plugins.insert(new_id.clone(), plugin);
                    result.success.push(new_id);
                }
                Err(err) => {
                    error!("failed to reload plugin {}: {}", id, err);
                    self.plugin_file_path.remove(plugin.file_path());
                    result.failure.push(id);
                    evicted.push(plugin);
                }
            }
        }
        (result, evicted)
    }

    fn scan_plugin_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for folder in &self.plugin_folders {
            let entries = match fs::read_dir(folder) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("cannot list plugin folder {}: {}", folder.display(), err);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let is_plugin = path.is_file()
                    && path
                        .file_name()
                        .map_or(false, |n| n.to_string_lossy().ends_with(PLUGIN_FILE_SUFFIX));
                if is_plugin {
                    files.push(path);
                }
            }
        }
        files.sort();
        files
    }

    // ------------------------------------------------------------------
    //  Phase B: dependency check
    // ------------------------------------------------------------------

    /// Walks the dependency graph; failed plugins are evicted. The success
    /// list comes back in topological order, dependencies first.
    fn check_plugin_dependencies(
        &mut self,
    ) -> (SingleOperationResult, Vec<Plugin>, Vec<String>) {
        let metas: BTreeMap<String, MetaData> = self
            .plugins
            .iter()
            .map(|(id, plugin)| (id.clone(), plugin.metadata().clone()))
            .collect();
        let mut result = SingleOperationResult::default();
        let mut evicted = Vec::new();
        let mut topo_order = Vec::new();
        for item in dep_walker::walk(&metas) {
            result.record(item.plugin_id.clone(), item.success);
            if item.success {
                topo_order.push(item.plugin_id);
            } else {
                let reason = item.reason.unwrap_or_else(|| "unknown".to_string());
                error!("unloading plugin {}: {}", item.plugin_id, reason);
                if let Some(plugin) = self.unload_single(&item.plugin_id) {
                    evicted.push(plugin);
                }
            }
        }
        debug!("plugin dependency topology order: {:?}", topo_order);
        (result, evicted, topo_order)
    }

    // ------------------------------------------------------------------
    //  Phases C and D: event dispatch and registry rebuild
    // ------------------------------------------------------------------

    fn post_plugin_process(
        &mut self,
        handle: &ServerHandle,
        mut op: PendingOperation,
    ) -> PluginOperationResult {
        let (dependency_check, dep_evicted, topo_order) = self.check_plugin_dependencies();
        op.evicted.extend(dep_evicted);

        let newly_loaded: HashSet<&String> =
            op.load.success.iter().chain(op.reload.success.iter()).collect();

        // plugin_load goes to survivors that are newly loaded or reloaded,
        // dependencies before dependants
        for id in &topo_order {
            if !newly_loaded.contains(id) {
                continue;
            }
            if let Some(plugin) = self.plugins.get_mut(id) {
                plugin.ready();
            }
        }
        for id in &topo_order {
            if !newly_loaded.contains(id) {
                continue;
            }
            let old_export = match self.plugins.get_mut(id) {
                Some(plugin) => plugin.take_old_export(),
                None => continue,
            };
            if let Some(plugin) = self.plugins.get(id) {
                let args = [old_export.unwrap_or(Value::Null)];
                plugin.receive_event(handle, PLUGIN_LOAD_EVENT, &args);
            }
        }

        // plugin_unload goes to evictees in reverse topological order,
        // dependants before dependencies; plugins that were newly loaded
        // within this same operation never observed a load, so they get no
        // unload either
        let loaded_this_op: HashSet<&String> = op.load.success.iter().collect();
        for index in eviction_order(&op.evicted).into_iter().rev() {
            let plugin = &op.evicted[index];
            if loaded_this_op.contains(&plugin.id().to_string()) {
                continue;
            }
            plugin.receive_event(handle, PLUGIN_UNLOAD_EVENT, &[]);
        }
        for plugin in &mut op.evicted {
            plugin.remove();
        }

        for plugin in self.plugins.values() {
            if plugin.state() != PluginState::Ready {
                error!(
                    "plugin {} finished an operation in state {} instead of ready",
                    plugin.id(),
                    plugin.state()
                );
            }
        }

        self.rebuild_registry();
        PluginOperationResult {
            load: op.load,
            unload: op.unload,
            reload: op.reload,
            dependency_check,
        }
    }

    fn rebuild_registry(&mut self) {
        let mut aggregate = PluginManagerRegistry::default();
        for (id, plugin) in &self.plugins {
            aggregate.collect(id, &plugin.registry().lock().unwrap());
        }
        aggregate.arrange();
        self.registry_cell.swap(Arc::new(aggregate));
        debug!("plugin registry rebuilt, commands and help entries refreshed");
    }

    // ------------------------------------------------------------------
    //  Public operations
    // ------------------------------------------------------------------

    pub fn load_plugin(&mut self, handle: &ServerHandle, path: &Path) -> PluginOperationResult {
        let load =
            self.collect_and_process_new_plugins(handle, &|_| true, Some(path.to_path_buf()));
        self.post_plugin_process(handle, PendingOperation { load, ..Default::default() })
    }

    pub fn unload_plugin(
        &mut self,
        handle: &ServerHandle,
        plugin_id: &str,
    ) -> PluginOperationResult {
        let (unload, evicted) = self.collect_and_remove_plugins(&|_| true, Some(plugin_id));
        self.post_plugin_process(
            handle,
            PendingOperation { unload, evicted, ..Default::default() },
        )
    }

    pub fn reload_plugin(
        &mut self,
        handle: &ServerHandle,
        plugin_id: &str,
    ) -> PluginOperationResult {
        let (reload, evicted) = self.reload_ready_plugins(handle, &|_| true, Some(plugin_id));
        self.post_plugin_process(
            handle,
            PendingOperation { reload, evicted, ..Default::default() },
        )
    }

    /// Strips the `.disabled` suffix from the file, then loads it.
    pub fn enable_plugin(&mut self, handle: &ServerHandle, path: &Path) -> PluginOperationResult {
        let display = path.display().to_string();
        let enabled = match display.strip_suffix(DISABLED_PLUGIN_FILE_SUFFIX) {
            Some(stripped) if path.is_file() => PathBuf::from(stripped),
            _ => {
                error!("{} is not a disabled plugin file", display);
                return PluginOperationResult::default();
            }
        };
        if let Err(err) = fs::rename(path, &enabled) {
            error!("failed to enable {}: {}", display, err);
            return PluginOperationResult::default();
        }
        self.load_plugin(handle, &enabled)
    }

    /// Unloads the plugin, then renames its file out of the scan set.
    pub fn disable_plugin(
        &mut self,
        handle: &ServerHandle,
        plugin_id: &str,
    ) -> PluginOperationResult {
        let path = self.plugins.get(plugin_id).map(|p| p.file_path().to_path_buf());
        let result = self.unload_plugin(handle, plugin_id);
        if let Some(path) = path {
            if path.is_file() {
                let mut disabled = path.clone().into_os_string();
                disabled.push(DISABLED_PLUGIN_FILE_SUFFIX);
                if let Err(err) = fs::rename(&path, &disabled) {
                    error!("failed to disable {}: {}", path.display(), err);
                }
            }
        }
        result
    }

    pub fn refresh_all_plugins(&mut self, handle: &ServerHandle) -> PluginOperationResult {
        self.refresh_plugins(handle, &|_| true)
    }

    pub fn refresh_changed_plugins(&mut self, handle: &ServerHandle) -> PluginOperationResult {
        self.refresh_plugins(handle, &Plugin::file_changed)
    }

    fn refresh_plugins(
        &mut self,
        handle: &ServerHandle,
        reload_filter: &dyn Fn(&Plugin) -> bool,
    ) -> PluginOperationResult {
        let load = self.collect_and_process_new_plugins(handle, &|_| true, None);
        let (unload, mut evicted) =
            self.collect_and_remove_plugins(&|plugin| !plugin.file_exists(), None);
        let (reload, reload_evicted) = self.reload_ready_plugins(handle, reload_filter, None);
        evicted.extend(reload_evicted);
        self.post_plugin_process(handle, PendingOperation { load, unload, reload, evicted })
    }
}

/// Topological order (dependencies first) of the evicted plugins among
/// themselves, as indices into the slice.
fn eviction_order(evicted: &[Plugin]) -> Vec<usize> {
    let metas: BTreeMap<String, MetaData> = evicted
        .iter()
        .map(|plugin| (plugin.id().to_string(), plugin.metadata().clone()))
        .collect();
    let by_id: HashMap<&str, usize> = evicted
        .iter()
        .enumerate()
        .map(|(index, plugin)| (plugin.id(), index))
        .collect();
    dep_walker::walk(&metas)
        .into_iter()
        .filter_map(|result| by_id.get(result.plugin_id.as_str()).copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::{Arc, Mutex};

    use serde_json::Value;
    use tempdir::TempDir;

    use super::*;
    use crate::plugins::registry::DEFAULT_LISTENER_PRIORITY;
    use crate::plugins::{PluginUnit, UnitError};
    use crate::reactor;
    use crate::supervisor::Supervisor;
    use crate::test_support::{supervisor_with_loader, EventLog};

    /// A local stand-in for a plugin process, scripted by the metadata
    /// value stored in the loader's spec table.
    struct TestUnit {
        metadata: Value,
        export: Value,
        log: EventLog,
    }

    impl PluginUnit for TestUnit {
        fn metadata(&self) -> Result<Value, UnitError> {
            Ok(self.metadata.clone())
        }

        fn bootstrap(&mut self, handle: &ServerHandle) -> Result<(), UnitError> {
            if self.metadata.get("__fail_bootstrap").is_some() {
                return Err(UnitError::Protocol("scripted bootstrap failure".to_string()));
            }
            let id = reactor::current_plugin_id().expect("bootstrap runs in plugin scope");

            let log = self.log.clone();
            let plugin = id.clone();
            handle
                .add_event_listener(
                    PLUGIN_LOAD_EVENT,
                    DEFAULT_LISTENER_PRIORITY,
                    move |_, args| {
                        let old = args
                            .get(0)
                            .and_then(Value::as_str)
                            .unwrap_or("null")
                            .to_string();
                        log.lock().unwrap().push(format!("load:{}:{}", plugin, old));
                    },
                )
                .unwrap();

            let log = self.log.clone();
            let plugin = id;
            handle
                .add_event_listener(
                    PLUGIN_UNLOAD_EVENT,
                    DEFAULT_LISTENER_PRIORITY,
                    move |_, _| {
                        log.lock().unwrap().push(format!("unload:{}", plugin));
                    },
                )
                .unwrap();
            Ok(())
        }

        fn export(&self) -> Option<Value> {
            Some(self.export.clone())
        }

        fn teardown(&mut self) {}
    }

    struct TestLoader {
        specs: Arc<Mutex<HashMap<String, Value>>>,
        log: EventLog,
    }

    impl UnitLoader for TestLoader {
        fn load_unit(
            &self,
            path: &Path,
            _handle: &ServerHandle,
        ) -> Result<Box<dyn PluginUnit>, UnitError> {
            let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
            let metadata = self
                .specs
                .lock()
                .unwrap()
                .get(&file_name)
                .cloned()
                .ok_or_else(|| UnitError::Protocol(format!("no unit for {}", file_name)))?;
            if metadata.get("__fail_load").is_some() {
                return Err(UnitError::Protocol("scripted load failure".to_string()));
            }
            Ok(Box::new(TestUnit {
                metadata,
                export: json!(format!("export-of-{}", file_name)),
                log: self.log.clone(),
            }))
        }
    }

    struct Fixture {
        _dir: TempDir,
        folder: PathBuf,
        supervisor: Supervisor,
        log: EventLog,
        specs: Arc<Mutex<HashMap<String, Value>>>,
    }

    impl Fixture {
        fn new(units: Vec<(&str, Value)>) -> Fixture {
            let dir = TempDir::new("warden-plugin-test").unwrap();
            let folder = dir.path().to_path_buf();
            let mut table = HashMap::new();
            for (file, metadata) in units {
                fs::write(folder.join(file), b"unit").unwrap();
                table.insert(file.to_string(), metadata);
            }
            let specs = Arc::new(Mutex::new(table));
            let log: EventLog = Arc::new(Mutex::new(Vec::new()));
            let loader = TestLoader { specs: specs.clone(), log: log.clone() };
            let supervisor = supervisor_with_loader(Box::new(loader), vec![folder.clone()]);
            Fixture { _dir: dir, folder, supervisor, log, specs }
        }

        fn run<F>(&self, op: F) -> PluginOperationResult
        where
            F: FnOnce(&mut PluginManager, &ServerHandle) -> PluginOperationResult,
        {
            let handle = self.supervisor.handle().clone();
            let mut manager = handle.plugin_manager.lock().unwrap();
            op(&mut manager, &handle)
        }

        fn events(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn clear_events(&self) {
            self.log.lock().unwrap().clear();
        }

        fn tracked_ids(&self) -> Vec<String> {
            let handle = self.supervisor.handle();
            let manager = handle.plugin_manager.lock().unwrap();
            manager.plugin_ids()
        }
    }

    fn meta(id: &str, version: &str, deps: &[(&str, &str)]) -> Value {
        let deps: serde_json::Map<String, Value> =
            deps.iter().map(|(k, v)| (k.to_string(), json!(v))).collect();
        json!({ "id": id, "version": version, "dependencies": deps })
    }

    #[test]
    fn load_dispatches_in_dependency_order() {
        let fixture = Fixture::new(vec![
            ("a.py", meta("a", "1.0.0", &[])),
            ("b.py", meta("b", "1.0.0", &[("a", ">=1.0.0")])),
            ("c.py", meta("c", "1.0.0", &[("b", "*")])),
        ]);
        let result = fixture.run(|m, h| m.refresh_all_plugins(h));

        assert_eq!(result.load.success.len(), 3);
        assert!(result.load.failure.is_empty());
        assert_eq!(result.dependency_check.success, vec!["a", "b", "c"]);
        assert_eq!(fixture.events(), vec!["load:a:null", "load:b:null", "load:c:null"]);
        assert_eq!(fixture.tracked_ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn removing_dependency_unloads_dependants_in_reverse_order() {
        let fixture = Fixture::new(vec![
            ("a.py", meta("a", "1.0.0", &[])),
            ("b.py", meta("b", "1.0.0", &[("a", ">=1.0.0")])),
            ("c.py", meta("c", "1.0.0", &[("b", "*")])),
        ]);
        fixture.run(|m, h| m.refresh_all_plugins(h));
        fixture.clear_events();

        fs::remove_file(fixture.folder.join("a.py")).unwrap();
        let result = fixture.run(|m, h| m.refresh_all_plugins(h));

        assert_eq!(result.unload.success, vec!["a"]);
        assert_eq!(result.dependency_check.failure, vec!["b", "c"]);
        assert_eq!(fixture.events(), vec!["unload:c", "unload:b", "unload:a"]);
        assert!(fixture.tracked_ids().is_empty());
    }

    #[test]
    fn unsatisfied_version_fails_dependant() {
        let fixture = Fixture::new(vec![
            ("a.py", meta("a", "0.9.0", &[])),
            ("b.py", meta("b", "1.0.0", &[("a", ">=1.0.0")])),
        ]);
        let result = fixture.run(|m, h| m.refresh_all_plugins(h));
        assert_eq!(result.dependency_check.success, vec!["a"]);
        assert_eq!(result.dependency_check.failure, vec!["b"]);
        assert_eq!(fixture.tracked_ids(), vec!["a"]);
        // b was newly loaded in the same operation, so no unload event
        assert_eq!(fixture.events(), vec!["load:a:null"]);
    }

    #[test]
    fn dependency_cycle_fails_both_sides() {
        let fixture = Fixture::new(vec![
            ("x.py", meta("x", "1.0.0", &[("y", "*")])),
            ("y.py", meta("y", "1.0.0", &[("x", "*")])),
        ]);
        let result = fixture.run(|m, h| m.refresh_all_plugins(h));

        assert_eq!(result.load.success.len(), 2);
        assert_eq!(result.dependency_check.failure.len(), 2);
        assert!(fixture.tracked_ids().is_empty());
        // neither observed plugin_load, so neither observes plugin_unload
        assert!(fixture.events().is_empty());
    }

    #[test]
    fn reload_carries_the_old_export_over() {
        let fixture = Fixture::new(vec![("p.py", meta("p", "1.0.0", &[]))]);
        fixture.run(|m, h| m.refresh_all_plugins(h));
        fixture.clear_events();

        let result = fixture.run(|m, h| m.reload_plugin(h, "p"));
        assert_eq!(result.reload.success, vec!["p"]);
        assert_eq!(fixture.events(), vec!["load:p:export-of-p.py"]);
        assert_eq!(fixture.tracked_ids(), vec!["p"]);
    }

    #[test]
    fn reload_failure_evicts_the_plugin() {
        let fixture = Fixture::new(vec![("p.py", meta("p", "1.0.0", &[]))]);
        fixture.run(|m, h| m.refresh_all_plugins(h));

        fixture
            .specs
            .lock()
            .unwrap()
            .insert("p.py".to_string(), json!({"id": "p", "__fail_load": true}));
        let result = fixture.run(|m, h| m.reload_plugin(h, "p"));

        assert!(result.reload.success.is_empty());
        assert_eq!(result.reload.failure, vec!["p"]);
        assert!(fixture.tracked_ids().is_empty());
    }

    #[test]
    fn duplicate_id_keeps_the_incumbent() {
        let fixture = Fixture::new(vec![
            ("a1.py", meta("dup", "1.0.0", &[])),
            ("a2.py", meta("dup", "2.0.0", &[])),
        ]);
        let result = fixture.run(|m, h| m.refresh_all_plugins(h));

        assert_eq!(result.load.success, vec!["dup"]);
        assert_eq!(result.load.failure.len(), 1);
        assert!(result.load.failure[0].contains("a2.py"));

        let handle = fixture.supervisor.handle();
        let manager = handle.plugin_manager.lock().unwrap();
        let plugin = manager.get_plugin("dup").unwrap();
        assert!(plugin.file_path().to_string_lossy().contains("a1.py"));
        assert_eq!(plugin.metadata().version.to_string(), "1.0.0");
    }

    #[test]
    fn load_failure_has_no_side_effects() {
        let fixture = Fixture::new(vec![("bad.py", json!({"id": "bad", "__fail_load": true}))]);
        let result = fixture.run(|m, h| m.refresh_all_plugins(h));
        assert!(result.load.success.is_empty());
        assert_eq!(result.load.failure.len(), 1);
        assert!(fixture.tracked_ids().is_empty());
        assert!(fixture.events().is_empty());
    }

    #[test]
    fn bootstrap_failure_drops_the_plugin() {
        let fixture =
            Fixture::new(vec![("bad.py", json!({"id": "bad", "__fail_bootstrap": true}))]);
        let result = fixture.run(|m, h| m.refresh_all_plugins(h));
        assert_eq!(result.load.failure.len(), 1);
        assert!(fixture.tracked_ids().is_empty());
    }

    #[test]
    fn refresh_changed_without_changes_is_a_noop() {
        let fixture = Fixture::new(vec![
            ("a.py", meta("a", "1.0.0", &[])),
            ("b.py", meta("b", "1.0.0", &[("a", "*")])),
        ]);
        fixture.run(|m, h| m.refresh_all_plugins(h));
        fixture.clear_events();

        let before = fixture.supervisor.handle().registry.snapshot();
        let result = fixture.run(|m, h| m.refresh_changed_plugins(h));

        assert!(result.is_noop());
        assert!(fixture.events().is_empty());
        let after = fixture.supervisor.handle().registry.snapshot();
        assert_eq!(before.plugin_ids, after.plugin_ids);
        assert_eq!(
            before.listeners_for(PLUGIN_LOAD_EVENT).len(),
            after.listeners_for(PLUGIN_LOAD_EVENT).len()
        );
    }

    #[test]
    fn refresh_all_reloads_ready_plugins() {
        let fixture = Fixture::new(vec![("p.py", meta("p", "1.0.0", &[]))]);
        fixture.run(|m, h| m.refresh_all_plugins(h));
        fixture.clear_events();

        let result = fixture.run(|m, h| m.refresh_all_plugins(h));
        assert_eq!(result.reload.success, vec!["p"]);
        assert_eq!(fixture.events(), vec!["load:p:export-of-p.py"]);
    }

    #[test]
    fn enable_and_disable_rename_the_file() {
        let fixture = Fixture::new(vec![("p.py", meta("p", "1.0.0", &[]))]);
        let disabled = fixture.folder.join("p.py.disabled");
        fs::rename(fixture.folder.join("p.py"), &disabled).unwrap();

        let result = fixture.run(|m, h| m.enable_plugin(h, &disabled));
        assert_eq!(result.load.success, vec!["p"]);
        assert!(fixture.folder.join("p.py").is_file());
        assert!(!disabled.exists());

        let result = fixture.run(|m, h| m.disable_plugin(h, "p"));
        assert_eq!(result.unload.success, vec!["p"]);
        assert!(!fixture.folder.join("p.py").exists());
        assert!(disabled.is_file());
        assert!(fixture.tracked_ids().is_empty());
    }

    #[test]
    fn aggregate_registry_matches_tracked_plugins() {
        let fixture = Fixture::new(vec![
            ("a.py", meta("a", "1.0.0", &[])),
            ("b.py", meta("b", "1.0.0", &[])),
        ]);
        fixture.run(|m, h| m.refresh_all_plugins(h));

        let registry = fixture.supervisor.handle().registry.snapshot();
        assert_eq!(registry.plugin_ids, vec!["a", "b"]);
        // both plugins registered one load and one unload listener each
        assert_eq!(registry.listeners_for(PLUGIN_LOAD_EVENT).len(), 2);
        assert_eq!(registry.listeners_for(PLUGIN_UNLOAD_EVENT).len(), 2);

        fixture.run(|m, h| m.unload_plugin(h, "a"));
        let registry = fixture.supervisor.handle().registry.snapshot();
        assert_eq!(registry.plugin_ids, vec!["b"]);
        assert_eq!(registry.listeners_for(PLUGIN_LOAD_EVENT).len(), 1);
    }

    #[test]
    fn states_are_ready_after_every_operation() {
        let fixture = Fixture::new(vec![
            ("a.py", meta("a", "1.0.0", &[])),
            ("b.py", meta("b", "1.0.0", &[("a", "*")])),
        ]);
        fixture.run(|m, h| m.refresh_all_plugins(h));
        let handle = fixture.supervisor.handle();
        let manager = handle.plugin_manager.lock().unwrap();
        for id in manager.plugin_ids() {
            assert_eq!(manager.get_plugin(&id).unwrap().state(), PluginState::Ready);
        }
    }

    #[test]
    fn non_plugin_files_are_ignored() {
        let fixture = Fixture::new(vec![("a.py", meta("a", "1.0.0", &[]))]);
        fs::write(fixture.folder.join("README.txt"), b"not a plugin").unwrap();
        let result = fixture.run(|m, h| m.refresh_all_plugins(h));
        assert_eq!(result.load.success, vec!["a"]);
        assert!(result.load.failure.is_empty());
    }
}
