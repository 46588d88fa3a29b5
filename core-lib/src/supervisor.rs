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

//! The assembled supervisor: reactor, plugin manager, facade.
//!
//! The binary (or a test) supplies the two outward seams, a `UnitLoader`
//! for plugin code and a `ServerOutput` for the child process' stdin, and
//! gets back a running supervisor plus its `ServerHandle`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::handle::{ServerHandle, ServerOutput};
use crate::info::Info;
use crate::permission::PermissionManager;
use crate::plugins::manager::PluginManager;
use crate::plugins::registry::RegistryCell;
use crate::plugins::UnitLoader;
use crate::rcon::RconManager;
use crate::reactor::{InfoReactor, TaskExecutor};

pub struct Supervisor {
    handle: ServerHandle,
    executor: Arc<TaskExecutor>,
    info_reactor: InfoReactor,
    stopped: AtomicBool,
}

impl Supervisor {
    pub fn new(
        config: Config,
        loader: Box<dyn UnitLoader>,
        output: Box<dyn ServerOutput>,
    ) -> Supervisor {
        let executor = Arc::new(TaskExecutor::new(config.task_queue_size));
        let registry = Arc::new(RegistryCell::new());
        let plugin_folders: Vec<PathBuf> =
            config.plugin_folders.iter().map(PathBuf::from).collect();
        let plugin_manager = Arc::new(Mutex::new(PluginManager::new(
            loader,
            plugin_folders,
            registry.clone(),
        )));

        let handle = ServerHandle {
            executor: executor.clone(),
            plugin_manager,
            registry,
            output: Arc::new(Mutex::new(output)),
            rcon: Arc::new(RconManager::new()),
            permissions: Arc::new(Mutex::new(PermissionManager::new(
                config.default_permission_level,
            ))),
            command_prefix: Arc::from(config.command_prefix.as_str()),
        };

        TaskExecutor::spawn_workers(&executor, config.worker_threads, handle.clone());
        let info_reactor = InfoReactor::new(executor.clone());
        Supervisor { handle, executor, info_reactor, stopped: AtomicBool::new(false) }
    }

    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    pub fn rcon_manager(&self) -> &RconManager {
        &self.handle.rcon
    }

    /// Feeds one info record from the I/O pump into the reactor.
    pub fn put_info(&self, info: Info) {
        self.info_reactor.put_info(info);
    }

    /// Schedules the initial plugin scan on the reactor.
    pub fn load_plugins(&self) {
        self.handle.executor.execute_or_enqueue(
            &self.handle,
            Box::new(|handle| match handle.refresh_all_plugins() {
                Ok(result) => info!("plugins loaded: {}", result.summary()),
                Err(err) => error!("initial plugin load failed: {}", err),
            }),
        );
    }

    /// Drains the reactor with a deadline, then abandons remaining tasks
    /// and joins the workers.
    pub fn shutdown(&self, deadline: Duration) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.handle.rcon.disconnect();
        self.executor.shutdown(deadline);
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown(Duration::from_millis(500));
    }
}
