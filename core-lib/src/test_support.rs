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

//! Shared helpers for the unit tests: small supervisors wired with
//! recording seams.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::handle::{ServerHandle, ServerOutput};
use crate::plugins::{PluginUnit, UnitError, UnitLoader};
use crate::supervisor::Supervisor;

/// A shared log test plugins append lifecycle entries to.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// A loader for supervisors whose tests never load plugins.
pub struct NullLoader;

impl UnitLoader for NullLoader {
    fn load_unit(
        &self,
        path: &Path,
        _handle: &ServerHandle,
    ) -> Result<Box<dyn PluginUnit>, UnitError> {
        Err(UnitError::Protocol(format!("no unit loader for {}", path.display())))
    }
}

/// Captures everything written toward the supervised process.
pub struct RecordingOutput(pub Arc<Mutex<Vec<String>>>);

impl ServerOutput for RecordingOutput {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.0.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

fn small_config(folders: Vec<PathBuf>) -> Config {
    Config {
        plugin_folders: folders.iter().map(|p| p.display().to_string()).collect(),
        worker_threads: 2,
        task_queue_size: 64,
        ..Config::default()
    }
}

pub fn test_supervisor() -> Supervisor {
    supervisor_with_loader(Box::new(NullLoader), Vec::new())
}

pub fn test_supervisor_with_output() -> (Supervisor, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let supervisor = Supervisor::new(
        small_config(Vec::new()),
        Box::new(NullLoader),
        Box::new(RecordingOutput(lines.clone())),
    );
    (supervisor, lines)
}

pub fn supervisor_with_loader(loader: Box<dyn UnitLoader>, folders: Vec<PathBuf>) -> Supervisor {
    let lines = Arc::new(Mutex::new(Vec::new()));
    Supervisor::new(small_config(folders), loader, Box::new(RecordingOutput(lines)))
}
