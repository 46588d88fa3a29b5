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

//! The warden daemon binary.
//!
//! Wires the concrete seams around the core: fern logging, the subprocess
//! plugin loader, and stdio standing in for the child process pump (our
//! stdin is the console, command lines for the child go to our stdout).

extern crate chrono;
extern crate dirs;
extern crate fern;
#[macro_use]
extern crate log;
extern crate warden_core;

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use warden_core::{Config, Info, ProcessUnitLoader, ServerOutput, Supervisor};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Command lines destined for the supervised process go to our stdout;
/// a real deployment replaces this with the pump's stdin handle.
struct StdoutOutput(io::Stdout);

impl ServerOutput for StdoutOutput {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut lock = self.0.lock();
        lock.write_all(line.as_bytes())?;
        lock.write_all(b"\n")?;
        lock.flush()
    }
}

fn get_logging_directory() -> PathBuf {
    let mut directory = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    directory.push("warden");
    directory
}

fn setup_logging(level: log::LevelFilter) -> Result<(), fern::InitError> {
    let directory = get_logging_directory();
    fs::create_dir_all(&directory)?;
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .chain(fern::log_file(directory.join("warden.log"))?)
        .apply()?;
    Ok(())
}

fn main() {
    let mut config_path = "warden.toml".to_string();
    let mut level = log::LevelFilter::Info;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--debug" => level = log::LevelFilter::Debug,
            other => config_path = other.to_string(),
        }
    }

    if let Err(err) = setup_logging(level) {
        eprintln!("warden: failed to initialize logging: {}", err);
        process::exit(1);
    }

    let config = match Config::load(Path::new(&config_path)) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    };

    for folder in &config.plugin_folders {
        if let Err(err) = fs::create_dir_all(folder) {
            warn!("cannot create plugin folder {}: {}", folder, err);
        }
    }

    let loader =
        ProcessUnitLoader::new(config.plugin_interpreter.clone().map(PathBuf::from));
    let supervisor =
        Supervisor::new(config, Box::new(loader), Box::new(StdoutOutput(io::stdout())));
    supervisor.load_plugins();

    info!("warden is up, reading console input from stdin");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) => {
                if !line.trim().is_empty() {
                    supervisor.put_info(Info::console(line.trim()));
                }
            }
            Err(err) => {
                error!("error reading console input: {}", err);
                break;
            }
        }
    }

    info!("console closed, shutting down");
    supervisor.shutdown(SHUTDOWN_GRACE);
}
