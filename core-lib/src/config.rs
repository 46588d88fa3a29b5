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

//! Daemon configuration, loaded from a TOML file.
//!
//! A missing file means defaults; a malformed file is an error, on the
//! theory that a half-read config is worse than none.

use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::permission::PermissionLevel;
use crate::reactor::{MAX_TASK_QUEUE_SIZE, PLUGIN_THREAD_POOL_SIZE};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folders scanned for plugin files.
    pub plugin_folders: Vec<String>,
    /// Interpreter used to launch plugin files; when absent the files
    /// must be executable themselves.
    pub plugin_interpreter: Option<String>,
    /// Prefix that marks a chat or console line as a command.
    pub command_prefix: String,
    pub worker_threads: usize,
    pub task_queue_size: usize,
    /// Permission level of players without an explicit entry.
    pub default_permission_level: PermissionLevel,
    pub rcon: RconConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            plugin_folders: vec!["plugins".to_string()],
            plugin_interpreter: Some("python3".to_string()),
            command_prefix: "!!".to_string(),
            worker_threads: PLUGIN_THREAD_POOL_SIZE,
            task_queue_size: MAX_TASK_QUEUE_SIZE,
            default_permission_level: PermissionLevel::User,
            rcon: RconConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub password: String,
}

impl Default for RconConfig {
    fn default() -> Self {
        RconConfig {
            enabled: false,
            address: "127.0.0.1".to_string(),
            port: 25575,
            password: String::new(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "cannot read config: {}", err),
            ConfigError::Parse(err) => write!(f, "cannot parse config: {}", err),
        }
    }
}

impl Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> ConfigError {
        ConfigError::Io(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> ConfigError {
        ConfigError::Parse(err)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.is_file() {
            info!("no config at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        let raw = fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempdir::TempDir;

    use super::*;

    #[test]
    fn missing_file_is_defaults() {
        let config = Config::load(Path::new("/nonexistent/warden.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.command_prefix, "!!");
        assert!(!config.rcon.enabled);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new("warden-config").unwrap();
        let path = dir.path().join("warden.toml");
        fs::write(
            &path,
            r###"
command_prefix = "##"
default_permission_level = "guest"

[rcon]
enabled = true
port = 25566
"###,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.command_prefix, "##");
        assert_eq!(config.default_permission_level, PermissionLevel::Guest);
        assert_eq!(config.plugin_folders, vec!["plugins"]);
        assert!(config.rcon.enabled);
        assert_eq!(config.rcon.port, 25566);
        assert_eq!(config.rcon.address, "127.0.0.1");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new("warden-config").unwrap();
        let path = dir.path().join("warden.toml");
        fs::write(&path, "command_prefix = [not toml").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }
}
