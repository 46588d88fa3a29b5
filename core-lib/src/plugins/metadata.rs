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

//! Plugin metadata, extracted from the unit's raw metadata dictionary.
//!
//! Construction never fails: a missing id falls back to the file stem, a
//! missing or malformed version falls back to the `0.0.0` sentinel with a
//! warning, and malformed dependency entries are dropped with a warning.

use std::collections::HashMap;

use serde_json::Value;

use crate::version::{Version, VersionRequirement};

/// The version assumed for plugins that do not declare a usable one.
pub const FALLBACK_VERSION: &str = "0.0.0";

#[derive(Debug, Clone)]
pub struct MetaData {
    /// Unique within the process.
    pub id: String,
    pub version: Version,
    pub name: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub link: Option<String>,
    pub dependencies: HashMap<String, VersionRequirement>,
}

impl MetaData {
    pub fn from_value(data: &Value, fallback_id: &str) -> MetaData {
        let empty = serde_json::Map::new();
        let data = data.as_object().unwrap_or(&empty);

        let id = data
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(fallback_id)
            .to_string();
        let name = data
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&id)
            .to_string();
        let description = data.get("description").and_then(Value::as_str).map(String::from);
        let link = data.get("link").and_then(Value::as_str).map(String::from);
        let author = match data.get("author") {
            Some(Value::String(author)) => Some(author.clone()),
            Some(Value::Array(authors)) => {
                let names: Vec<&str> = authors.iter().filter_map(Value::as_str).collect();
                if names.is_empty() { None } else { Some(names.join(", ")) }
            }
            _ => None,
        };

        let version = match data.get("version").and_then(Value::as_str) {
            Some(raw) => match Version::parse(raw) {
                Ok(version) => version,
                Err(err) => {
                    warn!(
                        "version {:?} of plugin {} is invalid ({}), using fallback {}",
                        raw, id, err, FALLBACK_VERSION
                    );
                    fallback_version()
                }
            },
            None => {
                warn!("plugin {} does not declare a version, using fallback {}", id, FALLBACK_VERSION);
                fallback_version()
            }
        };

        let mut dependencies = HashMap::new();
        if let Some(deps) = data.get("dependencies").and_then(Value::as_object) {
            for (dep_id, requirement) in deps {
                let parsed = requirement
                    .as_str()
                    .ok_or_else(|| "requirement is not a string".to_string())
                    .and_then(|raw| {
                        VersionRequirement::parse(raw).map_err(|err| err.to_string())
                    });
                match parsed {
                    Ok(requirement) => {
                        dependencies.insert(dep_id.clone(), requirement);
                    }
                    Err(err) => {
                        warn!(
                            "dependency {:?} of plugin {} is invalid ({}), ignoring",
                            dep_id, id, err
                        );
                    }
                }
            }
        }

        MetaData { id, version, name, description, author, link, dependencies }
    }
}

fn fallback_version() -> Version {
    Version::new(0, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_metadata() {
        let meta = MetaData::from_value(
            &json!({
                "id": "example-plugin",
                "version": "1.0.0",
                "name": "Sample Plugin",
                "description": "a sample",
                "author": ["alice", "bob"],
                "link": "https://example.invalid/plugin",
                "dependencies": {
                    "other": ">=1.0.0",
                    "any": "*",
                },
            }),
            "example_file",
        );
        assert_eq!(meta.id, "example-plugin");
        assert_eq!(meta.version, Version::new(1, 0, 0));
        assert_eq!(meta.name, "Sample Plugin");
        assert_eq!(meta.author.as_deref(), Some("alice, bob"));
        assert_eq!(meta.dependencies.len(), 2);
        assert!(meta.dependencies["other"].is_satisfied_by(&Version::new(1, 2, 0)));
    }

    #[test]
    fn id_falls_back_to_file_stem() {
        let meta = MetaData::from_value(&json!({}), "my_plugin");
        assert_eq!(meta.id, "my_plugin");
        assert_eq!(meta.name, "my_plugin");
    }

    #[test]
    fn version_falls_back_to_sentinel() {
        let meta = MetaData::from_value(&json!({"id": "p"}), "p");
        assert_eq!(meta.version, Version::new(0, 0, 0));

        let meta = MetaData::from_value(&json!({"id": "p", "version": "not.a.version"}), "p");
        assert_eq!(meta.version, Version::new(0, 0, 0));
    }

    #[test]
    fn malformed_dependencies_are_dropped() {
        let meta = MetaData::from_value(
            &json!({
                "id": "p",
                "version": "1.0.0",
                "dependencies": {
                    "good": ">=1.0.0",
                    "bad": ">=x.y.z!",
                    "worse": 42,
                },
            }),
            "p",
        );
        assert_eq!(meta.dependencies.len(), 1);
        assert!(meta.dependencies.contains_key("good"));
    }

    #[test]
    fn non_object_metadata_is_all_fallbacks() {
        let meta = MetaData::from_value(&json!(null), "stem");
        assert_eq!(meta.id, "stem");
        assert_eq!(meta.version, Version::new(0, 0, 0));
        assert!(meta.dependencies.is_empty());
    }
}
