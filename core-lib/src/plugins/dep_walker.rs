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

//! Topological ordering of plugins by their declared dependencies.
//!
//! A depth-first walk with three colours. A plugin fails the check when a
//! dependency id is absent, a dependency's version does not satisfy the
//! requirement, a dependency failed its own check, or the plugin sits on a
//! dependency cycle. Successful results come out in topological order,
//! dependencies before dependants; determinism comes from visiting ids in
//! lexicographic order.

use std::collections::{BTreeMap, HashMap};

use super::metadata::MetaData;

#[derive(Debug, Clone, PartialEq)]
pub struct WalkResult {
    pub plugin_id: String,
    pub success: bool,
    pub reason: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    Visiting,
    Done(bool),
}

pub fn walk(plugins: &BTreeMap<String, MetaData>) -> Vec<WalkResult> {
    let mut walker = Walker { plugins, states: HashMap::new(), results: Vec::new() };
    for id in plugins.keys() {
        walker.visit(id);
    }
    walker.results
}

struct Walker<'a> {
    plugins: &'a BTreeMap<String, MetaData>,
    states: HashMap<String, VisitState>,
    results: Vec<WalkResult>,
}

impl<'a> Walker<'a> {
    fn visit(&mut self, id: &str) -> bool {
        match self.states.get(id) {
            Some(VisitState::Done(ok)) => return *ok,
            // callers check for back-edges before recursing
            Some(VisitState::Visiting) => return false,
            None => {}
        }
        self.states.insert(id.to_string(), VisitState::Visiting);

        let meta = match self.plugins.get(id) {
            Some(meta) => meta,
            None => {
                // not a tracked plugin; nothing to record
                self.states.insert(id.to_string(), VisitState::Done(false));
                return false;
            }
        };

        // a stable ordering of the dependency edges keeps the walk
        // deterministic
        let mut dependencies: Vec<(&'a String, &'a crate::version::VersionRequirement)> =
            meta.dependencies.iter().collect();
        dependencies.sort_by(|a, b| a.0.cmp(b.0));

        let mut failure: Option<String> = None;
        for (dep_id, requirement) in dependencies {
            match self.plugins.get(dep_id.as_str()) {
                None => {
                    failure.get_or_insert_with(|| format!("missing dependency {}", dep_id));
                }
                Some(dep_meta) => {
                    if self.states.get(dep_id.as_str()) == Some(&VisitState::Visiting) {
                        failure.get_or_insert_with(|| {
                            format!("dependency cycle through {}", dep_id)
                        });
                        continue;
                    }
                    // visit regardless of earlier failures, so every
                    // dependency is ordered before this plugin
                    let dep_ok = self.visit(dep_id);
                    if !dep_ok {
                        failure.get_or_insert_with(|| {
                            format!("dependency {} failed its own check", dep_id)
                        });
                    } else if !requirement.is_satisfied_by(&dep_meta.version) {
                        failure.get_or_insert_with(|| {
                            format!(
                                "version {} of dependency {} does not satisfy {}",
                                dep_meta.version, dep_id, requirement
                            )
                        });
                    }
                }
            }
        }

        let ok = failure.is_none();
        self.states.insert(id.to_string(), VisitState::Done(ok));
        self.results.push(WalkResult { plugin_id: id.to_string(), success: ok, reason: failure });
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, version: &str, deps: &[(&str, &str)]) -> MetaData {
        MetaData::from_value(
            &json!({
                "id": id,
                "version": version,
                "dependencies": deps
                    .iter()
                    .map(|(k, v)| (k.to_string(), json!(v)))
                    .collect::<serde_json::Map<String, serde_json::Value>>(),
            }),
            id,
        )
    }

    fn plugin_set(metas: Vec<MetaData>) -> BTreeMap<String, MetaData> {
        metas.into_iter().map(|m| (m.id.clone(), m)).collect()
    }

    fn success_order(results: &[WalkResult]) -> Vec<&str> {
        results.iter().filter(|r| r.success).map(|r| r.plugin_id.as_str()).collect()
    }

    #[test]
    fn chain_is_ordered_dependencies_first() {
        let plugins = plugin_set(vec![
            meta("c", "1.0.0", &[("b", "*")]),
            meta("b", "1.0.0", &[("a", ">=1.0.0")]),
            meta("a", "1.0.0", &[]),
        ]);
        let results = walk(&plugins);
        assert_eq!(success_order(&results), vec!["a", "b", "c"]);
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn missing_dependency_fails() {
        let plugins = plugin_set(vec![meta("b", "1.0.0", &[("ghost", "*")])]);
        let results = walk(&plugins);
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].reason.as_ref().unwrap().contains("missing dependency"));
    }

    #[test]
    fn unsatisfied_version_fails() {
        let plugins = plugin_set(vec![
            meta("a", "0.9.0", &[]),
            meta("b", "1.0.0", &[("a", ">=1.0.0")]),
        ]);
        let results = walk(&plugins);
        let b = results.iter().find(|r| r.plugin_id == "b").unwrap();
        assert!(!b.success);
        assert!(b.reason.as_ref().unwrap().contains("does not satisfy"));
        assert!(results.iter().find(|r| r.plugin_id == "a").unwrap().success);
    }

    #[test]
    fn failure_cascades_to_dependants() {
        let plugins = plugin_set(vec![
            meta("b", "1.0.0", &[("ghost", "*")]),
            meta("c", "1.0.0", &[("b", "*")]),
        ]);
        let results = walk(&plugins);
        assert!(results.iter().all(|r| !r.success));
        let c = results.iter().find(|r| r.plugin_id == "c").unwrap();
        assert!(c.reason.as_ref().unwrap().contains("failed its own check"));
    }

    #[test]
    fn two_cycle_fails_both() {
        let plugins = plugin_set(vec![
            meta("x", "1.0.0", &[("y", "*")]),
            meta("y", "1.0.0", &[("x", "*")]),
        ]);
        let results = walk(&plugins);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.success));
        assert!(results
            .iter()
            .any(|r| r.reason.as_ref().unwrap().contains("cycle")));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let plugins = plugin_set(vec![meta("a", "1.0.0", &[("a", "*")])]);
        let results = walk(&plugins);
        assert!(!results[0].success);
        assert!(results[0].reason.as_ref().unwrap().contains("cycle"));
    }

    #[test]
    fn diamond_orders_shared_dependency_once() {
        let plugins = plugin_set(vec![
            meta("base", "1.0.0", &[]),
            meta("left", "1.0.0", &[("base", "*")]),
            meta("right", "1.0.0", &[("base", "*")]),
            meta("top", "1.0.0", &[("left", "*"), ("right", "*")]),
        ]);
        let results = walk(&plugins);
        let order = success_order(&results);
        assert_eq!(results.len(), 4);
        let position =
            |id: &str| order.iter().position(|x| *x == id).unwrap();
        assert!(position("base") < position("left"));
        assert!(position("base") < position("right"));
        assert!(position("left") < position("top"));
        assert!(position("right") < position("top"));
    }
}
