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

//! The command tree DSL.
//!
//! A command grammar is a tree of [`ArgumentNode`]s. Literal nodes match
//! fixed keywords; argument nodes parse typed values (integers, floats,
//! words, quoted strings, the rest of the line) into a [`CommandContext`].
//! Executing a tree over an input line either invokes exactly one terminal
//! callback or fails with one typed [`CommandError`] carrying a position
//! hint like `"!!tp 11<--"`.

mod errors;
mod node;

pub use self::errors::{CommandError, CommandErrorKind, IllegalNodeOperation};
pub use self::node::ArgumentNode;

use std::collections::HashMap;

use crate::permission::PermissionLevel;

/// A principal executing a command: a player in game, the console, or a
/// test double.
pub trait CommandSource {
    fn name(&self) -> &str;

    fn is_player(&self) -> bool;

    fn permission_level(&self) -> PermissionLevel;

    /// Send a message back to whoever issued the command.
    fn reply(&self, message: &str);
}

/// A single value parsed out of the command line by an argument node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParsedValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// The values collected along one root-to-callback path, keyed by node name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandContext(HashMap<String, ParsedValue>);

impl CommandContext {
    pub fn new() -> Self {
        CommandContext::default()
    }

    pub fn insert(&mut self, name: String, value: ParsedValue) {
        self.0.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&ParsedValue> {
        self.0.get(name)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(&ParsedValue::Int(value)) => Some(value),
            _ => None,
        }
    }

    /// Numeric lookup; integers widen to floats.
    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.0.get(name) {
            Some(&ParsedValue::Int(value)) => Some(value as f64),
            Some(&ParsedValue::Float(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ParsedValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
