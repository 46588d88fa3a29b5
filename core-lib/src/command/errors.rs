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

//! Errors produced while building and executing command trees.

use std::error::Error;
use std::fmt;

/// The reason a command failed to parse or execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandErrorKind {
    /// A token did not have the shape the node expected.
    IllegalArgument(String),
    /// A literal node saw a token outside its keyword set.
    IllegalLiteralArgument,
    /// A number parsed but fell outside the node's inclusive range.
    NumberOutOfRange(String),
    /// A quoted text argument was empty where emptiness is not allowed.
    EmptyText,
    /// Input ran out on a node with no callback.
    UnknownCommand,
    /// Input remained but no child could consume it.
    UnknownArgument,
    /// Nothing matched at the very first token of the command.
    UnknownRootArgument,
    /// The command source failed a node's requirement predicate.
    PermissionDenied,
}

impl fmt::Display for CommandErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandErrorKind::IllegalArgument(msg) => write!(f, "illegal argument: {}", msg),
            CommandErrorKind::IllegalLiteralArgument => write!(f, "illegal literal argument"),
            CommandErrorKind::NumberOutOfRange(msg) => write!(f, "number out of range: {}", msg),
            CommandErrorKind::EmptyText => write!(f, "empty text is not allowed"),
            CommandErrorKind::UnknownCommand => write!(f, "unknown command"),
            CommandErrorKind::UnknownArgument => write!(f, "unknown argument"),
            CommandErrorKind::UnknownRootArgument => write!(f, "unknown root argument"),
            CommandErrorKind::PermissionDenied => write!(f, "permission denied"),
        }
    }
}

/// A command failure, annotated with a human readable position hint of the
/// form `"<consumed prefix of the input><--"`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandError {
    kind: CommandErrorKind,
    fail_position_hint: String,
}

impl CommandError {
    pub(crate) fn new(kind: CommandErrorKind, fail_position_hint: String) -> Self {
        CommandError { kind, fail_position_hint }
    }

    pub fn kind(&self) -> &CommandErrorKind {
        &self.kind
    }

    pub fn fail_position_hint(&self) -> &str {
        &self.fail_position_hint
    }

    pub(crate) fn into_kind_with_hint(self) -> (CommandErrorKind, String) {
        (self.kind, self.fail_position_hint)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.fail_position_hint)
    }
}

impl Error for CommandError {}

/// A failure local to a single node's `parse`, carrying the byte offset the
/// node had consumed when it gave up. The dispatcher turns this into a
/// `CommandError` by computing the position hint against the full input.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyntaxError {
    pub kind: CommandErrorKind,
    pub char_read: usize,
}

impl SyntaxError {
    pub fn new(kind: CommandErrorKind, char_read: usize) -> Self {
        SyntaxError { kind, char_read }
    }
}

/// An invalid command tree topology was constructed, e.g. adding children
/// to a redirected node. This is a programming error of the command
/// declarer, not an input error, and is never swallowed.
#[derive(Debug, Clone, PartialEq)]
pub struct IllegalNodeOperation(String);

impl IllegalNodeOperation {
    pub(crate) fn new<S: Into<String>>(message: S) -> Self {
        IllegalNodeOperation(message.into())
    }
}

impl fmt::Display for IllegalNodeOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "illegal node operation: {}", self.0)
    }
}

impl Error for IllegalNodeOperation {}
