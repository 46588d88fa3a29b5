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

//! Argument nodes and the recursive descent command dispatcher.

use std::fmt;
use std::sync::Arc;

use super::errors::{CommandError, CommandErrorKind, IllegalNodeOperation, SyntaxError};
use super::{CommandContext, CommandSource, ParsedValue};

/// The terminal action of a command path.
pub type CommandCallback = Arc<dyn Fn(&dyn CommandSource, &CommandContext) + Send + Sync>;

/// A predicate gating entry to a node, evaluated against the command source.
pub type Requirement = Arc<dyn Fn(&dyn CommandSource) -> bool + Send + Sync>;

const DIVIDER: char = ' ';
const QUOTE_CHAR: char = '"';
const ESCAPE_CHAR: char = '\\';

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct NumberRange {
    min: Option<f64>,
    max: Option<f64>,
}

impl NumberRange {
    fn check(&self, value: f64, char_read: usize) -> Result<(), SyntaxError> {
        let too_small = self.min.map_or(false, |min| value < min);
        let too_large = self.max.map_or(false, |max| value > max);
        if too_small || too_large {
            let message = format!(
                "value out of range [{}, {}]",
                self.min.map_or_else(|| "-inf".to_string(), |v| v.to_string()),
                self.max.map_or_else(|| "+inf".to_string(), |v| v.to_string()),
            );
            Err(SyntaxError::new(CommandErrorKind::NumberOutOfRange(message), char_read))
        } else {
            Ok(())
        }
    }
}

enum NodeKind {
    /// A fixed keyword (or a disjunction of keywords). Stores no value.
    Literal { words: Vec<String> },
    Integer { range: NumberRange },
    Float { range: NumberRange },
    /// An integer if possible, otherwise a float.
    Number { range: NumberRange },
    /// A single whitespace bounded word.
    Text,
    /// A word, or a `"`-quoted string with `\\` and `\"` escapes.
    QuotableText { empty_allowed: bool },
    /// The entire remaining line.
    GreedyText,
}

/// The result of one node successfully consuming a token.
struct Parsed {
    value: Option<ParsedValue>,
    char_read: usize,
}

/// One node of a command tree.
///
/// Nodes compose in builder style; `then` attaches children, `runs` sets
/// the terminal callback, `requires` gates entry and `redirects` delegates
/// child lookup to another node. A node with a redirect cannot have
/// children and vice versa.
pub struct ArgumentNode {
    name: Option<String>,
    kind: NodeKind,
    children_literal: Vec<Arc<ArgumentNode>>,
    children: Vec<Arc<ArgumentNode>>,
    callback: Option<CommandCallback>,
    requirement: Option<Requirement>,
    redirect: Option<Arc<ArgumentNode>>,
}

impl fmt::Debug for ArgumentNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match &self.kind {
            NodeKind::Literal { words } => format!("Literal{:?}", words),
            NodeKind::Integer { .. } => "Integer".to_string(),
            NodeKind::Float { .. } => "Float".to_string(),
            NodeKind::Number { .. } => "Number".to_string(),
            NodeKind::Text => "Text".to_string(),
            NodeKind::QuotableText { .. } => "QuotableText".to_string(),
            NodeKind::GreedyText => "GreedyText".to_string(),
        };
        f.debug_struct("ArgumentNode")
            .field("kind", &kind)
            .field("name", &self.name)
            .field("children", &(self.children_literal.len() + self.children.len()))
            .finish()
    }
}

impl ArgumentNode {
    fn new(name: Option<String>, kind: NodeKind) -> Self {
        ArgumentNode {
            name,
            kind,
            children_literal: Vec::new(),
            children: Vec::new(),
            callback: None,
            requirement: None,
            redirect: None,
        }
    }

    /// A literal node matching a single keyword.
    ///
    /// # Panics
    ///
    /// Panics if the keyword is empty or contains a space.
    pub fn literal<S: Into<String>>(word: S) -> Self {
        ArgumentNode::literals(vec![word.into()])
    }

    /// A literal node matching any keyword of a set.
    ///
    /// # Panics
    ///
    /// Panics if the set is empty, or any keyword is empty or contains a
    /// space.
    pub fn literals<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        assert!(!words.is_empty(), "literal node requires at least one keyword");
        for word in &words {
            assert!(
                !word.is_empty() && !word.contains(DIVIDER),
                "literal keyword cannot be empty or contain spaces: {:?}",
                word
            );
        }
        ArgumentNode::new(None, NodeKind::Literal { words })
    }

    pub fn integer<S: Into<String>>(name: S) -> Self {
        ArgumentNode::new(Some(name.into()), NodeKind::Integer { range: NumberRange::default() })
    }

    pub fn float<S: Into<String>>(name: S) -> Self {
        ArgumentNode::new(Some(name.into()), NodeKind::Float { range: NumberRange::default() })
    }

    pub fn number<S: Into<String>>(name: S) -> Self {
        ArgumentNode::new(Some(name.into()), NodeKind::Number { range: NumberRange::default() })
    }

    pub fn text<S: Into<String>>(name: S) -> Self {
        ArgumentNode::new(Some(name.into()), NodeKind::Text)
    }

    pub fn quotable_text<S: Into<String>>(name: S) -> Self {
        ArgumentNode::new(Some(name.into()), NodeKind::QuotableText { empty_allowed: false })
    }

    pub fn greedy_text<S: Into<String>>(name: S) -> Self {
        ArgumentNode::new(Some(name.into()), NodeKind::GreedyText)
    }

    /// Restrict a number node to an inclusive range.
    ///
    /// # Panics
    ///
    /// Panics when called on a non-number node.
    pub fn in_range<T: Into<f64>>(mut self, min: T, max: T) -> Self {
        match self.kind {
            NodeKind::Integer { ref mut range }
            | NodeKind::Float { ref mut range }
            | NodeKind::Number { ref mut range } => {
                range.min = Some(min.into());
                range.max = Some(max.into());
            }
            _ => panic!("in_range is only supported on number nodes"),
        }
        self
    }

    /// Allow a quoted empty string (`""`) as a value.
    ///
    /// # Panics
    ///
    /// Panics when called on a node that is not a quotable text node.
    pub fn allow_empty(mut self) -> Self {
        match self.kind {
            NodeKind::QuotableText { ref mut empty_allowed } => *empty_allowed = true,
            _ => panic!("allow_empty is only supported on quotable text nodes"),
        }
        self
    }

    /// Append a child node. Literal children keep their own list so the
    /// dispatcher can try them first.
    pub fn then(mut self, child: ArgumentNode) -> Result<Self, IllegalNodeOperation> {
        if self.redirect.is_some() {
            return Err(IllegalNodeOperation::new(
                "a redirected node is not allowed to add child nodes"));
        }
        if child.is_literal() {
            self.children_literal.push(Arc::new(child));
        } else {
            self.children.push(Arc::new(child));
        }
        Ok(self)
    }

    /// Set the callback executed when the command string ends at this node.
    pub fn runs<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn CommandSource, &CommandContext) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Set the predicate the command source must pass to enter this node.
    pub fn requires<F>(mut self, requirement: F) -> Self
    where
        F: Fn(&dyn CommandSource) -> bool + Send + Sync + 'static,
    {
        self.requirement = Some(Arc::new(requirement));
        self
    }

    /// Delegate child lookup to `target`, so this node dispatches exactly
    /// like `target` for whatever follows its own token.
    pub fn redirects(mut self, target: &Arc<ArgumentNode>) -> Result<Self, IllegalNodeOperation> {
        if self.has_children() {
            return Err(IllegalNodeOperation::new(
                "a node with child nodes is not allowed to be redirected"));
        }
        self.redirect = Some(Arc::clone(target));
        Ok(self)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty() || !self.children_literal.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn is_literal(&self) -> bool {
        matches!(self.kind, NodeKind::Literal { .. })
    }

    /// The first keyword of a literal node, used for help listings.
    pub fn first_keyword(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Literal { words } => words.first().map(String::as_str),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    //  Parsing
    // ------------------------------------------------------------------

    fn parse(&self, text: &str) -> Result<Parsed, SyntaxError> {
        match &self.kind {
            NodeKind::Literal { words } => {
                let element = get_element(text);
                if words.iter().any(|w| w == element) {
                    Ok(Parsed { value: None, char_read: element.len() })
                } else {
                    Err(SyntaxError::new(CommandErrorKind::IllegalLiteralArgument, element.len()))
                }
            }
            NodeKind::Integer { range } => {
                let element = get_element(text);
                match element.parse::<i64>() {
                    Ok(value) => {
                        range.check(value as f64, element.len())?;
                        Ok(Parsed { value: Some(ParsedValue::Int(value)), char_read: element.len() })
                    }
                    Err(_) => Err(SyntaxError::new(
                        CommandErrorKind::IllegalArgument("invalid integer".to_string()),
                        element.len(),
                    )),
                }
            }
            NodeKind::Float { range } => {
                let element = get_element(text);
                match element.parse::<f64>() {
                    Ok(value) => {
                        range.check(value, element.len())?;
                        Ok(Parsed { value: Some(ParsedValue::Float(value)), char_read: element.len() })
                    }
                    Err(_) => Err(SyntaxError::new(
                        CommandErrorKind::IllegalArgument("invalid float".to_string()),
                        element.len(),
                    )),
                }
            }
            NodeKind::Number { range } => {
                let element = get_element(text);
                if let Ok(value) = element.parse::<i64>() {
                    range.check(value as f64, element.len())?;
                    return Ok(Parsed {
                        value: Some(ParsedValue::Int(value)),
                        char_read: element.len(),
                    });
                }
                match element.parse::<f64>() {
                    Ok(value) => {
                        range.check(value, element.len())?;
                        Ok(Parsed { value: Some(ParsedValue::Float(value)), char_read: element.len() })
                    }
                    Err(_) => Err(SyntaxError::new(
                        CommandErrorKind::IllegalArgument("invalid number".to_string()),
                        element.len(),
                    )),
                }
            }
            NodeKind::Text => {
                let element = get_element(text);
                Ok(Parsed {
                    value: Some(ParsedValue::Text(element.to_string())),
                    char_read: element.len(),
                })
            }
            NodeKind::QuotableText { empty_allowed } => parse_quotable(text, *empty_allowed),
            NodeKind::GreedyText => Ok(Parsed {
                value: Some(ParsedValue::Text(text.to_string())),
                char_read: text.len(),
            }),
        }
    }

    // ------------------------------------------------------------------
    //  Dispatch
    // ------------------------------------------------------------------

    /// Parse and execute a full command line against this tree.
    ///
    /// Either exactly one terminal callback runs, or exactly one typed
    /// error is returned; re-running with the same input yields the same
    /// outcome. An `IllegalLiteralArgument` escaping the root means nothing
    /// matched the very first token and becomes `UnknownRootArgument`.
    pub fn execute(&self, source: &dyn CommandSource, command: &str) -> Result<(), CommandError> {
        let mut context = CommandContext::new();
        match self.execute_inner(source, command, command, &mut context) {
            Err(error) => {
                if *error.kind() == CommandErrorKind::IllegalLiteralArgument {
                    let (_, hint) = error.into_kind_with_hint();
                    Err(CommandError::new(CommandErrorKind::UnknownRootArgument, hint))
                } else {
                    Err(error)
                }
            }
            ok => ok,
        }
    }

    fn execute_inner(
        &self,
        source: &dyn CommandSource,
        command: &str,
        remaining: &str,
        context: &mut CommandContext,
    ) -> Result<(), CommandError> {
        let error_pos = |end: usize| format!("{}<--", &command[..end]);
        let consumed_before = command.len() - remaining.len();

        let parsed = match self.parse(remaining) {
            Ok(parsed) => parsed,
            Err(failure) => {
                let hint = error_pos(consumed_before + failure.char_read);
                return Err(CommandError::new(failure.kind, hint));
            }
        };

        let total_read = consumed_before + parsed.char_read;
        let trimmed_remaining = remove_divider_prefix(&remaining[parsed.char_read..]);

        if let Some(ref requirement) = self.requirement {
            if !requirement(source) {
                return Err(CommandError::new(
                    CommandErrorKind::PermissionDenied,
                    error_pos(total_read),
                ));
            }
        }

        if let (Some(name), Some(value)) = (&self.name, parsed.value) {
            context.insert(name.clone(), value);
        }

        if trimmed_remaining.is_empty() {
            return match self.callback {
                Some(ref callback) => {
                    callback(source, context);
                    Ok(())
                }
                None => Err(CommandError::new(
                    CommandErrorKind::UnknownCommand,
                    error_pos(total_read),
                )),
            };
        }

        let node = self.redirect.as_deref().unwrap_or(self);
        if !node.has_children() {
            return Err(CommandError::new(
                CommandErrorKind::UnknownArgument,
                error_pos(command.len()),
            ));
        }

        // Literal children form an exhaustive keyword disjunction, so a
        // keyword mismatch just moves on to the next sibling.
        for child in &node.children_literal {
            match child.execute_inner(source, command, trimmed_remaining, context) {
                Err(ref error) if *error.kind() == CommandErrorKind::IllegalLiteralArgument => {
                    continue
                }
                other => return other,
            }
        }

        // Argument children: a token shape mismatch moves to the next
        // sibling, any other failure is meaningful and surfaces as is. If
        // nothing could consume the token at all the argument is unknown.
        for child in &node.children {
            match child.execute_inner(source, command, trimmed_remaining, context) {
                Err(ref error) if matches!(error.kind(), CommandErrorKind::IllegalArgument(_)) => {
                    continue
                }
                other => return other,
            }
        }
        Err(CommandError::new(CommandErrorKind::UnknownArgument, error_pos(command.len())))
    }
}

/// The next whitespace bounded token of `text` (possibly empty).
fn get_element(text: &str) -> &str {
    match text.find(DIVIDER) {
        Some(idx) => &text[..idx],
        None => text,
    }
}

/// Strip inter-token dividers from the front of `text`.
fn remove_divider_prefix(text: &str) -> &str {
    text.trim_start_matches(DIVIDER)
}

fn parse_quotable(text: &str, empty_allowed: bool) -> Result<Parsed, SyntaxError> {
    if !text.starts_with(QUOTE_CHAR) {
        // regular single word
        let element = get_element(text);
        return Ok(Parsed {
            value: Some(ParsedValue::Text(element.to_string())),
            char_read: element.len(),
        });
    }
    let mut collected = String::new();
    let mut escaped = false;
    for (idx, ch) in text.char_indices().skip(1) {
        if escaped {
            if ch == ESCAPE_CHAR || ch == QUOTE_CHAR {
                collected.push(ch);
                escaped = false;
            } else {
                return Err(SyntaxError::new(
                    CommandErrorKind::IllegalArgument("illegal usage of escapes".to_string()),
                    idx + ch.len_utf8(),
                ));
            }
        } else if ch == ESCAPE_CHAR {
            escaped = true;
        } else if ch == QUOTE_CHAR {
            let char_read = idx + QUOTE_CHAR.len_utf8();
            if !empty_allowed && collected.is_empty() {
                return Err(SyntaxError::new(CommandErrorKind::EmptyText, char_read));
            }
            return Ok(Parsed { value: Some(ParsedValue::Text(collected)), char_read });
        } else {
            collected.push(ch);
        }
    }
    Err(SyntaxError::new(
        CommandErrorKind::IllegalArgument("unclosed quoted string".to_string()),
        text.len(),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::permission::PermissionLevel;

    struct TestSource {
        level: PermissionLevel,
        replies: Mutex<Vec<String>>,
    }

    impl TestSource {
        fn new(level: PermissionLevel) -> Self {
            TestSource { level, replies: Mutex::new(Vec::new()) }
        }
    }

    impl CommandSource for TestSource {
        fn name(&self) -> &str {
            "tester"
        }

        fn is_player(&self) -> bool {
            true
        }

        fn permission_level(&self) -> PermissionLevel {
            self.level
        }

        fn reply(&self, message: &str) {
            self.replies.lock().unwrap().push(message.to_string());
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<CommandContext>>>, CommandCallback) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let inner = calls.clone();
        let callback: CommandCallback = Arc::new(move |_source, context: &CommandContext| {
            inner.lock().unwrap().push(context.clone());
        });
        (calls, callback)
    }

    fn run(node: &ArgumentNode, command: &str) -> Result<(), CommandError> {
        let source = TestSource::new(PermissionLevel::Owner);
        node.execute(&source, command)
    }

    #[test]
    fn integer_in_range_executes_callback() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::literal("set")
            .then(
                ArgumentNode::integer("n")
                    .in_range(0, 10)
                    .runs(move |source, context| cb(source, context)),
            )
            .unwrap();

        run(&root, "set 7").unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].get_int("n"), Some(7));
    }

    #[test]
    fn integer_out_of_range_reports_position() {
        let (_, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::literal("set")
            .then(ArgumentNode::integer("n").in_range(0, 10).runs(move |s, c| cb(s, c)))
            .unwrap();

        let error = run(&root, "set 11").unwrap_err();
        assert!(matches!(error.kind(), CommandErrorKind::NumberOutOfRange(_)));
        assert_eq!(error.fail_position_hint(), "set 11<--");
    }

    #[test]
    fn quoted_text_with_escapes() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::quotable_text("s").runs(move |s, c| cb(s, c));

        run(&root, "\"a\\\"b\"").unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].get_text("s"), Some("a\"b"));
    }

    #[test]
    fn quoted_text_rejects_bad_escape_and_unclosed() {
        let root = ArgumentNode::quotable_text("s").runs(|_, _| {});
        let error = run(&root, "\"a\\qb\"").unwrap_err();
        assert!(matches!(error.kind(), CommandErrorKind::IllegalArgument(_)));
        let error = run(&root, "\"abc").unwrap_err();
        assert!(matches!(error.kind(), CommandErrorKind::IllegalArgument(_)));
        assert_eq!(error.fail_position_hint(), "\"abc<--");
    }

    #[test]
    fn quoted_empty_text() {
        let root = ArgumentNode::quotable_text("s").runs(|_, _| {});
        let error = run(&root, "\"\"").unwrap_err();
        assert_eq!(*error.kind(), CommandErrorKind::EmptyText);

        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::quotable_text("s").allow_empty().runs(move |s, c| cb(s, c));
        run(&root, "\"\"").unwrap();
        assert_eq!(calls.lock().unwrap()[0].get_text("s"), Some(""));
    }

    #[test]
    fn plain_word_in_quotable_node() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::quotable_text("s").runs(move |s, c| cb(s, c));
        run(&root, "word").unwrap();
        assert_eq!(calls.lock().unwrap()[0].get_text("s"), Some("word"));
    }

    #[test]
    fn greedy_text_consumes_rest_of_line() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::literal("say")
            .then(ArgumentNode::greedy_text("message").runs(move |s, c| cb(s, c)))
            .unwrap();
        run(&root, "say hello brave new world").unwrap();
        assert_eq!(
            calls.lock().unwrap()[0].get_text("message"),
            Some("hello brave new world")
        );
    }

    #[test]
    fn literal_fallthrough_to_argument_child() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::literal("root")
            .then(ArgumentNode::literal("on").runs(|_, _| panic!("wrong branch")))
            .unwrap()
            .then(ArgumentNode::literal("off").runs(|_, _| panic!("wrong branch")))
            .unwrap()
            .then(ArgumentNode::integer("n").runs(move |s, c| cb(s, c)))
            .unwrap();

        run(&root, "root 7").unwrap();
        assert_eq!(calls.lock().unwrap()[0].get_int("n"), Some(7));

        let error = run(&root, "root maybe").unwrap_err();
        assert_eq!(*error.kind(), CommandErrorKind::UnknownArgument);
    }

    #[test]
    fn literal_precedence_over_argument_children() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::literal("root")
            .then(ArgumentNode::literal("on").runs(move |s, c| cb(s, c)))
            .unwrap()
            .then(ArgumentNode::text("word").runs(|_, _| panic!("literal must win")))
            .unwrap();
        run(&root, "root on").unwrap();
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn literal_set_matches_any_keyword() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::literals(vec!["start", "begin"]).runs(move |s, c| cb(s, c));
        run(&root, "begin").unwrap();
        run(&root, "start").unwrap();
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn unknown_root_argument() {
        let root = ArgumentNode::literal("root").runs(|_, _| {});
        let error = run(&root, "other").unwrap_err();
        assert_eq!(*error.kind(), CommandErrorKind::UnknownRootArgument);
        assert_eq!(error.fail_position_hint(), "other<--");
    }

    #[test]
    fn unknown_command_when_input_ends_without_callback() {
        let root = ArgumentNode::literal("root")
            .then(ArgumentNode::literal("sub").runs(|_, _| {}))
            .unwrap();
        let error = run(&root, "root").unwrap_err();
        assert_eq!(*error.kind(), CommandErrorKind::UnknownCommand);
        assert_eq!(error.fail_position_hint(), "root<--");
    }

    #[test]
    fn unknown_argument_when_input_remains_at_leaf() {
        let root = ArgumentNode::literal("root").runs(|_, _| {});
        let error = run(&root, "root trailing").unwrap_err();
        assert_eq!(*error.kind(), CommandErrorKind::UnknownArgument);
        assert_eq!(error.fail_position_hint(), "root trailing<--");
    }

    #[test]
    fn deep_failure_propagates_with_hint() {
        let root = ArgumentNode::literal("a")
            .then(
                ArgumentNode::literal("b")
                    .then(ArgumentNode::integer("n").in_range(1, 5).runs(|_, _| {}))
                    .unwrap(),
            )
            .unwrap();
        let error = run(&root, "a b 9").unwrap_err();
        assert!(matches!(error.kind(), CommandErrorKind::NumberOutOfRange(_)));
        assert_eq!(error.fail_position_hint(), "a b 9<--");
    }

    #[test]
    fn number_node_parses_int_then_float() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::number("n").runs(move |s, c| cb(s, c));
        run(&root, "3").unwrap();
        run(&root, "3.5").unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].get("n"), Some(&ParsedValue::Int(3)));
        assert_eq!(calls[1].get("n"), Some(&ParsedValue::Float(3.5)));
    }

    #[test]
    fn float_node_accepts_signed_decimals() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::float("x").runs(move |s, c| cb(s, c));
        run(&root, "-2.25").unwrap();
        assert_eq!(calls.lock().unwrap()[0].get_float("x"), Some(-2.25));
    }

    #[test]
    fn requirement_denies_with_position() {
        let root = ArgumentNode::literal("admin")
            .requires(|source| source.permission_level() >= PermissionLevel::Admin)
            .runs(|_, _| {});
        let source = TestSource::new(PermissionLevel::User);
        let error = root.execute(&source, "admin").unwrap_err();
        assert_eq!(*error.kind(), CommandErrorKind::PermissionDenied);
        assert_eq!(error.fail_position_hint(), "admin<--");

        let source = TestSource::new(PermissionLevel::Admin);
        assert!(root.execute(&source, "admin").is_ok());
    }

    #[test]
    fn redirect_dispatches_like_target() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let target = Arc::new(
            ArgumentNode::literal("real")
                .then(ArgumentNode::integer("n").runs(move |s, c| cb(s, c)))
                .unwrap(),
        );
        let alias = ArgumentNode::literal("alias").redirects(&target).unwrap();

        run(&alias, "alias 42").unwrap();
        assert_eq!(calls.lock().unwrap()[0].get_int("n"), Some(42));
    }

    #[test]
    fn redirect_topology_rules() {
        let target = Arc::new(ArgumentNode::literal("t").runs(|_, _| {}));
        // children first, then redirect: illegal
        let with_child = ArgumentNode::literal("a")
            .then(ArgumentNode::literal("b").runs(|_, _| {}))
            .unwrap();
        assert!(with_child.redirects(&target).is_err());
        // redirect first, then children: illegal
        let redirected = ArgumentNode::literal("c").redirects(&target).unwrap();
        assert!(redirected.then(ArgumentNode::literal("d").runs(|_, _| {})).is_err());
    }

    #[test]
    fn multiple_argument_children_tried_on_shape_mismatch() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::literal("root")
            .then(ArgumentNode::integer("n").runs(|_, _| panic!("not an int")))
            .unwrap()
            .then(ArgumentNode::text("word").runs(move |s, c| cb(s, c)))
            .unwrap();
        run(&root, "root hello").unwrap();
        assert_eq!(calls.lock().unwrap()[0].get_text("word"), Some("hello"));
    }

    #[test]
    fn meaningful_failures_are_not_masked_by_siblings() {
        // the integer parses but is out of range; the text sibling must not
        // swallow that failure
        let root = ArgumentNode::literal("root")
            .then(ArgumentNode::integer("n").in_range(0, 5).runs(|_, _| {}))
            .unwrap()
            .then(ArgumentNode::text("word").runs(|_, _| panic!("must not run")))
            .unwrap();
        let error = run(&root, "root 10").unwrap_err();
        assert!(matches!(error.kind(), CommandErrorKind::NumberOutOfRange(_)));
    }

    #[test]
    fn repeated_execution_is_deterministic() {
        let root = ArgumentNode::literal("set")
            .then(ArgumentNode::integer("n").in_range(0, 10).runs(|_, _| {}))
            .unwrap();
        for _ in 0..3 {
            let error = run(&root, "set 11").unwrap_err();
            assert_eq!(error.fail_position_hint(), "set 11<--");
        }
    }

    #[test]
    fn extra_dividers_between_tokens_are_skipped() {
        let (calls, callback) = recorder();
        let cb = callback.clone();
        let root = ArgumentNode::literal("set")
            .then(ArgumentNode::integer("n").runs(move |s, c| cb(s, c)))
            .unwrap();
        run(&root, "set   3").unwrap();
        assert_eq!(calls.lock().unwrap()[0].get_int("n"), Some(3));
    }
}
