//! Rules describing sources, sinks and sanitizers.
//!
//! Rules are stored as YAML lists:
//!
//! ```yaml
//! - object: null
//!   methods:
//!     - name: sprintf
//!       parameters: [null, null, $TAINT]
//!       comment: Format string and arguments end up in a fixed size buffer.
//!       sanitizers:
//!         - methods:
//!             - name: snprintf_guard
//!               comment: Bounds the copy.
//! ```

use serde::{Deserialize, Serialize};

use crate::grammar::{Call, CallKind, Identifier};

/// Marks the dangerous parameter of a sink, or the output parameter of a
/// source.
pub const TAINT_MARKER: &str = "$TAINT";

/// What a rule expects at one argument position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum ParameterPattern {
    /// Anything.
    Any,
    /// Anything; this is the position user input flows through.
    Taint,
    /// Exactly this source text.
    Literal(String),
}

impl From<Option<String>> for ParameterPattern {
    fn from(value: Option<String>) -> Self {
        match value {
            None => Self::Any,
            Some(text) if text == TAINT_MARKER => Self::Taint,
            Some(text) => Self::Literal(text),
        }
    }
}

impl From<ParameterPattern> for Option<String> {
    fn from(pattern: ParameterPattern) -> Self {
        match pattern {
            ParameterPattern::Any => None,
            ParameterPattern::Taint => Some(TAINT_MARKER.to_string()),
            ParameterPattern::Literal(text) => Some(text),
        }
    }
}

/// One method of a [`Rule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMethod {
    /// Method name without object.
    pub name: String,
    /// Positional argument patterns. Calls may pass more arguments.
    #[serde(default)]
    pub parameters: Vec<ParameterPattern>,
    /// Shown in reports next to findings.
    #[serde(default)]
    pub comment: String,
    /// Methods that defuse this sink.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sanitizers: Vec<Sanitizer>,
}

impl RuleMethod {
    /// A method matching any arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            comment: comment.into(),
            sanitizers: Vec::new(),
        }
    }

    /// Marks parameter `position` as [`ParameterPattern::Taint`].
    #[must_use]
    pub fn with_taint_at(mut self, position: usize) -> Self {
        self.parameters = vec![ParameterPattern::Any; position + 1];
        self.parameters[position] = ParameterPattern::Taint;
        self
    }

    /// Positions marked with [`TAINT_MARKER`].
    #[must_use]
    pub fn taint_positions(&self) -> Vec<usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == ParameterPattern::Taint)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Whether a call passing `args` matches the parameter patterns.
    fn accepts(&self, call: &Call) -> bool {
        call.args.len() >= self.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&call.args)
                .all(|(pattern, arg)| match pattern {
                    ParameterPattern::Literal(text) => arg.as_literal() == Some(text.as_str()),
                    ParameterPattern::Any | ParameterPattern::Taint => true,
                })
    }

    /// Same method and same patterns, ignoring comment and sanitizers.
    #[must_use]
    pub fn same_signature(&self, other: &Self) -> bool {
        self.name == other.name && self.parameters == other.parameters
    }
}

/// A source, sink or sanitizer rule for one object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rule {
    /// The object the methods belong to, such as `os` or a class name.
    #[serde(default)]
    pub object: Option<String>,
    /// Matching methods.
    #[serde(default)]
    pub methods: Vec<RuleMethod>,
    /// Variables that hold user input, such as `_GET` (sources only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
}

impl Rule {
    /// A rule for a single method.
    #[must_use]
    pub fn method(object: Option<String>, method: RuleMethod) -> Self {
        Self {
            object,
            methods: vec![method],
            variables: Vec::new(),
        }
    }

    /// The index of the first method matching `call`.
    #[must_use]
    pub fn match_call(&self, call: &Call) -> Option<usize> {
        self.matching_methods(call).next()
    }

    /// The indices of every method matching `call`.
    ///
    /// Object and name must be equal, arity at least the number of patterns
    /// and literal patterns must match. Calls on call results never match.
    pub fn matching_methods<'a>(&'a self, call: &'a Call) -> impl Iterator<Item = usize> + 'a {
        let applies = call.kind != CallKind::Chained && self.object == call.name.object_name();
        self.methods
            .iter()
            .enumerate()
            .filter(move |(_, method)| {
                applies && method.name == call.name.name && method.accepts(call)
            })
            .map(|(idx, _)| idx)
    }

    /// Whether `identifier` is one of the rule's variables.
    #[must_use]
    pub fn matches_variable(&self, identifier: &Identifier) -> bool {
        self.object == identifier.object_name() && self.variables.contains(&identifier.name)
    }
}

/// A rule that defuses a sink, and how deeply it is nested.
///
/// Declared sanitizers have level 0. A method that calls a level `n`
/// sanitizer becomes a level `n + 1` sanitizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sanitizer {
    /// The methods that sanitize.
    #[serde(flatten)]
    pub rule: Rule,
    /// Nesting level.
    #[serde(default)]
    pub level: usize,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::grammar::{Expression, Literal, Span, Term};

    fn call(name: &str, args: &[&str]) -> Call {
        Call {
            name: Identifier::from_dotted(name),
            args: args
                .iter()
                .map(|text| Expression {
                    terms: vec![Term::Literal(Literal {
                        text: (*text).to_string(),
                        span: Span::default(),
                    })],
                    span: Span::default(),
                })
                .collect(),
            span: Span::default(),
            kind: CallKind::Function,
        }
    }

    fn sprintf_rule() -> Rule {
        serde_yaml::from_str(
            "object: null\nmethods:\n  - name: sprintf\n    parameters: [null, null, $TAINT]\n    comment: overflow\n",
        )
        .unwrap()
    }

    #[test]
    fn yaml_patterns() {
        let rule = sprintf_rule();
        let method = &rule.methods[0];
        assert_eq!(
            method.parameters,
            [
                ParameterPattern::Any,
                ParameterPattern::Any,
                ParameterPattern::Taint
            ]
        );
        assert_eq!(method.taint_positions(), [2]);
        assert!(method.sanitizers.is_empty());
    }

    #[test_case("sprintf", &["buf", "\"%s\"", "x"], true; "exact arity")]
    #[test_case("sprintf", &["buf", "\"%s\"", "x", "y"], true; "extra arguments")]
    #[test_case("sprintf", &["buf", "x"], false; "too few arguments")]
    #[test_case("snprintf", &["buf", "n", "x"], false; "other name")]
    #[test_case("io.sprintf", &["buf", "n", "x"], false; "other object")]
    fn call_matching(name: &str, args: &[&str], matches: bool) {
        assert_eq!(sprintf_rule().match_call(&call(name, args)).is_some(), matches);
    }

    #[test]
    fn literal_patterns_must_match() {
        let rule: Rule = serde_yaml::from_str(
            "object: subprocess\nmethods:\n  - name: call\n    parameters: [$TAINT, 'shell=True']\n    comment: shell\n",
        )
        .unwrap();
        assert!(rule.match_call(&call("subprocess.call", &["cmd", "shell=True"])).is_some());
        assert!(rule.match_call(&call("subprocess.call", &["cmd", "x"])).is_none());
    }

    #[test]
    fn overloads_all_match() {
        let rule: Rule = serde_yaml::from_str(
            "methods:\n  - name: sprintf\n    parameters: [null, $TAINT]\n  - name: sprintf\n    parameters: [null, null, $TAINT]\n",
        )
        .unwrap();
        let matches: Vec<_> = rule
            .matching_methods(&call("sprintf", &["buf", "fmt", "x"]))
            .collect();
        assert_eq!(matches, [0, 1]);
    }

    #[test]
    fn chained_calls_never_match() {
        let mut chained = call("sprintf", &["a", "b", "c"]);
        chained.kind = CallKind::Chained;
        assert!(sprintf_rule().match_call(&chained).is_none());
    }

    #[test]
    fn variables_match_with_their_object() {
        let rule: Rule = serde_yaml::from_str("object: sys\nvariables: [argv]\n").unwrap();
        assert!(rule.matches_variable(&Identifier::from_dotted("sys.argv")));
        assert!(!rule.matches_variable(&Identifier::new("argv")));
    }

    #[test]
    fn sanitizers_flatten_their_rule() {
        let sanitizer: Sanitizer = serde_yaml::from_str(
            "object: null\nmethods:\n  - name: escapeshellarg\n    comment: quotes\nlevel: 2\n",
        )
        .unwrap();
        assert_eq!(sanitizer.level, 2);
        assert_eq!(sanitizer.rule.methods[0].name, "escapeshellarg");
    }

    #[test]
    fn taint_marker_position() {
        let method = RuleMethod::new("wrapper", "").with_taint_at(1);
        assert_eq!(
            method.parameters,
            [ParameterPattern::Any, ParameterPattern::Taint]
        );
    }
}
