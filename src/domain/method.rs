//! A method under analysis and everything found in it.

use serde::Serialize;

use crate::{
    domain::{path::ExecutionPath, ruleset::RuleRef},
    grammar::{Assignment, Call, Declaration, MethodDefinition, Parameter, Return, Span},
};

/// A call to a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMatch {
    /// The call site.
    pub call: Call,
    /// The matching source method.
    pub rule: RuleRef,
}

/// A call to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkMatch {
    /// The call site.
    pub call: Call,
    /// The matching sink method.
    pub rule: RuleRef,
    /// The sink's comment.
    pub comment: String,
}

/// A call to a sanitizer of some sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizerMatch {
    /// The call site.
    pub call: Call,
    /// The sink method the sanitizer belongs to.
    pub sink: RuleRef,
    /// Nesting level of the sanitizer.
    pub level: usize,
}

/// Where user controlled data enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginKind {
    /// The result or output argument of a source call.
    Source,
    /// A variable that holds user input, such as `$_GET`.
    Variable,
    /// A global variable that is not redefined in the method.
    Global,
}

/// The start of a taint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Origin {
    /// What kind of origin.
    pub kind: OriginKind,
    /// The source call or variable name.
    pub name: String,
    /// Where.
    pub span: Span,
}

/// A sanitizer that applies to a taint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedSanitizer {
    /// The sanitizer call name.
    pub name: String,
    /// Nesting level.
    pub level: usize,
}

/// User controlled data reaching a sink argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taint {
    /// The sink call site.
    pub sink: Call,
    /// The matching sink method.
    pub rule: RuleRef,
    /// The sink's comment.
    pub comment: String,
    /// Index of the tainted argument.
    pub argument: usize,
    /// Where the data comes from.
    pub origin: Origin,
    /// The sanitizer on the way, if any.
    pub sanitizer: Option<AppliedSanitizer>,
}

impl Taint {
    /// Whether `other` reports the same sink argument under the same rule.
    #[must_use]
    pub fn same_finding(&self, other: &Self) -> bool {
        self.sink.span == other.sink.span
            && self.rule == other.rule
            && self.argument == other.argument
    }

    /// Whether the taint is more dangerous than `other`. Unsanitized beats
    /// sanitized, and a lower sanitizer level beats a higher one.
    #[must_use]
    pub const fn is_worse_than(&self, other: &Self) -> bool {
        match (&self.sanitizer, &other.sanitizer) {
            (None, Some(_)) => true,
            (Some(ours), Some(theirs)) => ours.level < theirs.level,
            _ => false,
        }
    }
}

/// A method or function and its analysis state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    /// Method name.
    pub name: String,
    /// The enclosing class, if any.
    pub class: Option<String>,
    /// The whole definition.
    pub span: Span,
    /// The body.
    pub body: Span,
    /// Formal parameters in order.
    pub parameters: Vec<Parameter>,
    /// Every call in the body, nested calls included.
    pub calls: Vec<Call>,
    /// Assignments in the body.
    pub assignments: Vec<Assignment>,
    /// Declarations without initializer in the body.
    pub declarations: Vec<Declaration>,
    /// Return statements in the body.
    pub returns: Vec<Return>,
    /// Cyclomatic complexity, once calculated.
    pub complexity: Option<usize>,
    /// Found source calls.
    pub sources: Vec<SourceMatch>,
    /// Found sink calls.
    pub sinks: Vec<SinkMatch>,
    /// Found sanitizer calls.
    pub sanitizers: Vec<SanitizerMatch>,
    /// Found taints.
    pub taints: Vec<Taint>,
    /// Execution paths through the body.
    pub paths: Vec<ExecutionPath>,
}

impl Method {
    /// A method without statements.
    #[must_use]
    pub fn new(definition: MethodDefinition) -> Self {
        Self {
            name: definition.name,
            class: None,
            span: definition.span,
            body: definition.body,
            parameters: definition.parameters,
            calls: Vec::new(),
            assignments: Vec::new(),
            declarations: Vec::new(),
            returns: Vec::new(),
            complexity: None,
            sources: Vec::new(),
            sinks: Vec::new(),
            sanitizers: Vec::new(),
            taints: Vec::new(),
            paths: Vec::new(),
        }
    }

    /// Index of the parameter called `name`.
    #[must_use]
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    /// Adds a source call unless already known.
    pub fn add_source(&mut self, source: SourceMatch) -> bool {
        add_new(&mut self.sources, source)
    }

    /// Adds a sink call unless already known.
    pub fn add_sink(&mut self, sink: SinkMatch) -> bool {
        add_new(&mut self.sinks, sink)
    }

    /// Adds a sanitizer call unless already known.
    pub fn add_sanitizer(&mut self, sanitizer: SanitizerMatch) -> bool {
        add_new(&mut self.sanitizers, sanitizer)
    }

    /// Adds a taint, keeping the worst one per sink argument. Returns
    /// whether anything changed.
    pub fn add_taint(&mut self, taint: Taint) -> bool {
        match self.taints.iter_mut().find(|t| t.same_finding(&taint)) {
            Some(known) if taint.is_worse_than(known) => {
                *known = taint;
                true
            }
            Some(_) => false,
            None => {
                self.taints.push(taint);
                true
            }
        }
    }

    /// Forgets everything the rules found, keeping the statements.
    pub fn clear_findings(&mut self) {
        self.sources.clear();
        self.sinks.clear();
        self.sanitizers.clear();
        self.taints.clear();
    }
}

fn add_new<T: PartialEq>(items: &mut Vec<T>, item: T) -> bool {
    if items.contains(&item) {
        false
    } else {
        items.push(item);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{CallKind, Identifier};

    fn method() -> Method {
        Method::new(MethodDefinition {
            name: "main".into(),
            span: Span::new(0, 50),
            body: Span::new(10, 50),
            parameters: vec![Parameter::new("argc"), Parameter::new("argv")],
        })
    }

    fn call(name: &str, start: usize) -> Call {
        Call {
            name: Identifier::new(name),
            args: Vec::new(),
            span: Span::new(start, start + 5),
            kind: CallKind::Function,
        }
    }

    fn taint(start: usize, argument: usize, origin: &str) -> Taint {
        Taint {
            sink: call("system", start),
            rule: RuleRef { rule: 0, method: 0 },
            comment: String::new(),
            argument,
            origin: Origin {
                kind: OriginKind::Source,
                name: origin.into(),
                span: Span::new(0, 1),
            },
            sanitizer: None,
        }
    }

    #[test]
    fn findings_are_not_duplicated() {
        let mut method = method();
        let sink = SinkMatch {
            call: call("system", 20),
            rule: RuleRef { rule: 0, method: 0 },
            comment: "shell".into(),
        };
        assert!(method.add_sink(sink.clone()));
        assert!(!method.add_sink(sink));
        assert_eq!(method.sinks.len(), 1);
    }

    #[test]
    fn one_taint_per_sink_argument() {
        let mut method = method();
        assert!(method.add_taint(taint(20, 0, "getenv")));
        assert!(!method.add_taint(taint(20, 0, "gets")));
        assert!(method.add_taint(taint(20, 1, "gets")));
        assert!(method.add_taint(taint(30, 0, "getenv")));
        assert_eq!(method.taints.len(), 3);

        method.clear_findings();
        assert!(method.taints.is_empty());
    }

    #[test]
    fn the_worst_taint_of_an_argument_is_kept() {
        let sanitized = |level| Taint {
            sanitizer: Some(AppliedSanitizer {
                name: "escapeshellarg".into(),
                level,
            }),
            ..taint(20, 0, "getenv")
        };
        let mut method = method();
        assert!(method.add_taint(sanitized(2)));
        assert!(method.add_taint(sanitized(1)));
        assert!(!method.add_taint(sanitized(3)));
        assert_eq!(method.taints[0].sanitizer.as_ref().map(|s| s.level), Some(1));

        assert!(method.add_taint(taint(20, 0, "gets")));
        assert!(!method.add_taint(sanitized(0)));
        assert_eq!(method.taints.len(), 1);
        assert!(method.taints[0].sanitizer.is_none());
        assert_eq!(method.taints[0].origin.name, "gets");
    }

    #[test]
    fn parameter_lookup() {
        let method = method();
        assert_eq!(method.parameter_index("argv"), Some(1));
        assert_eq!(method.parameter_index("envp"), None);
    }
}
