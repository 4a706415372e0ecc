//! Tracing expressions back to where their data comes from.

use std::collections::{BTreeSet, HashSet};

use crate::{
    analysis::dataflow::{DataFlow, Event, EventKind},
    domain::{ExecutionPath, Method, Origin, OriginKind, Ruleset},
    grammar::{Call, CallKind, Expression, Identifier, Span, Term},
};

/// Everything an expression depends on along one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reach {
    /// User controlled data flowing in, in the order found.
    pub origins: Vec<Origin>,
    /// Variables read on the way.
    pub variables: BTreeSet<String>,
    /// Calls whose results flow in.
    pub calls: BTreeSet<Span>,
    /// Indices of the parameters flowing in.
    pub parameters: BTreeSet<usize>,
    /// The defining events visited, latest first.
    pub trail: Vec<Event>,
}

impl Reach {
    fn add_origin(&mut self, kind: OriginKind, name: String, span: Span) {
        let origin = Origin { kind, name, span };
        if !self.origins.contains(&origin) {
            self.origins.push(origin);
        }
    }
}

/// Follows data backwards through one method along one path.
///
/// Without a ruleset nothing is recognised as a source, which leaves the
/// plain definition trail.
#[derive(Debug, Clone, Copy)]
pub struct Tracer<'a> {
    method: &'a Method,
    flow: &'a DataFlow,
    ruleset: Option<&'a Ruleset>,
    globals: &'a [String],
    path: &'a ExecutionPath,
}

impl<'a> Tracer<'a> {
    /// A tracer for `method` along `path`.
    #[must_use]
    pub const fn new(
        method: &'a Method,
        flow: &'a DataFlow,
        ruleset: Option<&'a Ruleset>,
        globals: &'a [String],
        path: &'a ExecutionPath,
    ) -> Self {
        Self {
            method,
            flow,
            ruleset,
            globals,
            path,
        }
    }

    /// What `expression`, evaluated at `position`, depends on.
    #[must_use]
    pub fn expression(&self, expression: &Expression, position: usize) -> Reach {
        let mut reach = Reach::default();
        let mut visited = HashSet::new();
        self.visit_expression(expression, position, &mut reach, &mut visited);
        reach
    }

    /// What `variable`, read at `position`, depends on.
    #[must_use]
    pub fn variable(&self, variable: &str, position: usize) -> Reach {
        let mut reach = Reach::default();
        let mut visited = HashSet::new();
        let span = Span::new(position, position);
        self.visit_variable(variable, span, position, &mut reach, &mut visited);
        reach
    }

    fn visit_expression(
        &self,
        expression: &Expression,
        position: usize,
        reach: &mut Reach,
        visited: &mut HashSet<Event>,
    ) {
        for term in &expression.terms {
            match term {
                Term::Call(call) => self.visit_call(call, position, reach, visited),
                Term::Reference(reference) => {
                    if self.is_source_variable(&reference.identifier) {
                        reach.variables.insert(reference.identifier.root().to_string());
                        reach.add_origin(
                            OriginKind::Variable,
                            reference.identifier.to_string(),
                            reference.span,
                        );
                    } else {
                        self.visit_variable(
                            reference.identifier.root(),
                            reference.span,
                            position,
                            reach,
                            visited,
                        );
                    }
                }
                Term::Literal(_) => {}
            }
        }
    }

    fn visit_call(
        &self,
        call: &Call,
        position: usize,
        reach: &mut Reach,
        visited: &mut HashSet<Event>,
    ) {
        reach.calls.insert(call.span);

        if let Some(ruleset) = self.ruleset {
            let returns_input = ruleset.sources_for_call(call).into_iter().any(|rule| {
                ruleset
                    .source_method(rule)
                    .is_some_and(|m| m.taint_positions().is_empty())
            });
            if returns_input {
                reach.add_origin(OriginKind::Source, call.name.to_string(), call.span);
            }
        }

        if call.kind != CallKind::Chained {
            if let Some((last, rest)) = call.name.object.split_last() {
                let receiver = Identifier {
                    object: rest.to_vec(),
                    name: last.clone(),
                };
                if self.is_source_variable(&receiver) {
                    reach.variables.insert(receiver.root().to_string());
                    reach.add_origin(OriginKind::Variable, receiver.to_string(), call.span);
                } else {
                    let root = Span::new(call.span.start, call.span.start);
                    self.visit_variable(receiver.root(), root, position, reach, visited);
                }
            }
        }

        for arg in &call.args {
            self.visit_expression(arg, position, reach, visited);
        }
    }

    fn visit_variable(
        &self,
        variable: &str,
        span: Span,
        position: usize,
        reach: &mut Reach,
        visited: &mut HashSet<Event>,
    ) {
        reach.variables.insert(variable.to_string());

        for event in self.flow.before(variable, position, self.path) {
            match event.kind {
                EventKind::Parameter(idx) => {
                    reach.parameters.insert(idx);
                    reach.trail.push(*event);
                    return;
                }
                EventKind::Declaration => {
                    reach.trail.push(*event);
                    return;
                }
                EventKind::Assignment(idx) => {
                    reach.trail.push(*event);
                    if visited.insert(*event) {
                        if let Some(assignment) = self.method.assignments.get(idx) {
                            self.visit_expression(
                                &assignment.value,
                                assignment.span.start,
                                reach,
                                visited,
                            );
                        }
                    }
                    return;
                }
                EventKind::Argument { call, position } => {
                    let Some(call) = self.method.calls.get(call) else {
                        continue;
                    };
                    if self.writes_input(call, position) {
                        reach.trail.push(*event);
                        reach.calls.insert(call.span);
                        reach.add_origin(OriginKind::Source, call.name.to_string(), call.span);
                        return;
                    }
                }
                EventKind::Use => {}
            }
        }

        if self.globals.iter().any(|g| g == variable) && !self.flow.is_local(variable) {
            reach.add_origin(OriginKind::Global, variable.to_string(), span);
        }
    }

    fn is_source_variable(&self, identifier: &Identifier) -> bool {
        self.ruleset
            .is_some_and(|ruleset| ruleset.is_source_variable(identifier))
    }

    /// Whether `call` is a source writing user input into argument
    /// `position`.
    fn writes_input(&self, call: &Call, position: usize) -> bool {
        let Some(ruleset) = self.ruleset else {
            return false;
        };
        ruleset.sources_for_call(call).into_iter().any(|rule| {
            ruleset
                .source_method(rule)
                .is_some_and(|m| m.taint_positions().contains(&position))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{grammar, storage::SourceFile};

    fn method(source: &str) -> Method {
        let file = SourceFile::from_contents("inline.php", source);
        let grammar = grammar::for_module("php", file).unwrap();
        let definition = grammar.method_definitions().remove(0);
        let mut method = Method::new(definition);
        method.calls = grammar.method_calls(method.body);
        method.assignments = grammar.assignments(method.body);
        method.returns = grammar.returns(method.body);
        method
    }

    #[test]
    fn assignments_carry_source_variables() {
        let source = "<?php function f($a) { $x = $_GET['q'] . $a; $y = trim($x); exec($y); } ?>";
        let method = method(source);
        let flow = DataFlow::follow(&method);
        let ruleset = Ruleset::builtin("php").unwrap();
        let path = ExecutionPath::whole(method.body);
        let tracer = Tracer::new(&method, &flow, Some(&ruleset), &[], &path);

        let exec = source.find("exec").unwrap();
        let reach = tracer.variable("y", exec);

        assert_eq!(reach.origins.len(), 1);
        assert_eq!(reach.origins[0].kind, OriginKind::Variable);
        assert_eq!(reach.origins[0].name, "_GET");
        assert_eq!(reach.parameters, BTreeSet::from([0]));
        assert!(reach.variables.contains("x"));
        assert_eq!(reach.calls.len(), 1);
        assert_eq!(reach.trail.len(), 3);
    }

    #[test]
    fn without_rules_only_the_trail_remains() {
        let source = "<?php function f() { $x = getenv('A'); echo $x; } ?>";
        let method = method(source);
        let flow = DataFlow::follow(&method);
        let path = ExecutionPath::whole(method.body);
        let tracer = Tracer::new(&method, &flow, None, &[], &path);

        let reach = tracer.variable("x", source.find("echo").unwrap());
        assert!(reach.origins.is_empty());
        assert_eq!(reach.trail[0].kind, EventKind::Assignment(0));
    }

    #[test]
    fn globals_count_unless_declared_locally() {
        let source = "<?php function f($b) { echo $a, $b; } ?>";
        let method = method(source);
        let flow = DataFlow::follow(&method);
        let path = ExecutionPath::whole(method.body);
        let globals = ["a".to_string(), "b".to_string()];
        let tracer = Tracer::new(&method, &flow, None, &globals, &path);

        let end = method.body.end;
        assert_eq!(tracer.variable("a", end).origins[0].kind, OriginKind::Global);
        assert!(tracer.variable("b", end).origins.is_empty());
    }
}
