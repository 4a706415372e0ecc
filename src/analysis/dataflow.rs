//! Where variables are defined and used within a method.

use std::collections::BTreeMap;

use crate::{
    domain::{ExecutionPath, Method},
    grammar::{Expression, Span, Term},
};

/// What happens to a variable at an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The variable is the parameter at this index.
    Parameter(usize),
    /// The variable is declared without a value.
    Declaration,
    /// The variable is assigned by the assignment at this index.
    Assignment(usize),
    /// The variable is passed on its own to the call at this index, which
    /// may write to it.
    Argument {
        /// Index into [`Method::calls`].
        call: usize,
        /// Argument position.
        position: usize,
    },
    /// The variable is read.
    Use,
}

/// One step in the life of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    /// What happens.
    pub kind: EventKind,
    /// The statement or reference it happens in.
    pub span: Span,
}

/// Events per variable, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFlow {
    variables: BTreeMap<String, Vec<Event>>,
}

impl DataFlow {
    /// Collects the events of every variable in `method`.
    #[must_use]
    pub fn follow(method: &Method) -> Self {
        let mut flow = Self::default();
        let signature = Span::new(method.span.start, method.body.start);

        for (idx, parameter) in method.parameters.iter().enumerate() {
            flow.push(&parameter.name, EventKind::Parameter(idx), signature);
        }
        for declaration in &method.declarations {
            flow.push(&declaration.name, EventKind::Declaration, declaration.span);
        }
        for (idx, assignment) in method.assignments.iter().enumerate() {
            flow.push(
                assignment.target.root(),
                EventKind::Assignment(idx),
                assignment.span,
            );
            flow.uses(&assignment.value);
        }
        for (idx, call) in method.calls.iter().enumerate() {
            for (position, arg) in call.args.iter().enumerate() {
                if let Some(variable) = arg.as_variable() {
                    flow.push(
                        variable,
                        EventKind::Argument {
                            call: idx,
                            position,
                        },
                        call.span,
                    );
                }
                flow.uses(arg);
            }
        }
        for value in method.returns.iter().filter_map(|r| r.value.as_ref()) {
            flow.uses(value);
        }

        for events in flow.variables.values_mut() {
            events.sort_by_key(|event| event.span.start);
            events.dedup();
        }
        flow
    }

    fn push(&mut self, variable: &str, kind: EventKind, span: Span) {
        self.variables
            .entry(variable.to_string())
            .or_default()
            .push(Event { kind, span });
    }

    // Nested calls are listed in `Method::calls` themselves.
    fn uses(&mut self, expression: &Expression) {
        for term in &expression.terms {
            if let Term::Reference(reference) = term {
                self.push(reference.identifier.root(), EventKind::Use, reference.span);
            }
        }
    }

    /// Every variable with at least one event.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// The events of `variable` in source order.
    #[must_use]
    pub fn events(&self, variable: &str) -> &[Event] {
        self.variables.get(variable).map_or(&[], Vec::as_slice)
    }

    /// Whether `variable` is a parameter or declared in the method.
    #[must_use]
    pub fn is_local(&self, variable: &str) -> bool {
        self.events(variable)
            .iter()
            .any(|e| matches!(e.kind, EventKind::Parameter(_) | EventKind::Declaration))
    }

    /// Events of `variable` that complete before `position` on `path`,
    /// latest first. Parameters precede every path.
    pub fn before<'a>(
        &'a self,
        variable: &str,
        position: usize,
        path: &'a ExecutionPath,
    ) -> impl Iterator<Item = &'a Event> + use<'a> {
        self.events(variable).iter().rev().filter(move |event| {
            matches!(event.kind, EventKind::Parameter(_))
                || (event.span.end <= position && path.covers(event.span))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{grammar, storage::SourceFile};

    fn method(module: &str, source: &str) -> Method {
        let file = SourceFile::from_contents("inline", source);
        let grammar = grammar::for_module(module, file).unwrap();
        let definition = grammar.method_definitions().remove(0);
        let mut method = Method::new(definition);
        method.calls = grammar.method_calls(method.body);
        method.assignments = grammar.assignments(method.body);
        method.declarations = grammar.declarations(method.body);
        method.returns = grammar.returns(method.body);
        method
    }

    #[test]
    fn events_in_source_order() {
        let method = method(
            "c",
            "int f(int a) { char buf[8]; int b = a + 1; fgets(buf, b, stdin); return b; }",
        );
        let flow = DataFlow::follow(&method);

        let kinds: Vec<_> = flow.events("b").iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [
                EventKind::Assignment(0),
                EventKind::Argument {
                    call: 0,
                    position: 1
                },
                EventKind::Use,
                EventKind::Use
            ]
        );
        assert_eq!(
            flow.events("buf")[1].kind,
            EventKind::Argument {
                call: 0,
                position: 0
            }
        );
        assert!(flow.is_local("a"));
        assert!(flow.is_local("buf"));
        assert!(!flow.is_local("stdin"));
    }

    #[test]
    fn before_respects_position_and_path() {
        let source = "void f(int a) { a = 1; a = 2; g(a); }";
        let method = method("c", source);
        let flow = DataFlow::follow(&method);
        let call = source.find("g(").unwrap();
        let second = source.find("a = 2").unwrap();

        let whole = ExecutionPath::whole(method.body);
        let latest = flow.before("a", call, &whole).next().unwrap();
        assert_eq!(latest.kind, EventKind::Assignment(1));

        let skipping_second = ExecutionPath::from_segments([
            Span::new(method.body.start, second),
            Span::new(call, method.body.end),
        ])
        .unwrap();
        let latest = flow.before("a", call, &skipping_second).next().unwrap();
        assert_eq!(latest.kind, EventKind::Assignment(0));
    }
}
