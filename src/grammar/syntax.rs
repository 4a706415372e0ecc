//! The language independent syntax tree handed to the analysis.

use std::fmt;

use serde::Serialize;

/// A half-open range of byte offsets into a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Span {
    /// First byte covered by the span.
    pub start: usize,
    /// First byte after the span.
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Whether `offset` lies inside the span.
    #[must_use]
    pub const fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Whether `other` lies entirely inside the span.
    #[must_use]
    pub const fn encloses(&self, other: Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A possibly qualified name such as `os.path.join` or `$this->db->query`.
///
/// The object path holds every segment but the last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identifier {
    /// Leading segments, outermost first.
    pub object: Vec<String>,
    /// The final segment.
    pub name: String,
}

impl Identifier {
    /// An unqualified name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            object: Vec::new(),
            name: name.into(),
        }
    }

    /// Splits a dotted path such as `os.environ.get`.
    #[must_use]
    pub fn from_dotted(path: &str) -> Self {
        let mut segments: Vec<String> = path.split('.').map(str::to_string).collect();
        let name = segments.pop().unwrap_or_default();
        Self {
            object: segments,
            name,
        }
    }

    /// The object path joined with `.`, or `None` for plain names.
    #[must_use]
    pub fn object_name(&self) -> Option<String> {
        if self.object.is_empty() {
            None
        } else {
            Some(self.object.join("."))
        }
    }

    /// The variable the identifier is rooted in.
    #[must_use]
    pub fn root(&self) -> &str {
        self.object.first().unwrap_or(&self.name)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.object {
            write!(f, "{segment}.")?;
        }
        f.write_str(&self.name)
    }
}

/// A variable or attribute reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// What is referenced.
    pub identifier: Identifier,
    /// Where.
    pub span: Span,
}

/// A literal value, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    /// The literal's source text.
    pub text: String,
    /// Where.
    pub span: Span,
}

/// One operand of an [`Expression`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// A call, possibly with nested calls in its arguments.
    Call(Call),
    /// A variable.
    Reference(Reference),
    /// A constant.
    Literal(Literal),
}

/// A flattened expression: operators are dropped, operands are kept in
/// source order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expression {
    /// The operands.
    pub terms: Vec<Term>,
    /// Where.
    pub span: Span,
}

impl Expression {
    /// Root variables referenced anywhere in the expression, nested call
    /// arguments and receivers included.
    #[must_use]
    pub fn variables(&self) -> Vec<&str> {
        let mut variables = Vec::new();
        self.collect_variables(&mut variables);
        variables
    }

    fn collect_variables<'a>(&'a self, into: &mut Vec<&'a str>) {
        for term in &self.terms {
            match term {
                Term::Reference(reference) => into.push(reference.identifier.root()),
                Term::Call(call) => {
                    if !call.name.object.is_empty() {
                        into.push(call.name.root());
                    }
                    for arg in &call.args {
                        arg.collect_variables(into);
                    }
                }
                Term::Literal(_) => {}
            }
        }
    }

    /// The literal text when the expression is a single literal.
    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self.terms.as_slice() {
            [Term::Literal(literal)] => Some(&literal.text),
            _ => None,
        }
    }

    /// The referenced variable when the expression is a single reference.
    #[must_use]
    pub fn as_variable(&self) -> Option<&str> {
        match self.terms.as_slice() {
            [Term::Reference(reference)] => Some(reference.identifier.root()),
            _ => None,
        }
    }

    /// Calls every call in the expression, depth first.
    pub fn for_each_call_mut(&mut self, f: &mut dyn FnMut(&mut Call)) {
        for term in &mut self.terms {
            if let Term::Call(call) = term {
                call.for_each_call_mut(f);
            }
        }
    }
}

/// How a call was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// `f(x)` or `obj.f(x)`.
    Function,
    /// `new Foo(x)`.
    Constructor,
    /// A call on the result of another call, `f().g()`.
    Chained,
    /// A language statement that behaves like a call, such as PHP `echo`.
    Statement,
}

/// A call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Called name.
    pub name: Identifier,
    /// Arguments in order.
    pub args: Vec<Expression>,
    /// The whole call, arguments included.
    pub span: Span,
    /// Call syntax.
    pub kind: CallKind,
}

impl Call {
    /// Applies `f` to this call and then to every call nested in its
    /// arguments.
    pub fn for_each_call_mut(&mut self, f: &mut dyn FnMut(&mut Self)) {
        f(self);
        for arg in &mut self.args {
            arg.for_each_call_mut(f);
        }
    }

    /// This call followed by all nested calls, in source order.
    #[must_use]
    pub fn flatten(&self) -> Vec<Self> {
        let mut calls = vec![self.clone()];
        for arg in &self.args {
            for term in &arg.terms {
                if let Term::Call(nested) = term {
                    calls.extend(nested.flatten());
                }
            }
        }
        calls
    }
}

/// `target = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// The assigned name.
    pub target: Identifier,
    /// The assigned value. Compound assignments include the target itself.
    pub value: Expression,
    /// The whole statement.
    pub span: Span,
}

/// A `return` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Return {
    /// The returned value, if any.
    pub value: Option<Expression>,
    /// Where.
    pub span: Span,
}

/// A variable declaration without initializer, such as `char buf[20];`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Declared name.
    pub name: String,
    /// Where.
    pub span: Span,
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Default value source text, if any.
    pub default: Option<String>,
}

impl Parameter {
    /// A parameter without a default value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }
}

/// A function or method definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDefinition {
    /// The method name.
    pub name: String,
    /// The whole definition, signature included.
    pub span: Span,
    /// The body only.
    pub body: Span,
    /// Formal parameters in order.
    pub parameters: Vec<Parameter>,
}

/// A class definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefinition {
    /// The class name.
    pub name: String,
    /// The whole definition.
    pub span: Span,
}

/// One arm of a [`BranchChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alternative {
    /// Header and body.
    pub span: Span,
    /// Body only.
    pub body: Span,
}

/// An `if`/`else if`/`else` chain. At most one alternative runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchChain {
    /// The whole chain.
    pub span: Span,
    /// The arms, in source order.
    pub alternatives: Vec<Alternative>,
    /// Whether the chain ends with an unconditional `else`.
    pub exhaustive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_root_and_display() {
        let identifier = Identifier::from_dotted("os.environ.get");
        assert_eq!(identifier.root(), "os");
        assert_eq!(identifier.object_name().as_deref(), Some("os.environ"));
        assert_eq!(identifier.to_string(), "os.environ.get");
        assert_eq!(Identifier::new("getenv").root(), "getenv");
    }

    #[test]
    fn variables_reach_into_nested_calls() {
        let expression = Expression {
            terms: vec![Term::Call(Call {
                name: Identifier::from_dotted("conn.query"),
                args: vec![Expression {
                    terms: vec![Term::Reference(Reference {
                        identifier: Identifier::new("sql"),
                        span: Span::new(11, 14),
                    })],
                    span: Span::new(11, 14),
                }],
                span: Span::new(0, 15),
                kind: CallKind::Function,
            })],
            span: Span::new(0, 15),
        };
        assert_eq!(expression.variables(), ["conn", "sql"]);
    }

    #[test]
    fn span_containment() {
        let span = Span::new(10, 20);
        assert!(span.contains(10));
        assert!(!span.contains(20));
        assert!(span.encloses(Span::new(12, 20)));
        assert!(!span.encloses(Span::new(5, 12)));
    }
}
