//! Heuristic parsers that turn source files into the facts the analysis
//! needs: methods, calls, assignments, branches and classes.
//!
//! Each supported language implements [`Grammar`]. Most operations have a
//! default implementation on top of the shared [`Engine`]; languages override
//! what differs.

mod c;
pub mod engine;
pub mod lexer;
mod php;
mod python;
mod syntax;

pub use c::CGrammar;
pub use engine::Engine;
pub use php::PhpGrammar;
pub use python::PythonGrammar;
pub use syntax::{
    Alternative, Assignment, BranchChain, Call, CallKind, ClassDefinition, Declaration,
    Expression, Identifier, Literal, MethodDefinition, Parameter, Reference, Return, Span, Term,
};

use crate::storage::SourceFile;

/// Modules with a grammar.
pub const MODULES: &[&str] = &["c", "php", "python"];

/// Returns the grammar for `module`, or `None` if the language is not
/// supported.
#[must_use]
pub fn for_module(module: &str, file: SourceFile) -> Option<Box<dyn Grammar>> {
    match module {
        "c" => Some(Box::new(CGrammar::new(file))),
        "php" => Some(Box::new(PhpGrammar::new(file))),
        "python" => Some(Box::new(PythonGrammar::new(file))),
        _ => None,
    }
}

/// The language seam consumed by the analysis.
///
/// All spans are absolute byte offsets into [`Grammar::file`].
pub trait Grammar: Send + Sync {
    /// The tokenized file.
    fn engine(&self) -> &Engine;

    /// The module name, which also selects the ruleset.
    fn module(&self) -> &'static str;

    /// The analysed file.
    fn file(&self) -> &SourceFile {
        self.engine().file()
    }

    /// Every method or function defined in the file.
    fn method_definitions(&self) -> Vec<MethodDefinition>;

    /// Parameters of the method whose span or body is `span`.
    fn parameters(&self, span: Span) -> Vec<Parameter> {
        self.method_definitions()
            .into_iter()
            .find(|m| m.span == span || m.body == span)
            .map(|m| m.parameters)
            .unwrap_or_default()
    }

    /// Calls inside `span`, nested calls included.
    fn method_calls(&self, span: Span) -> Vec<Call> {
        self.engine().calls(span)
    }

    /// Assignments inside `span`.
    fn assignments(&self, span: Span) -> Vec<Assignment> {
        self.engine().assignments(span)
    }

    /// Declarations without initializer inside `span`.
    fn declarations(&self, _span: Span) -> Vec<Declaration> {
        Vec::new()
    }

    /// Variables defined outside every method.
    fn global_variables(&self) -> Vec<String> {
        Vec::new()
    }

    /// `return` statements inside `span`.
    fn returns(&self, span: Span) -> Vec<Return> {
        self.engine().returns(span)
    }

    /// Loops, case labels and jumps inside `span`.
    fn control_structures(&self, span: Span) -> Vec<Span> {
        self.engine().control_structures(span)
    }

    /// Outermost branch chains inside `span`.
    fn mutually_exclusive_positions(&self, span: Span) -> Vec<BranchChain> {
        self.engine().branch_chains(span)
    }

    /// `if`, `else if` and `else` headers inside `span`.
    fn branch_headers(&self, span: Span) -> Vec<Span> {
        self.engine().branch_headers(span)
    }

    /// Simple statements inside `span`.
    fn statement_count(&self, span: Span) -> usize {
        self.method_calls(span).len()
            + self.assignments(span).len()
            + self.declarations(span).len()
            + self.returns(span).len()
    }

    /// Nodes of the control flow graph of `span`.
    fn node_count(&self, span: Span) -> usize {
        self.control_structures(span).len()
            + self.branch_headers(span).len()
            + self.statement_count(span)
    }

    /// Edges of the control flow graph of `span`. A loop adds three edges, a
    /// branch header two, a statement one.
    fn edge_count(&self, span: Span) -> usize {
        3 * self.control_structures(span).len()
            + 2 * self.branch_headers(span).len()
            + self.statement_count(span)
    }

    /// Classes defined in the file.
    fn class_definitions(&self) -> Vec<ClassDefinition> {
        Vec::new()
    }

    /// The name a method uses for its own object.
    fn self_identifier(&self) -> Option<&'static str> {
        None
    }
}
