//! C.

use crate::{
    grammar::{
        Declaration, Grammar, MethodDefinition, Parameter, Span,
        engine::{Dialect, Engine, Layout, split_top_level},
        lexer::{LexOptions, Token, TokenKind},
    },
    storage::SourceFile,
};

static DIALECT: Dialect = Dialect {
    lex: LexOptions {
        line_comments: &["//"],
        block_comments: true,
        preprocessor: true,
        variable_sigil: None,
        php_tags: false,
        triple_quotes: false,
        string_prefixes: false,
        multiline_strings: false,
        significant_indentation: false,
        operators: &[
            "<<=", ">>=", "...", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||",
            "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
        ],
    },
    layout: Layout::Braces,
    attribute_separators: &[".", "->"],
    binary_operators: &[
        "+", "-", "*", "/", "%", "<<", ">>", "<", ">", "<=", ">=", "==", "!=", "&", "|", "^", "&&",
        "||", "?", ":",
    ],
    word_operators: &[],
    unary_operators: &["-", "+", "!", "~", "*", "&", "++", "--"],
    assignment_operators: &[
        "=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=",
    ],
    keywords: &[
        "if", "else", "while", "for", "do", "switch", "case", "default", "return", "break",
        "continue", "goto", "typedef",
    ],
    literals: &["NULL", "true", "false"],
    statement_calls: &[],
    constructor_keyword: None,
    definition_keywords: &[],
    control_keywords: &["while", "for", "case", "default", "goto"],
    elif_keywords: &[],
    keyword_arguments: false,
};

/// Grammar for C sources.
#[derive(Debug)]
pub struct CGrammar {
    engine: Engine,
}

impl CGrammar {
    /// Tokenizes `file` as C.
    #[must_use]
    pub fn new(file: SourceFile) -> Self {
        Self {
            engine: Engine::new(file, &DIALECT),
        }
    }
}

impl Grammar for CGrammar {
    fn engine(&self) -> &Engine {
        &self.engine
    }

    fn module(&self) -> &'static str {
        "c"
    }

    /// Definitions are `type name(params) { ... }` at file level.
    fn method_definitions(&self) -> Vec<MethodDefinition> {
        let tokens = self.engine.tokens();
        let mut methods = Vec::new();
        let mut depth = 0usize;
        let mut idx = 0;

        while idx < tokens.len() {
            let token = &tokens[idx];
            if token.is_punct("{") {
                depth += 1;
            } else if token.is_punct("}") {
                depth = depth.saturating_sub(1);
            } else if depth == 0
                && token.is_punct("(")
                && idx > 0
                && DIALECT.is_name(&tokens[idx - 1])
            {
                if let Some(method) = self.definition_at(idx) {
                    idx = self.engine.range(method.span).end;
                    methods.push(method);
                    continue;
                }
            }
            idx += 1;
        }
        methods
    }

    fn declarations(&self, span: Span) -> Vec<Declaration> {
        self.engine.declarations(span)
    }

    /// Names declared or assigned outside every function body.
    fn global_variables(&self) -> Vec<String> {
        let mut gaps = Vec::new();
        let mut cursor = 0;
        for method in self.method_definitions() {
            gaps.push(Span::new(cursor, method.span.start));
            cursor = method.span.end;
        }
        gaps.push(Span::new(cursor, self.engine.whole().end));

        let mut globals: Vec<String> = Vec::new();
        for gap in gaps {
            let declared = self.engine.declarations(gap).into_iter().map(|d| d.name);
            let assigned = self
                .engine
                .assignments(gap)
                .into_iter()
                .map(|a| a.target.root().to_string());
            for name in declared.chain(assigned) {
                if !globals.contains(&name) {
                    globals.push(name);
                }
            }
        }
        globals
    }
}

impl CGrammar {
    /// Parses the definition whose parameter list opens at `open`.
    fn definition_at(&self, open: usize) -> Option<MethodDefinition> {
        let tokens = self.engine.tokens();
        let close = self.engine.matching(open)?;
        let body_open = close + 1;
        if !tokens.get(body_open)?.is_punct("{") {
            return None;
        }
        let body_close = self
            .engine
            .matching(body_open)
            .unwrap_or(tokens.len() - 1);

        let name = &tokens[open - 1];
        let mut first = open - 1;
        while first > 0 && is_type_word(&tokens[first - 1]) {
            first -= 1;
        }

        let parameters = split_top_level(&tokens[open + 1..close], ",")
            .into_iter()
            .filter_map(parameter)
            .collect();

        Some(MethodDefinition {
            name: name.text.clone(),
            span: Span::new(tokens[first].span.start, tokens[body_close].span.end),
            body: Span::new(tokens[body_open].span.end, tokens[body_close].span.start),
            parameters,
        })
    }
}

fn is_type_word(token: &Token) -> bool {
    (token.kind == TokenKind::Ident && !DIALECT.keywords.contains(&token.text.as_str()))
        || token.is_punct("*")
}

/// The declared name of a single parameter, `char *argv[]` gives `argv`.
fn parameter(group: &[Token]) -> Option<Parameter> {
    if group.is_empty()
        || (group.len() == 1 && group[0].is_word("void"))
        || group.iter().any(|t| t.is_punct("..."))
    {
        return None;
    }

    // function pointer, `int (*callback)(int)`
    if let Some(pos) = group
        .windows(2)
        .position(|pair| pair[0].is_punct("(") && pair[1].is_punct("*"))
    {
        return group[pos + 2..]
            .iter()
            .find(|t| t.kind == TokenKind::Ident)
            .map(|t| Parameter::new(t.text.clone()));
    }

    let cut = group
        .iter()
        .position(|t| t.is_punct("["))
        .unwrap_or(group.len());
    group[..cut]
        .iter()
        .rev()
        .find(|t| t.kind == TokenKind::Ident)
        .map(|t| Parameter::new(t.text.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar(path: &str) -> CGrammar {
        let full = format!("{}/testdata/{path}", env!("CARGO_MANIFEST_DIR"));
        CGrammar::new(SourceFile::read(full).unwrap())
    }

    fn inline(source: &str) -> CGrammar {
        CGrammar::new(SourceFile::from_contents("inline.c", source))
    }

    #[test]
    fn finds_definitions_despite_missing_semicolon() {
        let grammar = grammar("analysis/euclid-complexity.c");
        let methods = grammar.method_definitions();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "euclid");
        let names: Vec<_> = methods[0].parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["n", "m"]);
        assert_eq!(grammar.declarations(methods[0].body)[0].name, "r");
    }

    #[test]
    fn main_of_getenv_fixture() {
        let grammar = grammar("analysis/getenv-sprintf.c");
        let methods = grammar.method_definitions();
        assert_eq!(methods.len(), 1);
        let main = &methods[0];
        let names: Vec<_> = main.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["argc", "argv"]);

        let calls: Vec<_> = grammar
            .method_calls(main.body)
            .into_iter()
            .map(|c| c.name.to_string())
            .collect();
        assert_eq!(calls, ["getenv", "sprintf", "sprintf"]);

        let assignments = grammar.assignments(main.body);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].target.name, "env_editor");

        assert_eq!(grammar.global_variables(), ["editor"]);

        let chains = grammar.mutually_exclusive_positions(main.body);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].alternatives.len(), 2);
        assert!(chains[0].exhaustive);
    }

    #[test]
    fn nested_calls_follow_their_parent() {
        let grammar = inline("void f() { printf(\"%s\", strcat(a, getenv(\"X\"))); }");
        let body = grammar.method_definitions()[0].body;
        let calls: Vec<_> = grammar
            .method_calls(body)
            .into_iter()
            .map(|c| c.name.name)
            .collect();
        assert_eq!(calls, ["printf", "strcat", "getenv"]);
    }

    #[test]
    fn member_calls_keep_their_object() {
        let grammar = inline("void f(struct io *io) { io->ops.write(io, buf); }");
        let body = grammar.method_definitions()[0].body;
        let call = &grammar.method_calls(body)[0];
        assert_eq!(call.name.object, ["io", "ops"]);
        assert_eq!(call.name.name, "write");
    }

    #[test]
    fn casts_keep_their_operand() {
        let grammar = inline("void f() { x = (int) y + (char *) z; }");
        let body = grammar.method_definitions()[0].body;
        let assignment = &grammar.assignments(body)[0];
        assert_eq!(assignment.value.variables(), ["y", "z"]);
    }

    #[test]
    fn compound_assignment_reads_the_target() {
        let grammar = inline("void f() { total += step; }");
        let body = grammar.method_definitions()[0].body;
        let assignment = &grammar.assignments(body)[0];
        assert_eq!(assignment.value.variables(), ["total", "step"]);
    }

    #[test]
    fn else_if_chains_are_one_chain() {
        let grammar = inline(
            "void f(int a) { if (a) { g(); } else if (a > 1) h(); else { i(); } j(); }",
        );
        let body = grammar.method_definitions()[0].body;
        let chains = grammar.mutually_exclusive_positions(body);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].alternatives.len(), 3);
        assert_eq!(grammar.branch_headers(body).len(), 3);
    }

    #[test]
    fn prototypes_are_not_definitions() {
        let grammar = inline("int g(int);\nstatic int counter = 0;\nint g(int x) { return x; }");
        let methods = grammar.method_definitions();
        assert_eq!(methods.len(), 1);
        assert_eq!(grammar.global_variables(), ["counter"]);
        assert!(grammar.returns(methods[0].body)[0].value.is_some());
    }
}
