//! Python.

use crate::{
    grammar::{
        ClassDefinition, Grammar, MethodDefinition, Parameter, Span,
        engine::{Dialect, Engine, Layout, split_top_level},
        lexer::{LexOptions, Token, TokenKind},
    },
    storage::SourceFile,
};

static DIALECT: Dialect = Dialect {
    lex: LexOptions {
        line_comments: &["#"],
        block_comments: false,
        preprocessor: false,
        variable_sigil: None,
        php_tags: false,
        triple_quotes: true,
        string_prefixes: true,
        multiline_strings: false,
        significant_indentation: true,
        operators: &[
            "**=", "//=", ">>=", "<<=", "...", "->", ":=", "**", "//", "<<", ">>", "<=", ">=", "==",
            "!=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=",
        ],
    },
    layout: Layout::Indentation,
    attribute_separators: &["."],
    binary_operators: &[
        "+", "-", "*", "/", "//", "%", "**", "<<", ">>", "<", ">", "<=", ">=", "==", "!=", "&", "|",
        "^", "@", ":=",
    ],
    word_operators: &["and", "or", "not", "in", "is", "if", "else", "for", "async"],
    unary_operators: &["-", "+", "~", "*", "**", "not", "await", "yield"],
    assignment_operators: &[
        "=", "+=", "-=", "*=", "/=", "//=", "%=", "**=", ">>=", "<<=", "&=", "|=", "^=", "@=",
    ],
    keywords: &[
        "if", "elif", "else", "while", "for", "try", "except", "finally", "with", "as", "return",
        "pass", "break", "continue", "raise", "import", "from", "global", "nonlocal", "del",
        "assert", "lambda", "yield", "await",
    ],
    literals: &["None", "True", "False"],
    statement_calls: &[],
    constructor_keyword: None,
    definition_keywords: &["def", "class"],
    control_keywords: &["while", "for"],
    elif_keywords: &["elif"],
    keyword_arguments: true,
};

/// Grammar for Python scripts.
#[derive(Debug)]
pub struct PythonGrammar {
    engine: Engine,
}

impl PythonGrammar {
    /// Tokenizes `file` as Python.
    #[must_use]
    pub fn new(file: SourceFile) -> Self {
        Self {
            engine: Engine::new(file, &DIALECT),
        }
    }

    fn definition_at(&self, keyword: usize) -> Option<MethodDefinition> {
        let tokens = self.engine.tokens();
        let name = tokens.get(keyword + 1).filter(|t| t.kind == TokenKind::Ident)?;
        let open = keyword + 2;
        if !tokens.get(open)?.is_punct("(") {
            return None;
        }
        let close = self.engine.matching(open)?;
        let colon = self.engine.suite_colon(close + 1)?;
        let (body, _) = self.engine.suite(colon)?;

        let start = if keyword > 0 && tokens[keyword - 1].is_word("async") {
            tokens[keyword - 1].span.start
        } else {
            tokens[keyword].span.start
        };

        let mut parameters: Vec<Parameter> = split_top_level(&tokens[open + 1..close], ",")
            .into_iter()
            .filter_map(|group| self.parameter(group))
            .collect();
        if parameters.first().is_some_and(|p| p.name == "self") {
            parameters.remove(0);
        }

        Some(MethodDefinition {
            name: name.text.clone(),
            span: Span::new(start, body.end),
            body,
            parameters,
        })
    }

    fn parameter(&self, group: &[Token]) -> Option<Parameter> {
        let name = group
            .iter()
            .find(|t| !t.is_punct("*") && !t.is_punct("**"))
            .filter(|t| t.kind == TokenKind::Ident)?;
        let default = split_top_level(group, "=")
            .get(1)
            .and_then(|value| Some((value.first()?, value.last()?)))
            .map(|(first, last)| {
                self.engine
                    .text(Span::new(first.span.start, last.span.end))
                    .to_string()
            });
        Some(Parameter {
            name: name.text.clone(),
            default,
        })
    }
}

impl Grammar for PythonGrammar {
    fn engine(&self) -> &Engine {
        &self.engine
    }

    fn module(&self) -> &'static str {
        "python"
    }

    fn method_definitions(&self) -> Vec<MethodDefinition> {
        let tokens = self.engine.tokens();
        (0..tokens.len())
            .filter(|idx| tokens[*idx].is_word("def"))
            .filter_map(|idx| self.definition_at(idx))
            .collect()
    }

    fn class_definitions(&self) -> Vec<ClassDefinition> {
        let tokens = self.engine.tokens();
        (0..tokens.len())
            .filter(|idx| tokens[*idx].is_word("class") && self.engine.at_statement_start(*idx, false))
            .filter_map(|idx| {
                let name = tokens.get(idx + 1).filter(|t| t.kind == TokenKind::Ident)?;
                let colon = self.engine.suite_colon(idx + 2)?;
                let (body, _) = self.engine.suite(colon)?;
                Some(ClassDefinition {
                    name: name.text.clone(),
                    span: Span::new(tokens[idx].span.start, body.end),
                })
            })
            .collect()
    }

    fn self_identifier(&self) -> Option<&'static str> {
        Some("self")
    }
}
