//! PHP.

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
        line_comments: &["//", "#"],
        block_comments: true,
        preprocessor: false,
        variable_sigil: Some('$'),
        php_tags: true,
        triple_quotes: false,
        string_prefixes: false,
        multiline_strings: true,
        significant_indentation: false,
        operators: &[
            "<=>", "===", "!==", "**=", "??=", "<<=", ">>=", "...", "?->", "->", "::", "=>", "++",
            "--", "<<", ">>", "<=", ">=", "==", "!=", "<>", "&&", "||", "??", "+=", "-=", "*=",
            "/=", ".=", "%=", "&=", "|=", "^=", "**",
        ],
    },
    layout: Layout::Braces,
    attribute_separators: &["->", "?->", "::"],
    binary_operators: &[
        "+", "-", "*", "/", "%", ".", "**", "<<", ">>", "<", ">", "<=", ">=", "==", "!=", "===",
        "!==", "<>", "<=>", "&", "|", "^", "&&", "||", "??", "?", ":",
    ],
    word_operators: &["and", "or", "xor", "instanceof"],
    unary_operators: &["-", "+", "!", "~", "@", "&", "++", "--", "clone"],
    assignment_operators: &[
        "=", "+=", "-=", "*=", "/=", ".=", "%=", "&=", "|=", "^=", "<<=", ">>=", "**=", "??=",
    ],
    keywords: &[
        "if", "else", "elseif", "while", "do", "for", "foreach", "switch", "case", "default",
        "return", "break", "continue", "extends", "implements", "public", "private", "protected",
        "static", "abstract", "final", "const", "global", "as", "use", "namespace", "try",
        "catch", "finally", "throw", "goto", "var", "endif", "endwhile", "endfor", "endforeach",
        "endswitch", "declare", "yield",
    ],
    literals: &[
        "true",
        "false",
        "null",
        "TRUE",
        "FALSE",
        "NULL",
        "__CLASS__",
        "__FILE__",
        "__LINE__",
        "__DIR__",
        "__FUNCTION__",
        "__METHOD__",
        "__NAMESPACE__",
    ],
    statement_calls: &[
        "echo",
        "print",
        "include",
        "include_once",
        "require",
        "require_once",
    ],
    constructor_keyword: Some("new"),
    definition_keywords: &["function", "class", "interface", "trait"],
    control_keywords: &["while", "for", "foreach", "case", "default", "goto"],
    elif_keywords: &["elseif"],
    keyword_arguments: true,
};

/// Grammar for PHP scripts.
#[derive(Debug)]
pub struct PhpGrammar {
    engine: Engine,
}

impl PhpGrammar {
    /// Tokenizes `file` as PHP.
    #[must_use]
    pub fn new(file: SourceFile) -> Self {
        Self {
            engine: Engine::new(file, &DIALECT),
        }
    }
}

impl Grammar for PhpGrammar {
    fn engine(&self) -> &Engine {
        &self.engine
    }

    fn module(&self) -> &'static str {
        "php"
    }

    fn method_definitions(&self) -> Vec<MethodDefinition> {
        let tokens = self.engine.tokens();
        let mut methods = Vec::new();
        let mut idx = 0;
        while idx < tokens.len() {
            if tokens[idx].is_word("function") {
                if let Some((method, last)) = self.definition_at(idx) {
                    methods.push(method);
                    idx = last + 1;
                    continue;
                }
            }
            idx += 1;
        }
        methods
    }

    fn class_definitions(&self) -> Vec<ClassDefinition> {
        let tokens = self.engine.tokens();
        let mut classes = Vec::new();
        for (idx, token) in tokens.iter().enumerate() {
            let introduces = ["class", "interface", "trait"]
                .iter()
                .any(|word| token.is_word(word));
            let qualified = idx > 0 && tokens[idx - 1].is_punct("::");
            if !introduces || qualified {
                continue;
            }
            let Some(name) = tokens.get(idx + 1).filter(|t| t.kind == TokenKind::Ident) else {
                continue;
            };
            let Some(open) = tokens[idx..].iter().position(|t| t.is_punct("{")) else {
                continue;
            };
            let close = self
                .engine
                .matching(idx + open)
                .unwrap_or(tokens.len() - 1);
            classes.push(ClassDefinition {
                name: name.text.clone(),
                span: Span::new(token.span.start, tokens[close].span.end),
            });
        }
        classes
    }

    fn self_identifier(&self) -> Option<&'static str> {
        Some("this")
    }
}

impl PhpGrammar {
    /// Parses `function [&]name(params)[: type] { ... }` at `keyword`.
    /// Returns the definition and the index of its closing brace.
    fn definition_at(&self, keyword: usize) -> Option<(MethodDefinition, usize)> {
        let tokens = self.engine.tokens();
        let mut name_idx = keyword + 1;
        if tokens.get(name_idx)?.is_punct("&") {
            name_idx += 1;
        }
        let name = tokens.get(name_idx).filter(|t| t.kind == TokenKind::Ident)?;
        let open = name_idx + 1;
        if !tokens.get(open)?.is_punct("(") {
            return None;
        }
        let close = self.engine.matching(open)?;

        let body_open = tokens[close..]
            .iter()
            .position(|t| t.is_punct("{") || t.is_punct(";"))
            .map(|offset| close + offset)?;
        if tokens[body_open].is_punct(";") {
            return None;
        }
        let body_close = self
            .engine
            .matching(body_open)
            .unwrap_or(tokens.len() - 1);

        let parameters = split_top_level(&tokens[open + 1..close], ",")
            .into_iter()
            .filter_map(|group| self.parameter(group))
            .collect();

        let method = MethodDefinition {
            name: name.text.clone(),
            span: Span::new(tokens[keyword].span.start, tokens[body_close].span.end),
            body: Span::new(tokens[body_open].span.end, tokens[body_close].span.start),
            parameters,
        };
        Some((method, body_close))
    }

    fn parameter(&self, group: &[Token]) -> Option<Parameter> {
        let variable = group.iter().find(|t| t.kind == TokenKind::Variable)?;
        let default = split_top_level(group, "=")
            .get(1)
            .and_then(|value| Some((value.first()?, value.last()?)))
            .map(|(first, last)| {
                self.engine
                    .text(Span::new(first.span.start, last.span.end))
                    .to_string()
            });
        Some(Parameter {
            name: variable.text.clone(),
            default,
        })
    }
}
