//! Token-level scanning shared by the language grammars.
//!
//! Every search works like a scanner: it tries to parse its construct at each
//! token of a span and moves one token on when that fails. Unknown syntax is
//! therefore skipped rather than rejected.

use std::ops::Range;

use crate::{
    grammar::{
        lexer::{self, LexOptions, Token, TokenKind},
        syntax::{
            Alternative, Assignment, BranchChain, Call, CallKind, Declaration, Expression,
            Identifier, Literal, Reference, Return, Span, Term,
        },
    },
    storage::SourceFile,
};

/// How blocks are delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `{ ... }` blocks, `;` terminated statements.
    Braces,
    /// Indented suites introduced by `:`.
    Indentation,
}

/// The vocabulary of a language, as far as the scanners care.
#[derive(Debug)]
pub struct Dialect {
    /// Tokenizer settings.
    pub lex: LexOptions,
    /// Block structure.
    pub layout: Layout,
    /// Separators between an object and its attribute.
    pub attribute_separators: &'static [&'static str],
    /// Infix operators.
    pub binary_operators: &'static [&'static str],
    /// Infix operators spelled as words (`and`, `instanceof`).
    pub word_operators: &'static [&'static str],
    /// Prefix operators, punctuation or words.
    pub unary_operators: &'static [&'static str],
    /// Plain and compound assignment operators.
    pub assignment_operators: &'static [&'static str],
    /// Reserved words that never name a call or variable.
    pub keywords: &'static [&'static str],
    /// Words that are literal values.
    pub literals: &'static [&'static str],
    /// Statements that behave like calls without parentheses.
    pub statement_calls: &'static [&'static str],
    /// The keyword that introduces a constructor call.
    pub constructor_keyword: Option<&'static str>,
    /// Words that introduce definitions; the name after them is no call.
    pub definition_keywords: &'static [&'static str],
    /// Loops, `case` labels and jumps.
    pub control_keywords: &'static [&'static str],
    /// Single-word `else if` spellings.
    pub elif_keywords: &'static [&'static str],
    /// Whether `name=value` or `name: value` may label an argument.
    pub keyword_arguments: bool,
}

impl Dialect {
    fn is_reserved(&self, word: &str) -> bool {
        self.keywords.contains(&word)
            || self.literals.contains(&word)
            || self.word_operators.contains(&word)
            || self.statement_calls.contains(&word)
            || self.definition_keywords.contains(&word)
            || self.constructor_keyword == Some(word)
    }

    /// Whether the token names a variable, function or attribute.
    #[must_use]
    pub fn is_name(&self, token: &Token) -> bool {
        match token.kind {
            TokenKind::Variable => true,
            TokenKind::Ident => !self.is_reserved(&token.text),
            _ => false,
        }
    }

    fn is_keyword(&self, token: &Token) -> bool {
        token.kind == TokenKind::Ident && self.keywords.contains(&token.text.as_str())
    }

    fn is_elif(&self, token: &Token) -> bool {
        token.kind == TokenKind::Ident && self.elif_keywords.contains(&token.text.as_str())
    }

    fn is_type_token(&self, token: &Token) -> bool {
        (token.kind == TokenKind::Ident && !self.is_keyword(token))
            || token.is_punct("*")
            || token.is_punct("&")
    }

    fn is_boundary(&self, token: &Token) -> bool {
        if token.is_layout() {
            return true;
        }
        match token.kind {
            TokenKind::Punct => matches!(token.text.as_str(), ";" | "{" | "}" | ")" | ":"),
            TokenKind::Ident => matches!(token.text.as_str(), "else" | "do"),
            _ => false,
        }
    }
}

/// A tokenized source file plus the scanners that work on it.
#[derive(Debug)]
pub struct Engine {
    file: SourceFile,
    tokens: Vec<Token>,
    dialect: &'static Dialect,
}

impl Engine {
    /// Tokenizes `file` with the rules of `dialect`.
    #[must_use]
    pub fn new(file: SourceFile, dialect: &'static Dialect) -> Self {
        let tokens = lexer::tokenize(file.contents(), &dialect.lex);
        Self {
            file,
            tokens,
            dialect,
        }
    }

    /// The analysed file.
    #[must_use]
    pub const fn file(&self) -> &SourceFile {
        &self.file
    }

    /// All tokens of the file.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// The language vocabulary.
    #[must_use]
    pub const fn dialect(&self) -> &'static Dialect {
        self.dialect
    }

    /// The source text covered by `span`.
    #[must_use]
    pub fn text(&self, span: Span) -> &str {
        self.file.contents().get(span.start..span.end).unwrap_or_default()
    }

    /// A span covering the whole file.
    #[must_use]
    pub fn whole(&self) -> Span {
        Span::new(0, self.file.contents().len())
    }

    /// Indices of the tokens that lie entirely inside `span`.
    #[must_use]
    pub fn range(&self, span: Span) -> Range<usize> {
        let start = self.tokens.partition_point(|t| t.span.start < span.start);
        let end = self.tokens.partition_point(|t| t.span.end <= span.end);
        start..end.max(start)
    }

    /// Index of the bracket closing the one at `open`.
    #[must_use]
    pub fn matching(&self, open: usize) -> Option<usize> {
        let opener = self.tokens.get(open)?;
        let closer = match opener.text.as_str() {
            "(" => ")",
            "[" => "]",
            "{" => "}",
            _ => return None,
        };
        let mut depth = 0usize;
        for (idx, token) in self.tokens.iter().enumerate().skip(open) {
            if token.is_punct(&opener.text) {
                depth += 1;
            } else if token.is_punct(closer) {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
        }
        None
    }

    /// Whether a statement may begin at token `idx`. In brace languages type
    /// words in front of the token are skipped, so `char *p = x` starts at `p`.
    #[must_use]
    pub fn at_statement_start(&self, idx: usize, skip_types: bool) -> bool {
        let mut start = idx;
        if skip_types && self.dialect.layout == Layout::Braces {
            while start > 0 && self.dialect.is_type_token(&self.tokens[start - 1]) {
                start -= 1;
            }
        }
        start == 0 || self.dialect.is_boundary(&self.tokens[start - 1])
    }

    fn parser(&self, pos: usize) -> Parser<'_> {
        Parser {
            tokens: &self.tokens,
            pos,
            dialect: self.dialect,
        }
    }

    /// Every call inside `span`, nested calls included, in source order.
    #[must_use]
    pub fn calls(&self, span: Span) -> Vec<Call> {
        let range = self.range(span);
        let mut calls = Vec::new();
        let mut idx = range.start;

        while idx < range.end {
            let token = &self.tokens[idx];
            let after_definition = idx > 0
                && self.tokens[idx - 1].kind == TokenKind::Ident
                && self
                    .dialect
                    .definition_keywords
                    .contains(&self.tokens[idx - 1].text.as_str());

            let mut parser = self.parser(idx);
            if let Some(call) = parser.statement_call() {
                if parser.pos <= range.end {
                    calls.extend(call.flatten());
                    idx = parser.pos;
                    continue;
                }
            }

            let starts_operand = self.dialect.is_name(token)
                || (token.kind == TokenKind::Ident
                    && self.dialect.constructor_keyword == Some(token.text.as_str()));
            if starts_operand && !after_definition {
                let mut parser = self.parser(idx);
                if let Some(terms) = parser.operand() {
                    let found: Vec<Call> = terms
                        .iter()
                        .filter_map(|term| match term {
                            Term::Call(call) => Some(call.flatten()),
                            _ => None,
                        })
                        .flatten()
                        .collect();
                    if !found.is_empty() && parser.pos <= range.end {
                        calls.extend(found);
                        idx = parser.pos;
                        continue;
                    }
                }
            }
            idx += 1;
        }
        calls
    }

    /// Assignments that start a statement inside `span`.
    #[must_use]
    pub fn assignments(&self, span: Span) -> Vec<Assignment> {
        let range = self.range(span);
        let mut assignments = Vec::new();
        let mut idx = range.start;

        while idx < range.end {
            if self.dialect.is_name(&self.tokens[idx]) && self.at_statement_start(idx, true) {
                let mut parser = self.parser(idx);
                if let Some(assignment) = parser.assignment() {
                    if parser.pos <= range.end {
                        assignments.push(assignment);
                        idx = parser.pos;
                        continue;
                    }
                }
            }
            idx += 1;
        }
        assignments
    }

    /// `return` statements inside `span`.
    #[must_use]
    pub fn returns(&self, span: Span) -> Vec<Return> {
        let range = self.range(span);
        let mut returns = Vec::new();

        for idx in range {
            let token = &self.tokens[idx];
            if !token.is_word("return") {
                continue;
            }
            let mut parser = self.parser(idx + 1);
            let value = if parser.at_statement_end() {
                None
            } else {
                parser.expression_list()
            };
            let end = value.as_ref().map_or(token.span.end, |v| v.span.end);
            returns.push(Return {
                value,
                span: Span::new(token.span.start, end),
            });
        }
        returns
    }

    /// Declarations without initializer, `type name[, name];`.
    #[must_use]
    pub fn declarations(&self, span: Span) -> Vec<Declaration> {
        let range = self.range(span);
        let mut declarations = Vec::new();
        let mut idx = range.start;

        while idx < range.end {
            if self.at_statement_start(idx, false) {
                let mut parser = self.parser(idx);
                if let Some(found) = parser.declaration() {
                    if parser.pos <= range.end {
                        declarations.extend(found);
                        idx = parser.pos;
                        continue;
                    }
                }
            }
            idx += 1;
        }
        declarations
    }

    /// Loops, `case` labels and jumps inside `span`.
    #[must_use]
    pub fn control_structures(&self, span: Span) -> Vec<Span> {
        self.range(span)
            .filter(|idx| {
                let token = &self.tokens[*idx];
                if token.kind != TokenKind::Ident
                    || !self.dialect.control_keywords.contains(&token.text.as_str())
                {
                    return false;
                }
                match self.dialect.layout {
                    Layout::Braces if token.text == "default" => self
                        .tokens
                        .get(idx + 1)
                        .is_some_and(|next| next.is_punct(":")),
                    Layout::Braces => true,
                    Layout::Indentation => self.at_statement_start(*idx, false),
                }
            })
            .map(|idx| self.tokens[idx].span)
            .collect()
    }

    /// Every `if`, `else if` and `else` inside `span`. `else if` counts once.
    #[must_use]
    pub fn branch_headers(&self, span: Span) -> Vec<Span> {
        self.range(span)
            .filter(|idx| {
                let token = &self.tokens[*idx];
                if self.dialect.is_elif(token) {
                    return true;
                }
                match self.dialect.layout {
                    Layout::Braces => {
                        token.is_word("else")
                            || (token.is_word("if")
                                && !(*idx > 0 && self.tokens[idx - 1].is_word("else")))
                    }
                    Layout::Indentation => {
                        (token.is_word("if") || token.is_word("else"))
                            && self.at_statement_start(*idx, false)
                    }
                }
            })
            .map(|idx| self.tokens[idx].span)
            .collect()
    }

    /// Outermost branch chains inside `span`. Chains nested in an
    /// alternative are found by scanning that alternative's body.
    #[must_use]
    pub fn branch_chains(&self, span: Span) -> Vec<BranchChain> {
        let range = self.range(span);
        let mut chains = Vec::new();
        let mut idx = range.start;

        while idx < range.end {
            let token = &self.tokens[idx];
            let found = match self.dialect.layout {
                Layout::Braces
                    if token.is_word("if")
                        && !(idx > 0 && self.tokens[idx - 1].is_word("else")) =>
                {
                    self.brace_chain(idx)
                }
                Layout::Indentation
                    if token.is_word("if") && self.at_statement_start(idx, false) =>
                {
                    self.suite_chain(idx)
                }
                _ => None,
            };
            match found {
                Some((chain, last)) if span.encloses(chain.span) => {
                    chains.push(chain);
                    idx = last + 1;
                }
                _ => idx += 1,
            }
        }
        chains
    }

    fn after_condition(&self, open: usize) -> Option<usize> {
        if !self.tokens.get(open)?.is_punct("(") {
            return None;
        }
        let body = self.matching(open)? + 1;
        (body < self.tokens.len()).then_some(body)
    }

    /// Index of the last token of the statement starting at `idx`.
    #[must_use]
    pub fn statement_end(&self, idx: usize) -> Option<usize> {
        let token = self.tokens.get(idx)?;
        let last = self.tokens.len() - 1;

        if token.is_punct("{") {
            return Some(self.matching(idx).unwrap_or(last));
        }

        if token.is_word("if") {
            let mut end = self.statement_end(self.after_condition(idx + 1)?)?;
            loop {
                match self.tokens.get(end + 1) {
                    Some(next) if next.is_word("else") => end = self.statement_end(end + 2)?,
                    Some(next) if self.dialect.is_elif(next) => {
                        end = self.statement_end(self.after_condition(end + 2)?)?;
                    }
                    _ => return Some(end),
                }
            }
        }

        if ["while", "for", "foreach", "switch"]
            .iter()
            .any(|word| token.is_word(word))
        {
            return self.statement_end(self.after_condition(idx + 1)?);
        }

        if token.is_word("do") {
            let body_end = self.statement_end(idx + 1)?;
            return self.statement_end(body_end + 1);
        }

        let mut depth = 0usize;
        for (pos, token) in self.tokens.iter().enumerate().skip(idx) {
            if token.kind != TokenKind::Punct {
                continue;
            }
            match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" => depth = depth.saturating_sub(1),
                "}" if depth == 0 => return Some(pos.saturating_sub(1).max(idx)),
                "}" => depth -= 1,
                ";" if depth == 0 => return Some(pos),
                _ => {}
            }
        }
        Some(last)
    }

    fn brace_chain(&self, mut idx: usize) -> Option<(BranchChain, usize)> {
        let start = self.tokens[idx].span.start;
        let mut alternatives = Vec::new();
        let mut exhaustive = false;

        loop {
            let header = &self.tokens[idx];
            let body_idx = if header.is_word("else")
                && self.tokens.get(idx + 1).is_some_and(|t| t.is_word("if"))
            {
                self.after_condition(idx + 2)?
            } else if header.is_word("if") || self.dialect.is_elif(header) {
                self.after_condition(idx + 1)?
            } else {
                exhaustive = true;
                idx + 1
            };

            let body_end = self.statement_end(body_idx)?;
            let open = &self.tokens[body_idx];
            let close = &self.tokens[body_end];
            let body = if open.is_punct("{") {
                Span::new(open.span.end, close.span.start.max(open.span.end))
            } else {
                Span::new(open.span.start, close.span.end)
            };
            alternatives.push(Alternative {
                span: Span::new(header.span.start, close.span.end),
                body,
            });

            let next = self.tokens.get(body_end + 1);
            let continues = !exhaustive
                && next.is_some_and(|t| t.is_word("else") || self.dialect.is_elif(t));
            if !continues {
                let chain = BranchChain {
                    span: Span::new(start, close.span.end),
                    alternatives,
                    exhaustive,
                };
                return Some((chain, body_end));
            }
            idx = body_end + 1;
        }
    }

    /// Index of the first `:` at bracket depth zero from `idx` on.
    #[must_use]
    pub fn suite_colon(&self, idx: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (pos, token) in self.tokens.iter().enumerate().skip(idx) {
            if token.kind == TokenKind::Newline && depth == 0 {
                return None;
            }
            if token.kind != TokenKind::Punct {
                continue;
            }
            match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                ":" if depth == 0 => return Some(pos),
                _ => {}
            }
        }
        None
    }

    /// The body of the suite introduced by the `:` at `colon`, and the index
    /// of the first token after it.
    #[must_use]
    pub fn suite(&self, colon: usize) -> Option<(Span, usize)> {
        let first = self.tokens.get(colon + 1)?;

        if first.kind != TokenKind::Newline {
            let mut end = colon + 1;
            while end < self.tokens.len() && self.tokens[end].kind != TokenKind::Newline {
                end += 1;
            }
            let last = &self.tokens[end - 1];
            return Some((Span::new(first.span.start, last.span.end), end + 1));
        }

        let indent = colon + 2;
        if self.tokens.get(indent).is_none_or(|t| t.kind != TokenKind::Indent) {
            return Some((Span::new(first.span.start, first.span.start), colon + 2));
        }

        let mut depth = 0usize;
        let mut close = self.tokens.len();
        for (pos, token) in self.tokens.iter().enumerate().skip(indent) {
            match token.kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    depth -= 1;
                    if depth == 0 {
                        close = pos;
                        break;
                    }
                }
                _ => {}
            }
        }

        let content = &self.tokens[indent + 1..close];
        let start = content.first()?.span.start;
        let end = content
            .iter()
            .rev()
            .find(|t| !t.is_layout())
            .map_or(start, |t| t.span.end);
        Some((Span::new(start, end), close + 1))
    }

    fn suite_chain(&self, mut idx: usize) -> Option<(BranchChain, usize)> {
        let start = self.tokens[idx].span.start;
        let mut alternatives = Vec::new();

        loop {
            let header = &self.tokens[idx];
            let exhaustive = header.is_word("else");
            let colon = self.suite_colon(idx + 1)?;
            let (body, next) = self.suite(colon)?;
            alternatives.push(Alternative {
                span: Span::new(header.span.start, body.end),
                body,
            });

            let continues = !exhaustive
                && self
                    .tokens
                    .get(next)
                    .is_some_and(|t| t.is_word("else") || self.dialect.is_elif(t));
            if !continues {
                let chain = BranchChain {
                    span: Span::new(start, body.end),
                    alternatives,
                    exhaustive,
                };
                return Some((chain, next.saturating_sub(1)));
            }
            idx = next;
        }
    }
}

/// Splits `tokens` at `separator` tokens that are not nested in brackets.
#[must_use]
pub fn split_top_level<'t>(tokens: &'t [Token], separator: &str) -> Vec<&'t [Token]> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Punct {
            continue;
        }
        match token.text.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth = depth.saturating_sub(1),
            text if depth == 0 && text == separator => {
                groups.push(&tokens[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if start < tokens.len() {
        groups.push(&tokens[start..]);
    }
    groups
}

/// A backtracking expression parser over a token slice.
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    dialect: &'a Dialect,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    fn at_punct(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(text))
    }

    fn eat_punct(&mut self, text: &str) -> bool {
        let found = self.at_punct(text);
        if found {
            self.pos += 1;
        }
        found
    }

    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|idx| self.tokens.get(idx))
            .map_or(0, |t| t.span.end)
    }

    fn at_statement_end(&self) -> bool {
        self.peek()
            .is_none_or(|t| t.is_layout() || t.is_punct(";") || t.is_punct("}"))
    }

    fn is_unary(&self, token: &Token) -> bool {
        matches!(token.kind, TokenKind::Punct | TokenKind::Ident)
            && self.dialect.unary_operators.contains(&token.text.as_str())
    }

    fn eat_binary_operator(&mut self) -> bool {
        let Some(token) = self.peek() else {
            return false;
        };
        let found = match token.kind {
            TokenKind::Punct => self.dialect.binary_operators.contains(&token.text.as_str()),
            TokenKind::Ident => self.dialect.word_operators.contains(&token.text.as_str()),
            _ => false,
        };
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_word_operator(&mut self) -> bool {
        let found = self.peek().is_some_and(|t| {
            t.kind == TokenKind::Ident && self.dialect.word_operators.contains(&t.text.as_str())
        });
        if found {
            self.pos += 1;
        }
        found
    }

    fn identifier(&mut self) -> Option<(Identifier, Span)> {
        let first = self.peek().filter(|t| self.dialect.is_name(t))?;
        self.pos += 1;
        let mut segments = vec![first.text.clone()];
        let mut end = first.span.end;

        while let (Some(separator), Some(segment)) = (self.peek(), self.peek_at(1)) {
            let is_separator = separator.kind == TokenKind::Punct
                && self
                    .dialect
                    .attribute_separators
                    .contains(&separator.text.as_str());
            let is_segment = matches!(segment.kind, TokenKind::Ident | TokenKind::Variable);
            if !is_separator || !is_segment {
                break;
            }
            segments.push(segment.text.clone());
            end = segment.span.end;
            self.pos += 2;
        }

        let name = segments.pop()?;
        Some((
            Identifier {
                object: segments,
                name,
            },
            Span::new(first.span.start, end),
        ))
    }

    fn skip_argument_label(&mut self) {
        if !self.dialect.keyword_arguments {
            return;
        }
        let labelled = match (self.peek(), self.peek_at(1)) {
            (Some(name), Some(op)) => {
                name.kind == TokenKind::Ident && (op.is_punct("=") || op.is_punct(":"))
            }
            _ => false,
        };
        if labelled {
            self.pos += 2;
        }
    }

    /// Comma separated expressions up to `close`. The opener is consumed.
    fn arguments(&mut self, close: &str) -> Option<Vec<Expression>> {
        let mut args = Vec::new();
        if self.eat_punct(close) {
            return Some(args);
        }
        loop {
            self.skip_argument_label();
            args.push(self.expression()?);
            if self.eat_punct(",") {
                if self.eat_punct(close) {
                    return Some(args);
                }
            } else if self.eat_punct(close) {
                return Some(args);
            } else {
                return None;
            }
        }
    }

    /// List, dict and index contents. The opener is consumed.
    fn collection(&mut self, close: &str) -> Option<Vec<Term>> {
        let mut terms = Vec::new();
        loop {
            if self.eat_punct(close) {
                return Some(terms);
            }
            if self.eat_punct(",") || self.eat_punct(":") || self.eat_punct("=>") {
                continue;
            }
            terms.extend(self.expression()?.terms);
        }
    }

    fn literal(&mut self, token: &Token) -> Term {
        self.pos += 1;
        let mut text = token.text.clone();
        let mut end = token.span.end;
        if token.kind == TokenKind::Str {
            while let Some(next) = self.peek().filter(|t| t.kind == TokenKind::Str) {
                text.push(' ');
                text.push_str(&next.text);
                end = next.span.end;
                self.pos += 1;
            }
        }
        Term::Literal(Literal {
            text,
            span: Span::new(token.span.start, end),
        })
    }

    fn starts_operand(&self) -> bool {
        self.peek().is_some_and(|t| match t.kind {
            TokenKind::Number | TokenKind::Str | TokenKind::Variable => true,
            TokenKind::Ident => {
                self.dialect.is_name(t) || self.dialect.literals.contains(&t.text.as_str())
            }
            TokenKind::Punct => t.is_punct("("),
            _ => false,
        })
    }

    fn operand(&mut self) -> Option<Vec<Term>> {
        let token = self.peek()?;

        if self.is_unary(token) {
            self.pos += 1;
            return self.operand();
        }

        if token.is_word("lambda") {
            while !self.eat_punct(":") {
                self.peek()?;
                self.pos += 1;
            }
            return self.expression().map(|e| e.terms);
        }

        if token.kind == TokenKind::Ident
            && self.dialect.constructor_keyword == Some(token.text.as_str())
        {
            self.pos += 1;
            let (name, span) = self.identifier()?;
            let args = if self.eat_punct("(") {
                self.arguments(")")?
            } else {
                Vec::new()
            };
            let call = Call {
                name,
                args,
                span: Span::new(token.span.start, self.prev_end().max(span.end)),
                kind: CallKind::Constructor,
            };
            return Some(self.postfix(vec![Term::Call(call)]));
        }

        match token.kind {
            TokenKind::Number | TokenKind::Str => {
                let literal = self.literal(token);
                Some(self.postfix(vec![literal]))
            }
            TokenKind::Ident if self.dialect.literals.contains(&token.text.as_str()) => {
                let literal = self.literal(token);
                Some(self.postfix(vec![literal]))
            }
            TokenKind::Ident | TokenKind::Variable if self.dialect.is_name(token) => {
                let (identifier, span) = self.identifier()?;
                let term = if self.eat_punct("(") {
                    let args = self.arguments(")")?;
                    Term::Call(Call {
                        name: identifier,
                        args,
                        span: Span::new(span.start, self.prev_end()),
                        kind: CallKind::Function,
                    })
                } else {
                    Term::Reference(Reference { identifier, span })
                };
                Some(self.postfix(vec![term]))
            }
            TokenKind::Punct => match token.text.as_str() {
                "(" => self.parenthesized(),
                "[" => {
                    self.pos += 1;
                    let terms = self.collection("]")?;
                    Some(self.postfix(terms))
                }
                "{" => {
                    self.pos += 1;
                    let terms = self.collection("}")?;
                    Some(self.postfix(terms))
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Grouping, tuples and casts.
    fn parenthesized(&mut self) -> Option<Vec<Term>> {
        let open = self.pos;
        self.pos += 1;

        let mut grouped = Vec::new();
        let mut closed = self.eat_punct(")");
        while !closed {
            let Some(expression) = self.expression() else {
                break;
            };
            grouped.extend(expression.terms);
            if self.eat_punct(",") {
                closed = self.eat_punct(")");
            } else if self.eat_punct(")") {
                closed = true;
            } else {
                break;
            }
        }

        if closed {
            if self.dialect.layout == Layout::Braces && self.starts_operand() {
                // `(int) x`: the group was a type.
                let save = self.pos;
                if let Some(cast) = self.operand() {
                    return Some(cast);
                }
                self.pos = save;
            }
            return Some(self.postfix(grouped));
        }

        // `(char *) x`: skip the type.
        self.pos = open;
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            self.pos += 1;
            if token.is_punct("(") {
                depth += 1;
            } else if token.is_punct(")") {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
        }
        self.operand()
    }

    fn postfix(&mut self, mut terms: Vec<Term>) -> Vec<Term> {
        loop {
            let save = self.pos;
            if self.eat_punct("[") {
                match self.collection("]") {
                    Some(inner) => terms.extend(inner),
                    None => {
                        self.pos = save;
                        break;
                    }
                }
            } else if self.eat_punct("(") {
                match self.arguments(")") {
                    Some(args) => terms.extend(args.into_iter().flat_map(|a| a.terms)),
                    None => {
                        self.pos = save;
                        break;
                    }
                }
            } else if self.at_attribute() {
                let tokens = self.tokens;
                let name = &tokens[self.pos + 1];
                self.pos += 2;
                if self.eat_punct("(") {
                    let Some(args) = self.arguments(")") else {
                        self.pos = save;
                        break;
                    };
                    terms.push(Term::Call(Call {
                        name: Identifier::new(name.text.clone()),
                        args,
                        span: Span::new(name.span.start, self.prev_end()),
                        kind: CallKind::Chained,
                    }));
                }
            } else if !(self.eat_punct("++") || self.eat_punct("--")) {
                break;
            }
        }
        terms
    }

    fn at_attribute(&self) -> bool {
        match (self.peek(), self.peek_at(1)) {
            (Some(separator), Some(segment)) => {
                separator.kind == TokenKind::Punct
                    && self
                        .dialect
                        .attribute_separators
                        .contains(&separator.text.as_str())
                    && matches!(segment.kind, TokenKind::Ident | TokenKind::Variable)
            }
            _ => false,
        }
    }

    fn expression(&mut self) -> Option<Expression> {
        let start = self.peek()?.span.start;
        let mut terms = self.operand()?;
        loop {
            let save = self.pos;
            if !self.eat_binary_operator() {
                break;
            }
            while self.eat_word_operator() {}
            match self.operand() {
                Some(more) => terms.extend(more),
                None => {
                    self.pos = save;
                    break;
                }
            }
        }
        Some(Expression {
            terms,
            span: Span::new(start, self.prev_end()),
        })
    }

    /// An expression, or a tuple of them in indentation languages.
    fn expression_list(&mut self) -> Option<Expression> {
        let mut expression = self.expression()?;
        if self.dialect.layout == Layout::Indentation {
            loop {
                let save = self.pos;
                if !self.eat_punct(",") {
                    break;
                }
                match self.expression() {
                    Some(more) => {
                        expression.terms.extend(more.terms);
                        expression.span.end = more.span.end;
                    }
                    None => {
                        self.pos = save;
                        break;
                    }
                }
            }
        }
        Some(expression)
    }

    /// `echo a, b;` and friends.
    fn statement_call(&mut self) -> Option<Call> {
        let keyword = self.peek().filter(|t| {
            t.kind == TokenKind::Ident && self.dialect.statement_calls.contains(&t.text.as_str())
        })?;
        self.pos += 1;

        let mut args = Vec::new();
        if !self.at_statement_end() {
            args.push(self.expression()?);
            while self.eat_punct(",") {
                args.push(self.expression()?);
            }
        }
        Some(Call {
            name: Identifier::new(keyword.text.clone()),
            args,
            span: Span::new(keyword.span.start, self.prev_end()),
            kind: CallKind::Statement,
        })
    }

    fn assignment(&mut self) -> Option<Assignment> {
        let start = self.peek()?.span.start;
        let (target, target_span) = self.identifier()?;
        while self.eat_punct("[") {
            self.collection("]")?;
        }

        let operator = self.peek().filter(|t| {
            t.kind == TokenKind::Punct
                && self
                    .dialect
                    .assignment_operators
                    .contains(&t.text.as_str())
        })?;
        self.pos += 1;

        let mut value = self.expression_list()?;
        if operator.text != "=" {
            value.terms.insert(
                0,
                Term::Reference(Reference {
                    identifier: target.clone(),
                    span: target_span,
                }),
            );
        }
        Some(Assignment {
            target,
            value,
            span: Span::new(start, self.prev_end()),
        })
    }

    /// `type [*]name[[n]] [, [*]name[[n]]] ;`
    fn declaration(&mut self) -> Option<Vec<Declaration>> {
        let start = self.peek()?.span.start;
        let mut words = Vec::new();
        while let Some(token) = self.peek() {
            if token.kind == TokenKind::Ident && !self.dialect.is_keyword(token) {
                words.push(token);
            } else if !token.is_punct("*") {
                break;
            }
            self.pos += 1;
        }
        if words.len() < 2 || self.tokens[self.pos - 1].kind != TokenKind::Ident {
            return None;
        }

        let mut names = vec![words[words.len() - 1]];
        loop {
            while self.eat_punct("[") {
                self.collection("]")?;
            }
            if self.eat_punct(";") {
                break;
            }
            if !self.eat_punct(",") {
                return None;
            }
            while self.eat_punct("*") {}
            let name = self
                .peek()
                .filter(|t| t.kind == TokenKind::Ident && !self.dialect.is_keyword(t))?;
            names.push(name);
            self.pos += 1;
        }

        let end = self.prev_end();
        Some(
            names
                .into_iter()
                .map(|name| Declaration {
                    name: name.text.clone(),
                    span: Span::new(start, end),
                })
                .collect(),
        )
    }
}
