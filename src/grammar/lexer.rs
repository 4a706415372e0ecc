//! A configurable tokenizer shared by every grammar.
//!
//! The lexer is intentionally forgiving: anything it does not recognise
//! becomes a single-character punctuation token, so the scanning parsers
//! built on top of it can skip over unknown syntax.

use crate::grammar::Span;

/// The category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A bare word: identifiers and keywords.
    Ident,
    /// A sigil-prefixed variable (`$name` in PHP). The text excludes the sigil.
    Variable,
    /// A numeric literal.
    Number,
    /// A string literal, quotes included.
    Str,
    /// Operators and punctuation.
    Punct,
    /// End of a logical line (indentation sensitive languages only).
    Newline,
    /// Start of an indented block.
    Indent,
    /// End of an indented block.
    Dedent,
}

/// A single lexical token with its absolute position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token category.
    pub kind: TokenKind,
    /// The token text.
    pub text: String,
    /// Byte offsets of the token in the source.
    pub span: Span,
}

impl Token {
    /// Returns `true` if this is the punctuation token `text`.
    #[must_use]
    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    /// Returns `true` if this is the bare word `text`.
    #[must_use]
    pub fn is_word(&self, text: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == text
    }

    /// Returns `true` for tokens that only carry layout information.
    #[must_use]
    pub const fn is_layout(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
        )
    }
}

/// Language specific lexing switches.
#[derive(Debug, Clone, Copy)]
pub struct LexOptions {
    /// Prefixes that start a comment running to the end of the line.
    pub line_comments: &'static [&'static str],
    /// Whether `/* ... */` comments are recognised.
    pub block_comments: bool,
    /// Whether lines starting with `#` are preprocessor directives.
    pub preprocessor: bool,
    /// A sigil that introduces variables.
    pub variable_sigil: Option<char>,
    /// Whether `<?php`, `<?=`, `<?` and `?>` tags are skipped.
    pub php_tags: bool,
    /// Whether `"""` and `'''` strings are recognised.
    pub triple_quotes: bool,
    /// Whether string prefixes such as `r"..."` or `b'...'` are recognised.
    pub string_prefixes: bool,
    /// Whether single-quoted strings may span several lines.
    pub multiline_strings: bool,
    /// Whether indentation is significant.
    pub significant_indentation: bool,
    /// Multi-character operators, longest first.
    pub operators: &'static [&'static str],
}

/// Splits `source` into tokens.
#[must_use]
pub fn tokenize(source: &str, options: &LexOptions) -> Vec<Token> {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        options,
        tokens: Vec::new(),
        depth: 0,
        indents: vec![0],
        at_line_start: true,
        line_has_content: false,
    };
    lexer.run();
    lexer.tokens
}

struct Lexer<'s> {
    source: &'s str,
    bytes: &'s [u8],
    pos: usize,
    options: &'s LexOptions,
    tokens: Vec<Token>,
    depth: usize,
    indents: Vec<usize>,
    at_line_start: bool,
    line_has_content: bool,
}

impl Lexer<'_> {
    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            if self.options.significant_indentation && self.at_line_start && self.depth == 0 {
                self.indentation();
                continue;
            }
            let c = self.bytes[self.pos];
            match c {
                b'\n' => self.newline(),
                b' ' | b'\t' | b'\r' | 0x0c => self.pos += 1,
                b'\\' if self.continues_line() => {}
                _ if self.skip_comment_or_directive() => {}
                b'$' if self.options.variable_sigil == Some('$') && self.ident_start_at(self.pos + 1) => {
                    self.variable();
                }
                b'"' | b'\'' => self.string(self.pos),
                b'0'..=b'9' => self.number(),
                b'.' if self.peek_byte(1).is_some_and(|b| b.is_ascii_digit()) => self.number(),
                _ if self.ident_start_at(self.pos) => self.word(),
                _ => self.punct(),
            }
        }
        self.finish();
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn ident_start_at(&self, pos: usize) -> bool {
        self.bytes
            .get(pos)
            .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_' || !b.is_ascii())
    }

    fn push(&mut self, kind: TokenKind, text: String, start: usize, end: usize) {
        self.line_has_content = true;
        self.tokens.push(Token {
            kind,
            text,
            span: Span::new(start, end),
        });
    }

    fn newline(&mut self) {
        if self.options.significant_indentation && self.depth == 0 && self.line_has_content {
            self.tokens.push(Token {
                kind: TokenKind::Newline,
                text: String::new(),
                span: Span::new(self.pos, self.pos + 1),
            });
        }
        if self.depth == 0 || !self.options.significant_indentation {
            self.line_has_content = false;
            self.at_line_start = true;
        }
        self.pos += 1;
    }

    /// Consumes leading whitespace and emits `Indent`/`Dedent` tokens for
    /// lines that carry code.
    fn indentation(&mut self) {
        let mut width = 0;
        while let Some(b) = self.peek_byte(0) {
            match b {
                b' ' => width += 1,
                b'\t' => width = (width / 8 + 1) * 8,
                b'\r' | 0x0c => {}
                _ => break,
            }
            self.pos += 1;
        }
        self.at_line_start = false;

        let blank = match self.peek_byte(0) {
            None | Some(b'\n') => true,
            Some(_) => self
                .options
                .line_comments
                .iter()
                .any(|prefix| self.source[self.pos..].starts_with(prefix)),
        };
        if blank {
            return;
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.tokens.push(Token {
                kind: TokenKind::Indent,
                text: String::new(),
                span: Span::new(self.pos, self.pos),
            });
        } else {
            while self.indents.len() > 1 && self.indents.last().is_some_and(|top| *top > width) {
                self.indents.pop();
                self.tokens.push(Token {
                    kind: TokenKind::Dedent,
                    text: String::new(),
                    span: Span::new(self.pos, self.pos),
                });
            }
        }
    }

    /// Backslash-newline joins two physical lines.
    fn continues_line(&mut self) -> bool {
        let rest = &self.source[self.pos + 1..];
        let skip = if rest.starts_with("\r\n") {
            3
        } else if rest.starts_with('\n') {
            2
        } else {
            return false;
        };
        self.pos += skip;
        true
    }

    fn skip_comment_or_directive(&mut self) -> bool {
        let rest = &self.source[self.pos..];

        if self.options.php_tags {
            for tag in ["<?php", "<?=", "<?", "?>"] {
                if rest.starts_with(tag) {
                    self.pos += tag.len();
                    return true;
                }
            }
        }

        if self.options.block_comments && rest.starts_with("/*") {
            self.pos = rest[2..]
                .find("*/")
                .map_or(self.bytes.len(), |idx| self.pos + 2 + idx + 2);
            return true;
        }

        if self.options.preprocessor && rest.starts_with('#') && self.only_whitespace_before() {
            self.skip_directive();
            return true;
        }

        if self
            .options
            .line_comments
            .iter()
            .any(|prefix| rest.starts_with(prefix))
        {
            self.pos = rest.find('\n').map_or(self.bytes.len(), |idx| self.pos + idx);
            return true;
        }

        false
    }

    fn only_whitespace_before(&self) -> bool {
        self.source[..self.pos]
            .chars()
            .rev()
            .take_while(|c| *c != '\n')
            .all(|c| c == ' ' || c == '\t' || c == '\r')
    }

    fn skip_directive(&mut self) {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b == b'\n' {
                return;
            }
            if !(b == b'\\' && self.continues_line()) {
                self.pos += 1;
            }
        }
    }

    fn variable(&mut self) {
        let start = self.pos;
        self.pos += 1;
        let name_start = self.pos;
        self.consume_word();
        let text = self.source[name_start..self.pos].to_string();
        self.push(TokenKind::Variable, text, start, self.pos);
    }

    fn consume_word(&mut self) {
        while self
            .peek_byte(0)
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || !b.is_ascii())
        {
            self.pos += 1;
        }
    }

    fn word(&mut self) {
        let start = self.pos;
        self.consume_word();
        let word = &self.source[start..self.pos];

        if self.options.string_prefixes
            && word.len() <= 2
            && word
                .chars()
                .all(|c| matches!(c.to_ascii_lowercase(), 'r' | 'b' | 'u' | 'f'))
            && matches!(self.peek_byte(0), Some(b'"' | b'\''))
        {
            self.string(start);
            return;
        }

        let text = word.to_string();
        self.push(TokenKind::Ident, text, start, self.pos);
    }

    fn number(&mut self) {
        let start = self.pos;
        while let Some(b) = self.peek_byte(0) {
            let exponent_sign = (b == b'+' || b == b'-')
                && matches!(self.bytes[self.pos - 1], b'e' | b'E')
                && !self.source[start..self.pos].starts_with("0x");
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = self.source[start..self.pos].to_string();
        self.push(TokenKind::Number, text, start, self.pos);
    }

    /// Lexes a string literal whose opening quote is at `self.pos`; `start`
    /// may point earlier when the literal carries a prefix.
    fn string(&mut self, start: usize) {
        let quote = self.bytes[self.pos];
        let triple = self.options.triple_quotes
            && self.peek_byte(1) == Some(quote)
            && self.peek_byte(2) == Some(quote);

        if triple {
            let delimiter = if quote == b'"' { "\"\"\"" } else { "'''" };
            let body = self.pos + 3;
            self.pos = self.source[body..]
                .find(delimiter)
                .map_or(self.bytes.len(), |idx| body + idx + 3);
        } else {
            self.pos += 1;
            while let Some(b) = self.peek_byte(0) {
                match b {
                    b'\\' => self.pos = (self.pos + 2).min(self.bytes.len()),
                    b'\n' if !self.options.multiline_strings => break,
                    _ if b == quote => {
                        self.pos += 1;
                        break;
                    }
                    _ => self.pos += 1,
                }
            }
        }

        let end = self.pos.min(self.bytes.len());
        let text = self.source[start..end].to_string();
        self.push(TokenKind::Str, text, start, end);
    }

    fn punct(&mut self) {
        let start = self.pos;
        let rest = &self.source[start..];
        let text = self
            .options
            .operators
            .iter()
            .find(|op| rest.starts_with(**op))
            .map_or_else(
                || rest.chars().next().map(String::from).unwrap_or_default(),
                |op| (*op).to_string(),
            );
        self.pos += text.len().max(1);

        match text.as_str() {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }

        self.push(TokenKind::Punct, text, start, self.pos);
    }

    fn finish(&mut self) {
        if !self.options.significant_indentation {
            return;
        }
        let end = self.bytes.len();
        if self.line_has_content {
            self.tokens.push(Token {
                kind: TokenKind::Newline,
                text: String::new(),
                span: Span::new(end, end),
            });
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token {
                kind: TokenKind::Dedent,
                text: String::new(),
                span: Span::new(end, end),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const C_LIKE: LexOptions = LexOptions {
        line_comments: &["//"],
        block_comments: true,
        preprocessor: true,
        variable_sigil: None,
        php_tags: false,
        triple_quotes: false,
        string_prefixes: false,
        multiline_strings: false,
        significant_indentation: false,
        operators: &["->", "==", "+="],
    };

    const PY_LIKE: LexOptions = LexOptions {
        line_comments: &["#"],
        block_comments: false,
        preprocessor: false,
        variable_sigil: None,
        php_tags: false,
        triple_quotes: true,
        string_prefixes: true,
        multiline_strings: false,
        significant_indentation: true,
        operators: &["**", "=="],
    };

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn skips_comments_and_directives() {
        let source = "#include <stdio.h>\n/* block */ int x; // trailing\n";
        let tokens = tokenize(source, &C_LIKE);
        assert_eq!(texts(&tokens), ["int", "x", ";"]);
        assert_eq!(tokens[0].span, Span::new(31, 34));
    }

    #[test]
    fn multi_character_operators_win() {
        let tokens = tokenize("p->x == 1", &C_LIKE);
        assert_eq!(texts(&tokens), ["p", "->", "x", "==", "1"]);
    }

    #[test]
    fn strings_keep_quotes_and_escapes() {
        let tokens = tokenize(r#"printf("a \"b\"");"#, &C_LIKE);
        assert_eq!(tokens[2].kind, TokenKind::Str);
        assert_eq!(tokens[2].text, r#""a \"b\"""#);
    }

    #[test]
    fn php_variables_drop_the_sigil() {
        let options = LexOptions {
            variable_sigil: Some('$'),
            php_tags: true,
            ..C_LIKE
        };
        let tokens = tokenize("<?php $foo = 1; ?>", &options);
        assert_eq!(tokens[0].kind, TokenKind::Variable);
        assert_eq!(tokens[0].text, "foo");
        assert_eq!(tokens[0].span, Span::new(6, 10));
    }

    #[test]
    fn identifiers_may_contain_non_ascii_letters() {
        let options = LexOptions {
            variable_sigil: Some('$'),
            php_tags: true,
            ..C_LIKE
        };
        let tokens = tokenize("<?php $é = größe($x); ?>", &options);
        assert_eq!(tokens[0].kind, TokenKind::Variable);
        assert_eq!(tokens[0].text, "é");
        assert_eq!(tokens[2].kind, TokenKind::Ident);
        assert_eq!(tokens[2].text, "größe");
    }

    #[test]
    fn continued_directives_are_skipped_whole() {
        let source = "#define TWICE(x) \\\n    ((x) * 2)\nint y;\n";
        assert_eq!(texts(&tokenize(source, &C_LIKE)), ["int", "y", ";"]);
    }

    #[test]
    fn indentation_produces_layout_tokens() {
        let source = "def f(a):\n    if a:\n        g()\n\n    return a\n";
        let kinds: Vec<_> = tokenize(source, &PY_LIKE).iter().map(|t| t.kind).collect();
        let indents = kinds.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = kinds.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        assert_eq!(kinds.last(), Some(&TokenKind::Dedent));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let source = "x = f(1,\n      2)\ny = 3\n";
        let newlines = tokenize(source, &PY_LIKE)
            .iter()
            .filter(|t| t.kind == TokenKind::Newline)
            .count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn triple_quoted_strings_span_lines() {
        let source = "x = \"\"\"a\nb\"\"\"\n";
        let tokens = tokenize(source, &PY_LIKE);
        assert_eq!(tokens[2].kind, TokenKind::Str);
        assert_eq!(tokens[2].text, "\"\"\"a\nb\"\"\"");
    }

    #[test]
    fn crlf_line_endings_are_whitespace() {
        let tokens = tokenize("int a;\r\nint b;\r\n", &C_LIKE);
        assert_eq!(texts(&tokens), ["int", "a", ";", "int", "b", ";"]);
    }
}
