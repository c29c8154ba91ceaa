//! Tokenizer for the Reed programming language.
//!
//! Converts source text into a stream of [`Token`]s on demand: the lexer
//! implements `Iterator<Item = Token>`, so the parser can pull tokens lazily
//! (REPL line mode) or collect the whole file up front.
//!
//! Newlines are significant in Reed (they terminate declarations), so the
//! lexer emits them as tokens and leaves skipping to the parser. Comments
//! (`//` and `/* */`) are consumed silently. String literals keep their
//! escape sequences raw -- unescaping happens in the parser where a bad
//! escape becomes a parse diagnostic. F-strings are decomposed into
//! literal/interpolation segments here, each interpolation carrying its own
//! source range for re-parsing.

mod cursor;

use cursor::Cursor;
use reed_common::span::SourceInfo;
use reed_common::token::{keyword_from_str, FStringPart, Token, TokenKind};

/// The Reed lexer.
pub struct Lexer<'src> {
    cursor: Cursor<'src>,
    /// Whether the final `Eof` token has been handed out.
    emitted_eof: bool,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source text.
    pub fn new(source: &'src str) -> Self {
        Self {
            cursor: Cursor::new(source),
            emitted_eof: false,
        }
    }

    /// Convenience: tokenize the entire source into a `Vec<Token>`.
    ///
    /// The returned vector includes the final `Eof` token.
    pub fn tokenize(source: &str) -> Vec<Token> {
        Lexer::new(source).collect()
    }

    fn produce_token(&mut self) -> Token {
        self.skip_blanks_and_comments();

        let start_line = self.cursor.line();
        let start_col = self.cursor.col();
        let start_pos = self.cursor.pos();

        let Some(c) = self.cursor.peek() else {
            return self.finish(TokenKind::Eof, start_pos, start_line, start_col);
        };

        match c {
            '\n' => {
                self.cursor.advance();
                self.finish(TokenKind::Newline, start_pos, start_line, start_col)
            }
            '\r' => {
                self.cursor.advance();
                self.cursor.eat('\n');
                Token::new(
                    TokenKind::Newline,
                    "\n",
                    SourceInfo::new(start_line, start_col, start_col),
                )
            }
            '0'..='9' => self.lex_number(start_pos, start_line, start_col),
            c if is_ident_start(c) => self.lex_ident_or_prefix(start_pos, start_line, start_col),
            '"' => self.lex_string(start_pos, start_line, start_col),
            _ => self.lex_operator(start_pos, start_line, start_col),
        }
    }

    /// Build a token whose text is the raw slice from `start_pos` to the
    /// current position, ending at the previous column.
    fn finish(&self, kind: TokenKind, start_pos: usize, line: u32, col: u32) -> Token {
        let text = self.cursor.slice(start_pos, self.cursor.pos()).to_string();
        Token::new(kind, text, self.info_from(line, col))
    }

    fn info_from(&self, line: u32, col: u32) -> SourceInfo {
        let end_col = self.cursor.col().saturating_sub(1).max(col);
        SourceInfo {
            lines: (line, self.cursor.line()),
            cols: (col, end_col),
        }
    }

    fn error(&self, message: &str, line: u32, col: u32) -> Token {
        Token::new(TokenKind::Error, message, self.info_from(line, col))
    }

    // ── Trivia ─────────────────────────────────────────────────────────

    /// Skip spaces, tabs, and comments. Newlines are significant and stay.
    fn skip_blanks_and_comments(&mut self) {
        loop {
            match self.cursor.peek() {
                Some(' ') | Some('\t') => {
                    self.cursor.advance();
                }
                Some('/') if self.cursor.peek_next() == Some('/') => {
                    self.cursor.eat_while(|c| c != '\n');
                }
                Some('/') if self.cursor.peek_next() == Some('*') => {
                    self.cursor.advance();
                    self.cursor.advance();
                    loop {
                        match self.cursor.advance() {
                            Some('*') if self.cursor.peek() == Some('/') => {
                                self.cursor.advance();
                                break;
                            }
                            Some(_) => {}
                            // Unterminated block comment: surface at Eof.
                            None => return,
                        }
                    }
                }
                _ => return,
            }
        }
    }

    // ── Numbers ────────────────────────────────────────────────────────

    fn lex_number(&mut self, start_pos: usize, line: u32, col: u32) -> Token {
        if self.cursor.peek() == Some('0')
            && matches!(self.cursor.peek_next(), Some('x') | Some('X') | Some('b') | Some('B'))
        {
            self.cursor.advance();
            self.cursor.advance();
            self.cursor.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
            return self.finish(TokenKind::Int, start_pos, line, col);
        }

        self.cursor.eat_while(|c| c.is_ascii_digit() || c == '_');

        let mut is_float = false;
        // A dot makes a float only when a digit follows; `1..5` stays an
        // integer followed by a range operator.
        if self.cursor.peek() == Some('.')
            && self.cursor.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.cursor.advance();
            self.cursor.eat_while(|c| c.is_ascii_digit() || c == '_');
        }
        if matches!(self.cursor.peek(), Some('e') | Some('E')) {
            let after_sign = match self.cursor.peek_next() {
                Some('+') | Some('-') => self.cursor.peek_third(),
                other => other,
            };
            if after_sign.is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.cursor.advance();
                if matches!(self.cursor.peek(), Some('+') | Some('-')) {
                    self.cursor.advance();
                }
                self.cursor.eat_while(|c| c.is_ascii_digit());
            }
        }

        let kind = if is_float { TokenKind::Float } else { TokenKind::Int };
        self.finish(kind, start_pos, line, col)
    }

    // ── Identifiers, keywords, string prefixes ─────────────────────────

    fn lex_ident_or_prefix(&mut self, start_pos: usize, line: u32, col: u32) -> Token {
        self.cursor.eat_while(is_ident_continue);
        let text = self.cursor.slice(start_pos, self.cursor.pos()).to_string();

        // An identifier glued to an opening quote is a string prefix:
        // `f"..."` is an f-string, any other prefix is a note string.
        if self.cursor.peek() == Some('"') {
            if text == "f" {
                return self.lex_fstring(line, col);
            }
            return self.lex_note(text, line, col);
        }

        match keyword_from_str(&text) {
            Some(kind) => Token::new(kind, text, self.info_from(line, col)),
            None => Token::new(TokenKind::Ident, text, self.info_from(line, col)),
        }
    }

    // ── Strings ────────────────────────────────────────────────────────

    /// Consume the opening quote(s). Returns whether the string is
    /// triple-quoted.
    fn open_quotes(&mut self) -> bool {
        self.cursor.advance();
        if self.cursor.peek() == Some('"') && self.cursor.peek_next() == Some('"') {
            self.cursor.advance();
            self.cursor.advance();
            true
        } else {
            false
        }
    }

    /// Scan raw string content up to the closing quote(s). Escapes are kept
    /// raw; a backslash protects the following character from terminating
    /// the literal. Returns `None` when input ends first.
    fn string_body(&mut self, triple: bool) -> Option<String> {
        let mut content = String::new();
        loop {
            match self.cursor.peek() {
                None => return None,
                Some('\\') => {
                    content.push(self.cursor.advance().unwrap());
                    if let Some(c) = self.cursor.advance() {
                        content.push(c);
                    }
                }
                Some('"') => {
                    if triple {
                        if self.cursor.peek_next() == Some('"')
                            && self.cursor.peek_third() == Some('"')
                        {
                            self.cursor.advance();
                            self.cursor.advance();
                            self.cursor.advance();
                            return Some(content);
                        }
                        content.push(self.cursor.advance().unwrap());
                    } else {
                        self.cursor.advance();
                        return Some(content);
                    }
                }
                Some('\n') if !triple => return None,
                Some(c) => {
                    content.push(c);
                    self.cursor.advance();
                }
            }
        }
    }

    fn lex_string(&mut self, _start_pos: usize, line: u32, col: u32) -> Token {
        let triple = self.open_quotes();
        // `""` is an empty single-quoted string, not an unterminated triple.
        if triple && self.cursor.is_eof() {
            return self.error("unterminated string literal", line, col);
        }
        match self.string_body(triple) {
            Some(content) => Token::new(
                TokenKind::Str { triple },
                content,
                self.info_from(line, col),
            ),
            None => self.error("unterminated string literal", line, col),
        }
    }

    fn lex_note(&mut self, prefix: String, line: u32, col: u32) -> Token {
        let triple = self.open_quotes();
        match self.string_body(triple) {
            Some(content) => Token::new(
                TokenKind::Note { prefix },
                content,
                self.info_from(line, col),
            ),
            None => self.error("unterminated note string", line, col),
        }
    }

    /// Lex an f-string into literal and interpolation segments.
    fn lex_fstring(&mut self, line: u32, col: u32) -> Token {
        let triple = self.open_quotes();
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut text = String::new();

        loop {
            match self.cursor.peek() {
                None => return self.error("unterminated f-string literal", line, col),
                Some('\n') if !triple => {
                    return self.error("unterminated f-string literal", line, col)
                }
                Some('\\') => {
                    text.push(self.cursor.advance().unwrap());
                    if let Some(c) = self.cursor.advance() {
                        text.push(c);
                    }
                }
                Some('"') => {
                    if triple {
                        if self.cursor.peek_next() == Some('"')
                            && self.cursor.peek_third() == Some('"')
                        {
                            self.cursor.advance();
                            self.cursor.advance();
                            self.cursor.advance();
                            break;
                        }
                        text.push(self.cursor.advance().unwrap());
                    } else {
                        self.cursor.advance();
                        break;
                    }
                }
                Some('{') => {
                    if !text.is_empty() {
                        parts.push(FStringPart::Text(std::mem::take(&mut text)));
                    }
                    self.cursor.advance();
                    let expr_line = self.cursor.line();
                    let expr_col = self.cursor.col();
                    let expr_start = self.cursor.pos();
                    let mut depth = 0u32;
                    loop {
                        match self.cursor.peek() {
                            None => {
                                return self.error(
                                    "unterminated f-string interpolation",
                                    line,
                                    col,
                                )
                            }
                            Some('{') => {
                                depth += 1;
                                self.cursor.advance();
                            }
                            Some('}') if depth == 0 => break,
                            Some('}') => {
                                depth -= 1;
                                self.cursor.advance();
                            }
                            Some('"') => {
                                // Skip over a nested string so its braces
                                // do not count.
                                self.cursor.advance();
                                loop {
                                    match self.cursor.advance() {
                                        None => {
                                            return self.error(
                                                "unterminated f-string interpolation",
                                                line,
                                                col,
                                            )
                                        }
                                        Some('\\') => {
                                            self.cursor.advance();
                                        }
                                        Some('"') => break,
                                        Some(_) => {}
                                    }
                                }
                            }
                            Some(_) => {
                                self.cursor.advance();
                            }
                        }
                    }
                    let src = self
                        .cursor
                        .slice(expr_start, self.cursor.pos())
                        .to_string();
                    let end_col = self.cursor.col().saturating_sub(1).max(expr_col);
                    parts.push(FStringPart::Expr {
                        src,
                        info: SourceInfo {
                            lines: (expr_line, self.cursor.line()),
                            cols: (expr_col, end_col),
                        },
                    });
                    self.cursor.advance(); // closing `}`
                }
                Some(c) => {
                    text.push(c);
                    self.cursor.advance();
                }
            }
        }

        if !text.is_empty() || parts.is_empty() {
            parts.push(FStringPart::Text(text));
        }
        Token::new(TokenKind::FString(parts), "", self.info_from(line, col))
    }

    // ── Operators and punctuation ──────────────────────────────────────

    fn lex_operator(&mut self, start_pos: usize, line: u32, col: u32) -> Token {
        let c = self.cursor.advance().expect("caller checked non-eof");
        let kind = match c {
            '+' => {
                if self.cursor.peek() == Some('+') {
                    self.cursor.advance();
                    if self.cursor.eat('=') {
                        TokenKind::PlusPlusEq
                    } else {
                        TokenKind::PlusPlus
                    }
                } else if self.cursor.eat('=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.cursor.eat('=') {
                    TokenKind::MinusEq
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.cursor.eat('=') {
                    TokenKind::StarEq
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.cursor.eat('=') {
                    TokenKind::SlashEq
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.cursor.eat('=') {
                    TokenKind::PercentEq
                } else {
                    TokenKind::Percent
                }
            }
            '^' => {
                if self.cursor.eat('=') {
                    TokenKind::CaretEq
                } else {
                    TokenKind::Caret
                }
            }
            '=' => {
                if self.cursor.eat('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            '!' => {
                if self.cursor.eat('=') {
                    TokenKind::NotEq
                } else {
                    return self.error("unexpected character: !", line, col);
                }
            }
            '<' => {
                if self.cursor.eat('<') {
                    TokenKind::LtLt
                } else if self.cursor.eat('=') {
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.cursor.eat('=') {
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.cursor.eat('&') {
                    TokenKind::AmpAmp
                } else {
                    return self.error("unexpected character: &", line, col);
                }
            }
            '|' => {
                if self.cursor.eat('|') {
                    TokenKind::PipePipe
                } else {
                    return self.error("unexpected character: |", line, col);
                }
            }
            '~' => TokenKind::Tilde,
            '?' => TokenKind::Question,
            ':' => {
                if self.cursor.eat(':') {
                    TokenKind::ColonColon
                } else {
                    TokenKind::Colon
                }
            }
            '.' => {
                if self.cursor.peek() == Some('.') {
                    self.cursor.advance();
                    if self.cursor.eat('.') {
                        TokenKind::DotDotDot
                    } else {
                        TokenKind::DotDot
                    }
                } else {
                    TokenKind::Dot
                }
            }
            '$' => TokenKind::Dollar,
            '@' => {
                if self.cursor.eat('!') {
                    TokenKind::AtBang
                } else {
                    TokenKind::At
                }
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            other => {
                return self.error(&format!("unexpected character: {other}"), line, col);
            }
        };
        self.finish(kind, start_pos, line, col)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.emitted_eof {
            return None;
        }
        let token = self.produce_token();
        if token.kind == TokenKind::Eof {
            self.emitted_eof = true;
        }
        Some(token)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
