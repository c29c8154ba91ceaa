//! Recursive-descent parser for Reed.
//!
//! The parser owns a token buffer and a position, plus a small amount of
//! context state: the pending outer-annotation queue, the
//! lower-range-precedence flag toggled around subscript and call-argument
//! contexts, and counters for synthesized anonymous names.
//!
//! # Error handling
//!
//! Internal parse routines return `Result<_, Diagnostic>` and propagate
//! with `?`. In whole-file mode ([`Parser::parse`]) an error aborts the
//! current declaration only: the diagnostic is collected, the parser skips
//! to the next declaration boundary (line end, semicolon, or closing brace
//! at the current nesting level), and parsing continues -- a file with K
//! independent errors reports K diagnostics. In line mode
//! ([`Parser::parse_line`]) the first error is returned eagerly, except
//! that an error at end of input reports the line as syntactically open so
//! a REPL can pull a continuation line.

pub(crate) mod expressions;
pub(crate) mod items;

use reed_common::diag::{DiagId, Diagnostic};
use reed_common::span::{SourceInfo, SourceName};
use reed_common::token::{Token, TokenKind};
use reed_lexer::Lexer;

use crate::ir::{Annotation, Ir, Module};

/// Result of parsing one logical REPL line.
#[derive(Debug, PartialEq)]
pub enum LineParse {
    /// The line was complete; these are its declarations.
    Complete(Vec<Ir>),
    /// The line ended inside an open declaration (unclosed brace or
    /// multi-line string); feed another physical line and retry.
    Incomplete,
}

/// Reed token-stream parser.
///
/// Parses either a whole file at once or line by line.
pub struct Parser {
    source_name: SourceName,
    tokens: Vec<Token>,
    pos: usize,
    /// When true, a comma at range level may form the three-operand range
    /// or a multivar list. True at statement level and inside subscripts,
    /// false inside call arguments and collection literals.
    pub(crate) lower_range_prec: bool,
    /// Pending `@...` annotations waiting for their declaration.
    pub(crate) outer_annots: Vec<Annotation>,
    errors: Vec<Diagnostic>,
    /// Counters for synthesized names (`"0s"`, `"0l"`, `"0cl"`).
    pub(crate) anon_space_id: u64,
    pub(crate) anon_lambda_id: u64,
    pub(crate) anon_compr_id: u64,
}

impl Parser {
    /// Create a parser over the given source text.
    pub fn new(source: &str, source_name: SourceName) -> Self {
        Self {
            source_name,
            tokens: Lexer::tokenize(source),
            pos: 0,
            lower_range_prec: true,
            outer_annots: Vec::new(),
            errors: Vec::new(),
            anon_space_id: 0,
            anon_lambda_id: 0,
            anon_compr_id: 0,
        }
    }

    /// Parse the whole input into a [`Module`] whose body ends with a single
    /// `EndOfFile` sentinel. Errors are collected on the parser; check
    /// [`Parser::errors`] afterwards.
    pub fn parse(&mut self) -> Module {
        let start = self.current().info;
        let mut body = Vec::new();

        self.skip_ends();
        let doc = self.take_docstring();

        loop {
            self.skip_ends();
            if self.at(&TokenKind::Eof) {
                body.push(Ir::EndOfFile(self.current().info));
                break;
            }
            let before = self.pos;
            match self.declaration() {
                Ok(decl) => body.push(decl),
                Err(diag) => {
                    self.errors.push(diag);
                    self.next_decl();
                    if self.pos == before {
                        // Recovery must make progress.
                        self.advance();
                    }
                }
            }
        }

        let end = self.current().info;
        Module {
            name: self.source_name.module_name(),
            body,
            annotations: Vec::new(),
            doc,
            src: start.to(end),
        }
    }

    /// Parse one logical line into its declarations.
    ///
    /// Returns [`LineParse::Incomplete`] when the input ends inside an open
    /// declaration, and the first diagnostic otherwise on malformed input.
    pub fn parse_line(&mut self) -> Result<LineParse, Diagnostic> {
        let mut decls = Vec::new();
        loop {
            self.skip_ends();
            if self.at(&TokenKind::Eof) {
                break;
            }
            match self.declaration() {
                Ok(decl) => decls.push(decl),
                Err(diag) => {
                    if self.at(&TokenKind::Eof) || self.open_at_end() {
                        return Ok(LineParse::Incomplete);
                    }
                    return Err(diag);
                }
            }
        }
        Ok(LineParse::Complete(decls))
    }

    /// Diagnostics collected in whole-file mode.
    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Take the collected diagnostics.
    pub fn take_errors(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.errors)
    }

    /// The source this parser reads from.
    pub fn source_name(&self) -> &SourceName {
        &self.source_name
    }

    /// Whether the stream ends with an unterminated literal, which in line
    /// mode means "pull more input" rather than "error".
    fn open_at_end(&self) -> bool {
        self.tokens.iter().any(|t| {
            t.kind == TokenKind::Error && t.text.starts_with("unterminated")
        })
    }

    // ── Token access ───────────────────────────────────────────────────

    pub(crate) fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    /// Current token's source info.
    pub(crate) fn info(&self) -> SourceInfo {
        self.current().info
    }

    /// Whether the current token has the same kind (payloads ignored).
    pub(crate) fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    pub(crate) fn peek_is(&self, offset: usize, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek(offset).kind) == std::mem::discriminant(kind)
    }

    /// Consume and return the current token. At end of input keeps
    /// returning the `Eof` token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// Consume the current token if it has the given kind.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Require a token of the given kind, or produce a `MissingToken`
    /// diagnostic naming what was expected.
    pub(crate) fn expect(&mut self, kind: &TokenKind) -> Result<Token, Diagnostic> {
        if self.at(kind) {
            return Ok(self.advance());
        }
        Err(self.diag(
            DiagId::MissingToken,
            self.info(),
            format!(
                "expected {}, found {}",
                kind.describe(),
                self.current().kind.describe()
            ),
        ))
    }

    /// Build a diagnostic for this parser's source.
    pub(crate) fn diag(
        &self,
        id: DiagId,
        info: SourceInfo,
        message: impl Into<String>,
    ) -> Diagnostic {
        Diagnostic::new(self.source_name.clone(), info, id, message)
    }

    /// The kind of the next token that is not a newline, with its offset.
    pub(crate) fn peek_skip_nls(&self) -> (&TokenKind, usize) {
        let mut offset = 0;
        while self.peek_is(offset, &TokenKind::Newline) {
            offset += 1;
        }
        (&self.peek(offset).kind, offset)
    }

    // ── Trivia skipping and recovery ───────────────────────────────────

    /// Skip newlines and semicolons.
    pub(crate) fn skip_ends(&mut self) {
        while self.at(&TokenKind::Newline) || self.at(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Skip newlines only.
    pub(crate) fn skip_nls(&mut self) {
        while self.at(&TokenKind::Newline) {
            self.advance();
        }
    }

    /// Error recovery: skip tokens until the next declaration boundary --
    /// past a newline or semicolon at the current nesting level, or up to
    /// (not past) a closing brace of an enclosing block.
    pub(crate) fn next_decl(&mut self) {
        let mut depth = 0i32;
        loop {
            match &self.current().kind {
                TokenKind::Eof => return,
                TokenKind::Newline | TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    self.advance();
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ── Small shared pieces ────────────────────────────────────────────

    /// Bind a leading triple-quoted string as documentation, if present.
    /// Called with the parser at the head of a documentable body.
    pub(crate) fn take_docstring(&mut self) -> String {
        if let TokenKind::Str { triple: true } = &self.current().kind {
            let terminated = matches!(
                self.peek(1).kind,
                TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
            );
            if terminated {
                let token = self.advance();
                return match expressions::unescape(&token.text) {
                    Ok(text) => text,
                    Err(bad) => {
                        self.errors.push(self.diag(
                            DiagId::UnknownEscape,
                            token.info,
                            format!("unknown escape sequence '\\{bad}'"),
                        ));
                        String::new()
                    }
                };
            }
        }
        String::new()
    }

    /// Check that a just-parsed simple declaration is properly terminated.
    pub(crate) fn expect_decl_end(&self) -> Result<(), Diagnostic> {
        match &self.current().kind {
            TokenKind::Newline
            | TokenKind::Semicolon
            | TokenKind::RBrace
            | TokenKind::Eof => Ok(()),
            other => Err(self.diag(
                DiagId::UnexpectedToken,
                self.info(),
                format!("expected end of declaration, found {}", other.describe()),
            )),
        }
    }
}
