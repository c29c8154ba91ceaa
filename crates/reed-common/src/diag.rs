use std::fmt;

use ariadne::{Config, Label, Report, ReportKind, Source};
use serde::Serialize;

use crate::span::{SourceInfo, SourceName};

/// Stable identifier for every diagnostic the compiler can report.
///
/// The id is part of the user-visible output (`error[E0012]: ...`), so
/// variants are never reordered, only appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagId {
    // ── Lexical ────────────────────────────────────────────────────────
    UnexpectedCharacter,
    UnterminatedString,
    UnterminatedComment,

    // ── Syntactic ──────────────────────────────────────────────────────
    UnexpectedToken,
    ExpectedExpression,
    ExpectedIdentifier,
    MissingToken,
    UnknownEscape,
    InvalidIntLiteral,
    InvalidFloatLiteral,
    AllSymbolsOutsideImport,
    MultipleVarargs,
    RestOutsideAssignment,
    SwitchBodyExpected,

    // ── Semantic (analysis passes) ─────────────────────────────────────
    IncorrectAccessSyntax,
    IncorrectArgName,
    DuplicateNamedArg,
    DuplicateArg,
    NonDefaultArgAfterVararg,
    NonDefaultArgAfterDefault,
    LambdaConstructor,
    NonNilReturnInConstr,
    ReturnOutsideFunction,
    OperatorFunOutsideClass,
    GeneratorExpectsNoArgs,
    ConverterExpectsOneArg,

    // ── Emission ───────────────────────────────────────────────────────
    BreakOutsideLoop,
    ContinueOutsideLoop,
    /// A shape the analysis passes should have rejected reached emission.
    InternalError,
}

impl DiagId {
    /// The printable error code for this id.
    pub fn code(self) -> &'static str {
        match self {
            DiagId::UnexpectedCharacter => "E0001",
            DiagId::UnterminatedString => "E0002",
            DiagId::UnterminatedComment => "E0003",
            DiagId::UnexpectedToken => "E0010",
            DiagId::ExpectedExpression => "E0011",
            DiagId::ExpectedIdentifier => "E0012",
            DiagId::MissingToken => "E0013",
            DiagId::UnknownEscape => "E0014",
            DiagId::InvalidIntLiteral => "E0015",
            DiagId::InvalidFloatLiteral => "E0016",
            DiagId::AllSymbolsOutsideImport => "E0017",
            DiagId::MultipleVarargs => "E0018",
            DiagId::RestOutsideAssignment => "E0019",
            DiagId::SwitchBodyExpected => "E0020",
            DiagId::IncorrectAccessSyntax => "E0030",
            DiagId::IncorrectArgName => "E0031",
            DiagId::DuplicateNamedArg => "E0032",
            DiagId::DuplicateArg => "E0033",
            DiagId::NonDefaultArgAfterVararg => "E0034",
            DiagId::NonDefaultArgAfterDefault => "E0035",
            DiagId::LambdaConstructor => "E0036",
            DiagId::NonNilReturnInConstr => "E0037",
            DiagId::ReturnOutsideFunction => "E0038",
            DiagId::OperatorFunOutsideClass => "E0039",
            DiagId::GeneratorExpectsNoArgs => "E0040",
            DiagId::ConverterExpectsOneArg => "E0041",
            DiagId::BreakOutsideLoop => "E0050",
            DiagId::ContinueOutsideLoop => "E0051",
            DiagId::InternalError => "E0999",
        }
    }
}

/// A diagnostic: where it happened, what it is, and the rendered message.
///
/// Messages are rendered at construction so the sink never needs the
/// argument tuple back; the id stays machine-checkable for tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub source: SourceName,
    pub info: SourceInfo,
    pub id: DiagId,
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic with a rendered message.
    pub fn new(
        source: SourceName,
        info: SourceInfo,
        id: DiagId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            info,
            id,
            message: message.into(),
        }
    }

    /// Render this diagnostic over its source text with a caret label,
    /// ariadne-style. `source_text` must be the full text of the unit the
    /// diagnostic was produced from.
    pub fn render(&self, source_text: &str) -> String {
        let range = byte_range(source_text, self.info);
        let mut out = Vec::new();
        let _ = Report::<std::ops::Range<usize>>::build(ReportKind::Error, range.clone())
            .with_code(self.id.code())
            .with_message(&self.message)
            .with_config(Config::default().with_color(false))
            .with_label(Label::new(range).with_message(&self.message))
            .finish()
            .write(Source::from(source_text), &mut out);
        let body = String::from_utf8_lossy(&out);
        format!("{}: {}:{}\n{}", self.id.code(), self.source, self.info, body)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: error[{}]: {}",
            self.source,
            self.info,
            self.id.code(),
            self.message
        )
    }
}

impl std::error::Error for Diagnostic {}

/// Convert a 1-based (line, column) range into a byte range over the text.
///
/// Out-of-range positions clamp to the end of the text, so a diagnostic at
/// end-of-input still renders.
fn byte_range(text: &str, info: SourceInfo) -> std::ops::Range<usize> {
    let start = offset_of(text, info.lines.0, info.cols.0);
    let end = offset_of(text, info.lines.1, info.cols.1 + 1);
    start..end.max(start)
}

fn offset_of(text: &str, line: u32, col: u32) -> usize {
    let mut cur_line = 1u32;
    let mut line_start = 0usize;
    if line > 1 {
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                cur_line += 1;
                line_start = i + 1;
                if cur_line == line {
                    break;
                }
            }
        }
    }
    let col_off = col.saturating_sub(1) as usize;
    let line_end = text[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(text.len());
    (line_start + col_off).min(line_end)
}
