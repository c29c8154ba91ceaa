//! Lexer integration tests.
//!
//! Each test tokenizes a snippet and checks the produced kinds (and for
//! literals, the raw text). Escape sequences must come through raw -- the
//! parser owns unescaping.

use reed_common::token::{FStringPart, TokenKind};
use reed_lexer::Lexer;

fn kinds(source: &str) -> Vec<TokenKind> {
    Lexer::tokenize(source).into_iter().map(|t| t.kind).collect()
}

fn texts(source: &str) -> Vec<(TokenKind, String)> {
    Lexer::tokenize(source)
        .into_iter()
        .map(|t| (t.kind, t.text))
        .collect()
}

#[test]
fn empty_input_is_just_eof() {
    assert_eq!(kinds(""), vec![TokenKind::Eof]);
}

#[test]
fn comments_and_blanks_leave_newlines() {
    let toks = kinds("// line\n/* block\nstill block */ // tail\n");
    assert_eq!(
        toks,
        vec![TokenKind::Newline, TokenKind::Newline, TokenKind::Eof]
    );
}

#[test]
fn keywords_and_idents() {
    assert_eq!(
        kinds("fun foo funx not nothing"),
        vec![
            TokenKind::Fun,
            TokenKind::Ident,
            TokenKind::Ident,
            TokenKind::Not,
            TokenKind::Ident,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn integer_forms() {
    let toks = texts("42 0xFF 0b1010 1_000");
    assert_eq!(toks[0], (TokenKind::Int, "42".into()));
    assert_eq!(toks[1], (TokenKind::Int, "0xFF".into()));
    assert_eq!(toks[2], (TokenKind::Int, "0b1010".into()));
    assert_eq!(toks[3], (TokenKind::Int, "1_000".into()));
}

#[test]
fn float_forms() {
    let toks = texts("3.14 1e10 2.5e-3 0.0");
    for (kind, _) in &toks[..4] {
        assert_eq!(*kind, TokenKind::Float);
    }
}

#[test]
fn int_then_range_is_not_a_float() {
    assert_eq!(
        kinds("1..5"),
        vec![TokenKind::Int, TokenKind::DotDot, TokenKind::Int, TokenKind::Eof]
    );
}

#[test]
fn compound_operators_munch_maximally() {
    assert_eq!(
        kinds("++= ++ += + ^= == = ... .. . :: : << <= <"),
        vec![
            TokenKind::PlusPlusEq,
            TokenKind::PlusPlus,
            TokenKind::PlusEq,
            TokenKind::Plus,
            TokenKind::CaretEq,
            TokenKind::EqEq,
            TokenKind::Eq,
            TokenKind::DotDotDot,
            TokenKind::DotDot,
            TokenKind::Dot,
            TokenKind::ColonColon,
            TokenKind::Colon,
            TokenKind::LtLt,
            TokenKind::LtEq,
            TokenKind::Lt,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn star_eq_is_distinct_from_plus_eq() {
    assert_eq!(
        kinds("*= +="),
        vec![TokenKind::StarEq, TokenKind::PlusEq, TokenKind::Eof]
    );
}

#[test]
fn annotations() {
    assert_eq!(
        kinds("@name @!inner"),
        vec![
            TokenKind::At,
            TokenKind::Ident,
            TokenKind::AtBang,
            TokenKind::Ident,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn string_keeps_escapes_raw() {
    let toks = texts(r#""a\nb\"c""#);
    assert_eq!(toks[0], (TokenKind::Str { triple: false }, "a\\nb\\\"c".into()));
}

#[test]
fn triple_string_spans_lines() {
    let toks = Lexer::tokenize("\"\"\"line1\nline2\"\"\"");
    assert_eq!(toks[0].kind, TokenKind::Str { triple: true });
    assert_eq!(toks[0].text, "line1\nline2");
    assert_eq!(toks[0].info.lines, (1, 2));
}

#[test]
fn unterminated_string_is_an_error_token() {
    let toks = Lexer::tokenize("\"abc");
    assert_eq!(toks[0].kind, TokenKind::Error);
}

#[test]
fn fstring_decomposes_into_parts() {
    let toks = Lexer::tokenize(r#"f"x is {x + 1}!""#);
    let TokenKind::FString(parts) = &toks[0].kind else {
        panic!("expected f-string, got {:?}", toks[0].kind);
    };
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], FStringPart::Text("x is ".into()));
    match &parts[1] {
        FStringPart::Expr { src, .. } => assert_eq!(src, "x + 1"),
        other => panic!("expected expr part, got {other:?}"),
    }
    assert_eq!(parts[2], FStringPart::Text("!".into()));
}

#[test]
fn fstring_nested_braces_and_strings() {
    let toks = Lexer::tokenize(r#"f"{ {"k": 1}["k"] }""#);
    let TokenKind::FString(parts) = &toks[0].kind else {
        panic!("expected f-string");
    };
    assert_eq!(parts.len(), 1);
    match &parts[0] {
        FStringPart::Expr { src, .. } => assert_eq!(src, r#" {"k": 1}["k"] "#),
        other => panic!("expected expr part, got {other:?}"),
    }
}

#[test]
fn note_string_carries_prefix() {
    let toks = Lexer::tokenize(r##"md"# heading""##);
    assert_eq!(
        toks[0].kind,
        TokenKind::Note {
            prefix: "md".into()
        }
    );
    assert_eq!(toks[0].text, "# heading");
}

#[test]
fn source_info_tracks_lines_and_cols() {
    let toks = Lexer::tokenize("a\n  bb");
    assert_eq!(toks[0].info, reed_common::span::SourceInfo::new(1, 1, 1));
    assert_eq!(toks[1].kind, TokenKind::Newline);
    assert_eq!(toks[2].info, reed_common::span::SourceInfo::new(2, 3, 4));
}

#[test]
fn dollar_prefix_tokens() {
    assert_eq!(
        kinds("$x ::$y"),
        vec![
            TokenKind::Dollar,
            TokenKind::Ident,
            TokenKind::ColonColon,
            TokenKind::Dollar,
            TokenKind::Ident,
            TokenKind::Eof,
        ]
    );
}
