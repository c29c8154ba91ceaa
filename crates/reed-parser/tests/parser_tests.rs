//! Parser integration tests.
//!
//! Round-trip tests parse a snippet and compare the canonical debug
//! printing of the resulting IR -- `a + b * c` must read back as
//! `(a + (b * c))` -- plus structural checks on statement dispatch, error
//! recovery, and REPL line mode.

use reed_common::span::SourceName;
use reed_common::token::TokenKind;
use reed_parser::ir::{Expr, Ir, IrKind, Module, Operator};
use reed_parser::{LineParse, Parser};

fn parse_ok(source: &str) -> Module {
    let mut parser = Parser::new(source, SourceName::Str);
    let module = parser.parse();
    assert!(
        parser.errors().is_empty(),
        "unexpected parse errors: {:#?}",
        parser.errors()
    );
    module
}

fn dump(source: &str) -> String {
    parse_ok(source).to_string()
}

fn kinds(source: &str) -> Vec<IrKind> {
    parse_ok(source).body.iter().map(Ir::kind).collect()
}

// ── Whitespace and comments ────────────────────────────────────────────

#[test]
fn comments_and_blank_lines_parse_to_nothing() {
    let module = parse_ok(
        "\n\n\n// Comment\n\n  /* Another comment\n\n\n  */ // And here as well\n\n\n// Comment\n",
    );
    assert_eq!(module.body.len(), 1, "empty program should be just EOF");
    assert!(matches!(module.body[0], Ir::EndOfFile(_)));
}

// ── Statement dispatch ─────────────────────────────────────────────────

#[test]
fn statement_dispatch() {
    let source = "\
// Assert
assert(a, b);
assert(cond)

// Raise
raise except

// Return
return
return value

// Continue
continue

// Break
break
";
    assert_eq!(
        kinds(source),
        vec![
            IrKind::Assert,
            IrKind::Assert,
            IrKind::Raise,
            IrKind::Return,
            IrKind::Return,
            IrKind::Continue,
            IrKind::Break,
            IrKind::EndOfFile,
        ]
    );
}

#[test]
fn simple_values() {
    let source = "\
4545156
-121
0.054
-0.5
true
false
not true
-----9
not not not false
nil
";
    assert_eq!(
        kinds(source),
        vec![
            IrKind::IntLit,
            IrKind::UnaryExpr,
            IrKind::FloatLit,
            IrKind::UnaryExpr,
            IrKind::BoolLit,
            IrKind::BoolLit,
            IrKind::UnaryExpr,
            IrKind::UnaryExpr,
            IrKind::UnaryExpr,
            IrKind::NilLit,
            IrKind::EndOfFile,
        ]
    );

    // The unary operator kinds come out right.
    let module = parse_ok("-121\nnot true");
    let ops: Vec<Operator> = module
        .body
        .iter()
        .filter_map(|node| match node {
            Ir::Expr(Expr::Unary(u)) => Some(u.op),
            _ => None,
        })
        .collect();
    assert_eq!(ops, vec![Operator::Neg, Operator::Not]);
}

// ── Precedence and associativity round-trips ───────────────────────────

#[test]
fn expression_precedence_round_trip() {
    let source = r#"-a > 4
-(a > 9 < -8 <= 8)
not -a > -4
----+a
a >= a and b
a >= (not a)
not a > 4

true and false and true or a xor b and not c

a && b > 4 || (c and b && -f)

(a > 5 ? -4 : "hello")
(a > 4 ? c : d) != 0 ? some : not other

value in something
not 4 in somewhere
"x" in "hello " ++ "x" ++ "y"

a == b
b == c != d == (not g)

_1 = _2 = _3 = "hello"

a + 4 + b * -2
a * b / x % 3 - -1
((a + b) * (2 / v) + 1)
a ^ b ^ -1
b ^ (4 * 2 ^ a ^ 2)

a[-2]
g2["sfd"][a+1][8]
a[1+a^-2]

"Hello"[1,2..length]
a[-2*a,-2*a-2..some_value - 10]

foo()
foo(true)
foo(a+2, a++4, 1+(1*2))
foo(1,3..4)

std::math::pi + 4
foo::goo
"#;

    let expected = r#"((- a) > 4)
(- (((a > 9) < (- 8)) <= 8))
(not ((- a) > (- 4)))
(- (- (- (- a))))
((a >= a) and b)
(a >= (not a))
(not (a > 4))
(((((true and false) and true) or a) xor b) and (not c))
((a && (b > 4)) || ((c and b) && (- f)))
((a > 5) ? (- 4) : "hello")
((((a > 4) ? c : d) != 0) ? some : (not other))
(value in something)
(not (4 in somewhere))
("x" in (("hello " ++ "x") ++ "y"))
(a == b)
(((b == c) != d) == (not g))
(_1 = (_2 = (_3 = "hello")))
((a + 4) + (b * (- 2)))
((((a * b) / x) % 3) - (- 1))
(((a + b) * (2 / v)) + 1)
(a ^ (b ^ (- 1)))
(b ^ (4 * (2 ^ (a ^ 2))))
(a [] (- 2))
(((g2 [] "sfd") [] (a + 1)) [] 8)
(a [] (1 + (a ^ (- 2))))
("Hello" [] (1, 2..length))
(a [] (((- 2) * a), (((- 2) * a) - 2)..(some_value - 10)))
foo()
foo(true)
foo((a + 2), (a ++ 4), (1 + (1 * 2)))
foo(1, (3..4))
(((std :: math) :: pi) + 4)
(foo :: goo)
<IR: <end-of-file>>
"#;

    assert_eq!(dump(source), expected);
}

#[test]
fn compound_assignment_round_trip() {
    let expected = "\
(a += 1)
(a -= 2)
(a *= 3)
(a /= 4)
(a %= 5)
(a ^= 6)
(s ++= \"x\")
<IR: <end-of-file>>
";
    assert_eq!(
        dump("a += 1\na -= 2\na *= 3\na /= 4\na %= 5\na ^= 6\ns ++= \"x\"\n"),
        expected
    );
}

#[test]
fn silent_and_unpack_round_trip() {
    assert_eq!(
        dump("~foo()\na << [1, 2]\n"),
        "(~ foo())\n(a << [1, 2])\n<IR: <end-of-file>>\n"
    );
}

#[test]
fn multivar_round_trips() {
    assert_eq!(dump("k,l,m = a"), "((k,l,m) = a)\n<IR: <end-of-file>>\n");
    assert_eq!(
        dump("[e, f[0].a, g] = foo()"),
        "((e,((f [] 0) . a),g) = foo())\n<IR: <end-of-file>>\n"
    );
    assert_eq!(
        dump("a, ...rest, z = xs"),
        "((a,...rest,z) = xs)\n<IR: <end-of-file>>\n"
    );
    assert_eq!(dump("1, 3.. 12"), "(1, 3..12)\n<IR: <end-of-file>>\n");
}

#[test]
fn rest_marker_outside_assignment_is_an_error() {
    let mut parser = Parser::new("[a, ...b]", SourceName::Str);
    parser.parse();
    assert_eq!(parser.errors().len(), 1);
    assert_eq!(
        parser.errors()[0].id,
        reed_common::diag::DiagId::RestOutsideAssignment
    );
}

// ── Constructs ─────────────────────────────────────────────────────────

#[test]
fn function_and_lambda_round_trip() {
    let source = "\
fun foo() {
\"hi\"
return 1
}
fun bar(a, b:Int, c:[Bool,String], d=4, ...e) {}
fun lmb() = nil
fun(a, b) = a
";
    let expected = "\
fun foo() {
\"hi\"
return 1
}
fun bar(a, b:[Int], c:[Bool, String], d=4, ... e) {
}
(fun lmb() = nil)
(fun 0l(a, b) = a)
<IR: <end-of-file>>
";
    assert_eq!(dump(source), expected);
}

#[test]
fn operator_function_names() {
    let module = parse_ok("class C {\nfun (+)(a) { return a }\nfun ([])(i) = i\nfun (())() = nil\n}");
    let Ir::Class(class) = &module.body[0] else {
        panic!("expected class");
    };
    assert_eq!(class.body[0].name(), "(+)");
    assert_eq!(class.body[1].name(), "([])");
    assert_eq!(class.body[2].name(), "(())");
}

#[test]
fn class_space_enum_round_trip() {
    let source = "\
class Shape : Base, geo::Point {
fun Shape(a) {}
}
space Util {
a = 4
}
space {
b = 2
}
enum Color {
RED
GREEN
BLUE
}
";
    let expected = "\
class Shape : Base, (geo :: Point) {
fun Shape(a) {
}
}
space Util {
(a = 4)
}
space 0s {
(b = 2)
}
enum Color {
RED
GREEN
BLUE
}
<IR: <end-of-file>>
";
    assert_eq!(dump(source), expected);
}

#[test]
fn control_flow_round_trip() {
    let source = "\
if (a) {
x = 1
} else if (b) {
x = 2
} else {
x = 3
}
while (x < 10) x = x + 1
do {
x = x - 1
} while (x > 0)
for (i : 1..10) {
i
}
switch (x) {
case 1, 2: { a }
default: { b }
}
try {
risky()
} catch (e:[ValueError]) {
handle(e)
} finally {
cleanup()
}
";
    let expected = "\
if (a) {
(x = 1)
} else {
if (b) {
(x = 2)
} else {
(x = 3)
}
}
while ((x < 10)) {
(x = (x + 1))
}
do {
(x = (x - 1))
} while ((x > 0))
for (i: (1..10)) {
i
}
switch (x) {
case 1, 2: {
a
}
default: {
b
}
}
try {
risky()
} catch (e:[ValueError]) {
handle(e)
} finally {
cleanup()
}
<IR: <end-of-file>>
";
    assert_eq!(dump(source), expected);
}

#[test]
fn for_loop_multivar_iterator() {
    let module = parse_ok("for (i, m, n: a) {}");
    let Ir::ForLoop(fl) = &module.body[0] else {
        panic!("expected for loop");
    };
    assert_eq!(fl.iterator.kind(), IrKind::Multivar);
}

// ── Imports ────────────────────────────────────────────────────────────

#[test]
fn import_forms_round_trip() {
    assert_eq!(
        dump("import FooModule"),
        "import FooModule\n<IR: <end-of-file>>\n"
    );
    assert_eq!(
        dump("import a::b::c as x"),
        "import ((a :: b) :: c) as x\n<IR: <end-of-file>>\n"
    );
    assert_eq!(
        dump("import ns::*"),
        "import (ns :: *)\n<IR: <end-of-file>>\n"
    );
    assert_eq!(
        dump("import $outer::sym"),
        "import ($outer :: sym)\n<IR: <end-of-file>>\n"
    );
    // A group expands into one import name per member.
    assert_eq!(
        dump("import ns::{a, b}"),
        "import (ns :: a), (ns :: b)\n<IR: <end-of-file>>\n"
    );
}

// ── Annotations and docstrings ─────────────────────────────────────────

#[test]
fn outer_annotations_attach_to_the_next_declaration() {
    let module = parse_ok("@generator(\"pt\")\n@tag\nfun g() {}\n");
    let Ir::Function(fun) = &module.body[0] else {
        panic!("expected function");
    };
    assert_eq!(fun.annotations.len(), 2);
    assert_eq!(fun.annotations[0].name, "generator");
    assert_eq!(fun.annotations[1].name, "tag");
    assert!(!fun.annotations[0].inner);
}

#[test]
fn inner_annotations_stay_in_the_body() {
    let module = parse_ok("@!version(\"1.0\")\na = 4\n");
    let Ir::Annotation(ann) = &module.body[0] else {
        panic!("expected annotation statement");
    };
    assert!(ann.inner);
    assert_eq!(ann.name, "version");
}

#[test]
fn docstrings_bind_to_their_construct() {
    let source = "\"\"\"Module doc.\"\"\"\nfun f() {\n\"\"\"Function doc.\"\"\"\nreturn\n}\nclass C {\n\"\"\"Class doc.\"\"\"\n}\n";
    let module = parse_ok(source);
    assert_eq!(module.doc, "Module doc.");
    let Ir::Function(fun) = &module.body[0] else {
        panic!("expected function");
    };
    assert_eq!(fun.doc, "Function doc.");
    let Ir::Class(class) = &module.body[1] else {
        panic!("expected class");
    };
    assert_eq!(class.doc, "Class doc.");
}

// ── Strings ────────────────────────────────────────────────────────────

#[test]
fn string_unescaping() {
    let module = parse_ok(r#"s = "a\nb\tc\\d\"e\x41B\101""#);
    let Ir::Expr(Expr::Binary(be)) = &module.body[0] else {
        panic!("expected assignment");
    };
    let Expr::Str(lit) = be.right.as_ref() else {
        panic!("expected string literal");
    };
    assert_eq!(lit.value, "a\nb\tc\\d\"eABA");
}

#[test]
fn unknown_escape_is_a_diagnostic() {
    let mut parser = Parser::new(r#"s = "bad\q""#, SourceName::Str);
    parser.parse();
    assert_eq!(parser.errors().len(), 1);
    assert_eq!(parser.errors()[0].id, reed_common::diag::DiagId::UnknownEscape);
}

#[test]
fn fstring_rewrites_to_concatenation() {
    assert_eq!(
        dump(r#"f"x is {x + 1}!""#),
        "((\"x is \" ++ (x + 1)) ++ \"!\")\n<IR: <end-of-file>>\n"
    );
    assert_eq!(dump(r#"f"""#), "\"\"\n<IR: <end-of-file>>\n");
}

#[test]
fn note_string_round_trip() {
    assert_eq!(
        dump(r##"md"# heading""##),
        "md\"# heading\"\n<IR: <end-of-file>>\n"
    );
}

// ── List literals, comprehensions, dicts ───────────────────────────────

#[test]
fn collections_round_trip() {
    assert_eq!(
        dump("[lmb(), foo(4, 3)]\n{\"a\":1, \"b\": []}\n{:}\n"),
        "[lmb(), foo(4, 3)]\n{\"a\": 1, \"b\": []}\n{:}\n<IR: <end-of-file>>\n"
    );
}

#[test]
fn list_comprehension_round_trip() {
    assert_eq!(
        dump("[x * 2 : x = 1..10]"),
        "[(x * 2) : (x = (1..10))]\n<IR: <end-of-file>>\n"
    );
    assert_eq!(
        dump("[x if(x > 0) else 0 : x = xs, y = ys]"),
        "[x if((x > 0)) else 0 : (x = xs), (y = ys)]\n<IR: <end-of-file>>\n"
    );
}

// ── Error recovery ─────────────────────────────────────────────────────

#[test]
fn recovery_reports_one_diagnostic_per_error() {
    let source = "foo)\na = = 3\nb = [1, 2\n";
    let mut parser = Parser::new(source, SourceName::Str);
    parser.parse();
    assert_eq!(
        parser.errors().len(),
        3,
        "expected one diagnostic per independent error: {:#?}",
        parser.errors()
    );
}

#[test]
fn recovery_continues_after_an_error() {
    let source = "foo)\nb = 42\n";
    let mut parser = Parser::new(source, SourceName::Str);
    let module = parser.parse();
    assert_eq!(parser.errors().len(), 1);
    // The good declaration after the bad one still parses.
    assert!(module
        .body
        .iter()
        .any(|node| matches!(node, Ir::Expr(Expr::Binary(be)) if be.op == Operator::Set)));
}

// ── REPL line mode ─────────────────────────────────────────────────────

#[test]
fn parse_line_complete() {
    let mut parser = Parser::new("a = 1; b = 2", SourceName::Repl);
    match parser.parse_line().unwrap() {
        LineParse::Complete(decls) => assert_eq!(decls.len(), 2),
        LineParse::Incomplete => panic!("line should be complete"),
    }
}

#[test]
fn parse_line_open_brace_is_incomplete() {
    let mut parser = Parser::new("fun foo() {", SourceName::Repl);
    assert_eq!(parser.parse_line().unwrap(), LineParse::Incomplete);

    let mut parser = Parser::new("if (a) {\nx = 1", SourceName::Repl);
    assert_eq!(parser.parse_line().unwrap(), LineParse::Incomplete);
}

#[test]
fn parse_line_open_string_is_incomplete() {
    let mut parser = Parser::new("s = \"\"\"first line", SourceName::Repl);
    assert_eq!(parser.parse_line().unwrap(), LineParse::Incomplete);
}

#[test]
fn parse_line_reports_real_errors() {
    let mut parser = Parser::new("foo)", SourceName::Repl);
    assert!(parser.parse_line().is_err());
}

// ── Literal forms ──────────────────────────────────────────────────────

#[test]
fn literal_round_trips() {
    let first_line = |source: &str| dump(source).lines().next().unwrap().to_string();
    insta::assert_snapshot!(first_line("42"), @"42");
    insta::assert_snapshot!(first_line("0xFF"), @"255");
    insta::assert_snapshot!(first_line("0b1010"), @"10");
    insta::assert_snapshot!(first_line("2.5"), @"2.5");
    insta::assert_snapshot!(first_line("4.0"), @"4.0");
    insta::assert_snapshot!(first_line("nil"), @"nil");
    insta::assert_snapshot!(first_line("this"), @"this");
    insta::assert_snapshot!(first_line("super"), @"super");
    insta::assert_snapshot!(first_line("$outer"), @"$outer");
}

// ── Token source sanity ────────────────────────────────────────────────

#[test]
fn module_name_comes_from_the_source_name() {
    let mut parser = Parser::new("", SourceName::file("dir/widget.reed"));
    assert_eq!(parser.parse().name, "widget");
    let mut parser = Parser::new("", SourceName::Str);
    assert_eq!(parser.parse().name, "<one-liner>");
}

#[test]
fn eof_token_closes_every_module() {
    let module = parse_ok("a = 1");
    assert!(matches!(module.body.last(), Some(Ir::EndOfFile(_))));
    // TokenKind matching in the parser relies on Eof being emitted.
    let toks = reed_lexer::Lexer::tokenize("a = 1");
    assert_eq!(toks.last().unwrap().kind, TokenKind::Eof);
}
