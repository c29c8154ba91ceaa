//! Semantic analysis tests: method/constructor tagging, function signature
//! checks, and expression shape checks, run through the standard pipeline.

use reed_common::diag::DiagId;
use reed_common::span::SourceName;
use reed_parser::ir::{Expr, Ir, Module};
use reed_parser::Parser;
use reed_passes::Pipeline;

fn parse(source: &str) -> Module {
    let mut parser = Parser::new(source, SourceName::Str);
    let module = parser.parse();
    assert!(parser.errors().is_empty(), "{:#?}", parser.errors());
    module
}

/// Run the standard pipeline; return the analyzed module.
fn analyze(source: &str) -> Result<Module, reed_common::diag::Diagnostic> {
    let mut module = parse(source);
    Pipeline::new(SourceName::Str).run(&mut module)?;
    Ok(module)
}

/// Every line must produce the given diagnostic on its own.
fn check_all_lines_err(lines: &[&str], id: DiagId) {
    for line in lines {
        match analyze(line) {
            Err(diag) => assert_eq!(diag.id, id, "wrong diagnostic for: {line}\n{diag}"),
            Ok(_) => panic!("expected {id:?} for: {line}"),
        }
    }
}

fn as_function(node: &Ir) -> &reed_parser::ir::Function {
    match node {
        Ir::Function(f) => f,
        other => panic!("expected function, got {:?}", other.kind()),
    }
}

fn as_lambda(node: &Ir) -> &reed_parser::ir::Lambda {
    match node {
        Ir::Expr(Expr::Lambda(l)) => l,
        other => panic!("expected lambda, got {:?}", other.kind()),
    }
}

// ── Method analysis ────────────────────────────────────────────────────

#[test]
fn constructor_and_method_tagging() {
    let source = r#"
fun foo1(a) {}
fun foo2() = 4

class Cl1 {
    fun Cl1(a) {}
    fun Cl1(a, b) {}

    fun get_f() = "42"
    fun get_g() {return 4;}

    class Cl2 {
        fun Cl2() {}
        fun Cl1() {}

        fun f1() {}
    }
}

space Spc1 {
    class Cl3 {
        fun f2() {}
        space {
            fun f3() {}
        }
        fun Cl3(a, b:Int) {}
    }
    fun f4(a, b, ... c) {}
}

fun foo3() {}
"#;

    let module = analyze(source).unwrap();
    let body = &module.body;

    let foo1 = as_function(&body[0]);
    assert!(!foo1.method);
    assert!(!foo1.constructor);

    let foo2 = as_lambda(&body[1]);
    assert!(!foo2.method);

    let Ir::Class(cl1) = &body[2] else {
        panic!("expected class Cl1");
    };
    let cl1_cons = as_function(&cl1.body[0]);
    assert!(cl1_cons.constructor);
    assert!(cl1_cons.method);

    let cl1_cons2 = as_function(&cl1.body[1]);
    assert!(cl1_cons2.constructor);
    assert!(cl1_cons2.method);

    let get_f = as_lambda(&cl1.body[2]);
    assert!(get_f.method);

    let get_g = as_function(&cl1.body[3]);
    assert!(!get_g.constructor);
    assert!(get_g.method);

    let Ir::Class(cl2) = &cl1.body[4] else {
        panic!("expected class Cl2");
    };
    let cl2_cons = as_function(&cl2.body[0]);
    assert!(cl2_cons.constructor);
    assert!(cl2_cons.method);

    // A method named like the *outer* class is not a constructor here.
    let cl2_cl1 = as_function(&cl2.body[1]);
    assert!(!cl2_cl1.constructor);
    assert!(cl2_cl1.method);

    let f1 = as_function(&cl2.body[2]);
    assert!(!f1.constructor);
    assert!(f1.method);

    let Ir::Space(spc1) = &body[3] else {
        panic!("expected space Spc1");
    };
    let Ir::Class(cl3) = &spc1.body[0] else {
        panic!("expected class Cl3");
    };
    let f2 = as_function(&cl3.body[0]);
    assert!(!f2.constructor);
    assert!(f2.method);

    // A function in a space nested inside the class is not a method.
    let Ir::Space(inner_space) = &cl3.body[1] else {
        panic!("expected anonymous space");
    };
    let f3 = as_function(&inner_space.body[0]);
    assert!(!f3.constructor);
    assert!(!f3.method);

    let cl3_cons = as_function(&cl3.body[2]);
    assert!(cl3_cons.constructor);
    assert!(cl3_cons.method);

    let f4 = as_function(&spc1.body[1]);
    assert!(!f4.constructor);
    assert!(!f4.method);

    let foo3 = as_function(&body[4]);
    assert!(!foo3.method);
    assert!(!foo3.constructor);
}

#[test]
fn constructor_assigning_attributes_is_fine() {
    let module = analyze("class M {\nfun M(a){this.name=a}\nfun me(){}\n}").unwrap();
    let Ir::Class(class) = &module.body[0] else {
        panic!("expected class M");
    };
    let ctor = as_function(&class.body[0]);
    assert!(ctor.constructor);
    assert!(ctor.method);
    let me = as_function(&class.body[1]);
    assert!(me.method);
    assert!(!me.constructor);
}

#[test]
fn lambda_constructors_are_rejected() {
    check_all_lines_err(
        &["class SomeClass {\nfun SomeClass() = nil\n}"],
        DiagId::LambdaConstructor,
    );
}

#[test]
fn non_nil_return_in_constructor_is_rejected() {
    let source = r#"
class SomeClass {
    fun SomeClass(x) {
        if (x == 4)
            return
        else
            return "hi"
    }
}
"#;
    check_all_lines_err(&[source], DiagId::NonNilReturnInConstr);

    // A bare return in a constructor is fine.
    analyze("class C {\nfun C(x) {\nreturn\n}\n}").unwrap();
    // A non-nil return in an ordinary method is fine.
    analyze("class C {\nfun m(x) {\nreturn x\n}\n}").unwrap();
    // A nested function inside a constructor may return values.
    analyze("class C {\nfun C() {\nfun helper() {\nreturn 5\n}\n}\n}").unwrap();
}

// ── Function analysis ──────────────────────────────────────────────────

#[test]
fn duplicate_args() {
    check_all_lines_err(
        &[
            "fun g(a, b, a, c) {}",
            "fun g(a, b, ... a) {}",
            "class Cls { fun Cls(a, v, g, a) {}; }",
            "class Cls { fun a(a, v, g, a) {}; }",
            "space f { fun f(a, a) {}; }",
            "fun d(a:[Bool,String], b, a:Int) {}",
            "fun(a, b, a=4) = 4",
            "class C { fun foo(a, b, b)=nil; }",
            "space s { fun(a, v, v)=true; }",
            "lam = fun lambda(a, no, b, no) = 45",
        ],
        DiagId::DuplicateArg,
    );
}

#[test]
fn non_default_arg_after_vararg() {
    check_all_lines_err(
        &[
            "fun g(a, b, ... t, c) {}",
            "class F { fun g(a, b, ... t, c) {}; }",
            "class F { fun F(a, ...b, f) {}; }",
            "space S { fun foo(a, l, ...m, o) {}; }",
            "fun(a, ...b, t=5, c) = 43",
            "class F { fun foo(a, b=4, ...c, t) = 4; }",
            "space { fun(a, b, ...d, o, p) = false; }",
        ],
        DiagId::NonDefaultArgAfterVararg,
    );

    // Defaulted arguments after the vararg are legal.
    analyze("fun g(a, ...b, c=4) {}").unwrap();
}

#[test]
fn non_default_arg_after_default() {
    check_all_lines_err(
        &[
            "fun foo(a=4, b) {}",
            "fun goo(a, b, c:[Int,Float]=5, d) {}",
            "fun(a=4, b)=a",
            "class C { fun C(a, b=4, f) {}; }",
            "class C { fun f(a=4, b){}; }",
            "class Doe { fun i(ano=4, ne) = ne; }",
            "space DF { fun foo(a, b=4, c, d=4) {}; }",
        ],
        DiagId::NonDefaultArgAfterDefault,
    );
}

#[test]
fn operator_functions_outside_a_class() {
    check_all_lines_err(
        &[
            "fun (+)(a) { return this.x + a }",
            "fun (==)(a) = this.x == a",
            "fun (in)(a) { return a }",
            "fun (not)() { return nil }",
            "fun (())() { return nil }",
            "fun ([])(other) = other",
        ],
        DiagId::OperatorFunOutsideClass,
    );

    // Inside a class they are ordinary methods.
    analyze("class N {\nfun (+)(a) { return a }\nfun ([])(i) = i\n}").unwrap();
}

#[test]
fn generator_and_converter_signatures() {
    check_all_lines_err(
        &[
            r#"@generator("pt") fun g(a) {}"#,
            r#"fun g(a) { @!generator("pt"); }"#,
            r#"@generator("pt") @converter("txt", "pt") fun pt2pta(a) = a"#,
            r#"@generator fun g2() {}"#,
        ],
        DiagId::GeneratorExpectsNoArgs,
    );
    check_all_lines_err(
        &[
            r#"@converter("pt", "pta") fun c(a, b) {}"#,
            r#"@converter("pt", "pta") fun c(a, b) = a"#,
            r#"@converter("pt") fun c(a) {}"#,
        ],
        DiagId::ConverterExpectsOneArg,
    );

    analyze(r#"@generator("pt") fun g() {}"#).unwrap();
    analyze(r#"@converter("src", "dst") fun c(x) = x"#).unwrap();
}

#[test]
fn returns_outside_of_functions() {
    check_all_lines_err(
        &[
            "return 43",
            "space Sp { a = 4; return a; }",
            "class A { return 4; }",
        ],
        DiagId::ReturnOutsideFunction,
    );
}

// ── Expression analysis ────────────────────────────────────────────────

#[test]
fn member_access_shape() {
    check_all_lines_err(
        &[
            "1 * a.4",
            "x.b.(2)",
            "a.\"hello\"",
            "og.$g",
            "a.::b",
        ],
        DiagId::IncorrectAccessSyntax,
    );

    analyze("1 + (2).foo();\na.b.c.f(3)").unwrap();
    analyze("this.(==)(a)").unwrap();
}

#[test]
fn named_argument_shape() {
    check_all_lines_err(&["foo(a.b = 1)"], DiagId::IncorrectArgName);
    check_all_lines_err(&["foo(x = 1, x = 2)"], DiagId::DuplicateNamedArg);

    analyze("foo(x = 1, y = 2)").unwrap();
    analyze("foo(1, 2, x = 3)").unwrap();
}

#[test]
fn scope_access_of_non_local_is_allowed() {
    // Imports may scope through non-local names, so `::$x` stays legal.
    analyze("::$x").unwrap();
    analyze("::x").unwrap();
}
