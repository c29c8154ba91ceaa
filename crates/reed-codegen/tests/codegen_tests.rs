//! Bytecode emitter tests: lowering shapes, break/continue backpatching,
//! register monotonicity, and the analysis checks that only emission can
//! make.

use reed_codegen::opcode::{
    Bytecode, Opcode, Register, BREAK_PLACEHOLDER, CONTINUE_PLACEHOLDER, RESERVED_CREGS,
    RESERVED_REGS,
};
use reed_codegen::BytecodeGen;
use reed_common::diag::{DiagId, Diagnostic};
use reed_common::span::SourceName;
use reed_parser::ir::{Ir, Module};
use reed_parser::Parser;
use reed_passes::transform::dce::DeadCodeElimination;
use reed_passes::transform::fold::ConstantFolding;
use reed_passes::Pipeline;

fn parse(source: &str) -> Module {
    let mut parser = Parser::new(source, SourceName::Str);
    let module = parser.parse();
    assert!(parser.errors().is_empty(), "{:#?}", parser.errors());
    module
}

/// Parse, run the standard pipeline, and emit.
fn compile(source: &str) -> Result<Bytecode, Diagnostic> {
    let mut module = parse(source);
    Pipeline::new(SourceName::Str)
        .run(&mut module)
        .expect("analysis should succeed");
    let mut code = Bytecode::new();
    let mut gen = BytecodeGen::new(&mut code, SourceName::Str);
    gen.generate(&Ir::Module(module))?;
    Ok(code)
}

fn compile_ok(source: &str) -> Bytecode {
    compile(source).expect("emission should succeed")
}

/// Emit without any passes at all (oracle builds).
fn emit_raw(source: &str) -> Bytecode {
    let module = parse(source);
    let mut code = Bytecode::new();
    let mut gen = BytecodeGen::new(&mut code, SourceName::Str);
    gen.generate(&Ir::Module(module)).expect("emission");
    code
}

// ── Break / continue placement ─────────────────────────────────────────

#[test]
fn break_and_continue_outside_of_a_loop_abort_emission() {
    let cases = [
        ("break", DiagId::BreakOutsideLoop),
        ("continue", DiagId::ContinueOutsideLoop),
        ("space F { break; }", DiagId::BreakOutsideLoop),
        ("class X { fun X() { continue; }; }", DiagId::ContinueOutsideLoop),
        ("fun f() { break; }", DiagId::BreakOutsideLoop),
        // A loop in the enclosing frame does not license a break inside a
        // nested function body.
        ("while (a) { fun g() { break; } }", DiagId::BreakOutsideLoop),
    ];
    for (source, id) in cases {
        let err = compile(source).expect_err(source);
        assert_eq!(err.id, id, "{source}");
    }

    for source in [
        "for (x: [1,2,3]) break",
        "do { continue; } while(false)",
        "while (true) { break; }",
        "while (a) { switch (b) { case 1: { break } } }",
    ] {
        compile(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    }
}

/// No placeholder jump survives backpatching, in any loop shape.
fn assert_no_placeholders(code: &Bytecode) {
    for (i, op) in code.ops().iter().enumerate() {
        if let Opcode::Jmp { addr } = op {
            assert!(
                *addr != BREAK_PLACEHOLDER && *addr != CONTINUE_PLACEHOLDER,
                "unresolved placeholder at {i:04}:\n{code}"
            );
        }
    }
}

#[test]
fn break_continue_backpatching_resolves_all_placeholders() {
    let code = compile_ok(
        "while (a) {\nif (b) break\nif (c) continue\nx = 1\n}\n\
         do {\nif (d) continue\n} while (e)\n\
         for (i: xs) {\nif (i) break\n}\n",
    );
    assert_no_placeholders(&code);
}

#[test]
fn nested_loops_patch_to_their_own_loop() {
    let code = compile_ok(
        "while (a) {\nwhile (b) {\nbreak\n}\nbreak\n}\n",
    );
    assert_no_placeholders(&code);

    // The two resolved break targets must differ: the inner break lands
    // before the outer one does.
    let targets: Vec<usize> = code
        .ops()
        .iter()
        .enumerate()
        .filter_map(|(i, op)| match op {
            // A backward jump is the loop-top jump, a forward one a break.
            Opcode::Jmp { addr } if *addr > i => Some(*addr),
            _ => None,
        })
        .collect();
    assert_eq!(targets.len(), 2, "{code}");
    assert!(targets[0] < targets[1], "{code}");
}

#[test]
fn break_inside_switch_patches_to_the_enclosing_loop() {
    let code = compile_ok("while (a) {\nswitch (b) {\ncase 1: { break }\n}\n}\n");
    assert_no_placeholders(&code);
}

// ── Register allocation ────────────────────────────────────────────────

/// Freshly allocated destination registers are strictly increasing within
/// one frame, per pool.
fn assert_monotonic(code: &Bytecode, range: std::ops::Range<usize>) {
    let mut last_general: Option<Register> = None;
    let mut last_const: Option<Register> = None;
    for op in &code.ops()[range] {
        // Function bodies have their own frames; skip their inline ranges
        // by construction (callers pass a flat range).
        if let Some((dst, constant)) = op.allocated_dst() {
            let last = if constant { &mut last_const } else { &mut last_general };
            if let Some(prev) = *last {
                assert!(
                    dst > prev,
                    "register {dst} not above {prev} (const={constant}):\n{code}"
                );
            }
            *last = Some(dst);
        }
    }
}

#[test]
fn registers_grow_monotonically_and_never_reuse() {
    let code = compile_ok(
        "a = 1 + 2\nb = a * 3\nc = [a, b, \"s\"]\nd = a ? b : c\nif (a) { e = a }\nf = a && b\n",
    );
    assert_monotonic(&code, 0..code.len());
}

#[test]
fn function_bodies_reset_both_register_pools() {
    let code = compile_ok("x = 41\nfun f() {\ny = 7\n}\n");
    // Find the function body range from the BuildFun opcode.
    let (entry, end) = code
        .ops()
        .iter()
        .find_map(|op| match op {
            Opcode::BuildFun { entry, end, .. } => Some((*entry, *end)),
            _ => None,
        })
        .expect("BuildFun emitted");
    assert!(entry < end);
    assert_monotonic(&code, entry..end);

    // The first constant materialized inside the body starts the frame's
    // own pool.
    let first_const = code.ops()[entry..end]
        .iter()
        .find_map(|op| match op {
            Opcode::StoreIntConst { dst, value } => Some((*dst, *value)),
            _ => None,
        })
        .expect("constant in body");
    assert_eq!(first_const, (RESERVED_CREGS, 7));

    // Control flow skips over the inline body.
    match &code.ops()[entry - 1] {
        Opcode::Jmp { addr } => assert_eq!(*addr, end),
        other => panic!("expected skip jump before body, got {other:?}"),
    }
}

#[test]
fn falling_off_a_function_returns_nil() {
    let code = compile_ok("fun f() {\nx = 1\n}\n");
    let (entry, end) = code
        .ops()
        .iter()
        .find_map(|op| match op {
            Opcode::BuildFun { entry, end, .. } => Some((*entry, *end)),
            _ => None,
        })
        .expect("BuildFun emitted");
    assert!(matches!(code.ops()[end - 1], Opcode::Return { .. }));
    assert!(code.ops()[entry..end]
        .iter()
        .any(|op| matches!(op, Opcode::StoreNilConst { .. })));
}

#[test]
fn function_signature_encodes_argument_names() {
    let code = compile_ok("class C {\nfun m(a, b) {}\nfun C(x) {}\n}");
    let names: Vec<&str> = code
        .ops()
        .iter()
        .filter_map(|op| match op {
            Opcode::BuildFun { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["m(a,b,this)", "C(x,this)"]);
}

// ── Constant pool ──────────────────────────────────────────────────────

#[test]
fn constants_materialize_once_per_frame() {
    let code = compile_ok("a = 42\nb = 42\nc = 42\n");
    let materializations = code
        .ops()
        .iter()
        .filter(|op| matches!(op, Opcode::StoreIntConst { value: 42, .. }))
        .count();
    assert_eq!(materializations, 1, "{code}");
}

#[test]
fn two_constant_operands_promote_one_side() {
    // Without folding, `1 + 2` has two constant-pool operands; the left
    // one must be promoted into a general register first.
    let code = emit_raw("a = 1 + 2\n");
    let mut saw_promotion = false;
    for op in code.ops() {
        if let Opcode::Add { lhs, rhs, .. } = op {
            assert!(
                !(lhs.constant && rhs.constant),
                "two constant operands on one instruction:\n{code}"
            );
            saw_promotion = true;
        }
    }
    assert!(saw_promotion, "no Add emitted:\n{code}");
    assert!(code
        .ops()
        .iter()
        .any(|op| matches!(op, Opcode::StoreConst { .. })));
}

// ── Lowering shapes ────────────────────────────────────────────────────

#[test]
fn folding_reaches_the_emitted_constant() {
    // `a = 40 + 2` with folding emits a single 42 constant and no Add.
    let mut module = parse("a = 40 + 2\n");
    let mut pipeline = Pipeline::new(SourceName::Str);
    pipeline.add_pass(Box::new(ConstantFolding::new()));
    pipeline.run(&mut module).unwrap();
    let mut code = Bytecode::new();
    let mut gen = BytecodeGen::new(&mut code, SourceName::Str);
    gen.generate(&Ir::Module(module)).unwrap();

    assert!(code
        .ops()
        .iter()
        .any(|op| matches!(op, Opcode::StoreIntConst { value: 42, .. })));
    assert!(!code.ops().iter().any(|op| matches!(op, Opcode::Add { .. })));
}

#[test]
fn short_circuit_writes_both_branches_into_one_register() {
    let code = compile_ok("x = a && b\n");
    let stores: Vec<Register> = code
        .ops()
        .iter()
        .filter_map(|op| match op {
            Opcode::Store { dst, .. } | Opcode::StoreConst { dst, .. } => Some(*dst),
            _ => None,
        })
        .collect();
    assert_eq!(stores.len(), 2, "{code}");
    assert_eq!(stores[0], stores[1], "phi writes must share a register:\n{code}");
    assert!(code
        .ops()
        .iter()
        .any(|op| matches!(op, Opcode::JmpIfFalse { .. })));
}

#[test]
fn attribute_access_lowers_to_load_attr() {
    let code = compile_ok("v = obj.field\nobj.field = v\n");
    assert!(code
        .ops()
        .iter()
        .any(|op| matches!(op, Opcode::LoadAttr { name, .. } if name == "field")));
    assert!(code
        .ops()
        .iter()
        .any(|op| matches!(op, Opcode::StoreAttr { name, .. } if name == "field")));
}

#[test]
fn calls_push_positional_and_named_arguments() {
    let code = compile_ok("foo(1, 2, x = 3)\n");
    let pushes: Vec<String> = code
        .ops()
        .iter()
        .filter_map(|op| match op {
            Opcode::PushArg { .. } => Some("pos".to_string()),
            Opcode::PushNamedArg { name, .. } => Some(format!("named:{name}")),
            _ => None,
        })
        .collect();
    assert_eq!(pushes, vec!["pos", "pos", "named:x"]);
    assert!(code.ops().iter().any(|op| matches!(op, Opcode::Call { .. })));
}

#[test]
fn switch_lowers_to_eq_and_conditional_jumps() {
    let code = compile_ok("switch (x) {\ncase 1, 2: { a }\ncase 3: { b }\ndefault: { c }\n}\n");
    let eqs = code
        .ops()
        .iter()
        .filter(|op| matches!(op, Opcode::Eq { .. }))
        .count();
    let cond_jumps = code
        .ops()
        .iter()
        .filter(|op| matches!(op, Opcode::JmpIf { .. }))
        .count();
    assert_eq!(eqs, 3, "one eq per case value:\n{code}");
    assert_eq!(cond_jumps, 3, "one dispatch jump per case value:\n{code}");
}

#[test]
fn try_catch_finally_registers_a_handler() {
    let code = compile_ok(
        "try {\nrisky()\n} catch (e:[ValueError]) {\nh(e)\n} finally {\ncleanup()\n}\n",
    );
    let handler = code
        .ops()
        .iter()
        .find_map(|op| match op {
            Opcode::PushHandler {
                catch_addr,
                finally_addr,
            } => Some((*catch_addr, *finally_addr)),
            _ => None,
        })
        .expect("PushHandler emitted");
    assert!(handler.0 > 0, "catch address patched:\n{code}");
    assert!(handler.1.is_some(), "finally address patched:\n{code}");
    assert!(code.ops().iter().any(|op| matches!(op, Opcode::PopHandler)));
    assert!(code.ops().iter().any(
        |op| matches!(op, Opcode::MatchException { types, .. } if types == &["ValueError".to_string()])
    ));
    assert!(code.ops().iter().any(|op| matches!(op, Opcode::ReRaise)));
}

#[test]
fn import_lowering() {
    let code = compile_ok(
        "import a::b::c as x\nimport ns::*\nimport m::{p, q}\nimport $outer::sym\n",
    );
    let mut imports = Vec::new();
    for op in code.ops() {
        match op {
            Opcode::Import {
                path,
                alias,
                non_local,
                ..
            } => imports.push(format!(
                "{}{} as {}",
                if *non_local { "$" } else { "" },
                path.join("::"),
                alias
            )),
            Opcode::ImportAll { path, non_local } => imports.push(format!(
                "{}{}::*",
                if *non_local { "$" } else { "" },
                path.join("::")
            )),
            _ => {}
        }
    }
    assert_eq!(
        imports,
        vec![
            "a::b::c as x",
            "ns::*",
            "m::p as ",
            "m::q as ",
            "$outer::sym as ",
        ]
    );
}

#[test]
fn for_loop_lowers_through_an_iterator() {
    let code = compile_ok("for (i: xs) {\ni\n}\n");
    assert!(code
        .ops()
        .iter()
        .any(|op| matches!(op, Opcode::IterCreate { .. })));
    let next = code
        .ops()
        .iter()
        .find_map(|op| match op {
            Opcode::IterNext { done, .. } => Some(*done),
            _ => None,
        })
        .expect("IterNext emitted");
    assert_eq!(next, code.len(), "exhaustion jumps past the loop:\n{code}");
}

#[test]
fn multivar_destructuring_unpacks_each_target() {
    let code = compile_ok("a, b, c = xs\n");
    let unpacks = code
        .ops()
        .iter()
        .filter(|op| matches!(op, Opcode::IterUnpack { .. }))
        .count();
    assert_eq!(unpacks, 3, "{code}");

    let code = compile_ok("a, ...rest, z = xs\n");
    assert!(code
        .ops()
        .iter()
        .any(|op| matches!(op, Opcode::IterRest { .. })));
}

#[test]
fn silent_values_suppress_repl_output() {
    let emit_repl = |source: &str| {
        let mut module = parse(source);
        Pipeline::new(SourceName::Str).run(&mut module).unwrap();
        let mut code = Bytecode::new();
        let mut gen = BytecodeGen::new(&mut code, SourceName::Str);
        gen.set_output_values(true);
        gen.generate(&Ir::Module(module)).unwrap();
        code
    };

    let loud = emit_repl("1 + 2\n");
    assert!(loud.ops().iter().any(|op| matches!(op, Opcode::Output { .. })));

    let silent = emit_repl("~(1 + 2)\n");
    assert!(!silent.ops().iter().any(|op| matches!(op, Opcode::Output { .. })));

    // Without output mode nothing is printed either way.
    let quiet = compile_ok("1 + 2\n");
    assert!(!quiet.ops().iter().any(|op| matches!(op, Opcode::Output { .. })));
}

// ── DCE oracle ─────────────────────────────────────────────────────────

#[test]
fn dce_output_matches_a_hand_stripped_oracle() {
    let with_dead = "fun foo() {\n\"hi\"\nreturn 1\n\"dead\"\na = 42\n}\n\
                     while (c) {\nb\nbreak\nx = 9\n}\n";
    let stripped = "fun foo() {\n\"hi\"\nreturn 1\n}\n\
                    while (c) {\nb\nbreak\n}\n";

    let mut module = parse(with_dead);
    let mut pipeline = Pipeline::empty(SourceName::Str);
    pipeline.add_pass(Box::new(DeadCodeElimination::new()));
    pipeline.run(&mut module).unwrap();
    let mut dce_code = Bytecode::new();
    let mut gen = BytecodeGen::new(&mut dce_code, SourceName::Str);
    gen.generate(&Ir::Module(module)).unwrap();

    let oracle = emit_raw(stripped);
    assert_eq!(dce_code.ops(), oracle.ops(), "bytecode must match the oracle");
}

// ── Reserved registers ─────────────────────────────────────────────────

#[test]
fn allocation_starts_above_the_reserved_ranges() {
    let code = emit_raw("a = 1\n");
    for op in code.ops() {
        if let Some((dst, constant)) = op.allocated_dst() {
            let floor = if constant { RESERVED_CREGS } else { RESERVED_REGS };
            assert!(dst >= floor, "{op} allocates inside the reserved range");
        }
    }
}
