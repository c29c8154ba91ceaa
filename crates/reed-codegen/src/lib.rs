//! Bytecode emitter for the Reed compiler.
//!
//! Lowers an analyzed IR tree to the register machine described in
//! [`opcode`]. The emitter appends to a [`Bytecode`] buffer it is handed,
//! so one buffer can accumulate several modules or REPL lines -- register
//! counters carry over between calls and reset only at function frames.
//!
//! Registers are assigned by two monotonically increasing counters, one
//! per pool, and are never reused; the VM treats registers as a
//! stack-sized frame and the compiler trades register density for clarity.
//! Constants are materialized once per frame through a value-identity map.
//! Break and continue lower to placeholder jumps that are backpatched once
//! the loop's end address is known; bounding the patch walk to the loop's
//! own address range is what makes nesting work.

pub mod opcode;

use reed_common::diag::{DiagId, Diagnostic};
use reed_common::span::{SourceInfo, SourceName};
use reed_parser::ir::{
    encode_fun_args, Argument, BinaryExpr, Case, Class, Expr, Function, If, Import, Ir, Lambda,
    ListForm, Multivar, Operator, Space, Switch, Try, UnaryExpr,
};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::opcode::{
    ArgDesc, Address, Bytecode, Opcode, Operand, Register, BREAK_PLACEHOLDER,
    CONTINUE_PLACEHOLDER, RESERVED_CREGS, RESERVED_REGS,
};

/// A register value descriptor returned by expression emission.
///
/// Records where the value lives (which pool, which index) and whether the
/// value was marked silent (`~`), which suppresses REPL output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegValue {
    index: Register,
    constant: bool,
    silent: bool,
}

impl RegValue {
    fn reg(index: Register) -> Self {
        Self {
            index,
            constant: false,
            silent: false,
        }
    }

    fn cnst(index: Register) -> Self {
        Self {
            index,
            constant: true,
            silent: false,
        }
    }

    /// The register index.
    pub fn index(&self) -> Register {
        self.index
    }

    /// Whether the value lives in the constant pool.
    pub fn is_const(&self) -> bool {
        self.constant
    }

    /// Whether the value should not be auto-printed at REPL top level.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// As an instruction operand.
    pub fn operand(&self) -> Operand {
        Operand {
            index: self.index,
            constant: self.constant,
        }
    }
}

/// Identity key for the per-frame constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Int(i64),
    /// Bit pattern; folding has already normalized the value.
    Float(u64),
    Bool(bool),
    Str(String),
    Nil,
}

/// Saved per-frame emitter state around a function/class/space body.
struct FrameSave {
    reg: Register,
    creg: Register,
    pool: FxHashMap<ConstKey, Register>,
    loop_depth: u32,
}

/// The bytecode generator.
///
/// Appends opcodes to the buffer passed at construction; the buffer must
/// not be modified by anyone else while the generator lives.
pub struct BytecodeGen<'a> {
    code: &'a mut Bytecode,
    curr_reg: Register,
    curr_creg: Register,
    const_pool: FxHashMap<ConstKey, Register>,
    loop_depth: u32,
    output_values: bool,
    source: SourceName,
}

impl<'a> BytecodeGen<'a> {
    pub fn new(code: &'a mut Bytecode, source: SourceName) -> Self {
        Self {
            code,
            curr_reg: RESERVED_REGS,
            curr_creg: RESERVED_CREGS,
            const_pool: FxHashMap::default(),
            loop_depth: 0,
            output_values: false,
            source,
        }
    }

    /// Resume emission with register counters carried over from an earlier
    /// generator on the same buffer (REPL lines share one frame).
    pub fn with_counters(
        code: &'a mut Bytecode,
        source: SourceName,
        reg: Register,
        creg: Register,
    ) -> Self {
        let mut gen = Self::new(code, source);
        gen.curr_reg = reg.max(RESERVED_REGS);
        gen.curr_creg = creg.max(RESERVED_CREGS);
        gen
    }

    /// The current next-free register counters, `(general, constant)`.
    pub fn counters(&self) -> (Register, Register) {
        (self.curr_reg, self.curr_creg)
    }

    /// Enable REPL output mode: non-silent top-level expression values get
    /// an `Output` opcode.
    pub fn set_output_values(&mut self, on: bool) {
        self.output_values = on;
    }

    /// Generate opcodes for a declaration (usually a whole module).
    ///
    /// Registers do not restart from zero when multiple declarations are
    /// passed to the same generator.
    pub fn generate(&mut self, decl: &Ir) -> Result<(), Diagnostic> {
        debug!(kind = ?decl.kind(), "emitting bytecode");
        match decl {
            Ir::Module(module) => self.emit_body(&module.body),
            other => self.emit_ir(other),
        }
    }

    // ── Small state helpers ────────────────────────────────────────────

    fn next_reg(&mut self) -> Register {
        let r = self.curr_reg;
        self.curr_reg += 1;
        r
    }

    fn next_creg(&mut self) -> Register {
        let r = self.curr_creg;
        self.curr_creg += 1;
        r
    }

    fn enter_frame(&mut self) -> FrameSave {
        let save = FrameSave {
            reg: self.curr_reg,
            creg: self.curr_creg,
            pool: std::mem::take(&mut self.const_pool),
            loop_depth: self.loop_depth,
        };
        self.curr_reg = RESERVED_REGS;
        self.curr_creg = RESERVED_CREGS;
        self.loop_depth = 0;
        save
    }

    fn leave_frame(&mut self, save: FrameSave) {
        self.curr_reg = save.reg;
        self.curr_creg = save.creg;
        self.const_pool = save.pool;
        self.loop_depth = save.loop_depth;
    }

    fn internal(&self, info: SourceInfo, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(self.source.clone(), info, DiagId::InternalError, message)
    }

    /// Materialize a constant once per frame and return its pool register.
    fn const_reg(&mut self, key: ConstKey) -> RegValue {
        if let Some(&existing) = self.const_pool.get(&key) {
            return RegValue::cnst(existing);
        }
        let dst = self.next_creg();
        let op = match &key {
            ConstKey::Int(value) => Opcode::StoreIntConst { dst, value: *value },
            ConstKey::Float(bits) => Opcode::StoreFloatConst {
                dst,
                value: f64::from_bits(*bits),
            },
            ConstKey::Bool(value) => Opcode::StoreBoolConst { dst, value: *value },
            ConstKey::Str(value) => Opcode::StoreStrConst {
                dst,
                value: value.clone(),
            },
            ConstKey::Nil => Opcode::StoreNilConst { dst },
        };
        self.code.push(op);
        self.const_pool.insert(key, dst);
        RegValue::cnst(dst)
    }

    /// Ensure a value lives in a general register, issuing the promoting
    /// `StoreConst` when it currently sits in the constant pool.
    fn get_ncreg(&mut self, val: RegValue) -> RegValue {
        if !val.constant {
            return val;
        }
        let dst = self.next_reg();
        self.code.push(Opcode::StoreConst {
            dst,
            src: val.index,
        });
        RegValue {
            index: dst,
            constant: false,
            silent: val.silent,
        }
    }

    /// Write `val` into an already-allocated general register.
    fn store_into(&mut self, dst: Register, val: &RegValue) {
        if val.constant {
            self.code.push(Opcode::StoreConst {
                dst,
                src: val.index,
            });
        } else {
            self.code.push(Opcode::Store {
                dst,
                src: val.index,
            });
        }
    }

    /// Two constant-pool operands on one instruction are not permitted;
    /// promote the left one when both are constant.
    fn binop_operands(&mut self, l: RegValue, r: RegValue) -> (Operand, Operand) {
        let l = if l.constant && r.constant {
            self.get_ncreg(l)
        } else {
            l
        };
        (l.operand(), r.operand())
    }

    // ── Declarations ───────────────────────────────────────────────────

    fn emit_body(&mut self, body: &[Ir]) -> Result<(), Diagnostic> {
        for node in body {
            self.emit_ir(node)?;
        }
        Ok(())
    }

    fn emit_ir(&mut self, node: &Ir) -> Result<(), Diagnostic> {
        match node {
            Ir::Module(module) => self.emit_body(&module.body),
            Ir::Space(space) => self.emit_space(space),
            Ir::Class(class) => self.emit_class(class),
            Ir::Function(fun) => {
                self.emit_function(fun)?;
                Ok(())
            }
            Ir::If(stmt) => self.emit_if(stmt),
            Ir::Switch(stmt) => self.emit_switch(stmt),
            Ir::Try(stmt) => self.emit_try(stmt),
            Ir::While(stmt) => {
                let top = self.code.len();
                let cond = self.emit_expr(&stmt.cond)?;
                let exit = self.code.push(Opcode::JmpIfFalse {
                    cond: cond.operand(),
                    addr: 0,
                });
                self.loop_depth += 1;
                let body = self.emit_body(&stmt.body);
                self.loop_depth -= 1;
                body?;
                self.code.push(Opcode::Jmp { addr: top });
                let end = self.code.len();
                self.code.patch_jump(exit, end);
                self.code.update_jumps(top, end, end, top);
                Ok(())
            }
            Ir::DoWhile(stmt) => {
                let top = self.code.len();
                self.loop_depth += 1;
                let body = self.emit_body(&stmt.body);
                self.loop_depth -= 1;
                body?;
                let cont = self.code.len();
                let cond = self.emit_expr(&stmt.cond)?;
                self.code.push(Opcode::JmpIf {
                    cond: cond.operand(),
                    addr: top,
                });
                let end = self.code.len();
                self.code.update_jumps(top, end, end, cont);
                Ok(())
            }
            Ir::ForLoop(stmt) => {
                let coll = self.emit_expr(&stmt.collection)?;
                let iter = self.next_reg();
                self.code.push(Opcode::IterCreate {
                    dst: iter,
                    coll: coll.operand(),
                });
                let top = self.code.len();
                let item = self.next_reg();
                let next_at = self.code.push(Opcode::IterNext {
                    dst: item,
                    iter,
                    done: 0,
                });
                self.store_target(&stmt.iterator, &RegValue::reg(item))?;
                self.loop_depth += 1;
                let body = self.emit_body(&stmt.body);
                self.loop_depth -= 1;
                body?;
                self.code.push(Opcode::Jmp { addr: top });
                let end = self.code.len();
                self.code.patch_jump(next_at, end);
                self.code.update_jumps(top, end, end, top);
                Ok(())
            }
            Ir::Enum(decl) => {
                let dst = self.next_reg();
                self.code.push(Opcode::BuildEnum {
                    dst,
                    name: decl.name.clone(),
                    values: decl.values.clone(),
                });
                Ok(())
            }
            Ir::Import(stmt) => self.emit_import(stmt),
            Ir::Assert(stmt) => {
                let cond = self.emit_expr(&stmt.cond)?;
                let msg = match &stmt.msg {
                    Some(msg) => Some(self.emit_expr(msg)?.operand()),
                    None => None,
                };
                self.code.push(Opcode::Assert {
                    cond: cond.operand(),
                    msg,
                });
                Ok(())
            }
            Ir::Raise(stmt) => {
                let exc = self.emit_expr(&stmt.exception)?;
                self.code.push(Opcode::Raise {
                    src: exc.operand(),
                });
                Ok(())
            }
            Ir::Return(stmt) => {
                let val = self.emit_expr(&stmt.expr)?;
                self.code.push(Opcode::Return {
                    src: val.operand(),
                });
                Ok(())
            }
            Ir::Break(info) => {
                if self.loop_depth == 0 {
                    return Err(Diagnostic::new(
                        self.source.clone(),
                        *info,
                        DiagId::BreakOutsideLoop,
                        "break outside of a loop",
                    ));
                }
                self.code.push(Opcode::Jmp {
                    addr: BREAK_PLACEHOLDER,
                });
                Ok(())
            }
            Ir::Continue(info) => {
                if self.loop_depth == 0 {
                    return Err(Diagnostic::new(
                        self.source.clone(),
                        *info,
                        DiagId::ContinueOutsideLoop,
                        "continue outside of a loop",
                    ));
                }
                self.code.push(Opcode::Jmp {
                    addr: CONTINUE_PLACEHOLDER,
                });
                Ok(())
            }
            Ir::Annotation(ann) => {
                let mut args = Vec::with_capacity(ann.args.len());
                for arg in &ann.args {
                    args.push(self.emit_expr(arg)?.operand());
                }
                self.code.push(Opcode::Annotate {
                    name: ann.name.clone(),
                    args,
                    inner: ann.inner,
                });
                Ok(())
            }
            Ir::EndOfFile(_) => Ok(()),
            Ir::Expr(expr) => {
                let val = self.emit_expr(expr)?;
                if self.output_values && !val.silent {
                    self.code.push(Opcode::Output {
                        src: val.operand(),
                    });
                }
                Ok(())
            }
        }
    }

    // ── Control flow ───────────────────────────────────────────────────

    fn emit_if(&mut self, stmt: &If) -> Result<(), Diagnostic> {
        let cond = self.emit_expr(&stmt.cond)?;
        let to_else = self.code.push(Opcode::JmpIfFalse {
            cond: cond.operand(),
            addr: 0,
        });
        self.emit_body(&stmt.body)?;
        match &stmt.else_branch {
            Some(els) => {
                let to_end = self.code.push(Opcode::Jmp { addr: 0 });
                self.code.patch_jump(to_else, self.code.len());
                self.emit_body(&els.body)?;
                self.code.patch_jump(to_end, self.code.len());
            }
            None => {
                self.code.patch_jump(to_else, self.code.len());
            }
        }
        Ok(())
    }

    fn emit_switch(&mut self, stmt: &Switch) -> Result<(), Diagnostic> {
        let scrutinee = {
            let val = self.emit_expr(&stmt.cond)?;
            self.get_ncreg(val)
        };

        // Test sequence: eq + cond-jump per case value.
        let mut case_jumps: Vec<Vec<Address>> = Vec::with_capacity(stmt.cases.len());
        for case in &stmt.cases {
            let mut jumps = Vec::new();
            if !case.default {
                for value in &case.values {
                    let val = self.emit_expr(value)?;
                    let dst = self.next_reg();
                    self.code.push(Opcode::Eq {
                        dst,
                        lhs: scrutinee.operand(),
                        rhs: val.operand(),
                    });
                    jumps.push(self.code.push(Opcode::JmpIf {
                        cond: Operand::reg(dst),
                        addr: 0,
                    }));
                }
            }
            case_jumps.push(jumps);
        }
        // No test matched: fall through to the default case, or past the
        // switch entirely.
        let fallthrough = self.code.push(Opcode::Jmp { addr: 0 });

        let mut exits = Vec::new();
        let mut default_addr = None;
        for (case, jumps) in stmt.cases.iter().zip(case_jumps) {
            let body_addr = self.code.len();
            if case.default {
                default_addr = Some(body_addr);
            }
            for at in jumps {
                self.code.patch_jump(at, body_addr);
            }
            self.emit_case_body(case)?;
            exits.push(self.code.push(Opcode::Jmp { addr: 0 }));
        }

        let end = self.code.len();
        self.code.patch_jump(fallthrough, default_addr.unwrap_or(end));
        for at in exits {
            self.code.patch_jump(at, end);
        }
        Ok(())
    }

    fn emit_case_body(&mut self, case: &Case) -> Result<(), Diagnostic> {
        self.emit_body(&case.body)
    }

    fn emit_try(&mut self, stmt: &Try) -> Result<(), Diagnostic> {
        let handler_at = self.code.push(Opcode::PushHandler {
            catch_addr: 0,
            finally_addr: None,
        });
        self.emit_body(&stmt.body)?;
        self.code.push(Opcode::PopHandler);
        let mut exits = vec![self.code.push(Opcode::Jmp { addr: 0 })];

        let catch_addr = self.code.len();
        for catch in &stmt.catches {
            let mut types = Vec::with_capacity(catch.arg.types.len());
            for ty in &catch.arg.types {
                types.push(self.scoped_name(ty)?);
            }
            let exc = self.next_reg();
            let match_at = self.code.push(Opcode::MatchException {
                dst: exc,
                types,
                miss: 0,
            });
            self.code.push(Opcode::StoreName {
                name: catch.arg.name.clone(),
                src: Operand::reg(exc),
            });
            self.emit_body(&catch.body)?;
            exits.push(self.code.push(Opcode::Jmp { addr: 0 }));
            self.code.patch_jump(match_at, self.code.len());
        }
        // No catch matched.
        self.code.push(Opcode::ReRaise);

        // The finally body runs on every exit path; the VM also enters it
        // for break/continue/return unwinding through the try.
        let finally_addr = match &stmt.finally {
            Some(finally) => {
                let addr = self.code.len();
                self.emit_body(&finally.body)?;
                Some(addr)
            }
            None => None,
        };

        let end = self.code.len();
        let exit_target = finally_addr.unwrap_or(end);
        for at in exits {
            self.code.patch_jump(at, exit_target);
        }
        self.code.patch_handler(handler_at, catch_addr, finally_addr);
        Ok(())
    }

    // ── Functions, classes, spaces ─────────────────────────────────────

    /// Pre-evaluate defaults in the enclosing frame and build descriptors.
    fn emit_arg_descs(&mut self, args: &[Argument]) -> Result<Vec<ArgDesc>, Diagnostic> {
        let mut descs = Vec::with_capacity(args.len());
        for arg in args {
            let default = match &arg.default {
                Some(expr) => Some(self.emit_expr(expr)?.operand()),
                None => None,
            };
            descs.push(ArgDesc {
                name: arg.name.clone(),
                default,
                vararg: arg.vararg,
            });
        }
        Ok(descs)
    }

    fn emit_function(&mut self, fun: &Function) -> Result<RegValue, Diagnostic> {
        let args = self.emit_arg_descs(&fun.args)?;
        let skip = self.code.push(Opcode::Jmp { addr: 0 });
        let entry = self.code.len();

        let save = self.enter_frame();
        let body = (|| {
            self.emit_body(&fun.body)?;
            if !matches!(fun.body.last(), Some(Ir::Return(_))) {
                let nil = self.const_reg(ConstKey::Nil);
                self.code.push(Opcode::Return {
                    src: nil.operand(),
                });
            }
            Ok(())
        })();
        self.leave_frame(save);
        body?;

        let end = self.code.len();
        self.code.patch_jump(skip, end);
        let dst = self.next_reg();
        self.code.push(Opcode::BuildFun {
            dst,
            name: format!("{}({})", fun.name, encode_fun_args(&fun.args, fun.method)),
            args,
            entry,
            end,
        });
        Ok(RegValue::reg(dst))
    }

    fn emit_lambda(&mut self, lambda: &Lambda) -> Result<RegValue, Diagnostic> {
        let args = self.emit_arg_descs(&lambda.args)?;
        let skip = self.code.push(Opcode::Jmp { addr: 0 });
        let entry = self.code.len();

        let save = self.enter_frame();
        let body = (|| {
            let val = self.emit_expr(&lambda.body)?;
            self.code.push(Opcode::Return {
                src: val.operand(),
            });
            Ok(())
        })();
        self.leave_frame(save);
        body?;

        let end = self.code.len();
        self.code.patch_jump(skip, end);
        let dst = self.next_reg();
        self.code.push(Opcode::BuildFun {
            dst,
            name: format!(
                "{}({})",
                lambda.name,
                encode_fun_args(&lambda.args, lambda.method)
            ),
            args,
            entry,
            end,
        });
        Ok(RegValue::reg(dst))
    }

    fn emit_class(&mut self, class: &Class) -> Result<(), Diagnostic> {
        let mut parents = Vec::with_capacity(class.parents.len());
        for parent in &class.parents {
            parents.push(self.emit_expr(parent)?.operand());
        }
        let skip = self.code.push(Opcode::Jmp { addr: 0 });
        let entry = self.code.len();

        // The body executes in a class-construction frame so methods and
        // class variables attach to the new class object.
        let save = self.enter_frame();
        let body = self.emit_body(&class.body);
        self.leave_frame(save);
        body?;

        let end = self.code.len();
        self.code.patch_jump(skip, end);
        let dst = self.next_reg();
        self.code.push(Opcode::BuildClass {
            dst,
            name: class.name.clone(),
            parents,
            entry,
            end,
        });
        Ok(())
    }

    fn emit_space(&mut self, space: &Space) -> Result<(), Diagnostic> {
        let skip = self.code.push(Opcode::Jmp { addr: 0 });
        let entry = self.code.len();

        let save = self.enter_frame();
        let body = self.emit_body(&space.body);
        self.leave_frame(save);
        body?;

        let end = self.code.len();
        self.code.patch_jump(skip, end);
        let dst = self.next_reg();
        self.code.push(Opcode::BuildSpace {
            dst,
            name: space.name.clone(),
            entry,
            end,
        });
        Ok(())
    }

    // ── Imports ────────────────────────────────────────────────────────

    fn emit_import(&mut self, stmt: &Import) -> Result<(), Diagnostic> {
        for (name, alias) in stmt.names.iter().zip(&stmt.aliases) {
            let (path, non_local, all) = import_path(name)
                .ok_or_else(|| self.internal(name.src_info(), "malformed import path"))?;
            if all {
                self.code.push(Opcode::ImportAll { path, non_local });
            } else {
                let dst = self.next_reg();
                self.code.push(Opcode::Import {
                    dst,
                    path,
                    alias: alias.clone(),
                    non_local,
                });
            }
        }
        Ok(())
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn emit_expr(&mut self, expr: &Expr) -> Result<RegValue, Diagnostic> {
        match expr {
            Expr::Int(lit) => Ok(self.const_reg(ConstKey::Int(lit.value))),
            Expr::Float(lit) => Ok(self.const_reg(ConstKey::Float(lit.value.to_bits()))),
            Expr::Bool(lit) => Ok(self.const_reg(ConstKey::Bool(lit.value))),
            Expr::Str(lit) => Ok(self.const_reg(ConstKey::Str(lit.value.clone()))),
            Expr::Nil(_) => Ok(self.const_reg(ConstKey::Nil)),
            Expr::Variable(var) => {
                let dst = self.next_reg();
                let op = if var.non_local {
                    Opcode::LoadNonLocal {
                        dst,
                        name: var.name.clone(),
                    }
                } else {
                    Opcode::Load {
                        dst,
                        name: var.name.clone(),
                    }
                };
                self.code.push(op);
                Ok(RegValue::reg(dst))
            }
            Expr::This(_) => {
                let dst = self.next_reg();
                self.code.push(Opcode::Load {
                    dst,
                    name: "this".to_string(),
                });
                Ok(RegValue::reg(dst))
            }
            Expr::Super(_) => {
                let dst = self.next_reg();
                self.code.push(Opcode::Load {
                    dst,
                    name: "super".to_string(),
                });
                Ok(RegValue::reg(dst))
            }
            Expr::OperatorLit(lit) => {
                let dst = self.next_reg();
                self.code.push(Opcode::Load {
                    dst,
                    name: format!("({})", lit.op.as_str()),
                });
                Ok(RegValue::reg(dst))
            }
            Expr::Note(note) => {
                let value = self.const_reg(ConstKey::Str(note.value.value.clone()));
                let dst = self.next_reg();
                self.code.push(Opcode::BuildNote {
                    dst,
                    prefix: note.prefix.clone(),
                    value: value.operand(),
                });
                Ok(RegValue::reg(dst))
            }
            Expr::Unary(unary) => self.emit_unary(unary),
            Expr::Binary(binary) => self.emit_binary(binary),
            Expr::TernaryIf(ternary) => {
                let dst = self.next_reg();
                let cond = self.emit_expr(&ternary.condition)?;
                let to_false = self.code.push(Opcode::JmpIfFalse {
                    cond: cond.operand(),
                    addr: 0,
                });
                let vt = self.emit_expr(&ternary.value_true)?;
                self.store_into(dst, &vt);
                let to_end = self.code.push(Opcode::Jmp { addr: 0 });
                self.code.patch_jump(to_false, self.code.len());
                let vf = self.emit_expr(&ternary.value_false)?;
                self.store_into(dst, &vf);
                self.code.patch_jump(to_end, self.code.len());
                Ok(RegValue::reg(dst))
            }
            Expr::Range(range) => {
                let start = self.emit_expr(&range.start)?.operand();
                let second = match &range.second {
                    Some(second) => Some(self.emit_expr(second)?.operand()),
                    None => None,
                };
                let end = self.emit_expr(&range.end)?.operand();
                let dst = self.next_reg();
                self.code.push(Opcode::BuildRange {
                    dst,
                    start,
                    second,
                    end,
                });
                Ok(RegValue::reg(dst))
            }
            Expr::Call(call) => {
                let fun = {
                    let val = self.emit_expr(&call.fun)?;
                    self.get_ncreg(val)
                };
                for arg in &call.args {
                    // A `name = value` argument pushes by name.
                    if let Expr::Binary(be) = arg {
                        if be.op == Operator::Set {
                            if let Expr::Variable(v) = be.left.as_ref() {
                                let val = self.emit_expr(&be.right)?;
                                self.code.push(Opcode::PushNamedArg {
                                    name: v.name.clone(),
                                    src: val.operand(),
                                });
                                continue;
                            }
                        }
                    }
                    let val = self.emit_expr(arg)?;
                    self.code.push(Opcode::PushArg {
                        src: val.operand(),
                    });
                }
                let dst = self.next_reg();
                self.code.push(Opcode::Call {
                    dst,
                    fun: fun.index,
                });
                Ok(RegValue::reg(dst))
            }
            Expr::Lambda(lambda) => self.emit_lambda(lambda),
            Expr::List(list) => match &list.form {
                ListForm::Literal(elements) => {
                    let mut elems = Vec::with_capacity(elements.len());
                    for element in elements {
                        elems.push(self.emit_expr(element)?.operand());
                    }
                    let dst = self.next_reg();
                    self.code.push(Opcode::BuildList { dst, elems });
                    Ok(RegValue::reg(dst))
                }
                ListForm::Comprehension(compr) => {
                    let dst = self.next_reg();
                    self.code.push(Opcode::BuildList {
                        dst,
                        elems: Vec::new(),
                    });
                    self.code.push(Opcode::StoreName {
                        name: compr.result_name.clone(),
                        src: Operand::reg(dst),
                    });
                    self.emit_compr_loops(compr, &compr.assignments, dst, list.src)?;
                    Ok(RegValue::reg(dst))
                }
            },
            Expr::Dict(dict) => {
                let mut keys = Vec::with_capacity(dict.keys.len());
                let mut values = Vec::with_capacity(dict.values.len());
                for key in &dict.keys {
                    keys.push(self.emit_expr(key)?.operand());
                }
                for value in &dict.values {
                    values.push(self.emit_expr(value)?.operand());
                }
                let dst = self.next_reg();
                self.code.push(Opcode::BuildDict { dst, keys, values });
                Ok(RegValue::reg(dst))
            }
            Expr::Multivar(mv) => Err(self.internal(
                mv.src,
                "destructuring target outside of an assignment",
            )),
            Expr::AllSymbols(info) => {
                Err(self.internal(*info, "`*` outside of an import"))
            }
        }
    }

    fn emit_unary(&mut self, unary: &UnaryExpr) -> Result<RegValue, Diagnostic> {
        match unary.op {
            Operator::Silent => {
                let mut val = self.emit_expr(&unary.expr)?;
                val.silent = true;
                Ok(val)
            }
            Operator::Neg => {
                let src = self.emit_expr(&unary.expr)?;
                let dst = self.next_reg();
                self.code.push(Opcode::Neg {
                    dst,
                    src: src.operand(),
                });
                Ok(RegValue::reg(dst))
            }
            Operator::Not => {
                let src = self.emit_expr(&unary.expr)?;
                let dst = self.next_reg();
                self.code.push(Opcode::Not {
                    dst,
                    src: src.operand(),
                });
                Ok(RegValue::reg(dst))
            }
            Operator::Scope => {
                let Expr::Variable(var) = unary.expr.as_ref() else {
                    return Err(self.internal(unary.src, "global scope access of a non-name"));
                };
                let dst = self.next_reg();
                self.code.push(Opcode::LoadGlobal {
                    dst,
                    name: var.name.clone(),
                });
                Ok(RegValue::reg(dst))
            }
            other => Err(self.internal(
                unary.src,
                format!("'{}' is not a unary operator", other.as_str()),
            )),
        }
    }

    fn emit_binary(&mut self, binary: &BinaryExpr) -> Result<RegValue, Diagnostic> {
        let op = binary.op;
        if op.is_set() {
            return self.emit_assignment(binary);
        }
        match op {
            Operator::Access => {
                let obj = {
                    let val = self.emit_expr(&binary.left)?;
                    self.get_ncreg(val)
                };
                let name = access_name(&binary.right)
                    .ok_or_else(|| self.internal(binary.src, "malformed access member"))?;
                let dst = self.next_reg();
                self.code.push(Opcode::LoadAttr {
                    dst,
                    obj: obj.index,
                    name,
                });
                Ok(RegValue::reg(dst))
            }
            Operator::Scope => {
                let obj = {
                    let val = self.emit_expr(&binary.left)?;
                    self.get_ncreg(val)
                };
                let Expr::Variable(var) = binary.right.as_ref() else {
                    return Err(self.internal(binary.src, "malformed scope member"));
                };
                let dst = self.next_reg();
                self.code.push(Opcode::LoadScoped {
                    dst,
                    obj: obj.index,
                    name: var.name.clone(),
                });
                Ok(RegValue::reg(dst))
            }
            Operator::Subsc => {
                let l = self.emit_expr(&binary.left)?;
                let r = self.emit_expr(&binary.right)?;
                let (obj, index) = self.binop_operands(l, r);
                let dst = self.next_reg();
                self.code.push(Opcode::Subsc { dst, obj, index });
                Ok(RegValue::reg(dst))
            }
            Operator::ShortAnd | Operator::ShortOr => self.emit_short_circuit(binary),
            Operator::Unpack => {
                // `targets << iterable` destructures like an assignment.
                let val = self.emit_expr(&binary.right)?;
                self.store_target(&binary.left, &val)?;
                Ok(val)
            }
            _ => {
                let l = self.emit_expr(&binary.left)?;
                let r = self.emit_expr(&binary.right)?;
                let (lhs, rhs) = self.binop_operands(l, r);
                let dst = self.next_reg();
                let op = make_binop(op, dst, lhs, rhs)
                    .ok_or_else(|| self.internal(binary.src, "unsupported binary operator"))?;
                self.code.push(op);
                Ok(RegValue::reg(dst))
            }
        }
    }

    /// Short-circuit `&&`/`||`: evaluate the left side, conditionally skip
    /// the right side, and write whichever side produced the result into a
    /// shared destination register.
    fn emit_short_circuit(&mut self, binary: &BinaryExpr) -> Result<RegValue, Diagnostic> {
        let dst = self.next_reg();
        let left = self.emit_expr(&binary.left)?;
        let short = match binary.op {
            Operator::ShortAnd => self.code.push(Opcode::JmpIfFalse {
                cond: left.operand(),
                addr: 0,
            }),
            _ => self.code.push(Opcode::JmpIf {
                cond: left.operand(),
                addr: 0,
            }),
        };
        let right = self.emit_expr(&binary.right)?;
        self.store_into(dst, &right);
        let to_end = self.code.push(Opcode::Jmp { addr: 0 });
        self.code.patch_jump(short, self.code.len());
        self.store_into(dst, &left);
        self.code.patch_jump(to_end, self.code.len());
        Ok(RegValue::reg(dst))
    }

    fn emit_assignment(&mut self, binary: &BinaryExpr) -> Result<RegValue, Diagnostic> {
        if let Some(base) = binary.op.compound_base() {
            let l = self.emit_expr(&binary.left)?;
            let r = self.emit_expr(&binary.right)?;
            let (lhs, rhs) = self.binop_operands(l, r);
            let dst = self.next_reg();
            let op = make_binop(base, dst, lhs, rhs)
                .ok_or_else(|| self.internal(binary.src, "unsupported compound assignment"))?;
            self.code.push(op);
            let val = RegValue::reg(dst);
            self.store_target(&binary.left, &val)?;
            return Ok(val);
        }
        let val = self.emit_expr(&binary.right)?;
        self.store_target(&binary.left, &val)?;
        Ok(val)
    }

    /// Store a value into an assignment target: a name, an attribute, a
    /// subscript, or a multivar destructuring list.
    fn store_target(&mut self, target: &Expr, val: &RegValue) -> Result<(), Diagnostic> {
        match target {
            Expr::Variable(var) => {
                let op = if var.non_local {
                    Opcode::StoreNonLocal {
                        name: var.name.clone(),
                        src: val.operand(),
                    }
                } else {
                    Opcode::StoreName {
                        name: var.name.clone(),
                        src: val.operand(),
                    }
                };
                self.code.push(op);
                Ok(())
            }
            Expr::Unary(u) if u.op == Operator::Scope => {
                let Expr::Variable(var) = u.expr.as_ref() else {
                    return Err(self.internal(u.src, "global scope store to a non-name"));
                };
                self.code.push(Opcode::StoreGlobal {
                    name: var.name.clone(),
                    src: val.operand(),
                });
                Ok(())
            }
            Expr::Binary(be) if be.op == Operator::Access => {
                let obj = {
                    let objval = self.emit_expr(&be.left)?;
                    self.get_ncreg(objval)
                };
                let name = access_name(&be.right)
                    .ok_or_else(|| self.internal(be.src, "malformed access target"))?;
                self.code.push(Opcode::StoreAttr {
                    obj: obj.index,
                    name,
                    src: val.operand(),
                });
                Ok(())
            }
            Expr::Binary(be) if be.op == Operator::Subsc => {
                let obj = {
                    let objval = self.emit_expr(&be.left)?;
                    self.get_ncreg(objval)
                };
                let index = self.emit_expr(&be.right)?;
                self.code.push(Opcode::StoreSubsc {
                    obj: obj.index,
                    index: index.operand(),
                    src: val.operand(),
                });
                Ok(())
            }
            Expr::Multivar(mv) => self.destructure(mv, val),
            other => Err(self.internal(
                other.src_info(),
                "expression is not a valid assignment target",
            )),
        }
    }

    /// Bind a multivar target list by iterating the source value.
    fn destructure(&mut self, mv: &Multivar, val: &RegValue) -> Result<(), Diagnostic> {
        let src = self.get_ncreg(*val);
        let iter = self.next_reg();
        self.code.push(Opcode::IterCreate {
            dst: iter,
            coll: src.operand(),
        });
        for (i, var) in mv.vars.iter().enumerate() {
            let dst = self.next_reg();
            if mv.rest_index == Some(i) {
                self.code.push(Opcode::IterRest { dst, iter });
            } else {
                self.code.push(Opcode::IterUnpack { dst, iter });
            }
            self.store_target(var, &RegValue::reg(dst))?;
        }
        Ok(())
    }

    /// Emit the nested loops of a list comprehension; the innermost body
    /// appends the result expression to the collecting list.
    fn emit_compr_loops(
        &mut self,
        compr: &reed_parser::ir::Comprehension,
        assignments: &[Expr],
        list: Register,
        src: SourceInfo,
    ) -> Result<(), Diagnostic> {
        let Some((bind, rest)) = assignments.split_first() else {
            // Innermost: filter, then push the result (or the else-result).
            match &compr.condition {
                Some(cond) => {
                    let c = self.emit_expr(cond)?;
                    let skip = self.code.push(Opcode::JmpIfFalse {
                        cond: c.operand(),
                        addr: 0,
                    });
                    let result = self.emit_expr(&compr.result)?;
                    self.code.push(Opcode::ListPush {
                        list,
                        value: result.operand(),
                    });
                    match &compr.else_result {
                        Some(els) => {
                            let to_end = self.code.push(Opcode::Jmp { addr: 0 });
                            self.code.patch_jump(skip, self.code.len());
                            let alt = self.emit_expr(els)?;
                            self.code.push(Opcode::ListPush {
                                list,
                                value: alt.operand(),
                            });
                            self.code.patch_jump(to_end, self.code.len());
                        }
                        None => {
                            self.code.patch_jump(skip, self.code.len());
                        }
                    }
                }
                None => {
                    let result = self.emit_expr(&compr.result)?;
                    self.code.push(Opcode::ListPush {
                        list,
                        value: result.operand(),
                    });
                }
            }
            return Ok(());
        };

        let Expr::Binary(be) = bind else {
            return Err(self.internal(src, "comprehension bind is not an assignment"));
        };
        if be.op != Operator::Set {
            return Err(self.internal(src, "comprehension bind is not an assignment"));
        }
        let coll = self.emit_expr(&be.right)?;
        let iter = self.next_reg();
        self.code.push(Opcode::IterCreate {
            dst: iter,
            coll: coll.operand(),
        });
        let top = self.code.len();
        let item = self.next_reg();
        let next_at = self.code.push(Opcode::IterNext {
            dst: item,
            iter,
            done: 0,
        });
        self.store_target(&be.left, &RegValue::reg(item))?;
        self.emit_compr_loops(compr, rest, list, src)?;
        self.code.push(Opcode::Jmp { addr: top });
        self.code.patch_jump(next_at, self.code.len());
        Ok(())
    }

    /// Render a catch-type expression (`Exception`, `ns::Error`) as a
    /// scoped name string.
    fn scoped_name(&self, expr: &Expr) -> Result<String, Diagnostic> {
        match expr {
            Expr::Variable(v) => Ok(v.name.clone()),
            Expr::Binary(be) if be.op == Operator::Scope => Ok(format!(
                "{}::{}",
                self.scoped_name(&be.left)?,
                self.scoped_name(&be.right)?
            )),
            other => Err(self.internal(other.src_info(), "malformed type name")),
        }
    }
}

/// The attribute name an access right-hand side denotes.
fn access_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Variable(v) if !v.non_local => Some(v.name.clone()),
        Expr::OperatorLit(o) => Some(format!("({})", o.op.as_str())),
        Expr::Super(_) => Some("super".to_string()),
        _ => None,
    }
}

/// Decompose an import-path expression into segments. Returns
/// `(path, non_local, imports_all)`.
fn import_path(expr: &Expr) -> Option<(Vec<String>, bool, bool)> {
    match expr {
        Expr::Variable(v) => Some((vec![v.name.clone()], v.non_local, false)),
        Expr::AllSymbols(_) => Some((Vec::new(), false, true)),
        Expr::Binary(be) if be.op == Operator::Scope => {
            let (mut path, non_local, all) = import_path(&be.left)?;
            if all {
                return None;
            }
            let (mut right, right_nl, right_all) = import_path(&be.right)?;
            if right_nl {
                return None;
            }
            path.append(&mut right);
            Some((path, non_local, right_all))
        }
        _ => None,
    }
}

/// The opcode implementing a plain binary operator.
fn make_binop(op: Operator, dst: Register, lhs: Operand, rhs: Operand) -> Option<Opcode> {
    Some(match op {
        Operator::Plus => Opcode::Add { dst, lhs, rhs },
        Operator::Minus => Opcode::Sub { dst, lhs, rhs },
        Operator::Mul => Opcode::Mul { dst, lhs, rhs },
        Operator::Div => Opcode::Div { dst, lhs, rhs },
        Operator::Mod => Opcode::Mod { dst, lhs, rhs },
        Operator::Exp => Opcode::Exp { dst, lhs, rhs },
        Operator::Concat => Opcode::Concat { dst, lhs, rhs },
        Operator::Eq => Opcode::Eq { dst, lhs, rhs },
        Operator::Neq => Opcode::Neq { dst, lhs, rhs },
        Operator::Gt => Opcode::Gt { dst, lhs, rhs },
        Operator::Lt => Opcode::Lt { dst, lhs, rhs },
        Operator::Ge => Opcode::Ge { dst, lhs, rhs },
        Operator::Le => Opcode::Le { dst, lhs, rhs },
        Operator::And => Opcode::And { dst, lhs, rhs },
        Operator::Or => Opcode::Or { dst, lhs, rhs },
        Operator::Xor => Opcode::Xor { dst, lhs, rhs },
        Operator::In => Opcode::In { dst, lhs, rhs },
        _ => return None,
    })
}
