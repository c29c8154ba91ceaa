//! The Reed virtual machine's instruction set, as the emitter sees it.
//!
//! The VM is a register machine with two disjoint pools per frame: the
//! constant pool (`#n`), holding compile-time materialized values, and the
//! general pool (`%n`), holding runtime values. Opcodes carry small-integer
//! register indices; jump targets are absolute instruction addresses. The
//! wire format is the VM's concern -- the emitter produces this in-memory
//! opcode vector.

use std::fmt;

/// A register index in either pool.
pub type Register = u32;

/// An absolute instruction address in the bytecode buffer.
pub type Address = usize;

/// Low register indices reserved for the VM's own use in the general pool.
pub const RESERVED_REGS: Register = 16;
/// Low register indices reserved for the VM's own use in the constant pool.
pub const RESERVED_CREGS: Register = 16;

/// Placeholder target for a `break` jump, rewritten by backpatching.
pub const BREAK_PLACEHOLDER: Address = Address::MAX;
/// Placeholder target for a `continue` jump, rewritten by backpatching.
pub const CONTINUE_PLACEHOLDER: Address = Address::MAX - 1;

/// An instruction operand: a register index plus its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub index: Register,
    pub constant: bool,
}

impl Operand {
    /// A general-pool operand.
    pub fn reg(index: Register) -> Self {
        Self {
            index,
            constant: false,
        }
    }

    /// A constant-pool operand.
    pub fn cnst(index: Register) -> Self {
        Self {
            index,
            constant: true,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.constant { "#" } else { "%" }, self.index)
    }
}

/// Descriptor of one formal argument carried by `BuildFun`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgDesc {
    pub name: String,
    /// Register holding the pre-evaluated default value, if any.
    pub default: Option<Operand>,
    pub vararg: bool,
}

/// One VM instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    // ── Constant materialization ───────────────────────────────────────
    StoreIntConst { dst: Register, value: i64 },
    StoreFloatConst { dst: Register, value: f64 },
    StoreBoolConst { dst: Register, value: bool },
    StoreStrConst { dst: Register, value: String },
    StoreNilConst { dst: Register },

    // ── Moves ──────────────────────────────────────────────────────────
    /// Copy a constant-pool value into a general register.
    StoreConst { dst: Register, src: Register },
    /// Copy between general registers.
    Store { dst: Register, src: Register },

    // ── Names ──────────────────────────────────────────────────────────
    Load { dst: Register, name: String },
    LoadNonLocal { dst: Register, name: String },
    LoadGlobal { dst: Register, name: String },
    StoreName { name: String, src: Operand },
    StoreNonLocal { name: String, src: Operand },
    StoreGlobal { name: String, src: Operand },
    LoadAttr { dst: Register, obj: Register, name: String },
    StoreAttr { obj: Register, name: String, src: Operand },
    /// `a::b` resolution against a space or module object.
    LoadScoped { dst: Register, obj: Register, name: String },

    // ── Values and collections ─────────────────────────────────────────
    BuildList { dst: Register, elems: Vec<Operand> },
    BuildDict { dst: Register, keys: Vec<Operand>, values: Vec<Operand> },
    BuildRange { dst: Register, start: Operand, second: Option<Operand>, end: Operand },
    BuildEnum { dst: Register, name: String, values: Vec<String> },
    BuildNote { dst: Register, prefix: String, value: Operand },
    ListPush { list: Register, value: Operand },
    Subsc { dst: Register, obj: Operand, index: Operand },
    StoreSubsc { obj: Register, index: Operand, src: Operand },

    // ── Operators ──────────────────────────────────────────────────────
    Add { dst: Register, lhs: Operand, rhs: Operand },
    Sub { dst: Register, lhs: Operand, rhs: Operand },
    Mul { dst: Register, lhs: Operand, rhs: Operand },
    Div { dst: Register, lhs: Operand, rhs: Operand },
    Mod { dst: Register, lhs: Operand, rhs: Operand },
    Exp { dst: Register, lhs: Operand, rhs: Operand },
    Concat { dst: Register, lhs: Operand, rhs: Operand },
    Eq { dst: Register, lhs: Operand, rhs: Operand },
    Neq { dst: Register, lhs: Operand, rhs: Operand },
    Gt { dst: Register, lhs: Operand, rhs: Operand },
    Lt { dst: Register, lhs: Operand, rhs: Operand },
    Ge { dst: Register, lhs: Operand, rhs: Operand },
    Le { dst: Register, lhs: Operand, rhs: Operand },
    And { dst: Register, lhs: Operand, rhs: Operand },
    Or { dst: Register, lhs: Operand, rhs: Operand },
    Xor { dst: Register, lhs: Operand, rhs: Operand },
    In { dst: Register, lhs: Operand, rhs: Operand },
    Neg { dst: Register, src: Operand },
    Not { dst: Register, src: Operand },

    // ── Control flow ───────────────────────────────────────────────────
    Jmp { addr: Address },
    JmpIf { cond: Operand, addr: Address },
    JmpIfFalse { cond: Operand, addr: Address },

    // ── Iteration ──────────────────────────────────────────────────────
    IterCreate { dst: Register, coll: Operand },
    /// Read the next element into `dst`; jumps to `done` on exhaustion.
    IterNext { dst: Register, iter: Register, done: Address },
    /// Read the next element into `dst`, raising if the iterator is
    /// exhausted (destructuring binds).
    IterUnpack { dst: Register, iter: Register },
    /// Collect all remaining elements into a list.
    IterRest { dst: Register, iter: Register },

    // ── Calls and callables ────────────────────────────────────────────
    PushArg { src: Operand },
    PushNamedArg { name: String, src: Operand },
    Call { dst: Register, fun: Register },
    Return { src: Operand },
    /// Create (and bind) a function object. `name` carries the encoded
    /// signature, e.g. `foo(a,b,this)`; the body is the instruction range
    /// `[entry, end)` of this same buffer.
    BuildFun { dst: Register, name: String, args: Vec<ArgDesc>, entry: Address, end: Address },
    BuildClass { dst: Register, name: String, parents: Vec<Operand>, entry: Address, end: Address },
    BuildSpace { dst: Register, name: String, entry: Address, end: Address },

    // ── Exceptions ─────────────────────────────────────────────────────
    PushHandler { catch_addr: Address, finally_addr: Option<Address> },
    PopHandler,
    /// Bind the in-flight exception to `dst` if its type matches one of
    /// `types` (empty = match anything); jump to `miss` otherwise.
    MatchException { dst: Register, types: Vec<String>, miss: Address },
    /// Re-raise the in-flight exception after no catch matched.
    ReRaise,
    Raise { src: Operand },
    Assert { cond: Operand, msg: Option<Operand> },

    // ── Modules ────────────────────────────────────────────────────────
    Import { dst: Register, path: Vec<String>, alias: String, non_local: bool },
    ImportAll { path: Vec<String>, non_local: bool },

    // ── Misc ───────────────────────────────────────────────────────────
    Annotate { name: String, args: Vec<Operand>, inner: bool },
    /// Print a top-level expression value (REPL output mode).
    Output { src: Operand },
}

impl Opcode {
    /// The destination register this opcode freshly allocates, if any.
    ///
    /// Writes into an already-allocated register (`Store`, `StoreConst`,
    /// the name stores) do not count; this powers the register
    /// monotonicity checks.
    pub fn allocated_dst(&self) -> Option<(Register, bool)> {
        use Opcode::*;
        match self {
            StoreIntConst { dst, .. }
            | StoreFloatConst { dst, .. }
            | StoreBoolConst { dst, .. }
            | StoreStrConst { dst, .. }
            | StoreNilConst { dst } => Some((*dst, true)),
            Load { dst, .. }
            | LoadNonLocal { dst, .. }
            | LoadGlobal { dst, .. }
            | LoadAttr { dst, .. }
            | LoadScoped { dst, .. }
            | BuildList { dst, .. }
            | BuildDict { dst, .. }
            | BuildRange { dst, .. }
            | BuildEnum { dst, .. }
            | BuildNote { dst, .. }
            | Subsc { dst, .. }
            | Add { dst, .. }
            | Sub { dst, .. }
            | Mul { dst, .. }
            | Div { dst, .. }
            | Mod { dst, .. }
            | Exp { dst, .. }
            | Concat { dst, .. }
            | Eq { dst, .. }
            | Neq { dst, .. }
            | Gt { dst, .. }
            | Lt { dst, .. }
            | Ge { dst, .. }
            | Le { dst, .. }
            | And { dst, .. }
            | Or { dst, .. }
            | Xor { dst, .. }
            | In { dst, .. }
            | Neg { dst, .. }
            | Not { dst, .. }
            | IterCreate { dst, .. }
            | IterNext { dst, .. }
            | IterUnpack { dst, .. }
            | IterRest { dst, .. }
            | Call { dst, .. }
            | BuildFun { dst, .. }
            | BuildClass { dst, .. }
            | BuildSpace { dst, .. }
            | MatchException { dst, .. }
            | Import { dst, .. } => Some((*dst, false)),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Opcode::*;
        match self {
            StoreIntConst { dst, value } => write!(f, "store_int       #{dst}, {value}"),
            StoreFloatConst { dst, value } => write!(f, "store_float     #{dst}, {value}"),
            StoreBoolConst { dst, value } => write!(f, "store_bool      #{dst}, {value}"),
            StoreStrConst { dst, value } => write!(f, "store_str       #{dst}, {value:?}"),
            StoreNilConst { dst } => write!(f, "store_nil       #{dst}"),
            StoreConst { dst, src } => write!(f, "store_const     %{dst}, #{src}"),
            Store { dst, src } => write!(f, "store           %{dst}, %{src}"),
            Load { dst, name } => write!(f, "load            %{dst}, {name}"),
            LoadNonLocal { dst, name } => write!(f, "load_nonloc     %{dst}, ${name}"),
            LoadGlobal { dst, name } => write!(f, "load_global     %{dst}, ::{name}"),
            StoreName { name, src } => write!(f, "store_name      {name}, {src}"),
            StoreNonLocal { name, src } => write!(f, "store_nonloc    ${name}, {src}"),
            StoreGlobal { name, src } => write!(f, "store_global    ::{name}, {src}"),
            LoadAttr { dst, obj, name } => write!(f, "load_attr       %{dst}, %{obj}.{name}"),
            StoreAttr { obj, name, src } => write!(f, "store_attr      %{obj}.{name}, {src}"),
            LoadScoped { dst, obj, name } => write!(f, "load_scoped     %{dst}, %{obj}::{name}"),
            BuildList { dst, elems } => {
                write!(f, "build_list      %{dst}, [")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
            BuildDict { dst, keys, .. } => write!(f, "build_dict      %{dst}, {} pairs", keys.len()),
            BuildRange { dst, start, second, end } => match second {
                Some(second) => write!(f, "build_range     %{dst}, {start}, {second}..{end}"),
                None => write!(f, "build_range     %{dst}, {start}..{end}"),
            },
            BuildEnum { dst, name, values } => {
                write!(f, "build_enum      %{dst}, {name} ({} values)", values.len())
            }
            BuildNote { dst, prefix, value } => {
                write!(f, "build_note      %{dst}, {prefix}{value}")
            }
            ListPush { list, value } => write!(f, "list_push       %{list}, {value}"),
            Subsc { dst, obj, index } => write!(f, "subsc           %{dst}, {obj}[{index}]"),
            StoreSubsc { obj, index, src } => write!(f, "store_subsc     %{obj}[{index}], {src}"),
            Add { dst, lhs, rhs } => write!(f, "add             %{dst}, {lhs}, {rhs}"),
            Sub { dst, lhs, rhs } => write!(f, "sub             %{dst}, {lhs}, {rhs}"),
            Mul { dst, lhs, rhs } => write!(f, "mul             %{dst}, {lhs}, {rhs}"),
            Div { dst, lhs, rhs } => write!(f, "div             %{dst}, {lhs}, {rhs}"),
            Mod { dst, lhs, rhs } => write!(f, "mod             %{dst}, {lhs}, {rhs}"),
            Exp { dst, lhs, rhs } => write!(f, "exp             %{dst}, {lhs}, {rhs}"),
            Concat { dst, lhs, rhs } => write!(f, "concat          %{dst}, {lhs}, {rhs}"),
            Eq { dst, lhs, rhs } => write!(f, "eq              %{dst}, {lhs}, {rhs}"),
            Neq { dst, lhs, rhs } => write!(f, "neq             %{dst}, {lhs}, {rhs}"),
            Gt { dst, lhs, rhs } => write!(f, "gt              %{dst}, {lhs}, {rhs}"),
            Lt { dst, lhs, rhs } => write!(f, "lt              %{dst}, {lhs}, {rhs}"),
            Ge { dst, lhs, rhs } => write!(f, "ge              %{dst}, {lhs}, {rhs}"),
            Le { dst, lhs, rhs } => write!(f, "le              %{dst}, {lhs}, {rhs}"),
            And { dst, lhs, rhs } => write!(f, "and             %{dst}, {lhs}, {rhs}"),
            Or { dst, lhs, rhs } => write!(f, "or              %{dst}, {lhs}, {rhs}"),
            Xor { dst, lhs, rhs } => write!(f, "xor             %{dst}, {lhs}, {rhs}"),
            In { dst, lhs, rhs } => write!(f, "in              %{dst}, {lhs}, {rhs}"),
            Neg { dst, src } => write!(f, "neg             %{dst}, {src}"),
            Not { dst, src } => write!(f, "not             %{dst}, {src}"),
            Jmp { addr } => write!(f, "jmp             {}", fmt_addr(*addr)),
            JmpIf { cond, addr } => write!(f, "jmp_if          {cond}, {}", fmt_addr(*addr)),
            JmpIfFalse { cond, addr } => {
                write!(f, "jmp_if_false    {cond}, {}", fmt_addr(*addr))
            }
            IterCreate { dst, coll } => write!(f, "iter_create     %{dst}, {coll}"),
            IterNext { dst, iter, done } => {
                write!(f, "iter_next       %{dst}, %{iter}, done={}", fmt_addr(*done))
            }
            IterUnpack { dst, iter } => write!(f, "iter_unpack     %{dst}, %{iter}"),
            IterRest { dst, iter } => write!(f, "iter_rest       %{dst}, %{iter}"),
            PushArg { src } => write!(f, "push_arg        {src}"),
            PushNamedArg { name, src } => write!(f, "push_named      {name}={src}"),
            Call { dst, fun } => write!(f, "call            %{dst}, %{fun}"),
            Return { src } => write!(f, "return          {src}"),
            BuildFun { dst, name, entry, end, .. } => {
                write!(f, "build_fun       %{dst}, {name} [{entry}..{end}]")
            }
            BuildClass { dst, name, entry, end, .. } => {
                write!(f, "build_class     %{dst}, {name} [{entry}..{end}]")
            }
            BuildSpace { dst, name, entry, end } => {
                write!(f, "build_space     %{dst}, {name} [{entry}..{end}]")
            }
            PushHandler { catch_addr, finally_addr } => match finally_addr {
                Some(fin) => write!(f, "push_handler    catch={catch_addr}, finally={fin}"),
                None => write!(f, "push_handler    catch={catch_addr}"),
            },
            PopHandler => write!(f, "pop_handler"),
            MatchException { dst, types, miss } => {
                write!(f, "match_exc       %{dst}, {types:?}, miss={}", fmt_addr(*miss))
            }
            ReRaise => write!(f, "reraise"),
            Raise { src } => write!(f, "raise           {src}"),
            Assert { cond, msg } => match msg {
                Some(msg) => write!(f, "assert          {cond}, {msg}"),
                None => write!(f, "assert          {cond}"),
            },
            Import { dst, path, alias, non_local } => write!(
                f,
                "import          %{dst}, {}{} as {alias}",
                if *non_local { "$" } else { "" },
                path.join("::")
            ),
            ImportAll { path, non_local } => write!(
                f,
                "import_all      {}{}::*",
                if *non_local { "$" } else { "" },
                path.join("::")
            ),
            Annotate { name, args, inner } => write!(
                f,
                "annotate        {}{name} ({} args)",
                if *inner { "@!" } else { "@" },
                args.len()
            ),
            Output { src } => write!(f, "output          {src}"),
        }
    }
}

fn fmt_addr(addr: Address) -> String {
    match addr {
        BREAK_PLACEHOLDER => "<break>".to_string(),
        CONTINUE_PLACEHOLDER => "<continue>".to_string(),
        other => other.to_string(),
    }
}

/// A growable bytecode buffer.
#[derive(Debug, Default)]
pub struct Bytecode {
    ops: Vec<Opcode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Opcode) -> Address {
        self.ops.push(op);
        self.ops.len() - 1
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[Opcode] {
        &self.ops
    }

    /// Rewrite the target of the jump at `at`.
    ///
    /// # Panics
    ///
    /// Panics if the opcode at `at` is not a jump or handler push.
    pub fn patch_jump(&mut self, at: Address, target: Address) {
        match &mut self.ops[at] {
            Opcode::Jmp { addr }
            | Opcode::JmpIf { addr, .. }
            | Opcode::JmpIfFalse { addr, .. }
            | Opcode::IterNext { done: addr, .. }
            | Opcode::MatchException { miss: addr, .. } => *addr = target,
            other => panic!("patch_jump at {at}: not a jump: {other:?}"),
        }
    }

    /// Rewrite the catch and finally targets of the `PushHandler` at `at`.
    ///
    /// # Panics
    ///
    /// Panics if the opcode at `at` is not a `PushHandler`.
    pub fn patch_handler(
        &mut self,
        at: Address,
        catch: Address,
        finally: Option<Address>,
    ) {
        match &mut self.ops[at] {
            Opcode::PushHandler {
                catch_addr,
                finally_addr,
            } => {
                *catch_addr = catch;
                *finally_addr = finally;
            }
            other => panic!("patch_handler at {at}: not a handler push: {other:?}"),
        }
    }

    /// Resolve break/continue placeholder jumps in `[start, end)` to the
    /// actual addresses. Bounding the walk to the loop's own range keeps
    /// outer-loop placeholders untouched, which is what makes nesting work.
    pub fn update_jumps(&mut self, start: Address, end: Address, brk: Address, cont: Address) {
        for op in &mut self.ops[start..end] {
            if let Opcode::Jmp { addr } = op {
                if *addr == BREAK_PLACEHOLDER {
                    *addr = brk;
                } else if *addr == CONTINUE_PLACEHOLDER {
                    *addr = cont;
                }
            }
        }
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            writeln!(f, "{i:04}  {op}")?;
        }
        Ok(())
    }
}
