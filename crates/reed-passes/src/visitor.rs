//! Rewriting IR visitor.
//!
//! [`PassManager`] drives registered [`Pass`]es over the tree in pre-order.
//! At every node it performs three steps:
//!
//! 1. dispatch each pass's entry for the node's kind; a pass answers with
//!    keep, replace, or remove,
//! 2. apply a replacement in place and restart dispatch on the new node so
//!    later passes see it,
//! 3. recurse into the children: body lists iterate with
//!    replace-or-erase-in-place semantics, single-reference children are
//!    rewritten through their slot.
//!
//! When a descendant was rewritten, the node is offered to the passes once
//! more, so a parent whose operands were just folded can itself fold away;
//! on an untouched subtree every pass sees every node exactly once.
//!
//! Structural nodes (module, space, class, function, argument, catch,
//! finally, try, for, do-while, import, assert, raise, multivar) cannot be
//! replaced -- their visitor entries take `&mut` and return no rewrite, so
//! the restriction is part of the signature. Everything a pass needs about
//! its ancestors comes from [`PassCtx`]; the tree itself holds no parent
//! links.

use reed_common::diag::{DiagId, Diagnostic};
use reed_common::span::{SourceInfo, SourceName};
use reed_parser::ir::{
    Annotation, Argument, Assert, BinaryExpr, CallExpr, Case, Catch, Class, Dict, DoWhile, Expr,
    Finally, ForLoop, Function, If, Import, Ir, Lambda, List, ListForm, Module, Multivar, Raise,
    RangeExpr, Return, Space, Switch, TernaryIf, Try, UnaryExpr, While,
};
use reed_parser::ir::Else;
use tracing::trace;

/// Result type for pass entries.
pub type PassResult<T> = Result<T, Diagnostic>;

/// Decision for a rewritable statement-position node.
pub enum IrRewrite {
    /// Leave the node as is.
    Keep,
    /// Destroy the node and install this one in its slot.
    Replace(Ir),
    /// Splice these nodes into the surrounding body in place of the node.
    /// Only valid where the parent slot is a body list.
    ReplaceMany(Vec<Ir>),
    /// Delete the node. Only valid where the parent slot is removable.
    Remove,
}

/// Decision for a rewritable expression node.
pub enum ExprRewrite {
    Keep,
    Replace(Expr),
}

/// An enclosing construct, innermost last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Space,
    Class(String),
    Function { constructor: bool },
    Lambda,
}

/// Transient driver state handed to every pass entry.
///
/// Carries the stack of enclosing constructs (pushed as the driver descends
/// into bodies) and the source name for diagnostics.
pub struct PassCtx {
    source: SourceName,
    scopes: Vec<ScopeKind>,
}

impl PassCtx {
    fn new(source: SourceName) -> Self {
        Self {
            source,
            scopes: Vec::new(),
        }
    }

    /// The construct whose body is currently being visited.
    pub fn parent(&self) -> Option<&ScopeKind> {
        self.scopes.last()
    }

    /// Whether the current node is directly inside a class body.
    pub fn directly_in_class(&self) -> bool {
        matches!(self.parent(), Some(ScopeKind::Class(_)))
    }

    /// Whether the current node is textually inside a function or lambda.
    pub fn in_function(&self) -> bool {
        self.scopes
            .iter()
            .any(|s| matches!(s, ScopeKind::Function { .. } | ScopeKind::Lambda))
    }

    /// Whether the nearest enclosing function is a constructor.
    pub fn in_constructor(&self) -> bool {
        for scope in self.scopes.iter().rev() {
            match scope {
                ScopeKind::Function { constructor } => return *constructor,
                ScopeKind::Lambda => return false,
                _ => {}
            }
        }
        false
    }

    /// Build a diagnostic for the module under compilation.
    pub fn diag(&self, id: DiagId, info: SourceInfo, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(self.source.clone(), info, id, message)
    }
}

/// A compiler pass over the IR.
///
/// Every entry has a keep-everything default, so a pass implements only the
/// node kinds it cares about. Entries for structural nodes mutate in place;
/// entries for rewritable nodes return the replacement decision.
#[allow(unused_variables)]
pub trait Pass {
    /// Name for logs and error reports.
    fn name(&self) -> &'static str;

    // ── Structural nodes (children-only rewriting) ─────────────────────

    fn visit_module(&mut self, node: &mut Module, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_space(&mut self, node: &mut Space, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_class(&mut self, node: &mut Class, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_function(&mut self, node: &mut Function, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_argument(&mut self, node: &mut Argument, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_case(&mut self, node: &mut Case, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_catch(&mut self, node: &mut Catch, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_finally(&mut self, node: &mut Finally, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_try(&mut self, node: &mut Try, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_else(&mut self, node: &mut Else, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_for(&mut self, node: &mut ForLoop, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_dowhile(&mut self, node: &mut DoWhile, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_import(&mut self, node: &mut Import, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_assert(&mut self, node: &mut Assert, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_raise(&mut self, node: &mut Raise, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }
    fn visit_multivar(&mut self, node: &mut Multivar, ctx: &mut PassCtx) -> PassResult<()> {
        Ok(())
    }

    // ── Rewritable statement-position nodes ────────────────────────────

    fn visit_if(&mut self, node: &mut If, ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        Ok(IrRewrite::Keep)
    }
    fn visit_switch(&mut self, node: &mut Switch, ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        Ok(IrRewrite::Keep)
    }
    fn visit_while(&mut self, node: &mut While, ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        Ok(IrRewrite::Keep)
    }
    fn visit_return(&mut self, node: &mut Return, ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        Ok(IrRewrite::Keep)
    }
    fn visit_break(&mut self, src: SourceInfo, ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        Ok(IrRewrite::Keep)
    }
    fn visit_continue(&mut self, src: SourceInfo, ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        Ok(IrRewrite::Keep)
    }
    fn visit_annotation(
        &mut self,
        node: &mut Annotation,
        ctx: &mut PassCtx,
    ) -> PassResult<IrRewrite> {
        Ok(IrRewrite::Keep)
    }

    // ── Rewritable expressions ─────────────────────────────────────────

    fn visit_binary(&mut self, node: &mut BinaryExpr, ctx: &mut PassCtx) -> PassResult<ExprRewrite> {
        Ok(ExprRewrite::Keep)
    }
    fn visit_unary(&mut self, node: &mut UnaryExpr, ctx: &mut PassCtx) -> PassResult<ExprRewrite> {
        Ok(ExprRewrite::Keep)
    }
    fn visit_ternary(&mut self, node: &mut TernaryIf, ctx: &mut PassCtx) -> PassResult<ExprRewrite> {
        Ok(ExprRewrite::Keep)
    }
    fn visit_lambda(&mut self, node: &mut Lambda, ctx: &mut PassCtx) -> PassResult<ExprRewrite> {
        Ok(ExprRewrite::Keep)
    }
    fn visit_range(&mut self, node: &mut RangeExpr, ctx: &mut PassCtx) -> PassResult<ExprRewrite> {
        Ok(ExprRewrite::Keep)
    }
    fn visit_call(&mut self, node: &mut CallExpr, ctx: &mut PassCtx) -> PassResult<ExprRewrite> {
        Ok(ExprRewrite::Keep)
    }
    fn visit_list(&mut self, node: &mut List, ctx: &mut PassCtx) -> PassResult<ExprRewrite> {
        Ok(ExprRewrite::Keep)
    }
    fn visit_dict(&mut self, node: &mut Dict, ctx: &mut PassCtx) -> PassResult<ExprRewrite> {
        Ok(ExprRewrite::Keep)
    }
}

/// What became of a body slot after visiting. `Keep` carries whether the
/// subtree was rewritten anywhere below.
enum Disposition {
    Keep { changed: bool },
    Remove,
    ReplaceMany(Vec<Ir>),
}

/// The pass driver.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    ctx: PassCtx,
}

impl PassManager {
    pub fn new(source: SourceName) -> Self {
        Self {
            passes: Vec::new(),
            ctx: PassCtx::new(source),
        }
    }

    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Visit the whole module.
    pub fn run(&mut self, module: &mut Module) -> PassResult<()> {
        for pass in self.passes.iter_mut() {
            pass.visit_module(module, &mut self.ctx)?;
        }
        self.ctx.scopes.push(ScopeKind::Module);
        let result = self.visit_body(&mut module.body);
        self.ctx.scopes.pop();
        result.map(|_| ())
    }

    // ── Body and slot drivers ──────────────────────────────────────────

    /// Visit a body list with replace-or-erase-in-place semantics.
    /// Returns whether anything in the list was rewritten.
    fn visit_body(&mut self, body: &mut Vec<Ir>) -> PassResult<bool> {
        let mut changed = false;
        let mut i = 0;
        while i < body.len() {
            match self.visit_ir(&mut body[i])? {
                Disposition::Keep { changed: c } => {
                    changed |= c;
                    i += 1;
                }
                Disposition::Remove => {
                    body.remove(i);
                    changed = true;
                }
                Disposition::ReplaceMany(items) => {
                    // Spliced nodes are visited from scratch in place.
                    body.splice(i..=i, items);
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    fn visit_ir(&mut self, node: &mut Ir) -> PassResult<Disposition> {
        // Pre-order dispatch; a replacement restarts dispatch so later
        // passes see the new node.
        let mut changed = false;
        loop {
            match self.dispatch_ir(node)? {
                IrRewrite::Keep => break,
                IrRewrite::Replace(new) => {
                    *node = new;
                    changed = true;
                }
                IrRewrite::ReplaceMany(items) => return Ok(Disposition::ReplaceMany(items)),
                IrRewrite::Remove => return Ok(Disposition::Remove),
            }
        }

        let children_changed = self.visit_ir_children(node)?;
        changed |= children_changed;

        // When a descendant was rewritten, offer the node again in its
        // final shape -- a condition folded to a literal may now take the
        // whole construct with it.
        if children_changed {
            match self.dispatch_ir(node)? {
                IrRewrite::Keep => {}
                IrRewrite::Replace(new) => {
                    *node = new;
                    return match self.visit_ir(node)? {
                        Disposition::Keep { .. } => Ok(Disposition::Keep { changed: true }),
                        other => Ok(other),
                    };
                }
                IrRewrite::ReplaceMany(items) => return Ok(Disposition::ReplaceMany(items)),
                IrRewrite::Remove => return Ok(Disposition::Remove),
            }
        }
        Ok(Disposition::Keep { changed })
    }

    /// Rewrite a single-reference expression child in place. Returns
    /// whether the subtree was rewritten anywhere.
    fn visit_expr_slot(&mut self, slot: &mut Expr) -> PassResult<bool> {
        let mut changed = false;
        loop {
            match self.dispatch_expr(slot)? {
                ExprRewrite::Keep => break,
                ExprRewrite::Replace(new) => {
                    *slot = new;
                    changed = true;
                }
            }
        }

        let children_changed = self.visit_expr_children(slot)?;
        changed |= children_changed;

        if children_changed {
            if let ExprRewrite::Replace(new) = self.dispatch_expr(slot)? {
                *slot = new;
                self.visit_expr_slot(slot)?;
                changed = true;
            }
        }
        Ok(changed)
    }

    fn visit_expr_list(&mut self, exprs: &mut [Expr]) -> PassResult<bool> {
        let mut changed = false;
        for expr in exprs.iter_mut() {
            changed |= self.visit_expr_slot(expr)?;
        }
        Ok(changed)
    }

    // ── Dispatch ───────────────────────────────────────────────────────

    fn dispatch_ir(&mut self, node: &mut Ir) -> PassResult<IrRewrite> {
        for pass in self.passes.iter_mut() {
            let rewrite = dispatch_ir_one(pass.as_mut(), node, &mut self.ctx)?;
            if !matches!(rewrite, IrRewrite::Keep) {
                trace!(pass = pass.name(), kind = ?node.kind(), "node rewritten");
                return Ok(rewrite);
            }
        }
        Ok(IrRewrite::Keep)
    }

    fn dispatch_expr(&mut self, expr: &mut Expr) -> PassResult<ExprRewrite> {
        for pass in self.passes.iter_mut() {
            let rewrite = dispatch_expr_one(pass.as_mut(), expr, &mut self.ctx)?;
            if let ExprRewrite::Replace(new) = rewrite {
                trace!(pass = pass.name(), kind = ?expr.kind(), "expression rewritten");
                return Ok(ExprRewrite::Replace(new));
            }
        }
        Ok(ExprRewrite::Keep)
    }

    // ── Children ───────────────────────────────────────────────────────

    fn visit_ir_children(&mut self, node: &mut Ir) -> PassResult<bool> {
        match node {
            Ir::Module(n) => {
                self.ctx.scopes.push(ScopeKind::Module);
                let result = self.visit_body(&mut n.body);
                self.ctx.scopes.pop();
                result
            }
            Ir::Space(n) => {
                self.ctx.scopes.push(ScopeKind::Space);
                let result = self.visit_body(&mut n.body);
                self.ctx.scopes.pop();
                result
            }
            Ir::Class(n) => {
                let mut changed = self.visit_expr_list(&mut n.parents)?;
                self.ctx.scopes.push(ScopeKind::Class(n.name.clone()));
                let result = self.visit_body(&mut n.body);
                self.ctx.scopes.pop();
                changed |= result?;
                Ok(changed)
            }
            Ir::Function(n) => {
                self.ctx.scopes.push(ScopeKind::Function {
                    constructor: n.constructor,
                });
                let result = (|| {
                    let mut changed = false;
                    for arg in n.args.iter_mut() {
                        changed |= self.visit_argument_node(arg)?;
                    }
                    changed |= self.visit_body(&mut n.body)?;
                    Ok(changed)
                })();
                self.ctx.scopes.pop();
                result
            }
            Ir::If(n) => {
                let mut changed = self.visit_expr_slot(&mut n.cond)?;
                changed |= self.visit_body(&mut n.body)?;
                if let Some(els) = n.else_branch.as_deref_mut() {
                    for pass in self.passes.iter_mut() {
                        pass.visit_else(els, &mut self.ctx)?;
                    }
                    changed |= self.visit_body(&mut els.body)?;
                }
                Ok(changed)
            }
            Ir::Switch(n) => {
                let mut changed = self.visit_expr_slot(&mut n.cond)?;
                for case in n.cases.iter_mut() {
                    for pass in self.passes.iter_mut() {
                        pass.visit_case(case, &mut self.ctx)?;
                    }
                    changed |= self.visit_expr_list(&mut case.values)?;
                    changed |= self.visit_body(&mut case.body)?;
                }
                Ok(changed)
            }
            Ir::Try(n) => {
                let mut changed = self.visit_body(&mut n.body)?;
                for catch in n.catches.iter_mut() {
                    for pass in self.passes.iter_mut() {
                        pass.visit_catch(catch, &mut self.ctx)?;
                    }
                    changed |= self.visit_argument_node(&mut catch.arg)?;
                    changed |= self.visit_body(&mut catch.body)?;
                }
                if let Some(finally) = n.finally.as_mut() {
                    for pass in self.passes.iter_mut() {
                        pass.visit_finally(finally, &mut self.ctx)?;
                    }
                    changed |= self.visit_body(&mut finally.body)?;
                }
                Ok(changed)
            }
            Ir::While(n) => {
                let mut changed = self.visit_expr_slot(&mut n.cond)?;
                changed |= self.visit_body(&mut n.body)?;
                Ok(changed)
            }
            Ir::DoWhile(n) => {
                let mut changed = self.visit_body(&mut n.body)?;
                changed |= self.visit_expr_slot(&mut n.cond)?;
                Ok(changed)
            }
            Ir::ForLoop(n) => {
                let mut changed = self.visit_expr_slot(&mut n.iterator)?;
                changed |= self.visit_expr_slot(&mut n.collection)?;
                changed |= self.visit_body(&mut n.body)?;
                Ok(changed)
            }
            Ir::Import(n) => self.visit_expr_list(&mut n.names),
            Ir::Assert(n) => {
                let mut changed = self.visit_expr_slot(&mut n.cond)?;
                if let Some(msg) = n.msg.as_mut() {
                    changed |= self.visit_expr_slot(msg)?;
                }
                Ok(changed)
            }
            Ir::Raise(n) => self.visit_expr_slot(&mut n.exception),
            Ir::Return(n) => self.visit_expr_slot(&mut n.expr),
            Ir::Annotation(n) => self.visit_expr_list(&mut n.args),
            Ir::Enum(_) | Ir::Break(_) | Ir::Continue(_) | Ir::EndOfFile(_) => Ok(false),
            Ir::Expr(e) => self.visit_expr_children(e),
        }
    }

    fn visit_expr_children(&mut self, expr: &mut Expr) -> PassResult<bool> {
        match expr {
            Expr::Binary(e) => {
                let mut changed = self.visit_expr_slot(&mut e.left)?;
                changed |= self.visit_expr_slot(&mut e.right)?;
                Ok(changed)
            }
            Expr::Unary(e) => self.visit_expr_slot(&mut e.expr),
            Expr::Multivar(e) => self.visit_expr_list(&mut e.vars),
            Expr::Lambda(l) => {
                self.ctx.scopes.push(ScopeKind::Lambda);
                let result = (|| {
                    let mut changed = false;
                    for arg in l.args.iter_mut() {
                        changed |= self.visit_argument_node(arg)?;
                    }
                    changed |= self.visit_expr_slot(&mut l.body)?;
                    Ok(changed)
                })();
                self.ctx.scopes.pop();
                result
            }
            Expr::TernaryIf(t) => {
                let mut changed = self.visit_expr_slot(&mut t.condition)?;
                changed |= self.visit_expr_slot(&mut t.value_true)?;
                changed |= self.visit_expr_slot(&mut t.value_false)?;
                Ok(changed)
            }
            Expr::Range(r) => {
                let mut changed = self.visit_expr_slot(&mut r.start)?;
                if let Some(second) = r.second.as_mut() {
                    changed |= self.visit_expr_slot(second)?;
                }
                changed |= self.visit_expr_slot(&mut r.end)?;
                Ok(changed)
            }
            Expr::Call(c) => {
                let mut changed = self.visit_expr_slot(&mut c.fun)?;
                changed |= self.visit_expr_list(&mut c.args)?;
                Ok(changed)
            }
            Expr::List(list) => match &mut list.form {
                ListForm::Literal(elements) => self.visit_expr_list(elements),
                ListForm::Comprehension(c) => {
                    let mut changed = self.visit_expr_slot(&mut c.result)?;
                    if let Some(cond) = c.condition.as_mut() {
                        changed |= self.visit_expr_slot(cond)?;
                    }
                    if let Some(els) = c.else_result.as_mut() {
                        changed |= self.visit_expr_slot(els)?;
                    }
                    changed |= self.visit_expr_list(&mut c.assignments)?;
                    Ok(changed)
                }
            },
            Expr::Dict(d) => {
                let mut changed = self.visit_expr_list(&mut d.keys)?;
                changed |= self.visit_expr_list(&mut d.values)?;
                Ok(changed)
            }
            Expr::Variable(_)
            | Expr::AllSymbols(_)
            | Expr::Note(_)
            | Expr::This(_)
            | Expr::Super(_)
            | Expr::OperatorLit(_)
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::Bool(_)
            | Expr::Str(_)
            | Expr::Nil(_) => Ok(false),
        }
    }

    /// Dispatch an argument node and rewrite its expression children
    /// (type list and default value).
    fn visit_argument_node(&mut self, arg: &mut Argument) -> PassResult<bool> {
        for pass in self.passes.iter_mut() {
            pass.visit_argument(arg, &mut self.ctx)?;
        }
        let mut changed = self.visit_expr_list(&mut arg.types)?;
        if let Some(default) = arg.default.as_mut() {
            changed |= self.visit_expr_slot(default)?;
        }
        Ok(changed)
    }
}

/// Dispatch one pass entry for an IR node.
fn dispatch_ir_one(
    pass: &mut dyn Pass,
    node: &mut Ir,
    ctx: &mut PassCtx,
) -> PassResult<IrRewrite> {
    match node {
        Ir::Module(n) => {
            pass.visit_module(n, ctx)?;
            Ok(IrRewrite::Keep)
        }
        Ir::Space(n) => {
            pass.visit_space(n, ctx)?;
            Ok(IrRewrite::Keep)
        }
        Ir::Class(n) => {
            pass.visit_class(n, ctx)?;
            Ok(IrRewrite::Keep)
        }
        Ir::Function(n) => {
            pass.visit_function(n, ctx)?;
            Ok(IrRewrite::Keep)
        }
        Ir::Try(n) => {
            pass.visit_try(n, ctx)?;
            Ok(IrRewrite::Keep)
        }
        Ir::ForLoop(n) => {
            pass.visit_for(n, ctx)?;
            Ok(IrRewrite::Keep)
        }
        Ir::DoWhile(n) => {
            pass.visit_dowhile(n, ctx)?;
            Ok(IrRewrite::Keep)
        }
        Ir::Import(n) => {
            pass.visit_import(n, ctx)?;
            Ok(IrRewrite::Keep)
        }
        Ir::Assert(n) => {
            pass.visit_assert(n, ctx)?;
            Ok(IrRewrite::Keep)
        }
        Ir::Raise(n) => {
            pass.visit_raise(n, ctx)?;
            Ok(IrRewrite::Keep)
        }
        Ir::If(n) => pass.visit_if(n, ctx),
        Ir::Switch(n) => pass.visit_switch(n, ctx),
        Ir::While(n) => pass.visit_while(n, ctx),
        Ir::Return(n) => pass.visit_return(n, ctx),
        Ir::Break(src) => pass.visit_break(*src, ctx),
        Ir::Continue(src) => pass.visit_continue(*src, ctx),
        Ir::Annotation(n) => pass.visit_annotation(n, ctx),
        Ir::Enum(_) | Ir::EndOfFile(_) => Ok(IrRewrite::Keep),
        Ir::Expr(e) => match dispatch_expr_one(pass, e, ctx)? {
            ExprRewrite::Keep => Ok(IrRewrite::Keep),
            ExprRewrite::Replace(new) => Ok(IrRewrite::Replace(Ir::Expr(new))),
        },
    }
}

/// Dispatch one pass entry for an expression node.
fn dispatch_expr_one(
    pass: &mut dyn Pass,
    expr: &mut Expr,
    ctx: &mut PassCtx,
) -> PassResult<ExprRewrite> {
    match expr {
        Expr::Binary(e) => pass.visit_binary(e, ctx),
        Expr::Unary(e) => pass.visit_unary(e, ctx),
        Expr::TernaryIf(e) => pass.visit_ternary(e, ctx),
        Expr::Lambda(l) => pass.visit_lambda(l, ctx),
        Expr::Range(r) => pass.visit_range(r, ctx),
        Expr::Call(c) => pass.visit_call(c, ctx),
        Expr::List(l) => pass.visit_list(l, ctx),
        Expr::Dict(d) => pass.visit_dict(d, ctx),
        Expr::Multivar(mv) => {
            pass.visit_multivar(mv, ctx)?;
            Ok(ExprRewrite::Keep)
        }
        // Leaves are not dispatched.
        _ => Ok(ExprRewrite::Keep),
    }
}
