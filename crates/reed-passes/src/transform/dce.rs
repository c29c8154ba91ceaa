//! Dead-code and dead-branch elimination.
//!
//! Dead code: in a function body everything after the first `return` is
//! deleted; in loop, branch, case, and handler bodies everything after the
//! first `break` or `continue` is deleted.
//!
//! Dead branches: `while (false) { .. }` disappears, `if (true) { A }`
//! collapses to A's body (dropping any else), and `if (false) { A }`
//! collapses to the else's body or to nothing.

use reed_parser::ir::{Case, Catch, DoWhile, Else, Expr, Finally, ForLoop, Function, If, Ir, Try, While};

use crate::visitor::{IrRewrite, Pass, PassCtx, PassResult};

pub struct DeadCodeElimination;

impl DeadCodeElimination {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeadCodeElimination {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate a body after the first node matching `stops`.
fn truncate_after(body: &mut Vec<Ir>, stops: impl Fn(&Ir) -> bool) {
    if let Some(pos) = body.iter().position(stops) {
        body.truncate(pos + 1);
    }
}

fn is_return(node: &Ir) -> bool {
    matches!(node, Ir::Return(_))
}

fn is_break_or_continue(node: &Ir) -> bool {
    matches!(node, Ir::Break(_) | Ir::Continue(_))
}

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn visit_function(&mut self, node: &mut Function, _ctx: &mut PassCtx) -> PassResult<()> {
        // TODO: detect the always-returns-in-both-branches shape
        // (`if (c) return a else return b`) and drop the tail after it.
        truncate_after(&mut node.body, is_return);
        Ok(())
    }

    fn visit_for(&mut self, node: &mut ForLoop, _ctx: &mut PassCtx) -> PassResult<()> {
        truncate_after(&mut node.body, is_break_or_continue);
        Ok(())
    }

    fn visit_while(&mut self, node: &mut While, _ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        truncate_after(&mut node.body, is_break_or_continue);
        Ok(IrRewrite::Keep)
    }

    fn visit_dowhile(&mut self, node: &mut DoWhile, _ctx: &mut PassCtx) -> PassResult<()> {
        truncate_after(&mut node.body, is_break_or_continue);
        Ok(())
    }

    fn visit_if(&mut self, node: &mut If, _ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        truncate_after(&mut node.body, is_break_or_continue);
        Ok(IrRewrite::Keep)
    }

    fn visit_else(&mut self, node: &mut Else, _ctx: &mut PassCtx) -> PassResult<()> {
        truncate_after(&mut node.body, is_break_or_continue);
        Ok(())
    }

    fn visit_case(&mut self, node: &mut Case, _ctx: &mut PassCtx) -> PassResult<()> {
        truncate_after(&mut node.body, is_break_or_continue);
        Ok(())
    }

    fn visit_catch(&mut self, node: &mut Catch, _ctx: &mut PassCtx) -> PassResult<()> {
        truncate_after(&mut node.body, is_break_or_continue);
        Ok(())
    }

    fn visit_finally(&mut self, node: &mut Finally, _ctx: &mut PassCtx) -> PassResult<()> {
        truncate_after(&mut node.body, is_break_or_continue);
        Ok(())
    }

    fn visit_try(&mut self, node: &mut Try, _ctx: &mut PassCtx) -> PassResult<()> {
        truncate_after(&mut node.body, is_break_or_continue);
        Ok(())
    }
}

pub struct DeadBranchElimination;

impl DeadBranchElimination {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeadBranchElimination {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for DeadBranchElimination {
    fn name(&self) -> &'static str {
        "dead-branch-elimination"
    }

    fn visit_while(&mut self, node: &mut While, _ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        if let Expr::Bool(cond) = &node.cond {
            if !cond.value {
                return Ok(IrRewrite::Remove);
            }
        }
        Ok(IrRewrite::Keep)
    }

    fn visit_if(&mut self, node: &mut If, _ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        let Expr::Bool(cond) = &node.cond else {
            return Ok(IrRewrite::Keep);
        };
        if cond.value {
            // The branch always runs: the if collapses to its body.
            return Ok(IrRewrite::ReplaceMany(std::mem::take(&mut node.body)));
        }
        match node.else_branch.take() {
            Some(els) => Ok(IrRewrite::ReplaceMany(els.body)),
            None => Ok(IrRewrite::Remove),
        }
    }
}
