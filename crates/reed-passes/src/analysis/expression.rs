//! Expression shape analysis.
//!
//! Validates the syntactic constraints the grammar is too loose to
//! enforce: the right operand of a `.` access must be a plain variable,
//! an operator literal, or `super` (an `*` is legal only via imports, which
//! the parser already guards), and named call arguments must be named by a
//! variable or `this`, without repeats.

use reed_common::diag::DiagId;
use reed_parser::ir::{BinaryExpr, CallExpr, Expr, Operator};
use rustc_hash::FxHashSet;

use crate::visitor::{ExprRewrite, Pass, PassCtx, PassResult};

pub struct ExpressionAnalyzer;

impl ExpressionAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExpressionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for ExpressionAnalyzer {
    fn name(&self) -> &'static str {
        "expression-analysis"
    }

    fn visit_binary(
        &mut self,
        node: &mut BinaryExpr,
        ctx: &mut PassCtx,
    ) -> PassResult<ExprRewrite> {
        if node.op == Operator::Access {
            let incorrect = match node.right.as_ref() {
                Expr::Variable(v) => v.non_local,
                Expr::OperatorLit(_) | Expr::Super(_) | Expr::AllSymbols(_) => false,
                _ => true,
            };
            if incorrect {
                return Err(ctx.diag(
                    DiagId::IncorrectAccessSyntax,
                    node.src,
                    "the right side of `.` must be a name, an operator literal, or `super`",
                ));
            }
        }
        Ok(ExprRewrite::Keep)
    }

    fn visit_call(&mut self, node: &mut CallExpr, ctx: &mut PassCtx) -> PassResult<ExprRewrite> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for arg in &node.args {
            let Expr::Binary(be) = arg else { continue };
            if be.op != Operator::Set {
                continue;
            }
            match be.left.as_ref() {
                Expr::Variable(v) => {
                    if !seen.insert(v.name.as_str()) {
                        return Err(ctx.diag(
                            DiagId::DuplicateNamedArg,
                            be.src,
                            format!("named argument '{}' is given more than once", v.name),
                        ));
                    }
                }
                Expr::This(_) => {}
                other => {
                    return Err(ctx.diag(
                        DiagId::IncorrectArgName,
                        other.src_info(),
                        "a named argument must be named by a variable or `this`",
                    ));
                }
            }
        }
        Ok(ExprRewrite::Keep)
    }
}
