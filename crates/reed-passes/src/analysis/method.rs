//! Method and constructor analysis.
//!
//! Walking a class body: a function named like the class is tagged as its
//! constructor, and every function or lambda directly inside the class is
//! tagged as a method. A lambda named like the class is an error (lambdas
//! cannot construct), and a constructor must not return a non-nil value.

use reed_common::diag::DiagId;
use reed_parser::ir::{Class, Expr, Ir, Return};
use tracing::trace;

use crate::visitor::{IrRewrite, Pass, PassCtx, PassResult};

pub struct MethodAnalyzer;

impl MethodAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MethodAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for MethodAnalyzer {
    fn name(&self) -> &'static str {
        "method-analysis"
    }

    fn visit_class(&mut self, node: &mut Class, ctx: &mut PassCtx) -> PassResult<()> {
        let class_name = node.name.clone();
        for item in node.body.iter_mut() {
            match item {
                Ir::Function(f) => {
                    if f.name == class_name {
                        trace!(function = %f.name, "tagging constructor");
                        f.constructor = true;
                    }
                    trace!(function = %f.name, "tagging method");
                    f.method = true;
                }
                Ir::Expr(Expr::Lambda(l)) => {
                    if l.name == class_name {
                        return Err(ctx.diag(
                            DiagId::LambdaConstructor,
                            l.src,
                            format!("a lambda cannot be the constructor of class '{class_name}'"),
                        ));
                    }
                    trace!(lambda = %l.name, "tagging method");
                    l.method = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn visit_return(&mut self, node: &mut Return, ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        if ctx.in_constructor() && !matches!(node.expr, Expr::Nil(_)) {
            return Err(ctx.diag(
                DiagId::NonNilReturnInConstr,
                node.src,
                "a constructor cannot return a value other than nil",
            ));
        }
        Ok(IrRewrite::Keep)
    }
}
