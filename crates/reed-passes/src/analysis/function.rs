//! Function signature analysis.
//!
//! For every function and lambda: argument names must be unique, at most
//! one vararg is allowed, every argument after a vararg or after a
//! defaulted argument must carry a default itself, operator functions may
//! only be declared inside a class, and the `@generator`/`@converter`
//! annotations constrain the signature. Return statements must be
//! textually inside a function or lambda, which the visitor's scope stack
//! answers.

use reed_common::diag::{DiagId, Diagnostic};
use reed_parser::ir::{Annotation, Argument, Function, Ir, Lambda, Return};
use rustc_hash::FxHashSet;

use crate::visitor::{IrRewrite, Pass, PassCtx, PassResult};

pub struct FunctionAnalyzer;

impl FunctionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn check_arguments(
        args: &[Argument],
        fname: &str,
        ctx: &PassCtx,
    ) -> Result<(), Diagnostic> {
        let mut existing: FxHashSet<&str> = FxHashSet::default();
        let mut after_vararg = false;
        let mut after_default = false;
        for arg in args {
            if !existing.insert(arg.name.as_str()) {
                return Err(ctx.diag(
                    DiagId::DuplicateArg,
                    arg.src,
                    format!(
                        "duplicate argument name '{}' in function '{}'",
                        arg.name, fname
                    ),
                ));
            }
            if after_vararg && arg.default.is_none() {
                return Err(ctx.diag(
                    DiagId::NonDefaultArgAfterVararg,
                    arg.src,
                    format!(
                        "argument '{}' after a vararg in function '{}' must have a default value",
                        arg.name, fname
                    ),
                ));
            }
            if after_default && arg.default.is_none() && !arg.vararg {
                return Err(ctx.diag(
                    DiagId::NonDefaultArgAfterDefault,
                    arg.src,
                    format!(
                        "argument '{}' after a defaulted argument in function '{}' must have a default value",
                        arg.name, fname
                    ),
                ));
            }
            if arg.vararg {
                after_vararg = true;
            }
            if arg.default.is_some() {
                after_default = true;
            }
        }
        Ok(())
    }

    /// `@generator(tag)` requires a zero-argument function,
    /// `@converter(src, dst)` a one-argument function. Inner annotations in
    /// the body count the same as outer ones.
    fn check_annotated<'a>(
        name: &str,
        arg_count: usize,
        annotations: impl Iterator<Item = &'a Annotation>,
        ctx: &PassCtx,
    ) -> Result<(), Diagnostic> {
        for ann in annotations {
            match ann.name.as_str() {
                "generator" => {
                    if ann.args.len() != 1 || arg_count != 0 {
                        return Err(ctx.diag(
                            DiagId::GeneratorExpectsNoArgs,
                            ann.src,
                            format!(
                                "@generator(tag) requires a zero-argument function, but '{name}' takes {arg_count}"
                            ),
                        ));
                    }
                }
                "converter" => {
                    if ann.args.len() != 2 || arg_count != 1 {
                        return Err(ctx.diag(
                            DiagId::ConverterExpectsOneArg,
                            ann.src,
                            format!(
                                "@converter(src, dst) requires a one-argument function, but '{name}' takes {arg_count}"
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_operator_fun(name: &str, src: reed_common::span::SourceInfo, ctx: &PassCtx) -> Result<(), Diagnostic> {
        if name.starts_with('(') && !ctx.directly_in_class() {
            return Err(ctx.diag(
                DiagId::OperatorFunOutsideClass,
                src,
                format!("operator function '{name}' may only be declared inside a class"),
            ));
        }
        Ok(())
    }
}

impl Default for FunctionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for FunctionAnalyzer {
    fn name(&self) -> &'static str {
        "function-analysis"
    }

    fn visit_function(&mut self, node: &mut Function, ctx: &mut PassCtx) -> PassResult<()> {
        Self::check_arguments(&node.args, &node.name, ctx)?;
        Self::check_operator_fun(&node.name, node.src, ctx)?;
        let inner = node.body.iter().filter_map(|item| match item {
            Ir::Annotation(a) if a.inner => Some(a),
            _ => None,
        });
        Self::check_annotated(
            &node.name,
            node.args.len(),
            node.annotations.iter().chain(inner),
            ctx,
        )
    }

    fn visit_lambda(
        &mut self,
        node: &mut Lambda,
        ctx: &mut PassCtx,
    ) -> PassResult<crate::visitor::ExprRewrite> {
        Self::check_arguments(&node.args, &node.name, ctx)?;
        Self::check_operator_fun(&node.name, node.src, ctx)?;
        Self::check_annotated(&node.name, node.args.len(), node.annotations.iter(), ctx)?;
        Ok(crate::visitor::ExprRewrite::Keep)
    }

    fn visit_return(&mut self, node: &mut Return, ctx: &mut PassCtx) -> PassResult<IrRewrite> {
        if !ctx.in_function() {
            return Err(ctx.diag(
                DiagId::ReturnOutsideFunction,
                node.src,
                "return outside of a function",
            ));
        }
        Ok(IrRewrite::Keep)
    }
}
