//! Constant folding.
//!
//! A binary expression whose operands are both literals folds to the
//! literal the runtime would produce. Mixed int/float arithmetic promotes
//! to float; integer division stays integral; float modulo follows
//! `fmod`. `and`/`or`/`xor` fold bitwise on integers and logically on
//! booleans. String comparisons are lexicographic and `in` on strings is
//! substring containment. Nil is intentionally never folded -- `nil == nil`
//! is too rare to pay for the checks here.

use reed_parser::ir::{BinaryExpr, BoolLit, Expr, FloatLit, IntLit, Operator, StringLit};

use crate::visitor::{ExprRewrite, Pass, PassCtx, PassResult};

pub struct ConstantFolding;

impl ConstantFolding {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConstantFolding {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn visit_binary(
        &mut self,
        node: &mut BinaryExpr,
        _ctx: &mut PassCtx,
    ) -> PassResult<ExprRewrite> {
        if !node.left.is_constant() || !node.right.is_constant() {
            return Ok(ExprRewrite::Keep);
        }
        let src = node.left.src_info();
        let op = node.op;

        let folded = match (node.left.as_ref(), node.right.as_ref()) {
            // Int op Int stays integral.
            (Expr::Int(l), Expr::Int(r)) => fold_int(op, l.value, r.value, src),
            // Any int/float mix promotes to float.
            (Expr::Int(l), Expr::Float(r)) => fold_float(op, l.value as f64, r.value, src),
            (Expr::Float(l), Expr::Int(r)) => fold_float(op, l.value, r.value as f64, src),
            (Expr::Float(l), Expr::Float(r)) => fold_float(op, l.value, r.value, src),
            (Expr::Bool(l), Expr::Bool(r)) => fold_bool(op, l.value, r.value, src),
            (Expr::Str(l), Expr::Str(r)) => fold_str(op, &l.value, &r.value, src),
            _ => None,
        };

        Ok(match folded {
            Some(expr) => ExprRewrite::Replace(expr),
            None => ExprRewrite::Keep,
        })
    }
}

fn int(value: i64, src: reed_common::span::SourceInfo) -> Expr {
    Expr::Int(IntLit { value, src })
}

fn float(value: f64, src: reed_common::span::SourceInfo) -> Expr {
    Expr::Float(FloatLit { value, src })
}

fn boolean(value: bool, src: reed_common::span::SourceInfo) -> Expr {
    Expr::Bool(BoolLit { value, src })
}

fn fold_int(op: Operator, l: i64, r: i64, src: reed_common::span::SourceInfo) -> Option<Expr> {
    Some(match op {
        Operator::Plus => int(l.wrapping_add(r), src),
        Operator::Minus => int(l.wrapping_sub(r), src),
        Operator::Mul => int(l.wrapping_mul(r), src),
        Operator::Exp => int((l as f64).powf(r as f64) as i64, src),
        // Division and modulo by zero are left for the runtime to raise.
        Operator::Div => {
            if r == 0 {
                return None;
            }
            int(l.wrapping_div(r), src)
        }
        Operator::Mod => {
            if r == 0 {
                return None;
            }
            int(l.wrapping_rem(r), src)
        }
        Operator::And => int(l & r, src),
        Operator::Or => int(l | r, src),
        Operator::Xor => int(l ^ r, src),
        Operator::Gt => boolean(l > r, src),
        Operator::Lt => boolean(l < r, src),
        Operator::Ge => boolean(l >= r, src),
        Operator::Le => boolean(l <= r, src),
        Operator::Eq => boolean(l == r, src),
        Operator::Neq => boolean(l != r, src),
        _ => return None,
    })
}

fn fold_float(op: Operator, l: f64, r: f64, src: reed_common::span::SourceInfo) -> Option<Expr> {
    Some(match op {
        Operator::Plus => float(l + r, src),
        Operator::Minus => float(l - r, src),
        Operator::Mul => float(l * r, src),
        Operator::Div => float(l / r, src),
        Operator::Exp => float(l.powf(r), src),
        Operator::Mod => float(l % r, src),
        Operator::Gt => boolean(l > r, src),
        Operator::Lt => boolean(l < r, src),
        Operator::Ge => boolean(l >= r, src),
        Operator::Le => boolean(l <= r, src),
        Operator::Eq => boolean(l == r, src),
        Operator::Neq => boolean(l != r, src),
        // and/or/xor on floats is a runtime type error; emission keeps the
        // expression and lets the VM raise.
        _ => return None,
    })
}

fn fold_bool(op: Operator, l: bool, r: bool, src: reed_common::span::SourceInfo) -> Option<Expr> {
    Some(match op {
        Operator::And | Operator::ShortAnd => boolean(l && r, src),
        Operator::Or | Operator::ShortOr => boolean(l || r, src),
        Operator::Xor => boolean(l ^ r, src),
        Operator::Eq => boolean(l == r, src),
        Operator::Neq => boolean(l != r, src),
        _ => return None,
    })
}

fn fold_str(op: Operator, l: &str, r: &str, src: reed_common::span::SourceInfo) -> Option<Expr> {
    Some(match op {
        Operator::Gt => boolean(l > r, src),
        Operator::Lt => boolean(l < r, src),
        Operator::Ge => boolean(l >= r, src),
        Operator::Le => boolean(l <= r, src),
        Operator::Eq => boolean(l == r, src),
        Operator::Neq => boolean(l != r, src),
        // `a in b` is substring containment.
        Operator::In => boolean(r.contains(l), src),
        Operator::Concat => Expr::Str(StringLit {
            value: format!("{l}{r}"),
            src,
        }),
        _ => return None,
    })
}
