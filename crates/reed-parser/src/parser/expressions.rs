//! Expression parsing.
//!
//! One routine per precedence level, loosest binding first; each level
//! parses its operands at the next-tighter level, so recursion climbs the
//! precedence ladder:
//!
//! unpack `<<` → silent `~` → assignment (right-assoc) → ternary `? :` →
//! `&&`/`||` → `and`/`or`/`xor` → `not` → `==`/`!=` → `<`/`<=`/`>`/`>=` →
//! `in` → range `..` → concat `++` → `+`/`-` → `*`/`/`/`%` → `^`
//! (right-assoc) → unary `+`/`-` → postfix call/access/subscript → note →
//! scope `::` → primary.
//!
//! The comma has two jobs at range level: when the
//! `lower_range_prec` flag is set (statement level and inside subscripts)
//! it forms the three-operand range `a, b..c` or a multivar target list
//! `a, b, c = e`; inside call arguments and collection literals the flag is
//! clear and the comma separates elements.

use reed_common::diag::{DiagId, Diagnostic};
use reed_common::span::SourceInfo;
use reed_common::token::{FStringPart, TokenKind};

use crate::ir::{
    BinaryExpr, CallExpr, Comprehension, Dict, Expr, IntLit, Ir, List, ListForm, Multivar, Note,
    Operator, OperatorLit, RangeExpr, StringLit, TernaryIf, UnaryExpr, Variable,
};
use crate::ir::{BoolLit, FloatLit};

use super::Parser;

fn binary(op: Operator, left: Expr, right: Expr) -> Expr {
    let src = left.src_info().to(right.src_info());
    Expr::Binary(BinaryExpr {
        op,
        left: Box::new(left),
        right: Box::new(right),
        src,
    })
}

fn unary(op: Operator, start: SourceInfo, expr: Expr) -> Expr {
    let src = start.to(expr.src_info());
    Expr::Unary(UnaryExpr {
        op,
        expr: Box::new(expr),
        src,
    })
}

impl Parser {
    /// Parse a full expression.
    pub(crate) fn expression(&mut self) -> Result<Expr, Diagnostic> {
        self.unpack()
    }

    fn unpack(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.silent()?;
        while self.at(&TokenKind::LtLt) {
            self.advance();
            self.skip_nls();
            let right = self.silent()?;
            left = binary(Operator::Unpack, left, right);
        }
        Ok(left)
    }

    fn silent(&mut self) -> Result<Expr, Diagnostic> {
        if self.at(&TokenKind::Tilde) {
            let start = self.advance().info;
            let expr = self.assignment()?;
            return Ok(unary(Operator::Silent, start, expr));
        }
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, Diagnostic> {
        let left = self.ternary_if()?;
        let op = match &self.current().kind {
            TokenKind::Eq => Operator::Set,
            TokenKind::PlusEq => Operator::SetPlus,
            TokenKind::MinusEq => Operator::SetMinus,
            TokenKind::StarEq => Operator::SetMul,
            TokenKind::SlashEq => Operator::SetDiv,
            TokenKind::PercentEq => Operator::SetMod,
            TokenKind::CaretEq => Operator::SetExp,
            TokenKind::PlusPlusEq => Operator::SetConcat,
            _ => return Ok(left),
        };
        self.advance();
        self.skip_nls();
        let left = if op == Operator::Set {
            into_assign_target(left)
        } else {
            left
        };
        // Right-associative: a = b = c parses as a = (b = c).
        let right = self.assignment()?;
        Ok(binary(op, left, right))
    }

    pub(crate) fn ternary_if(&mut self) -> Result<Expr, Diagnostic> {
        let cond = self.short_circuit()?;
        if !self.at(&TokenKind::Question) {
            return Ok(cond);
        }
        self.advance();
        self.skip_nls();
        let value_true = self.ternary_if()?;
        self.expect(&TokenKind::Colon)?;
        self.skip_nls();
        let value_false = self.ternary_if()?;
        let src = cond.src_info().to(value_false.src_info());
        Ok(Expr::TernaryIf(Box::new(TernaryIf {
            condition: cond,
            value_true,
            value_false,
            src,
        })))
    }

    fn short_circuit(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.and_or_xor()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::AmpAmp => Operator::ShortAnd,
                TokenKind::PipePipe => Operator::ShortOr,
                _ => return Ok(left),
            };
            self.advance();
            self.skip_nls();
            let right = self.and_or_xor()?;
            left = binary(op, left, right);
        }
    }

    fn and_or_xor(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.op_not()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::And => Operator::And,
                TokenKind::Or => Operator::Or,
                TokenKind::Xor => Operator::Xor,
                _ => return Ok(left),
            };
            self.advance();
            self.skip_nls();
            let right = self.op_not()?;
            left = binary(op, left, right);
        }
    }

    fn op_not(&mut self) -> Result<Expr, Diagnostic> {
        if self.at(&TokenKind::Not) {
            let start = self.advance().info;
            let expr = self.op_not()?;
            return Ok(unary(Operator::Not, start, expr));
        }
        self.eq_neq()
    }

    fn eq_neq(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.compare_gl()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::EqEq => Operator::Eq,
                TokenKind::NotEq => Operator::Neq,
                _ => return Ok(left),
            };
            self.advance();
            self.skip_nls();
            let right = self.compare_gl()?;
            left = binary(op, left, right);
        }
    }

    fn compare_gl(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.membership()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Gt => Operator::Gt,
                TokenKind::Lt => Operator::Lt,
                TokenKind::GtEq => Operator::Ge,
                TokenKind::LtEq => Operator::Le,
                _ => return Ok(left),
            };
            self.advance();
            self.skip_nls();
            let right = self.membership()?;
            left = binary(op, left, right);
        }
    }

    fn membership(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.range_expr()?;
        while self.at(&TokenKind::In) {
            self.advance();
            self.skip_nls();
            let right = self.range_expr()?;
            left = binary(Operator::In, left, right);
        }
        Ok(left)
    }

    /// Range level: `a..b`, and -- when comma-range parsing is enabled --
    /// the three-operand `a, s..b` and multivar lists `a, b, c`.
    fn range_expr(&mut self) -> Result<Expr, Diagnostic> {
        let leading_rest = self.lower_range_prec && self.eat(&TokenKind::DotDotDot);
        let first = self.concatenation()?;

        if !leading_rest && self.at(&TokenKind::DotDot) {
            self.advance();
            let end = self.concatenation()?;
            let src = first.src_info().to(end.src_info());
            return Ok(Expr::Range(Box::new(RangeExpr {
                start: first,
                second: None,
                end,
                src,
            })));
        }

        if self.lower_range_prec && (self.at(&TokenKind::Comma) || leading_rest) {
            if !self.at(&TokenKind::Comma) {
                // A lone `...x` target.
                let src = first.src_info();
                return Ok(Expr::Multivar(Multivar {
                    vars: vec![first],
                    rest_index: Some(0),
                    src,
                }));
            }
            self.advance();
            self.skip_nls();
            let second_rest = self.eat(&TokenKind::DotDotDot);
            let second = self.concatenation()?;

            if !leading_rest && !second_rest && self.at(&TokenKind::DotDot) {
                self.advance();
                let end = self.concatenation()?;
                let src = first.src_info().to(end.src_info());
                return Ok(Expr::Range(Box::new(RangeExpr {
                    start: first,
                    second: Some(second),
                    end,
                    src,
                })));
            }
            return self.list_of_vars(first, second, leading_rest, second_rest);
        }

        Ok(first)
    }

    /// Collect the remaining `,`-separated multivar targets.
    fn list_of_vars(
        &mut self,
        first: Expr,
        second: Expr,
        first_rest: bool,
        second_rest: bool,
    ) -> Result<Expr, Diagnostic> {
        let start = first.src_info();
        let mut vars = vec![first, second];
        let mut rest_index = if first_rest {
            Some(0)
        } else if second_rest {
            Some(1)
        } else {
            None
        };
        while self.eat(&TokenKind::Comma) {
            self.skip_nls();
            if self.eat(&TokenKind::DotDotDot) {
                if rest_index.is_some() {
                    return Err(self.diag(
                        DiagId::MultipleVarargs,
                        self.info(),
                        "only one `...` target is allowed",
                    ));
                }
                rest_index = Some(vars.len());
            }
            vars.push(self.concatenation()?);
        }
        let src = start.to(vars.last().expect("at least two vars").src_info());
        Ok(Expr::Multivar(Multivar {
            vars,
            rest_index,
            src,
        }))
    }

    fn concatenation(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.add_sub()?;
        while self.at(&TokenKind::PlusPlus) {
            self.advance();
            self.skip_nls();
            let right = self.add_sub()?;
            left = binary(Operator::Concat, left, right);
        }
        Ok(left)
    }

    fn add_sub(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.mul_div_mod()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Plus => Operator::Plus,
                TokenKind::Minus => Operator::Minus,
                _ => return Ok(left),
            };
            self.advance();
            self.skip_nls();
            let right = self.mul_div_mod()?;
            left = binary(op, left, right);
        }
    }

    fn mul_div_mod(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.exponentiation()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Star => Operator::Mul,
                TokenKind::Slash => Operator::Div,
                TokenKind::Percent => Operator::Mod,
                _ => return Ok(left),
            };
            self.advance();
            self.skip_nls();
            let right = self.exponentiation()?;
            left = binary(op, left, right);
        }
    }

    fn exponentiation(&mut self) -> Result<Expr, Diagnostic> {
        let left = self.unary_plus_minus()?;
        if !self.at(&TokenKind::Caret) {
            return Ok(left);
        }
        self.advance();
        self.skip_nls();
        // Right-associative: a ^ b ^ c parses as a ^ (b ^ c).
        let right = self.exponentiation()?;
        Ok(binary(Operator::Exp, left, right))
    }

    fn unary_plus_minus(&mut self) -> Result<Expr, Diagnostic> {
        if self.at(&TokenKind::Minus) {
            let start = self.advance().info;
            let expr = self.unary_plus_minus()?;
            return Ok(unary(Operator::Neg, start, expr));
        }
        if self.at(&TokenKind::Plus) {
            // Unary plus is the identity; it leaves no IR node.
            self.advance();
            return self.unary_plus_minus();
        }
        self.call_access_subs()
    }

    /// Postfix chain: calls, `.` access, `[]` subscripts.
    pub(crate) fn call_access_subs(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.note_level()?;
        loop {
            match &self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    // The member shape (variable, operator literal, super)
                    // is validated by expression analysis, not here.
                    let rhs = self.note_level()?;
                    expr = binary(Operator::Access, expr, rhs);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let saved = self.lower_range_prec;
                    self.lower_range_prec = true;
                    let index = self.expression();
                    self.lower_range_prec = saved;
                    let index = index?;
                    let close = self.expect(&TokenKind::RBracket)?;
                    let src = expr.src_info().to(close.info);
                    expr = Expr::Binary(BinaryExpr {
                        op: Operator::Subsc,
                        left: Box::new(expr),
                        right: Box::new(index),
                        src,
                    });
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = if self.at(&TokenKind::RParen) {
                        Vec::new()
                    } else {
                        self.expr_list()?
                    };
                    let close = self.expect(&TokenKind::RParen)?;
                    let src = expr.src_info().to(close.info);
                    expr = Expr::Call(Box::new(CallExpr {
                        fun: expr,
                        args,
                        src,
                    }));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn note_level(&mut self) -> Result<Expr, Diagnostic> {
        if matches!(self.current().kind, TokenKind::Note { .. }) {
            let token = self.advance();
            let TokenKind::Note { prefix } = token.kind else {
                unreachable!("matched Note above");
            };
            let value = self.unescape_or_diag(&token.text, token.info)?;
            return Ok(Expr::Note(Note {
                prefix,
                value: StringLit {
                    value,
                    src: token.info,
                },
                src: token.info,
            }));
        }
        self.scope_expr()
    }

    /// Scope chains: `a::b::c` and the global form `::a`.
    pub(crate) fn scope_expr(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = if self.at(&TokenKind::ColonColon) {
            let start = self.advance().info;
            let inner = self.primary()?;
            unary(Operator::Scope, start, inner)
        } else {
            self.primary()?
        };
        while self.at(&TokenKind::ColonColon) {
            self.advance();
            let rhs = self.primary()?;
            expr = binary(Operator::Scope, expr, rhs);
        }
        Ok(expr)
    }

    /// Type position in argument lists: a scope-qualified name.
    pub(crate) fn type_expr(&mut self) -> Result<Expr, Diagnostic> {
        self.scope_expr()
    }

    // ── Primary ────────────────────────────────────────────────────────

    fn primary(&mut self) -> Result<Expr, Diagnostic> {
        let info = self.info();
        match &self.current().kind {
            TokenKind::Int => {
                let token = self.advance();
                let value = parse_int(&token.text).ok_or_else(|| {
                    self.diag(
                        DiagId::InvalidIntLiteral,
                        token.info,
                        format!("invalid integer literal '{}'", token.text),
                    )
                })?;
                Ok(Expr::Int(IntLit {
                    value,
                    src: token.info,
                }))
            }
            TokenKind::Float => {
                let token = self.advance();
                let value = token.text.replace('_', "").parse::<f64>().map_err(|_| {
                    self.diag(
                        DiagId::InvalidFloatLiteral,
                        token.info,
                        format!("invalid float literal '{}'", token.text),
                    )
                })?;
                Ok(Expr::Float(FloatLit {
                    value,
                    src: token.info,
                }))
            }
            TokenKind::Str { .. } => {
                let token = self.advance();
                let value = self.unescape_or_diag(&token.text, token.info)?;
                Ok(Expr::Str(StringLit {
                    value,
                    src: token.info,
                }))
            }
            TokenKind::FString(_) => self.fstring(),
            TokenKind::True => {
                let token = self.advance();
                Ok(Expr::Bool(BoolLit {
                    value: true,
                    src: token.info,
                }))
            }
            TokenKind::False => {
                let token = self.advance();
                Ok(Expr::Bool(BoolLit {
                    value: false,
                    src: token.info,
                }))
            }
            TokenKind::Nil => Ok(Expr::Nil(self.advance().info)),
            TokenKind::This => Ok(Expr::This(self.advance().info)),
            TokenKind::Super => Ok(Expr::Super(self.advance().info)),
            TokenKind::Ident => {
                let token = self.advance();
                Ok(Expr::Variable(Variable {
                    name: token.text,
                    non_local: false,
                    src: token.info,
                }))
            }
            TokenKind::Dollar => {
                self.advance();
                let name = self.expect(&TokenKind::Ident)?;
                Ok(Expr::Variable(Variable {
                    name: name.text,
                    non_local: true,
                    src: info.to(name.info),
                }))
            }
            TokenKind::Fun => match self.function()? {
                Ir::Expr(expr) => Ok(expr),
                other => Err(self.diag(
                    DiagId::UnexpectedToken,
                    other.src_info(),
                    "a block-bodied function cannot appear inside an expression",
                )),
            },
            TokenKind::LParen => {
                if let Some(op) = self.try_operator_name()? {
                    return Ok(Expr::OperatorLit(OperatorLit { op, src: info }));
                }
                self.advance();
                self.skip_nls();
                let expr = self.expression()?;
                self.skip_nls();
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.list_literal(),
            TokenKind::LBrace => self.dict_literal(),
            TokenKind::Error => {
                let token = self.advance();
                let id = if token.text.starts_with("unterminated") {
                    DiagId::UnterminatedString
                } else {
                    DiagId::UnexpectedCharacter
                };
                Err(self.diag(id, token.info, token.text))
            }
            other => Err(self.diag(
                DiagId::ExpectedExpression,
                info,
                format!("expected an expression, found {}", other.describe()),
            )),
        }
    }

    /// `[...]`: a list literal, a comprehension, or a bracketed multivar
    /// target (when `...` rest markers appear).
    fn list_literal(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.advance().info;
        let saved = self.lower_range_prec;
        self.lower_range_prec = false;
        let result = self.list_literal_inner(start);
        self.lower_range_prec = saved;
        result
    }

    fn list_literal_inner(&mut self, start: SourceInfo) -> Result<Expr, Diagnostic> {
        self.skip_nls();
        if self.at(&TokenKind::RBracket) {
            let end = self.advance().info;
            return Ok(Expr::List(List {
                form: ListForm::Literal(Vec::new()),
                src: start.to(end),
            }));
        }

        let first_rest = self.eat(&TokenKind::DotDotDot);
        let first = self.expression()?;

        if !first_rest && (self.at(&TokenKind::If) || self.at(&TokenKind::Colon)) {
            return self.comprehension(start, first);
        }

        let mut elements = vec![first];
        let mut rest_index = if first_rest { Some(0) } else { None };
        while self.eat(&TokenKind::Comma) {
            self.skip_nls();
            if self.eat(&TokenKind::DotDotDot) {
                if rest_index.is_some() {
                    return Err(self.diag(
                        DiagId::MultipleVarargs,
                        self.info(),
                        "only one `...` target is allowed",
                    ));
                }
                rest_index = Some(elements.len());
            }
            elements.push(self.expression()?);
        }
        self.skip_nls();
        let end = self.expect(&TokenKind::RBracket)?.info;

        if let Some(rest_index) = rest_index {
            if !self.at(&TokenKind::Eq) {
                return Err(self.diag(
                    DiagId::RestOutsideAssignment,
                    start.to(end),
                    "`...` targets are only allowed in an assignment target list",
                ));
            }
            return Ok(Expr::Multivar(Multivar {
                vars: elements,
                rest_index: Some(rest_index),
                src: start.to(end),
            }));
        }

        Ok(Expr::List(List {
            form: ListForm::Literal(elements),
            src: start.to(end),
        }))
    }

    /// The tail of `[result if(cond) else alt : bind, ...]`.
    fn comprehension(&mut self, start: SourceInfo, result: Expr) -> Result<Expr, Diagnostic> {
        let mut condition = None;
        let mut else_result = None;
        if self.eat(&TokenKind::If) {
            self.expect(&TokenKind::LParen)?;
            condition = Some(self.expression()?);
            self.expect(&TokenKind::RParen)?;
            if self.eat(&TokenKind::Else) {
                else_result = Some(self.expression()?);
            }
        }
        self.expect(&TokenKind::Colon)?;
        self.skip_nls();
        let mut assignments = vec![self.expression()?];
        while self.eat(&TokenKind::Comma) {
            self.skip_nls();
            assignments.push(self.expression()?);
        }
        self.skip_nls();
        let end = self.expect(&TokenKind::RBracket)?.info;
        let id = self.anon_compr_id;
        self.anon_compr_id += 1;
        Ok(Expr::List(List {
            form: ListForm::Comprehension(Box::new(Comprehension {
                result,
                condition,
                else_result,
                assignments,
                result_name: format!("{id}cl"),
            })),
            src: start.to(end),
        }))
    }

    /// `{k: v, ...}` or the empty dict `{:}`.
    fn dict_literal(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.advance().info;
        let saved = self.lower_range_prec;
        self.lower_range_prec = false;
        let result = self.dict_literal_inner(start);
        self.lower_range_prec = saved;
        result
    }

    fn dict_literal_inner(&mut self, start: SourceInfo) -> Result<Expr, Diagnostic> {
        self.skip_nls();
        if self.eat(&TokenKind::Colon) {
            self.skip_nls();
            let end = self.expect(&TokenKind::RBrace)?.info;
            return Ok(Expr::Dict(Dict {
                keys: Vec::new(),
                values: Vec::new(),
                src: start.to(end),
            }));
        }

        let mut keys = Vec::new();
        let mut values = Vec::new();
        loop {
            self.skip_nls();
            keys.push(self.expression()?);
            self.expect(&TokenKind::Colon)?;
            self.skip_nls();
            values.push(self.expression()?);
            self.skip_nls();
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace)?.info;
        Ok(Expr::Dict(Dict {
            keys,
            values,
            src: start.to(end),
        }))
    }

    /// Rewrite an f-string token into a concatenation chain of literal
    /// fragments and re-parsed interpolation expressions.
    fn fstring(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.advance();
        let TokenKind::FString(parts) = token.kind else {
            unreachable!("caller checked the token kind");
        };

        let mut chain: Option<Expr> = None;
        for part in parts {
            let piece = match part {
                FStringPart::Text(text) => {
                    let value = self.unescape_or_diag(&text, token.info)?;
                    Expr::Str(StringLit {
                        value,
                        src: token.info,
                    })
                }
                FStringPart::Expr { src, info } => {
                    let mut sub = Parser::new(&src, self.source_name().clone());
                    let expr = sub.expression()?;
                    if !sub.at(&TokenKind::Eof) {
                        return Err(self.diag(
                            DiagId::UnexpectedToken,
                            info,
                            "trailing input after f-string interpolation expression",
                        ));
                    }
                    expr
                }
            };
            chain = Some(match chain {
                None => piece,
                Some(left) => binary(Operator::Concat, left, piece),
            });
        }

        Ok(chain.unwrap_or(Expr::Str(StringLit {
            value: String::new(),
            src: token.info,
        })))
    }

    fn unescape_or_diag(
        &self,
        raw: &str,
        info: SourceInfo,
    ) -> Result<String, Diagnostic> {
        unescape(raw).map_err(|bad| {
            self.diag(
                DiagId::UnknownEscape,
                info,
                format!("unknown escape sequence '\\{bad}'"),
            )
        })
    }
}

/// Convert a parsed left-hand side into an assignment target: a literal
/// list becomes a multivar, everything else stays as is.
fn into_assign_target(expr: Expr) -> Expr {
    match expr {
        Expr::List(List {
            form: ListForm::Literal(elements),
            src,
        }) if !elements.is_empty() => Expr::Multivar(Multivar {
            vars: elements,
            rest_index: None,
            src,
        }),
        other => other,
    }
}

/// Parse an integer literal: decimal, `0x` hex, or `0b` binary, with `_`
/// separators.
fn parse_int(text: &str) -> Option<i64> {
    let t = text.replace('_', "");
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = t.strip_prefix("0b").or_else(|| t.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).ok();
    }
    t.parse::<i64>().ok()
}

/// Unescape a string literal using the Reed escape set: `\n`, `\t`, `\\`,
/// `\"`, `\xNN`, `\uNNNN`, and octal `\NNN`. Returns the offending escape
/// on failure.
pub(crate) fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            None => return Err(String::new()),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('x') => {
                let hi = chars.next().ok_or_else(|| "x".to_string())?;
                let lo = chars.next().ok_or_else(|| "x".to_string())?;
                let code = u32::from_str_radix(&format!("{hi}{lo}"), 16)
                    .map_err(|_| format!("x{hi}{lo}"))?;
                out.push(char::from_u32(code).ok_or_else(|| format!("x{hi}{lo}"))?);
            }
            Some('u') => {
                let mut digits = String::new();
                for _ in 0..4 {
                    digits.push(chars.next().ok_or_else(|| format!("u{digits}"))?);
                }
                let code = u32::from_str_radix(&digits, 16)
                    .map_err(|_| format!("u{digits}"))?;
                out.push(char::from_u32(code).ok_or_else(|| format!("u{digits}"))?);
            }
            Some(c) if c.is_digit(8) => {
                let mut value = c.to_digit(8).expect("checked octal digit");
                for _ in 0..2 {
                    match chars.peek() {
                        Some(&d) if d.is_digit(8) => {
                            value = value * 8 + d.to_digit(8).expect("checked octal digit");
                            chars.next();
                        }
                        _ => break,
                    }
                }
                out.push(char::from_u32(value).ok_or_else(|| format!("{value:o}"))?);
            }
            Some(other) => return Err(other.to_string()),
        }
    }
    Ok(out)
}
