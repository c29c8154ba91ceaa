//! Statement dispatch and construct parsing.
//!
//! `declaration` inspects the leading token and branches to the matching
//! construct or statement parser; everything that is not a known statement
//! head parses as an expression statement. Bodies come in two forms: a
//! braced block or a single declaration.

use reed_common::diag::{DiagId, Diagnostic};
use reed_common::token::TokenKind;

use crate::ir::{
    Annotation, Argument, Assert, BinaryExpr, Case, Catch, Class, DoWhile, Else, EnumDecl, Expr,
    Finally, ForLoop, Function, If, Import, Ir, Lambda, Operator, Raise, Return, Space, Switch,
    Try, Variable, While,
};

use super::Parser;

impl Parser {
    /// Parse one declaration: a statement that can stand on its own line.
    ///
    /// Leading standalone newlines and semicolons must already be skipped.
    /// Outer annotations are queued and attached to the declaration they
    /// precede.
    pub(crate) fn declaration(&mut self) -> Result<Ir, Diagnostic> {
        loop {
            self.skip_ends();
            match &self.current().kind {
                TokenKind::At => {
                    let annot = self.annotation(false)?;
                    self.outer_annots.push(annot);
                }
                TokenKind::AtBang => {
                    let annot = self.annotation(true)?;
                    self.expect_decl_end()?;
                    return Ok(Ir::Annotation(annot));
                }
                _ => break,
            }
        }

        let mut decl = self.declaration_inner()?;

        if !self.outer_annots.is_empty() {
            let annots = std::mem::take(&mut self.outer_annots);
            match &mut decl {
                Ir::Function(f) => f.annotations.extend(annots),
                Ir::Class(c) => c.annotations.extend(annots),
                Ir::Space(s) => s.annotations.extend(annots),
                Ir::Module(m) => m.annotations.extend(annots),
                Ir::Expr(Expr::Lambda(l)) => l.annotations.extend(annots),
                other => {
                    return Err(self.diag(
                        DiagId::UnexpectedToken,
                        other.src_info(),
                        "annotation must precede a function, class, space, or module",
                    ));
                }
            }
        }
        Ok(decl)
    }

    fn declaration_inner(&mut self) -> Result<Ir, Diagnostic> {
        match &self.current().kind {
            TokenKind::If => self.if_stmt(),
            TokenKind::Switch => self.switch_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::Do => self.do_while_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Try => self.try_stmt(),
            TokenKind::Fun => {
                let fun = self.function()?;
                if matches!(fun, Ir::Expr(_)) {
                    self.expect_decl_end()?;
                }
                Ok(fun)
            }
            TokenKind::Class => self.class_decl(),
            TokenKind::Space => self.space_decl(),
            TokenKind::Enum => self.enum_decl(),
            TokenKind::Import => self.import_stmt(),
            TokenKind::Return => self.return_stmt(),
            TokenKind::Break => {
                let info = self.advance().info;
                self.expect_decl_end()?;
                Ok(Ir::Break(info))
            }
            TokenKind::Continue => {
                let info = self.advance().info;
                self.expect_decl_end()?;
                Ok(Ir::Continue(info))
            }
            TokenKind::Raise => self.raise_stmt(),
            TokenKind::Assert => self.assert_stmt(),
            TokenKind::Error => {
                let token = self.advance();
                let id = if token.text.starts_with("unterminated") {
                    DiagId::UnterminatedString
                } else {
                    DiagId::UnexpectedCharacter
                };
                Err(self.diag(id, token.info, token.text))
            }
            _ => {
                let expr = self.expression()?;
                self.expect_decl_end()?;
                Ok(Ir::Expr(expr))
            }
        }
    }

    // ── Bodies ─────────────────────────────────────────────────────────

    /// A body: either a braced block or a single declaration.
    pub(crate) fn body(&mut self) -> Result<Vec<Ir>, Diagnostic> {
        self.skip_nls();
        if self.at(&TokenKind::LBrace) {
            self.block()
        } else {
            Ok(vec![self.declaration()?])
        }
    }

    /// A braced block of declarations.
    pub(crate) fn block(&mut self) -> Result<Vec<Ir>, Diagnostic> {
        self.expect(&TokenKind::LBrace)?;
        let mut items = Vec::new();
        loop {
            self.skip_ends();
            if self.eat(&TokenKind::RBrace) {
                return Ok(items);
            }
            if self.at(&TokenKind::Eof) {
                return Err(self.diag(
                    DiagId::MissingToken,
                    self.info(),
                    "expected `}` to close block",
                ));
            }
            items.push(self.declaration()?);
        }
    }

    /// A braced block that may open with a docstring.
    fn block_with_doc(&mut self) -> Result<(Vec<Ir>, String), Diagnostic> {
        self.skip_nls();
        self.expect(&TokenKind::LBrace)?;
        self.skip_ends();
        let doc = self.take_docstring();
        let mut items = Vec::new();
        loop {
            self.skip_ends();
            if self.eat(&TokenKind::RBrace) {
                return Ok((items, doc));
            }
            if self.at(&TokenKind::Eof) {
                return Err(self.diag(
                    DiagId::MissingToken,
                    self.info(),
                    "expected `}` to close block",
                ));
            }
            items.push(self.declaration()?);
        }
    }

    // ── Control-flow constructs ────────────────────────────────────────

    fn paren_cond(&mut self) -> Result<Expr, Diagnostic> {
        self.expect(&TokenKind::LParen)?;
        let cond = self.expression()?;
        self.expect(&TokenKind::RParen)?;
        Ok(cond)
    }

    fn if_stmt(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        let cond = self.paren_cond()?;
        let body = self.body()?;

        let mut else_branch = None;
        let (kind, offset) = self.peek_skip_nls();
        if *kind == TokenKind::Else {
            for _ in 0..offset {
                self.advance();
            }
            let else_start = self.advance().info;
            self.skip_nls();
            let else_body = if self.at(&TokenKind::If) {
                vec![self.if_stmt()?]
            } else {
                self.body()?
            };
            else_branch = Some(Box::new(Else {
                body: else_body,
                src: else_start,
            }));
        }

        Ok(Ir::If(If {
            cond,
            body,
            else_branch,
            src: start,
        }))
    }

    fn switch_stmt(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        let cond = self.paren_cond()?;
        self.skip_nls();
        self.expect(&TokenKind::LBrace)?;

        let mut cases = Vec::new();
        loop {
            self.skip_ends();
            if self.eat(&TokenKind::RBrace) {
                break;
            }
            let case_start = self.info();
            if self.eat(&TokenKind::Case) {
                let values = self.expr_list()?;
                self.expect(&TokenKind::Colon)?;
                let body = self.body()?;
                cases.push(Case {
                    values,
                    body,
                    default: false,
                    src: case_start,
                });
            } else if self.eat(&TokenKind::Default) {
                self.expect(&TokenKind::Colon)?;
                let body = self.body()?;
                cases.push(Case {
                    values: Vec::new(),
                    body,
                    default: true,
                    src: case_start,
                });
            } else {
                return Err(self.diag(
                    DiagId::SwitchBodyExpected,
                    self.info(),
                    format!(
                        "expected `case` or `default` in switch body, found {}",
                        self.current().kind.describe()
                    ),
                ));
            }
        }

        Ok(Ir::Switch(Switch {
            cond,
            cases,
            src: start,
        }))
    }

    fn while_stmt(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        let cond = self.paren_cond()?;
        let body = self.body()?;
        Ok(Ir::While(While {
            cond,
            body,
            src: start,
        }))
    }

    fn do_while_stmt(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        let body = self.body()?;
        self.skip_nls();
        self.expect(&TokenKind::While)?;
        let cond = self.paren_cond()?;
        self.expect_decl_end()?;
        Ok(Ir::DoWhile(DoWhile {
            cond,
            body,
            src: start,
        }))
    }

    fn for_stmt(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        self.expect(&TokenKind::LParen)?;
        // Comma participates in multivar targets here: `for (i, j: pairs)`.
        let saved = self.lower_range_prec;
        self.lower_range_prec = true;
        let iterator = self.expression();
        self.lower_range_prec = saved;
        let iterator = iterator?;
        self.expect(&TokenKind::Colon)?;
        let collection = self.expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.body()?;
        Ok(Ir::ForLoop(ForLoop {
            iterator,
            collection,
            body,
            src: start,
        }))
    }

    fn try_stmt(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        let body = self.body()?;

        let mut catches = Vec::new();
        loop {
            let (kind, offset) = self.peek_skip_nls();
            if *kind != TokenKind::Catch {
                break;
            }
            for _ in 0..offset {
                self.advance();
            }
            let catch_start = self.advance().info;
            self.expect(&TokenKind::LParen)?;
            let arg = self.argument(false)?;
            self.expect(&TokenKind::RParen)?;
            let catch_body = self.body()?;
            catches.push(Catch {
                arg,
                body: catch_body,
                src: catch_start,
            });
        }

        let mut finally = None;
        let (kind, offset) = self.peek_skip_nls();
        if *kind == TokenKind::Finally {
            for _ in 0..offset {
                self.advance();
            }
            let fin_start = self.advance().info;
            let fin_body = self.body()?;
            finally = Some(Finally {
                body: fin_body,
                src: fin_start,
            });
        }

        Ok(Ir::Try(Try {
            body,
            catches,
            finally,
            src: start,
        }))
    }

    // ── Functions and lambdas ──────────────────────────────────────────

    /// Parse a `fun` definition: a [`Function`] for `fun name(..) { .. }`,
    /// a [`Lambda`] expression for `fun [name](..) = expr`.
    pub(crate) fn function(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.info();
        self.expect(&TokenKind::Fun)?;

        let name = if self.at(&TokenKind::Ident) {
            Some(self.advance().text)
        } else {
            self.try_operator_name()?.map(|op| format!("({})", op.as_str()))
        };

        self.expect(&TokenKind::LParen)?;
        let args = self.arg_list()?;
        self.expect(&TokenKind::RParen)?;

        if self.eat(&TokenKind::Eq) {
            self.skip_nls();
            let body = self.expression()?;
            let name = name.unwrap_or_else(|| {
                let id = self.anon_lambda_id;
                self.anon_lambda_id += 1;
                format!("{id}l")
            });
            return Ok(Ir::Expr(Expr::Lambda(Box::new(Lambda {
                name,
                args,
                body,
                method: false,
                annotations: Vec::new(),
                src: start,
            }))));
        }

        if self.at(&TokenKind::LBrace) {
            let Some(name) = name else {
                return Err(self.diag(
                    DiagId::ExpectedIdentifier,
                    start,
                    "block-bodied function requires a name",
                ));
            };
            let (body, doc) = self.block_with_doc()?;
            return Ok(Ir::Function(Function {
                name,
                args,
                body,
                constructor: false,
                method: false,
                annotations: Vec::new(),
                doc,
                src: start,
            }));
        }

        Err(self.diag(
            DiagId::MissingToken,
            self.info(),
            format!(
                "expected `{{` or `=` after function arguments, found {}",
                self.current().kind.describe()
            ),
        ))
    }

    /// Recognize an operator name literal: `(+)`, `(in)`, `(())`, `([])`.
    pub(crate) fn try_operator_name(&mut self) -> Result<Option<Operator>, Diagnostic> {
        if !self.at(&TokenKind::LParen) {
            return Ok(None);
        }
        if let Some(op) = operator_from_token(&self.peek(1).kind) {
            if self.peek_is(2, &TokenKind::RParen) {
                self.advance();
                self.advance();
                self.advance();
                return Ok(Some(op));
            }
        }
        let nested = match &self.peek(1).kind {
            TokenKind::LParen if self.peek_is(2, &TokenKind::RParen) => Some(Operator::FunCall),
            TokenKind::LBracket if self.peek_is(2, &TokenKind::RBracket) => Some(Operator::Subsc),
            _ => None,
        };
        if let Some(op) = nested {
            if self.peek_is(3, &TokenKind::RParen) {
                for _ in 0..4 {
                    self.advance();
                }
                return Ok(Some(op));
            }
        }
        Ok(None)
    }

    /// Parse a parenthesized argument list body (without the parens).
    pub(crate) fn arg_list(&mut self) -> Result<Vec<Argument>, Diagnostic> {
        let saved = self.lower_range_prec;
        self.lower_range_prec = false;
        let result = self.arg_list_inner();
        self.lower_range_prec = saved;
        result
    }

    fn arg_list_inner(&mut self) -> Result<Vec<Argument>, Diagnostic> {
        let mut args = Vec::new();
        let mut seen_vararg = false;
        self.skip_nls();
        if self.at(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            self.skip_nls();
            let arg = self.argument(true)?;
            if arg.vararg {
                if seen_vararg {
                    return Err(self.diag(
                        DiagId::MultipleVarargs,
                        arg.src,
                        "only one vararg argument is allowed",
                    ));
                }
                seen_vararg = true;
            }
            args.push(arg);
            self.skip_nls();
            if !self.eat(&TokenKind::Comma) {
                return Ok(args);
            }
        }
    }

    /// Parse one formal argument: `...name`, or
    /// `name[:type | :[types]][=default]`.
    pub(crate) fn argument(&mut self, allow_default: bool) -> Result<Argument, Diagnostic> {
        let start = self.info();
        if self.eat(&TokenKind::DotDotDot) {
            let name = self.expect(&TokenKind::Ident)?;
            return Ok(Argument {
                name: name.text,
                types: Vec::new(),
                default: None,
                vararg: true,
                src: start,
            });
        }

        let name = self.expect(&TokenKind::Ident)?;
        let mut types = Vec::new();
        if self.eat(&TokenKind::Colon) {
            if self.eat(&TokenKind::LBracket) {
                loop {
                    types.push(self.type_expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket)?;
            } else {
                types.push(self.type_expr()?);
            }
        }

        let mut default = None;
        if allow_default && self.eat(&TokenKind::Eq) {
            default = Some(self.ternary_if()?);
        }

        Ok(Argument {
            name: name.text,
            types,
            default,
            vararg: false,
            src: start,
        })
    }

    // ── Classes, spaces, enums ─────────────────────────────────────────

    fn class_decl(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        let name = self.expect(&TokenKind::Ident)?;
        let mut parents = Vec::new();
        if self.eat(&TokenKind::Colon) {
            loop {
                parents.push(self.call_access_subs()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let (body, doc) = self.block_with_doc()?;
        Ok(Ir::Class(Class {
            name: name.text,
            parents,
            body,
            annotations: Vec::new(),
            doc,
            src: start,
        }))
    }

    fn space_decl(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        let (name, anonymous) = if self.at(&TokenKind::Ident) {
            (self.advance().text, false)
        } else {
            let id = self.anon_space_id;
            self.anon_space_id += 1;
            (format!("{id}s"), true)
        };
        let (body, doc) = self.block_with_doc()?;
        Ok(Ir::Space(Space {
            name,
            anonymous,
            body,
            annotations: Vec::new(),
            doc,
            src: start,
        }))
    }

    fn enum_decl(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        let name = self.expect(&TokenKind::Ident)?;
        self.skip_nls();
        self.expect(&TokenKind::LBrace)?;
        let mut values = Vec::new();
        loop {
            self.skip_ends();
            if self.eat(&TokenKind::RBrace) {
                break;
            }
            let value = self.expect(&TokenKind::Ident)?;
            values.push(value.text);
            self.eat(&TokenKind::Comma);
        }
        Ok(Ir::Enum(EnumDecl {
            name: name.text,
            values,
            src: start,
        }))
    }

    // ── Imports ────────────────────────────────────────────────────────

    fn import_stmt(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        let mut names = Vec::new();
        let mut aliases = Vec::new();
        loop {
            let entries = self.import_name()?;
            let grouped = entries.len() > 1;
            for entry in entries {
                names.push(entry);
                aliases.push(String::new());
            }
            if self.eat(&TokenKind::As) {
                if grouped {
                    return Err(self.diag(
                        DiagId::UnexpectedToken,
                        self.info(),
                        "a grouped import cannot take an alias",
                    ));
                }
                let alias = self.expect(&TokenKind::Ident)?;
                *aliases.last_mut().expect("at least one import name") = alias.text;
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_decl_end()?;
        Ok(Ir::Import(Import {
            names,
            aliases,
            src: start,
        }))
    }

    /// One import entry. A trailing `::{a, b}` group expands into one
    /// scoped name per member.
    fn import_name(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut base = self.import_segment()?;
        while self.at(&TokenKind::ColonColon) {
            if matches!(base, Expr::AllSymbols(_)) {
                return Err(self.diag(
                    DiagId::AllSymbolsOutsideImport,
                    self.info(),
                    "`*` must be the last segment of an import path",
                ));
            }
            if self.peek_is(1, &TokenKind::LBrace) {
                self.advance();
                self.advance();
                let mut members = Vec::new();
                loop {
                    self.skip_nls();
                    let member = self.import_segment()?;
                    let info = base.src_info().to(member.src_info());
                    members.push(Expr::Binary(BinaryExpr {
                        op: Operator::Scope,
                        left: Box::new(base.clone()),
                        right: Box::new(member),
                        src: info,
                    }));
                    self.skip_nls();
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace)?;
                return Ok(members);
            }
            self.advance();
            let segment = self.import_segment()?;
            let info = base.src_info().to(segment.src_info());
            let done = matches!(segment, Expr::AllSymbols(_));
            base = Expr::Binary(BinaryExpr {
                op: Operator::Scope,
                left: Box::new(base),
                right: Box::new(segment),
                src: info,
            });
            if done {
                break;
            }
        }
        Ok(vec![base])
    }

    /// One import path segment: `name`, `$name`, or `*`.
    fn import_segment(&mut self) -> Result<Expr, Diagnostic> {
        if self.at(&TokenKind::Star) {
            return Ok(Expr::AllSymbols(self.advance().info));
        }
        let non_local = self.eat(&TokenKind::Dollar);
        let name = self.expect(&TokenKind::Ident)?;
        Ok(Expr::Variable(Variable {
            name: name.text,
            non_local,
            src: name.info,
        }))
    }

    // ── Simple statements ──────────────────────────────────────────────

    fn return_stmt(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        let expr = if matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            Expr::Nil(start)
        } else {
            self.expression()?
        };
        self.expect_decl_end()?;
        Ok(Ir::Return(Return { expr, src: start }))
    }

    fn raise_stmt(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        let exception = self.expression()?;
        self.expect_decl_end()?;
        Ok(Ir::Raise(Raise {
            exception,
            src: start,
        }))
    }

    fn assert_stmt(&mut self) -> Result<Ir, Diagnostic> {
        let start = self.advance().info;
        self.expect(&TokenKind::LParen)?;
        let saved = self.lower_range_prec;
        self.lower_range_prec = false;
        let result = (|| {
            let cond = self.expression()?;
            let msg = if self.eat(&TokenKind::Comma) {
                Some(self.expression()?)
            } else {
                None
            };
            Ok((cond, msg))
        })();
        self.lower_range_prec = saved;
        let (cond, msg) = result?;
        self.expect(&TokenKind::RParen)?;
        self.expect_decl_end()?;
        Ok(Ir::Assert(Assert {
            cond,
            msg,
            src: start,
        }))
    }

    // ── Annotations ────────────────────────────────────────────────────

    /// Parse `@name`, `@name(args)`, `@!name`, or `@!name(args)`.
    fn annotation(&mut self, inner: bool) -> Result<Annotation, Diagnostic> {
        let start = self.advance().info;
        let name = self.expect(&TokenKind::Ident)?;
        let mut args = Vec::new();
        if self.eat(&TokenKind::LParen) {
            if !self.at(&TokenKind::RParen) {
                args = self.expr_list()?;
            }
            self.expect(&TokenKind::RParen)?;
        }
        Ok(Annotation {
            name: name.text,
            args,
            inner,
            src: start,
        })
    }

    /// Comma-separated expressions with comma-range parsing disabled.
    pub(crate) fn expr_list(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let saved = self.lower_range_prec;
        self.lower_range_prec = false;
        let result = (|| {
            let mut items = vec![self.expression()?];
            while self.eat(&TokenKind::Comma) {
                self.skip_nls();
                items.push(self.expression()?);
            }
            Ok(items)
        })();
        self.lower_range_prec = saved;
        result
    }
}

/// Map an operator token to the operator it names in `(op)` literals.
pub(crate) fn operator_from_token(kind: &TokenKind) -> Option<Operator> {
    match kind {
        TokenKind::Plus => Some(Operator::Plus),
        TokenKind::Minus => Some(Operator::Minus),
        TokenKind::Star => Some(Operator::Mul),
        TokenKind::Slash => Some(Operator::Div),
        TokenKind::Percent => Some(Operator::Mod),
        TokenKind::Caret => Some(Operator::Exp),
        TokenKind::PlusPlus => Some(Operator::Concat),
        TokenKind::EqEq => Some(Operator::Eq),
        TokenKind::NotEq => Some(Operator::Neq),
        TokenKind::Gt => Some(Operator::Gt),
        TokenKind::Lt => Some(Operator::Lt),
        TokenKind::GtEq => Some(Operator::Ge),
        TokenKind::LtEq => Some(Operator::Le),
        TokenKind::AmpAmp => Some(Operator::ShortAnd),
        TokenKind::PipePipe => Some(Operator::ShortOr),
        TokenKind::And => Some(Operator::And),
        TokenKind::Or => Some(Operator::Or),
        TokenKind::Xor => Some(Operator::Xor),
        TokenKind::Not => Some(Operator::Not),
        TokenKind::In => Some(Operator::In),
        TokenKind::LtLt => Some(Operator::Unpack),
        _ => None,
    }
}
