//! Canonical debug printing of the IR.
//!
//! Every node prints in a stable parenthesized form -- `a + b * c` prints as
//! `(a + (b * c))` -- which is what the parser round-trip tests assert
//! against. Bodies print one node per line, flush left.

use std::fmt;

use super::*;

fn write_body(f: &mut fmt::Formatter<'_>, body: &[Ir]) -> fmt::Result {
    for node in body {
        writeln!(f, "{node}")?;
    }
    Ok(())
}

fn write_comma_separated<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Re-escape a string value for printing inside quotes.
pub fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Format a float so it always reads as a float (`4.0`, not `4`).
fn fmt_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Ir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ir::Module(n) => n.fmt(f),
            Ir::Space(n) => n.fmt(f),
            Ir::Class(n) => n.fmt(f),
            Ir::Function(n) => n.fmt(f),
            Ir::If(n) => n.fmt(f),
            Ir::Switch(n) => n.fmt(f),
            Ir::Try(n) => n.fmt(f),
            Ir::While(n) => n.fmt(f),
            Ir::DoWhile(n) => n.fmt(f),
            Ir::ForLoop(n) => n.fmt(f),
            Ir::Enum(n) => n.fmt(f),
            Ir::Import(n) => n.fmt(f),
            Ir::Assert(n) => n.fmt(f),
            Ir::Raise(n) => n.fmt(f),
            Ir::Return(n) => n.fmt(f),
            Ir::Break(_) => f.write_str("break"),
            Ir::Continue(_) => f.write_str("continue"),
            Ir::Annotation(n) => n.fmt(f),
            Ir::EndOfFile(_) => f.write_str("<IR: <end-of-file>>"),
            Ir::Expr(e) => e.fmt(f),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_body(f, &self.body)
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "space {} {{", self.name)?;
        write_body(f, &self.body)?;
        f.write_str("}")
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {}", self.name)?;
        if !self.parents.is_empty() {
            f.write_str(" : ")?;
            write_comma_separated(f, &self.parents)?;
        }
        f.write_str(" {\n")?;
        write_body(f, &self.body)?;
        f.write_str("}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fun {}(", self.name)?;
        write_comma_separated(f, &self.args)?;
        f.write_str(") {\n")?;
        write_body(f, &self.body)?;
        f.write_str("}")
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.vararg {
            return write!(f, "... {}", self.name);
        }
        f.write_str(&self.name)?;
        if !self.types.is_empty() {
            f.write_str(":[")?;
            write_comma_separated(f, &self.types)?;
            f.write_str("]")?;
        }
        if let Some(default) = &self.default {
            write!(f, "={default}")?;
        }
        Ok(())
    }
}

impl fmt::Display for If {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "if ({}) {{", self.cond)?;
        write_body(f, &self.body)?;
        f.write_str("}")?;
        if let Some(els) = &self.else_branch {
            write!(f, " {els}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Else {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("else {\n")?;
        write_body(f, &self.body)?;
        f.write_str("}")
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "switch ({}) {{", self.cond)?;
        for case in &self.cases {
            writeln!(f, "{case}")?;
        }
        f.write_str("}")
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.default {
            f.write_str("default")?;
        } else {
            f.write_str("case ")?;
            write_comma_separated(f, &self.values)?;
        }
        f.write_str(": {\n")?;
        write_body(f, &self.body)?;
        f.write_str("}")
    }
}

impl fmt::Display for Try {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("try {\n")?;
        write_body(f, &self.body)?;
        f.write_str("}")?;
        for catch in &self.catches {
            write!(f, " {catch}")?;
        }
        if let Some(fin) = &self.finally {
            write!(f, " {fin}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Catch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "catch ({}) {{", self.arg)?;
        write_body(f, &self.body)?;
        f.write_str("}")
    }
}

impl fmt::Display for Finally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("finally {\n")?;
        write_body(f, &self.body)?;
        f.write_str("}")
    }
}

impl fmt::Display for While {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "while ({}) {{", self.cond)?;
        write_body(f, &self.body)?;
        f.write_str("}")
    }
}

impl fmt::Display for DoWhile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("do {\n")?;
        write_body(f, &self.body)?;
        write!(f, "}} while ({})", self.cond)
    }
}

impl fmt::Display for ForLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "for ({}: {}) {{", self.iterator, self.collection)?;
        write_body(f, &self.body)?;
        f.write_str("}")
    }
}

impl fmt::Display for EnumDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "enum {} {{", self.name)?;
        for value in &self.values {
            writeln!(f, "{value}")?;
        }
        f.write_str("}")
    }
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("import ")?;
        for (i, name) in self.names.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}")?;
            if !self.aliases[i].is_empty() {
                write!(f, " as {}", self.aliases[i])?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Assert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.msg {
            Some(msg) => write!(f, "assert({}, {})", self.cond, msg),
            None => write!(f, "assert({})", self.cond),
        }
    }
}

impl fmt::Display for Raise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "raise {}", self.exception)
    }
}

impl fmt::Display for Return {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "return {}", self.expr)
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.inner { "@!" } else { "@" }, self.name)?;
        if !self.args.is_empty() {
            f.write_str("(")?;
            write_comma_separated(f, &self.args)?;
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary(e) => write!(f, "({} {} {})", e.left, e.op, e.right),
            Expr::Unary(e) => write!(f, "({} {})", e.op, e.expr),
            Expr::Variable(v) => {
                write!(f, "{}{}", if v.non_local { "$" } else { "" }, v.name)
            }
            Expr::Multivar(mv) => {
                f.write_str("(")?;
                for (i, var) in mv.vars.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if mv.rest_index == Some(i) {
                        f.write_str("...")?;
                    }
                    write!(f, "{var}")?;
                }
                f.write_str(")")
            }
            Expr::AllSymbols(_) => f.write_str("*"),
            Expr::Lambda(l) => {
                write!(f, "(fun {}(", l.name)?;
                write_comma_separated(f, &l.args)?;
                write!(f, ") = {})", l.body)
            }
            Expr::Note(n) => write!(f, "{}\"{}\"", n.prefix, sanitize(&n.value.value)),
            Expr::List(list) => match &list.form {
                ListForm::Literal(elements) => {
                    f.write_str("[")?;
                    write_comma_separated(f, elements)?;
                    f.write_str("]")
                }
                ListForm::Comprehension(c) => {
                    write!(f, "[{}", c.result)?;
                    if let Some(cond) = &c.condition {
                        write!(f, " if({cond})")?;
                        if let Some(els) = &c.else_result {
                            write!(f, " else {els}")?;
                        }
                    }
                    f.write_str(" : ")?;
                    write_comma_separated(f, &c.assignments)?;
                    f.write_str("]")
                }
            },
            Expr::Dict(d) => {
                f.write_str("{")?;
                if d.keys.is_empty() {
                    f.write_str(":")?;
                }
                for i in 0..d.keys.len() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", d.keys[i], d.values[i])?;
                }
                f.write_str("}")
            }
            Expr::TernaryIf(t) => {
                write!(f, "({} ? {} : {})", t.condition, t.value_true, t.value_false)
            }
            Expr::Range(r) => match &r.second {
                Some(second) => write!(f, "({}, {}..{})", r.start, second, r.end),
                None => write!(f, "({}..{})", r.start, r.end),
            },
            Expr::Call(c) => {
                write!(f, "{}(", c.fun)?;
                write_comma_separated(f, &c.args)?;
                f.write_str(")")
            }
            Expr::This(_) => f.write_str("this"),
            Expr::Super(_) => f.write_str("super"),
            Expr::OperatorLit(o) => write!(f, "({})", o.op),
            Expr::Int(i) => write!(f, "{}", i.value),
            Expr::Float(fl) => f.write_str(&fmt_float(fl.value)),
            Expr::Bool(b) => f.write_str(if b.value { "true" } else { "false" }),
            Expr::Str(s) => write!(f, "\"{}\"", sanitize(&s.value)),
            Expr::Nil(_) => f.write_str("nil"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Expr {
        Expr::Int(IntLit {
            value: v,
            src: SourceInfo::none(),
        })
    }

    fn var(name: &str) -> Expr {
        Expr::Variable(Variable {
            name: name.into(),
            non_local: false,
            src: SourceInfo::none(),
        })
    }

    fn bin(op: Operator, l: Expr, r: Expr) -> Expr {
        Expr::Binary(BinaryExpr {
            op,
            left: Box::new(l),
            right: Box::new(r),
            src: SourceInfo::none(),
        })
    }

    #[test]
    fn binary_parenthesizes() {
        let e = bin(Operator::Plus, var("a"), bin(Operator::Mul, var("b"), int(2)));
        assert_eq!(e.to_string(), "(a + (b * 2))");
    }

    #[test]
    fn floats_always_read_as_floats() {
        assert_eq!(fmt_float(4.0), "4.0");
        assert_eq!(fmt_float(2.25), "2.25");
        assert_eq!(fmt_float(-0.5), "-0.5");
    }

    #[test]
    fn strings_reescape() {
        let e = Expr::Str(StringLit {
            value: "hi\n\"there\"".into(),
            src: SourceInfo::none(),
        });
        assert_eq!(e.to_string(), "\"hi\\n\\\"there\\\"\"");
    }

    #[test]
    fn multivar_marks_rest() {
        let e = Expr::Multivar(Multivar {
            vars: vec![var("a"), var("b"), var("c")],
            rest_index: Some(1),
            src: SourceInfo::none(),
        });
        assert_eq!(e.to_string(), "(a,...b,c)");
    }

    #[test]
    fn empty_dict_prints_colon() {
        let e = Expr::Dict(Dict {
            keys: Vec::new(),
            values: Vec::new(),
            src: SourceInfo::none(),
        });
        assert_eq!(e.to_string(), "{:}");
    }
}
