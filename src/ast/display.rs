//! Displays the AST as the indented, bracketed tree printed by the `parser`
//! executable.

use std::fmt::{self, Display, Write as _};

use super::*;

const INDENT: &str = "  ";

fn write_indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        f.write_str(INDENT)?;
    }
    Ok(())
}

fn write_stmts(f: &mut fmt::Formatter<'_>, stmts: &[Stmt], depth: usize) -> fmt::Result {
    for stmt in stmts {
        write_stmt(f, stmt, depth)?;
    }
    Ok(())
}

fn write_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, depth: usize) -> fmt::Result {
    write_indent(f, depth)?;
    match stmt {
        Stmt::Assign(a) => writeln!(f, "[Assign] {a}"),
        Stmt::Return(r) => match &r.value {
            Some(e) => writeln!(f, "[Return] {e}"),
            None => writeln!(f, "[Return]"),
        },
        Stmt::Call(c) => match c.kind {
            CallKind::Builtin => writeln!(f, "[BuiltinCall] {}", c.call),
            CallKind::User => writeln!(f, "[Call] {}", c.call),
        },
        Stmt::If(i) => {
            writeln!(f, "[If] {}", i.cond)?;
            write_indent(f, depth)?;
            writeln!(f, "[Taken]")?;
            write_stmts(f, &i.taken, depth + 1)?;
            if !i.not_taken.is_empty() {
                write_indent(f, depth)?;
                writeln!(f, "[NotTaken]")?;
                write_stmts(f, &i.not_taken, depth + 1)?;
            }
            Ok(())
        }
        Stmt::For(l) => {
            writeln!(f, "[For] {}; {}; {}", l.init, l.cond, l.step)?;
            write_indent(f, depth)?;
            writeln!(f, "[Body]")?;
            write_stmts(f, &l.body, depth + 1)
        }
        Stmt::While(w) => {
            writeln!(f, "[While] {}", w.cond)?;
            write_indent(f, depth)?;
            writeln!(f, "[Body]")?;
            write_stmts(f, &w.body, depth + 1)
        }
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.funcs {
            func.fmt(f)?;
        }
        Ok(())
    }
}

impl Display for FuncDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Function] {}", self.name)?;
        writeln!(f, "{INDENT}[Return Type] {}", self.ret)?;

        write!(f, "{INDENT}[Args]")?;
        if self.params.is_empty() {
            f.write_str(" none")?;
        } else {
            let mut first = true;
            for p in &self.params {
                f.write_str(if first { " " } else { ", " })?;
                write!(f, "{} {}", p.ty, p.name)?;
                first = false;
            }
        }
        f.write_char('\n')?;

        writeln!(f, "{INDENT}[Body]")?;
        write_stmts(f, &self.body, 2)
    }
}

impl Display for AssignStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.target, self.value)
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
        }
    }
}

impl Display for CallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                f.write_str(", ")?;
            }
            arg.fmt(f)?;
            first = false;
        }
        f.write_char(')')
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(name) => f.write_str(name),
            Expr::Literal(lit) => lit.fmt(f),
            Expr::Arith(a) => write!(f, "({} {} {})", a.left, a.op, a.right),
            Expr::Index(i) => write!(f, "{}[{}]", i.name, i.index),
            Expr::Call(c) => c.fmt(f),
            Expr::Array(a) => {
                write!(f, "[{}] = {{", a.len)?;
                let mut first = true;
                for e in &a.elems {
                    if !first {
                        f.write_str(", ")?;
                    }
                    e.fmt(f)?;
                    first = false;
                }
                f.write_char('}')
            }
        }
    }
}
