//! Canonical source rendering of a syntax tree
//!
//! Printing a parsed script and parsing the result yields the same tree.

use super::ast::*;
use crate::typed::format_ratio;
use std::fmt::{self, Write};

const INDENT: &str = "    ";

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.vars.is_empty() {
            writeln!(f, "vars {{")?;
            for var in &self.vars {
                writeln!(f, "{}{}", INDENT, var)?;
            }
            writeln!(f, "}}")?;
            writeln!(f)?;
        }
        for statement in &self.statements {
            let mut out = String::new();
            write_statement(&mut out, statement)?;
            writeln!(f, "{}", out)?;
        }
        Ok(())
    }
}

impl fmt::Display for VarDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ${}", self.ty, self.name)?;
        match &self.origin {
            None => Ok(()),
            Some(Origin::Meta { account, key }) => write!(f, " = meta({}, \"{}\")", account, key),
            Some(Origin::Balance { account, asset }) => {
                write!(f, " = balance({}, {})", account, asset)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(literal) => write!(f, "{}", literal),
            ExprKind::Variable(name) => write!(f, "${}", name),
            ExprKind::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Account(name) => write!(f, "@{}", name),
            Literal::Asset(name) => f.write_str(name),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::String(s) => write!(f, "\"{}\"", s),
            Literal::Portion(ratio) => f.write_str(&format_ratio(ratio)),
            Literal::Monetary { asset, amount } => write!(f, "[{} {}]", asset, amount),
        }
    }
}

impl fmt::Display for SendAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendAmount::Monetary(expr) => write!(f, "{}", expr),
            SendAmount::All { asset } => write!(f, "[{} *]", asset),
        }
    }
}

impl fmt::Display for AllotmentPortion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllotmentPortion::Literal(ratio) => f.write_str(&format_ratio(ratio)),
            AllotmentPortion::Variable(name) => write!(f, "${}", name),
            AllotmentPortion::Remaining => f.write_str("remaining"),
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_statement(out: &mut String, statement: &Statement) -> fmt::Result {
    match statement {
        Statement::Send {
            amount,
            source,
            destination,
            ..
        } => {
            writeln!(out, "send {} (", amount)?;
            indent(out, 1);
            out.push_str("source = ");
            write_value_aware_source(out, source, 1)?;
            out.push('\n');
            indent(out, 1);
            out.push_str("destination = ");
            write_destination(out, destination, 1)?;
            out.push_str("\n)");
        }
        Statement::Save {
            amount, account, ..
        } => write!(out, "save {} from {}", amount, account)?,
        Statement::SetTxMeta { key, value, .. } => {
            write!(out, "set_tx_meta(\"{}\", {})", key, value)?
        }
        Statement::SetAccountMeta {
            account,
            key,
            value,
            ..
        } => write!(out, "set_account_meta({}, \"{}\", {})", account, key, value)?,
        Statement::Print { value, .. } => write!(out, "print {}", value)?,
        Statement::Fail { .. } => out.push_str("fail"),
    }
    Ok(())
}

fn write_value_aware_source(
    out: &mut String,
    source: &ValueAwareSource,
    depth: usize,
) -> fmt::Result {
    match source {
        ValueAwareSource::Source(source) => write_source(out, source, depth),
        ValueAwareSource::Allotment { clauses, .. } => {
            out.push_str("{\n");
            for clause in clauses {
                indent(out, depth + 1);
                write!(out, "{} from ", clause.portion)?;
                write_value_aware_source(out, &clause.target, depth + 1)?;
                out.push('\n');
            }
            indent(out, depth);
            out.push('}');
            Ok(())
        }
    }
}

fn write_source(out: &mut String, source: &Source, depth: usize) -> fmt::Result {
    match source {
        Source::Account { account, overdraft } => {
            write!(out, "{}", account)?;
            match overdraft {
                None => {}
                Some(Overdraft::Bounded(limit)) => {
                    write!(out, " allowing overdraft up to {}", limit)?
                }
                Some(Overdraft::Unbounded) => out.push_str(" allowing unbounded overdraft"),
            }
        }
        Source::Maxed { max, source } => {
            write!(out, "max {} from ", max)?;
            write_source(out, source, depth)?;
        }
        Source::InOrder { sources, .. } => {
            out.push_str("{\n");
            for source in sources {
                indent(out, depth + 1);
                write_source(out, source, depth + 1)?;
                out.push('\n');
            }
            indent(out, depth);
            out.push('}');
        }
    }
    Ok(())
}

fn write_destination(out: &mut String, destination: &Destination, depth: usize) -> fmt::Result {
    match destination {
        Destination::Account(account) => write!(out, "{}", account)?,
        Destination::InOrder {
            clauses, remaining, ..
        } => {
            out.push_str("{\n");
            for (max, target) in clauses {
                indent(out, depth + 1);
                write!(out, "max {} ", max)?;
                write_kept_or_destination(out, target, depth + 1)?;
                out.push('\n');
            }
            indent(out, depth + 1);
            out.push_str("remaining ");
            write_kept_or_destination(out, remaining, depth + 1)?;
            out.push('\n');
            indent(out, depth);
            out.push('}');
        }
        Destination::Allotment { clauses, .. } => {
            out.push_str("{\n");
            for clause in clauses {
                indent(out, depth + 1);
                write!(out, "{} ", clause.portion)?;
                write_kept_or_destination(out, &clause.target, depth + 1)?;
                out.push('\n');
            }
            indent(out, depth);
            out.push('}');
        }
    }
    Ok(())
}

fn write_kept_or_destination(
    out: &mut String,
    target: &KeptOrDestination,
    depth: usize,
) -> fmt::Result {
    match target {
        KeptOrDestination::Kept => {
            out.push_str("kept");
            Ok(())
        }
        KeptOrDestination::Destination(destination) => {
            out.push_str("to ");
            write_destination(out, destination, depth)
        }
    }
}
