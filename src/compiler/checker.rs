//! Type checking and binding of a parsed script
//!
//! The checker walks the syntax tree once and stops at the first error:
//!
//! - every variable is declared once, before use, and used at its declared type
//! - account, asset and portion literals are well formed
//! - literal portions of an allotment do not exceed 100%
//! - sources respect the overdraft and draining rules
//!
//! Declared variables that are never used only produce a warning.

use super::ast::*;
use super::SourcePosition;
use crate::typed::{Account, Asset, Portion, ValueType};
use log::warn;
use num_rational::BigRational;
use num_traits::One;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Maximum number of variables a script may declare
pub const MAX_VARIABLES: usize = 32_768;

/// Errors found while checking a script
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    /// A variable is used without being declared
    #[error("Undeclared variable ${name} at {pos}")]
    UndeclaredVariable { name: String, pos: SourcePosition },

    /// A variable is declared twice
    #[error("Variable ${name} is already declared, at {pos}")]
    DuplicateVariable { name: String, pos: SourcePosition },

    /// An expression does not have the type its position requires
    #[error("Type mismatch at {pos}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: String,
        found: ValueType,
        pos: SourcePosition,
    },

    /// An account, asset or portion literal is malformed
    #[error("Malformed literal {literal} at {pos}: {reason}")]
    MalformedLiteral {
        literal: String,
        reason: String,
        pos: SourcePosition,
    },

    /// The literal portions of an allotment add up to more than 100%
    #[error("Allotment portions add up to {total}, more than 100%, at {pos}")]
    PortionOverflow { total: String, pos: SourcePosition },

    /// A source breaks the overdraft or draining rules
    #[error("Invalid source at {pos}: {reason}")]
    InvalidSource { reason: String, pos: SourcePosition },

    /// An expression is not allowed where it appears
    #[error("Invalid expression at {pos}: {reason}")]
    InvalidExpression { reason: String, pos: SourcePosition },

    /// The script declares more variables than a program can hold
    #[error("Too many variables: {count}, the limit is {limit}")]
    TooManyVariables { count: usize, limit: usize },
}

impl TypeError {
    /// Where the error was found, if it points at the source
    pub fn pos(&self) -> Option<SourcePosition> {
        match self {
            TypeError::UndeclaredVariable { pos, .. }
            | TypeError::DuplicateVariable { pos, .. }
            | TypeError::TypeMismatch { pos, .. }
            | TypeError::MalformedLiteral { pos, .. }
            | TypeError::PortionOverflow { pos, .. }
            | TypeError::InvalidSource { pos, .. }
            | TypeError::InvalidExpression { pos, .. } => Some(*pos),
            TypeError::TooManyVariables { .. } => None,
        }
    }
}

/// A script that passed type checking, with the type of every variable
#[derive(Debug, Clone)]
pub struct TypedScript<'a> {
    pub script: &'a Script,
    types: HashMap<String, ValueType>,
}

impl<'a> TypedScript<'a> {
    /// Declared type of a variable
    pub fn var_type(&self, name: &str) -> Option<ValueType> {
        self.types.get(name).copied()
    }

    /// Type of an expression that has already been checked
    pub fn type_of(&self, expr: &Expr) -> Option<ValueType> {
        match &expr.kind {
            ExprKind::Literal(literal) => Some(literal_type(literal)),
            ExprKind::Variable(name) => self.var_type(name),
            ExprKind::Binary { lhs, .. } => self.type_of(lhs),
        }
    }
}

fn literal_type(literal: &Literal) -> ValueType {
    match literal {
        Literal::Account(_) => ValueType::Account,
        Literal::Asset(_) => ValueType::Asset,
        Literal::Number(_) => ValueType::Number,
        Literal::String(_) => ValueType::String,
        Literal::Portion(_) => ValueType::Portion,
        Literal::Monetary { .. } => ValueType::Monetary,
    }
}

/// Facts about a source needed to validate the sources around it
#[derive(Debug, Default)]
struct SourceFacts {
    /// Accounts whose whole balance the source takes
    emptied: BTreeSet<String>,
    /// Whether the source can provide any amount
    unbounded: bool,
}

/// Check a script, returning it annotated with variable types
pub fn check(script: &Script) -> Result<TypedScript<'_>, TypeError> {
    let mut checker = Checker::default();
    checker.declare(&script.vars)?;
    for statement in &script.statements {
        checker.statement(statement)?;
    }

    for var in &script.vars {
        if !checker.used.contains(&var.name) {
            warn!("Variable ${} declared at {} is never used", var.name, var.pos);
        }
    }

    Ok(TypedScript {
        script,
        types: checker.types,
    })
}

#[derive(Debug, Default)]
struct Checker {
    types: HashMap<String, ValueType>,
    used: HashSet<String>,
}

impl Checker {
    fn declare(&mut self, vars: &[VarDecl]) -> Result<(), TypeError> {
        if vars.len() > MAX_VARIABLES {
            return Err(TypeError::TooManyVariables {
                count: vars.len(),
                limit: MAX_VARIABLES,
            });
        }

        for var in vars {
            if self.types.contains_key(&var.name) {
                return Err(TypeError::DuplicateVariable {
                    name: var.name.clone(),
                    pos: var.pos,
                });
            }

            match &var.origin {
                None => {}
                Some(Origin::Meta { account, .. }) => {
                    self.expect(account, ValueType::Account)?;
                }
                Some(Origin::Balance { account, asset }) => {
                    if var.ty != ValueType::Monetary {
                        return Err(TypeError::TypeMismatch {
                            expected: "monetary for a balance() origin".to_string(),
                            found: var.ty,
                            pos: var.pos,
                        });
                    }
                    self.expect(account, ValueType::Account)?;
                    if account.is_world() {
                        return Err(TypeError::InvalidExpression {
                            reason: "the balance of @world cannot be read".to_string(),
                            pos: account.pos,
                        });
                    }
                    self.expect(asset, ValueType::Asset)?;
                }
            }

            self.types.insert(var.name.clone(), var.ty);
        }

        Ok(())
    }

    fn expr_type(&mut self, expr: &Expr) -> Result<ValueType, TypeError> {
        match &expr.kind {
            ExprKind::Literal(literal) => self.literal(literal, expr.pos),
            ExprKind::Variable(name) => match self.types.get(name) {
                Some(ty) => {
                    self.used.insert(name.clone());
                    Ok(*ty)
                }
                None => Err(TypeError::UndeclaredVariable {
                    name: name.clone(),
                    pos: expr.pos,
                }),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let ty = self.expr_type(lhs)?;
                if !matches!(ty, ValueType::Number | ValueType::Monetary) {
                    return Err(TypeError::TypeMismatch {
                        expected: format!("number or monetary operand for '{}'", op.symbol()),
                        found: ty,
                        pos: lhs.pos,
                    });
                }
                self.expect(rhs, ty)?;
                Ok(ty)
            }
        }
    }

    fn literal(&mut self, literal: &Literal, pos: SourcePosition) -> Result<ValueType, TypeError> {
        let malformed = |literal: String, reason: String| TypeError::MalformedLiteral {
            literal,
            reason,
            pos,
        };

        match literal {
            Literal::Account(name) => {
                Account::parse(name).map_err(|e| malformed(format!("@{}", name), e.to_string()))?;
            }
            Literal::Asset(name) => {
                Asset::parse(name).map_err(|e| malformed(name.clone(), e.to_string()))?;
            }
            Literal::Portion(ratio) => {
                Portion::specific(ratio.clone())
                    .map_err(|e| malformed(literal.to_string(), e.to_string()))?;
            }
            Literal::Monetary { asset, .. } => {
                self.expect(asset, ValueType::Asset)?;
            }
            Literal::Number(_) | Literal::String(_) => {}
        }

        Ok(literal_type(literal))
    }

    fn expect(&mut self, expr: &Expr, expected: ValueType) -> Result<(), TypeError> {
        let found = self.expr_type(expr)?;
        if found != expected {
            return Err(TypeError::TypeMismatch {
                expected: expected.to_string(),
                found,
                pos: expr.pos,
            });
        }
        Ok(())
    }

    fn amount(&mut self, amount: &SendAmount) -> Result<bool, TypeError> {
        match amount {
            SendAmount::Monetary(expr) => {
                self.expect(expr, ValueType::Monetary)?;
                Ok(false)
            }
            SendAmount::All { asset } => {
                self.expect(asset, ValueType::Asset)?;
                Ok(true)
            }
        }
    }

    fn statement(&mut self, statement: &Statement) -> Result<(), TypeError> {
        match statement {
            Statement::Send {
                amount,
                source,
                destination,
                ..
            } => {
                let is_all = self.amount(amount)?;
                self.value_aware_source(source, is_all)?;
                self.destination(destination)
            }
            Statement::Save {
                amount, account, ..
            } => {
                self.amount(amount)?;
                self.expect(account, ValueType::Account)
            }
            Statement::SetTxMeta { value, .. } => self.expr_type(value).map(|_| ()),
            Statement::SetAccountMeta { account, value, .. } => {
                self.expect(account, ValueType::Account)?;
                self.expr_type(value).map(|_| ())
            }
            Statement::Print { value, .. } => self.expr_type(value).map(|_| ()),
            Statement::Fail { .. } => Ok(()),
        }
    }

    fn value_aware_source(
        &mut self,
        source: &ValueAwareSource,
        is_all: bool,
    ) -> Result<(), TypeError> {
        match source {
            ValueAwareSource::Source(source) => self.source(source, is_all).map(|_| ()),
            ValueAwareSource::Allotment { clauses, pos } => {
                if is_all {
                    return Err(TypeError::InvalidSource {
                        reason: "cannot split a send of the whole balance".to_string(),
                        pos: *pos,
                    });
                }
                self.allotment(clauses, *pos)?;
                for clause in clauses {
                    self.value_aware_source(&clause.target, false)?;
                }
                Ok(())
            }
        }
    }

    fn source(&mut self, source: &Source, is_all: bool) -> Result<SourceFacts, TypeError> {
        match source {
            Source::Account { account, overdraft } => {
                self.expect(account, ValueType::Account)?;
                let world = account.is_world();
                let mut unbounded = world;
                match overdraft {
                    Some(_) if world => {
                        return Err(TypeError::InvalidSource {
                            reason: "@world already has an unbounded overdraft".to_string(),
                            pos: account.pos,
                        });
                    }
                    Some(Overdraft::Bounded(limit)) => self.expect(limit, ValueType::Monetary)?,
                    Some(Overdraft::Unbounded) => unbounded = true,
                    None => {}
                }
                if is_all && unbounded {
                    return Err(TypeError::InvalidSource {
                        reason: "cannot send the whole balance of an unbounded source"
                            .to_string(),
                        pos: account.pos,
                    });
                }

                let mut emptied = BTreeSet::new();
                emptied.insert(account.to_string());
                Ok(SourceFacts { emptied, unbounded })
            }
            Source::Maxed { max, source } => {
                self.expect(max, ValueType::Monetary)?;
                self.source(source, false)?;
                Ok(SourceFacts::default())
            }
            Source::InOrder { sources, .. } => {
                let mut facts = SourceFacts::default();
                for (i, source) in sources.iter().enumerate() {
                    let sub = self.source(source, is_all)?;
                    if sub.unbounded && i + 1 < sources.len() {
                        return Err(TypeError::InvalidSource {
                            reason: "an unbounded source must come last".to_string(),
                            pos: source.pos(),
                        });
                    }
                    for account in sub.emptied {
                        if facts.emptied.contains(&account) {
                            return Err(TypeError::InvalidSource {
                                reason: format!("{} is already emptied by this source", account),
                                pos: source.pos(),
                            });
                        }
                        facts.emptied.insert(account);
                    }
                    facts.unbounded = sub.unbounded;
                }
                Ok(facts)
            }
        }
    }

    fn allotment<T>(
        &mut self,
        clauses: &[AllotmentClause<T>],
        pos: SourcePosition,
    ) -> Result<(), TypeError> {
        let mut total = BigRational::from_integer(0.into());
        for clause in clauses {
            match &clause.portion {
                AllotmentPortion::Literal(ratio) => {
                    Portion::specific(ratio.clone()).map_err(|e| TypeError::MalformedLiteral {
                        literal: clause.portion.to_string(),
                        reason: e.to_string(),
                        pos: clause.pos,
                    })?;
                    total += ratio;
                }
                AllotmentPortion::Variable(name) => {
                    let expr = Expr::new(ExprKind::Variable(name.clone()), clause.pos);
                    self.expect(&expr, ValueType::Portion)?;
                }
                AllotmentPortion::Remaining => {}
            }
        }

        if total > BigRational::one() {
            return Err(TypeError::PortionOverflow {
                total: crate::typed::format_ratio(&total),
                pos,
            });
        }
        Ok(())
    }

    fn destination(&mut self, destination: &Destination) -> Result<(), TypeError> {
        match destination {
            Destination::Account(account) => self.expect(account, ValueType::Account),
            Destination::InOrder {
                clauses, remaining, ..
            } => {
                for (max, target) in clauses {
                    self.expect(max, ValueType::Monetary)?;
                    self.kept_or_destination(target)?;
                }
                self.kept_or_destination(remaining)
            }
            Destination::Allotment { clauses, pos } => {
                self.allotment(clauses, *pos)?;
                for clause in clauses {
                    self.kept_or_destination(&clause.target)?;
                }
                Ok(())
            }
        }
    }

    fn kept_or_destination(&mut self, target: &KeptOrDestination) -> Result<(), TypeError> {
        match target {
            KeptOrDestination::Kept => Ok(()),
            KeptOrDestination::Destination(destination) => self.destination(destination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    fn check_source(source: &str) -> Result<(), TypeError> {
        let script = parse(source).unwrap();
        check(&script).map(|_| ())
    }

    #[test]
    fn test_check_valid_script() {
        let script = parse(
            r#"
            vars {
                account $dest
                portion $rate
                monetary $fee = meta(@config, "fee")
            }
            send [COIN 99] (
                source = {
                    $rate from @alice
                    remaining from { @bob @world }
                }
                destination = { max $fee to @fees remaining to $dest }
            )
            "#,
        )
        .unwrap();
        let typed = check(&script).unwrap();
        assert_eq!(typed.var_type("dest"), Some(ValueType::Account));
        assert_eq!(typed.var_type("fee"), Some(ValueType::Monetary));
    }

    #[test]
    fn test_check_variables() {
        assert!(matches!(
            check_source("send [COIN 1] (source = $a destination = @b)"),
            Err(TypeError::UndeclaredVariable { name, .. }) if name == "a"
        ));
        assert!(matches!(
            check_source("vars { account $a asset $a }\nprint $a"),
            Err(TypeError::DuplicateVariable { .. })
        ));
        assert!(matches!(
            check_source("vars { number $n = balance(@a, COIN) }\nprint $n"),
            Err(TypeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            check_source("vars { monetary $m = balance(@world, COIN) }\nprint $m"),
            Err(TypeError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn test_check_type_mismatch() {
        let err = check_source(
            "vars { asset $dest }\nsend [COIN 1] (source = @a destination = $dest)",
        )
        .unwrap_err();
        match err {
            TypeError::TypeMismatch {
                expected, found, ..
            } => {
                assert_eq!(expected, "account");
                assert_eq!(found, ValueType::Asset);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(check_source("print [COIN 1] + 2").is_err());
        assert!(check_source("print \"a\" + \"b\"").is_err());
        assert!(check_source("print 1 + 2 - 3").is_ok());
    }

    #[test]
    fn test_check_malformed_literals() {
        assert!(matches!(
            check_source("send [COIN 1] (source = @123abc destination = @b)"),
            Err(TypeError::MalformedLiteral { .. })
        ));
        assert!(matches!(
            check_source("print 3/2"),
            Err(TypeError::MalformedLiteral { .. })
        ));
    }

    #[test]
    fn test_check_portion_overflow() {
        let err = check_source(
            "send [COIN 100] (source = @world destination = { 60% to @a 50% to @b })",
        )
        .unwrap_err();
        assert!(matches!(err, TypeError::PortionOverflow { ref total, .. } if total == "110%"));

        // underflow is allowed
        assert!(check_source(
            "send [COIN 100] (source = @world destination = { 60% to @a 30% to @b })"
        )
        .is_ok());
    }

    #[test]
    fn test_check_source_rules() {
        assert!(matches!(
            check_source("send [COIN 1] (source = @world allowing overdraft up to [COIN 5] destination = @b)"),
            Err(TypeError::InvalidSource { .. })
        ));
        assert!(matches!(
            check_source("send [COIN 1] (source = { @world @a } destination = @b)"),
            Err(TypeError::InvalidSource { .. })
        ));
        assert!(matches!(
            check_source("send [COIN 1] (source = { @a @b @a } destination = @c)"),
            Err(TypeError::InvalidSource { .. })
        ));
        assert!(matches!(
            check_source("send [COIN *] (source = @a allowing unbounded overdraft destination = @c)"),
            Err(TypeError::InvalidSource { .. })
        ));
        assert!(matches!(
            check_source("send [COIN *] (source = { 50% from @a remaining from @b } destination = @c)"),
            Err(TypeError::InvalidSource { .. })
        ));
        assert!(check_source(
            "send [COIN 1] (source = { max [COIN 1] from @a @a @world } destination = @c)"
        )
        .is_ok());
    }
}
