//! Lowering of a checked script into a `Program`
//!
//! Literals become constant resources, deduplicated by value. Variables
//! become resources in declaration order. Sources and destinations are
//! lowered in `source.rs` and `destination.rs`.

use super::ast::*;
use super::checker::TypedScript;
use super::CompileError;
use crate::program::{Address, Instruction, Program, Resource};
use crate::typed::{Account, Asset, Portion, Value, ValueType};
use num_bigint::BigInt;
use std::collections::{BTreeSet, HashMap};

/// Maximum number of resources a program can address
pub const MAX_RESOURCES: usize = 65_536;

/// Lower a checked script into a program
pub fn emit(typed: &TypedScript<'_>) -> Result<Program, CompileError> {
    let mut emitter = Emitter {
        typed,
        program: Program::default(),
        variables: HashMap::new(),
        literals: HashMap::new(),
    };
    emitter.declare(&typed.script.vars)?;
    for statement in &typed.script.statements {
        emitter.statement(statement)?;
    }
    Ok(emitter.program)
}

pub(super) fn internal(message: impl Into<String>) -> CompileError {
    CompileError::Internal(message.into())
}

pub(super) struct Emitter<'a> {
    typed: &'a TypedScript<'a>,
    program: Program,
    variables: HashMap<String, Address>,
    /// Constant and monetary resources already allocated
    literals: HashMap<Resource, Address>,
}

impl<'a> Emitter<'a> {
    pub(super) fn emit(&mut self, instruction: Instruction) {
        self.program.instructions.push(instruction);
    }

    pub(super) fn push(&mut self, address: Address) {
        self.emit(Instruction::Push(address));
    }

    fn allocate(&mut self, resource: Resource) -> Result<Address, CompileError> {
        let shared = matches!(resource, Resource::Constant { .. } | Resource::Monetary { .. });
        if shared {
            if let Some(address) = self.literals.get(&resource) {
                return Ok(*address);
            }
        }

        let index = self.program.resources.len();
        if index >= MAX_RESOURCES {
            return Err(CompileError::ResourceLimit {
                limit: MAX_RESOURCES,
            });
        }
        let address = Address(index as u16);
        if shared {
            self.literals.insert(resource.clone(), address);
        }
        self.program.resources.push(resource);
        Ok(address)
    }

    pub(super) fn constant(&mut self, value: Value) -> Result<Address, CompileError> {
        self.allocate(Resource::Constant { value })
    }

    fn declare(&mut self, vars: &[VarDecl]) -> Result<(), CompileError> {
        for var in vars {
            let resource = match &var.origin {
                None => Resource::Variable {
                    name: var.name.clone(),
                    ty: var.ty,
                },
                Some(Origin::Meta { account, key }) => Resource::VariableAccountMetadata {
                    name: var.name.clone(),
                    ty: var.ty,
                    account: self.address(account)?,
                    key: key.clone(),
                },
                Some(Origin::Balance { account, asset }) => Resource::VariableAccountBalance {
                    name: var.name.clone(),
                    account: self.address(account)?,
                    asset: self.address(asset)?,
                },
            };
            let address = self.allocate(resource)?;
            self.variables.insert(var.name.clone(), address);
        }
        Ok(())
    }

    /// Resource holding the value of a literal or variable
    pub(super) fn address(&mut self, expr: &Expr) -> Result<Address, CompileError> {
        match &expr.kind {
            ExprKind::Literal(literal) => self.literal(literal),
            ExprKind::Variable(name) => self
                .variables
                .get(name)
                .copied()
                .ok_or_else(|| internal(format!("variable ${} has no resource", name))),
            ExprKind::Binary { .. } => Err(internal(format!(
                "expression at {} has no resource",
                expr.pos
            ))),
        }
    }

    fn literal(&mut self, literal: &Literal) -> Result<Address, CompileError> {
        let value = match literal {
            Literal::Account(name) => {
                Value::Account(Account::parse(name).map_err(|e| internal(e.to_string()))?)
            }
            Literal::Asset(name) => {
                Value::Asset(Asset::parse(name).map_err(|e| internal(e.to_string()))?)
            }
            Literal::Number(n) => Value::Number(n.clone()),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Portion(ratio) => Value::Portion(
                Portion::specific(ratio.clone()).map_err(|e| internal(e.to_string()))?,
            ),
            Literal::Monetary { asset, amount } => {
                let asset = self.address(asset)?;
                return self.allocate(Resource::Monetary {
                    asset,
                    amount: amount.clone(),
                });
            }
        };
        self.constant(value)
    }

    /// Resource whose value carries the asset of a monetary expression
    pub(super) fn asset_address(&mut self, expr: &Expr) -> Result<Address, CompileError> {
        match &expr.kind {
            ExprKind::Literal(Literal::Monetary { asset, .. }) => self.address(asset),
            ExprKind::Variable(_) => self.address(expr),
            ExprKind::Binary { lhs, .. } => self.asset_address(lhs),
            ExprKind::Literal(_) => Err(internal(format!(
                "expression at {} is not monetary",
                expr.pos
            ))),
        }
    }

    /// Push the value of an expression
    pub(super) fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Variable(_) => {
                let address = self.address(expr)?;
                self.push(address);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                let instruction = match (self.typed.type_of(lhs), op) {
                    (Some(ValueType::Number), BinaryOp::Add) => Instruction::IAdd,
                    (Some(ValueType::Number), BinaryOp::Sub) => Instruction::ISub,
                    (Some(ValueType::Monetary), BinaryOp::Add) => Instruction::MonetaryAdd,
                    (Some(ValueType::Monetary), BinaryOp::Sub) => Instruction::MonetarySub,
                    (ty, _) => {
                        return Err(internal(format!(
                            "no '{}' operator for {:?} at {}",
                            op.symbol(),
                            ty,
                            expr.pos
                        )))
                    }
                };
                self.emit(instruction);
            }
        }
        Ok(())
    }

    /// Push the asset held by a resource
    pub(super) fn push_asset(&mut self, asset: Address) {
        self.push(asset);
        self.emit(Instruction::Asset);
    }

    /// Push a zero monetary of the asset held by a resource
    pub(super) fn push_zero(&mut self, asset: Address) -> Result<(), CompileError> {
        self.push_asset(asset);
        let zero = self.constant(Value::Number(BigInt::from(0)))?;
        self.push(zero);
        self.emit(Instruction::MonetaryNew);
        Ok(())
    }

    pub(super) fn portion(&mut self, portion: &AllotmentPortion) -> Result<Address, CompileError> {
        match portion {
            AllotmentPortion::Literal(ratio) => self.constant(Value::Portion(
                Portion::specific(ratio.clone()).map_err(|e| internal(e.to_string()))?,
            )),
            AllotmentPortion::Variable(name) => self
                .variables
                .get(name)
                .copied()
                .ok_or_else(|| internal(format!("variable ${} has no resource", name))),
            AllotmentPortion::Remaining => self.constant(Value::Portion(Portion::Remaining)),
        }
    }

    /// Whether a resource is the literal `@world`
    pub(super) fn is_world(&self, address: Address) -> bool {
        matches!(
            self.program.resources.get(address.index()),
            Some(Resource::Constant { value: Value::Account(account) }) if account.is_world()
        )
    }

    /// Record that the balances of these accounts in an asset are needed
    pub(super) fn need_balances(&mut self, accounts: &BTreeSet<Address>, asset: Address) {
        for account in accounts {
            self.program
                .needed_balances
                .entry(*account)
                .or_default()
                .insert(asset);
        }
    }

    pub(super) fn mark_sources(&mut self, accounts: &BTreeSet<Address>) {
        self.program.sources.extend(accounts.iter().copied());
    }

    fn statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Send {
                amount,
                source,
                destination,
                ..
            } => {
                match amount {
                    SendAmount::Monetary(expr) => {
                        let asset = self.asset_address(expr)?;
                        self.expr(expr)?;
                        self.value_aware_source(source, asset)?;
                    }
                    SendAmount::All { asset } => {
                        let asset = self.address(asset)?;
                        match source {
                            ValueAwareSource::Source(source) => self.all_from_source(source, asset)?,
                            ValueAwareSource::Allotment { pos, .. } => {
                                return Err(internal(format!(
                                    "allotment at {} cannot send the whole balance",
                                    pos
                                )))
                            }
                        }
                    }
                }
                self.destination(destination)?;
                self.emit(Instruction::Repay);
            }
            Statement::Save {
                amount, account, ..
            } => {
                let asset = match amount {
                    SendAmount::Monetary(expr) => {
                        let asset = self.asset_address(expr)?;
                        self.expr(expr)?;
                        asset
                    }
                    SendAmount::All { asset } => {
                        let asset = self.address(asset)?;
                        self.push(asset);
                        asset
                    }
                };
                let account = self.address(account)?;
                self.push(account);
                self.emit(Instruction::Save);
                self.need_balances(&BTreeSet::from([account]), asset);
            }
            Statement::SetTxMeta { key, value, .. } => {
                self.expr(value)?;
                let key = self.constant(Value::String(key.clone()))?;
                self.push(key);
                self.emit(Instruction::TxMeta);
            }
            Statement::SetAccountMeta {
                account,
                key,
                value,
                ..
            } => {
                self.expr(value)?;
                let key = self.constant(Value::String(key.clone()))?;
                self.push(key);
                self.expr(account)?;
                self.emit(Instruction::AccountMeta);
            }
            Statement::Print { value, .. } => {
                self.expr(value)?;
                self.emit(Instruction::Print);
            }
            Statement::Fail { .. } => self.emit(Instruction::Fail),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::compile;
    use super::*;

    #[test]
    fn test_emit_simple_send() {
        let program = compile("send [COIN 10] (source = @alice destination = @bob)").unwrap();

        assert_eq!(
            program.resources,
            vec![
                Resource::Constant {
                    value: Value::Asset(Asset::parse("COIN").unwrap())
                },
                Resource::Monetary {
                    asset: Address(0),
                    amount: BigInt::from(10)
                },
                Resource::Constant {
                    value: Value::Account(Account::parse("alice").unwrap())
                },
                Resource::Constant {
                    value: Value::Number(BigInt::from(0))
                },
                Resource::Constant {
                    value: Value::Account(Account::parse("bob").unwrap())
                },
            ]
        );
        assert_eq!(
            program.instructions,
            vec![
                Instruction::Push(Address(1)),
                Instruction::Push(Address(2)),
                Instruction::Push(Address(0)),
                Instruction::Asset,
                Instruction::Push(Address(3)),
                Instruction::MonetaryNew,
                Instruction::TakeAll,
                Instruction::Bump(1),
                Instruction::Take,
                Instruction::Bump(1),
                Instruction::Repay,
                Instruction::FundingSum,
                Instruction::Take,
                Instruction::Push(Address(4)),
                Instruction::Send,
                Instruction::Repay,
            ]
        );
        assert_eq!(program.sources, BTreeSet::from([Address(2)]));
        assert_eq!(
            program.needed_balances.get(&Address(2)),
            Some(&BTreeSet::from([Address(0)]))
        );
    }

    #[test]
    fn test_emit_deduplicates_constants() {
        let program = compile(
            "send [COIN 10] (source = @alice destination = @bob)\nsend [COIN 10] (source = @alice destination = @bob)",
        )
        .unwrap();
        assert_eq!(program.resources.len(), 5);
    }

    #[test]
    fn test_emit_deduplicates_across_many_statements() {
        let once: String = (0..2_000)
            .map(|i| format!("send [COIN {}] (source = @world destination = @user:{})\n", i % 7, i))
            .collect();
        let twice = format!("{}{}", once, once);

        let first = compile(&once).unwrap();
        let second = compile(&twice).unwrap();
        assert_eq!(second.resources, first.resources);

        let unique: std::collections::HashSet<&Resource> = first.resources.iter().collect();
        assert_eq!(unique.len(), first.resources.len());
    }

    #[test]
    fn test_emit_variables_in_declaration_order() {
        let program = compile(
            r#"vars {
                account $a
                monetary $m = balance($a, COIN)
                number $n = meta($a, "n")
            }
            print $m
            print $n"#,
        )
        .unwrap();
        // only plain variables are bound by the caller
        assert_eq!(program.variables(), vec![("a", ValueType::Account)]);
        assert_eq!(program.external_resource_count(), 2);
        assert_eq!(
            program.resources[2],
            Resource::VariableAccountBalance {
                name: "m".to_string(),
                account: Address(0),
                asset: Address(1),
            }
        );
    }

    #[test]
    fn test_emit_arithmetic_and_meta() {
        let program = compile("set_tx_meta(\"total\", [COIN 1] + [COIN 2] - [COIN 3])").unwrap();
        let names: Vec<&str> = program.instructions.iter().map(|i| i.name()).collect();
        assert_eq!(
            names,
            vec!["PUSH", "PUSH", "MONETARY_ADD", "PUSH", "MONETARY_SUB", "PUSH", "TX_META"]
        );
    }
}
