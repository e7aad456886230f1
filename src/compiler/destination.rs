//! Lowering of destinations
//!
//! A destination consumes the funding on top of the stack and leaves the
//! part of it that was kept, which the enclosing `send` repays to the
//! source accounts.

use super::ast::{Destination, KeptOrDestination};
use super::emitter::Emitter;
use super::CompileError;
use crate::program::Instruction;
use crate::typed::Value;
use num_bigint::BigInt;

impl Emitter<'_> {
    pub(super) fn destination(&mut self, destination: &Destination) -> Result<(), CompileError> {
        match destination {
            Destination::Account(account) => {
                self.emit(Instruction::FundingSum);
                self.emit(Instruction::Take);
                self.expr(account)?;
                self.emit(Instruction::Send);
            }
            Destination::Allotment { clauses, .. } => {
                self.emit(Instruction::FundingSum);
                for clause in clauses.iter().rev() {
                    let portion = self.portion(&clause.portion)?;
                    self.push(portion);
                }
                self.emit(Instruction::MakeAllotment(clauses.len()));
                self.emit(Instruction::Alloc);
                self.emit(Instruction::Bump(clauses.len()));
                // each share is taken from the funding, the kept part
                // joining the remainder
                for clause in clauses {
                    self.emit(Instruction::Bump(1));
                    self.emit(Instruction::Take);
                    self.kept_or_destination(&clause.target)?;
                    self.emit(Instruction::FundingAssemble(2));
                }
            }
            Destination::InOrder {
                clauses, remaining, ..
            } => {
                // start an empty kept funding under the one being split
                self.emit(Instruction::FundingSum);
                self.emit(Instruction::Asset);
                let zero = self.constant(Value::Number(BigInt::from(0)))?;
                self.push(zero);
                self.emit(Instruction::MonetaryNew);
                self.emit(Instruction::TakeMax);
                self.emit(Instruction::Bump(2));
                self.emit(Instruction::Delete);
                self.emit(Instruction::Bump(1));

                for (max, target) in clauses {
                    self.expr(max)?;
                    self.emit(Instruction::TakeMax);
                    self.emit(Instruction::Bump(2));
                    self.emit(Instruction::Delete);
                    self.kept_or_destination(target)?;
                    self.emit(Instruction::Bump(2));
                    self.emit(Instruction::Bump(1));
                    self.emit(Instruction::FundingAssemble(2));
                    self.emit(Instruction::Bump(1));
                }

                self.kept_or_destination(remaining)?;
                self.emit(Instruction::FundingAssemble(2));
            }
        }
        Ok(())
    }

    fn kept_or_destination(&mut self, target: &KeptOrDestination) -> Result<(), CompileError> {
        match target {
            KeptOrDestination::Kept => Ok(()),
            KeptOrDestination::Destination(destination) => self.destination(destination),
        }
    }
}
