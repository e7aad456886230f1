//! Lowering of sources
//!
//! A source is lowered in two steps. First every account of the source is
//! withdrawn in full, up to its overdraft, leaving the available funding on
//! the stack. Then the requested amount is taken from that funding and the
//! rest is repaid. An unbounded account is withdrawn as an empty funding
//! and returned as the fallback that covers any shortfall.

use super::ast::{Overdraft, Source, ValueAwareSource};
use super::emitter::{internal, Emitter};
use super::CompileError;
use crate::program::{Address, Instruction};
use std::collections::BTreeSet;

impl Emitter<'_> {
    /// Push the funding available from `source`
    ///
    /// Accounts withdrawn from are added to `accounts`. Returns the account
    /// that may be overdrawn without limit, if any.
    pub(super) fn source(
        &mut self,
        source: &Source,
        asset: Address,
        accounts: &mut BTreeSet<Address>,
    ) -> Result<Option<Address>, CompileError> {
        match source {
            Source::Account { account, overdraft } => {
                let address = self.address(account)?;
                accounts.insert(address);
                self.push(address);
                match overdraft {
                    None => {
                        self.push_zero(asset)?;
                        self.emit(Instruction::TakeAll);
                        Ok(self.is_world(address).then_some(address))
                    }
                    Some(Overdraft::Bounded(limit)) => {
                        self.expr(limit)?;
                        self.emit(Instruction::TakeAll);
                        Ok(None)
                    }
                    Some(Overdraft::Unbounded) => {
                        self.push_zero(asset)?;
                        self.emit(Instruction::TakeAll);
                        Ok(Some(address))
                    }
                }
            }
            Source::Maxed { max, source } => {
                let fallback = self.source(source, asset, accounts)?;
                self.expr(max)?;
                self.emit(Instruction::TakeMax);
                self.emit(Instruction::Bump(1));
                self.emit(Instruction::Repay);
                match fallback {
                    Some(fallback) => self.take_missing(fallback),
                    None => {
                        self.emit(Instruction::Bump(1));
                        self.emit(Instruction::Delete);
                    }
                }
                Ok(None)
            }
            Source::InOrder { sources, .. } => {
                let mut fallback = None;
                for (i, source) in sources.iter().enumerate() {
                    fallback = self.source(source, asset, accounts)?;
                    if fallback.is_some() && i + 1 < sources.len() {
                        return Err(internal("unbounded source is not last"));
                    }
                }
                self.emit(Instruction::FundingAssemble(sources.len()));
                Ok(fallback)
            }
        }
    }

    /// With `[missing, taken]` on the stack, draw the missing amount from
    /// the fallback account and leave the combined funding
    fn take_missing(&mut self, fallback: Address) {
        self.push(fallback);
        self.emit(Instruction::Bump(2));
        self.emit(Instruction::TakeAlways);
        self.emit(Instruction::FundingAssemble(2));
    }

    /// With `[funding, monetary]` on the stack, take exactly the monetary
    /// from the funding and repay the rest
    fn take_from_source(&mut self, fallback: Option<Address>) {
        match fallback {
            None => {
                self.emit(Instruction::Take);
                self.emit(Instruction::Bump(1));
                self.emit(Instruction::Repay);
            }
            Some(fallback) => {
                self.emit(Instruction::TakeMax);
                self.emit(Instruction::Bump(1));
                self.emit(Instruction::Repay);
                self.take_missing(fallback);
            }
        }
    }

    /// Replace the monetary on top of the stack by a funding of that amount
    pub(super) fn value_aware_source(
        &mut self,
        source: &ValueAwareSource,
        asset: Address,
    ) -> Result<(), CompileError> {
        match source {
            ValueAwareSource::Source(source) => {
                let mut accounts = BTreeSet::new();
                let fallback = self.source(source, asset, &mut accounts)?;
                self.mark_sources(&accounts);
                self.need_balances(&accounts, asset);
                self.emit(Instruction::Bump(1));
                self.take_from_source(fallback);
            }
            ValueAwareSource::Allotment { clauses, .. } => {
                for clause in clauses.iter().rev() {
                    let portion = self.portion(&clause.portion)?;
                    self.push(portion);
                }
                self.emit(Instruction::MakeAllotment(clauses.len()));
                self.emit(Instruction::Alloc);
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        self.emit(Instruction::Bump(i));
                    }
                    self.value_aware_source(&clause.target, asset)?;
                }
                self.emit(Instruction::FundingAssemble(clauses.len()));
            }
        }
        Ok(())
    }

    /// Push the whole funding available from a source
    pub(super) fn all_from_source(
        &mut self,
        source: &Source,
        asset: Address,
    ) -> Result<(), CompileError> {
        let mut accounts = BTreeSet::new();
        if self.source(source, asset, &mut accounts)?.is_some() {
            return Err(internal("cannot send the whole balance of an unbounded source"));
        }
        self.mark_sources(&accounts);
        self.need_balances(&accounts, asset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::compile;
    use crate::program::Instruction;

    fn instructions(source: &str) -> Vec<String> {
        compile(source)
            .unwrap()
            .instructions
            .iter()
            .map(|i| i.to_string())
            .collect()
    }

    #[test]
    fn test_world_source_falls_back_to_world() {
        let listing = instructions("send [COIN 10] (source = @world destination = @bob)");
        assert_eq!(
            &listing[7..15],
            &[
                "BUMP 1",
                "TAKE_MAX",
                "BUMP 1",
                "REPAY",
                "PUSH #2",
                "BUMP 2",
                "TAKE_ALWAYS",
                "FUNDING_ASSEMBLE 2"
            ]
        );
    }

    #[test]
    fn test_bounded_overdraft_uses_limit() {
        let program =
            compile("send [COIN 10] (source = @a allowing overdraft up to [COIN 5] destination = @b)")
                .unwrap();
        // the limit replaces the zero overdraft
        assert!(!program.instructions.contains(&Instruction::MonetaryNew));
        assert!(program.instructions.contains(&Instruction::TakeAll));
    }

    #[test]
    fn test_allotment_source_bumps_shares() {
        let program = compile(
            "send [COIN 10] (source = { 1/3 from @a 1/3 from @b remaining from @c } destination = @d)",
        )
        .unwrap();
        assert!(program.instructions.contains(&Instruction::MakeAllotment(3)));
        assert!(program.instructions.contains(&Instruction::Bump(2)));
        assert!(program.instructions.contains(&Instruction::FundingAssemble(3)));
        assert_eq!(program.sources.len(), 3);
    }
}
