mod test_helpers;

use num_bigint::BigInt;
use numscript::vm::{RequestId, RequestKind, ResolutionRequest};
use numscript::{
    compile, Account, Asset, ExitCode, Machine, MachineState, Portion, ResolutionError, Value,
    ValueType,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use test_helpers::postings;

const DEPENDENT: &str = r#"
vars {
    account $src = meta(@config, "source")
    monetary $max = balance($src, COIN)
}
send $max (source = $src destination = @bob)
"#;

const TWO_KEYS: &str = r#"
vars {
    account $src = meta(@config, "source")
    account $dst = meta(@config, "destination")
}
send [COIN 1] (source = $src destination = $dst)
"#;

fn bound(source: &str) -> Result<Machine, Box<dyn Error>> {
    let mut machine = Machine::new(compile(source)?);
    machine.set_vars(BTreeMap::new())?;
    Ok(machine)
}

fn account(name: &str) -> Value {
    Value::Account(Account::parse(name).unwrap())
}

#[test]
fn test_dependent_resources_come_in_later_batches() -> Result<(), Box<dyn Error>> {
    let mut machine = bound(DEPENDENT)?;

    {
        let mut channel = machine.resolve_resources()?;
        let first = channel.next_batch()?;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].account.as_str(), "config");
        assert_eq!(
            first[0].kind,
            RequestKind::Metadata {
                key: "source".to_string(),
                ty: ValueType::Account,
            }
        );
        channel.respond(first[0].id, account("alice"))?;

        // the balance needs the account resolved above
        let second = channel.next_batch()?;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].kind, RequestKind::Balance);
        assert_eq!(second[0].account.as_str(), "alice");
        assert_eq!(second[0].asset, Some(Asset::parse("COIN")?));
        channel.respond_json(second[0].id, &json!(70))?;

        assert!(channel.next_batch()?.is_empty());
        assert!(channel.is_done());
    }
    assert_eq!(machine.state(), MachineState::ResourcesResolved);

    {
        let mut channel = machine.resolve_balances()?;
        let batch = channel.next_batch()?;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].account.as_str(), "alice");
        channel.respond_json(batch[0].id, &json!("70"))?;
        assert!(channel.next_batch()?.is_empty());
    }
    assert_eq!(machine.state(), MachineState::BalancesResolved);

    assert_eq!(machine.execute()?, ExitCode::Ok);
    assert_eq!(postings(&machine), vec!["@alice -> @bob: [COIN 70]"]);
    Ok(())
}

#[test]
fn test_answers_in_any_order() -> Result<(), Box<dyn Error>> {
    let mut machine = bound(TWO_KEYS)?;

    {
        let mut channel = machine.resolve_resources()?;
        let batch = channel.next_batch()?;
        assert_eq!(batch.len(), 2);
        channel.respond(batch[1].id, account("bob"))?;
        channel.respond(batch[0].id, account("alice"))?;
        assert!(channel.next_batch()?.is_empty());
    }

    let mut answers = |request: &ResolutionRequest| -> Result<Value, String> {
        assert_eq!(request.kind, RequestKind::Balance);
        Ok(Value::Number(BigInt::from(5)))
    };
    machine.resolve_balances()?.drive(&mut answers)?;
    machine.execute()?;
    assert_eq!(postings(&machine), vec!["@alice -> @bob: [COIN 1]"]);
    Ok(())
}

#[test]
fn test_batch_must_be_answered() -> Result<(), Box<dyn Error>> {
    let mut machine = bound(TWO_KEYS)?;
    let mut channel = machine.resolve_resources()?;

    let batch = channel.next_batch()?;
    channel.respond(batch[0].id, account("alice"))?;
    assert_eq!(channel.next_batch(), Err(ResolutionError::Unanswered(1)));
    assert_eq!(
        channel.respond(RequestId(99), account("bob")),
        Err(ResolutionError::UnknownRequest(RequestId(99)))
    );

    // still usable after a protocol mistake
    channel.respond(batch[1].id, account("bob"))?;
    assert!(channel.next_batch()?.is_empty());
    Ok(())
}

#[test]
fn test_balance_requests_are_sorted() -> Result<(), Box<dyn Error>> {
    let mut machine = bound(
        r#"send [COIN 10] (
            source = {
                @zed
                @amy
                @world
            }
            destination = @bob
        )"#,
    )?;
    machine.resolve_resources()?.drive(&mut numscript::InMemoryResolver::new())?;

    let mut channel = machine.resolve_balances()?;
    let batch = channel.next_batch()?;
    let accounts: Vec<&str> = batch.iter().map(|r| r.account.as_str()).collect();
    assert_eq!(accounts, vec!["amy", "zed"]);
    Ok(())
}

#[test]
fn test_reject_aborts_machine() -> Result<(), Box<dyn Error>> {
    let mut machine = bound(TWO_KEYS)?;

    {
        let mut channel = machine.resolve_resources()?;
        let batch = channel.next_batch()?;
        let err = channel.reject(batch[0].id, "ledger unavailable");
        assert!(matches!(err, ResolutionError::Rejected { .. }));
        assert!(channel.is_done());
        assert!(channel.next_batch()?.is_empty());
    }

    assert_eq!(machine.state(), MachineState::Failed);
    assert!(machine.resolve_balances().is_err());
    assert!(machine.execute().is_err());
    Ok(())
}

#[test]
fn test_cancel_aborts_machine() -> Result<(), Box<dyn Error>> {
    let mut machine = bound(TWO_KEYS)?;
    let mut channel = machine.resolve_resources()?;
    channel.next_batch()?;
    channel.cancel();
    assert_eq!(machine.state(), MachineState::Failed);
    Ok(())
}

#[test]
fn test_dropped_channel_aborts_machine() -> Result<(), Box<dyn Error>> {
    let mut machine = bound(TWO_KEYS)?;
    {
        let mut channel = machine.resolve_resources()?;
        channel.next_batch()?;
    }
    assert_eq!(machine.state(), MachineState::Failed);
    Ok(())
}

#[test]
fn test_wrong_metadata_type_aborts() -> Result<(), Box<dyn Error>> {
    let mut machine = bound(TWO_KEYS)?;
    {
        let mut channel = machine.resolve_resources()?;
        let batch = channel.next_batch()?;
        let err = channel
            .respond(batch[0].id, Value::Number(BigInt::from(1)))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::UnexpectedType { .. }));
    }
    assert_eq!(machine.state(), MachineState::Failed);
    Ok(())
}

#[test]
fn test_remaining_portion_from_metadata_aborts() -> Result<(), Box<dyn Error>> {
    let mut machine = bound(
        r#"vars {
            portion $cut = meta(@config, "cut")
        }
        send [COIN 10] (source = @world destination = { $cut to @a remaining to @b })"#,
    )?;
    {
        let mut channel = machine.resolve_resources()?;
        let batch = channel.next_batch()?;
        let err = channel
            .respond(batch[0].id, Value::Portion(Portion::Remaining))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidValue { .. }));
    }
    assert_eq!(machine.state(), MachineState::Failed);
    Ok(())
}

#[test]
fn test_negative_balance_variable_is_rejected() -> Result<(), Box<dyn Error>> {
    let mut machine = bound(DEPENDENT)?;
    {
        let mut channel = machine.resolve_resources()?;
        let batch = channel.next_batch()?;
        channel.respond(batch[0].id, account("alice"))?;
        let batch = channel.next_batch()?;
        let err = channel.respond_json(batch[0].id, &json!(-5)).unwrap_err();
        assert!(matches!(err, ResolutionError::NegativeBalance { .. }));
    }
    assert_eq!(machine.state(), MachineState::Failed);
    Ok(())
}

#[test]
fn test_no_requests_without_external_resources() -> Result<(), Box<dyn Error>> {
    let mut machine = Machine::new(compile("send [COIN 1] (source = @world destination = @a)")?);
    let mut channel = machine.resolve_resources()?;
    assert!(channel.next_batch()?.is_empty());
    drop(channel);
    assert_eq!(machine.state(), MachineState::ResourcesResolved);
    Ok(())
}
