mod test_helpers;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::One;
use numscript::{compile, Account, Allotment, Asset, InMemoryResolver, Machine, Portion, RuntimeError};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use test_helpers::{balances, execute, postings, prepare};

const SPLIT: &str = r#"
vars {
    monetary $amount
}
send $amount (
    source = {
        15% from {
            @alice
            @bob
        }
        remaining from @bob
    }
    destination = {
        1/3 to @x
        12.5% to @y
        remaining to @z
    }
)
"#;

fn coin() -> Asset {
    Asset::parse("COIN").unwrap()
}

fn sent_from(machine: &Machine, account: &str) -> BigInt {
    machine
        .postings()
        .iter()
        .filter(|p| p.source.as_str() == account)
        .map(|p| p.amount.clone())
        .sum()
}

#[test]
fn test_postings_conserve_amounts() -> Result<(), Box<dyn Error>> {
    for amount in 0..=300i64 {
        let mut resolver = balances(&[("alice", "COIN", 50), ("bob", "COIN", 1000)]);
        let vars = json!({ "amount": { "asset": "COIN", "amount": amount } });
        let machine = execute(SPLIT, vars, &mut resolver)?;

        let total: BigInt = machine.postings().iter().map(|p| p.amount.clone()).sum();
        assert_eq!(total, BigInt::from(amount), "amount {}", amount);

        for (name, before) in [("alice", 50), ("bob", 1000)] {
            let after = machine
                .balance(&Account::parse(name)?, &coin())
                .cloned()
                .unwrap_or_default();
            assert_eq!(
                BigInt::from(before) - after,
                sent_from(&machine, name),
                "{} for amount {}",
                name,
                amount
            );
        }
    }
    Ok(())
}

#[test]
fn test_insufficient_funds_never_posts() -> Result<(), Box<dyn Error>> {
    for amount in [1051i64, 2000, 99999] {
        let mut resolver = balances(&[("alice", "COIN", 50), ("bob", "COIN", 1000)]);
        let vars = json!({ "amount": { "asset": "COIN", "amount": amount } });
        let mut machine = prepare(SPLIT, vars, &mut resolver)?;

        assert!(matches!(
            machine.execute(),
            Err(RuntimeError::InsufficientFunds { .. })
        ));
        assert!(machine.postings().is_empty());
    }
    Ok(())
}

#[test]
fn test_allocation_is_complete() -> Result<(), Box<dyn Error>> {
    let allotments = [
        vec!["15%", "15%", "remaining"],
        vec!["1/3", "1/3", "1/3"],
        vec!["12.5%", "remaining"],
        vec!["1/7", "2/7", "3/7"],
        vec!["100%"],
        vec!["0%", "remaining"],
    ];

    for portions in &allotments {
        let allotment = Allotment::new(
            portions
                .iter()
                .map(|p| Portion::parse(p))
                .collect::<Result<Vec<_>, _>>()?,
        )?;
        let covered: BigRational = allotment.portions().iter().filter_map(Portion::ratio).sum();
        let covers_all = portions.contains(&"remaining") || covered.is_one();

        for total in 0..=500i64 {
            let total = BigInt::from(total);
            let shares = allotment.allocate(&total);
            assert_eq!(shares.len(), portions.len());
            assert!(shares.iter().all(|s| s >= &BigInt::from(0)));

            let allocated: BigInt = shares.iter().sum();
            if covers_all {
                assert_eq!(allocated, total, "{:?} of {}", portions, total);
            } else {
                assert!(allocated <= total, "{:?} of {}", portions, total);
            }
        }
    }
    Ok(())
}

#[test]
fn test_execution_is_deterministic() -> Result<(), Box<dyn Error>> {
    let program = compile(SPLIT)?;
    let vars = BTreeMap::from([(
        "amount".to_string(),
        json!({ "asset": "COIN", "amount": 99 }),
    )]);

    let mut runs = Vec::new();
    for _ in 0..2 {
        let mut resolver = balances(&[("alice", "COIN", 10), ("bob", "COIN", 100)]);
        let mut machine = Machine::new(program.clone());
        machine.set_vars_json(&vars)?;
        machine.resolve_resources()?.drive(&mut resolver)?;
        machine.resolve_balances()?.drive(&mut resolver)?;
        let exit = machine.execute()?;
        runs.push((exit, postings(&machine)));
    }
    assert_eq!(runs[0], runs[1]);
    Ok(())
}

#[test]
fn test_valid_scripts_only_fail_cleanly() -> Result<(), Box<dyn Error>> {
    let scripts = [
        "send [COIN 10] (source = @a destination = @b)",
        "send [COIN *] (source = { @a @b } destination = { 50% to @c remaining kept })",
        "send [COIN 25] (source = { max [COIN 5] from @a @b allowing overdraft up to [COIN 3] } destination = @c)",
        "send [COIN 25] (source = { 1/3 from @a remaining from { @b @world } } destination = { max [COIN 4] to @c remaining to @d })",
        "save [COIN 2] from @a\nsend [COIN 8] (source = @a destination = { max [COIN 1] kept remaining to @b })",
        "send [COIN 13] (source = @a allowing unbounded overdraft destination = { 1/2 to @b 1/2 to @c })",
    ];

    for script in scripts {
        for balance in [0i64, 7, 13, 100] {
            let mut resolver = InMemoryResolver::new()
                .with_balance("a", "COIN", balance)?
                .with_balance("b", "COIN", balance / 2)?;
            let mut machine = prepare(script, json!({}), &mut resolver)?;
            match machine.execute() {
                Ok(_) | Err(RuntimeError::InsufficientFunds { .. }) => {}
                Err(other) => panic!("{} with balance {}: {}", script, balance, other),
            }
        }
    }
    Ok(())
}
