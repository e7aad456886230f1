#![allow(dead_code)]

use numscript::{compile, InMemoryResolver, Machine, Posting};
use std::collections::BTreeMap;

/// Compile a script, bind its variables and resolve everything it needs,
/// leaving the machine ready to execute
pub fn prepare(
    source: &str,
    vars: serde_json::Value,
    resolver: &mut InMemoryResolver,
) -> Result<Machine, numscript::Error> {
    let program = compile(source)?;
    let mut machine = Machine::new(program);
    let vars: BTreeMap<String, serde_json::Value> =
        serde_json::from_value(vars).expect("variables must be a JSON object");
    machine.set_vars_json(&vars)?;
    machine.resolve_resources()?.drive(resolver)?;
    machine.resolve_balances()?.drive(resolver)?;
    Ok(machine)
}

/// Same as `prepare`, then execute
pub fn execute(
    source: &str,
    vars: serde_json::Value,
    resolver: &mut InMemoryResolver,
) -> Result<Machine, numscript::Error> {
    let mut machine = prepare(source, vars, resolver)?;
    machine.execute()?;
    Ok(machine)
}

/// Resolver holding the given `(account, asset, balance)` triples
pub fn balances(entries: &[(&str, &str, i64)]) -> InMemoryResolver {
    let mut resolver = InMemoryResolver::new();
    for (account, asset, balance) in entries {
        resolver = resolver
            .with_balance(account, asset, *balance)
            .expect("valid account and asset");
    }
    resolver
}

/// Postings in their display form, `@src -> @dst: [ASSET n]`
pub fn postings(machine: &Machine) -> Vec<String> {
    machine.postings().iter().map(Posting::to_string).collect()
}
