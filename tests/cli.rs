use assert_cmd::Command;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const WORKED_EXAMPLE: &str = r#"
vars {
    account $dest
}
send [COIN 99] (
    source = {
        15% from {
            @alice
            @bob
        }
        remaining from @bob
    }
    destination = $dest
)
"#;

fn write(dir: &TempDir, name: &str, contents: &str) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.path().join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

fn numscript() -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("numscript")?;
    cmd.env("NO_COLOR", "1").env_remove("NUMSCRIPT_LOG").env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn test_check_valid_script() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let script = write(&temp_dir, "payout.num", WORKED_EXAMPLE)?;

    numscript()?
        .arg("check")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));

    Ok(())
}

#[test]
fn test_check_reports_syntax_error() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let script = write(&temp_dir, "broken.num", "send [COIN 10] (\n  source = @a\n)")?;

    numscript()?
        .arg("check")
        .arg(&script)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("[SYNTAX]"))
        .stderr(predicate::str::contains("line 3"));

    Ok(())
}

#[test]
fn test_check_reports_type_error() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let script = write(
        &temp_dir,
        "overflow.num",
        "send [COIN 10] (source = @world destination = { 60% to @a 50% to @b })",
    )?;

    numscript()?
        .arg("check")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("[TYPE]"));

    Ok(())
}

#[test]
fn test_fmt_prints_canonical_form() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let script = write(
        &temp_dir,
        "messy.num",
        "send [COIN 10] ( destination = @b source = @a )",
    )?;

    numscript()?
        .arg("fmt")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("source = @a"))
        .stdout(predicate::str::contains("destination = @b"));

    Ok(())
}

#[test]
fn test_compile_json() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let script = write(&temp_dir, "payout.num", WORKED_EXAMPLE)?;

    let output = numscript()?
        .arg("compile")
        .arg("--json")
        .arg(&script)
        .output()?;
    assert!(output.status.success());

    let program: numscript::Program = serde_json::from_slice(&output.stdout)?;
    assert_eq!(program, numscript::compile(WORKED_EXAMPLE)?);

    Ok(())
}

#[test]
fn test_run_worked_example() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let script = write(&temp_dir, "payout.num", WORKED_EXAMPLE)?;
    let vars = write(&temp_dir, "vars.json", r#"{"dest": "charlie"}"#)?;
    let balances = write(
        &temp_dir,
        "balances.json",
        r#"{"alice": {"COIN": 10}, "bob": {"COIN": 100}}"#,
    )?;

    numscript()?
        .arg("run")
        .arg(&script)
        .arg("--vars")
        .arg(&vars)
        .arg("--balances")
        .arg(&balances)
        .assert()
        .success()
        .stdout(predicate::str::contains("@alice -> @charlie: [COIN 10]"))
        .stdout(predicate::str::contains("@bob -> @charlie: [COIN 89]"))
        .stdout(predicate::str::contains("Exit code: OK"));

    Ok(())
}

#[test]
fn test_run_json_with_metadata() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let script = write(
        &temp_dir,
        "fee.num",
        r#"
        vars {
            account $dest = meta(@config, "dest")
        }
        send [COIN 5] (source = @world destination = $dest)
        set_tx_meta("reason", "fee")
        "#,
    )?;
    let meta = write(
        &temp_dir,
        "meta.json",
        r#"{"config": {"dest": {"type": "account", "value": "treasury"}}}"#,
    )?;

    let output = numscript()?
        .arg("run")
        .arg(&script)
        .arg("--meta")
        .arg(&meta)
        .arg("--json")
        .output()?;
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(result["exit_code"], "OK");
    assert_eq!(result["postings"][0]["source"], "world");
    assert_eq!(result["postings"][0]["destination"], "treasury");
    assert_eq!(result["postings"][0]["amount"], 5);
    assert_eq!(result["tx_meta"]["reason"]["value"], "fee");

    Ok(())
}

#[test]
fn test_run_insufficient_funds() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let script = write(
        &temp_dir,
        "overdraw.num",
        "send [COIN 10] (source = @alice destination = @bob)",
    )?;

    numscript()?
        .arg("run")
        .arg(&script)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("[INSUFFICIENT_FUNDS]"));

    Ok(())
}

#[test]
fn test_run_missing_variable() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let script = write(&temp_dir, "payout.num", WORKED_EXAMPLE)?;

    numscript()?
        .arg("run")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("[BINDING]"));

    Ok(())
}

#[test]
fn test_missing_file() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;

    numscript()?
        .arg("check")
        .arg(temp_dir.path().join("absent.num"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("[IO]"));

    Ok(())
}
