use numscript::{compile, parse, CompileError, Program, TypeError, ValueType};
use std::error::Error;

const PAYOUT: &str = r#"
// payout with platform fees
vars {
    account $merchant
    portion $commission
    monetary $fee = meta(@platform, "fee")
}

send [USD/2 1000] (
    source = {
        @users:1234:main
        @users:1234:credit allowing overdraft up to [USD/2 500]
    }
    destination = {
        $commission to @platform:fees
        remaining to {
            max $fee kept
            remaining to $merchant
        }
    }
)

set_tx_meta("kind", "payout")
"#;

#[test]
fn test_malformed_literals_never_compile() {
    // lowercase assets are not assets at all
    assert!(matches!(
        compile("send [coin 10] (source = @a destination = @b)"),
        Err(CompileError::Syntax(_))
    ));
    assert!(matches!(
        compile("send [COIN 10] (source = @123abc destination = @b)"),
        Err(CompileError::Type(TypeError::MalformedLiteral { .. }))
    ));
    assert!(matches!(
        compile("send [COIN 10] (source = @world destination = { 150% to @a })"),
        Err(CompileError::Type(_))
    ));
}

#[test]
fn test_portion_overflow() {
    let err = compile(
        r#"send [COIN 10] (
            source = @world
            destination = {
                60% to @a
                50% to @b
            }
        )"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CompileError::Type(TypeError::PortionOverflow { .. })
    ));
}

#[test]
fn test_type_errors() {
    assert!(matches!(
        compile("send [COIN 1] (source = $missing destination = @b)"),
        Err(CompileError::Type(TypeError::UndeclaredVariable { .. }))
    ));
    assert!(matches!(
        compile("vars {\n number $n\n}\nsend [COIN 1] (source = $n destination = @b)"),
        Err(CompileError::Type(TypeError::TypeMismatch { .. }))
    ));
    assert!(matches!(
        compile("vars {\n account $a\n account $a\n}\nsend [COIN 1] (source = $a destination = @b)"),
        Err(CompileError::Type(TypeError::DuplicateVariable { .. }))
    ));
    assert!(matches!(
        compile("send [COIN 1] (source = @world allowing unbounded overdraft destination = @b)"),
        Err(CompileError::Type(TypeError::InvalidSource { .. }))
    ));
    assert!(matches!(
        compile("send [COIN *] (source = @a allowing unbounded overdraft destination = @b)"),
        Err(CompileError::Type(TypeError::InvalidSource { .. }))
    ));
}

#[test]
fn test_syntax_error_reports_position() {
    let err = compile("send [COIN 10] (\n  source = @a\n)").unwrap_err();
    let CompileError::Syntax(syntax) = &err else {
        panic!("expected a syntax error, got {:?}", err);
    };
    assert_eq!(syntax.pos.line, 3);
    assert!(err.to_string().contains("line 3"));
}

#[test]
fn test_declared_variables() -> Result<(), Box<dyn Error>> {
    let program = compile(PAYOUT)?;
    assert_eq!(
        program.variables(),
        vec![
            ("merchant", ValueType::Account),
            ("commission", ValueType::Portion),
        ]
    );
    assert_eq!(program.external_resource_count(), 1);
    Ok(())
}

#[test]
fn test_compilation_is_deterministic() -> Result<(), Box<dyn Error>> {
    assert_eq!(compile(PAYOUT)?, compile(PAYOUT)?);
    Ok(())
}

#[test]
fn test_printed_script_compiles_identically() -> Result<(), Box<dyn Error>> {
    let printed = parse(PAYOUT)?.to_string();
    assert_eq!(compile(&printed)?, compile(PAYOUT)?);
    assert_eq!(parse(&printed)?.to_string(), printed);
    Ok(())
}

#[test]
fn test_program_json_round_trip() -> Result<(), Box<dyn Error>> {
    let program = compile(PAYOUT)?;
    let json = serde_json::to_string(&program)?;
    let decoded: Program = serde_json::from_str(&json)?;
    assert_eq!(decoded, program);
    Ok(())
}

#[test]
fn test_deeply_nested_blocks_are_rejected() {
    let depth = 10_000;
    let sources = format!(
        "send [COIN 1] (source = {}@a{} destination = @b)",
        "{".repeat(depth),
        "}".repeat(depth)
    );
    assert!(matches!(compile(&sources), Err(CompileError::Syntax(_))));

    let destinations = format!(
        "send [COIN 1] (source = @a destination = {}@b{})",
        "{ remaining to ".repeat(depth),
        " }".repeat(depth)
    );
    assert!(matches!(compile(&destinations), Err(CompileError::Syntax(_))));

    let sum = format!("print {}", vec!["[COIN 1]"; depth].join(" + "));
    assert!(matches!(compile(&sum), Err(CompileError::Syntax(_))));
}

#[test]
fn test_nesting_within_the_limit_compiles() -> Result<(), Box<dyn Error>> {
    let script = format!(
        "send [COIN 1] (source = {}@world{} destination = @b)",
        "{".repeat(32),
        "}".repeat(32)
    );
    compile(&script)?;
    Ok(())
}

#[test]
fn test_large_flat_script_compiles() -> Result<(), Box<dyn Error>> {
    let script: String = (0..5_000)
        .map(|i| format!("send [COIN {}] (source = @world destination = @users:{})\n", i % 10, i))
        .collect();
    let program = compile(&script)?;

    let sends = program
        .instructions
        .iter()
        .filter(|instruction| instruction.name() == "SEND")
        .count();
    assert_eq!(sends, 5_000);
    Ok(())
}
