use clap::{Parser, Subcommand};
use colored::Colorize;
use numscript::config::Config;
use numscript::{compile, parse, ExitCode, InMemoryResolver, Machine};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;

/// Compile and run Numscript transaction scripts
#[derive(Debug, Parser)]
#[command(name = "numscript", version, about)]
struct Cli {
    /// Log compiler and machine activity
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse and type check a script
    Check {
        /// Script file
        file: PathBuf,
    },

    /// Print a script in canonical form
    Fmt {
        /// Script file
        file: PathBuf,
    },

    /// Print the compiled program
    Compile {
        /// Script file
        file: PathBuf,

        /// Print the program as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute a script against balances and metadata from files
    Run {
        /// Script file
        file: PathBuf,

        /// Variables as a JSON object of name to value
        #[arg(long, value_name = "FILE")]
        vars: Option<PathBuf>,

        /// Balances as {"account": {"ASSET": amount}}
        #[arg(long, value_name = "FILE")]
        balances: Option<PathBuf>,

        /// Metadata as {"account": {"key": {"type": ..., "value": ...}}}
        #[arg(long, value_name = "FILE")]
        meta: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Log every executed instruction
        #[arg(long)]
        trace: bool,
    },
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Numscript(#[from] numscript::Error),

    #[error("Cannot read {path}: {source}")]
    IO {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Numscript(err) => err.code(),
            AppError::IO { .. } => "IO",
            AppError::Json(_) => "JSON",
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let (json, trace) = match &cli.command {
        Command::Compile { json, .. } => (*json, false),
        Command::Run { json, trace, .. } => (*json, *trace),
        _ => (false, false),
    };
    let config = Config::from_env().with_flags(cli.verbose, json, trace);

    env_logger::Builder::new()
        .parse_filters(&config.log_filter)
        .format_timestamp(None)
        .init();

    if let Err(err) = run_command(&cli.command, &config) {
        eprintln!("{} [{}] {}", "error:".red().bold(), err.code(), err);
        process::exit(1);
    }
}

fn run_command(command: &Command, config: &Config) -> Result<(), AppError> {
    match command {
        Command::Check { file } => {
            let source = read(file)?;
            compile(&source).map_err(numscript::Error::from)?;
            println!("{} {}", "ok".green().bold(), file.display());
        }
        Command::Fmt { file } => {
            let source = read(file)?;
            let script = parse(&source).map_err(numscript::Error::from)?;
            print!("{}", script);
        }
        Command::Compile { file, .. } => {
            let source = read(file)?;
            let program = compile(&source).map_err(numscript::Error::from)?;
            if config.output.is_json() {
                println!("{}", serde_json::to_string_pretty(&program)?);
            } else {
                print!("{}", program);
            }
        }
        Command::Run {
            file,
            vars,
            balances,
            meta,
            ..
        } => run_script(file, vars.as_deref(), balances.as_deref(), meta.as_deref(), config)?,
    }
    Ok(())
}

fn run_script(
    file: &Path,
    vars: Option<&Path>,
    balances: Option<&Path>,
    meta: Option<&Path>,
    config: &Config,
) -> Result<(), AppError> {
    let program = compile(&read(file)?).map_err(numscript::Error::from)?;

    let mut resolver = InMemoryResolver::new();
    if let Some(path) = balances {
        resolver.load_balances_json(&read(path)?).map_err(numscript::Error::from)?;
    }
    if let Some(path) = meta {
        resolver.load_metadata_json(&read(path)?).map_err(numscript::Error::from)?;
    }

    let mut machine = Machine::new(program);
    let bindings: BTreeMap<String, serde_json::Value> = match vars {
        Some(path) => serde_json::from_str(&read(path)?)?,
        None => BTreeMap::new(),
    };
    if !bindings.is_empty() || !machine.program().variables().is_empty() {
        machine.set_vars_json(&bindings).map_err(numscript::Error::from)?;
    }

    machine
        .resolve_resources()
        .and_then(|channel| channel.drive(&mut resolver))
        .map_err(numscript::Error::from)?;
    machine
        .resolve_balances()
        .and_then(|channel| channel.drive(&mut resolver))
        .map_err(numscript::Error::from)?;
    let exit_code = machine.execute().map_err(numscript::Error::from)?;

    if config.output.is_json() {
        let account_meta: BTreeMap<String, _> = machine
            .account_meta()
            .iter()
            .map(|(account, entries)| (account.to_string(), entries))
            .collect();
        let result = json!({
            "exit_code": exit_code.to_string(),
            "postings": machine.postings(),
            "tx_meta": machine.tx_meta(),
            "account_meta": account_meta,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&machine, exit_code);
    }
    Ok(())
}

fn print_result(machine: &Machine, exit_code: ExitCode) {
    println!("{}", "Postings:".bold());
    if machine.postings().is_empty() {
        println!("  (none)");
    }
    for posting in machine.postings() {
        println!("  {}", posting);
    }

    if !machine.tx_meta().is_empty() {
        println!("{}", "Transaction metadata:".bold());
        for (key, value) in machine.tx_meta() {
            println!("  {}: {}", key, value);
        }
    }

    if !machine.account_meta().is_empty() {
        println!("{}", "Account metadata:".bold());
        for (account, entries) in machine.account_meta() {
            for (key, value) in entries {
                println!("  @{} {}: {}", account, key, value);
            }
        }
    }

    println!("{} {}", "Exit code:".bold(), exit_code.to_string().green());
}

fn read(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path).map_err(|source| AppError::IO {
        path: path.display().to_string(),
        source,
    })
}
