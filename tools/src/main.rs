mod script;

use anyhow::{Context, Result};
use clap::Parser;
use imebridge_core::memory::AreaCall;
use imebridge_core::{width, Config};
use script::{Replayer, Script, StepReport};
use std::path::PathBuf;

/// Replay scripted text-services events and print what the conversion area
/// was asked to do.
#[derive(Parser)]
#[command(name = "imebridge-replay", version)]
struct Args {
    /// Replay script (TOML)
    script: PathBuf,

    /// Configuration file replacing the script's [config] table
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print one JSON object per step
    #[arg(long)]
    json: bool,

    /// Stop at the first failing step
    #[arg(long)]
    strict: bool,

    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn print_report(report: &StepReport) {
    let mut header = format!("#{} {}", report.index, report.op);
    if let Some(accepted) = report.accepted {
        header.push_str(if accepted { " accepted" } else { " refused" });
    }
    if let Some(outcome) = report.outcome {
        header.push_str(&format!(" {outcome:?}"));
    }
    if let Some(error) = &report.error {
        header.push_str(&format!(" error: {error}"));
    }
    println!("{header}");

    for call in &report.calls {
        match call {
            AreaCall::Start => println!("    start"),
            AreaCall::End => println!("    end"),
            AreaCall::Clear => println!("    clear"),
            AreaCall::Result { text } => println!("    result {text:?}"),
            AreaCall::Composition {
                text,
                attributes,
                cursor,
            } => {
                let column = cursor.map(|c| width::column_of_char(text, c));
                println!(
                    "    composition {text:?} width={} cursor={cursor:?} column={column:?} attributes={}",
                    width::str_width(text),
                    attributes.len()
                );
            }
        }
    }
    println!("    document {:?}", report.document);
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let content = std::fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read {}", args.script.display()))?;
    let mut script = Script::from_toml_str(&content)?;
    if let Some(path) = &args.config {
        script.config = Config::load_toml(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
    }

    let reports = Replayer::new(&script).run(&script.steps, args.strict)?;
    for report in &reports {
        if args.json {
            println!("{}", serde_json::to_string(report)?);
        } else {
            print_report(report);
        }
    }
    Ok(())
}
