//! The `iql` command: run IQL scripts against Internet-hosted documents,
//! or stream filtered document rows in diagnostic mode.

mod loader;
mod render;

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use iql_core::source::html::HtmlSource;
use iql_core::source::json::JsonSource;
use iql_core::source::loader::{fetch_documents, SourceLoader};
use iql_core::{Client, Error, Result, Value};

use crate::loader::HttpLoader;
use crate::render::{TabledTabulator, STYLES};

/// Interactive SQL over Internet-hosted CSV, JSON and HTML documents.
#[derive(Debug, Parser)]
#[command(name = "iql", version, about)]
struct Cli {
    /// Script files to run; with -e, --html or --json these are the
    /// positional arguments or documents instead.
    inputs: Vec<String>,

    /// Execute the given code as a script; positional arguments become ARGS.
    #[arg(short = 'e', value_name = "CODE")]
    eval: Option<String>,

    /// Tabulation style.
    #[arg(short = 't', long = "table", default_value = "uc",
          value_parser = STYLES)]
    table: String,

    /// Bypass the engine: stream rows of the given documents matching a
    /// CSS selector.
    #[arg(long, value_name = "SELECTOR", conflicts_with_all = ["json", "eval"])]
    html: Option<String>,

    /// Bypass the engine: stream values of the given documents matching a
    /// path selector.
    #[arg(long, value_name = "SELECTOR", conflicts_with = "eval")]
    json: Option<String>,

    /// Redirect tabulated output; default is stdout.
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    output: Option<PathBuf>,

    /// Write a CPU profile to the given path.
    #[arg(long, value_name = "PATH")]
    cpuprofile: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("iql: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.cpuprofile.is_some() {
        tracing::warn!("profiling support is not compiled into this build");
    }

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout()),
    };
    let loader = Rc::new(HttpLoader);

    if let Some(selector) = &cli.html {
        return stream_documents(&cli.inputs, loader.as_ref(), &mut out, |data| {
            HtmlSource::select_text(data, selector)
        });
    }
    if let Some(selector) = &cli.json {
        return stream_documents(&cli.inputs, loader.as_ref(), &mut out, |data| {
            JsonSource::select_text(data, selector)
        });
    }

    let args = if cli.eval.is_some() {
        cli.inputs.clone()
    } else {
        Vec::new()
    };
    let mut client = Client::new(loader, Box::new(TabledTabulator), out, args);
    if cli.table != "uc" {
        client
            .scope()
            .set("TABLEFMT", Value::String(cli.table.clone()))?;
    }

    match &cli.eval {
        Some(code) => client.execute("-e", code),
        None => {
            if cli.inputs.is_empty() {
                return Err(Error::InvalidArgument(
                    "no script files given (try -e '<code>')".to_string(),
                ));
            }
            for script in &cli.inputs {
                let text = std::fs::read_to_string(script)?;
                client.execute(script, &text)?;
            }
            Ok(())
        }
    }
}

/// Diagnostic mode: apply a selector to every named document and write
/// the matches, one per line.
fn stream_documents(
    inputs: &[String],
    loader: &dyn SourceLoader,
    out: &mut dyn Write,
    select: impl Fn(&[u8]) -> Result<Vec<String>>,
) -> Result<()> {
    for input in inputs {
        for document in fetch_documents(input, loader)? {
            for line in select(&document.data)? {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(())
}
