//! Command-line driver: compile one NanoMorpho source file to Morpho assembly.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use nanomorpho::{CompileError, emit, generate_assembly, parse_program};
use snafu::{ResultExt, Snafu};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
  /// Morpho assembly
  Asm,
  /// The parsed syntax tree
  Ast,
}

#[derive(Parser, Debug)]
#[command(name = "nanomorpho", version, about = "Compile NanoMorpho source into Morpho assembly")]
struct Cli {
  /// NanoMorpho source file
  source: PathBuf,

  /// Write to this file instead of standard output
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// Module name; defaults to the source file name without its extension
  #[arg(long)]
  module_name: Option<String>,

  /// What to print
  #[arg(long, value_enum, default_value_t = Output::Asm)]
  emit: Output,

  /// Enable debug logging
  #[arg(short, long)]
  verbose: bool,
}

#[derive(Debug, Snafu)]
enum DriverError {
  #[snafu(display("cannot read {}: {source}", path.display()))]
  ReadSource {
    path: PathBuf,
    source: io::Error,
  },
  #[snafu(display("cannot write {}: {source}", path.display()))]
  WriteOutput {
    path: PathBuf,
    source: io::Error,
  },
  #[snafu(display("cannot write to standard output: {source}"))]
  WriteStdout { source: io::Error },
  /// Already rendered against the source text.
  #[snafu(display("{report}"))]
  Compile { report: String },
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  if let Err(err) = run(&cli) {
    eprintln!("{err}");
    process::exit(1);
  }
}

/// `RUST_LOG` wins when set; otherwise `--verbose` picks the default level.
fn init_logging(verbose: bool) {
  let default = if verbose {
    "nanomorpho=debug"
  } else {
    "nanomorpho=warn"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

fn run(cli: &Cli) -> Result<(), DriverError> {
  info!(path = %cli.source.display(), "compiling");
  let source = fs::read_to_string(&cli.source).context(ReadSourceSnafu { path: &cli.source })?;
  let module_name = cli
    .module_name
    .clone()
    .unwrap_or_else(|| emit::module_name(&cli.source));

  let text = compile(&source, &module_name, cli.emit).map_err(|err| {
    CompileSnafu {
      report: err.render(&source),
    }
    .build()
  })?;

  match &cli.output {
    Some(path) => {
      fs::write(path, text).context(WriteOutputSnafu { path })?;
      info!(path = %path.display(), "wrote output");
    }
    None => {
      let mut stdout = io::stdout().lock();
      stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .context(WriteStdoutSnafu)?;
    }
  }
  Ok(())
}

fn compile(source: &str, module_name: &str, output: Output) -> Result<String, CompileError> {
  match output {
    Output::Asm => generate_assembly(source, module_name),
    Output::Ast => Ok(parse_program(source)?.to_string()),
  }
}
