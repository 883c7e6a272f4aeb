#![allow(clippy::print_stderr)]
use anyhow::{bail, Context};
use clap::{Parser, ValueHint};
use std::io::{stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tristore::command::{tokenize, Interpreter, ResultStyle, StoreAccess};
use tristore::ingest;
use tristore::server::{self, ServerConfig};
use tristore::store::StoreBuilder;

#[derive(Parser)]
#[command(about, version, name = "tristore")]
/// Tristore command line tool and triple pattern HTTP server.
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the HTTP query server over a read-only store.
    ///
    /// The store is assembled from the given snapshot and RDF files,
    /// frozen, and then shared by the worker pool. Request bodies are
    /// single command lines; results come back as TSV.
    Serve {
        /// Host and port to listen to.
        #[arg(short, long, default_value = "localhost:8098", value_hint = ValueHint::Hostname)]
        bind: String,
        /// Snapshot file to load before serving.
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        load: Option<PathBuf>,
        /// RDF file(s) to import before serving (N-Triples or Turtle,
        /// guessed from the extension).
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        import: Vec<PathBuf>,
        /// Worker pool size.
        #[arg(long, default_value_t = 16)]
        workers: usize,
        /// Speak raw command bodies instead of HTTP.
        #[arg(long)]
        raw: bool,
    },
    /// Execute commands against a store built in-process.
    ///
    /// Commands use the same vocabulary the server accepts; several
    /// commands may be separated with `;`.
    Run {
        /// Snapshot file to load first.
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        load: Option<PathBuf>,
        /// RDF file(s) to import first.
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        import: Vec<PathBuf>,
        /// Report timings and import statistics.
        #[arg(short, long)]
        verbose: bool,
        /// The command line(s) to execute.
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

pub fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    match Args::parse().command {
        Command::Serve {
            bind,
            load,
            import,
            workers,
            raw,
        } => {
            let builder = build_store(load.as_deref(), &import)?;
            let store = Arc::new(builder.freeze());
            let config = ServerConfig {
                workers,
                http: !raw,
                ..ServerConfig::default()
            };
            let handle = server::spawn(store, bind.as_str(), config)
                .with_context(|| format!("cannot listen on {bind}"))?;
            eprintln!("Listening on http://{}/", handle.local_addr());
            handle.join()?;
            Ok(())
        }
        Command::Run {
            load,
            import,
            verbose,
            command,
        } => {
            let mut builder = build_store(load.as_deref(), &import)?;
            let mut interpreter = Interpreter::new(
                StoreAccess::ReadWrite(&mut builder),
                ResultStyle::Assignments,
            );
            let out = stdout();
            let mut out = out.lock();
            let joined = command.join(" ");
            if verbose {
                interpreter.run(&tokenize("set verbose"), &mut out)?;
            }
            for line in joined.split(';') {
                let tokens = tokenize(line);
                if tokens.is_empty() {
                    continue;
                }
                interpreter
                    .run(&tokens, &mut out)
                    .with_context(|| format!("command failed: {}", line.trim()))?;
            }
            if interpreter.constructing() {
                bail!("query construction left open; missing `end`?");
            }
            out.flush()?;
            Ok(())
        }
    }
}

fn build_store(
    load: Option<&std::path::Path>,
    import: &[PathBuf],
) -> anyhow::Result<StoreBuilder> {
    let mut builder = StoreBuilder::new();
    if let Some(path) = load {
        builder
            .load_snapshot(path)
            .with_context(|| format!("cannot load snapshot {}", path.display()))?;
    }
    for file in import {
        ingest::import_file(&mut builder, file)
            .with_context(|| format!("cannot import {}", file.display()))?;
    }
    Ok(builder)
}
