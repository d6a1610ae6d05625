//! Tapedeck CLI
//!
//! Compiles and runs tape-machine programs through the same session
//! controller any host embeds: output streams as the program produces it,
//! and with `--blocking-input` the program suspends on an exhausted input
//! buffer until more text arrives on stdin.

mod args;

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::debug;

use tapedeck_core::{OutputRecord, SessionController};
use tapedeck_engine::{TapeCompiler, TapeVm};

use args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set RUST_LOG=debug for verbose logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let (entry_label, source) = match (&cli.file, &cli.program) {
        (Some(path), _) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let label = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("program.tape")
                .to_string();
            (label, text)
        }
        (None, Some(program)) => ("program.tape".to_string(), program.clone()),
        (None, None) => bail!("provide a program with --file or --program"),
    };

    let session = SessionController::new(Arc::new(TapeCompiler::new()), Arc::new(TapeVm::new()));
    session.set_blocking_input(cli.blocking_input);
    if let Some(input) = &cli.input {
        session.set_input_text(input.clone())?;
    }

    let code = if cli.compile {
        let entry_id = session.documents().insert(entry_label, source)?;
        let artifact = session.compile(entry_id, cli.build_config()).await?;
        debug!(bytes = artifact.len(), "compiled");
        artifact
    } else {
        source
    };

    if cli.run || !cli.compile {
        run_streaming(&session, &cli, &code).await?;
    } else {
        println!("{code}");
    }

    Ok(())
}

/// Run the code, printing output bytes as they arrive rather than at the
/// terminal response.
async fn run_streaming(session: &SessionController, cli: &Cli, code: &str) -> anyhow::Result<()> {
    // Interactive input: feed stdin lines into the broker so a blocked run
    // resumes as the user types.
    if cli.blocking_input && cli.input.is_none() {
        let feeder = session.clone();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(mut line) = line else { break };
                line.push('\n');
                feeder.append_input(&line);
            }
        });
    }

    let run = session.run(code, cli.grid);
    tokio::pin!(run);

    // Biased select: the run future's first poll resets the live output
    // accumulator before the first tick can observe stale output.
    let mut printed = 0usize;
    let mut ticker = tokio::time::interval(Duration::from_millis(25));
    let result = loop {
        tokio::select! {
            biased;
            result = &mut run => break result,
            _ = ticker.tick() => {
                if let Some(OutputRecord::LiveOutput(text)) = session.output() {
                    let chunk: String = text.chars().skip(printed).collect();
                    if !chunk.is_empty() {
                        printed += chunk.chars().count();
                        print!("{chunk}");
                        let _ = std::io::stdout().flush();
                    }
                }
            }
        }
    };

    // Whatever the ticker missed is printed from the terminal payload.
    let output = result?;
    let tail: String = output.chars().skip(printed).collect();
    print!("{tail}");
    let _ = std::io::stdout().flush();
    Ok(())
}
