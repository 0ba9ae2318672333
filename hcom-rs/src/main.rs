use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::atomic::Ordering;

use hcom::cli::{self, ConfigFile};
use hcom::config::{self, ConsoleConfig};
use hcom::host::{MemoryLogStore, MemoryModel, TerminalSink};
use hcom::InterpreterSession;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const PROMPT: &str = ">> ";

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("hcom: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(1);
        }
    };

    // ── Config ────────────────────────────────────────────────────────────────
    let path = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(p) => Some(p.clone()),
        ConfigFile::Search => config::find_user_config(),
    };
    let mut config = ConsoleConfig::default();
    let mut config_errors = Vec::new();
    if let Some(path) = path {
        match ConsoleConfig::load_file(&path) {
            Ok((c, errs)) => {
                config = c;
                config_errors = errs;
            }
            Err(e) => eprintln!("hcom: {}: {e}", path.display()),
        }
    }

    init_tracing(config.log_filter.as_deref());
    for e in &config_errors {
        tracing::warn!("config {e}");
    }

    // ── Session ───────────────────────────────────────────────────────────────
    let sink = TerminalSink::new(config.color && !args.no_color);
    let model = MemoryModel::new();
    let mut session = InterpreterSession::new(
        Box::new(model),
        Box::new(MemoryLogStore::new()),
        Box::new(sink),
    );
    session.set_echo(config.echo && !args.quiet);
    session.set_history_limit(config.history_size);
    if let Some(dir) = &config.working_directory {
        session.set_pwd(dir.clone());
    }

    let abort = session.abort_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            abort.store(true, Ordering::SeqCst);
        }
    });

    if let Some(script) = &config.startup_script {
        run_script_file(&mut session, script, &[]);
    }
    if let Some(cmd) = &args.command {
        session.execute(cmd);
    }
    if let Some(script) = &args.script {
        run_script_file(&mut session, script, &args.script_args);
        return;
    }
    if session.exit_requested() {
        return;
    }

    // ── Prompt loop ───────────────────────────────────────────────────────────
    let mut lines = spawn_stdin_reader();
    prompt();
    while let Some(line) = lines.recv().await {
        // a ctrl-c at the idle prompt must not cancel the next command
        session.clear_abort();
        session.submit(&line);
        if session.exit_requested() {
            break;
        }
        prompt();
    }
}

fn init_tracing(config_filter: Option<&str>) {
    let filter = EnvFilter::try_from_env("HCOM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(config_filter.unwrap_or("warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn run_script_file(session: &mut InterpreterSession, path: &Path, args: &[String]) {
    let line = std::iter::once(format!("\"{}\"", path.display()))
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");
    session.execute(&format!("exec {line}"));
}

/// Stdin is read on a plain thread so the runtime stays free for signals.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn prompt() {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "{PROMPT}");
    let _ = out.flush();
}
