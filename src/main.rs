//! pysock - drive a companion Python interpreter over a local TCP socket.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pysock::config::{ConfigLoader, SessionConfig};
use pysock::session::{Session, SessionError};

#[derive(Parser)]
#[command(
    name = "pysock",
    about = "Drive a companion Python interpreter over a local TCP socket",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Connection flags shared by all subcommands.
#[derive(Args)]
struct ConnectionArgs {
    /// Port the companion listens on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Companion host.
    #[arg(long)]
    host: Option<String>,

    /// Python interpreter to launch.
    #[arg(long)]
    python: Option<PathBuf>,

    /// Socket read timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Companion server script (defaults to the bundled one).
    #[arg(long)]
    server_script: Option<PathBuf>,

    /// Config file to load instead of the default search paths.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one block of code and print its output.
    Exec {
        /// The code to execute.
        code: String,
    },
    /// Execute a Python file through the session and print its output.
    Run {
        /// Path to the file.
        file: PathBuf,
    },
    /// Interactive loop: read a line, execute it, print the output.
    Repl,
}

impl ConnectionArgs {
    /// Resolve the session configuration: config file first, then flags.
    fn resolve(&self) -> Result<SessionConfig, SessionError> {
        let loader = match &self.config {
            Some(path) => ConfigLoader::with_path(path.clone()),
            None => ConfigLoader::new(),
        };
        let file = loader.load().map_err(SessionError::Config)?;

        // Flags beat file values; the file can supply the port.
        let port = self
            .port
            .or(file.port)
            .ok_or(pysock::config::ConfigError::MissingPort)?;
        let mut config = file.merge_over(SessionConfig::new(port));
        config.port = port;
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(python) = &self.python {
            config.python = python.clone();
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        if let Some(script) = &self.server_script {
            config.server_script = Some(script.clone());
        }
        Ok(config)
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn print_output(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

/// Stop the session, escalating to kill so no interpreter is left behind.
fn shutdown(session: &mut Session) {
    if let Err(e) = session.stop() {
        tracing::warn!(error = %e, "Graceful stop failed, killing companion");
        session.kill();
    }
}

fn repl(session: &mut Session) -> Result<(), SessionError> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!(">>> ");
        stdout.flush().map_err(pysock::wire::WireError::Io)?;

        let mut line = String::new();
        let bytes = stdin
            .lock()
            .read_line(&mut line)
            .map_err(pysock::wire::WireError::Io)?;
        let line = line.trim_end();
        if bytes == 0 || line == "exit" {
            return Ok(());
        }
        if line.is_empty() {
            continue;
        }

        match session.exec(line) {
            Ok(lines) => print_output(&lines),
            // Remote errors are part of the conversation, not fatal.
            Err(SessionError::Wire(pysock::wire::WireError::Remote(detail))) => {
                eprintln!("{}", detail.red());
            }
            Err(e) => return Err(e),
        }
    }
}

fn run(cli: &Cli) -> Result<(), SessionError> {
    let config = cli.connection.resolve()?;
    let mut session = Session::new(config)?;
    session.start()?;

    let result = match &cli.command {
        Commands::Exec { code } => session.exec(code).map(|lines| print_output(&lines)),
        Commands::Run { file } => session.exec_file(file).map(|lines| print_output(&lines)),
        Commands::Repl => repl(&mut session),
    };

    shutdown(&mut session);
    result
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
