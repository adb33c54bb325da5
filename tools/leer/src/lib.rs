pub mod config;
pub mod errors;
pub mod events;
pub mod executor;
pub mod highlight;
pub mod hotkeys;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod transcript;
pub mod tui;
pub mod viewer;
pub mod viewport;

use clap::{error::ErrorKind, CommandFactory, FromArgMatches, Parser};
use config::{load_config, parse_diff_mode, parse_interval, CliOverrides, DiffMode};
use errors::LeerError;
use events::{event_channel, spawn_input_pump, spawn_signal_listener};
use executor::CommandSpec;
use hotkeys::controls_legend;
use runtime::{ProcessRequest, ProcessRunner, ProductionRuntime, ProductionTerminal};
use session::run_session;
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "leer", version)]
#[command(about = "Run a command periodically and page through its output fullscreen")]
pub struct Cli {
    /// Seconds between run starts; `,` or `.` as decimal separator
    #[arg(short = 'n', long, value_name = "SECONDS", value_parser = parse_interval)]
    pub interval: Option<f64>,
    /// Number the output lines
    #[arg(short = 'l', long = "line-numbers", default_value_t = false)]
    pub line_numbers: bool,
    /// Highlight changes against the previous run, or the first with =permanent
    #[arg(
        short = 'd',
        long,
        value_name = "permanent",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "on",
        value_parser = parse_diff_mode
    )]
    pub differences: Option<DiffMode>,
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
    /// Command to run; arguments are joined with spaces and passed to the shell
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config_path: self.config.clone(),
            interval_seconds: self.interval,
            line_numbers: self.line_numbers,
            differences: self.differences,
            log_file: self.log_file.clone(),
        }
    }
}

fn cli_command() -> clap::Command {
    Cli::command().after_help(controls_legend())
}

pub fn parse_cli<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = cli_command().try_get_matches_from(args)?;
    Cli::from_arg_matches(&matches)
}

pub fn render_help() -> String {
    cli_command().render_long_help().to_string()
}

pub fn run() -> Result<i32, LeerError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &runtime)
}

pub fn run_with_runtime(args: &[OsString], runtime: &ProductionRuntime) -> Result<i32, LeerError> {
    let cli = match parse_cli(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(LeerError::Cli(error.to_string())),
        },
    };

    let cfg = load_config(&cli.overrides(), runtime.file_system.as_ref())?;
    let (sender, events) = event_channel();
    spawn_signal_listener(sender.clone())?;
    let command = CommandSpec::new(cli.command, cfg.execution.shell.clone());
    let hostname = resolve_hostname(
        runtime.process_runner.as_ref(),
        std::env::var("HOSTNAME").ok(),
    );

    let terminal = ProductionTerminal::enter()?;
    spawn_input_pump(sender.clone()).map_err(|e| LeerError::Io(e.to_string()))?;
    run_session(&cfg, command, &hostname, runtime, terminal, sender, events)?;
    Ok(0)
}

/// Asks `hostname` first, then falls back to the environment.
pub fn resolve_hostname(runner: &dyn ProcessRunner, env_hostname: Option<String>) -> String {
    let request = ProcessRequest {
        program: "hostname".to_string(),
        args: Vec::new(),
    };
    if let Ok(output) = runner.run(request) {
        if output.exit_code == 0 {
            if let Some(name) = output.lines.first().map(|line| line.trim()) {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
    }
    env_hostname
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
