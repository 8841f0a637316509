mod commands;
mod config;
mod paths;
mod repl;
mod shell;
mod words;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser};
use ds_store::Registry;
use log::debug;

use crate::config::{default_history_path, ShellConfig};
use crate::repl::{ReadlineEvent, ReplEditor};
use crate::shell::{Flow, Shell};

#[derive(Parser, Debug)]
#[command(author, version, about = "Interactive shell for key-value datastores")]
struct Cli {
    /// Kind of datastore to open at startup
    #[arg(long, env = "DSHELL_KIND", requires = "path")]
    kind: Option<String>,

    /// Path of the datastore to open at startup
    #[arg(long, env = "DSHELL_PATH", requires = "kind")]
    path: Option<String>,

    /// History file (default: ~/.dshell_history)
    #[arg(long, env = "DSHELL_HISTORY")]
    history: Option<String>,

    /// Do not read or write a history file; overrides --history
    #[arg(long)]
    no_history: bool,

    /// Run this command and exit; may be repeated
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    commands: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> Result<ShellConfig> {
        let history = match (self.no_history, self.history) {
            (true, _) => None,
            (false, Some(path)) => Some(paths::expand_home(&path)?),
            (false, None) => default_history_path(),
        };
        Ok(ShellConfig {
            open: self.kind.zip(self.path),
            history,
            commands: self.commands,
        })
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn report(err: &anyhow::Error) {
    eprintln!("error: {err:#}");
}

fn run_commands<W: Write>(shell: &mut Shell<W>, lines: &[String]) -> ExitCode {
    let mut failed = false;
    for line in lines {
        debug!("running {line:?}");
        match shell.execute(line) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(e) => {
                report(&e);
                failed = true;
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_interactive<W: Write>(shell: &mut Shell<W>, config: &ShellConfig) -> Result<()> {
    let mut editor = ReplEditor::new(config.history.clone())?;
    loop {
        match editor.readline(&shell.prompt()) {
            ReadlineEvent::Line(line) => match shell.execute(&line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(e) => report(&e),
            },
            ReadlineEvent::Interrupted => continue,
            ReadlineEvent::Eof => break,
        }
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.into_config()?;

    let mut shell = Shell::new(Registry::default(), io::stdout());
    if let Some((kind, path)) = &config.open {
        shell.open(kind, path)?;
    }

    let status = if config.is_interactive() {
        run_interactive(&mut shell, &config)?;
        ExitCode::SUCCESS
    } else {
        run_commands(&mut shell, &config.commands)
    };
    shell.close()?;
    Ok(status)
}
