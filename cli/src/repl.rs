//! Line editor for the interactive shell.

use std::path::PathBuf;

use anyhow::Context as _;
use log::{debug, warn};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::history::DefaultHistory;
use rustyline::{
    CompletionType, Config, Context, EditMode, Editor, Helper, Highlighter, Validator,
};

/// Command names offered for completion at the start of a line.
const COMMANDS: &[&str] = &[
    "close", "del", "exit", "get", "has", "help", "kinds", "open", "put", "query", "quit", "size",
    "sync",
];

pub enum ReadlineEvent {
    Line(String),
    /// Ctrl-C
    Interrupted,
    /// Ctrl-D, or the terminal went away
    Eof,
}

#[derive(Helper, Validator, Highlighter)]
struct ShellHelper {
    hinter: HistoryHinter,
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let prefix = &line[..pos];
        let word_start = prefix.len() - prefix.trim_start().len();
        let word = &prefix[word_start..];
        // only the command word is completed
        if word.contains(char::is_whitespace) {
            return Ok((pos, Vec::new()));
        }

        let matches = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(word))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
        Ok((word_start, matches))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

pub struct ReplEditor {
    editor: Editor<ShellHelper, DefaultHistory>,
    history_path: Option<PathBuf>,
}

impl ReplEditor {
    /// Creates an editor, loading history from `history_path` when given.
    pub fn new(history_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config).context("failed to start line editor")?;
        editor.set_helper(Some(ShellHelper {
            hinter: HistoryHinter::new(),
        }));

        if let Some(path) = &history_path {
            match editor.load_history(path) {
                Ok(()) => debug!("loaded history from {}", path.display()),
                // first run
                Err(ReadlineError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("failed to load history from {}: {e}", path.display()),
            }
        }

        Ok(Self {
            editor,
            history_path,
        })
    }

    pub fn readline(&mut self, prompt: &str) -> ReadlineEvent {
        match self.editor.readline(prompt) {
            Ok(line) => {
                self.save_history();
                ReadlineEvent::Line(line)
            }
            Err(ReadlineError::Interrupted) => ReadlineEvent::Interrupted,
            Err(ReadlineError::Eof) => ReadlineEvent::Eof,
            Err(e) => {
                warn!("failed to read input: {e}");
                ReadlineEvent::Eof
            }
        }
    }

    fn save_history(&mut self) {
        if let Some(path) = &self.history_path {
            if let Err(e) = self.editor.save_history(path) {
                warn!("failed to save history to {}: {e}", path.display());
            }
        }
    }
}
