use std::path::PathBuf;

use crate::paths;

/// History file name under the home directory
pub const HISTORY_FILE: &str = ".dshell_history";

/// Settings the shell starts with, resolved from flags and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Datastore to open before the first command, as `(kind, path)`
    pub open: Option<(String, String)>,
    /// Where to persist line history; `None` keeps history in memory only
    pub history: Option<PathBuf>,
    /// Lines to run instead of reading from the terminal
    pub commands: Vec<String>,
}

impl ShellConfig {
    pub fn is_interactive(&self) -> bool {
        self.commands.is_empty()
    }
}

pub fn default_history_path() -> Option<PathBuf> {
    paths::home_dir().map(|home| home.join(HISTORY_FILE))
}
