use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use ds_query::{FallibleStreamingIterator, Key};
use ds_store::{Datastore, Registry};
use log::{debug, info, warn};
use thiserror::Error;

use crate::commands::{QueryArgs, ShellCommand, ShellLine};
use crate::paths;
use crate::words::{split_words, SplitError};

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("no datastore. hint: use the open command")]
    NoDatastore,

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Split(#[from] SplitError),
}

/// What the caller should do after a line has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

struct OpenStore {
    kind: String,
    path: String,
    store: Box<dyn Datastore>,
}

/// Command interpreter holding at most one open datastore.
///
/// Command output goes to `out`; errors are returned to the caller.
pub struct Shell<W: Write> {
    registry: Registry,
    current: Option<OpenStore>,
    out: W,
}

impl<W: Write> Shell<W> {
    pub fn new(registry: Registry, out: W) -> Self {
        Self {
            registry,
            current: None,
            out,
        }
    }

    pub fn prompt(&self) -> String {
        match &self.current {
            Some(open) => format!("dshell({}:{})-> ", open.kind, open.path),
            None => "dshell()-> ".to_string(),
        }
    }

    /// Runs one command line.
    pub fn execute(&mut self, line: &str) -> Result<Flow> {
        let result = self.run_line(line);
        self.out.flush()?;
        result
    }

    fn run_line(&mut self, line: &str) -> Result<Flow> {
        let words = split_words(line).map_err(ShellError::from)?;
        if words.is_empty() {
            return Ok(Flow::Continue);
        }
        let parsed = match ShellLine::try_parse_from(&words) {
            Ok(parsed) => parsed,
            Err(err) if err.kind() == ErrorKind::DisplayHelp => {
                write!(self.out, "{}", err.render())?;
                return Ok(Flow::Continue);
            }
            Err(err) => {
                let rendered = err.render().to_string();
                let message = rendered.strip_prefix("error: ").unwrap_or(&rendered);
                return Err(ShellError::Usage(message.trim_end().to_string()).into());
            }
        };
        self.dispatch(parsed.command)
    }

    fn dispatch(&mut self, command: ShellCommand) -> Result<Flow> {
        match command {
            ShellCommand::Open { kind, path } => self.open(&kind, &path)?,
            ShellCommand::Close => self.close()?,
            ShellCommand::Kinds => {
                for kind in self.registry.kinds() {
                    writeln!(self.out, "{kind}")?;
                }
            }
            ShellCommand::Get { binary, save, key } => {
                self.get(&Key::new(&key), binary, save.as_deref())?
            }
            ShellCommand::Put { load, key, value } => {
                let value = match (load, value) {
                    (Some(file), _) => {
                        let path = paths::resolve(&file)?;
                        fs::read(&path)
                            .with_context(|| format!("failed to read {}", path.display()))?
                    }
                    (None, Some(value)) => value.into_bytes(),
                    (None, None) => return Err(ShellError::Usage("missing value".into()).into()),
                };
                self.store_mut()?.put(&Key::new(&key), &value)?;
            }
            ShellCommand::Del { key } => self.store_mut()?.delete(&Key::new(&key))?,
            ShellCommand::Has { key } => {
                let has = self.store()?.has(&Key::new(&key))?;
                writeln!(self.out, "{has}")?;
            }
            ShellCommand::Sync { key } => self.store_mut()?.sync(&Key::new(&key))?,
            ShellCommand::Size { key } => {
                let size = self.store()?.get_size(&Key::new(&key))?;
                writeln!(self.out, "{size}")?;
            }
            ShellCommand::Query(args) => self.query(&args)?,
            ShellCommand::Exit => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }

    /// Opens a datastore, replacing the current one once the new one is open.
    pub fn open(&mut self, kind: &str, path: &str) -> Result<()> {
        let location = paths::store_location(path)?;
        let store = self.registry.open(kind, &location).with_context(|| {
            format!("failed to open {kind} datastore at {}", location.display())
        })?;
        self.close()?;
        info!("opened {kind} datastore at {}", location.display());
        self.current = Some(OpenStore {
            kind: kind.to_string(),
            path: path.to_string(),
            store,
        });
        Ok(())
    }

    /// Closes the open datastore, if any.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut open) = self.current.take() {
            debug!("closing {} datastore at {}", open.kind, open.path);
            open.store
                .close()
                .with_context(|| format!("failed to close {} datastore", open.kind))?;
        }
        Ok(())
    }

    fn store(&self) -> Result<&dyn Datastore, ShellError> {
        self.current
            .as_ref()
            .map(|open| open.store.as_ref())
            .ok_or(ShellError::NoDatastore)
    }

    fn store_mut(&mut self) -> Result<&mut dyn Datastore, ShellError> {
        match self.current.as_mut() {
            Some(open) => {
                let store: &mut dyn Datastore = open.store.as_mut();
                Ok(store)
            }
            None => Err(ShellError::NoDatastore),
        }
    }

    fn get(&mut self, key: &Key, binary: bool, save: Option<&str>) -> Result<()> {
        let value = self.store()?.get(key)?;
        match save {
            Some(file) => {
                let path = paths::resolve(file)?;
                fs::write(&path, &value)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                writeln!(self.out, "wrote {} bytes to {}", value.len(), path.display())?;
            }
            None => self.write_value(&value, binary)?,
        }
        Ok(())
    }

    fn query(&mut self, args: &QueryArgs) -> Result<()> {
        let open = self.current.as_ref().ok_or(ShellError::NoDatastore)?;
        let query = args.to_query()?;
        let save_dir = args.save.as_deref().map(paths::resolve).transpose()?;
        let keys_only = query.keys_only;

        writeln!(self.out, "QUERY: {query}")?;
        let mut results = open.store.query(query)?;

        while let Some(entry) = results.next().context("query ended early")? {
            let value = entry.value().unwrap_or_default();
            if let Some(dir) = &save_dir {
                let path = save_under(dir, &entry.key, value)?;
                writeln!(self.out, "wrote {} bytes to {}", value.len(), path.display())?;
                continue;
            }
            writeln!(self.out, "KEY: {}", entry.key)?;
            if !keys_only {
                if args.binary {
                    self.out.write_all(value)?;
                } else {
                    writeln!(self.out, "{}", String::from_utf8_lossy(value))?;
                }
            }
        }
        Ok(())
    }

    fn write_value(&mut self, value: &[u8], binary: bool) -> Result<()> {
        if binary {
            self.out.write_all(value)?;
        } else {
            writeln!(self.out, "{}", String::from_utf8_lossy(value))?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        self.out
    }
}

/// Writes `value` to `<dir>/<key>`, creating intermediate directories.
fn save_under(dir: &Path, key: &Key, value: &[u8]) -> Result<PathBuf> {
    if key.is_root() {
        warn!("cannot save the root key under {}", dir.display());
        anyhow::bail!("cannot save the root key to a file");
    }
    let path = dir.join(key.as_str().trim_start_matches('/'));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, value).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn shell() -> Shell<Vec<u8>> {
        Shell::new(Registry::default(), Vec::new())
    }

    fn memory_shell() -> Shell<Vec<u8>> {
        let mut shell = shell();
        shell.execute("open memory scratch").unwrap();
        for line in ["put /a 1", "put /ab 2", "put /b 3"] {
            shell.execute(line).unwrap();
        }
        shell
    }

    fn output(shell: Shell<Vec<u8>>) -> String {
        String::from_utf8(shell.into_output()).unwrap()
    }

    #[test]
    fn test_prompt_follows_open_store() {
        let mut shell = shell();
        assert_eq!(shell.prompt(), "dshell()-> ");
        shell.execute("open memory scratch").unwrap();
        assert_eq!(shell.prompt(), "dshell(memory:scratch)-> ");
        shell.execute("close").unwrap();
        assert_eq!(shell.prompt(), "dshell()-> ");
    }

    #[test]
    fn test_commands_need_a_store() {
        let mut shell = shell();
        let lines = [
            "get /a", "put /a 1", "del /a", "has /a", "sync", "size /a", "query",
            // the store is checked before the query is built
            "query -l -1",
        ];
        for line in lines {
            let err = shell.execute(line).unwrap_err();
            assert_eq!(err.to_string(), "no datastore. hint: use the open command");
        }
    }

    #[test]
    fn test_key_value_commands() {
        let mut shell = memory_shell();
        shell.execute("get /ab").unwrap();
        shell.execute("has /ab").unwrap();
        shell.execute("size /ab").unwrap();
        shell.execute("del /ab").unwrap();
        shell.execute("has /ab").unwrap();
        shell.execute("sync").unwrap();

        let err = shell.execute("get /ab").unwrap_err();
        assert!(err
            .downcast_ref::<ds_store::Error>()
            .is_some_and(ds_store::Error::is_not_found));
        assert_eq!(output(shell), "2\ntrue\n1\nfalse\n");
    }

    #[test]
    fn test_kinds() {
        let mut shell = shell();
        shell.execute("kinds").unwrap();
        assert_eq!(output(shell), "blob\nflatfs\nhexfs\nleveldb\nmemory\n");
    }

    #[test]
    fn test_query_output() {
        let mut shell = memory_shell();
        shell.execute("query /a --fkp /a --ok -l 10").unwrap();
        assert_eq!(
            output(shell),
            "QUERY: SELECT keys,vals FROM \"/a\" FILTER [KEY PREFIX \"/a\"] ORDER [KEY] LIMIT 10\n\
             KEY: /a\n1\nKEY: /ab\n2\n"
        );
    }

    #[test]
    fn test_query_keys_only_and_paging() {
        let mut shell = memory_shell();
        shell.execute("query -k --ok -o 1 -l 1").unwrap();
        shell.execute("query --filter 'value > 1' --ov -k").unwrap();
        assert_eq!(
            output(shell),
            "QUERY: SELECT keys FROM \"/\" ORDER [KEY] OFFSET 1 LIMIT 1\n\
             KEY: /ab\n\
             QUERY: SELECT keys FROM \"/\" FILTER [VALUE > \"1\"] ORDER [VALUE]\n\
             KEY: /ab\nKEY: /b\n"
        );
    }

    #[test]
    fn test_query_rejects_bad_specs() {
        let mut shell = memory_shell();
        for line in ["query -l -1", "query --order size", "query --filter 'key != /a'"] {
            let err = shell.execute(line).unwrap_err();
            assert!(err
                .downcast_ref::<ds_query::Error>()
                .is_some_and(ds_query::Error::is_invalid_spec));
        }
        // nothing was printed for rejected queries
        assert_eq!(output(shell), "");
    }

    #[test]
    fn test_save_and_load_files() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("in.bin");
        fs::write(&source, [0u8, 159, 146, 150])?;

        let mut shell = shell();
        shell.execute("open memory scratch")?;
        shell.execute(&format!("put --load {} /blob", source.display()))?;

        let copy = dir.path().join("out.bin");
        shell.execute(&format!("get --save {} /blob", copy.display()))?;
        assert_eq!(fs::read(&copy)?, vec![0u8, 159, 146, 150]);

        shell.execute("put /nested/key 'a value'")?;
        let dump = dir.path().join("dump");
        shell.execute(&format!("query /nested --save {}", dump.display()))?;
        assert_eq!(fs::read_to_string(dump.join("nested/key"))?, "a value");

        let out = output(shell);
        assert!(out.contains(&format!("wrote 4 bytes to {}", copy.display())));
        assert!(out.contains(&format!(
            "wrote 7 bytes to {}",
            dump.join("nested/key").display()
        )));
        Ok(())
    }

    #[test]
    fn test_binary_get() -> anyhow::Result<()> {
        let mut shell = shell();
        shell.execute("open memory scratch")?;
        shell.execute("put /k \"raw\"")?;
        shell.execute("get -b /k")?;
        assert_eq!(shell.into_output(), b"raw".to_vec());
        Ok(())
    }

    #[test]
    fn test_flatfs_survives_reopen() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("db");

        let mut shell = shell();
        shell.execute(&format!("open flatfs {}", path.display()))?;
        shell.execute("put /GREETING hello")?;
        shell.execute("sync /")?;
        shell.execute("open memory scratch")?;
        shell.execute("has /GREETING")?;
        shell.execute(&format!("open flatfs {}", path.display()))?;
        shell.execute("get /GREETING")?;
        assert_eq!(output(shell), "false\nhello\n");
        Ok(())
    }

    #[test]
    fn test_open_blob_url() -> anyhow::Result<()> {
        let mut shell = shell();
        shell.execute("open blob memory:///")?;
        assert_eq!(shell.prompt(), "dshell(blob:memory:///)-> ");
        shell.execute("put /fruit/fig 12")?;
        shell.execute("query /fruit -k")?;
        assert_eq!(
            output(shell),
            "QUERY: SELECT keys FROM \"/fruit\"\nKEY: /fruit/fig\n"
        );
        Ok(())
    }

    use ds_query::{Entry, EntrySource, Query};

    /// Yields one entry, then fails.
    struct FailingStore;

    impl Datastore for FailingStore {
        fn get(&self, key: &Key) -> ds_store::Result<Vec<u8>> {
            Err(ds_store::Error::NotFound(key.clone()))
        }

        fn put(&mut self, _key: &Key, _value: &[u8]) -> ds_store::Result<()> {
            Ok(())
        }

        fn delete(&mut self, _key: &Key) -> ds_store::Result<()> {
            Ok(())
        }

        fn has(&self, _key: &Key) -> ds_store::Result<bool> {
            Ok(false)
        }

        fn get_size(&self, key: &Key) -> ds_store::Result<usize> {
            Err(ds_store::Error::NotFound(key.clone()))
        }

        fn sync(&mut self, _prefix: &Key) -> ds_store::Result<()> {
            Ok(())
        }

        fn query_raw(&self, _query: &Query) -> ds_store::Result<EntrySource<'_>> {
            let entries = vec![
                Ok(Entry::new("/a", "1")),
                Err(ds_query::Error::backend("disk went away")),
            ];
            Ok(Box::new(entries.into_iter()))
        }
    }

    #[test]
    fn test_query_failing_midway_keeps_printed_entries() {
        let mut registry = Registry::default();
        registry.register("broken", |_| Ok(Box::new(FailingStore)));
        let mut shell = Shell::new(registry, Vec::new());
        shell.execute("open broken anywhere").unwrap();

        let err = shell.execute("query").unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("query ended early"), "{message}");
        assert!(message.contains("disk went away"), "{message}");
        assert_eq!(
            output(shell),
            "QUERY: SELECT keys,vals FROM \"/\"\nKEY: /a\n1\n"
        );
    }

    #[test]
    fn test_failed_open_keeps_current_store() {
        let mut shell = memory_shell();
        let err = shell.execute("open badger somewhere").unwrap_err();
        assert!(format!("{err:#}").contains("unknown datastore kind: badger"));
        assert_eq!(shell.prompt(), "dshell(memory:scratch)-> ");
    }

    #[test]
    fn test_usage_errors_and_control() {
        let mut shell = shell();
        assert_eq!(shell.execute("").unwrap(), Flow::Continue);
        assert!(shell.execute("frobnicate").is_err());
        assert!(shell.execute("put /a 'unterminated").is_err());
        assert_eq!(shell.execute("exit").unwrap(), Flow::Exit);
        assert_eq!(shell.execute("quit").unwrap(), Flow::Exit);
        assert_eq!(shell.execute("help").unwrap(), Flow::Continue);
        assert!(output(shell).contains("query"));
    }
}
