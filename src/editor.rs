use std::fmt;
use std::io;
use std::path::Path;

use failure::{Fail, ResultExt};
use rustyline::{
    self,
    completion::{Completer, FilenameCompleter, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    validate::Validator,
    CompletionType, Config, Helper,
};

use crate::errors::{ErrorKind, Result};

struct EditorHelper(FilenameCompleter);

impl Completer for EditorHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> ::std::result::Result<(usize, Vec<Pair>), ReadlineError> {
        self.0.complete(line, pos, ctx)
    }
}

impl Hinter for EditorHelper {
    type Hint = String;
}

impl Highlighter for EditorHelper {}

impl Helper for EditorHelper {}

impl Validator for EditorHelper {}

/// Interactive line reader with filename completion and command history.
pub struct Editor {
    internal: rustyline::Editor<EditorHelper>,
    /// The total number of history items ever saved
    history_count: usize,
    history_capacity: usize,
}

impl Editor {
    pub fn with_capacity(history_capacity: usize) -> Editor {
        let config = Config::builder()
            .max_history_size(history_capacity)
            .history_ignore_space(true)
            .completion_type(CompletionType::Circular)
            .build();

        let mut internal = rustyline::Editor::with_config(config);
        internal.set_helper(Some(EditorHelper(FilenameCompleter::new())));

        Editor {
            internal,
            history_count: 0,
            history_capacity,
        }
    }

    /// Reads one line. Returns `None` at end of file; an interrupted read
    /// (Ctrl-C) yields an empty line.
    pub fn readline(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.internal.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(e) => Err(e.context(ErrorKind::Readline).into()),
        }
    }

    pub fn load_history<P: AsRef<Path> + ?Sized>(&mut self, path: &P) -> Result<()> {
        match self.internal.load_history(path) {
            Ok(()) => {
                self.history_count = self.internal.history().len();
                Ok(())
            }
            Err(ReadlineError::Io(ref inner)) if inner.kind() == io::ErrorKind::NotFound => {
                Ok(())
            }
            Err(e) => Err(e.context(ErrorKind::Readline).into()),
        }
    }

    pub fn save_history<P: AsRef<Path> + ?Sized>(&mut self, path: &P) -> Result<()> {
        self.internal
            .save_history(path)
            .context(ErrorKind::Readline)?;
        Ok(())
    }

    pub fn add_history_entry(&mut self, line: &str) {
        if self.internal.add_history_entry(line) {
            self.history_count += 1;
        }
    }

    pub fn get_history_count(&self) -> usize {
        self.history_count
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "count: {}", self.history_count)?;
        write!(f, "capacity: {}", self.history_capacity)
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    fn alloc_history_state(capacity: usize, full: usize) -> Editor {
        assert!(full <= capacity);
        let mut state = Editor::with_capacity(capacity);
        for i in 0..full {
            state.add_history_entry(&format!("cmd{}", i));
        }
        state
    }

    #[test]
    fn init_with_capacity() {
        let capacity = 10;
        let state = Editor::with_capacity(capacity);
        assert!(state.internal.history().is_empty());
        assert_eq!(state.get_history_count(), 0);
        assert_eq!(state.history_capacity(), capacity);
    }

    #[test]
    fn add_history_entry_duplicate() {
        let mut state = Editor::with_capacity(2);

        let item = "dup";
        state.add_history_entry(item);
        assert_eq!(state.internal.history().len(), 1);

        state.add_history_entry(item);
        assert_eq!(state.internal.history().len(), 1);
        assert_eq!(state.get_history_count(), 1);
    }

    #[test]
    fn add_history_entry_rollover() {
        let mut state = alloc_history_state(10, 10);
        state.add_history_entry("extra");
        assert_eq!(state.get_history_count(), 11);
        assert_eq!(state.internal.history().len(), 10);
    }

    #[test]
    fn missing_history_file_is_not_an_error() {
        let dir = TempDir::new("msh-editor").unwrap();
        let mut state = Editor::with_capacity(10);
        assert!(state.load_history(&dir.path().join("absent")).is_ok());
        assert_eq!(state.get_history_count(), 0);
    }

    #[test]
    fn save_and_load_history() {
        let dir = TempDir::new("msh-editor").unwrap();
        let path = dir.path().join("history");

        let mut state = alloc_history_state(10, 3);
        state.save_history(&path).unwrap();

        let mut loaded = Editor::with_capacity(10);
        loaded.load_history(&path).unwrap();
        assert_eq!(loaded.get_history_count(), 3);
        assert_eq!(
            loaded.internal.history().get(2).map(String::as_str),
            Some("cmd2")
        );
    }
}
