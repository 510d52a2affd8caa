use std::path::{Path, PathBuf};

use crate::core::tokenizer::DEFAULT_MAX_ARGUMENTS;
use crate::errors::Result;

use self::runner::RunnerConfig;

#[cfg(unix)]
pub use self::unix::create_shell;

pub mod builtins;
pub mod runner;
pub mod signals;
#[cfg(unix)]
pub mod unix;

pub const HISTORY_FILE_NAME: &str = ".msh_history";

pub const GENERAL_FAILURE_EXIT_STATUS: i32 = 1;
pub const USAGE_ERROR_EXIT_STATUS: i32 = 2;
pub const NOT_EXECUTABLE_EXIT_STATUS: i32 = 126;
pub const COMMAND_NOT_FOUND_EXIT_STATUS: i32 = runner::EXEC_FAILED_EXIT_STATUS;

/// Consecutive fork failures tolerated before the shell gives up.
pub const DEFAULT_MAX_CONSECUTIVE_SPAWN_FAILURES: usize = 3;

pub trait Shell {
    /// Runs one command line: a builtin, the exit sentinel, or a program.
    fn execute_command_string(&mut self, input: &str) -> Result<()>;
    fn execute_commands_from_file(&mut self, path: &Path) -> Result<()>;
    fn execute_from_stdin(&mut self);
    fn exit(&mut self, n: Option<i32>) -> !;
    fn is_interactive(&self) -> bool;
    /// Shell-style status of the last command (see `ExitOutcome::code`).
    fn last_exit_status(&self) -> i32;
}

/// Policy object to control a Shell's behavior
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Determines if new command entries will be added to the shell's command history.
    ///
    /// Note: This is checked before the other command history config fields.
    enable_command_history: bool,

    /// Number of entries to store in the shell's command history
    command_history_capacity: usize,

    /// Determines if lines are read through the line editor and signal
    /// callbacks are installed.
    interactive: bool,

    /// Determines if some messages (e.g. "exit") should be displayed.
    display_messages: bool,

    /// Upper bound on the number of tokens in one command line.
    max_arguments: usize,

    max_consecutive_spawn_failures: usize,

    runner: RunnerConfig,
}

impl ShellConfig {
    /// Creates an interactive shell, e.g. command history, line editing
    ///
    /// # Complete List
    /// - Command History is enabled
    /// - SIGINT and SIGCHLD are routed through the signal table
    /// - Some additional messages are displayed
    pub fn interactive(command_history_capacity: usize) -> Self {
        Self {
            enable_command_history: true,
            command_history_capacity,
            interactive: true,
            display_messages: true,
            ..Default::default()
        }
    }

    /// Creates a noninteractive shell, e.g. for `-c` and script files
    ///
    /// # Complete List
    /// - Command History is disabled.
    /// - Lines are read without the line editor.
    /// - Fewer messages are displayed
    pub fn noninteractive() -> Self {
        Default::default()
    }

    pub fn with_max_arguments(mut self, max_arguments: usize) -> Self {
        self.max_arguments = max_arguments;
        self
    }

    pub fn with_exit_sentinel<T: Into<String>>(mut self, sentinel: T) -> Self {
        self.runner.exit_sentinel = sentinel.into();
        self
    }

    pub fn with_search_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.runner.search_path = Some(dirs);
        self
    }

    pub fn with_max_consecutive_spawn_failures(mut self, n: usize) -> Self {
        self.max_consecutive_spawn_failures = n;
        self
    }

    pub fn max_arguments(&self) -> usize {
        self.max_arguments
    }

    pub fn runner(&self) -> &RunnerConfig {
        &self.runner
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enable_command_history: false,
            command_history_capacity: 0,
            interactive: false,
            display_messages: false,
            max_arguments: DEFAULT_MAX_ARGUMENTS,
            max_consecutive_spawn_failures: DEFAULT_MAX_CONSECUTIVE_SPAWN_FAILURES,
            runner: RunnerConfig::default(),
        }
    }
}
