//! The ForegroundShell reads command lines, runs each one to completion in
//! the foreground and records its exit status, in addition to the normal
//! shell abilities such as managing the command history.

use std::env;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::str;

use atty::{self, Stream};
use log::{debug, error, info, warn};
use nix::{errno::Errno, sys::signal::Signal};

use super::{
    builtins, Shell, ShellConfig, COMMAND_NOT_FOUND_EXIT_STATUS, GENERAL_FAILURE_EXIT_STATUS,
    HISTORY_FILE_NAME, NOT_EXECUTABLE_EXIT_STATUS, USAGE_ERROR_EXIT_STATUS,
};
use crate::{
    core::{
        job::{ExitOutcome, Job},
        tokenizer::Tokenizer,
    },
    editor::Editor,
    errors::{Error, ErrorKind, Result},
    shell::{
        runner::{JobRunner, RunOutcome},
        signals::{SignalKind, SignalTable},
    },
};

/// Counts of signals delivered to the shell, updated by the deferred
/// signal callbacks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SignalCounters {
    pub interrupts: usize,
    pub children_terminated: usize,
}

pub struct ForegroundShell {
    /// Responsible for readline and history.
    editor: Editor,
    history_file: Option<PathBuf>,
    tokenizer: Tokenizer,
    runner: JobRunner,
    /// Installed only for interactive sessions.
    signals: Option<SignalTable<SignalCounters>>,
    counters: SignalCounters,
    /// Exit status of last command executed.
    last_exit_status: i32,
    consecutive_spawn_failures: usize,
    config: ShellConfig,
    /// Is `false` if the shell is running a script or stdin is not a
    /// terminal.
    is_interactive: bool,
}

impl ForegroundShell {
    pub fn new(config: ShellConfig) -> Result<Self> {
        let mut shell = Self {
            editor: Editor::with_capacity(config.command_history_capacity),
            history_file: None,
            tokenizer: Tokenizer::with_max_arguments(config.max_arguments),
            runner: JobRunner::new(config.runner.clone()),
            signals: None,
            counters: SignalCounters::default(),
            last_exit_status: 0,
            consecutive_spawn_failures: 0,
            is_interactive: config.interactive && atty::is(Stream::Stdin),
            config,
        };

        if shell.is_interactive {
            match install_signal_table() {
                Ok(table) => shell.signals = Some(table),
                Err(e) => error!("failed to install signal callbacks: {}", e),
            }
        }

        if shell.config.enable_command_history {
            shell.load_history()?
        }

        info!("msh started up");
        Ok(shell)
    }

    pub fn signal_counters(&self) -> SignalCounters {
        self.counters
    }

    fn load_history(&mut self) -> Result<()> {
        self.history_file = dirs::home_dir().map(|p| p.join(HISTORY_FILE_NAME));
        if let Some(ref history_file) = self.history_file {
            self.editor.load_history(history_file)?;
        } else {
            warn!("unable to get home directory")
        }

        Ok(())
    }

    /// Custom prompt to output to the user.
    /// Returns `None` when end of file is reached.
    fn prompt(&mut self) -> Result<Option<String>> {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("?"));
        let rel = match dirs::home_dir() {
            Some(ref home) => match cwd.strip_prefix(home) {
                Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("~"),
                Ok(rel) => Path::new("~").join(rel),
                Err(_) => cwd.clone(),
            },
            None => cwd.clone(),
        };

        let prompt = format!("{}|{}\n$ ", self.last_exit_status, rel.display());
        self.editor.readline(&prompt)
    }

    fn report_outcome(&mut self, job: &Job) {
        let outcome = match job.outcome() {
            Some(outcome) => outcome,
            None => return,
        };
        debug!("job {} {}", job, outcome);

        match outcome {
            ExitOutcome::Signaled(Signal::SIGINT, _) | ExitOutcome::Exited(_) => {}
            ExitOutcome::Signaled(..) => {
                let program = job.argv().program().unwrap_or_default();
                eprintln!("msh: {}: {}", program, outcome);
            }
        }
        self.last_exit_status = outcome.code();
    }

    /// Reports a failed run of `program` and records its status.
    fn handle_run_error(&mut self, program: &str, e: Error) {
        let kind = e.kind().clone();
        match kind {
            ErrorKind::ExecFailed { errno, .. } => {
                eprintln!("msh: {}", e);
                self.last_exit_status = match errno {
                    Errno::EACCES | Errno::ENOEXEC => NOT_EXECUTABLE_EXIT_STATUS,
                    _ => COMMAND_NOT_FOUND_EXIT_STATUS,
                };
            }
            ErrorKind::PathTooLong(_) | ErrorKind::InvalidArgument(_) => {
                eprintln!("msh: {}", e);
                self.last_exit_status = USAGE_ERROR_EXIT_STATUS;
            }
            ErrorKind::SpawnFailed { .. } => {
                eprintln!("msh: {}", e);
                self.last_exit_status = GENERAL_FAILURE_EXIT_STATUS;
                self.consecutive_spawn_failures += 1;
                if self.consecutive_spawn_failures >= self.config.max_consecutive_spawn_failures {
                    error!(
                        "giving up after {} consecutive spawn failures",
                        self.consecutive_spawn_failures
                    );
                    eprintln!("msh: unable to create processes, exiting");
                    self.exit(Some(GENERAL_FAILURE_EXIT_STATUS));
                }
            }
            _ => {
                error!("running '{}' failed: {:?}", program, e);
                eprintln!("msh: {}: {}", program, e);
                self.last_exit_status = GENERAL_FAILURE_EXIT_STATUS;
            }
        }
    }

    /// Runs the callbacks of signals received since the last dispatch.
    fn dispatch_signals(&mut self) {
        if let Some(table) = self.signals.as_mut() {
            let dispatched = table.dispatch_pending(&mut self.counters);
            if dispatched > 0 {
                debug!("dispatched {} signal callbacks", dispatched);
            }
        }
    }

    /// Runs every line of `reader`. A line that is not valid UTF-8 is
    /// reported and skipped; only a failed read ends the input early.
    fn execute_lines<R: BufRead>(&mut self, mut reader: R, source: &str) -> Result<()> {
        let mut buf = Vec::new();
        let mut line_number = 0;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => line_number += 1,
                Err(e) => return Err(Error::read_failed(source, &e)),
            }

            match str::from_utf8(&buf) {
                Ok(line) => {
                    let temp_result = self.execute_command_string(line);
                    if let Err(e) = temp_result {
                        error!("{}:{}: {:?}", source, line_number, e);
                        eprintln!("msh: {}", e);
                        self.last_exit_status = GENERAL_FAILURE_EXIT_STATUS;
                    }
                }
                Err(_) => {
                    warn!("{}:{}: skipping line that is not valid UTF-8", source, line_number);
                    eprintln!(
                        "msh: {}: line {}: invalid UTF-8, line skipped",
                        source, line_number
                    );
                    self.last_exit_status = USAGE_ERROR_EXIT_STATUS;
                }
            }
        }

        Ok(())
    }
}

impl Shell for ForegroundShell {
    fn execute_command_string(&mut self, input: &str) -> Result<()> {
        let input = input.trim();
        if !input.is_empty() && self.config.enable_command_history {
            self.editor.add_history_entry(input);
        }

        let argv = match self.tokenizer.tokenize(input) {
            Ok(argv) => argv,
            Err(e) => {
                let program = input.split_whitespace().next().unwrap_or_default();
                eprintln!("msh: {}: {}", program, e);
                self.last_exit_status = USAGE_ERROR_EXIT_STATUS;
                return Ok(());
            }
        };

        if let Some(program) = argv.program() {
            if builtins::is_builtin(program) {
                let (status, result) =
                    builtins::run(self, program, argv.args(), &mut io::stdout());
                if let Err(e) = result {
                    eprintln!("msh: {}", e);
                }
                self.last_exit_status = status;
                self.dispatch_signals();
                return Ok(());
            }
        }

        let program = argv.program().unwrap_or_default().to_string();
        match self.runner.run(argv) {
            Ok(RunOutcome::NoOp) => {}
            Ok(RunOutcome::Quit) => self.exit(None),
            Ok(RunOutcome::Finished(job)) => {
                self.consecutive_spawn_failures = 0;
                self.report_outcome(&job);
            }
            Err(e) => self.handle_run_error(&program, e),
        }

        self.dispatch_signals();
        Ok(())
    }

    fn execute_commands_from_file(&mut self, path: &Path) -> Result<()> {
        let source = path.display().to_string();
        let f = File::open(path).map_err(|e| Error::read_failed(&source, &e))?;
        self.execute_lines(BufReader::new(f), &source)
    }

    fn execute_from_stdin(&mut self) {
        if !self.is_interactive {
            let stdin = io::stdin();
            let temp_result = self.execute_lines(stdin.lock(), "stdin");
            if let Err(e) = temp_result {
                error!("execute_from_stdin: {}", e);
                eprintln!("msh: {}", e);
                self.last_exit_status = GENERAL_FAILURE_EXIT_STATUS;
            }
            return;
        }

        loop {
            self.dispatch_signals();

            let input = match self.prompt() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                e => {
                    log_if_err!(e, "prompt");
                    continue;
                }
            };

            if let Err(e) = self.execute_command_string(&input) {
                error!("execute_command_string: {}", e);
                eprintln!("msh: {}", e);
                self.last_exit_status = GENERAL_FAILURE_EXIT_STATUS;
            }
        }
    }

    fn exit(&mut self, n: Option<i32>) -> ! {
        if self.config.display_messages {
            println!("exit");
        }

        let code = n.unwrap_or(self.last_exit_status);
        let code_like_u8 = if code < 0 {
            (256 + code % 256) % 256
        } else {
            code % 256
        };

        if self.config.enable_command_history {
            if let Some(ref history_file) = self.history_file {
                if let Err(e) = self.editor.save_history(history_file) {
                    error!(
                        "error: failed to save history to file during shutdown: {}",
                        e
                    );
                }
            }
        }

        let temp_result = io::stdout().flush();
        log_if_err!(temp_result, "flush stdout");

        info!("msh has shut down");
        process::exit(code_like_u8);
    }

    fn is_interactive(&self) -> bool {
        self.is_interactive
    }

    fn last_exit_status(&self) -> i32 {
        self.last_exit_status
    }
}

impl fmt::Debug for ForegroundShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "last status: {}\tsignals: {:?}\n{:?}",
            self.last_exit_status, self.counters, self.editor
        )
    }
}

pub fn create_shell(config: ShellConfig) -> Result<Box<dyn Shell>> {
    let shell = ForegroundShell::new(config)?;
    Ok(Box::new(shell))
}

fn install_signal_table() -> Result<SignalTable<SignalCounters>> {
    let mut table = SignalTable::install()?;

    // The foreground child receives the same SIGINT and usually dies of it;
    // end the line it may have left unterminated.
    table.register(SignalKind::Interrupt, |counters: &mut SignalCounters, _| {
        counters.interrupts += 1;
        println!();
    })?;
    table.register(
        SignalKind::ChildTerminated,
        |counters: &mut SignalCounters, kind| {
            counters.children_terminated += 1;
            debug!("received {}", kind.signal());
        },
    )?;

    Ok(table)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempdir::TempDir;

    use super::*;

    fn noninteractive_shell() -> ForegroundShell {
        ForegroundShell::new(ShellConfig::noninteractive()).unwrap()
    }

    #[test]
    fn records_exit_status_of_programs() {
        let mut shell = noninteractive_shell();
        shell.execute_command_string("true").unwrap();
        assert_eq!(shell.last_exit_status(), 0);

        shell.execute_command_string("false").unwrap();
        assert_eq!(shell.last_exit_status(), 1);

        let dir = TempDir::new("msh-shell").unwrap();
        let script = dir.path().join("exit3.sh");
        fs::write(&script, "exit 3\n").unwrap();
        shell
            .execute_command_string(&format!("sh {}", script.display()))
            .unwrap();
        assert_eq!(shell.last_exit_status(), 3);
    }

    #[test]
    fn empty_line_keeps_previous_status() {
        let mut shell = noninteractive_shell();
        shell.execute_command_string("false").unwrap();
        shell.execute_command_string("   ").unwrap();
        assert_eq!(shell.last_exit_status(), 1);
    }

    #[test]
    fn missing_command_is_127() {
        let mut shell = noninteractive_shell();
        shell
            .execute_command_string("msh-test-no-such-command-xyz")
            .unwrap();
        assert_eq!(shell.last_exit_status(), COMMAND_NOT_FOUND_EXIT_STATUS);
    }

    #[test]
    fn not_executable_is_126() {
        let dir = TempDir::new("msh-shell").unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, "data\n").unwrap();

        let mut shell = noninteractive_shell();
        shell
            .execute_command_string(&file.display().to_string())
            .unwrap();
        assert_eq!(shell.last_exit_status(), NOT_EXECUTABLE_EXIT_STATUS);
    }

    #[test]
    fn too_many_arguments_is_usage_error() {
        let mut shell =
            ForegroundShell::new(ShellConfig::noninteractive().with_max_arguments(2)).unwrap();
        shell.execute_command_string("true a b").unwrap();
        assert_eq!(shell.last_exit_status(), USAGE_ERROR_EXIT_STATUS);

        shell.execute_command_string("true a").unwrap();
        assert_eq!(shell.last_exit_status(), 0);
    }

    #[test]
    fn builtin_failures_set_status() {
        let mut shell = noninteractive_shell();
        shell
            .execute_command_string("cd /msh-test-no-such-directory")
            .unwrap();
        assert_eq!(shell.last_exit_status(), 1);

        shell.execute_command_string("cd a b").unwrap();
        assert_eq!(shell.last_exit_status(), 2);

        shell.execute_command_string("help nosuchtopic").unwrap();
        assert_eq!(shell.last_exit_status(), 1);

        shell.execute_command_string("help cd").unwrap();
        assert_eq!(shell.last_exit_status(), 0);
    }

    #[test]
    fn runs_commands_from_file() {
        let dir = TempDir::new("msh-shell").unwrap();
        let script = dir.path().join("commands");
        fs::write(&script, "true\n\nfalse\n").unwrap();

        let mut shell = noninteractive_shell();
        shell.execute_commands_from_file(&script).unwrap();
        assert_eq!(shell.last_exit_status(), 1);
    }

    #[test]
    fn missing_script_file_is_an_error() {
        let dir = TempDir::new("msh-shell").unwrap();
        let mut shell = noninteractive_shell();
        let path = dir.path().join("absent");
        let err = shell.execute_commands_from_file(&path).unwrap_err();
        assert_eq!(
            *err.kind(),
            ErrorKind::ReadFailed {
                source: path.display().to_string(),
                reason: "No such file or directory".to_string(),
            }
        );
    }

    #[test]
    fn invalid_utf8_line_is_skipped() {
        let mut shell = noninteractive_shell();
        let input: &[u8] = b"false\n\xff\xfe\ntrue\n";
        shell.execute_lines(input, "stdin").unwrap();
        assert_eq!(shell.last_exit_status(), 0);

        let input: &[u8] = b"true\n\xff\n";
        shell.execute_lines(input, "stdin").unwrap();
        assert_eq!(shell.last_exit_status(), USAGE_ERROR_EXIT_STATUS);
    }

    #[test]
    fn lines_after_a_failure_still_run() {
        let dir = TempDir::new("msh-shell").unwrap();
        let marker = dir.path().join("marker");
        let input = format!(
            "msh-test-no-such-command-xyz\ntrue a\0b\ntouch {}\n",
            marker.display()
        );
        let mut shell = noninteractive_shell();
        shell.execute_lines(input.as_bytes(), "stdin").unwrap();
        assert!(marker.exists());
        assert_eq!(shell.last_exit_status(), 0);
    }

    #[test]
    fn spawn_failures_are_counted_and_reset() {
        let mut shell = ForegroundShell::new(
            ShellConfig::noninteractive().with_max_consecutive_spawn_failures(100),
        )
        .unwrap();

        shell.handle_run_error("true", Error::spawn_failed("true", Errno::EAGAIN));
        shell.handle_run_error("true", Error::spawn_failed("true", Errno::EMFILE));
        assert_eq!(shell.last_exit_status(), GENERAL_FAILURE_EXIT_STATUS);
        assert_eq!(shell.consecutive_spawn_failures, 2);

        shell.execute_command_string("true").unwrap();
        assert_eq!(shell.consecutive_spawn_failures, 0);
        assert_eq!(shell.last_exit_status(), 0);
    }

    #[test]
    fn other_run_errors_are_reported_per_command() {
        let mut shell = noninteractive_shell();
        shell.handle_run_error("sleep", Error::wait_failed(1, Errno::ECHILD));
        assert_eq!(shell.last_exit_status(), GENERAL_FAILURE_EXIT_STATUS);
        assert_eq!(shell.consecutive_spawn_failures, 0);

        shell.handle_run_error("true", Error::from(ErrorKind::Nix));
        assert_eq!(shell.last_exit_status(), GENERAL_FAILURE_EXIT_STATUS);
    }

    #[test]
    fn exit_with_non_numeric_argument_is_usage_error() {
        let mut shell = noninteractive_shell();
        shell.execute_command_string("exit abc").unwrap();
        assert_eq!(shell.last_exit_status(), USAGE_ERROR_EXIT_STATUS);

        shell.execute_command_string("exit 1 2").unwrap();
        assert_eq!(shell.last_exit_status(), GENERAL_FAILURE_EXIT_STATUS);
    }

    #[test]
    fn noninteractive_shell_has_no_signal_table() {
        let shell = noninteractive_shell();
        assert!(!shell.is_interactive());
        assert!(shell.signals.is_none());
        assert_eq!(shell.signal_counters(), SignalCounters::default());
    }
}
