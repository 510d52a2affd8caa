//! Msh builtins
//!
//! Commands that must run inside the shell process because they change or
//! report the shell's own state. Where possible the commands conform to
//! their standard Bash counterparts.

use std::iter;

use docopt::Docopt;
use serde::de::DeserializeOwned;

use self::prelude::*;

use self::dirs::{Cd, Pwd};
use self::exit::Exit;
use self::help::Help;

pub mod prelude {
    pub use std::io::Write;

    pub use failure::ResultExt;

    pub use super::parse_args;
    pub use crate::errors::{Error, ErrorKind, Result};
    pub use crate::shell::Shell;
}

mod dirs;
mod exit;
mod help;

const CD_NAME: &str = "cd";
const EXIT_NAME: &str = "exit";
const HELP_NAME: &str = "help";
const PWD_NAME: &str = "pwd";

/// Represents a Msh builtin command such as cd or help.
pub trait BuiltinCommand {
    /// The NAME of the command.
    const NAME: &'static str;
    /// The help string to display to the user.
    const HELP: &'static str;
    /// The usage string to display to the user.
    fn usage() -> String {
        Self::HELP.lines().next().unwrap_or_default().to_owned()
    }
    /// Runs the command with the given arguments in the `shell` environment.
    fn run<T: AsRef<str>>(shell: &mut dyn Shell, args: &[T], stdout: &mut dyn Write)
        -> Result<()>;
}

pub fn is_builtin<T: AsRef<str>>(program: T) -> bool {
    [CD_NAME, EXIT_NAME, HELP_NAME, PWD_NAME].contains(&program.as_ref())
}

/// precondition: command is a builtin.
/// Returns (`exit_status_code`, `builtin_result`)
pub fn run<S1, S2>(
    shell: &mut dyn Shell,
    program: S1,
    args: &[S2],
    stdout: &mut dyn Write,
) -> (i32, Result<()>)
where
    S1: AsRef<str>,
    S2: AsRef<str>,
{
    debug_assert!(is_builtin(&program));

    let result = match program.as_ref() {
        CD_NAME => Cd::run(shell, args, stdout),
        EXIT_NAME => Exit::run(shell, args, stdout),
        HELP_NAME => Help::run(shell, args, stdout),
        PWD_NAME => Pwd::run(shell, args, stdout),
        other => Err(Error::builtin_command(
            format!("{}: not a shell builtin", other),
            1,
        )),
    };

    let exit_status = get_builtin_exit_status(&result);
    (exit_status, result)
}

fn get_builtin_exit_status(result: &Result<()>) -> i32 {
    if let Err(ref e) = *result {
        match *e.kind() {
            ErrorKind::BuiltinCommand { code, .. } => code,
            _ => 1,
        }
    } else {
        0
    }
}

/// Parses builtin arguments against a docopt `usage` string.
///
/// A mismatch is reported as a usage error (status 2) carrying `usage`.
pub fn parse_args<D, S, I>(usage: &str, program: S, args: I) -> Result<D>
where
    D: DeserializeOwned,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let argv: Vec<String> = iter::once(program)
        .chain(args)
        .map(|s| s.as_ref().to_string())
        .collect();
    Docopt::new(usage)
        .and_then(|d| d.argv(argv).deserialize())
        .map_err(|_| Error::builtin_command(usage.trim(), 2))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct ExitArgs {
        arg_n: Option<i32>,
    }

    const EXIT_USAGE: &str = "Usage: exit [<n>]";

    #[test]
    fn recognizes_builtins() {
        assert!(is_builtin("cd"));
        assert!(is_builtin("pwd"));
        assert!(is_builtin("exit"));
        assert!(is_builtin("help"));
        assert!(!is_builtin("quit"));
        assert!(!is_builtin("ls"));
    }

    #[test]
    fn exit_status_of_results() {
        assert_eq!(get_builtin_exit_status(&Ok(())), 0);
        assert_eq!(
            get_builtin_exit_status(&Err(Error::builtin_command("usage", 2))),
            2
        );
        assert_eq!(
            get_builtin_exit_status(&Err(Error::from(ErrorKind::Io))),
            1
        );
    }

    #[test]
    fn parse_args_accepts_valid_input() {
        let args: ExitArgs = parse_args(EXIT_USAGE, "exit", vec!["3"]).unwrap();
        assert_eq!(args.arg_n, Some(3));

        let args: ExitArgs = parse_args(EXIT_USAGE, "exit", Vec::<&str>::new()).unwrap();
        assert_eq!(args.arg_n, None);
    }

    #[test]
    fn parse_args_rejects_invalid_input() {
        let result: Result<ExitArgs> = parse_args(EXIT_USAGE, "exit", vec!["1", "2"]);
        let err = result.unwrap_err();
        assert_eq!(
            *err.kind(),
            ErrorKind::BuiltinCommand {
                message: EXIT_USAGE.to_string(),
                code: 2
            }
        );
    }
}
