//! Error module. See the [failure](https://crates.io/crates/failure) crate for details.

use std::fmt;
use std::io;
use std::result;

use failure::{Backtrace, Context, Fail};
use nix::errno::Errno;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    ctx: Context<ErrorKind>,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.ctx.get_context()
    }

    pub(crate) fn too_many_arguments(limit: usize, found: usize) -> Error {
        Error::from(ErrorKind::TooManyArguments { limit, found })
    }

    pub(crate) fn path_too_long<T: AsRef<str>>(path: T) -> Error {
        Error::from(ErrorKind::PathTooLong(path.as_ref().to_string()))
    }

    pub(crate) fn invalid_argument<T: AsRef<str>>(arg: T) -> Error {
        Error::from(ErrorKind::InvalidArgument(arg.as_ref().to_string()))
    }

    pub(crate) fn spawn_failed<T: AsRef<str>>(command: T, errno: Errno) -> Error {
        Error::from(ErrorKind::SpawnFailed {
            command: command.as_ref().to_string(),
            errno,
        })
    }

    pub(crate) fn exec_failed<T: AsRef<str>>(command: T, errno: Errno) -> Error {
        Error::from(ErrorKind::ExecFailed {
            command: command.as_ref().to_string(),
            errno,
        })
    }

    pub(crate) fn wait_failed(pid: i32, errno: Errno) -> Error {
        Error::from(ErrorKind::WaitFailed { pid, errno })
    }

    pub(crate) fn invalid_job_transition<T: AsRef<str>>(transition: T) -> Error {
        Error::from(ErrorKind::InvalidJobTransition(
            transition.as_ref().to_string(),
        ))
    }

    pub(crate) fn read_failed<T: AsRef<str>>(source: T, err: &io::Error) -> Error {
        Error::from(ErrorKind::ReadFailed {
            source: source.as_ref().to_string(),
            reason: describe_io_error(err),
        })
    }

    pub(crate) fn builtin_command<T: AsRef<str>>(message: T, code: i32) -> Error {
        Error::from(ErrorKind::BuiltinCommand {
            message: message.as_ref().to_string(),
            code,
        })
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.ctx.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.ctx.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.ctx, f)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The command line holds more tokens than the tokenizer accepts.
    TooManyArguments { limit: usize, found: usize },
    /// A resolved executable path exceeds `PATH_MAX`.
    PathTooLong(String),
    /// A token cannot be handed to the OS, e.g. it contains a NUL byte.
    InvalidArgument(String),
    /// The child could not be created (fork or status pipe); no child exists.
    SpawnFailed { command: String, errno: Errno },
    /// The child could not replace its program image.
    ExecFailed { command: String, errno: Errno },
    /// The OS has no waitable child with this pid.
    WaitFailed { pid: i32, errno: Errno },
    InvalidJobTransition(String),
    SignalTableInUse,
    BuiltinCommand { message: String, code: i32 },
    /// A script or stdin could not be opened or read.
    ReadFailed { source: String, reason: String },
    Io,
    Nix,
    Readline,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ErrorKind::TooManyArguments { limit, found } => write!(
                f,
                "too many arguments ({} given, at most {} allowed)",
                found, limit
            ),
            ErrorKind::PathTooLong(ref path) => write!(f, "{}: path too long", path),
            ErrorKind::InvalidArgument(ref arg) => write!(f, "{:?}: invalid argument", arg),
            ErrorKind::SpawnFailed { ref command, errno } => {
                write!(f, "{}: cannot create process: {}", command, errno.desc())
            }
            ErrorKind::ExecFailed { ref command, errno } => match errno {
                Errno::ENOENT => write!(f, "{}: command not found", command),
                _ => write!(f, "{}: {}", command, errno.desc()),
            },
            ErrorKind::WaitFailed { pid, errno } => {
                write!(f, "wait for process {} failed: {}", pid, errno.desc())
            }
            ErrorKind::InvalidJobTransition(ref transition) => {
                write!(f, "invalid job transition: {}", transition)
            }
            ErrorKind::SignalTableInUse => write!(f, "a signal table is already installed"),
            ErrorKind::BuiltinCommand { ref message, .. } => write!(f, "{}", message),
            ErrorKind::ReadFailed {
                ref source,
                ref reason,
            } => write!(f, "{}: {}", source, reason),
            ErrorKind::Io => write!(f, "I/O error occurred"),
            ErrorKind::Nix => write!(f, "Nix error occurred"),
            ErrorKind::Readline => write!(f, "Readline error occurred"),
        }
    }
}

/// The OS description of `err` without the "(os error N)" suffix.
pub(crate) fn describe_io_error(err: &io::Error) -> String {
    match err.raw_os_error() {
        Some(raw) => Errno::from_i32(raw).desc().to_string(),
        None => err.to_string(),
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::from(Context::new(kind))
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(ctx: Context<ErrorKind>) -> Error {
        Error { ctx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_failed_not_found_message() {
        let e = Error::exec_failed("nosuchcmd", Errno::ENOENT);
        assert_eq!(e.to_string(), "nosuchcmd: command not found");
        assert_eq!(
            *e.kind(),
            ErrorKind::ExecFailed {
                command: "nosuchcmd".to_string(),
                errno: Errno::ENOENT
            }
        );
    }

    #[test]
    fn read_failed_message_uses_errno_description() {
        let err = io::Error::from_raw_os_error(Errno::ENOENT as i32);
        let e = Error::read_failed("script.msh", &err);
        assert_eq!(e.to_string(), "script.msh: No such file or directory");

        let err = io::Error::new(io::ErrorKind::InvalidData, "stream did not contain valid UTF-8");
        let e = Error::read_failed("stdin", &err);
        assert_eq!(e.to_string(), "stdin: stream did not contain valid UTF-8");
    }

    #[test]
    fn too_many_arguments_message() {
        let e = Error::too_many_arguments(2, 3);
        assert_eq!(
            e.to_string(),
            "too many arguments (3 given, at most 2 allowed)"
        );
    }
}
