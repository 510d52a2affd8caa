//! Msh - minimal shell
//!
//! Reads a command line, splits it on whitespace, runs the program in a
//! child process and waits for it in the foreground.

/// Logs the error of a failed `Result` at error level, prefixed by a
/// formatted context message.
#[macro_export]
macro_rules! log_if_err {
    ($result:expr, $fmt:expr $(, $arg:expr)*) => {
        if let Err(ref e) = $result {
            ::log::error!(concat!($fmt, ": {}") $(, $arg)*, e);
        }
    };
}

pub mod core;
pub mod editor;
pub mod errors;
pub mod shell;

pub use crate::shell::{create_shell, Shell, ShellConfig};
