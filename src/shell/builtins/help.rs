use crate::shell::builtins::{self, prelude::*, BuiltinCommand};
use crate::shell::builtins::{dirs::{Cd, Pwd}, exit::Exit};

pub struct Help;

impl BuiltinCommand for Help {
    const NAME: &'static str = builtins::HELP_NAME;

    const HELP: &'static str = "\
help: help [command ...]
    Display helpful information about builtin commands. If COMMAND is specified,
    gives detailed help on all commands matching COMMAND, otherwise a list of the
    builtins is printed.";

    fn run<T: AsRef<str>>(
        _shell: &mut dyn Shell,
        args: &[T],
        stdout: &mut dyn Write,
    ) -> Result<()> {
        if args.is_empty() {
            for usage in &[Cd::usage(), Exit::usage(), Help::usage(), Pwd::usage()] {
                writeln!(stdout, "{}", usage).context(ErrorKind::Io)?;
            }
            return Ok(());
        }

        let mut matched = false;
        for arg in args {
            if let Some(text) = help_text(arg.as_ref()) {
                writeln!(stdout, "{}", text).context(ErrorKind::Io)?;
                matched = true;
            }
        }

        if !matched {
            let topic: &str = args.last().map(|t| t.as_ref()).unwrap_or_default();
            return Err(Error::builtin_command(
                format!("help: no help topics match `{}'", topic),
                1,
            ));
        }
        Ok(())
    }
}

fn help_text(topic: &str) -> Option<&'static str> {
    match topic {
        builtins::CD_NAME => Some(Cd::HELP),
        builtins::EXIT_NAME => Some(Exit::HELP),
        builtins::HELP_NAME => Some(Help::HELP),
        builtins::PWD_NAME => Some(Pwd::HELP),
        _ => None,
    }
}
