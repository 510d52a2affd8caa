use std::env;
use std::path::{Path, PathBuf};

use nix::unistd;
use serde::Deserialize;

use crate::shell::builtins::{self, prelude::*};

pub struct Cd;

#[derive(Debug, Deserialize)]
struct CdArgs {
    arg_dir: Option<String>,
}

const CD_USAGE: &str = "Usage: cd [<dir>]";

impl builtins::BuiltinCommand for Cd {
    const NAME: &'static str = builtins::CD_NAME;

    const HELP: &'static str = "\
cd: cd [dir]
    Change the current directory to DIR. The variable $HOME is the default dir.
    If DIR is '-', then the current directory will be the variable $OLDPWD,
    which is the last working directory.";

    fn run<T: AsRef<str>>(
        _shell: &mut dyn Shell,
        args: &[T],
        stdout: &mut dyn Write,
    ) -> Result<()> {
        let args: CdArgs = parse_args(CD_USAGE, Self::NAME, args.iter().map(|a| a.as_ref()))?;
        let dir = match args.arg_dir.as_ref().map(String::as_str) {
            None | Some("~") => ::dirs::home_dir()
                .ok_or_else(|| Error::builtin_command("cd: HOME not set", 1))?,
            Some("-") => match env::var_os("OLDPWD") {
                Some(val) => {
                    writeln!(stdout, "{}", Path::new(&val).display()).context(ErrorKind::Io)?;
                    PathBuf::from(val)
                }
                None => return Err(Error::builtin_command("cd: OLDPWD not set", 1)),
            },
            Some(val) => PathBuf::from(val),
        };

        let previous = env::current_dir().context(ErrorKind::Io)?;
        unistd::chdir(&dir).map_err(|errno| {
            Error::builtin_command(format!("cd: {}: {}", dir.display(), errno.desc()), 1)
        })?;
        env::set_var("OLDPWD", previous);
        if let Ok(current) = env::current_dir() {
            env::set_var("PWD", current);
        }
        Ok(())
    }
}

pub struct Pwd;

impl builtins::BuiltinCommand for Pwd {
    const NAME: &'static str = builtins::PWD_NAME;

    const HELP: &'static str = "\
pwd: pwd
    Print the name of the current working directory.";

    fn run<T: AsRef<str>>(
        _shell: &mut dyn Shell,
        _args: &[T],
        stdout: &mut dyn Write,
    ) -> Result<()> {
        let cwd = env::current_dir().context(ErrorKind::Io)?;
        writeln!(stdout, "{}", cwd.display()).context(ErrorKind::Io)?;
        Ok(())
    }
}
