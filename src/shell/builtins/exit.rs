use crate::shell::builtins::{self, prelude::*};

pub struct Exit;

impl builtins::BuiltinCommand for Exit {
    const NAME: &'static str = builtins::EXIT_NAME;

    const HELP: &'static str = "\
exit: exit [n]
    Exit the shell with a status of N. If N is omitted, the exit status
    is that of the last command executed.";

    fn run<T: AsRef<str>>(
        shell: &mut dyn Shell,
        args: &[T],
        _stdout: &mut dyn Write,
    ) -> Result<()> {
        if args.len() > 1 {
            return Err(Error::builtin_command("exit: too many arguments", 1));
        }

        let arg: Option<&str> = args.get(0).map(|a| a.as_ref());
        let status_code = match arg {
            Some(arg) => match arg.parse::<i32>() {
                Ok(n) => Some(n),
                Err(_) => {
                    return Err(Error::builtin_command(
                        format!("exit: {}: numeric argument required", arg),
                        2,
                    ))
                }
            },
            None => None,
        };
        shell.exit(status_code);
    }
}
