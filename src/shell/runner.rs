//! Runs one command in a forked child and blocks until it terminates.
//!
//! Exec failures are reported through a close-on-exec status pipe rather than
//! through the child's exit code: if `execv` succeeds the kernel closes the
//! write end and the parent reads EOF, otherwise the child writes its errno
//! before exiting. A program that exits with `EXEC_FAILED_EXIT_STATUS` on its
//! own is therefore still reported as a normal exit.

use std::env;
use std::ffi::{CString, OsStr};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::ptr;

use failure::Fail;
use log::{debug, info, warn};
use nix::{
    errno::Errno,
    libc,
    sys::wait,
    unistd::{self, ForkResult, Pid},
};

use crate::core::{
    job::{ExitOutcome, Job, JobState},
    tokenizer::ArgumentVector,
};
use crate::errors::{Error, ErrorKind, Result};

/// Exit status of a child whose program image could not be replaced.
///
/// Used only so the child has something to exit with; the parent learns
/// about the failure from the status pipe.
pub const EXEC_FAILED_EXIT_STATUS: i32 = 127;

/// Token that ends the interactive loop instead of being spawned.
pub const DEFAULT_EXIT_SENTINEL: &str = "quit";

/// Searched when `PATH` is unset or empty.
const FALLBACK_SEARCH_PATH: &str = "/bin:/usr/bin";

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub exit_sentinel: String,
    /// Directories searched for programs without a `/`. `None` reads `PATH`
    /// at spawn time.
    pub search_path: Option<Vec<PathBuf>>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            exit_sentinel: DEFAULT_EXIT_SENTINEL.to_string(),
            search_path: None,
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The command line was empty, nothing was spawned.
    NoOp,
    /// The exit sentinel was entered, nothing was spawned.
    Quit,
    /// The child ran and has been reaped.
    Finished(Job),
}

#[derive(Debug, Default)]
pub struct JobRunner {
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Spawns `args` and waits for the child.
    pub fn run(&self, args: ArgumentVector) -> Result<RunOutcome> {
        match args.program() {
            None => {
                debug!("empty command line, nothing to run");
                return Ok(RunOutcome::NoOp);
            }
            Some(program) if program == self.config.exit_sentinel => {
                debug!("exit sentinel '{}' entered", program);
                return Ok(RunOutcome::Quit);
            }
            Some(_) => {}
        }

        let mut job = self.spawn(args)?;
        self.wait(&mut job)?;
        Ok(RunOutcome::Finished(job))
    }

    /// Forks a child that execs `args`.
    ///
    /// Returns once the child has replaced its program image. If that fails
    /// the child is reaped here and `ExecFailed` is returned.
    pub fn spawn(&self, args: ArgumentVector) -> Result<Job> {
        let image = ExecImage::new(&args, &self.search_dirs())?;
        let program = args.program().unwrap_or_default().to_string();
        let mut job = Job::new(args);

        let temp_result = io::stdout().flush();
        log_if_err!(temp_result, "failed to flush stdout before fork");

        let (read_end, write_end) = create_status_pipe().map_err(|errno| {
            warn!("status pipe for '{}' failed: {}", program, errno);
            Error::spawn_failed(&program, errno)
        })?;

        // The child only calls async-signal-safe functions (execv, write,
        // _exit) on memory prepared before the fork, so forking from a
        // multi-threaded process is sound.
        let fork_result = unsafe { unistd::fork() };
        match fork_result {
            Err(errno) => {
                close_fd(read_end);
                close_fd(write_end);
                warn!("fork failed for '{}': {}", program, errno);
                Err(Error::spawn_failed(program, errno))
            }
            Ok(ForkResult::Child) => unsafe { image.exec_in_child(write_end) },
            Ok(ForkResult::Parent { child }) => {
                close_fd(write_end);
                job.mark_running(child.into())?;
                debug!("forked {} for '{}'", child, program);

                let exec_status = read_exec_status(read_end).unwrap_or_else(|e| {
                    warn!("failed to read exec status of {}: {}", child, e);
                    None
                });
                close_fd(read_end);

                match exec_status {
                    None => Ok(job),
                    Some(errno) => {
                        info!("exec of '{}' failed in child {}: {}", program, child, errno);
                        let temp_result = self.wait(&mut job);
                        log_if_err!(temp_result, "failed to reap child {}", child);
                        Err(Error::exec_failed(program, errno))
                    }
                }
            }
        }
    }

    /// Blocks until the running `job` terminates and records its outcome.
    ///
    /// Only the job's own pid is waited on. Stop and continue reports are
    /// skipped and interrupted waits are restarted.
    pub fn wait(&self, job: &mut Job) -> Result<ExitOutcome> {
        let pid = match job.state() {
            JobState::Running(pid) => pid,
            state => {
                return Err(Error::invalid_job_transition(format!(
                    "cannot wait on {} job",
                    state
                )));
            }
        };

        let outcome = loop {
            match wait::waitpid(Pid::from(pid), None) {
                Ok(status) => match ExitOutcome::from_wait_status(status) {
                    Some(outcome) => break outcome,
                    None => debug!("ignoring status {:?} of {}", status, pid),
                },
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(Error::wait_failed(pid.as_raw(), errno)),
            }
        };

        job.mark_reaped(outcome)?;
        info!("{} '{}' {}", pid, job.argv(), outcome);
        Ok(outcome)
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        if let Some(ref dirs) = self.config.search_path {
            return dirs.clone();
        }

        let path = env::var_os("PATH")
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| FALLBACK_SEARCH_PATH.into());
        env::split_paths(&path)
            .map(|dir| {
                if dir.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    dir
                }
            })
            .collect()
    }
}

/// Everything the child needs to exec, allocated before forking.
struct ExecImage {
    candidates: Vec<CString>,
    _argv: Vec<CString>,
    /// NULL-terminated pointers into `_argv`.
    argv_ptrs: Vec<*const libc::c_char>,
}

impl ExecImage {
    fn new(args: &ArgumentVector, search_dirs: &[PathBuf]) -> Result<Self> {
        let program = args
            .program()
            .ok_or_else(|| Error::invalid_argument(""))?;
        let argv = args
            .iter()
            .map(|arg| to_cstring(OsStr::new(arg)))
            .collect::<Result<Vec<_>>>()?;
        let candidates = resolve_candidates(program, search_dirs)?;

        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(Some(ptr::null()))
            .collect();

        Ok(Self {
            candidates,
            _argv: argv,
            argv_ptrs,
        })
    }

    /// Tries each candidate path like execvp(3) and, if none can be executed,
    /// reports the errno on `status_fd` and exits.
    unsafe fn exec_in_child(&self, status_fd: RawFd) -> ! {
        let mut errno = libc::ENOENT;
        for candidate in &self.candidates {
            libc::execv(candidate.as_ptr(), self.argv_ptrs.as_ptr());
            match Errno::last() as i32 {
                libc::ENOENT | libc::ENOTDIR => {}
                libc::EACCES => errno = libc::EACCES,
                other => {
                    errno = other;
                    break;
                }
            }
        }

        let bytes = errno.to_ne_bytes();
        libc::write(
            status_fd,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
        );
        libc::_exit(EXEC_FAILED_EXIT_STATUS)
    }
}

/// Paths to try for `program`, in order.
fn resolve_candidates(program: &str, search_dirs: &[PathBuf]) -> Result<Vec<CString>> {
    let paths: Vec<PathBuf> = if program.contains('/') {
        vec![PathBuf::from(program)]
    } else {
        search_dirs.iter().map(|dir| dir.join(program)).collect()
    };

    paths
        .iter()
        .map(|path| {
            check_path_length(path)?;
            to_cstring(path.as_os_str())
        })
        .collect()
}

fn check_path_length(path: &Path) -> Result<()> {
    if path.as_os_str().len() >= libc::PATH_MAX as usize {
        return Err(Error::path_too_long(path.to_string_lossy()));
    }

    Ok(())
}

fn to_cstring(s: &OsStr) -> Result<CString> {
    CString::new(s.as_bytes()).map_err(|_| Error::invalid_argument(s.to_string_lossy()))
}

/// Returns (`read_end`, `write_end`), both close-on-exec.
#[cfg(any(
    target_os = "android",
    target_os = "freebsd",
    target_os = "linux",
    target_os = "netbsd",
    target_os = "openbsd"
))]
fn create_status_pipe() -> nix::Result<(RawFd, RawFd)> {
    use nix::fcntl::OFlag;

    // pipe2 sets the flag atomically so children forked concurrently by
    // other threads cannot inherit an inheritable write end.
    unistd::pipe2(OFlag::O_CLOEXEC)
}

#[cfg(not(any(
    target_os = "android",
    target_os = "freebsd",
    target_os = "linux",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
fn create_status_pipe() -> nix::Result<(RawFd, RawFd)> {
    use nix::fcntl::{self, FcntlArg, FdFlag};

    let (read_end, write_end) = unistd::pipe()?;
    for fd in &[read_end, write_end] {
        if let Err(errno) = fcntl::fcntl(*fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)) {
            close_fd(read_end);
            close_fd(write_end);
            return Err(errno);
        }
    }
    Ok((read_end, write_end))
}

/// Reads the child's exec report. `None` means the pipe hit EOF without
/// data, i.e. exec succeeded.
fn read_exec_status(fd: RawFd) -> Result<Option<Errno>> {
    let mut buf = [0u8; 4];
    let mut len = 0;
    while len < buf.len() {
        match unistd::read(fd, &mut buf[len..]) {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.context(ErrorKind::Nix).into()),
        }
    }

    match len {
        0 => Ok(None),
        4 => Ok(Some(Errno::from_i32(i32::from_ne_bytes(buf)))),
        _ => {
            warn!("short exec status report ({} bytes)", len);
            Ok(Some(Errno::EIO))
        }
    }
}

fn close_fd(fd: RawFd) {
    let temp_result = unistd::close(fd);
    log_if_err!(temp_result, "failed to close fd {}", fd);
}
