use std::fmt;

use nix::{
    libc,
    sys::{signal::Signal, wait::WaitStatus},
    unistd::Pid,
};

use crate::core::tokenizer::ArgumentVector;
use crate::errors::{Error, Result};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ProcessId(libc::pid_t);

impl ProcessId {
    pub fn as_raw(self) -> libc::pid_t {
        self.0
    }
}

impl From<libc::pid_t> for ProcessId {
    fn from(value: libc::pid_t) -> Self {
        ProcessId(value)
    }
}

impl From<Pid> for ProcessId {
    fn from(value: Pid) -> Self {
        ProcessId(value.as_raw())
    }
}

impl From<ProcessId> for Pid {
    fn from(value: ProcessId) -> Self {
        Pid::from_raw(value.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a reaped child terminated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitOutcome {
    /// The child called exit(2) with this status.
    Exited(u8),
    /// The child was terminated by a signal. The flag records a core dump.
    Signaled(Signal, bool),
}

impl ExitOutcome {
    /// Decodes a raw wait(2) status word.
    ///
    /// Returns `None` for statuses that do not describe termination, e.g. a
    /// stopped child.
    pub fn from_raw(status: i32) -> Option<Self> {
        WaitStatus::from_raw(Pid::from_raw(0), status)
            .ok()
            .and_then(Self::from_wait_status)
    }

    pub fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(ExitOutcome::Exited(code as u8)),
            WaitStatus::Signaled(_, signal, core_dumped) => {
                Some(ExitOutcome::Signaled(signal, core_dumped))
            }
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        *self == ExitOutcome::Exited(0)
    }

    /// Shell-style status: the exit code, or 128 plus the signal number.
    pub fn code(&self) -> i32 {
        match *self {
            ExitOutcome::Exited(code) => i32::from(code),
            ExitOutcome::Signaled(signal, _) => 128 + signal as i32,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ExitOutcome::Exited(code) => write!(f, "exited with {}", code),
            ExitOutcome::Signaled(signal, true) => {
                write!(f, "terminated by {} (core dumped)", signal)
            }
            ExitOutcome::Signaled(signal, false) => write!(f, "terminated by {}", signal),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    Created,
    Running(ProcessId),
    Reaped(ProcessId, ExitOutcome),
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            JobState::Created => write!(f, "Created"),
            JobState::Running(_) => write!(f, "Running"),
            JobState::Reaped(..) => write!(f, "Reaped"),
        }
    }
}

/// One spawned child process.
#[derive(Clone, Debug)]
pub struct Job {
    argv: ArgumentVector,
    state: JobState,
}

impl Job {
    pub fn new(argv: ArgumentVector) -> Self {
        Self {
            argv,
            state: JobState::Created,
        }
    }

    pub fn argv(&self) -> &ArgumentVector {
        &self.argv
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// `None` until the child has been forked.
    pub fn id(&self) -> Option<ProcessId> {
        match self.state {
            JobState::Created => None,
            JobState::Running(pid) | JobState::Reaped(pid, _) => Some(pid),
        }
    }

    /// `None` until the child has been reaped.
    pub fn outcome(&self) -> Option<ExitOutcome> {
        match self.state {
            JobState::Reaped(_, outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        match self.state {
            JobState::Running(_) => true,
            _ => false,
        }
    }

    pub fn is_reaped(&self) -> bool {
        self.outcome().is_some()
    }

    pub(crate) fn mark_running(&mut self, pid: ProcessId) -> Result<()> {
        match self.state {
            JobState::Created => {
                self.state = JobState::Running(pid);
                Ok(())
            }
            state => Err(Error::invalid_job_transition(format!(
                "{} -> Running",
                state
            ))),
        }
    }

    pub(crate) fn mark_reaped(&mut self, outcome: ExitOutcome) -> Result<()> {
        match self.state {
            JobState::Running(pid) => {
                self.state = JobState::Reaped(pid, outcome);
                Ok(())
            }
            state => Err(Error::invalid_job_transition(format!(
                "{} -> Reaped",
                state
            ))),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(pid) => write!(f, "[{}] {}\t{}", pid, self.state, self.argv),
            None => write!(f, "[-] {}\t{}", self.state, self.argv),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tokenizer::tokenize;
    use crate::errors::ErrorKind;

    #[test]
    fn test_decode_normal_exit() {
        assert_eq!(ExitOutcome::from_raw(0), Some(ExitOutcome::Exited(0)));
        assert_eq!(ExitOutcome::from_raw(1 << 8), Some(ExitOutcome::Exited(1)));
        assert_eq!(
            ExitOutcome::from_raw(112 << 8),
            Some(ExitOutcome::Exited(112))
        );
        assert_eq!(
            ExitOutcome::from_raw(255 << 8),
            Some(ExitOutcome::Exited(255))
        );
    }

    #[test]
    fn test_decode_signaled() {
        let sigterm = libc::SIGTERM;
        assert_eq!(
            ExitOutcome::from_raw(sigterm),
            Some(ExitOutcome::Signaled(Signal::SIGTERM, false))
        );

        let sigsegv_core = libc::SIGSEGV | 0x80;
        assert_eq!(
            ExitOutcome::from_raw(sigsegv_core),
            Some(ExitOutcome::Signaled(Signal::SIGSEGV, true))
        );
    }

    #[test]
    fn test_decode_stopped_is_not_termination() {
        let stopped = (libc::SIGSTOP << 8) | 0x7f;
        assert_eq!(ExitOutcome::from_raw(stopped), None);
    }

    #[test]
    fn test_shell_code() {
        assert_eq!(ExitOutcome::Exited(3).code(), 3);
        assert_eq!(ExitOutcome::Signaled(Signal::SIGKILL, false).code(), 137);
        assert!(ExitOutcome::Exited(0).success());
        assert!(!ExitOutcome::Signaled(Signal::SIGINT, false).success());
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = Job::new(tokenize("cmd arg1").unwrap());
        assert_eq!(job.state(), JobState::Created);
        assert_eq!(job.id(), None);
        assert_eq!(job.outcome(), None);

        let pid = ProcessId::from(42);
        job.mark_running(pid).unwrap();
        assert!(job.is_running());
        assert_eq!(job.id(), Some(pid));
        assert_eq!(job.outcome(), None);

        job.mark_reaped(ExitOutcome::Exited(0)).unwrap();
        assert!(job.is_reaped());
        assert_eq!(job.id(), Some(pid));
        assert_eq!(job.state(), JobState::Reaped(pid, ExitOutcome::Exited(0)));
    }

    #[test]
    fn test_job_rejects_invalid_transitions() {
        let mut job = Job::new(tokenize("cmd").unwrap());
        let err = job.mark_reaped(ExitOutcome::Exited(0)).unwrap_err();
        assert_eq!(
            *err.kind(),
            ErrorKind::InvalidJobTransition("Created -> Reaped".to_string())
        );

        job.mark_running(ProcessId::from(7)).unwrap();
        assert!(job.mark_running(ProcessId::from(8)).is_err());

        job.mark_reaped(ExitOutcome::Exited(1)).unwrap();
        assert!(job.mark_reaped(ExitOutcome::Exited(2)).is_err());
        assert_eq!(job.outcome(), Some(ExitOutcome::Exited(1)));
    }
}
