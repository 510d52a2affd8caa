//! Process-wide signal dispatch table.
//!
//! At most one callback is associated with each `SignalKind`. The handler
//! installed with sigaction(2) only sets an atomic flag; callbacks run later,
//! on the caller's thread, from `SignalTable::dispatch_pending`. Kinds without
//! a callback keep their default disposition.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use failure::ResultExt;
use log::debug;
use nix::{
    libc,
    sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal},
    unistd,
};

use crate::errors::{ErrorKind, Result};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SignalKind {
    /// SIGINT
    Interrupt,
    /// SIGUSR1
    User1,
    /// SIGUSR2
    User2,
    /// SIGCHLD
    ChildTerminated,
    /// SIGALRM
    AlarmExpired,
}

/// What the OS does with a signal that has no callback.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Disposition {
    Terminate,
    Ignore,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::Interrupt,
        SignalKind::User1,
        SignalKind::User2,
        SignalKind::ChildTerminated,
        SignalKind::AlarmExpired,
    ];

    pub fn signal(self) -> Signal {
        match self {
            SignalKind::Interrupt => Signal::SIGINT,
            SignalKind::User1 => Signal::SIGUSR1,
            SignalKind::User2 => Signal::SIGUSR2,
            SignalKind::ChildTerminated => Signal::SIGCHLD,
            SignalKind::AlarmExpired => Signal::SIGALRM,
        }
    }

    pub fn from_signal(signal: Signal) -> Option<Self> {
        from_raw(signal as libc::c_int)
    }

    pub fn default_disposition(self) -> Disposition {
        match self {
            SignalKind::ChildTerminated => Disposition::Ignore,
            _ => Disposition::Terminate,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signal())
    }
}

// Must stay async-signal-safe: called from `record_signal`.
fn from_raw(signum: libc::c_int) -> Option<SignalKind> {
    match signum {
        libc::SIGINT => Some(SignalKind::Interrupt),
        libc::SIGUSR1 => Some(SignalKind::User1),
        libc::SIGUSR2 => Some(SignalKind::User2),
        libc::SIGCHLD => Some(SignalKind::ChildTerminated),
        libc::SIGALRM => Some(SignalKind::AlarmExpired),
        _ => None,
    }
}

static PENDING: [AtomicBool; 5] = [
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
];

static INSTALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn record_signal(signum: libc::c_int) {
    if let Some(kind) = from_raw(signum) {
        PENDING[kind.index()].store(true, Ordering::SeqCst);
    }
}

/// Callbacks receive the context passed to `dispatch_pending`.
pub type Callback<C> = Box<dyn FnMut(&mut C, SignalKind)>;

pub struct SignalTable<C> {
    callbacks: HashMap<SignalKind, Callback<C>>,
}

impl<C> SignalTable<C> {
    /// Claims the process-wide table. Fails if one is already installed.
    ///
    /// Dropping the table restores the default disposition of every kind it
    /// registered.
    pub fn install() -> Result<Self> {
        if INSTALLED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ErrorKind::SignalTableInUse.into());
        }

        clear_pending();
        debug!("signal table installed");
        Ok(Self {
            callbacks: HashMap::new(),
        })
    }

    /// Associates `callback` with `kind`, replacing any previous callback.
    pub fn register<F>(&mut self, kind: SignalKind, callback: F) -> Result<()>
    where
        F: FnMut(&mut C, SignalKind) + 'static,
    {
        if !self.callbacks.contains_key(&kind) {
            let action = SigAction::new(
                SigHandler::Handler(record_signal),
                SaFlags::SA_RESTART,
                SigSet::empty(),
            );
            unsafe { signal::sigaction(kind.signal(), &action) }.context(ErrorKind::Nix)?;
        }

        if self.callbacks.insert(kind, Box::new(callback)).is_some() {
            debug!("replaced callback for {}", kind);
        } else {
            debug!("registered callback for {}", kind);
        }
        Ok(())
    }

    /// Removes the callback for `kind` and restores its default disposition.
    /// Returns `false` if no callback was registered.
    pub fn unregister(&mut self, kind: SignalKind) -> Result<bool> {
        if self.callbacks.remove(&kind).is_none() {
            return Ok(false);
        }

        restore_default(kind)?;
        PENDING[kind.index()].store(false, Ordering::SeqCst);
        Ok(true)
    }

    pub fn is_registered(&self, kind: SignalKind) -> bool {
        self.callbacks.contains_key(&kind)
    }

    /// Has `kind` been received since it was last dispatched?
    pub fn pending(&self, kind: SignalKind) -> bool {
        PENDING[kind.index()].load(Ordering::SeqCst)
    }

    /// Runs the callback of every kind received since the last dispatch, in
    /// `SignalKind::ALL` order, and returns how many ran.
    ///
    /// A kind received several times between two dispatches runs once.
    pub fn dispatch_pending(&mut self, ctx: &mut C) -> usize {
        let mut dispatched = 0;
        for &kind in SignalKind::ALL.iter() {
            if !PENDING[kind.index()].swap(false, Ordering::SeqCst) {
                continue;
            }

            match self.callbacks.get_mut(&kind) {
                Some(callback) => {
                    callback(ctx, kind);
                    dispatched += 1;
                }
                None => debug!("{} received without a callback", kind),
            }
        }

        dispatched
    }
}

impl<C> Drop for SignalTable<C> {
    fn drop(&mut self) {
        for kind in self.callbacks.keys() {
            let temp_result = restore_default(*kind);
            log_if_err!(
                temp_result,
                "failed to restore default disposition of {}",
                kind
            );
        }

        clear_pending();
        INSTALLED.store(false, Ordering::SeqCst);
        debug!("signal table removed");
    }
}

impl<C> fmt::Debug for SignalTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<_> = SignalKind::ALL
            .iter()
            .filter(|kind| self.callbacks.contains_key(*kind))
            .collect();
        write!(f, "SignalTable {{ registered: {:?} }}", registered)
    }
}

/// Arms an `AlarmExpired` notification `seconds` from now, replacing any
/// pending alarm. Returns the seconds left on the previous alarm.
pub fn alarm(seconds: u32) -> Option<u32> {
    unistd::alarm::set(seconds)
}

pub fn cancel_alarm() -> Option<u32> {
    unistd::alarm::cancel()
}

fn restore_default(kind: SignalKind) -> Result<()> {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    unsafe { signal::sigaction(kind.signal(), &action) }.context(ErrorKind::Nix)?;
    Ok(())
}

fn clear_pending() {
    for flag in PENDING.iter() {
        flag.store(false, Ordering::SeqCst);
    }
}
