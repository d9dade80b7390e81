//! Operation guard
//!
//! Single-flight and debounce rules shared by every user-triggered operation.
//! Each kind of operation owns an in-progress flag, the instant it last fired
//! and at most one deferred call. The flag is only ever cleared by dropping
//! the [`OperationPermit`] that set it, so error paths and cancelled futures
//! release it too.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Kind of a guarded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// General dashboard refresh (which also runs a verification)
    Refresh,
    /// Dispatch of a probe job
    Verification,
}

impl OperationKind {
    fn other(self) -> Self {
        match self {
            OperationKind::Refresh => OperationKind::Verification,
            OperationKind::Verification => OperationKind::Refresh,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Refresh => f.write_str("refresh"),
            OperationKind::Verification => f.write_str("verification"),
        }
    }
}

/// Decision taken for an incoming trigger
#[derive(Debug)]
pub enum Admission {
    /// Run now; the permit holds the lock until dropped
    Run(OperationPermit),
    /// Fired too recently; run once the debounce window has elapsed
    Defer,
    /// An operation of this kind is in progress; drop the trigger
    Busy(OperationKind),
}

/// Handle of an armed deferred call
#[derive(Debug, Clone)]
pub struct DeferredCall {
    pub id: u64,
    pub token: CancellationToken,
}

#[derive(Debug, Default)]
struct OperationGuard {
    in_progress: bool,
    last_fired: Option<Instant>,
    deferred: Option<DeferredCall>,
}

#[derive(Debug)]
struct LockState {
    refresh: OperationGuard,
    verification: OperationGuard,
    next_deferred_id: u64,
}

impl LockState {
    fn guard(&mut self, kind: OperationKind) -> &mut OperationGuard {
        match kind {
            OperationKind::Refresh => &mut self.refresh,
            OperationKind::Verification => &mut self.verification,
        }
    }

    fn blocker(&mut self, kind: OperationKind, nested: bool) -> Option<OperationKind> {
        if self.guard(kind).in_progress {
            return Some(kind);
        }
        let other = kind.other();
        if !nested && self.guard(other).in_progress {
            return Some(other);
        }
        None
    }

    fn begin(&mut self, kind: OperationKind) {
        let guard = self.guard(kind);
        guard.in_progress = true;
        guard.last_fired = Some(Instant::now());
    }
}

/// Mutual exclusion and debounce across refresh and verification
#[derive(Debug, Clone)]
pub struct OperationLock {
    state: Arc<Mutex<LockState>>,
    debounce: Duration,
}

impl OperationLock {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LockState {
                refresh: OperationGuard::default(),
                verification: OperationGuard::default(),
                next_deferred_id: 0,
            })),
            debounce,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Applies the full trigger rules: single-flight first, then debounce
    pub fn admit(&self, kind: OperationKind) -> Admission {
        let mut state = self.lock_state();

        if let Some(blocker) = state.blocker(kind, false) {
            return Admission::Busy(blocker);
        }

        let recent = state
            .guard(kind)
            .last_fired
            .is_some_and(|at| at.elapsed() < self.debounce);
        if recent {
            return Admission::Defer;
        }

        state.begin(kind);
        Admission::Run(self.permit(kind))
    }

    /// Takes the lock without the debounce check
    ///
    /// Used by deferred calls, whose debounce window has already elapsed.
    pub fn try_acquire(&self, kind: OperationKind) -> Result<OperationPermit, OperationKind> {
        self.acquire(kind, false)
    }

    /// Takes the lock of `kind` as part of an operation of the other kind
    ///
    /// Only an in-progress operation of the same kind blocks.
    pub fn try_acquire_nested(&self, kind: OperationKind) -> Result<OperationPermit, OperationKind> {
        self.acquire(kind, true)
    }

    fn acquire(&self, kind: OperationKind, nested: bool) -> Result<OperationPermit, OperationKind> {
        let mut state = self.lock_state();
        if let Some(blocker) = state.blocker(kind, nested) {
            return Err(blocker);
        }
        state.begin(kind);
        Ok(self.permit(kind))
    }

    /// Arms the deferred call of `kind`, superseding any earlier one
    pub fn arm_deferred(&self, kind: OperationKind) -> DeferredCall {
        let mut state = self.lock_state();
        state.next_deferred_id += 1;
        let call = DeferredCall {
            id: state.next_deferred_id,
            token: CancellationToken::new(),
        };
        if let Some(previous) = state.guard(kind).deferred.replace(call.clone()) {
            previous.token.cancel();
        }
        call
    }

    /// Forgets the deferred call of `kind` if `id` is still the armed one
    pub fn disarm(&self, kind: OperationKind, id: u64) {
        let mut state = self.lock_state();
        let guard = state.guard(kind);
        if guard.deferred.as_ref().is_some_and(|call| call.id == id) {
            guard.deferred = None;
        }
    }

    /// Cancels every deferred call
    pub fn cancel_deferred(&self) {
        let mut state = self.lock_state();
        for kind in [OperationKind::Refresh, OperationKind::Verification] {
            if let Some(call) = state.guard(kind).deferred.take() {
                call.token.cancel();
            }
        }
    }

    pub fn is_in_progress(&self, kind: OperationKind) -> bool {
        self.lock_state().guard(kind).in_progress
    }

    pub fn has_deferred(&self, kind: OperationKind) -> bool {
        self.lock_state().guard(kind).deferred.is_some()
    }

    fn permit(&self, kind: OperationKind) -> OperationPermit {
        OperationPermit {
            state: Arc::clone(&self.state),
            kind,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held while an operation runs; releases the lock when dropped
#[derive(Debug)]
pub struct OperationPermit {
    state: Arc<Mutex<LockState>>,
    kind: OperationKind,
}

impl OperationPermit {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.guard(self.kind).in_progress = false;
    }
}
