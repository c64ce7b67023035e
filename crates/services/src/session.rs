use std::sync::atomic::{AtomicBool, Ordering};

/// External session/auth collaborator.
///
/// The engine only ever asks whether the session is authenticated and,
/// when the remote store rejects it, requests a sign-out. Everything else
/// about authentication lives outside the engine.
pub trait SessionGate: Send + Sync {
    fn is_authenticated(&self) -> bool;

    /// Invalidate the session. Called when a remote update is rejected.
    fn sign_out(&self);
}

/// Session gate with a fixed initial state, for tests and anonymous use.
#[derive(Debug, Default)]
pub struct FixedSession {
    authenticated: AtomicBool,
    signed_out: AtomicBool,
}

impl FixedSession {
    /// An authenticated session.
    #[must_use]
    pub fn authenticated() -> Self {
        Self {
            authenticated: AtomicBool::new(true),
            signed_out: AtomicBool::new(false),
        }
    }

    /// An anonymous session.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// True once `sign_out` has been invoked.
    #[must_use]
    pub fn was_signed_out(&self) -> bool {
        self.signed_out.load(Ordering::SeqCst)
    }
}

impl SessionGate for FixedSession {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst) && !self.signed_out.load(Ordering::SeqCst)
    }

    fn sign_out(&self) {
        self.signed_out.store(true, Ordering::SeqCst);
    }
}
