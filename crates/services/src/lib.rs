#![forbid(unsafe_code)]

pub mod calculator;
pub mod cascade;
pub mod engine;
pub mod error;
pub mod reconciler;
pub mod session;
pub mod store;

pub use progress_core::Clock;

pub use calculator::{LastAccessed, ProgressCalculator};
pub use cascade::{CascadeOutcome, CompletionCascade};
pub use engine::ProgressEngine;
pub use error::ProgressError;
pub use reconciler::SyncReconciler;
pub use session::{FixedSession, SessionGate};
pub use store::ProgressStore;
