//! Project lifecycle and sandboxed execution.
//!
//! [`Supervisor`] is the only owner of OS child handles. Everything it does to a
//! project happens under that project's registry slot lock, and every status
//! read goes through [`reconcile::reconcile`] first.

pub mod error;
pub mod prepare;
pub mod procstat;
pub mod profile;
pub mod reconcile;
pub mod registry;
pub mod sandbox;
pub mod supervisor;

pub use error::LifecycleError;
pub use profile::{IsolationProfile, LaunchPlan};
pub use sandbox::{SandboxBackend, backend_for};
pub use supervisor::{StartOutcome, StatusReport, Supervisor, SupervisorOptions, Usage};
