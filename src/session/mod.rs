mod context;
mod controller;
mod shutdown;
mod types;

#[cfg(test)]
mod tests;

pub use context::SessionContext;
pub use controller::{DetectorFactory, SessionController, SessionControllerBuilder};
pub use types::{SessionOutcome, SessionStatus, SessionSummary};
