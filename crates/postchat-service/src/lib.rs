pub mod intent;
pub mod orchestrator;

pub use intent::Intent;
pub use orchestrator::{ChatOrchestrator, Collaborators, ToggleOutcome};
