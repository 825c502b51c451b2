//! Application layer: per-panel controllers and the orchestrator that the
//! host page talks to.

pub mod controller;
pub mod orchestrator;
pub mod selection;

pub use controller::{PanelLayout, SessionController};
pub use orchestrator::{ExternalTrigger, Orchestrator, OrchestratorBuilder};
pub use selection::{HypertextInstruction, RequestOutcome, Selection, SelectionOutcome};
