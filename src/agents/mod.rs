//! Multi-agent orchestration: registry (C7), task decomposition (C8),
//! execution (C9), and result synthesis with conflict resolution (C10).
pub mod decomposer;
pub mod orchestrator;
pub mod registry;
pub mod synthesizer;
pub mod types;

pub use decomposer::TaskDecomposer;
pub use orchestrator::{AgentInvoker, MultiAgentOrchestrator, OrchestrationOutcome, SubtaskOutcome};
pub use registry::AgentRegistry;
pub use synthesizer::{ResultSynthesizer, Synthesis};
