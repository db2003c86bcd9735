pub mod race;
pub mod registry;

pub use race::{EngineDiagnostic, RaceOutcome};
pub use registry::{EngineDescriptor, EngineRegistry, OutputNaming, Platform};
