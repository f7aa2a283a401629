//! Rewriting engine: chain discovery, pattern catalogs, the stub aggregator,
//! import normalization and the edit applier.

pub mod applier;
pub mod catalog;
pub mod chain;
pub mod engine;
pub mod imports;
pub mod rules;
pub mod scope;
pub mod stubs;
pub mod synth;

pub use engine::{MigrationEngine, MigrationOutcome};
pub use imports::{ModuleKind, Targets};
pub use synth::Style;
