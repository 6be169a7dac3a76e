//! Source → destination collection mirror: models, retry helpers,
//! scheduler constants and the synchronizer itself.

mod mirror_engine;
mod mirror_model;
mod mirror_scheduler;
mod synchronizer;

pub use mirror_engine::*;
pub use mirror_model::*;
pub use mirror_scheduler::*;
pub use synchronizer::*;
