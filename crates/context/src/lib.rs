//! Wiring shared by the intake server and the `mirror` binary: environment
//! configuration, store construction from URIs and the service context.

pub mod config;
pub mod providers;
mod registry;

pub use config::MirrorConfig;
pub use providers::{open_store, StoreUri};
pub use registry::{MirrorRuntimeState, ServiceContext};
