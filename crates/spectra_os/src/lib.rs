#![forbid(unsafe_code)]

mod audit;
pub mod config;
pub mod correlator;
pub mod counter;
pub mod error;
pub mod gateway;
pub mod record_store;
pub mod registry;

pub use config::SpectraRegistryConfig;
pub use error::SpectraError;
pub use gateway::CallbackOutcome;
pub use registry::SpectraRegistry;
