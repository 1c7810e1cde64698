#![forbid(unsafe_code)]

pub mod audit;
pub mod common;
pub mod counter;
pub mod fhe;
pub mod reveal;
pub mod spectrum;

pub use common::{
    hex_lower, ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate,
};
