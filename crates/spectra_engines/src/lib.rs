#![forbid(unsafe_code)]

pub mod envelope;
pub mod local_provider;
pub mod oracle;
