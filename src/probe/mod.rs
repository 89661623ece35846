pub mod client;
pub mod registry;

pub use client::{ProbeClient, ProbeError};
pub use registry::ProbeRegistry;
