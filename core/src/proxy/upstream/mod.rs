pub mod client;

pub use client::{CallError, UpstreamClient};
