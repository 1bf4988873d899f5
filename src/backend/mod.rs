pub mod client;

pub use client::{ApiError, BackendClient};
