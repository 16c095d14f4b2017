//! HTTP surface of the controller.
//!
//! - `http`: axum router exposing the control operations
//! - `client`: retrying client that talks to a set of replicas

pub mod client;
pub mod http;

pub use client::{ClientError, ControllerClient};
pub use http::create_router;
