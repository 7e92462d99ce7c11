//! HTTP transport and failure classification.

mod classify;
mod transport;

pub use classify::{FailedResponse, TransportFailure, classify, classify_any};
#[cfg(test)]
pub use transport::MockTransport;
pub use transport::{HttpTransport, Transport};
