pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod retry;

pub use client::{AddressQuery, CountryCode, GeoQuery, TaxRateClient};
pub use config::ClientConfig;
pub use error::{Result, TaxRateError};
pub use http::{FailedResponse, TransportFailure, classify, classify_any};
pub use retry::{RetryOverrides, RetryPolicy, default_should_retry, execute_with_retry, with_retry};
