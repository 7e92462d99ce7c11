//! Endpoint-level client for the tax-rate lookup service.

mod api;
mod params;

pub use api::{ACCOUNT_METRICS_PATH, SALES_TAX_PATH, TaxRateClient};
pub use params::{AddressQuery, CountryCode, GeoQuery};
