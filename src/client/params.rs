use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaxRateError};

const MAX_ADDRESS_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CountryCode {
    Usa,
    Can,
}

impl CountryCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountryCode::Usa => "USA",
            CountryCode::Can => "CAN",
        }
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountryCode {
    type Err = TaxRateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USA" => Ok(CountryCode::Usa),
            "CAN" => Ok(CountryCode::Can),
            other => Err(TaxRateError::validation(format!(
                "country code must be USA or CAN, got '{}'",
                other
            ))),
        }
    }
}

/// Lookup by street address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressQuery {
    pub address: String,
    pub taxability_code: Option<String>,
    pub country_code: Option<CountryCode>,
    /// Historical period as `YYYYMM`.
    pub historical: Option<String>,
}

impl AddressQuery {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(TaxRateError::validation("address is required"));
        }
        if address.chars().count() > MAX_ADDRESS_LEN {
            return Err(TaxRateError::validation(format!(
                "address must be at most {} characters",
                MAX_ADDRESS_LEN
            )));
        }
        if let Some(code) = &self.taxability_code {
            if code.trim().is_empty() {
                return Err(TaxRateError::validation("taxability code must not be empty"));
            }
        }
        validate_historical(self.historical.as_deref())
    }

    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![("address".to_string(), self.address.trim().to_string())];
        if let Some(code) = &self.taxability_code {
            query.push(("taxabilityCode".to_string(), code.clone()));
        }
        push_common(&mut query, self.country_code, self.historical.as_deref());
        query
    }
}

/// Lookup by latitude/longitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoQuery {
    pub lat: f64,
    pub lng: f64,
    pub country_code: Option<CountryCode>,
    pub historical: Option<String>,
}

impl GeoQuery {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            country_code: None,
            historical: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(TaxRateError::validation(format!(
                "latitude must be between -90 and 90, got {}",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(TaxRateError::validation(format!(
                "longitude must be between -180 and 180, got {}",
                self.lng
            )));
        }
        validate_historical(self.historical.as_deref())
    }

    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("lat".to_string(), self.lat.to_string()),
            ("lng".to_string(), self.lng.to_string()),
        ];
        push_common(&mut query, self.country_code, self.historical.as_deref());
        query
    }
}

fn push_common(
    query: &mut Vec<(String, String)>,
    country_code: Option<CountryCode>,
    historical: Option<&str>,
) {
    if let Some(country) = country_code {
        query.push(("countryCode".to_string(), country.as_str().to_string()));
    }
    if let Some(period) = historical {
        query.push(("historical".to_string(), period.to_string()));
    }
    query.push(("format".to_string(), "json".to_string()));
}

/// `YYYYMM`, month 01-12.
fn validate_historical(historical: Option<&str>) -> Result<()> {
    let Some(period) = historical else {
        return Ok(());
    };
    let valid = period.len() == 6
        && period.chars().all(|c| c.is_ascii_digit())
        && matches!(period[4..].parse::<u8>(), Ok(1..=12));
    if !valid {
        return Err(TaxRateError::validation(format!(
            "historical must be in YYYYMM format, got '{}'",
            period
        )));
    }
    Ok(())
}
