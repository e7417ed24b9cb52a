use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// A currency symbol as used at the ledger boundary ("BTC", "IDR").
///
/// Always stored trimmed and upper-cased so that "btc" and "BTC" address the
/// same wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CurrencyCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CurrencyCode {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(CurrencyCode::new(" btc "), CurrencyCode::new("BTC"));
        assert_eq!(CurrencyCode::new("idr").as_str(), "IDR");
    }

    #[test]
    fn deserialization_normalizes() {
        let code: CurrencyCode = serde_json::from_str(r#""eth""#).unwrap();
        assert_eq!(code.as_str(), "ETH");
    }
}
