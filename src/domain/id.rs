//! Domain identifier types with proper encapsulation.

use std::fmt;

/// Portfolio identifier - the per-aggregate ordering key.
///
/// The inner String is private so all construction goes through the
/// defined constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortfolioId(String);

impl PortfolioId {
    /// Create a new PortfolioId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the portfolio ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortfolioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PortfolioId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for PortfolioId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Trade identifier - globally unique business key.
///
/// Uniqueness across all time is what makes downstream consumption
/// idempotent; the audit store enforces it for valid records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradeId(String);

impl TradeId {
    /// Create a new TradeId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the trade ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TradeId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TradeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portfolio_id_new_and_as_str() {
        let id = PortfolioId::new("pf-1");
        assert_eq!(id.as_str(), "pf-1");
    }

    #[test]
    fn portfolio_id_display() {
        let id = PortfolioId::new("pf-display");
        assert_eq!(format!("{}", id), "pf-display");
    }

    #[test]
    fn trade_id_from_string() {
        let id = TradeId::from("t-42".to_string());
        assert_eq!(id.as_str(), "t-42");
    }

    #[test]
    fn trade_id_equality_and_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(TradeId::new("t-1"));
        assert!(set.contains(&TradeId::from("t-1")));
        assert!(!set.contains(&TradeId::from("t-2")));
    }
}
