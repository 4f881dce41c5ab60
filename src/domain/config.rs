// ============================================================================
// Exchange Configuration
// Securities, ledger seeds and request bounds
// ============================================================================

use super::errors::ConfigError;
use super::ids::{BrokerId, Isin, ShareholderId};
use crate::numeric::{Credit, Price, Quantity};
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Matching State
// ============================================================================

/// Trading regime of a security
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MatchingState {
    /// Every incoming order is matched on arrival
    #[default]
    Continuous,
    /// Orders are collected and executed together at one opening price
    Auction,
}

// ============================================================================
// Security Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SecurityConfig {
    pub isin: String,

    /// Price increment
    #[cfg_attr(feature = "serde", serde(default = "default_increment"))]
    pub tick_size: Price,

    /// Quantity increment
    #[cfg_attr(feature = "serde", serde(default = "default_increment"))]
    pub lot_size: Quantity,

    #[cfg_attr(feature = "serde", serde(default))]
    pub initial_state: MatchingState,

    /// Reference price for stop orders and auction tie-breaking before the first trade
    #[cfg_attr(feature = "serde", serde(default))]
    pub last_trade_price: Option<Price>,
}

#[cfg(feature = "serde")]
fn default_increment() -> u64 {
    1
}

impl SecurityConfig {
    pub fn new(isin: impl Into<String>) -> Self {
        Self {
            isin: isin.into(),
            tick_size: 1,
            lot_size: 1,
            initial_state: MatchingState::Continuous,
            last_trade_price: None,
        }
    }

    /// Builder method: Set price tick size
    pub fn with_tick_size(mut self, tick: Price) -> Self {
        self.tick_size = tick;
        self
    }

    /// Builder method: Set lot size
    pub fn with_lot_size(mut self, lot: Quantity) -> Self {
        self.lot_size = lot;
        self
    }

    /// Builder method: Start in the given matching state
    pub fn with_matching_state(mut self, state: MatchingState) -> Self {
        self.initial_state = state;
        self
    }

    /// Builder method: Seed the last trade price
    pub fn with_last_trade_price(mut self, price: Price) -> Self {
        self.last_trade_price = Some(price);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.isin.is_empty() {
            return Err(ConfigError::EmptyIsin);
        }
        if self.tick_size == 0 {
            return Err(ConfigError::ZeroTickSize {
                isin: self.isin.clone(),
            });
        }
        if self.lot_size == 0 {
            return Err(ConfigError::ZeroLotSize {
                isin: self.isin.clone(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Ledger Seeds
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BrokerConfig {
    pub id: u64,
    pub credit: Credit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShareholderConfig {
    pub id: u64,
    /// (ISIN, position) pairs
    #[cfg_attr(feature = "serde", serde(default))]
    pub positions: Vec<(String, Quantity)>,
}

impl BrokerConfig {
    pub fn broker_id(&self) -> BrokerId {
        BrokerId(self.id)
    }
}

impl ShareholderConfig {
    pub fn shareholder_id(&self) -> ShareholderId {
        ShareholderId(self.id)
    }

    pub fn positions(&self) -> impl Iterator<Item = (Isin, Quantity)> + '_ {
        self.positions
            .iter()
            .map(|(isin, quantity)| (Isin::new(isin), *quantity))
    }
}

// ============================================================================
// Request Bounds
// ============================================================================

/// Upper bounds on request fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ValidationConfig {
    /// Maximum price (inclusive)
    pub max_price: Price,

    /// Maximum quantity (inclusive)
    pub max_quantity: Quantity,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_price: 1_000_000_000,
            max_quantity: 1_000_000_000,
        }
    }
}

// ============================================================================
// Complete Exchange Configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExchangeConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub securities: Vec<SecurityConfig>,

    #[cfg_attr(feature = "serde", serde(default))]
    pub brokers: Vec<BrokerConfig>,

    #[cfg_attr(feature = "serde", serde(default))]
    pub shareholders: Vec<ShareholderConfig>,

    #[cfg_attr(feature = "serde", serde(default))]
    pub validation: ValidationConfig,
}

impl ExchangeConfig {
    /// Load from a JSON document
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })
    }

    /// Validate every security and reject duplicate ids
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut isins = HashSet::new();
        for security in &self.securities {
            security.validate()?;
            if !isins.insert(security.isin.as_str()) {
                return Err(ConfigError::DuplicateSecurity {
                    isin: security.isin.clone(),
                });
            }
        }

        let mut brokers = HashSet::new();
        for broker in &self.brokers {
            if !brokers.insert(broker.id) {
                return Err(ConfigError::DuplicateBroker { id: broker.id });
            }
        }

        let mut shareholders = HashSet::new();
        for shareholder in &self.shareholders {
            if !shareholders.insert(shareholder.id) {
                return Err(ConfigError::DuplicateShareholder { id: shareholder.id });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_config_builder() {
        let config = SecurityConfig::new("ABC")
            .with_tick_size(10)
            .with_lot_size(5)
            .with_matching_state(MatchingState::Auction)
            .with_last_trade_price(15_000);

        assert_eq!(config.tick_size, 10);
        assert_eq!(config.lot_size, 5);
        assert_eq!(config.initial_state, MatchingState::Auction);
        assert_eq!(config.last_trade_price, Some(15_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_security_config_validation() {
        assert_eq!(SecurityConfig::new("").validate(), Err(ConfigError::EmptyIsin));
        assert!(matches!(
            SecurityConfig::new("ABC").with_tick_size(0).validate(),
            Err(ConfigError::ZeroTickSize { .. })
        ));
        assert!(matches!(
            SecurityConfig::new("ABC").with_lot_size(0).validate(),
            Err(ConfigError::ZeroLotSize { .. })
        ));
    }

    #[test]
    fn test_exchange_config_duplicates() {
        let config = ExchangeConfig {
            securities: vec![SecurityConfig::new("ABC"), SecurityConfig::new("ABC")],
            ..ExchangeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateSecurity { .. })
        ));

        let config = ExchangeConfig {
            brokers: vec![
                BrokerConfig { id: 1, credit: 10 },
                BrokerConfig { id: 1, credit: 20 },
            ],
            ..ExchangeConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::DuplicateBroker { id: 1 }));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_exchange_config_from_json() {
        let config = ExchangeConfig::from_json(
            r#"{
                "securities": [{ "isin": "ABC", "tick_size": 10, "lot_size": 1 }],
                "brokers": [{ "id": 1, "credit": 100000 }],
                "shareholders": [{ "id": 7, "positions": [["ABC", 500]] }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.securities[0].tick_size, 10);
        assert_eq!(config.securities[0].initial_state, MatchingState::Continuous);
        assert_eq!(config.brokers[0].credit, 100_000);
        assert_eq!(config.validation, ValidationConfig::default());
        assert!(config.validate().is_ok());
    }
}
