// ============================================================================
// Exchange Factory
// Creates exchanges with proper configuration
// ============================================================================

use super::controls::ControlChain;
use super::exchange::Exchange;
use super::security::Security;
use crate::domain::{
    Broker, BrokerConfig, ConfigError, ExchangeConfig, Ledgers, OrderValidator, SecurityConfig,
    Shareholder, ShareholderConfig, ValidationConfig,
};
use crate::interfaces::{EventHandler, NoOpEventHandler};
use crate::numeric::{Credit, Quantity};
use std::sync::Arc;

// ============================================================================
// Factory Functions
// ============================================================================

/// Creates an exchange from configuration
///
/// # Arguments
/// * `config` - Securities, ledger seeds and request bounds
/// * `event_handler` - Receiver of every published event
///
/// # Example
/// ```
/// use tiny_exchange::prelude::*;
/// use std::sync::Arc;
///
/// let config = ExchangeConfig {
///     securities: vec![SecurityConfig::new("IRO1ABC").with_tick_size(10)],
///     brokers: vec![BrokerConfig { id: 1, credit: 1_000_000 }],
///     ..ExchangeConfig::default()
/// };
/// let exchange = create_from_config(config, Arc::new(NoOpEventHandler)).unwrap();
/// assert_eq!(exchange.broker_credit(BrokerId(1)), Some(1_000_000));
/// ```
pub fn create_from_config(
    config: ExchangeConfig,
    event_handler: Arc<dyn EventHandler>,
) -> Result<Exchange, ConfigError> {
    ExchangeBuilder::from_config(config)
        .with_event_handler(event_handler)
        .build()
}

// ============================================================================
// Builder Pattern for Programmatic Configuration
// ============================================================================

/// Builder for creating exchanges with fluent API
///
/// # Example
/// ```
/// use tiny_exchange::prelude::*;
///
/// let exchange = ExchangeBuilder::new()
///     .with_security(SecurityConfig::new("IRO1ABC"))
///     .with_broker(1, 100_000)
///     .with_shareholder(7, &[("IRO1ABC", 500)])
///     .build()
///     .unwrap();
/// assert_eq!(exchange.shareholder_position(ShareholderId(7), "IRO1ABC"), Some(500));
/// ```
pub struct ExchangeBuilder {
    config: ExchangeConfig,
    controls: Option<ControlChain>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ExchangeBuilder {
    pub fn new() -> Self {
        Self::from_config(ExchangeConfig::default())
    }

    pub fn from_config(config: ExchangeConfig) -> Self {
        Self {
            config,
            controls: None,
            event_handler: None,
        }
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.config.securities.push(security);
        self
    }

    pub fn with_broker(mut self, id: u64, credit: Credit) -> Self {
        self.config.brokers.push(BrokerConfig { id, credit });
        self
    }

    /// Add a shareholder with (ISIN, position) pairs
    pub fn with_shareholder(mut self, id: u64, positions: &[(&str, Quantity)]) -> Self {
        self.config.shareholders.push(ShareholderConfig {
            id,
            positions: positions
                .iter()
                .map(|(isin, quantity)| (isin.to_string(), *quantity))
                .collect(),
        });
        self
    }

    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.config.validation = validation;
        self
    }

    /// Replace the default position, credit and execution controls
    pub fn with_controls(mut self, controls: ControlChain) -> Self {
        self.controls = Some(controls);
        self
    }

    pub fn with_event_handler(mut self, event_handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(event_handler);
        self
    }

    pub fn build(self) -> Result<Exchange, ConfigError> {
        self.config.validate()?;

        let controls = Arc::new(self.controls.unwrap_or_default());
        let securities = self
            .config
            .securities
            .iter()
            .map(|config| Security::new(config, Arc::clone(&controls)))
            .collect();

        let mut ledgers = Ledgers::new();
        for broker in &self.config.brokers {
            ledgers.add_broker(Broker::new(broker.broker_id(), broker.credit));
        }
        for shareholder in &self.config.shareholders {
            let seeded = shareholder.positions().fold(
                Shareholder::new(shareholder.shareholder_id()),
                |seeded, (isin, quantity)| seeded.with_position(isin, quantity),
            );
            ledgers.add_shareholder(seeded);
        }

        tracing::debug!(
            "Building exchange with {} securities, {} brokers, {} shareholders",
            self.config.securities.len(),
            self.config.brokers.len(),
            self.config.shareholders.len()
        );

        Ok(Exchange::new(
            securities,
            ledgers,
            OrderValidator::new(self.config.validation),
            self.event_handler
                .unwrap_or_else(|| Arc::new(NoOpEventHandler)),
        ))
    }
}

impl Default for ExchangeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
