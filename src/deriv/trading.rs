//! Contract purchase through the Deriv API
//!
//! Each order runs on its own short-lived transport: authorize, request a
//! proposal, buy it at the quoted price, close.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use super::codec;
use super::correlator::RequestCorrelator;
use super::messages::{ContractType, Request};
use super::transport::endpoint_url;
use crate::common::errors::{ClientError, Result};
use crate::common::traits::{Connector, TradePlacer};
use crate::common::types::TransportEvent;
use crate::config::types::AppConfig;
use crate::strategy::types::{PatternSignal, Trade};

/// Order parameters shared by every trade
#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub url: String,
    pub api_token: Option<String>,
    pub symbol: String,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl OrderSettings {
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            url: endpoint_url(&config.deriv.websocket_url, config.deriv.app_id)?,
            api_token: config.deriv.api_token.clone(),
            symbol: config.deriv.symbol.clone(),
            currency: config.deriv.currency.clone(),
            duration: config.deriv.contract_duration,
            duration_unit: config.deriv.contract_duration_unit.clone(),
            connect_timeout: Duration::from_secs(config.settings.connect_timeout_seconds),
            request_timeout: Duration::from_secs(config.settings.request_timeout_seconds),
        })
    }
}

/// [`TradePlacer`] that buys rise/fall contracts
pub struct DerivTradePlacer {
    connector: Arc<dyn Connector>,
    settings: OrderSettings,
}

impl DerivTradePlacer {
    pub fn new(settings: OrderSettings, connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            settings,
        }
    }

    async fn execute(&self, signal: &PatternSignal, stake: Decimal) -> Result<Trade> {
        let token = self
            .settings
            .api_token
            .as_deref()
            .ok_or(ClientError::NotAuthorized)?;

        let channels = tokio::time::timeout(
            self.settings.connect_timeout,
            self.connector.open(&self.settings.url),
        )
        .await
        .map_err(|_| ClientError::ConnectFailed("trade transport did not open in time".into()))??;

        let correlator = Arc::new(RequestCorrelator::new(
            channels.outbound,
            self.settings.request_timeout,
        ));
        let reader = tokio::spawn(pump_responses(correlator.clone(), channels.inbound));

        let outcome = self.run_order(&correlator, token, signal, stake).await;

        correlator.fail_all();
        reader.abort();
        outcome
    }

    async fn run_order(
        &self,
        correlator: &RequestCorrelator,
        token: &str,
        signal: &PatternSignal,
        stake: Decimal,
    ) -> Result<Trade> {
        correlator
            .send(&Request::authorize(token))
            .await
            .map_err(|e| match e {
                ClientError::Api { code, message } => {
                    ClientError::AuthRejected(format!("{}: {}", code, message))
                }
                other => other,
            })?;

        let proposal = correlator
            .send(&Request::proposal(
                stake,
                ContractType::from(signal.prediction),
                self.settings.currency.as_str(),
                self.settings.duration,
                self.settings.duration_unit.as_str(),
                self.settings.symbol.as_str(),
            ))
            .await?
            .proposal()?;
        debug!(proposal_id = %proposal.id, ask_price = %proposal.ask_price, "Received proposal");

        let bought = correlator
            .send(&Request::buy(proposal.id.as_str(), proposal.ask_price))
            .await?
            .buy()?;

        Ok(Trade::open(bought.contract_id(), signal, stake))
    }
}

#[async_trait]
impl TradePlacer for DerivTradePlacer {
    #[instrument(skip(self, signal), fields(pattern = %signal.pattern, direction = %signal.prediction))]
    async fn place_trade(&self, signal: &PatternSignal, stake: Decimal) -> Option<Trade> {
        match self.execute(signal, stake).await {
            Ok(trade) => {
                info!(contract_id = %trade.id, %stake, "Trade placed: {}", trade.prediction);
                Some(trade)
            }
            Err(e) => {
                error!("Failed to place trade: {}", e);
                None
            }
        }
    }
}

/// Feed responses from a trade transport into its correlator
async fn pump_responses(correlator: Arc<RequestCorrelator>, mut inbound: mpsc::Receiver<TransportEvent>) {
    while let Some(event) = inbound.recv().await {
        match event {
            TransportEvent::Message(text) => match codec::decode(&text) {
                Ok(envelope) => {
                    if let Some(push) = correlator.resolve(envelope) {
                        debug!(kind = ?push.kind, "Ignoring push on trade transport");
                    }
                }
                Err(e) => debug!("Dropping frame on trade transport: {}", e),
            },
            TransportEvent::Closed { .. } => break,
        }
    }
    correlator.fail_all();
}
