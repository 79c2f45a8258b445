//! Deriv-specific message types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::strategy::types::Direction;

// ============================================================================
// Requests
// ============================================================================

/// `{"authorize": "<token>"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub authorize: String,
}

/// `{"balance": 1, "subscribe": 1}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRequest {
    pub balance: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<u8>,
}

/// `{"ticks": "R_100", "subscribe": 1}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicksRequest {
    pub ticks: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<u8>,
}

/// `{"forget": "<subscription id>"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgetRequest {
    pub forget: String,
}

/// `{"ping": 1}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingRequest {
    pub ping: u8,
}

/// Price proposal for a rise/fall contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub proposal: u8,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub basis: String,
    pub contract_type: ContractType,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
    pub symbol: String,
}

/// Buy a previously quoted proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyRequest {
    pub buy: String,
    /// Maximum price accepted for the contract
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Rise/fall contract type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractType {
    Call,
    Put,
}

impl From<Direction> for ContractType {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Up => ContractType::Call,
            Direction::Down => ContractType::Put,
        }
    }
}

/// Every request the client issues
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Request {
    Authorize(AuthorizeRequest),
    Balance(BalanceRequest),
    Ticks(TicksRequest),
    Forget(ForgetRequest),
    Ping(PingRequest),
    Proposal(ProposalRequest),
    Buy(BuyRequest),
}

impl Request {
    pub fn authorize(token: impl Into<String>) -> Self {
        Request::Authorize(AuthorizeRequest {
            authorize: token.into(),
        })
    }

    /// Balance request with a standing subscription
    pub fn balance_stream() -> Self {
        Request::Balance(BalanceRequest {
            balance: 1,
            subscribe: Some(1),
        })
    }

    /// Tick request with a standing subscription
    pub fn tick_stream(symbol: impl Into<String>) -> Self {
        Request::Ticks(TicksRequest {
            ticks: symbol.into(),
            subscribe: Some(1),
        })
    }

    pub fn forget(subscription_id: impl Into<String>) -> Self {
        Request::Forget(ForgetRequest {
            forget: subscription_id.into(),
        })
    }

    pub fn ping() -> Self {
        Request::Ping(PingRequest { ping: 1 })
    }

    /// Stake-based price proposal
    pub fn proposal(
        amount: Decimal,
        contract_type: ContractType,
        currency: impl Into<String>,
        duration: u32,
        duration_unit: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Self {
        Request::Proposal(ProposalRequest {
            proposal: 1,
            amount,
            basis: "stake".to_string(),
            contract_type,
            currency: currency.into(),
            duration,
            duration_unit: duration_unit.into(),
            symbol: symbol.into(),
        })
    }

    pub fn buy(proposal_id: impl Into<String>, price: Decimal) -> Self {
        Request::Buy(BuyRequest {
            buy: proposal_id.into(),
            price,
        })
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Authorize(_) => "authorize",
            Request::Balance(_) => "balance",
            Request::Ticks(_) => "ticks",
            Request::Forget(_) => "forget",
            Request::Ping(_) => "ping",
            Request::Proposal(_) => "proposal",
            Request::Buy(_) => "buy",
        }
    }
}

// ============================================================================
// Responses and pushes
// ============================================================================

/// Message kind discriminator (`msg_type`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Authorize,
    Balance,
    Tick,
    Forget,
    Ping,
    Proposal,
    Buy,
    Other(String),
}

impl MessageKind {
    pub fn parse(msg_type: &str) -> Self {
        match msg_type {
            "authorize" => MessageKind::Authorize,
            "balance" => MessageKind::Balance,
            "tick" => MessageKind::Tick,
            "forget" => MessageKind::Forget,
            "ping" => MessageKind::Ping,
            "proposal" => MessageKind::Proposal,
            "buy" => MessageKind::Buy,
            other => MessageKind::Other(other.to_string()),
        }
    }
}

/// Structured error carried on a failed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

/// Subscription reference attached to streamed responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRef {
    pub id: String,
}

/// `authorize` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeBody {
    #[serde(default)]
    pub loginid: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub balance: Option<Decimal>,
}

/// `balance` response/push body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceBody {
    pub balance: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub loginid: Option<String>,
}

/// `tick` push body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickBody {
    pub symbol: String,
    pub quote: Decimal,
    #[serde(default)]
    pub epoch: Option<i64>,
    #[serde(default)]
    pub pip_size: Option<u32>,
}

/// `proposal` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalBody {
    pub id: String,
    pub ask_price: Decimal,
    #[serde(default)]
    pub payout: Option<Decimal>,
    #[serde(default)]
    pub longcode: Option<String>,
}

/// `buy` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyBody {
    pub contract_id: serde_json::Value,
    pub buy_price: Decimal,
    #[serde(default)]
    pub balance_after: Option<Decimal>,
    #[serde(default)]
    pub transaction_id: Option<serde_json::Value>,
}

impl BuyBody {
    /// Contract id as a string whether the server sent a number or a string
    pub fn contract_id(&self) -> String {
        match &self.contract_id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
