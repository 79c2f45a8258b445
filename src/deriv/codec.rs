//! Encoding of outgoing requests and decoding of inbound frames
//!
//! Stateless. Every inbound frame decodes to an [`Envelope`] tagged with its
//! message kind and, when present, the correlation id echoed by the server.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::messages::{
    ApiErrorBody, AuthorizeBody, BalanceBody, BuyBody, MessageKind, ProposalBody, Request,
    SubscriptionRef, TickBody,
};
use crate::common::errors::{ClientError, Result};
use crate::common::types::Tick;

/// Name of the correlation field
pub const REQ_ID_FIELD: &str = "req_id";

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: MessageKind,
    /// Correlation id echoed from the originating request
    pub req_id: Option<u64>,
    pub error: Option<ApiErrorBody>,
    pub subscription: Option<SubscriptionRef>,
    /// Full decoded payload
    pub payload: Value,
}

impl Envelope {
    /// Convert a failed response into its structured error
    pub fn into_result(self) -> Result<Envelope> {
        match self.error {
            Some(error) => Err(ClientError::Api {
                code: error.code,
                message: error.message,
            }),
            None => Ok(self),
        }
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.id.as_str())
    }

    /// Deserialize the body stored under `field`
    pub fn body<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        let value = self.payload.get(field).ok_or_else(|| {
            ClientError::MalformedMessage(format!("{:?} message without `{}` body", self.kind, field))
        })?;
        serde_json::from_value(value.clone())
            .map_err(|e| ClientError::MalformedMessage(format!("bad `{}` body: {}", field, e)))
    }

    pub fn authorize(&self) -> Result<AuthorizeBody> {
        self.body("authorize")
    }

    pub fn balance(&self) -> Result<BalanceBody> {
        self.body("balance")
    }

    /// Tick body as a [`Tick`], stamped with the server epoch
    pub fn tick(&self) -> Result<Tick> {
        let body: TickBody = self.body("tick")?;
        let epoch = body
            .epoch
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);
        Ok(Tick {
            symbol: body.symbol,
            quote: body.quote,
            epoch,
        })
    }

    pub fn proposal(&self) -> Result<ProposalBody> {
        self.body("proposal")
    }

    pub fn buy(&self) -> Result<BuyBody> {
        self.body("buy")
    }
}

/// Encode a request, attaching `req_id` when given
pub fn encode(request: &Request, req_id: Option<u64>) -> Result<String> {
    let mut value = serde_json::to_value(request)?;

    if let Some(id) = req_id {
        match value.as_object_mut() {
            Some(object) => {
                object.insert(REQ_ID_FIELD.to_string(), Value::from(id));
            }
            None => {
                return Err(ClientError::Internal(format!(
                    "{} request did not encode to an object",
                    request.kind()
                )))
            }
        }
    }

    Ok(serde_json::to_string(&value)?)
}

/// Decode one inbound text frame
pub fn decode(text: &str) -> Result<Envelope> {
    let payload: Value =
        serde_json::from_str(text).map_err(|e| ClientError::MalformedMessage(e.to_string()))?;

    if !payload.is_object() {
        return Err(ClientError::MalformedMessage(
            "frame is not a JSON object".to_string(),
        ));
    }

    let kind = payload
        .get("msg_type")
        .and_then(|v| v.as_str())
        .map(MessageKind::parse)
        .ok_or_else(|| ClientError::MalformedMessage("missing msg_type".to_string()))?;

    let req_id = match payload.get(REQ_ID_FIELD) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_u64(),
        // Some gateways echo the id as a string
        Some(Value::String(s)) => s.parse().ok(),
        Some(_) => None,
    };

    let error = match payload.get("error") {
        Some(value) => Some(
            serde_json::from_value::<ApiErrorBody>(value.clone())
                .map_err(|e| ClientError::MalformedMessage(format!("bad error body: {}", e)))?,
        ),
        None => None,
    };

    let subscription = payload
        .get("subscription")
        .and_then(|v| serde_json::from_value::<SubscriptionRef>(v.clone()).ok());

    Ok(Envelope {
        kind,
        req_id,
        error,
        subscription,
        payload,
    })
}
