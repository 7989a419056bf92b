use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    Sniper,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Sniper => "sniper",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            "sniper" => Ok(OrderType::Sniper),
            _ => Err(format!("Unknown order type: {}", raw)),
        }
    }
}

/// Order status
///
/// `pending → routing → building → submitted → {confirmed, failed}`.
/// Transition rules live in `domain::state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created, waiting for a worker
    Pending,
    /// Fetching quotes from every venue
    Routing,
    /// Venue selected, building the trade
    Building,
    /// Trade submitted to the venue
    Submitted,
    /// Trade landed
    Confirmed,
    /// Gave up
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Routing => "routing",
            OrderStatus::Building => "building",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            OrderStatus::Routing | OrderStatus::Building | OrderStatus::Submitted
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "routing" => Ok(OrderStatus::Routing),
            "building" => Ok(OrderStatus::Building),
            "submitted" => Ok(OrderStatus::Submitted),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "failed" => Ok(OrderStatus::Failed),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

/// Immutable inputs of a new order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub order_type: OrderType,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub target_price: Option<Decimal>,
}

impl NewOrder {
    pub fn market(token_in: &str, token_out: &str, amount_in: Decimal) -> Self {
        Self {
            order_type: OrderType::Market,
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            target_price: None,
        }
    }

    pub fn with_target_price(mut self, price: Decimal) -> Self {
        self.target_price = Some(price);
        self
    }
}

/// Fields the pipeline may set alongside a status change.
///
/// Every field is applied independently: `Some` overwrites, `None` leaves the
/// stored value untouched. There is no way to clear a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub selected_venue: Option<String>,
    pub expected_output: Option<Decimal>,
    pub executed_price: Option<Decimal>,
    pub tx_ref: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: Option<u32>,
}

impl OrderPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(venue: impl Into<String>, expected_output: Decimal) -> Self {
        Self {
            selected_venue: Some(venue.into()),
            expected_output: Some(expected_output),
            ..Self::default()
        }
    }

    pub fn fill(executed_price: Decimal, tx_ref: impl Into<String>) -> Self {
        Self {
            executed_price: Some(executed_price),
            tx_ref: Some(tx_ref.into()),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Order (tracked in our system)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_type: OrderType,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub target_price: Option<Decimal>,
    pub status: OrderStatus,
    #[serde(rename = "selectedDex")]
    pub selected_venue: Option<String>,
    pub expected_output: Option<Decimal>,
    pub executed_price: Option<Decimal>,
    #[serde(rename = "txHash")]
    pub tx_ref: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(id: Uuid, input: NewOrder) -> Self {
        let now = Utc::now();
        Self {
            id,
            order_type: input.order_type,
            token_in: input.token_in,
            token_out: input.token_out,
            amount_in: input.amount_in,
            target_price: input.target_price,
            status: OrderStatus::Pending,
            selected_venue: None,
            expected_output: None,
            executed_price: None,
            tx_ref: None,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a status change and patch. Callers check the transition first.
    pub fn apply(&mut self, status: OrderStatus, patch: &OrderPatch) {
        self.status = status;
        if let Some(venue) = &patch.selected_venue {
            self.selected_venue = Some(venue.clone());
        }
        if let Some(output) = patch.expected_output {
            self.expected_output = Some(output);
        }
        if let Some(price) = patch.executed_price {
            self.executed_price = Some(price);
        }
        if let Some(tx_ref) = &patch.tx_ref {
            self.tx_ref = Some(tx_ref.clone());
        }
        if let Some(message) = &patch.error_message {
            self.error_message = Some(message.clone());
        }
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        self.updated_at = Utc::now();
    }

    pub fn inputs(&self) -> NewOrder {
        NewOrder {
            order_type: self.order_type,
            token_in: self.token_in.clone(),
            token_out: self.token_out.clone(),
            amount_in: self.amount_in,
            target_price: self.target_price,
        }
    }
}
