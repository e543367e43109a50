use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

use crate::error::{InventoryError, InventoryResult};

/// Longest recipient a movement may carry
pub const MAX_RECIPIENT_LEN: usize = 100;
/// Longest free-text reason a movement may carry
pub const MAX_REASON_LEN: usize = 500;
/// Longest actor username stored on a movement
pub const MAX_ACTOR_NAME_LEN: usize = 150;

/// Availability of a product, always derived from its stock
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "product_status")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "unavailable")]
    Unavailable,
}

impl ProductStatus {
    /// `Available` iff there is anything on the shelf
    pub fn from_stock(stock: i32) -> Self {
        if stock > 0 {
            ProductStatus::Available
        } else {
            ProductStatus::Unavailable
        }
    }
}

/// Unit a product is counted in
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "unit_of_measure")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UnitOfMeasure {
    #[default]
    #[sea_orm(string_value = "unit")]
    Unit,
    #[sea_orm(string_value = "kg")]
    Kg,
    #[sea_orm(string_value = "pair")]
    Pair,
}

/// Direction of a stock movement
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "movement_kind")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MovementKind {
    #[sea_orm(string_value = "inbound")]
    Inbound,
    #[sea_orm(string_value = "outbound")]
    Outbound,
}

impl MovementKind {
    /// +1 for inbound, -1 for outbound
    pub fn sign(self) -> i64 {
        match self {
            MovementKind::Inbound => 1,
            MovementKind::Outbound => -1,
        }
    }
}

// ============================================================================
// Categories
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCategory {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

// ============================================================================
// Products
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Uuid,
    pub unit: UnitOfMeasure,
    pub stock: i32,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(input: CreateProduct) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: input.name,
            description: input.description,
            category_id: input.category_id,
            unit: input.unit,
            stock: input.initial_stock,
            status: ProductStatus::from_stock(input.initial_stock),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == ProductStatus::Available
    }

    /// Apply descriptive changes; stock and status are never touched here
    pub fn apply_update(&mut self, update: UpdateProduct) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(category_id) = update.category_id {
            self.category_id = category_id;
        }
        if let Some(unit) = update.unit {
            self.unit = unit;
        }
        self.updated_at = Utc::now();
    }

    /// Move stock by `quantity` in the direction of `kind`, returning the new stock.
    ///
    /// The product is left untouched when the movement is rejected.
    pub fn apply_movement(&mut self, kind: MovementKind, quantity: i32) -> InventoryResult<i32> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let next = match kind {
            MovementKind::Inbound => self.stock.checked_add(quantity).ok_or_else(|| {
                InventoryError::Validation(format!(
                    "inbound of {} would overflow stock {}",
                    quantity, self.stock
                ))
            })?,
            MovementKind::Outbound => {
                if quantity > self.stock {
                    return Err(InventoryError::InsufficientStock {
                        product_id: self.id,
                        available: self.stock,
                        requested: quantity,
                    });
                }
                self.stock - quantity
            }
        };

        self.stock = next;
        self.status = ProductStatus::from_stock(next);
        self.updated_at = Utc::now();
        Ok(next)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category_id: Uuid,
    #[serde(default)]
    pub unit: UnitOfMeasure,
    #[serde(default)]
    pub initial_stock: i32,
}

impl CreateProduct {
    pub fn new(name: impl Into<String>, category_id: Uuid) -> Self {
        Self {
            name: name.into(),
            description: None,
            category_id,
            unit: UnitOfMeasure::default(),
            initial_stock: 0,
        }
    }

    pub fn with_unit(mut self, unit: UnitOfMeasure) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_initial_stock(mut self, stock: i32) -> Self {
        self.initial_stock = stock;
        self
    }
}

/// Descriptive product changes.
///
/// Stock and status are not part of this payload; unknown fields such as
/// `stock` are rejected when deserializing.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    /// `Some(None)` clears the description; JSON `null` deserializes to it
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub category_id: Option<Uuid>,
    pub unit: Option<UnitOfMeasure>,
}

/// Distinguishes an explicit `null` from an absent field
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Sort order of product listings; ties fall back to the name
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductOrdering {
    #[default]
    Name,
    Stock,
    StockDesc,
    CreatedAt,
    CreatedAtDesc,
}

/// Filter for product listings
#[derive(Debug, Clone, Deserialize)]
pub struct ProductFilter {
    /// Case-insensitive substring of the name or the description
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub status: Option<ProductStatus>,
    #[serde(default)]
    pub ordering: ProductOrdering,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

fn default_limit() -> u64 {
    50
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            search: None,
            category_id: None,
            status: None,
            ordering: ProductOrdering::default(),
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let in_name = product.name.to_lowercase().contains(&needle);
            let in_description = product
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_name && !in_description {
                return false;
            }
        }
        if self.category_id.is_some_and(|id| id != product.category_id) {
            return false;
        }
        if self.status.is_some_and(|status| status != product.status) {
            return false;
        }
        true
    }

    pub fn compare(&self, a: &Product, b: &Product) -> std::cmp::Ordering {
        let primary = match self.ordering {
            ProductOrdering::Name => std::cmp::Ordering::Equal,
            ProductOrdering::Stock => a.stock.cmp(&b.stock),
            ProductOrdering::StockDesc => b.stock.cmp(&a.stock),
            ProductOrdering::CreatedAt => a.created_at.cmp(&b.created_at),
            ProductOrdering::CreatedAtDesc => b.created_at.cmp(&a.created_at),
        };
        primary.then_with(|| a.name.cmp(&b.name))
    }
}

// ============================================================================
// Movements
// ============================================================================

/// Who performed a movement, captured from the authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
}

impl Actor {
    pub fn new(id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// One immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub kind: MovementKind,
    pub quantity: i32,
    /// Product stock right after this movement was applied
    pub stock_after: i32,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,
    pub recipient: Option<String>,
    pub reason: Option<String>,
}

impl Movement {
    /// Ledger entry for an accepted mutation
    pub fn record(mutation: &StockMutation, stock_after: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            product_id: mutation.product_id,
            kind: mutation.kind,
            quantity: mutation.quantity,
            stock_after,
            occurred_at: mutation.occurred_at.unwrap_or(now),
            actor_id: Some(mutation.actor.id),
            actor_name: Some(mutation.actor.username.clone()),
            recipient: mutation.recipient.clone(),
            reason: mutation.reason.clone(),
        }
    }

    /// Quantity with the sign of its direction
    pub fn signed_quantity(&self) -> i64 {
        self.kind.sign() * i64::from(self.quantity)
    }
}

/// Request to move stock in or out of a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMutation {
    pub product_id: Uuid,
    pub kind: MovementKind,
    pub quantity: i32,
    pub actor: Actor,
    /// Who received the goods; outbound only
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Business time of the movement; defaults to commit time
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl StockMutation {
    pub fn inbound(product_id: Uuid, quantity: i32, actor: Actor) -> Self {
        Self {
            product_id,
            kind: MovementKind::Inbound,
            quantity,
            actor,
            recipient: None,
            reason: None,
            occurred_at: None,
        }
    }

    pub fn outbound(product_id: Uuid, quantity: i32, actor: Actor) -> Self {
        Self {
            kind: MovementKind::Outbound,
            ..Self::inbound(product_id, quantity, actor)
        }
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Checks that need no database access
    pub fn validate(&self) -> InventoryResult<()> {
        if self.quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(self.quantity));
        }

        if self.actor.username.trim().is_empty() {
            return Err(InventoryError::Validation(
                "actor username must not be empty".to_string(),
            ));
        }
        if self.actor.username.chars().count() > MAX_ACTOR_NAME_LEN {
            return Err(InventoryError::Validation(format!(
                "actor username exceeds {} characters",
                MAX_ACTOR_NAME_LEN
            )));
        }

        if let Some(recipient) = &self.recipient {
            if self.kind == MovementKind::Inbound {
                return Err(InventoryError::Validation(
                    "recipient is only recorded on outbound movements".to_string(),
                ));
            }
            if recipient.chars().count() > MAX_RECIPIENT_LEN {
                return Err(InventoryError::Validation(format!(
                    "recipient exceeds {} characters",
                    MAX_RECIPIENT_LEN
                )));
            }
        }

        if let Some(reason) = &self.reason {
            if reason.chars().count() > MAX_REASON_LEN {
                return Err(InventoryError::Validation(format!(
                    "reason exceeds {} characters",
                    MAX_REASON_LEN
                )));
            }
        }

        Ok(())
    }
}

/// Half-open time interval `[from, to)`; a missing bound is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// The calendar day `date` as observed in `tz`: `[local 00:00, next local 00:00)`
    pub fn day<Z: TimeZone>(date: NaiveDate, tz: &Z) -> Self {
        Self {
            from: Some(start_of_day(date, tz)),
            to: date.succ_opt().map(|next| start_of_day(next, tz)),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at < to)
    }
}

/// First instant of `date` in `tz`; a day that skips midnight starts at the end of the gap
fn start_of_day<Z: TimeZone>(date: NaiveDate, tz: &Z) -> DateTime<Utc> {
    let midnight: NaiveDateTime = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight).earliest() {
        Some(start) => start.with_timezone(&Utc),
        None => (midnight - tz.offset_from_utc_datetime(&midnight).fix()).and_utc(),
    }
}

/// Calendar day of `at` in `tz`
pub fn local_day<Z: TimeZone>(at: DateTime<Utc>, tz: &Z) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

/// Movement listing parameters; results are newest first
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementQuery {
    pub product_id: Option<Uuid>,
    pub kind: Option<MovementKind>,
    #[serde(default)]
    pub range: DateRange,
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: u64,
}

impl MovementQuery {
    pub fn for_product(product_id: Uuid) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, movement: &Movement) -> bool {
        self.product_id.is_none_or(|id| id == movement.product_id)
            && self.kind.is_none_or(|kind| kind == movement.kind)
            && self.range.contains(movement.occurred_at)
    }
}

// ============================================================================
// Reporting
// ============================================================================

/// Sum of movement quantities for one local calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub day: NaiveDate,
    pub total: i64,
}

/// Chart-ready parallel arrays of [`DailyTotal`]s
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub dates: Vec<NaiveDate>,
    pub quantities: Vec<i64>,
}

impl From<Vec<DailyTotal>> for TimeSeries {
    fn from(totals: Vec<DailyTotal>) -> Self {
        let (dates, quantities) = totals.into_iter().map(|t| (t.day, t.total)).unzip();
        Self { dates, quantities }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCounts {
    pub total_products: u64,
    pub in_stock: u64,
    pub low_stock: u64,
}

/// Dashboard row for one of the latest movements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentMovement {
    pub id: Uuid,
    pub kind: MovementKind,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub occurred_at: DateTime<Utc>,
    /// Actor username, or "system" when none was recorded
    pub actor: String,
}

/// Label for movements without an actor
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_products: u64,
    pub in_stock: u64,
    pub low_stock: u64,
    pub movements_today: u64,
    pub recent_movements: Vec<RecentMovement>,
}
