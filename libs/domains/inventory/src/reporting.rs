//! Read-only aggregates over the registry and the ledger

use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::error::InventoryResult;
use crate::models::{
    DailyTotal, DashboardSummary, DateRange, MovementKind, TimeSeries, local_day,
};
use crate::repository::InventoryRepository;
use crate::service::InventoryService;

impl<R: InventoryRepository> InventoryService<R> {
    /// Counts and latest movements for the landing dashboard, "today" being the current day in the configured zone
    pub async fn dashboard_summary(&self) -> InventoryResult<DashboardSummary> {
        self.dashboard_summary_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn dashboard_summary_at(&self, now: DateTime<Utc>) -> InventoryResult<DashboardSummary> {
        let counts = self
            .repository
            .stock_counts(self.config.low_stock_threshold)
            .await?;
        let tz = &self.config.timezone;
        let movements_today = self
            .repository
            .count_movements(DateRange::day(local_day(now, tz), tz))
            .await?;
        let recent_movements = self
            .repository
            .recent_movements(self.config.recent_movements)
            .await?;

        Ok(DashboardSummary {
            total_products: counts.total_products,
            in_stock: counts.in_stock,
            low_stock: counts.low_stock,
            movements_today,
            recent_movements,
        })
    }

    /// Outbound quantity per local day for one product, oldest first; days without movement are absent
    pub async fn outbound_time_series(&self, product_id: Uuid) -> InventoryResult<Vec<DailyTotal>> {
        self.daily_totals(product_id, Some(MovementKind::Outbound))
            .await
    }

    /// [`Self::outbound_time_series`] as parallel `dates`/`quantities` arrays
    pub async fn outbound_chart(&self, product_id: Uuid) -> InventoryResult<TimeSeries> {
        Ok(self.outbound_time_series(product_id).await?.into())
    }
}
