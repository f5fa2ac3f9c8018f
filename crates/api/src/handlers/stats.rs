use axum::extract::State;
use axum::Json;
use sentinel_core::stats::StatsSnapshot;

use crate::state::AppState;

/// GET /stats
///
/// Never fails: a store outage is reported as `stale: true`.
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.stats().await)
}
