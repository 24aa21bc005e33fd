use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::predict::{Candidate, ExcludedSatellite, ObserverLocation, SatelliteId};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::server::AppState;

const DEFAULT_HOURS: f64 = 12.0;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PassesQuery {
    /// Start of the listing (RFC3339). Defaults to now.
    pub from: Option<DateTime<Utc>>,
    /// Length of the listing in hours.
    pub hours: Option<f64>,
    pub satellite: Option<SatelliteId>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PassesResponse {
    pub station: Option<String>,
    pub observer: ObserverLocation,
    pub generated_at: DateTime<Utc>,
    pub passes: Vec<Candidate>,
    pub excluded: Vec<ExcludedSatellite>,
}

#[utoipa::path(
    get,
    path = "/api/passes",
    params(PassesQuery),
    responses(
        (status = 200, description = "Passes in the current schedule snapshot", body = PassesResponse),
        (status = 400, description = "Invalid parameters", body = ErrorResponse)
    ),
    tag = "predict"
)]
pub async fn list_passes(
    State(state): State<AppState>,
    Query(query): Query<PassesQuery>,
) -> ApiResult<Json<PassesResponse>> {
    let hours = query.hours.unwrap_or(DEFAULT_HOURS);
    if !(hours.is_finite() && hours > 0.0) {
        return Err(ApiError::Validation("hours must be positive".into()));
    }
    let from = query.from.unwrap_or_else(Utc::now);
    let to = from + TimeDelta::milliseconds((hours * 3_600_000.0) as i64);

    let snapshot = state.snapshots.load();
    let passes = snapshot
        .upcoming(from)
        .take_while(|c| c.pass.rise <= to)
        .filter(|c| query.satellite.map_or(true, |id| c.pass.satellite == id))
        .cloned()
        .collect();

    Ok(Json(PassesResponse {
        station: state.station.clone(),
        observer: snapshot.observer,
        generated_at: snapshot.generated_at,
        passes,
        excluded: snapshot.excluded.clone(),
    }))
}
