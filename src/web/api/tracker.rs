use axum::{extract::State, http::StatusCode, Json};

use crate::tracker::{TelemetrySample, TrackerStatus};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::server::AppState;

#[utoipa::path(
    get,
    path = "/api/tracker/status",
    responses(
        (status = 200, description = "Tracking loop status", body = TrackerStatus)
    ),
    tag = "tracker"
)]
pub async fn status(State(state): State<AppState>) -> Json<TrackerStatus> {
    Json(state.status.status())
}

#[utoipa::path(
    get,
    path = "/api/tracker/sample",
    responses(
        (status = 200, description = "Most recent telemetry sample", body = TelemetrySample),
        (status = 404, description = "No tick has run yet", body = ErrorResponse)
    ),
    tag = "tracker"
)]
pub async fn sample(State(state): State<AppState>) -> ApiResult<Json<TelemetrySample>> {
    state
        .status
        .status()
        .last_sample
        .map(Json)
        .ok_or(ApiError::NotFound("no_sample"))
}

#[utoipa::path(
    post,
    path = "/api/tracker/stop",
    responses(
        (status = 202, description = "Stop requested; the antenna is stowed before the loop exits"),
        (status = 200, description = "A stop was already in progress")
    ),
    tag = "tracker"
)]
pub async fn stop(State(state): State<AppState>) -> StatusCode {
    if state.abort.is_aborted() {
        return StatusCode::OK;
    }
    state.abort.abort("stop requested through the status API");
    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::AbortHandle;
    use crate::predict::fixtures::epoch;
    use crate::predict::{ObserverLocation, ScheduleSnapshot, SnapshotStore};
    use crate::tracker::StatusHandle;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState {
            station: Some("test".into()),
            status: StatusHandle::default(),
            snapshots: Arc::new(SnapshotStore::new(ScheduleSnapshot::empty(
                ObserverLocation::new(45.0, -93.0, 300.0),
                epoch(),
            ))),
            abort: AbortHandle::new(),
        }
    }

    #[tokio::test]
    async fn status_before_first_tick() {
        let state = state();
        let Json(status) = status(State(state.clone())).await;
        assert!(!status.running);
        assert!(status.last_sample.is_none());
        assert!(matches!(
            sample(State(state)).await,
            Err(ApiError::NotFound("no_sample"))
        ));
    }

    #[tokio::test]
    async fn stop_aborts_the_loop() {
        let state = state();
        let signal = state.abort.signal();
        assert_eq!(stop(State(state.clone())).await, StatusCode::ACCEPTED);
        assert!(signal.is_aborted());
        assert_eq!(
            signal.reason().as_deref(),
            Some("stop requested through the status API")
        );
    }

    #[tokio::test]
    async fn second_stop_reports_stop_in_progress() {
        let state = state();
        state.abort.abort("run duration elapsed");
        assert_eq!(stop(State(state.clone())).await, StatusCode::OK);
        assert_eq!(
            state.abort.signal().reason().as_deref(),
            Some("run duration elapsed")
        );
    }
}
