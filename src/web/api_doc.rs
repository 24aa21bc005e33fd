use utoipa::OpenApi;

use super::api::error::ErrorResponse;
use super::api::passes::PassesResponse;

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::tracker::status,
        super::api::tracker::sample,
        super::api::tracker::stop,
        super::api::passes::list_passes,
    ),
    components(
        schemas(
            PassesResponse,
            ErrorResponse,
            crate::predict::Candidate,
            crate::predict::PassEvent,
            crate::predict::LookAngle,
            crate::predict::ObserverLocation,
            crate::predict::ExcludedSatellite,
            crate::predict::ExclusionCause,
            crate::scheduler::Priority,
            crate::scheduler::TrackTarget,
            crate::tracker::TrackerStatus,
            crate::tracker::TrackerReport,
            crate::tracker::TelemetrySample,
            crate::tracker::TrackStatus,
            crate::tracker::FaultCode,
            crate::tracker::PassSummary,
        )
    ),
    info(
        title = "sat-track Status API",
        description = "Status of the tracking loop and the predicted pass schedule",
        version = "0.1.0"
    ),
    tags(
        (name = "tracker", description = "Tracking loop status"),
        (name = "predict", description = "Predicted passes")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/tracker/status",
            "/api/tracker/sample",
            "/api/tracker/stop",
            "/api/passes",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["components"]["schemas"]["TrackTarget"].is_object());
    }
}
