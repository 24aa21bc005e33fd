mod error;
mod ground_station;
mod link;
mod pass_finder;
mod propagation;
mod snapshot;
mod tle_loader;
mod topocentric;
mod types;

pub use ground_station::ObserverLocation;
pub use link::LinkEstimate;
pub use pass_finder::find_passes;
pub use propagation::propagate;
pub use snapshot::{
    build_snapshot, Candidate, CatalogEntry, ExcludedSatellite, ExclusionCause, PassSettings,
    ScheduleSnapshot, SnapshotStore,
};
pub use tle_loader::TleLoader;
pub use topocentric::{azimuth_to_direction, to_look_angle, ZenithHold};
pub use types::{LookAngle, OrbitalElements, PassEvent, SatelliteId};

#[cfg(test)]
pub(crate) use propagation::tests as fixtures;
