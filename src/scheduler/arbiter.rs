use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::predict::{Candidate, PassEvent, SatelliteId, ScheduleSnapshot};

/// What the single antenna is doing right now.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrackTarget {
    #[default]
    Idle,
    Tracking {
        satellite: SatelliteId,
        pass: PassEvent,
    },
    /// Slewing from `from` to `to` at full rate. `pass` belongs to `to`.
    Handover {
        from: SatelliteId,
        to: SatelliteId,
        pass: PassEvent,
    },
}

impl TrackTarget {
    /// The satellite the antenna should be pointing at.
    pub fn satellite(&self) -> Option<SatelliteId> {
        match self {
            TrackTarget::Idle => None,
            TrackTarget::Tracking { satellite, .. } => Some(*satellite),
            TrackTarget::Handover { to, .. } => Some(*to),
        }
    }

    pub fn pass(&self) -> Option<&PassEvent> {
        match self {
            TrackTarget::Idle => None,
            TrackTarget::Tracking { pass, .. } | TrackTarget::Handover { pass, .. } => Some(pass),
        }
    }

    pub fn is_handover(&self) -> bool {
        matches!(self, TrackTarget::Handover { .. })
    }
}

/// A request that does not fit the current state. Always a caller bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulingConflict {
    #[error("no handover in flight")]
    NoHandover,
    #[error("handover is towards {expected}, not {requested}")]
    WrongHandoverTarget {
        expected: SatelliteId,
        requested: SatelliteId,
    },
    #[error("satellite {0} is not the active target")]
    NotActive(SatelliteId),
}

/// Orders candidates from worst to best: priority, then higher culmination,
/// then earlier rise, then lower NORAD id. Total, so selection never
/// depends on iteration order.
pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| a.pass.max_elevation_deg.total_cmp(&b.pass.max_elevation_deg))
        .then_with(|| b.pass.rise.cmp(&a.pass.rise))
        .then_with(|| b.pass.satellite.cmp(&a.pass.satellite))
}

/// Picks which satellite the antenna follows.
///
/// Reads a snapshot, never writes one. The only state kept here is the
/// current target, a candidate that showed up during a handover, and the
/// passes that have been given up on.
#[derive(Debug, Default)]
pub struct Scheduler {
    target: TrackTarget,
    queued: Option<Candidate>,
    degraded: Vec<PassEvent>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self) -> &TrackTarget {
        &self.target
    }

    /// Better candidate seen while a handover was in flight.
    pub fn queued(&self) -> Option<&Candidate> {
        self.queued.as_ref()
    }

    pub fn is_degraded(&self, pass: &PassEvent) -> bool {
        self.degraded
            .iter()
            .any(|d| d.satellite == pass.satellite && d.rise <= pass.set && pass.rise <= d.set)
    }

    fn best_active<'a>(
        &self,
        now: DateTime<Utc>,
        snapshot: &'a ScheduleSnapshot,
    ) -> Option<&'a Candidate> {
        snapshot
            .active_at(now)
            .filter(|c| !self.is_degraded(&c.pass))
            .max_by(|a, b| rank(a, b))
    }

    /// Re-evaluates the target for time `now`.
    pub fn advance(&mut self, now: DateTime<Utc>, snapshot: &ScheduleSnapshot) -> &TrackTarget {
        self.degraded.retain(|d| d.set >= now);
        let best = self.best_active(now, snapshot);

        let next = match &self.target {
            TrackTarget::Idle => match best {
                Some(c) => {
                    log::info!("Acquiring {} (rise {})", c.pass.satellite, c.pass.rise);
                    TrackTarget::Tracking {
                        satellite: c.pass.satellite,
                        pass: c.pass.clone(),
                    }
                }
                None => TrackTarget::Idle,
            },
            TrackTarget::Tracking { satellite, pass } => {
                let current = snapshot
                    .candidate(*satellite, now)
                    .filter(|c| !self.is_degraded(&c.pass));
                match (current, best) {
                    (Some(cur), Some(b)) if b.pass.satellite != *satellite && rank(b, cur).is_gt() => {
                        log::info!(
                            "Handing over from {} to {} ({} outranks {})",
                            satellite,
                            b.pass.satellite,
                            b.priority,
                            cur.priority
                        );
                        TrackTarget::Handover {
                            from: *satellite,
                            to: b.pass.satellite,
                            pass: b.pass.clone(),
                        }
                    }
                    (Some(cur), _) => TrackTarget::Tracking {
                        satellite: *satellite,
                        pass: cur.pass.clone(),
                    },
                    (None, Some(b)) => {
                        log::info!(
                            "Pass of {} ended at {}, handing over to {}",
                            satellite,
                            pass.set,
                            b.pass.satellite
                        );
                        TrackTarget::Handover {
                            from: *satellite,
                            to: b.pass.satellite,
                            pass: b.pass.clone(),
                        }
                    }
                    (None, None) => {
                        log::info!("Pass of {} ended at {}", satellite, pass.set);
                        TrackTarget::Idle
                    }
                }
            }
            TrackTarget::Handover { from, to, pass } => {
                match snapshot.candidate(*to, now) {
                    Some(target) => {
                        if let Some(b) = best {
                            if b.pass.satellite != *to && rank(b, target).is_gt() {
                                if self.queued.as_ref() != Some(b) {
                                    log::debug!(
                                        "Queueing {} until handover to {} completes",
                                        b.pass.satellite,
                                        to
                                    );
                                }
                                self.queued = Some(b.clone());
                            }
                        }
                        TrackTarget::Handover {
                            from: *from,
                            to: *to,
                            pass: target.pass.clone(),
                        }
                    }
                    None => {
                        log::warn!(
                            "Pass of {} ended at {} before the handover completed",
                            to,
                            pass.set
                        );
                        self.queued = None;
                        // The antenna is still near `from`, so anything else
                        // needs a fresh slew.
                        match best {
                            Some(c) if c.pass.satellite == *from => TrackTarget::Tracking {
                                satellite: *from,
                                pass: c.pass.clone(),
                            },
                            Some(c) => TrackTarget::Handover {
                                from: *from,
                                to: c.pass.satellite,
                                pass: c.pass.clone(),
                            },
                            None => TrackTarget::Idle,
                        }
                    }
                }
            }
        };

        self.target = next;
        &self.target
    }

    /// Called once the antenna is within tolerance of the handover target.
    pub fn confirm_handover(&mut self, satellite: SatelliteId) -> Result<&TrackTarget, SchedulingConflict> {
        match &self.target {
            TrackTarget::Handover { to, pass, .. } if *to == satellite => {
                self.target = TrackTarget::Tracking {
                    satellite,
                    pass: pass.clone(),
                };
                // Re-ranked on the next advance.
                self.queued = None;
                Ok(&self.target)
            }
            TrackTarget::Handover { to, .. } => Err(SchedulingConflict::WrongHandoverTarget {
                expected: *to,
                requested: satellite,
            }),
            _ => Err(SchedulingConflict::NoHandover),
        }
    }

    /// Gives up on the active pass. It will not be selected again.
    pub fn abandon(&mut self, satellite: SatelliteId) -> Result<(), SchedulingConflict> {
        match self.target.pass() {
            Some(pass) if pass.satellite == satellite => {
                log::error!("Abandoning pass of {} (rise {})", satellite, pass.rise);
                self.degraded.push(pass.clone());
                self.target = TrackTarget::Idle;
                self.queued = None;
                Ok(())
            }
            _ => Err(SchedulingConflict::NotActive(satellite)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::fixtures::epoch;
    use crate::predict::ObserverLocation;
    use crate::scheduler::Priority;
    use chrono::Duration;

    fn at(minutes: i64) -> DateTime<Utc> {
        epoch() + Duration::minutes(minutes)
    }

    fn candidate(
        satellite: SatelliteId,
        rise: i64,
        set: i64,
        max_elevation_deg: f64,
        priority: Priority,
    ) -> Candidate {
        Candidate {
            pass: PassEvent {
                satellite,
                rise: at(rise),
                culmination: at(rise) + (at(set) - at(rise)) / 2,
                max_elevation_deg,
                set: at(set),
                rise_azimuth_deg: 0.0,
                set_azimuth_deg: 180.0,
                min_elevation_deg: 10.0,
                truncated_start: false,
                truncated_end: false,
            },
            priority,
            downlink_hz: None,
        }
    }

    fn snapshot(mut candidates: Vec<Candidate>) -> ScheduleSnapshot {
        candidates.sort_by(|a, b| (a.pass.rise, a.pass.satellite).cmp(&(b.pass.rise, b.pass.satellite)));
        let mut snapshot = ScheduleSnapshot::empty(ObserverLocation::default(), epoch());
        snapshot.candidates = candidates;
        snapshot
    }

    #[test]
    fn idle_tracking_idle() {
        let snap = snapshot(vec![candidate(1, 10, 20, 40.0, Priority::Medium)]);
        let mut scheduler = Scheduler::new();

        assert_eq!(scheduler.advance(at(5), &snap), &TrackTarget::Idle);
        assert_eq!(scheduler.advance(at(10), &snap).satellite(), Some(1));
        assert!(matches!(
            scheduler.advance(at(15), &snap),
            TrackTarget::Tracking { satellite: 1, .. }
        ));
        assert_eq!(scheduler.advance(at(21), &snap), &TrackTarget::Idle);
    }

    #[test]
    fn higher_priority_wins() {
        let snap = snapshot(vec![
            candidate(1, 0, 20, 80.0, Priority::Low),
            candidate(2, 0, 20, 15.0, Priority::High),
        ]);
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.advance(at(5), &snap).satellite(), Some(2));
    }

    #[test]
    fn equal_priority_prefers_higher_elevation() {
        let snap = snapshot(vec![
            candidate(1, 0, 20, 35.0, Priority::Medium),
            candidate(2, 2, 20, 62.0, Priority::Medium),
        ]);
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.advance(at(5), &snap).satellite(), Some(2));
    }

    #[test]
    fn equal_elevation_prefers_earlier_rise() {
        let snap = snapshot(vec![
            candidate(1, 3, 20, 50.0, Priority::Medium),
            candidate(2, 1, 20, 50.0, Priority::Medium),
        ]);
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.advance(at(5), &snap).satellite(), Some(2));
    }

    #[test]
    fn full_tie_prefers_lower_id() {
        let snap = snapshot(vec![
            candidate(7, 1, 20, 50.0, Priority::Medium),
            candidate(4, 1, 20, 50.0, Priority::Medium),
        ]);
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.advance(at(5), &snap).satellite(), Some(4));
    }

    #[test]
    fn higher_priority_rising_triggers_handover() {
        let snap = snapshot(vec![
            candidate(1, 0, 30, 40.0, Priority::Low),
            candidate(2, 10, 25, 30.0, Priority::High),
        ]);
        let mut scheduler = Scheduler::new();

        assert_eq!(scheduler.advance(at(5), &snap).satellite(), Some(1));
        assert!(matches!(
            scheduler.advance(at(10), &snap),
            TrackTarget::Handover { from: 1, to: 2, .. }
        ));
        assert!(matches!(
            scheduler.confirm_handover(2),
            Ok(TrackTarget::Tracking { satellite: 2, .. })
        ));
        assert_eq!(scheduler.advance(at(12), &snap).satellite(), Some(2));

        // Satellite 1 is still up when 2 sets.
        assert!(matches!(
            scheduler.advance(at(26), &snap),
            TrackTarget::Handover { from: 2, to: 1, .. }
        ));
    }

    #[test]
    fn lower_priority_does_not_preempt() {
        let snap = snapshot(vec![
            candidate(1, 0, 30, 20.0, Priority::High),
            candidate(2, 5, 25, 85.0, Priority::Medium),
        ]);
        let mut scheduler = Scheduler::new();
        scheduler.advance(at(1), &snap);
        for minute in 5..30 {
            assert_eq!(scheduler.advance(at(minute), &snap).satellite(), Some(1));
        }
    }

    #[test]
    fn no_preemption_mid_handover() {
        let snap = snapshot(vec![
            candidate(1, 0, 40, 40.0, Priority::Low),
            candidate(2, 10, 40, 40.0, Priority::Medium),
            candidate(3, 12, 40, 40.0, Priority::Critical),
        ]);
        let mut scheduler = Scheduler::new();
        scheduler.advance(at(5), &snap);
        scheduler.advance(at(10), &snap);
        assert!(scheduler.target().is_handover());

        // Satellite 3 outranks the handover target but must wait.
        assert!(matches!(
            scheduler.advance(at(12), &snap),
            TrackTarget::Handover { from: 1, to: 2, .. }
        ));
        assert_eq!(scheduler.queued().map(|c| c.pass.satellite), Some(3));

        scheduler.confirm_handover(2).unwrap();
        assert!(scheduler.queued().is_none());
        assert!(matches!(
            scheduler.advance(at(13), &snap),
            TrackTarget::Handover { from: 2, to: 3, .. }
        ));
    }

    #[test]
    fn handover_target_setting_early_falls_back() {
        let snap = snapshot(vec![
            candidate(1, 0, 9, 40.0, Priority::Low),
            candidate(2, 5, 10, 40.0, Priority::High),
        ]);
        let mut scheduler = Scheduler::new();
        scheduler.advance(at(1), &snap);
        assert!(scheduler.advance(at(5), &snap).is_handover());
        assert_eq!(scheduler.advance(at(11), &snap), &TrackTarget::Idle);
    }

    #[test]
    fn ended_handover_slews_to_the_next_best() {
        let snap = snapshot(vec![
            candidate(1, 0, 30, 40.0, Priority::Low),
            candidate(2, 5, 10, 40.0, Priority::High),
            candidate(3, 8, 30, 40.0, Priority::Medium),
        ]);
        let mut scheduler = Scheduler::new();
        scheduler.advance(at(1), &snap);
        assert!(matches!(
            scheduler.advance(at(5), &snap),
            TrackTarget::Handover { from: 1, to: 2, .. }
        ));
        assert!(matches!(
            scheduler.advance(at(11), &snap),
            TrackTarget::Handover { from: 1, to: 3, .. }
        ));
        assert!(scheduler.queued().is_none());
    }

    #[test]
    fn ended_handover_returns_to_the_source() {
        let snap = snapshot(vec![
            candidate(1, 0, 30, 40.0, Priority::Low),
            candidate(2, 5, 10, 40.0, Priority::High),
        ]);
        let mut scheduler = Scheduler::new();
        scheduler.advance(at(1), &snap);
        assert!(scheduler.advance(at(5), &snap).is_handover());
        assert!(matches!(
            scheduler.advance(at(11), &snap),
            TrackTarget::Tracking { satellite: 1, .. }
        ));
    }

    #[test]
    fn abandoned_pass_is_not_reselected() {
        let snap = snapshot(vec![
            candidate(1, 0, 30, 70.0, Priority::High),
            candidate(2, 0, 30, 20.0, Priority::Low),
        ]);
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.advance(at(1), &snap).satellite(), Some(1));

        scheduler.abandon(1).unwrap();
        assert_eq!(scheduler.target(), &TrackTarget::Idle);
        assert!(scheduler.is_degraded(&snap.candidates[0].pass));

        assert_eq!(scheduler.advance(at(2), &snap).satellite(), Some(2));
        scheduler.abandon(2).unwrap();
        assert_eq!(scheduler.advance(at(3), &snap), &TrackTarget::Idle);
    }

    #[test]
    fn invalid_transitions_are_conflicts() {
        let snap = snapshot(vec![
            candidate(1, 0, 30, 40.0, Priority::Low),
            candidate(2, 5, 30, 40.0, Priority::High),
        ]);
        let mut scheduler = Scheduler::new();

        assert_eq!(scheduler.confirm_handover(1), Err(SchedulingConflict::NoHandover));
        assert_eq!(scheduler.abandon(1), Err(SchedulingConflict::NotActive(1)));

        scheduler.advance(at(1), &snap);
        assert_eq!(scheduler.confirm_handover(1), Err(SchedulingConflict::NoHandover));
        assert_eq!(scheduler.abandon(2), Err(SchedulingConflict::NotActive(2)));

        scheduler.advance(at(5), &snap);
        assert_eq!(
            scheduler.confirm_handover(1),
            Err(SchedulingConflict::WrongHandoverTarget {
                expected: 2,
                requested: 1
            })
        );
        // The handover target counts as active.
        assert_eq!(scheduler.abandon(2), Ok(()));
    }
}
