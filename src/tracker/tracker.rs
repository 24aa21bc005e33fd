use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use utoipa::ToSchema;

use crate::abort::AbortSignal;
use crate::predict::{
    to_look_angle, ExclusionCause, LinkEstimate, LookAngle, SatelliteId, ScheduleSnapshot,
    SnapshotStore, ZenithHold,
};
use crate::scheduler::{Scheduler, TrackTarget};
use crate::tracker::actuator::{AchievedAngle, Actuator, ActuatorFault, PointingCommand, SensorFault, SignalQuality};
use crate::tracker::error::TrackerError;
use crate::tracker::slew::{pointing_error, SlewLimiter};
use crate::tracker::telemetry::{FaultCode, LogSink, TelemetrySample, TelemetrySink, TrackStatus};

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub period: Duration,
    pub actuator_timeout: Duration,
    /// Consecutive failed ticks before a pass is given up.
    pub retry_limit: u32,
    /// Consecutive actuator failures before the loop stops.
    pub fatal_limit: u32,
    pub max_slew_rate_deg_s: f64,
    pub handover_tolerance_deg: f64,
    pub stow: AchievedAngle,
    pub min_elevation_deg: f64,
    pub max_elevation_deg: f64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            actuator_timeout: Duration::from_millis(500),
            retry_limit: 3,
            fatal_limit: 10,
            max_slew_rate_deg_s: 6.0,
            handover_tolerance_deg: 0.5,
            stow: AchievedAngle {
                azimuth_deg: 0.0,
                elevation_deg: 90.0,
            },
            min_elevation_deg: 0.0,
            max_elevation_deg: 90.0,
        }
    }
}

impl TrackingSettings {
    pub fn validate(&self) -> Result<(), TrackerError> {
        let invalid = |msg: &str| Err(TrackerError::InvalidSettings(msg.to_string()));
        if self.period.is_zero() {
            return invalid("period must be positive");
        }
        if self.actuator_timeout.is_zero() {
            return invalid("actuator timeout must be positive");
        }
        if self.retry_limit == 0 || self.fatal_limit == 0 {
            return invalid("retry and fatal limits must be at least 1");
        }
        if !(self.max_slew_rate_deg_s > 0.0) {
            return invalid("max slew rate must be positive");
        }
        if !(self.min_elevation_deg < self.max_elevation_deg)
            || self.min_elevation_deg < 0.0
            || self.max_elevation_deg > 90.0
        {
            return invalid("elevation limits must satisfy 0 <= min < max <= 90");
        }
        Ok(())
    }
}

/// Source of "now" for each tick.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    Wall,
    /// Tick `n` happens at `start + n × period`, however long the tick took.
    Simulated { start: DateTime<Utc> },
}

impl Clock {
    pub fn now(&self, tick: u64, period: Duration) -> DateTime<Utc> {
        match self {
            Clock::Wall => Utc::now(),
            Clock::Simulated { start } => {
                *start + TimeDelta::microseconds(period.as_micros() as i64 * tick as i64)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct TrackerReport {
    pub ticks: u64,
    pub passes_tracked: u32,
    pub passes_degraded: u32,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct TrackerStatus {
    pub running: bool,
    pub target: TrackTarget,
    /// Waiting for the current handover to finish.
    pub queued: Option<SatelliteId>,
    pub last_sample: Option<TelemetrySample>,
    pub report: TrackerReport,
    pub consecutive_actuator_failures: u32,
}

/// Read-only view of the loop for the status API.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    shared: Arc<StdMutex<TrackerStatus>>,
}

impl StatusHandle {
    pub fn status(&self) -> TrackerStatus {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerStatus> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What happened during one pass, handed off for analysis once the pass
/// is over.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PassSummary {
    pub satellite: SatelliteId,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    pub samples: u32,
    pub locked_samples: u32,
    pub mean_snr_db: Option<f64>,
    pub peak_elevation_deg: f64,
    pub fault_count: u32,
    pub degraded: bool,
    #[serde(skip)]
    snr_readings: u32,
}

impl PassSummary {
    pub fn new(satellite: SatelliteId, at: DateTime<Utc>) -> Self {
        Self {
            satellite,
            started: at,
            ended: at,
            samples: 0,
            locked_samples: 0,
            mean_snr_db: None,
            peak_elevation_deg: f64::NEG_INFINITY,
            fault_count: 0,
            degraded: false,
            snr_readings: 0,
        }
    }

    fn record(&mut self, sample: &TelemetrySample) {
        self.ended = sample.timestamp;
        self.samples += 1;
        self.fault_count += sample.faults.len() as u32;
        if let Some(look) = &sample.look {
            self.peak_elevation_deg = self.peak_elevation_deg.max(look.elevation_deg);
        }
        if let Some(signal) = &sample.signal {
            if signal.locked {
                self.locked_samples += 1;
            }
            self.snr_readings += 1;
            let mean = self.mean_snr_db.unwrap_or(0.0);
            self.mean_snr_db = Some(mean + (signal.snr_db - mean) / self.snr_readings as f64);
        }
    }
}

/// Closed-loop pointing controller. Owns the actuator; reads schedules from
/// a [`SnapshotStore`] that may be swapped underneath it at any time.
pub struct TrackingLoop<A: Actuator> {
    actuator: A,
    settings: TrackingSettings,
    limiter: SlewLimiter,
    clock: Clock,
    snapshots: Arc<SnapshotStore>,
    /// Last snapshot whose exclusions went to the sink.
    reported: Option<Arc<ScheduleSnapshot>>,
    scheduler: Scheduler,
    sink: Box<dyn TelemetrySink>,
    status: StatusHandle,
    summaries: Option<mpsc::Sender<PassSummary>>,
    end: Option<DateTime<Utc>>,
    zenith: ZenithHold,
    tick: u64,
    commanded: AchievedAngle,
    last_look: Option<(SatelliteId, LookAngle)>,
    pass: Option<PassSummary>,
    pass_failures: u32,
    actuator_failures: u32,
    last_fault: Option<ActuatorFault>,
    report: TrackerReport,
}

impl<A: Actuator> TrackingLoop<A> {
    pub fn new(
        actuator: A,
        snapshots: Arc<SnapshotStore>,
        settings: TrackingSettings,
    ) -> Result<Self, TrackerError> {
        settings.validate()?;
        let limiter = SlewLimiter {
            max_rate_deg_s: settings.max_slew_rate_deg_s,
            min_elevation_deg: settings.min_elevation_deg,
            max_elevation_deg: settings.max_elevation_deg,
        };
        let commanded = settings.stow;

        Ok(Self {
            actuator,
            settings,
            limiter,
            clock: Clock::Wall,
            snapshots,
            reported: None,
            scheduler: Scheduler::new(),
            sink: Box::new(LogSink),
            status: StatusHandle::default(),
            summaries: None,
            end: None,
            zenith: ZenithHold::default(),
            tick: 0,
            commanded,
            last_look: None,
            pass: None,
            pass_failures: 0,
            actuator_failures: 0,
            last_fault: None,
            report: TrackerReport::default(),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Finished passes are offered here without blocking; a full channel
    /// drops the summary.
    pub fn with_summaries(mut self, tx: mpsc::Sender<PassSummary>) -> Self {
        self.summaries = Some(tx);
        self
    }

    /// Stop after the last tick at or before `end`.
    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Runs until aborted, until the configured end, or until the actuator
    /// is declared unavailable. The mount is stowed on the way out in every
    /// case.
    pub async fn run(mut self, mut abort: AbortSignal) -> Result<TrackerReport, TrackerError> {
        let mut interval = tokio::time::interval(self.settings.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.status.lock().running = true;
        log::info!("Tracking loop started ({:?} period)", self.settings.period);

        let result = loop {
            let should_stop = tokio::select! {
                biased;
                _ = abort.aborted() => true,
                _ = interval.tick() => false,
            };
            if should_stop {
                log::info!(
                    "Tracking loop stopping: {}",
                    abort.reason().unwrap_or_default()
                );
                break Ok(());
            }

            let now = self.clock.now(self.tick, self.settings.period);
            if self.end.is_some_and(|end| now > end) {
                break Ok(());
            }
            if let Err(e) = self.step(now).await {
                break Err(e);
            }
        };

        if let Err(e) = &result {
            log::error!("Tracking loop failed: {}", e);
        }
        self.finish_pass(false);
        let now = self.clock.now(self.tick, self.settings.period);
        self.stow(now).await;
        self.status.lock().running = false;

        result.map(|()| self.report.clone())
    }

    async fn step(&mut self, now: DateTime<Utc>) -> Result<(), TrackerError> {
        let snapshot = self.snapshots.load();
        let target = self.scheduler.advance(now, &snapshot).clone();
        if !self
            .reported
            .as_ref()
            .is_some_and(|seen| Arc::ptr_eq(seen, &snapshot))
        {
            self.report_exclusions(now, &snapshot, &target);
            self.reported = Some(snapshot.clone());
        }

        let sample = match target.satellite() {
            None => self.idle_tick(now).await,
            Some(satellite) => {
                self.track_tick(now, &snapshot, satellite, target.is_handover())
                    .await?
            }
        };
        self.publish(sample);
        self.tick += 1;
        self.report.ticks = self.tick;

        if self.actuator_failures >= self.settings.fatal_limit {
            if let Some(last) = self.last_fault.clone() {
                return Err(TrackerError::ActuatorUnavailable {
                    failures: self.actuator_failures,
                    last,
                });
            }
        }
        Ok(())
    }

    async fn idle_tick(&mut self, now: DateTime<Utc>) -> TelemetrySample {
        self.finish_pass(false);
        self.zenith.reset();
        self.pass_failures = 0;

        let mut sample = TelemetrySample::new(self.tick, now, TrackStatus::Idle);
        let command = self.limiter.command(
            &self.commanded,
            self.settings.stow.azimuth_deg,
            self.settings.stow.elevation_deg,
            self.settings.period.as_secs_f64(),
            false,
        );
        sample.commanded = Some(command);
        match self.send(&command).await {
            Ok(achieved) => sample.achieved = Some(achieved),
            Err(code) => sample.faults.push(code),
        }
        sample
    }

    async fn track_tick(
        &mut self,
        now: DateTime<Utc>,
        snapshot: &ScheduleSnapshot,
        satellite: SatelliteId,
        handover: bool,
    ) -> Result<TelemetrySample, TrackerError> {
        if self.pass.as_ref().map(|p| p.satellite) != Some(satellite) {
            self.finish_pass(false);
            self.pass = Some(PassSummary::new(satellite, now));
            self.pass_failures = 0;
            self.zenith.reset();
        }

        let status = if handover {
            TrackStatus::Handover
        } else {
            TrackStatus::Tracking
        };
        let mut sample = TelemetrySample::new(self.tick, now, status);
        sample.satellite = Some(satellite);

        let look = match look_angle(snapshot, satellite, now) {
            Ok(look) => Some(self.zenith.apply(look)),
            Err(code) => {
                sample.faults.push(code);
                // Reuse the previous sample for this satellite, if any.
                self.last_look
                    .filter(|(s, _)| *s == satellite)
                    .map(|(_, look)| look)
            }
        };

        if let Some(look) = look {
            self.last_look = Some((satellite, look));
            sample.look = Some(look);

            let downlink_hz = snapshot
                .candidate(satellite, now)
                .and_then(|c| c.downlink_hz);
            if let Some(carrier_hz) = downlink_hz {
                match LinkEstimate::for_look(carrier_hz, &look) {
                    Ok(estimate) => {
                        sample.doppler_shift_hz = Some(estimate.doppler_shift_hz);
                        sample.tuned_hz = Some(estimate.tuned_hz);
                        sample.path_loss_db = Some(estimate.path_loss_db);
                    }
                    Err(e) => log::warn!("Link estimate for {} failed: {}", satellite, e),
                }
            }

            let command = self.limiter.command(
                &self.commanded,
                look.azimuth_deg,
                look.elevation_deg,
                self.settings.period.as_secs_f64(),
                handover,
            );
            sample.commanded = Some(command);

            let mut failed = false;
            match self.send(&command).await {
                Ok(achieved) => {
                    sample.achieved = Some(achieved);
                    let error = pointing_error(&achieved, look.azimuth_deg, look.elevation_deg);
                    if handover && error <= self.settings.handover_tolerance_deg {
                        self.scheduler.confirm_handover(satellite)?;
                        log::info!("Handover to {} complete", satellite);
                    }
                }
                Err(code) => {
                    sample.faults.push(code);
                    failed = true;
                }
            }
            match self.read_signal().await {
                Ok(quality) => sample.signal = Some(quality),
                Err(code) => {
                    sample.faults.push(code);
                    failed = true;
                }
            }

            self.pass_failures = if failed { self.pass_failures + 1 } else { 0 };
        } else {
            // Nothing to point at yet.
            self.pass_failures += 1;
        }

        if let Some(pass) = self.pass.as_mut() {
            pass.record(&sample);
        }

        if self.pass_failures >= self.settings.retry_limit {
            log::error!(
                "Giving up on {} after {} failed ticks",
                satellite,
                self.pass_failures
            );
            self.scheduler.abandon(satellite)?;
            sample.status = TrackStatus::Degraded;
            sample.faults.push(FaultCode::PassDegraded);
            self.pass_failures = 0;
            self.finish_pass(true);
        }

        Ok(sample)
    }

    async fn send(&mut self, command: &PointingCommand) -> Result<AchievedAngle, FaultCode> {
        let timeout = self.settings.actuator_timeout;
        let fault = match tokio::time::timeout(timeout, self.actuator.set_pointing(command, timeout)).await {
            Ok(Ok(achieved)) => {
                self.actuator_failures = 0;
                self.commanded = AchievedAngle {
                    azimuth_deg: command.azimuth_deg,
                    elevation_deg: command.elevation_deg,
                };
                return Ok(achieved);
            }
            Ok(Err(fault)) => fault,
            Err(_) => ActuatorFault::Timeout(timeout),
        };

        self.actuator_failures += 1;
        log::warn!(
            "Pointing command failed ({} in a row): {}",
            self.actuator_failures,
            fault
        );
        let code = match &fault {
            ActuatorFault::Timeout(_) => FaultCode::ActuatorTimeout,
            ActuatorFault::Rejected(_) => FaultCode::ActuatorRejected,
            ActuatorFault::Disconnected => FaultCode::ActuatorDisconnected,
        };
        self.last_fault = Some(fault);
        Err(code)
    }

    async fn read_signal(&mut self) -> Result<SignalQuality, FaultCode> {
        let timeout = self.settings.actuator_timeout;
        let fault = match tokio::time::timeout(timeout, self.actuator.read_signal_quality(timeout)).await {
            Ok(Ok(quality)) => return Ok(quality),
            Ok(Err(fault)) => fault,
            Err(_) => SensorFault::Timeout(timeout),
        };
        log::warn!("Signal quality read failed: {}", fault);
        Err(match fault {
            SensorFault::Timeout(_) => FaultCode::SensorTimeout,
            SensorFault::Unavailable(_) => FaultCode::SensorUnavailable,
        })
    }

    async fn stow(&mut self, now: DateTime<Utc>) {
        let command = PointingCommand {
            azimuth_deg: self.settings.stow.azimuth_deg,
            elevation_deg: self.settings.stow.elevation_deg,
            max_rate_deg_s: Some(self.settings.max_slew_rate_deg_s),
        };
        let mut sample = TelemetrySample::new(self.tick, now, TrackStatus::Stowing);
        sample.commanded = Some(command);
        match self.send(&command).await {
            Ok(achieved) => {
                log::info!("Antenna stowed");
                sample.achieved = Some(achieved);
            }
            Err(code) => {
                log::error!("Final stow failed: {}", code);
                sample.faults.push(code);
            }
        }
        self.publish(sample);
    }

    /// One record per satellite the schedule left out, each time a new
    /// schedule is picked up.
    fn report_exclusions(
        &mut self,
        now: DateTime<Utc>,
        snapshot: &ScheduleSnapshot,
        target: &TrackTarget,
    ) {
        let status = match target {
            TrackTarget::Idle => TrackStatus::Idle,
            TrackTarget::Tracking { .. } => TrackStatus::Tracking,
            TrackTarget::Handover { .. } => TrackStatus::Handover,
        };
        for excluded in &snapshot.excluded {
            let mut sample = TelemetrySample::new(self.tick, now, status);
            sample.satellite = Some(excluded.satellite);
            sample.faults.push(match excluded.cause {
                ExclusionCause::StaleElements => FaultCode::StaleElements,
                ExclusionCause::InvalidElements => FaultCode::InvalidElements,
                ExclusionCause::Propagation => FaultCode::Propagation,
            });
            if let Err(e) = self.sink.append(&sample) {
                log::warn!("Telemetry sink failed: {}", e);
            }
        }
    }

    fn finish_pass(&mut self, degraded: bool) {
        let Some(mut summary) = self.pass.take() else {
            return;
        };
        summary.degraded = degraded;
        if degraded {
            self.report.passes_degraded += 1;
        } else {
            self.report.passes_tracked += 1;
        }
        log::info!(
            "Pass of {} finished: {} samples, {} locked{}",
            summary.satellite,
            summary.samples,
            summary.locked_samples,
            if degraded { ", degraded" } else { "" }
        );

        if let Some(tx) = &self.summaries {
            if let Err(e) = tx.try_send(summary) {
                log::warn!("Dropping pass summary: {}", e);
            }
        }
    }

    fn publish(&mut self, sample: TelemetrySample) {
        if let Err(e) = self.sink.append(&sample) {
            log::warn!("Telemetry sink failed: {}", e);
        }
        let mut status = self.status.lock();
        status.target = self.scheduler.target().clone();
        status.queued = self.scheduler.queued().map(|c| c.pass.satellite);
        status.report = self.report.clone();
        status.consecutive_actuator_failures = self.actuator_failures;
        status.last_sample = Some(sample);
    }
}

fn look_angle(
    snapshot: &ScheduleSnapshot,
    satellite: SatelliteId,
    now: DateTime<Utc>,
) -> Result<LookAngle, FaultCode> {
    let ephemeris = snapshot
        .ephemeris(satellite)
        .ok_or(FaultCode::MissingEphemeris)?;
    let state = ephemeris.propagate(now).map_err(|e| {
        log::warn!("Propagation for {} failed: {}", satellite, e);
        FaultCode::Propagation
    })?;
    to_look_angle(&state, &snapshot.observer, now).map_err(|e| {
        log::warn!("Look angle for {} failed: {}", satellite, e);
        FaultCode::Geometry
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::AbortHandle;
    use crate::predict::fixtures::{epoch, leo_elements};
    use crate::predict::{
        build_snapshot, CatalogEntry, ObserverLocation, OrbitalElements, PassEvent, PassSettings,
    };
    use crate::scheduler::Priority;
    use crate::tracker::simulated::SimulatedMount;
    use crate::tracker::telemetry::tests::MemorySink;

    fn observer() -> ObserverLocation {
        ObserverLocation::new(45.0, -93.0, 300.0)
    }

    fn entry(elements: OrbitalElements, priority: Priority) -> CatalogEntry {
        CatalogEntry {
            elements: Arc::new(elements),
            priority,
            downlink_hz: Some(437.5e6),
        }
    }

    fn store(catalog: &[CatalogEntry]) -> Arc<SnapshotStore> {
        let snapshot = build_snapshot(
            catalog,
            &observer(),
            epoch(),
            epoch() + chrono::Duration::hours(24),
            &PassSettings::default(),
        );
        Arc::new(SnapshotStore::new(snapshot))
    }

    fn longest_pass(store: &SnapshotStore, satellite: SatelliteId) -> PassEvent {
        store
            .load()
            .candidates
            .iter()
            .filter(|c| c.pass.satellite == satellite)
            .max_by_key(|c| c.pass.duration())
            .map(|c| c.pass.clone())
            .unwrap()
    }

    fn mount() -> SimulatedMount {
        SimulatedMount::new(TrackingSettings::default().stow, 6.0)
    }

    fn secs(s: i64) -> chrono::Duration {
        chrono::Duration::seconds(s)
    }

    #[tokio::test(start_paused = true)]
    async fn tracks_during_pass_and_idles_outside() {
        let store = store(&[entry(leo_elements(epoch()), Priority::Medium)]);
        let pass = longest_pass(&store, 99001);
        let sink = MemorySink::default();
        let (tx, mut rx) = mpsc::channel(4);

        let report = TrackingLoop::new(mount(), store, TrackingSettings::default())
            .unwrap()
            .with_clock(Clock::Simulated {
                start: pass.rise - secs(120),
            })
            .until(pass.set + secs(120))
            .with_sink(sink.clone())
            .with_summaries(tx)
            .run(AbortHandle::new().signal())
            .await
            .unwrap();

        let samples = sink.samples();
        let (last, ticks) = samples.split_last().unwrap();
        assert_eq!(last.status, TrackStatus::Stowing);
        assert_eq!(report.ticks, ticks.len() as u64);
        assert_eq!(report.passes_tracked, 1);

        for sample in ticks {
            if pass.contains(sample.timestamp) {
                assert_eq!(sample.status, TrackStatus::Tracking, "{sample:?}");
                assert_eq!(sample.satellite, Some(99001));
                let look = sample.look.unwrap();
                assert!(look.elevation_deg >= 10.0 - 1e-6, "{look:?}");
                let doppler = sample.doppler_shift_hz.unwrap();
                assert!(doppler * look.range_rate_km_s <= 0.0);
            } else {
                assert_eq!(sample.status, TrackStatus::Idle, "{sample:?}");
                assert!(sample.look.is_none());
            }
            assert!(sample.faults.is_empty(), "{sample:?}");
        }

        // By the end of the pass the mount has caught up with the satellite.
        let settled = ticks
            .iter()
            .rev()
            .find(|s| s.status == TrackStatus::Tracking)
            .unwrap();
        let look = settled.look.unwrap();
        let achieved = settled.achieved.unwrap();
        assert!(pointing_error(&achieved, look.azimuth_deg, look.elevation_deg) < 0.5);
        assert!(settled.signal.unwrap().locked);

        let summary = rx.try_recv().unwrap();
        assert_eq!(summary.satellite, 99001);
        assert!(!summary.degraded);
        assert!(summary.samples > 0);
        assert!(summary.peak_elevation_deg >= 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn three_timeouts_degrade_the_pass() {
        let store = store(&[entry(leo_elements(epoch()), Priority::Medium)]);
        let pass = longest_pass(&store, 99001);
        let mount = mount();
        let handle = mount.handle();
        handle.hang_next_commands(3);
        let sink = MemorySink::default();

        let report = TrackingLoop::new(mount, store, TrackingSettings::default())
            .unwrap()
            .with_clock(Clock::Simulated {
                start: pass.rise + secs(30),
            })
            .until(pass.rise + secs(60))
            .with_sink(sink.clone())
            .run(AbortHandle::new().signal())
            .await
            .unwrap();

        let samples = sink.samples();
        for sample in &samples[..2] {
            assert_eq!(sample.status, TrackStatus::Tracking);
            assert_eq!(sample.faults, vec![FaultCode::ActuatorTimeout]);
        }
        assert_eq!(samples[2].status, TrackStatus::Degraded);
        assert_eq!(
            samples[2].faults,
            vec![FaultCode::ActuatorTimeout, FaultCode::PassDegraded]
        );
        // The pass is still up, but it is not picked again.
        assert!(pass.contains(samples[3].timestamp));
        assert_eq!(samples[3].status, TrackStatus::Idle);
        assert!(samples[3..samples.len() - 1]
            .iter()
            .all(|s| s.status == TrackStatus::Idle));
        assert_eq!(report.passes_degraded, 1);
        assert_eq!(report.passes_tracked, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_actuator_stops_the_loop() {
        let store = store(&[]);
        let mount = mount();
        let handle = mount.handle();
        handle.set_disconnected(true);
        let sink = MemorySink::default();

        let result = TrackingLoop::new(mount, store, TrackingSettings::default())
            .unwrap()
            .with_clock(Clock::Simulated { start: epoch() })
            .with_sink(sink.clone())
            .run(AbortHandle::new().signal())
            .await;

        assert!(matches!(
            result,
            Err(TrackerError::ActuatorUnavailable {
                failures: 10,
                last: ActuatorFault::Disconnected
            })
        ));
        let samples = sink.samples();
        // Ten idle ticks, then the final stow attempt.
        assert_eq!(samples.len(), 11);
        assert_eq!(samples[10].status, TrackStatus::Stowing);
        assert_eq!(samples[10].faults, vec![FaultCode::ActuatorDisconnected]);
        assert!(handle.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stows_and_exits() {
        let store = store(&[]);
        let mount = mount();
        let handle = mount.handle();
        let abort = AbortHandle::new();
        let sink = MemorySink::default();

        let tracker = TrackingLoop::new(mount, store, TrackingSettings::default())
            .unwrap()
            .with_clock(Clock::Simulated { start: epoch() })
            .with_sink(sink.clone());
        let status = tracker.status_handle();
        let run = tokio::spawn(tracker.run(abort.signal()));

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert!(status.status().running);
        abort.abort("test over");

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.ticks, 5);
        assert!(!status.status().running);
        assert_eq!(sink.samples().last().unwrap().status, TrackStatus::Stowing);
        let stow = handle.commands().last().copied().unwrap();
        assert_eq!(stow.elevation_deg, 90.0);
        assert_eq!(stow.max_rate_deg_s, Some(6.0));
    }

    #[tokio::test(start_paused = true)]
    async fn higher_priority_rise_hands_over() {
        let leader = leo_elements(epoch());
        let mut follower = leo_elements(epoch());
        follower.norad_id = 99002;
        // Same ground track, about half a minute behind.
        follower.mean_anomaly_deg = 358.0;

        let store = store(&[
            entry(leader, Priority::Low),
            entry(follower, Priority::High),
        ]);
        let pass = longest_pass(&store, 99001);
        let sink = MemorySink::default();
        let (tx, mut rx) = mpsc::channel(4);

        TrackingLoop::new(mount(), store, TrackingSettings::default())
            .unwrap()
            .with_clock(Clock::Simulated {
                start: pass.rise - secs(10),
            })
            .until(pass.rise + secs(150))
            .with_sink(sink.clone())
            .with_summaries(tx)
            .run(AbortHandle::new().signal())
            .await
            .unwrap();

        let samples = sink.samples();
        let first_handover = samples
            .iter()
            .position(|s| s.status == TrackStatus::Handover)
            .expect("no handover happened");
        assert!(samples[..first_handover]
            .iter()
            .all(|s| s.satellite.is_none() || s.satellite == Some(99001)));
        assert!(samples[first_handover..]
            .iter()
            .filter(|s| s.satellite.is_some())
            .all(|s| s.satellite == Some(99002)));
        assert!(samples[first_handover..]
            .iter()
            .any(|s| s.status == TrackStatus::Tracking));

        assert_eq!(rx.try_recv().unwrap().satellite, 99001);
        assert_eq!(rx.try_recv().unwrap().satellite, 99002);
    }

    #[tokio::test(start_paused = true)]
    async fn excluded_satellites_are_reported_per_schedule() {
        let mut stale = leo_elements(epoch() - chrono::Duration::days(30));
        stale.norad_id = 99003;
        let catalog = [
            entry(leo_elements(epoch()), Priority::Medium),
            entry(stale, Priority::High),
        ];
        let store = store(&catalog);
        let abort = AbortHandle::new();
        let sink = MemorySink::default();

        let tracker = TrackingLoop::new(mount(), store.clone(), TrackingSettings::default())
            .unwrap()
            .with_clock(Clock::Simulated { start: epoch() })
            .with_sink(sink.clone());
        let status = tracker.status_handle();
        let run = tokio::spawn(tracker.run(abort.signal()));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        store.replace(build_snapshot(
            &catalog,
            &observer(),
            epoch(),
            epoch() + chrono::Duration::hours(24),
            &PassSettings::default(),
        ));
        tokio::time::sleep(Duration::from_millis(2000)).await;
        abort.abort("test over");
        run.await.unwrap().unwrap();

        let records: Vec<_> = sink
            .samples()
            .into_iter()
            .filter(|s| s.satellite == Some(99003))
            .collect();
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.faults, vec![FaultCode::StaleElements]);
            assert!(record.look.is_none());
        }
        assert_eq!(records[0].tick, 0);
        assert_eq!(records[1].tick, 3);
        // Tick samples still drive the status view.
        assert_ne!(
            status.status().last_sample.unwrap().satellite,
            Some(99003)
        );
    }

    #[test]
    fn settings_are_validated() {
        assert!(TrackingSettings::default().validate().is_ok());

        let mut settings = TrackingSettings::default();
        settings.retry_limit = 0;
        assert!(settings.validate().is_err());

        let mut settings = TrackingSettings::default();
        settings.max_elevation_deg = 95.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn simulated_clock_steps_by_period() {
        let clock = Clock::Simulated { start: epoch() };
        assert_eq!(clock.now(0, Duration::from_secs(1)), epoch());
        assert_eq!(
            clock.now(90, Duration::from_millis(500)),
            epoch() + chrono::Duration::seconds(45)
        );
    }
}
