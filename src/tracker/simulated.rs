use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::tracker::actuator::{
    AchievedAngle, Actuator, ActuatorFault, PointingCommand, SensorFault, SignalQuality,
};
use crate::tracker::slew::{pointing_error, SlewLimiter};

const NOMINAL_SNR_DB: f64 = 18.0;
const BEAMWIDTH_DEG: f64 = 8.0;
const LOCK_THRESHOLD_DB: f64 = 6.0;

#[derive(Debug, Default)]
struct Faults {
    hang_commands: u32,
    reject_commands: u32,
    hang_readings: u32,
    disconnected: bool,
}

#[derive(Debug)]
struct MountState {
    position: AchievedAngle,
    last_command: Option<PointingCommand>,
    commands: Vec<PointingCommand>,
    faults: Faults,
}

enum Outcome<T> {
    Ready(T),
    Hang,
}

/// Test and demo stand-in for a rotator with a receiver attached.
///
/// Moves towards each command at a bounded rate and reports an SNR that
/// falls off with pointing error. Faults are injected through a
/// [`SimulatedHandle`], which stays usable after the mount has been moved
/// into the tracking loop.
pub struct SimulatedMount {
    state: Arc<Mutex<MountState>>,
    max_rate_deg_s: f64,
    last_move: Option<Instant>,
}

impl SimulatedMount {
    pub fn new(start: AchievedAngle, max_rate_deg_s: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MountState {
                position: start,
                last_command: None,
                commands: Vec::new(),
                faults: Faults::default(),
            })),
            max_rate_deg_s,
            last_move: None,
        }
    }

    pub fn handle(&self) -> SimulatedHandle {
        SimulatedHandle {
            state: self.state.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MountState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Actuator for SimulatedMount {
    async fn set_pointing(
        &mut self,
        command: &PointingCommand,
        _timeout: Duration,
    ) -> Result<AchievedAngle, ActuatorFault> {
        let now = Instant::now();
        // A fresh mount is assumed to already sit on its first target.
        let elapsed = self
            .last_move
            .map(|t| now.duration_since(t).as_secs_f64())
            .unwrap_or(1e9);
        let rate = command
            .max_rate_deg_s
            .unwrap_or(self.max_rate_deg_s)
            .min(self.max_rate_deg_s);

        let outcome = {
            let mut state = self.lock();
            if state.faults.disconnected {
                return Err(ActuatorFault::Disconnected);
            }
            if state.faults.hang_commands > 0 {
                state.faults.hang_commands -= 1;
                Outcome::Hang
            } else if state.faults.reject_commands > 0 {
                state.faults.reject_commands -= 1;
                return Err(ActuatorFault::Rejected("simulated rejection".into()));
            } else {
                state.position = SlewLimiter::new(rate).step(
                    &state.position,
                    command.azimuth_deg,
                    command.elevation_deg,
                    elapsed,
                );
                state.last_command = Some(*command);
                state.commands.push(*command);
                Outcome::Ready(state.position)
            }
        };

        match outcome {
            Outcome::Ready(position) => {
                self.last_move = Some(now);
                Ok(position)
            }
            Outcome::Hang => std::future::pending().await,
        }
    }

    async fn read_signal_quality(&mut self, _timeout: Duration) -> Result<SignalQuality, SensorFault> {
        let outcome = {
            let mut state = self.lock();
            if state.faults.disconnected {
                return Err(SensorFault::Unavailable("receiver offline".into()));
            }
            if state.faults.hang_readings > 0 {
                state.faults.hang_readings -= 1;
                Outcome::Hang
            } else {
                let snr_db = match &state.last_command {
                    Some(command) => {
                        let error = pointing_error(
                            &state.position,
                            command.azimuth_deg,
                            command.elevation_deg,
                        );
                        NOMINAL_SNR_DB - 12.0 * (error / BEAMWIDTH_DEG).powi(2)
                    }
                    None => 0.0,
                };
                Outcome::Ready(SignalQuality {
                    snr_db,
                    locked: snr_db >= LOCK_THRESHOLD_DB,
                })
            }
        };

        match outcome {
            Outcome::Ready(quality) => Ok(quality),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

/// Inspects and perturbs a [`SimulatedMount`] from outside the loop.
#[derive(Clone)]
pub struct SimulatedHandle {
    state: Arc<Mutex<MountState>>,
}

impl SimulatedHandle {
    fn with<T>(&self, f: impl FnOnce(&mut MountState) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// The next `n` pointing commands never complete.
    #[cfg(test)]
    pub fn hang_next_commands(&self, n: u32) {
        self.with(|s| s.faults.hang_commands = n);
    }

    #[cfg(test)]
    pub fn reject_next_commands(&self, n: u32) {
        self.with(|s| s.faults.reject_commands = n);
    }

    #[cfg(test)]
    pub fn hang_next_readings(&self, n: u32) {
        self.with(|s| s.faults.hang_readings = n);
    }

    #[cfg(test)]
    pub fn set_disconnected(&self, disconnected: bool) {
        self.with(|s| s.faults.disconnected = disconnected);
    }

    /// Commands the mount accepted, oldest first.
    pub fn commands(&self) -> Vec<PointingCommand> {
        self.with(|s| s.commands.clone())
    }

    pub fn position(&self) -> AchievedAngle {
        self.with(|s| s.position)
    }
}
