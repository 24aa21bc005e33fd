use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::predict::error::{ElementError, PredictError};
use crate::predict::ground_station::ObserverLocation;
use crate::predict::propagation::Ephemeris;
use crate::predict::topocentric::{is_visible, to_look_angle};
use crate::predict::types::{LookAngle, OrbitalElements, PassEvent};

pub const DEFAULT_STEP: Duration = Duration::seconds(30);
const CROSSING_TOLERANCE: Duration = Duration::milliseconds(10);
const PEAK_TOLERANCE_SECONDS: f64 = 0.1;

/// Find all passes for a satellite within a time range.
///
/// The returned iterator is lazy; stop pulling once you have enough passes.
pub fn find_passes(
    elements: &OrbitalElements,
    observer: &ObserverLocation,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    min_elevation_deg: f64,
) -> Result<PassFinder, ElementError> {
    let ephemeris = Arc::new(Ephemeris::from_elements(elements.clone())?);
    Ok(PassFinder::new(ephemeris, *observer, from, to, min_elevation_deg))
}

/// Forward scan over `[cursor, end]` yielding one pass per `next()`.
///
/// All progress lives in `cursor`. Building a new finder from a saved
/// `cursor()` continues exactly where the old one stopped.
pub struct PassFinder {
    ephemeris: Arc<Ephemeris>,
    observer: ObserverLocation,
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    min_elevation_deg: f64,
    step: Duration,
    done: bool,
}

impl PassFinder {
    pub fn new(
        ephemeris: Arc<Ephemeris>,
        observer: ObserverLocation,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        min_elevation_deg: f64,
    ) -> Self {
        Self {
            ephemeris,
            observer,
            cursor: from,
            end: to,
            min_elevation_deg,
            step: DEFAULT_STEP,
            done: from > to,
        }
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        if step > Duration::zero() {
            self.step = step;
        }
        self
    }

    pub fn cursor(&self) -> DateTime<Utc> {
        self.cursor
    }

    fn look_at(&self, t: DateTime<Utc>) -> Result<LookAngle, PredictError> {
        let state = self.ephemeris.propagate(t)?;
        Ok(to_look_angle(&state, &self.observer, t)?)
    }

    fn elevation_at(&self, t: DateTime<Utc>) -> Result<f64, PredictError> {
        Ok(self.look_at(t)?.elevation_deg)
    }

    fn scan(&mut self) -> Result<Option<PassEvent>, PredictError> {
        let mask = self.min_elevation_deg;
        let mut t = self.cursor;
        let first = self.look_at(t)?;

        let truncated_start = is_visible(&first, mask);
        let (rise, rise_azimuth_deg, mut best) = if truncated_start {
            (t, first.azimuth_deg, (t, first.elevation_deg))
        } else {
            loop {
                if t >= self.end {
                    self.cursor = self.end;
                    return Ok(None);
                }
                let next = (t + self.step).min(self.end);
                let look = self.look_at(next)?;
                if is_visible(&look, mask) {
                    let crossing = self.bisect(t, next, true)?;
                    let azimuth = self.look_at(crossing)?.azimuth_deg;
                    t = next;
                    break (crossing, azimuth, (next, look.elevation_deg));
                }
                t = next;
            }
        };

        let (set, set_azimuth_deg, truncated_end) = loop {
            if t >= self.end {
                self.done = true;
                break (self.end, self.look_at(self.end)?.azimuth_deg, true);
            }
            let next = (t + self.step).min(self.end);
            let look = self.look_at(next)?;
            if !is_visible(&look, mask) {
                let crossing = self.bisect(t, next, false)?;
                self.cursor = next;
                break (crossing, self.look_at(crossing)?.azimuth_deg, false);
            }
            if look.elevation_deg > best.1 {
                best = (next, look.elevation_deg);
            }
            t = next;
        };

        let lo = (best.0 - self.step).max(rise);
        let hi = (best.0 + self.step).min(set);
        let (mut culmination, mut max_elevation_deg) = self.golden_section_peak(lo, hi)?;
        if best.1 > max_elevation_deg {
            (culmination, max_elevation_deg) = best;
        }

        Ok(Some(PassEvent {
            satellite: self.ephemeris.elements().norad_id,
            rise,
            culmination,
            max_elevation_deg,
            set,
            rise_azimuth_deg,
            set_azimuth_deg,
            min_elevation_deg: mask,
            truncated_start,
            truncated_end,
        }))
    }

    /// Narrows a bracketed mask crossing. Returns the first time above the
    /// mask for a rise and the last time above it for a set.
    fn bisect(
        &self,
        before: DateTime<Utc>,
        after: DateTime<Utc>,
        rising: bool,
    ) -> Result<DateTime<Utc>, PredictError> {
        let mut low = before;
        let mut high = after;

        while high - low > CROSSING_TOLERANCE {
            let mid = low + (high - low) / 2;
            let above = is_visible(&self.look_at(mid)?, self.min_elevation_deg);
            if above == rising {
                high = mid;
            } else {
                low = mid;
            }
        }

        Ok(if rising { high } else { low })
    }

    /// Golden-section search for the elevation peak inside `[a, b]`.
    fn golden_section_peak(
        &self,
        a: DateTime<Utc>,
        b: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, f64), PredictError> {
        let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
        let at = |s: f64| a + Duration::microseconds((s * 1e6).round() as i64);

        let mut lo = 0.0;
        let mut hi = seconds(b - a);
        let mut x1 = hi - inv_phi * (hi - lo);
        let mut x2 = lo + inv_phi * (hi - lo);
        let mut f1 = self.elevation_at(at(x1))?;
        let mut f2 = self.elevation_at(at(x2))?;

        while hi - lo > PEAK_TOLERANCE_SECONDS {
            if f1 < f2 {
                lo = x1;
                x1 = x2;
                f1 = f2;
                x2 = lo + inv_phi * (hi - lo);
                f2 = self.elevation_at(at(x2))?;
            } else {
                hi = x2;
                x2 = x1;
                f2 = f1;
                x1 = hi - inv_phi * (hi - lo);
                f1 = self.elevation_at(at(x1))?;
            }
        }

        let peak = at((lo + hi) / 2.0);
        Ok((peak, self.elevation_at(peak)?))
    }
}

impl Iterator for PassFinder {
    type Item = Result<PassEvent, PredictError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.scan() {
            Ok(Some(pass)) => Some(Ok(pass)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn seconds(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}
