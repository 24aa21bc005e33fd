use serde::Serialize;
use utoipa::ToSchema;

use crate::predict::error::LinkError;
use crate::predict::types::LookAngle;

pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;
const SPEED_OF_LIGHT_M_S: f64 = SPEED_OF_LIGHT_KM_S * 1000.0;

/// Doppler offset in Hz. A receding satellite (positive range rate) is
/// red-shifted, so the result is negative.
pub fn doppler_shift(carrier_frequency_hz: f64, range_rate_km_s: f64) -> Result<f64, LinkError> {
    check_frequency(carrier_frequency_hz)?;
    Ok(-(carrier_frequency_hz * range_rate_km_s) / SPEED_OF_LIGHT_KM_S)
}

/// Free-space path loss in dB.
pub fn free_space_loss(frequency_hz: f64, distance_km: f64) -> Result<f64, LinkError> {
    check_frequency(frequency_hz)?;
    if !(distance_km >= 0.0) || !distance_km.is_finite() {
        return Err(LinkError::InvalidDistance(distance_km));
    }
    let wavelength_m = SPEED_OF_LIGHT_M_S / frequency_hz;
    let distance_m = distance_km * 1000.0;
    Ok(20.0 * (4.0 * std::f64::consts::PI * distance_m / wavelength_m).log10())
}

/// Frequency to tune the receiver to for a satellite transmitting at `freq_hz`.
pub fn downlink_frequency(freq_hz: f64, range_rate_km_s: f64) -> Result<f64, LinkError> {
    Ok(freq_hz + doppler_shift(freq_hz, range_rate_km_s)?)
}

fn check_frequency(frequency_hz: f64) -> Result<(), LinkError> {
    if frequency_hz > 0.0 && frequency_hz.is_finite() {
        Ok(())
    } else {
        Err(LinkError::InvalidFrequency(frequency_hz))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct LinkEstimate {
    pub carrier_hz: f64,
    pub doppler_shift_hz: f64,
    /// Where the receiver has to listen.
    pub tuned_hz: f64,
    pub path_loss_db: f64,
}

impl LinkEstimate {
    pub fn for_look(carrier_hz: f64, look: &LookAngle) -> Result<Self, LinkError> {
        Ok(Self {
            carrier_hz,
            doppler_shift_hz: doppler_shift(carrier_hz, look.range_rate_km_s)?,
            tuned_hz: downlink_frequency(carrier_hz, look.range_rate_km_s)?,
            path_loss_db: free_space_loss(carrier_hz, look.range_km)?,
        })
    }
}
