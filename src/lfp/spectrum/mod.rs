//! Power spectral density of a sampled LFP.

use ndarray::{Array1, s};
use num_complex::Complex;
use rustfft::{FftPlanner, FftDirection};
use crate::error::SpectrumError;


/// Retrieves the power density of the given time series based on the sampling interval `dt` (ms),
/// the mean is removed before the transform, returns tuple of frequencies (Hz) and associated
/// power respectively
pub fn power_density(x: &[f64], dt: f64) -> Result<(Array1<f64>, Array1<f64>), SpectrumError> {
    if x.is_empty() {
        return Err(SpectrumError::EmptyTimeSeries);
    }

    let n = x.len();
    let x_mean = x.iter().sum::<f64>() / n as f64;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft(n, FftDirection::Forward);

    let mut x_fft: Vec<Complex<f64>> = x.iter()
        .map(|x_i| Complex::new(x_i - x_mean, 0.0))
        .collect();
    fft.process(&mut x_fft);

    let x_fft_array: Array1<Complex<f64>> = Array1::from(x_fft);

    // dt is in ms, scale to seconds so the power is per Hz
    let dt_s = dt / 1000.;
    let sxx: Array1<f64> = x_fft_array.mapv(|val| {
        (2.0 * dt_s.powi(2) / (n as f64 * dt_s) * (val * val.conj())).re
    });

    let half = n / 2;
    let sxx_positive = sxx.slice(s![0..half]).to_owned();

    let df = 1.0 / (n as f64 * dt_s);
    let faxis: Array1<f64> = Array1::from_iter((0..half).map(|i| i as f64 * df));

    Ok((faxis, sxx_positive))
}

/// Frequency with the most power, `None` if the spectrum is empty
pub fn peak_frequency(frequencies: &Array1<f64>, power: &Array1<f64>) -> Option<f64> {
    power.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .and_then(|(i, _)| frequencies.get(i).copied())
}

/// Total power within `[low, high)` (Hz)
pub fn band_power(frequencies: &Array1<f64>, power: &Array1<f64>, low: f64, high: f64) -> f64 {
    frequencies.iter()
        .zip(power.iter())
        .filter(|(f, _)| **f >= low && **f < high)
        .map(|(_, p)| p)
        .sum()
}

/// Mean squared error between two power spectra over the same frequency range
pub fn power_density_mse(sxx1: &Array1<f64>, sxx2: &Array1<f64>) -> Result<f64, SpectrumError> {
    if sxx1.len() != sxx2.len() {
        return Err(SpectrumError::TimeSeriesAreNotSameLength);
    }
    if sxx1.is_empty() {
        return Err(SpectrumError::EmptyTimeSeries);
    }

    Ok((sxx1 - sxx2).mapv(|x| x.powi(2)).sum() / sxx1.len() as f64)
}
