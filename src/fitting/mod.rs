//! Fitting of opsin kinetics to features of recorded photocurrents.

use log::info;
use crate::error::FittingError;
use crate::ga::{decode, genetic_algo, GeneticAlgorithmParameters};


/// Range searched for the dark recovery rate (/ms)
pub const GR0_BOUNDS: (f64, f64) = (1e-4, 0.1);

/// Result of fitting the dark recovery of the peak current
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryFit {
    /// Dark recovery rate (/ms)
    pub gr0: f64,
    /// Dark recovery time constant, `1 / gr0` (ms)
    pub tau_r0: f64,
    /// Sum of squared errors of the fit
    pub score: f64,
}

/// Peak current recovered after an interval `t` (ms) in the dark, starting from the
/// steady state current `iss0` and relaxing to the fully recovered peak `ipeak0`
pub fn recovery_curve(t: f64, ipeak0: f64, iss0: f64, gr0: f64) -> f64 {
    ipeak0 - (ipeak0 - iss0) * (-gr0 * t).exp()
}

fn sum_of_squares(t_peaks: &[f64], i_peaks: &[f64], ipeak0: f64, iss0: f64, gr0: f64) -> f64 {
    t_peaks.iter()
        .zip(i_peaks.iter())
        .map(|(t, i)| (recovery_curve(*t, ipeak0, iss0, gr0) - i).powi(2))
        .sum()
}

/// Fits the dark recovery rate to the peaks of the second pulse of each paired pulse
/// trial, `t_peaks` are measured from the end of the first pulse (ms), `settings` are
/// used for everything but the bounds of the search
pub fn fit_recovery(
    t_peaks: &[f64],
    i_peaks: &[f64],
    ipeak0: f64,
    iss0: f64,
    settings: &GeneticAlgorithmParameters,
) -> Result<RecoveryFit, FittingError> {
    if t_peaks.is_empty() || t_peaks.len() != i_peaks.len() {
        return Err(FittingError::InsufficientData);
    }

    let params = GeneticAlgorithmParameters {
        bounds: vec![GR0_BOUNDS],
        ..settings.clone()
    };

    // currents are in nA so the errors are scaled to keep the scores comparable
    let scale = ipeak0.abs().max(iss0.abs()).max(f64::EPSILON);

    let (best, score, _) = genetic_algo(
        |x| {
            let error = sum_of_squares(t_peaks, i_peaks, ipeak0, iss0, x[0]) / scale.powi(2);
            if error.is_finite() {
                Ok(error)
            } else {
                Err(FittingError::ObjectiveFunctionFailure(format!("non finite error at Gr0 = {}", x[0])))
            }
        },
        &params,
    )?;

    let gr0 = decode(&best, &params.bounds, params.n_bits)?[0];
    let tau_r0 = 1. / gr0;

    info!("tau_r0 = {} ==> G_r0 = {}", tau_r0, gr0);

    Ok(RecoveryFit { gr0, tau_r0, score: score * scale.powi(2) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_curve_limits() {
        assert_eq!(recovery_curve(0., -10., -3., 0.01), -3.);
        assert!((recovery_curve(1e6, -10., -3., 0.01) + 10.).abs() < 1e-9);
    }

    #[test]
    fn test_fit_recovery_rate() {
        let gr0 = 0.004;
        let t_peaks = vec![50., 100., 200., 400., 600., 800., 1000.];
        let i_peaks: Vec<f64> = t_peaks.iter()
            .map(|t| recovery_curve(*t, -10., -3., gr0))
            .collect();

        let fit = fit_recovery(&t_peaks, &i_peaks, -10., -3., &GeneticAlgorithmParameters::default())
            .unwrap();

        assert!((fit.gr0 - gr0).abs() / gr0 < 0.1);
        assert!((fit.tau_r0 - 1. / fit.gr0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_recovery_requires_data() {
        assert!(matches!(
            fit_recovery(&[], &[], -10., -3., &GeneticAlgorithmParameters::default()),
            Err(FittingError::InsufficientData)
        ));
    }
}
