//! Protocol specific analysis of simulated photocurrents.

use log::{info, warn};
use crate::error::{LfpOpsinError, ProtocolError};
use crate::fitting::{fit_recovery, RecoveryFit};
use crate::ga::GeneticAlgorithmParameters;
use super::{photocurrent::PhotoCurrent, Protocol, ProtocolKind, TrialGrid};


/// Fraction of the on phase treated as the transient of an oscillating response
pub const TRANSIENT_FRACTION: f64 = 0.1;

/// Fraction of the on phase averaged to estimate the steady state current
pub const STEADY_STATE_FRACTION: f64 = 0.1;

/// Response of a single intensity and voltage to every frequency of a `sinusoid` protocol
#[derive(Debug, Clone, PartialEq)]
pub struct Resonance {
    /// Frequencies (Hz)
    pub fs: Vec<f64>,
    /// Magnitude of the peak current of each frequency (nA)
    pub peak_amplitudes: Vec<f64>,
    /// Peak to peak current after the transient of each frequency (nA)
    pub steady_amplitudes: Vec<f64>,
    /// Frequency with the largest peak current (Hz)
    pub f_star_peak: f64,
    /// Frequency with the largest steady amplitude (Hz)
    pub f_star_steady: f64,
}

/// Peak response to one pulse of a `shortPulse` protocol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShortPulseResponse {
    /// Pulse duration (ms)
    pub pulse_duration: f64,
    /// Time from light onset to the peak (ms)
    pub lag: f64,
    /// Peak current (nA)
    pub i_peak: f64,
}

/// Peaks of the paired pulses of a `recovery` protocol
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPeaks {
    /// Time of the second peak from the end of the first pulse (ms)
    pub t_peaks: Vec<f64>,
    /// Second peak of each run (nA)
    pub i_peaks: Vec<f64>,
    /// Peak of the first pulse of the first run (nA)
    pub ipeak0: f64,
    /// Steady state current of the first pulse of the first run (nA)
    pub iss0: f64,
}

/// Result of analyzing a protocol, indexed by intensity and voltage unless stated otherwise
#[derive(Debug, Clone)]
pub enum ProtocolAnalysis {
    /// Peak conductance of every run, intensity and voltage (uS), `None` when the
    /// trial was unclamped or clamped at the reversal potential
    MaxConductance(TrialGrid<Option<f64>>),
    Resonance(Vec<Vec<Resonance>>),
    ShortPulse(Vec<Vec<Vec<ShortPulseResponse>>>),
    Recovery(Vec<Vec<(RecoveryPeaks, RecoveryFit)>>),
}

/// Peak conductance of a trial, `g = I_peak / (V - E)` scaled by `1e6` to uS
pub fn max_conductance(photocurrent: &PhotoCurrent, reversal_potential: f64) -> Option<f64> {
    let v = photocurrent.v?;
    if v == reversal_potential {
        warn!("The clamp voltage must be different to the reversal potential");
        return None;
    }

    let peak = photocurrent.peak()?;
    let g_max = peak.i_peak * 1e6 / (v - reversal_potential);

    info!("Peak conductance (g_max) = {} [uS]", g_max);

    Some(g_max)
}

fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (n, value) in values.iter().enumerate() {
        if best.map_or(true, |b| *value > values[b]) {
            best = Some(n);
        }
    }

    best
}

/// Peak and steady amplitudes of the responses to each frequency, the first
/// `TRANSIENT_FRACTION` of each on phase is excluded from the steady amplitude
pub fn resonance(fs: &[f64], trials: &[&PhotoCurrent]) -> Option<Resonance> {
    if fs.is_empty() || fs.len() != trials.len() {
        return None;
    }

    let mut peak_amplitudes = Vec::with_capacity(trials.len());
    let mut steady_amplitudes = Vec::with_capacity(trials.len());

    for trial in trials {
        peak_amplitudes.push(trial.peak().map_or(0., |peak| peak.i_peak.abs()));

        let steady = match trial.pulses.first() {
            Some(pulse) => trial.amplitude_between(pulse.start + TRANSIENT_FRACTION * pulse.duration(), pulse.end),
            None => 0.,
        };
        steady_amplitudes.push(steady);
    }

    let f_star_peak = fs[argmax(&peak_amplitudes)?];
    let f_star_steady = fs[argmax(&steady_amplitudes)?];

    info!("Resonant frequency: peak = {} Hz, steady state = {} Hz", f_star_peak, f_star_steady);

    Some(Resonance { fs: fs.to_vec(), peak_amplitudes, steady_amplitudes, f_star_peak, f_star_steady })
}

/// Lag and peak of the response to the first pulse of each run
pub fn short_pulse_responses(pds: &[f64], trials: &[&PhotoCurrent]) -> Vec<ShortPulseResponse> {
    pds.iter()
        .zip(trials.iter())
        .filter_map(|(pd, trial)| {
            let peak = trial.pulse_peaks().into_iter().next().flatten()?;

            Some(ShortPulseResponse { pulse_duration: *pd, lag: peak.lag, i_peak: peak.i_peak })
        })
        .collect()
}

/// Peaks of the second pulse of each run aligned to the end of the first pulse, the
/// first run provides the fully recovered peak and the steady state current
pub fn recovery_peaks(trials: &[&PhotoCurrent]) -> Option<RecoveryPeaks> {
    let first = trials.first()?;
    let ipeak0 = first.pulse_peaks().into_iter().next().flatten()?.i_peak;
    let iss0 = first.steady_state(0, STEADY_STATE_FRACTION)?;

    let mut t_peaks = Vec::with_capacity(trials.len());
    let mut i_peaks = Vec::with_capacity(trials.len());

    for trial in trials {
        let peaks = trial.pulse_peaks();
        let (Some(first_pulse), Some(Some(second))) = (trial.pulses.first(), peaks.get(1)) else {
            continue;
        };

        t_peaks.push(second.t_peak - first_pulse.end);
        i_peaks.push(second.i_peak);
    }

    Some(RecoveryPeaks { t_peaks, i_peaks, ipeak0, iss0 })
}

fn trial<'a>(
    trials: &'a TrialGrid<PhotoCurrent>,
    run: usize,
    phi: usize,
    v: usize,
) -> Result<&'a PhotoCurrent, ProtocolError> {
    trials.get(run)
        .ok_or(ProtocolError::RunOutOfBounds(run))?
        .get(phi)
        .ok_or(ProtocolError::IntensityOutOfBounds(phi))?
        .get(v)
        .ok_or_else(|| ProtocolError::MissingParameter(format!("trial for voltage index {}", v)))
}

fn runs_of<'a>(
    protocol: &Protocol,
    trials: &'a TrialGrid<PhotoCurrent>,
    phi: usize,
    v: usize,
) -> Result<Vec<&'a PhotoCurrent>, ProtocolError> {
    (0..protocol.n_runs).map(|run| trial(trials, run, phi, v)).collect()
}

/// Analyzes the photocurrents of every run, intensity and voltage, `None` for
/// protocols with no analysis
pub fn analyze(
    protocol: &Protocol,
    trials: &TrialGrid<PhotoCurrent>,
    reversal_potential: f64,
) -> Result<Option<ProtocolAnalysis>, LfpOpsinError> {
    let (n_phis, n_vs) = (protocol.n_phis(), protocol.n_vs());

    let analysis = match protocol.kind() {
        ProtocolKind::Delta { .. } => {
            let mut g_maxs = protocol.gen_container::<f64>();
            for (run, run_g) in g_maxs.iter_mut().enumerate() {
                for (phi, phi_g) in run_g.iter_mut().enumerate() {
                    for (v, g) in phi_g.iter_mut().enumerate() {
                        *g = max_conductance(trial(trials, run, phi, v)?, reversal_potential);
                    }
                }
            }

            Some(ProtocolAnalysis::MaxConductance(g_maxs))
        },
        ProtocolKind::Sinusoid { fs, .. } if protocol.n_runs > 1 => {
            let mut resonances = Vec::with_capacity(n_phis);
            for phi in 0..n_phis {
                let mut by_voltage = Vec::with_capacity(n_vs);
                for v in 0..n_vs {
                    let runs = runs_of(protocol, trials, phi, v)?;
                    if let Some(result) = resonance(fs, &runs) {
                        by_voltage.push(result);
                    }
                }
                resonances.push(by_voltage);
            }

            Some(ProtocolAnalysis::Resonance(resonances))
        },
        ProtocolKind::ShortPulse { pds } => {
            let mut responses = Vec::with_capacity(n_phis);
            for phi in 0..n_phis {
                let mut by_voltage = Vec::with_capacity(n_vs);
                for v in 0..n_vs {
                    by_voltage.push(short_pulse_responses(pds, &runs_of(protocol, trials, phi, v)?));
                }
                responses.push(by_voltage);
            }

            Some(ProtocolAnalysis::ShortPulse(responses))
        },
        ProtocolKind::Recovery { .. } => {
            let settings = GeneticAlgorithmParameters::default();

            let mut fits = Vec::with_capacity(n_phis);
            for phi in 0..n_phis {
                let mut by_voltage = Vec::with_capacity(n_vs);
                for v in 0..n_vs {
                    let peaks = match recovery_peaks(&runs_of(protocol, trials, phi, v)?) {
                        Some(peaks) if !peaks.t_peaks.is_empty() => peaks,
                        _ => {
                            warn!("No recovery peaks found for intensity {} and voltage {}", phi, v);
                            continue;
                        },
                    };

                    let fit = fit_recovery(&peaks.t_peaks, &peaks.i_peaks, peaks.ipeak0, peaks.iss0, &settings)?;
                    by_voltage.push((peaks, fit));
                }
                fits.push(by_voltage);
            }

            Some(ProtocolAnalysis::Recovery(fits))
        },
        _ => None,
    };

    Ok(analysis)
}
