//! Recorded photocurrents and the features extracted from them.

use crate::error::ProtocolError;
use super::Pulse;


/// Peak of the photocurrent in response to a pulse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulsePeak {
    /// Signed value of the largest magnitude current (nA)
    pub i_peak: f64,
    /// Time of the peak (ms)
    pub t_peak: f64,
    /// Time from the start of the pulse to the peak (ms)
    pub lag: f64,
}

/// Photocurrent recorded during a single trial of a protocol
#[derive(Debug, Clone)]
pub struct PhotoCurrent {
    /// Times (ms)
    pub t: Vec<f64>,
    /// Currents (nA)
    pub i: Vec<f64>,
    /// Pulses presented during the trial
    pub pulses: Vec<Pulse>,
    /// Light intensity of the trial
    pub phi: f64,
    /// Clamp voltage of the trial if clamped (mV)
    pub v: Option<f64>,
}

impl PhotoCurrent {
    pub fn new(t: Vec<f64>, i: Vec<f64>, pulses: Vec<Pulse>, phi: f64, v: Option<f64>) -> Result<Self, ProtocolError> {
        if t.is_empty() {
            return Err(ProtocolError::EmptyParameter(String::from("t")));
        }
        if t.len() != i.len() {
            return Err(ProtocolError::UnexpectedParameterType(String::from("i")));
        }

        Ok(PhotoCurrent { t, i, pulses, phi, v })
    }

    /// Index of the first sample at or after time `t`
    fn index_at(&self, t: f64) -> usize {
        self.t.partition_point(|value| *value < t)
    }

    /// Sample indices where the given pulse turns on and off
    pub fn pulse_indices(&self, pulse: usize) -> Option<(usize, usize)> {
        self.pulses.get(pulse).map(|p| {
            let on = self.index_at(p.start).min(self.t.len() - 1);
            let off = self.index_at(p.end).min(self.t.len() - 1);
            (on, off)
        })
    }

    fn peak_within(&self, start: usize, end: usize, onset: f64) -> Option<PulsePeak> {
        if start >= end || start >= self.i.len() {
            return None;
        }

        // earliest sample wins ties
        let end = end.min(self.i.len());
        let mut n = start;
        for candidate in start + 1..end {
            if self.i[candidate].abs() > self.i[n].abs() {
                n = candidate;
            }
        }

        Some(PulsePeak { i_peak: self.i[n], t_peak: self.t[n], lag: self.t[n] - onset })
    }

    /// Peak in response to each pulse, searched from the start of the pulse until the
    /// start of the next pulse (or the end of the trace)
    pub fn pulse_peaks(&self) -> Vec<Option<PulsePeak>> {
        (0..self.pulses.len())
            .map(|p| {
                let start = self.index_at(self.pulses[p].start);
                let end = self.pulses.get(p + 1)
                    .map_or(self.t.len(), |next| self.index_at(next.start));

                self.peak_within(start, end, self.pulses[p].start)
            })
            .collect()
    }

    /// Largest magnitude current over the whole trace
    pub fn peak(&self) -> Option<PulsePeak> {
        let onset = self.pulses.first().map_or(self.t[0], |pulse| pulse.start);
        self.peak_within(0, self.t.len(), onset)
    }

    /// Mean current over the final fraction of the on phase of a pulse
    pub fn steady_state(&self, pulse: usize, fraction: f64) -> Option<f64> {
        let p = self.pulses.get(pulse)?;
        let start = self.index_at(p.end - p.duration() * fraction);
        let end = self.index_at(p.end).min(self.i.len() - 1) + 1;
        if start >= end {
            return None;
        }

        let window = &self.i[start..end];
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }

    /// Peak to peak amplitude of the current within `[start, end]` (ms), `0` if
    /// there are no samples in the window
    pub fn amplitude_between(&self, start: f64, end: f64) -> f64 {
        let window: Vec<f64> = self.t.iter()
            .zip(self.i.iter())
            .filter(|(t, _)| **t >= start && **t <= end)
            .map(|(_, i)| *i)
            .collect();

        if window.is_empty() {
            return 0.;
        }

        let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = window.iter().copied().fold(f64::INFINITY, f64::min);

        (max - min).abs()
    }
}
