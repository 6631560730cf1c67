//! Stimulation protocols to run on opsin models.
//!
//! - Neuro-engineering stimuli: `step`, `sinusoid`, `chirp`, `ramp`, `delta`
//! - Opsin specific protocols: `shortPulse`, `recovery`
//! - `custom` presents pulses built by an arbitrary generator
//!
//! Each protocol expands its parameters into a schedule of pulses for every run and
//! a light intensity function `phi(t)` for every run, intensity and pulse. These
//! functions can be sampled at any resolution with [`Protocol::stim_array`] to drive
//! an opsin model.

use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
    sync::Arc,
};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use log::{debug, warn};
use crate::error::{LfpOpsinError, ProtocolError};
pub mod interpolate;
pub use interpolate::{CubicSpline, LinearSpline, PhiFunction};
pub mod photocurrent;
use photocurrent::PhotoCurrent;
pub mod analysis;
use analysis::ProtocolAnalysis;


/// Default wavelength of the light source (nm)
pub const DEFAULT_WAVELENGTH: f64 = 470.;

/// A single light pulse from `start` to `end` (ms)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pulse {
    pub start: f64,
    pub end: f64,
}

impl Pulse {
    pub fn new(start: f64, end: f64) -> Self {
        Pulse { start, end }
    }

    /// Duration the light is on (ms)
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Converts `[on, off]` cycles into pulse times given an initial delay (ms),
/// returns the pulses and the total duration
pub fn cycles_to_times(cycles: &[[f64; 2]], dt_delay: f64) -> (Vec<Pulse>, f64) {
    let mut lapsed = dt_delay;
    let mut pulses = Vec::with_capacity(cycles.len());

    for [on, off] in cycles {
        pulses.push(Pulse::new(lapsed, lapsed + on));
        lapsed += on + off;
    }

    (pulses, lapsed)
}

/// Light on and off durations of a protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cycles {
    /// Only the on duration, the off duration fills the rest of the total duration
    OnDuration(f64),
    /// List of `[on, off]` pairs
    Pulses(Vec<Vec<f64>>),
    /// A single `[on, off]` pair
    Pulse(Vec<f64>),
}

impl Cycles {
    fn normalize(&self, dt_total: Option<f64>, dt_delay: f64) -> Result<Vec<[f64; 2]>, ProtocolError> {
        let as_pair = |pair: &Vec<f64>| -> Result<[f64; 2], ProtocolError> {
            match pair.as_slice() {
                [on, off] => Ok([*on, *off]),
                _ => Err(ProtocolError::UnexpectedCyclesType),
            }
        };

        match self {
            Cycles::OnDuration(on) => {
                let off = dt_total.map_or(0., |total| total - on - dt_delay);
                Ok(vec![[*on, off]])
            },
            Cycles::Pulse(pair) => Ok(vec![as_pair(pair)?]),
            Cycles::Pulses(pairs) => {
                if pairs.is_empty() {
                    return Err(ProtocolError::EmptyParameter(String::from("cycles")));
                }

                pairs.iter().map(as_pair).collect()
            },
        }
    }
}

/// A parameter given either as a single value or as a list of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarOrList {
    Scalar(f64),
    List(Vec<f64>),
}

impl ScalarOrList {
    /// Values as a list, a scalar becomes a list of one
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            ScalarOrList::Scalar(value) => vec![*value],
            ScalarOrList::List(values) => values.clone(),
        }
    }

    fn strict_list(&self, name: &str) -> Result<Vec<f64>, ProtocolError> {
        match self {
            ScalarOrList::Scalar(_) => Err(ProtocolError::UnexpectedParameterType(String::from(name))),
            ScalarOrList::List(values) if values.is_empty() => Err(ProtocolError::EmptyParameter(String::from(name))),
            ScalarOrList::List(values) => Ok(values.clone()),
        }
    }

    fn broadcast(&self, name: &str, n: usize) -> Result<Vec<f64>, ProtocolError> {
        match self {
            ScalarOrList::Scalar(value) => Ok(vec![*value; n]),
            ScalarOrList::List(values) if values.len() == n => Ok(values.clone()),
            ScalarOrList::List(values) => match values.first() {
                Some(first) => Ok(vec![*first; n]),
                None => Err(ProtocolError::UnexpectedParameterType(String::from(name))),
            },
        }
    }
}

/// Generates the light intensity of a pulse given the run, the intensity and the pulse
#[derive(Clone)]
pub struct PulseGenerator(pub Arc<dyn Fn(usize, f64, Pulse) -> PhiFunction + Send + Sync>);

impl PulseGenerator {
    pub fn new<F: Fn(usize, f64, Pulse) -> PhiFunction + Send + Sync + 'static>(f: F) -> Self {
        PulseGenerator(Arc::new(f))
    }
}

impl Debug for PulseGenerator {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "PulseGenerator")
    }
}

/// Parameters of a protocol, unset values are taken from [`ProtocolParameters::defaults`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParameters {
    /// Light intensities (ph./mm^2/s)
    pub phis: Option<ScalarOrList>,
    /// Clamp voltages (mV)
    pub vs: Option<ScalarOrList>,
    /// Delay before the first pulse (ms)
    pub dt_delay: Option<f64>,
    /// Light on and off durations (ms)
    pub cycles: Option<Cycles>,
    /// Total duration (ms)
    pub dt_total: Option<f64>,
    /// Pulse duration for `delta` and `recovery` (ms)
    pub dt_on: Option<f64>,
    /// Background intensity for `sinusoid`, `chirp` and `ramp`
    pub phi0: Option<ScalarOrList>,
    /// Whether oscillations start at their maximum
    pub start_on: Option<bool>,
    /// Whether `chirp` sweeps linearly rather than exponentially
    pub linear: Option<bool>,
    /// Frequencies for `sinusoid` (Hz)
    pub fs: Option<ScalarOrList>,
    /// Start frequency for `chirp` (Hz)
    pub f0: Option<f64>,
    /// End frequency for `chirp` (Hz)
    #[serde(rename = "fT")]
    pub f_t: Option<f64>,
    /// Pulse durations for `shortPulse` (ms)
    pub pds: Option<ScalarOrList>,
    /// Inter-pulse intervals for `recovery` (ms)
    pub dt_ipis: Option<ScalarOrList>,
    /// Pulse generator for `custom`
    #[serde(skip)]
    pub phi_ft: Option<PulseGenerator>,
}

macro_rules! merge_fields {
    ($base:expr, $overrides:expr, $($field:ident),*) => {
        ProtocolParameters {
            $($field: $overrides.$field.or($base.$field),)*
        }
    };
}

impl ProtocolParameters {
    /// Default parameters of the given protocol
    pub fn defaults(name: ProtocolName) -> Self {
        let list = |values: &[f64]| Some(ScalarOrList::List(values.to_vec()));
        let pulses = |values: &[[f64; 2]]| Some(Cycles::Pulses(values.iter().map(|i| i.to_vec()).collect()));

        match name {
            ProtocolName::Step => ProtocolParameters {
                phis: list(&[1e16, 2e16, 5e16, 1e17, 2e17, 5e17, 1e18, 2e18, 5e18, 1e19, 2e19, 5e19]),
                vs: list(&[-70., -40., -10., 10., 40., 70.]),
                dt_delay: Some(25.),
                cycles: pulses(&[[150., 100.]]),
                ..ProtocolParameters::default()
            },
            ProtocolName::Delta => ProtocolParameters {
                phis: list(&[1e20]),
                vs: list(&[-70.]),
                dt_delay: Some(5.),
                dt_on: Some(1e-3),
                dt_total: Some(25.),
                ..ProtocolParameters::default()
            },
            ProtocolName::Sinusoid => ProtocolParameters {
                phis: list(&[1e12]),
                phi0: list(&[0.]),
                start_on: Some(true),
                vs: list(&[-70.]),
                fs: list(&[0.1, 0.5, 1., 5., 10., 50., 100., 500., 1000.]),
                dt_delay: Some(25.),
                cycles: pulses(&[[10000., 50.]]),
                ..ProtocolParameters::default()
            },
            ProtocolName::Chirp => ProtocolParameters {
                phis: list(&[1e12]),
                phi0: list(&[0.]),
                linear: Some(true),
                start_on: Some(false),
                vs: list(&[-70.]),
                dt_delay: Some(100.),
                cycles: pulses(&[[10000., 100.]]),
                f0: Some(0.1),
                f_t: Some(1000.),
                ..ProtocolParameters::default()
            },
            ProtocolName::Ramp => ProtocolParameters {
                phis: list(&[1e16, 1e17, 1e18]),
                phi0: Some(ScalarOrList::Scalar(0.)),
                vs: list(&[-70.]),
                dt_delay: Some(25.),
                cycles: pulses(&[[250., 25.]]),
                ..ProtocolParameters::default()
            },
            ProtocolName::Recovery => ProtocolParameters {
                phis: list(&[1e17]),
                vs: list(&[-70.]),
                dt_delay: Some(100.),
                dt_on: Some(100.),
                dt_ipis: list(&[500., 1000., 1500., 2500., 5000., 7500., 10000.]),
                dt_total: Some(12000.),
                ..ProtocolParameters::default()
            },
            ProtocolName::ShortPulse => ProtocolParameters {
                phis: list(&[1.5e15]),
                vs: list(&[-70.]),
                dt_delay: Some(25.),
                pds: list(&[1., 2., 3., 5., 8., 10., 20.]),
                dt_total: Some(100.),
                ..ProtocolParameters::default()
            },
            ProtocolName::Custom => ProtocolParameters {
                phis: list(&[1e16, 1e17]),
                vs: list(&[-70., -20., 10.]),
                dt_delay: Some(100.),
                cycles: pulses(&[[150., 50.]]),
                ..ProtocolParameters::default()
            },
        }
    }

    /// Overrides every value of `self` that is set in `overrides`
    pub fn merge(self, overrides: ProtocolParameters) -> Self {
        merge_fields!(
            self, overrides,
            phis, vs, dt_delay, cycles, dt_total, dt_on, phi0, start_on,
            linear, fs, f0, f_t, pds, dt_ipis, phi_ft
        )
    }
}

/// Names of the registered protocols in registration order
pub const PROTOCOL_NAMES: [&str; 8] = [
    "step", "delta", "sinusoid", "chirp", "ramp", "recovery", "shortPulse", "custom",
];

/// Registered protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolName {
    Step,
    Delta,
    Sinusoid,
    Chirp,
    Ramp,
    Recovery,
    ShortPulse,
    Custom,
}

impl ProtocolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolName::Step => "step",
            ProtocolName::Delta => "delta",
            ProtocolName::Sinusoid => "sinusoid",
            ProtocolName::Chirp => "chirp",
            ProtocolName::Ramp => "ramp",
            ProtocolName::Recovery => "recovery",
            ProtocolName::ShortPulse => "shortPulse",
            ProtocolName::Custom => "custom",
        }
    }

    /// Every registered protocol in registration order
    pub fn all() -> [ProtocolName; 8] {
        [
            ProtocolName::Step, ProtocolName::Delta, ProtocolName::Sinusoid, ProtocolName::Chirp,
            ProtocolName::Ramp, ProtocolName::Recovery, ProtocolName::ShortPulse, ProtocolName::Custom,
        ]
    }
}

impl FromStr for ProtocolName {
    type Err = ProtocolError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        ProtocolName::all()
            .into_iter()
            .find(|name| name.as_str() == string)
            .ok_or_else(|| ProtocolError::NotImplemented(String::from(string)))
    }
}

impl Display for ProtocolName {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Oscillating stimulus settings shared by `sinusoid` and `chirp`
#[derive(Debug, Clone)]
pub struct Oscillation {
    /// Background intensity for each run
    pub phi0: Vec<f64>,
    /// Whether the oscillation starts at its maximum
    pub start_on: bool,
    /// Sampling rate used to build the interpolating spline (Hz)
    pub sr: f64,
}

/// Protocol specific state
#[derive(Debug, Clone)]
pub enum ProtocolKind {
    Step,
    Delta {
        dt_on: f64,
    },
    Sinusoid {
        /// Frequencies in ascending order (Hz)
        fs: Vec<f64>,
        /// Angular frequencies (rad/ms)
        ws: Vec<f64>,
        oscillation: Oscillation,
    },
    Chirp {
        f0: f64,
        f_t: f64,
        linear: bool,
        oscillation: Oscillation,
    },
    Ramp {
        phi0: f64,
    },
    Recovery {
        /// Inter-pulse intervals in ascending order (ms)
        dt_ipis: Vec<f64>,
        run_cycles: Vec<Vec<[f64; 2]>>,
    },
    ShortPulse {
        /// Pulse durations in ascending order (ms)
        pds: Vec<f64>,
    },
    Custom {
        phi_ft: Option<PulseGenerator>,
    },
}

/// Light intensity functions indexed by run, intensity and pulse
pub type PulseSet = Vec<Vec<Vec<PhiFunction>>>;

/// A container indexed by run, intensity and voltage
pub type TrialGrid<T> = Vec<Vec<Vec<T>>>;

fn sorted_descending(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| b.total_cmp(a));
    values
}

fn sorted_ascending(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

fn required<T: Clone>(value: &Option<T>, name: &str) -> Result<T, ProtocolError> {
    value.clone().ok_or_else(|| ProtocolError::MissingParameter(String::from(name)))
}

fn non_empty_list(value: &Option<ScalarOrList>, name: &str) -> Result<Vec<f64>, ProtocolError> {
    let values = required(value, name)?.to_vec();
    if values.is_empty() {
        return Err(ProtocolError::EmptyParameter(String::from(name)));
    }

    Ok(values)
}

fn oscillating_pulse(pulse: Pulse, phi: f64, phi0: f64, start_on: bool, sr: f64, phase: impl Fn(f64) -> f64) -> PhiFunction {
    let dt_on = pulse.duration();
    let n = (dt_on * sr / 1000.).round().max(0.) as usize + 1;
    let t = Array1::linspace(0., dt_on, n);

    let sign = if start_on { 1. } else { -1. };
    let y: Vec<f64> = t.iter().map(|t_i| phi0 + 0.5 * phi * (1. + sign * phase(*t_i).cos())).collect();
    let x: Vec<f64> = t.iter().map(|t_i| pulse.start + t_i).collect();

    match CubicSpline::new(x, y) {
        Some(spline) => PhiFunction::Cubic(spline),
        None => PhiFunction::square(pulse.start, pulse.end, phi0 + if start_on { phi } else { 0. }),
    }
}

/// A stimulation protocol with its pulse schedule and generated light intensities
#[derive(Debug, Clone)]
pub struct Protocol {
    name: ProtocolName,
    kind: ProtocolKind,
    /// Number of runs
    pub n_runs: usize,
    /// Light intensities in descending order (ph./mm^2/s)
    pub phis: Vec<f64>,
    /// Clamp voltages in descending order (mV)
    pub vs: Vec<f64>,
    /// Delay before the first pulse (ms)
    pub dt_delay: f64,
    /// `[on, off]` durations (ms)
    pub cycles: Vec<[f64; 2]>,
    /// Pulse times of the first run (ms)
    pub pulses: Vec<Pulse>,
    /// Total duration (ms)
    pub dt_total: f64,
    /// Delay of each pulse (or run for `shortPulse` and `recovery`)
    pub dt_delays: Vec<f64>,
    /// On durations
    pub dt_ons: Vec<f64>,
    /// Off durations
    pub dt_offs: Vec<f64>,
    pub t_start: f64,
    pub t_end: f64,
    /// Label of each run
    pub run_labels: Vec<String>,
    /// Wavelength of the light source (nm)
    pub wavelength: f64,
    phi_ts: PulseSet,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Protocol {
    fn base(name: ProtocolName, kind: ProtocolKind, phis: Vec<f64>, vs: Vec<f64>, dt_delay: f64) -> Self {
        Protocol {
            name,
            kind,
            n_runs: 1,
            phis,
            vs,
            dt_delay,
            cycles: vec![],
            pulses: vec![],
            dt_total: 0.,
            dt_delays: vec![],
            dt_ons: vec![],
            dt_offs: vec![],
            t_start: 0.,
            t_end: 0.,
            run_labels: vec![],
            wavelength: DEFAULT_WAVELENGTH,
            phi_ts: vec![],
        }
    }

    /// Creates a protocol where unset parameters are filled with the protocol's defaults,
    /// then generates the light intensity of every run, intensity and pulse
    pub fn new(name: ProtocolName, params: ProtocolParameters) -> Result<Self, ProtocolError> {
        let params = ProtocolParameters::defaults(name).merge(params);

        let phis = sorted_descending(non_empty_list(&params.phis, "phis")?);
        let vs = sorted_descending(non_empty_list(&params.vs, "vs")?);
        let dt_delay = required(&params.dt_delay, "dt_delay")?;

        let mut protocol = match name {
            ProtocolName::Delta => Self::prepare_delta(phis, vs, dt_delay, &params)?,
            ProtocolName::ShortPulse => Self::prepare_short_pulse(phis, vs, dt_delay, &params)?,
            ProtocolName::Recovery => Self::prepare_recovery(phis, vs, dt_delay, &params)?,
            _ => Self::prepare_cycles(name, phis, vs, dt_delay, &params)?,
        };

        protocol.phi_ts = protocol.gen_pulse_set()?;

        debug!(
            "prepared {} protocol: {} runs, {} intensities, {} voltages",
            protocol.name, protocol.n_runs, protocol.phis.len(), protocol.vs.len(),
        );

        Ok(protocol)
    }

    fn set_schedule(&mut self, cycles: Vec<[f64; 2]>) {
        let (pulses, dt_total) = cycles_to_times(&cycles, self.dt_delay);

        self.dt_delays = pulses.iter().map(|pulse| pulse.start).collect();
        self.dt_ons = cycles.iter().map(|cycle| cycle[0]).collect();
        self.dt_offs = cycles.iter().map(|cycle| cycle[1]).collect();
        self.cycles = cycles;
        self.pulses = pulses;
        self.dt_total = dt_total;
        self.t_start = 0.;
        self.t_end = dt_total;
    }

    fn prepare_cycles(
        name: ProtocolName,
        phis: Vec<f64>,
        vs: Vec<f64>,
        dt_delay: f64,
        params: &ProtocolParameters,
    ) -> Result<Self, ProtocolError> {
        let cycles = required(&params.cycles, "cycles")?
            .normalize(params.dt_total, dt_delay)?;

        let mut protocol = Self::base(name, ProtocolKind::Step, phis, vs, dt_delay);
        protocol.set_schedule(cycles);

        let min_on = protocol.dt_ons.iter().copied().fold(f64::INFINITY, f64::min);

        protocol.kind = match name {
            ProtocolName::Sinusoid => {
                let fs = sorted_ascending(required(&params.fs, "fs")?.strict_list("fs")?);
                let ws: Vec<f64> = fs.iter().map(|f| 2. * std::f64::consts::PI * f / 1000.).collect();
                let max_f = fs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let sr = (10. * max_f).round().max(10000.);

                protocol.n_runs = ws.len();
                if 1000. / fs[0] > min_on {
                    warn!("The period of the lowest frequency is longer than the stimulation time");
                }

                let phi0 = params.phi0.clone()
                    .unwrap_or(ScalarOrList::Scalar(0.))
                    .broadcast("phi0", protocol.n_runs)?;

                protocol.run_labels = fs.iter().map(|f| format!("f={}Hz", f)).collect();

                ProtocolKind::Sinusoid {
                    fs,
                    ws,
                    oscillation: Oscillation {
                        phi0,
                        start_on: params.start_on.unwrap_or(false),
                        sr,
                    },
                }
            },
            ProtocolName::Chirp => {
                let f0 = required(&params.f0, "f0")?;
                let f_t = required(&params.f_t, "fT")?;
                let linear = params.linear.unwrap_or(true);
                if !linear && (f0 <= 0. || f_t <= 0.) {
                    return Err(ProtocolError::UnexpectedParameterType(String::from("f0")));
                }

                let sr = (10. * f0.max(f_t)).round().max(10000.);
                protocol.n_runs = 1;
                if 1000. / f0 > min_on {
                    warn!("The period of the lowest frequency is longer than the stimulation time");
                }

                let phi0 = params.phi0.clone()
                    .unwrap_or(ScalarOrList::Scalar(0.))
                    .broadcast("phi0", protocol.n_runs)?;

                ProtocolKind::Chirp {
                    f0,
                    f_t,
                    linear,
                    oscillation: Oscillation {
                        phi0,
                        start_on: params.start_on.unwrap_or(false),
                        sr,
                    },
                }
            },
            ProtocolName::Ramp => {
                let phi0 = params.phi0.clone()
                    .unwrap_or(ScalarOrList::Scalar(0.))
                    .broadcast("phi0", 1)?[0];

                ProtocolKind::Ramp { phi0 }
            },
            ProtocolName::Custom => ProtocolKind::Custom { phi_ft: params.phi_ft.clone() },
            _ => ProtocolKind::Step,
        };

        Ok(protocol)
    }

    fn prepare_delta(
        phis: Vec<f64>,
        vs: Vec<f64>,
        dt_delay: f64,
        params: &ProtocolParameters,
    ) -> Result<Self, ProtocolError> {
        let dt_total = required(&params.dt_total, "dt_total")?;
        let dt_on = required(&params.dt_on, "dt_on")?;
        if dt_total < dt_delay + dt_on {
            return Err(ProtocolError::InsufficientTotalDuration);
        }

        let mut protocol = Self::base(ProtocolName::Delta, ProtocolKind::Delta { dt_on }, phis, vs, dt_delay);
        protocol.set_schedule(vec![[dt_on, dt_total - dt_delay - dt_on]]);

        protocol.dt_ons = protocol.pulses.iter().map(|pulse| pulse.duration()).collect();
        protocol.dt_offs = protocol.pulses.iter()
            .enumerate()
            .map(|(n, pulse)| {
                protocol.pulses.get(n + 1).map_or(protocol.dt_total, |next| next.start) - pulse.end
            })
            .collect();

        Ok(protocol)
    }

    fn prepare_short_pulse(
        phis: Vec<f64>,
        vs: Vec<f64>,
        dt_delay: f64,
        params: &ProtocolParameters,
    ) -> Result<Self, ProtocolError> {
        let pds = sorted_ascending(required(&params.pds, "pds")?.strict_list("pds")?);
        let dt_total = required(&params.dt_total, "dt_total")?;
        let n_runs = pds.len();

        let mut protocol = Self::base(ProtocolName::ShortPulse, ProtocolKind::Step, phis, vs, dt_delay);
        protocol.n_runs = n_runs;
        protocol.dt_total = dt_total;
        protocol.t_end = dt_total;
        protocol.dt_delays = vec![dt_delay; n_runs];
        protocol.dt_ons = pds.clone();
        protocol.dt_offs = pds.iter().map(|pd| dt_total - dt_delay - pd).collect();
        protocol.cycles = protocol.dt_ons.iter()
            .zip(protocol.dt_offs.iter())
            .map(|(on, off)| [*on, *off])
            .collect();
        protocol.pulses = cycles_to_times(&protocol.cycles[..1], dt_delay).0;
        protocol.run_labels = pds.iter().map(|pd| format!("Pulse={}ms", pd)).collect();
        protocol.kind = ProtocolKind::ShortPulse { pds };

        Ok(protocol)
    }

    fn prepare_recovery(
        phis: Vec<f64>,
        vs: Vec<f64>,
        dt_delay: f64,
        params: &ProtocolParameters,
    ) -> Result<Self, ProtocolError> {
        let dt_ipis = sorted_ascending(required(&params.dt_ipis, "dt_ipis")?.strict_list("dt_ipis")?);
        let dt_on = required(&params.dt_on, "dt_on")?;
        let dt_total = required(&params.dt_total, "dt_total")?;
        let n_runs = dt_ipis.len();

        let mut protocol = Self::base(ProtocolName::Recovery, ProtocolKind::Step, phis, vs, dt_delay);
        protocol.n_runs = n_runs;
        protocol.dt_total = dt_total;
        protocol.t_start = 0.;
        protocol.t_end = dt_total;
        protocol.dt_delays = vec![dt_delay; n_runs];
        protocol.dt_ons = vec![dt_on; n_runs];
        protocol.dt_offs = dt_ipis.clone();
        protocol.cycles = dt_ipis.iter().map(|ipi| [dt_on, *ipi]).collect();

        let mut run_cycles: Vec<Vec<[f64; 2]>> = dt_ipis.iter()
            .map(|ipi| vec![[dt_on, *ipi], [dt_on, *ipi]])
            .collect();

        let max_ipi = dt_ipis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let ipi_min_duration = dt_delay + 2. * dt_on + max_ipi;
        if dt_total < ipi_min_duration {
            warn!("Insufficient run time for all stimulation periods");
        } else {
            for cycles in run_cycles.iter_mut() {
                cycles[1][1] = dt_total - ipi_min_duration;
            }
        }

        protocol.pulses = cycles_to_times(&run_cycles[0], dt_delay).0;
        protocol.run_labels = dt_ipis.iter().map(|ipi| format!("IPI={}ms", ipi)).collect();
        protocol.kind = ProtocolKind::Recovery { dt_ipis, run_cycles };

        Ok(protocol)
    }

    /// Name of the protocol
    pub fn name(&self) -> ProtocolName {
        self.name
    }

    /// Protocol specific state
    pub fn kind(&self) -> &ProtocolKind {
        &self.kind
    }

    /// Number of light intensities
    pub fn n_phis(&self) -> usize {
        self.phis.len()
    }

    /// Number of clamp voltages
    pub fn n_vs(&self) -> usize {
        self.vs.len()
    }

    /// Number of pulses in each run
    pub fn n_pulses(&self) -> usize {
        self.cycles_for(0).0.len()
    }

    /// Short description including the number of runs, intensities and voltages
    pub fn summary(&self) -> String {
        format!(
            "<{} Protocol object (nRuns={}, nPhis={}, nVs={})>",
            self.name, self.n_runs, self.n_phis(), self.n_vs(),
        )
    }

    fn cycles_for(&self, run: usize) -> (Vec<[f64; 2]>, f64) {
        match &self.kind {
            ProtocolKind::ShortPulse { .. } => {
                let run = run.min(self.cycles.len().saturating_sub(1));
                (self.cycles[run..run + 1].to_vec(), self.dt_delays[run])
            },
            ProtocolKind::Recovery { run_cycles, .. } => {
                let run = run.min(run_cycles.len().saturating_sub(1));
                (run_cycles[run].clone(), self.dt_delays[run])
            },
            _ => (self.cycles.clone(), self.dt_delay),
        }
    }

    /// `[on, off]` cycles and delay of the given run
    pub fn run_cycles(&self, run: usize) -> Result<(Vec<[f64; 2]>, f64), ProtocolError> {
        if run >= self.n_runs {
            return Err(ProtocolError::RunOutOfBounds(run));
        }

        Ok(self.cycles_for(run))
    }

    /// Iterates over the cycles and delay of every run
    pub fn runs(&self) -> impl Iterator<Item = (Vec<[f64; 2]>, f64)> + '_ {
        (0..self.n_runs).map(move |run| self.cycles_for(run))
    }

    /// Empty container indexed by run, intensity and voltage
    pub fn gen_container<T>(&self) -> TrialGrid<Option<T>> {
        (0..self.n_runs)
            .map(|_| (0..self.n_phis()).map(|_| (0..self.n_vs()).map(|_| None).collect()).collect())
            .collect()
    }

    /// Shortest non zero duration of the protocol (ms), for oscillating protocols
    /// this is the sampling interval of the interpolating spline
    pub fn shortest_period(&self) -> Option<f64> {
        match &self.kind {
            ProtocolKind::Sinusoid { oscillation, .. } | ProtocolKind::Chirp { oscillation, .. } => {
                Some(1000. / oscillation.sr)
            },
            _ => self.cycles.iter()
                .flatten()
                .copied()
                .filter(|duration| *duration != 0.)
                .min_by(|a, b| a.total_cmp(b)),
        }
    }

    /// Generates the light intensity of a single pulse
    pub fn gen_pulse(&self, run: usize, phi: f64, pulse: Pulse) -> PhiFunction {
        match &self.kind {
            ProtocolKind::Sinusoid { ws, oscillation, .. } => {
                let w = ws[run.min(ws.len() - 1)];
                let phi0 = oscillation.phi0[run.min(oscillation.phi0.len() - 1)];

                oscillating_pulse(pulse, phi, phi0, oscillation.start_on, oscillation.sr, |t| w * t)
            },
            ProtocolKind::Chirp { f0, f_t, linear, oscillation } => {
                let dt_on = pulse.duration();
                let (f0, f_t, linear) = (*f0, *f_t, *linear);
                let phi0 = oscillation.phi0[run.min(oscillation.phi0.len() - 1)];

                let frequency = move |t: f64| -> f64 {
                    let ft = if linear {
                        f0 + (f_t - f0) * (t / dt_on)
                    } else {
                        f0 * (f_t / f0).powf(t / dt_on)
                    };
                    // frequency per ms
                    ft / 1000.
                };

                oscillating_pulse(pulse, phi, phi0, oscillation.start_on, oscillation.sr, |t| frequency(t) * t)
            },
            ProtocolKind::Ramp { phi0 } => PhiFunction::ramp(pulse.start, pulse.end, *phi0, phi0 + phi),
            ProtocolKind::Custom { phi_ft: Some(generator) } => (generator.0)(run, phi, pulse),
            _ => PhiFunction::square(pulse.start, pulse.end, phi),
        }
    }

    /// Generates the light intensity functions of every run, intensity and pulse
    pub fn gen_pulse_set(&self) -> Result<PulseSet, ProtocolError> {
        let mut phi_ts = Vec::with_capacity(self.n_runs);

        for run in 0..self.n_runs {
            let (cycles, dt_delay) = self.run_cycles(run)?;
            let (pulses, _) = cycles_to_times(&cycles, dt_delay);

            phi_ts.push(
                self.phis.iter()
                    .map(|phi| pulses.iter().map(|pulse| self.gen_pulse(run, *phi, *pulse)).collect())
                    .collect()
            );
        }

        Ok(phi_ts)
    }

    /// Generated light intensity functions indexed by run, intensity and pulse
    pub fn phi_ts(&self) -> &PulseSet {
        &self.phi_ts
    }

    /// Light intensity and time samples of a run at a given intensity, sampled every `dt` (ms)
    /// starting from `0`, the delay is sampled as darkness and the first sample of each pulse
    /// is dropped as it repeats the last sample of the previous period, negative intensities
    /// are clamped to `0`
    pub fn stim_trace(&self, run: usize, phi_index: usize, dt: f64) -> Result<(Vec<f64>, Vec<f64>), ProtocolError> {
        if !(dt > 0.) {
            return Err(ProtocolError::InvalidTimestep);
        }

        let (cycles, dt_delay) = self.run_cycles(run)?;
        let phi_ts = self.phi_ts.get(run)
            .ok_or(ProtocolError::RunOutOfBounds(run))?
            .get(phi_index)
            .ok_or(ProtocolError::IntensityOutOfBounds(phi_index))?;

        let n_steps = |start: f64, end: f64| ((end - start) / dt + 1.).round().max(1.) as usize;

        let (mut start, mut end) = (0., dt_delay);
        let mut t: Vec<f64> = Array1::linspace(start, end, n_steps(start, end)).to_vec();
        let mut phi = vec![0.; t.len()];

        for (p, [on, off]) in cycles.iter().enumerate() {
            start = end;
            end = start + on + off;

            let t_pulse = Array1::linspace(start, end, n_steps(start, end)).to_vec();
            let phi_pulse = match phi_ts.get(p) {
                Some(phi_t) => phi_t.sample(&t_pulse),
                None => vec![0.; t_pulse.len()],
            };

            t.extend_from_slice(&t_pulse[1..]);
            phi.extend_from_slice(&phi_pulse[1..]);
        }

        for value in phi.iter_mut() {
            if *value < 0. {
                *value = 0.;
            }
        }

        Ok((t, phi))
    }

    /// Light intensity of a run at a given intensity sampled every `dt` (ms),
    /// see [`Protocol::stim_trace`]
    pub fn stim_array(&self, run: usize, phi_index: usize, dt: f64) -> Result<Vec<f64>, ProtocolError> {
        Ok(self.stim_trace(run, phi_index, dt)?.1)
    }

    /// Analyzes the photocurrents recorded for every run, intensity and voltage once the
    /// protocol has been simulated, `reversal_potential` is the reversal potential of the opsin (mV)
    pub fn finish(
        &self,
        trials: &TrialGrid<PhotoCurrent>,
        reversal_potential: f64,
    ) -> Result<Option<ProtocolAnalysis>, LfpOpsinError> {
        analysis::analyze(self, trials, reversal_potential)
    }
}

/// Selects a registered protocol by name, `None` uses the protocol's default parameters
pub fn select_protocol(name: &str, params: Option<ProtocolParameters>) -> Result<Protocol, ProtocolError> {
    let name = ProtocolName::from_str(name)?;

    Protocol::new(name, params.unwrap_or_default())
}
