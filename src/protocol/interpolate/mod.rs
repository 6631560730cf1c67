//! Interpolating functions used as time-continuous light intensities.
//!
//! Every spline evaluates to `0` outside of its knots so that pulses can be
//! concatenated without leaking into each other.

use std::{fmt::{Debug, Formatter}, sync::Arc};


/// Piecewise linear interpolation through a set of knots
#[derive(Debug, Clone)]
pub struct LinearSpline {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl LinearSpline {
    /// Creates a spline through `(x, y)` where `x` is non-decreasing, returns `None`
    /// if there are no knots or the lengths differ
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Option<Self> {
        if x.is_empty() || x.len() != y.len() {
            return None;
        }

        Some(LinearSpline { x, y })
    }

    pub fn knots(&self) -> (&[f64], &[f64]) {
        (&self.x, &self.y)
    }

    pub fn eval(&self, t: f64) -> f64 {
        let last = self.x.len() - 1;
        if t < self.x[0] || t > self.x[last] || t.is_nan() {
            return 0.;
        }
        if last == 0 {
            return self.y[0];
        }

        let upper = self.x.partition_point(|&value| value < t).clamp(1, last);
        let lower = upper - 1;
        let span = self.x[upper] - self.x[lower];
        if span <= 0. {
            return self.y[upper];
        }

        let fraction = (t - self.x[lower]) / span;

        self.y[lower] + (self.y[upper] - self.y[lower]) * fraction
    }
}

/// Natural cubic spline through a set of knots
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    second_derivatives: Vec<f64>,
}

impl CubicSpline {
    /// Creates a natural cubic spline through `(x, y)` where `x` is strictly increasing,
    /// returns `None` if there are fewer than two knots, the lengths differ or `x` is not
    /// strictly increasing
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Option<Self> {
        let n = x.len();
        if n < 2 || n != y.len() || x.windows(2).any(|pair| pair[1] <= pair[0]) {
            return None;
        }

        let mut second_derivatives = vec![0.; n];

        // tridiagonal system for the interior second derivatives (Thomas algorithm)
        if n > 2 {
            let mut c_prime = vec![0.; n];
            let mut d_prime = vec![0.; n];

            for i in 1..n - 1 {
                let h_lower = x[i] - x[i - 1];
                let h_upper = x[i + 1] - x[i];
                let a = h_lower;
                let b = 2. * (h_lower + h_upper);
                let c = h_upper;
                let d = 6. * ((y[i + 1] - y[i]) / h_upper - (y[i] - y[i - 1]) / h_lower);

                let denominator = b - a * c_prime[i - 1];
                c_prime[i] = c / denominator;
                d_prime[i] = (d - a * d_prime[i - 1]) / denominator;
            }

            for i in (1..n - 1).rev() {
                second_derivatives[i] = d_prime[i] - c_prime[i] * second_derivatives[i + 1];
            }
        }

        Some(CubicSpline { x, y, second_derivatives })
    }

    pub fn knots(&self) -> (&[f64], &[f64]) {
        (&self.x, &self.y)
    }

    pub fn eval(&self, t: f64) -> f64 {
        let last = self.x.len() - 1;
        if t < self.x[0] || t > self.x[last] || t.is_nan() {
            return 0.;
        }

        let upper = self.x.partition_point(|&value| value < t).clamp(1, last);
        let lower = upper - 1;
        let h = self.x[upper] - self.x[lower];
        let a = (self.x[upper] - t) / h;
        let b = (t - self.x[lower]) / h;

        a * self.y[lower] + b * self.y[upper]
            + ((a.powi(3) - a) * self.second_derivatives[lower] + (b.powi(3) - b) * self.second_derivatives[upper])
            * h.powi(2) / 6.
    }
}

/// Closure used as a custom light intensity
pub type CustomPhi = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Light intensity as a function of time (ph./mm^2/s)
#[derive(Clone)]
pub enum PhiFunction {
    Linear(LinearSpline),
    Cubic(CubicSpline),
    /// User defined function, responsible for its own support
    Custom(CustomPhi),
}

impl Debug for PhiFunction {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PhiFunction::Linear(spline) => write!(f, "Linear({:?})", spline),
            PhiFunction::Cubic(spline) => write!(f, "Cubic({} knots)", spline.x.len()),
            PhiFunction::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl PhiFunction {
    /// Constant intensity over `[start, end]`, zero elsewhere
    pub fn square(start: f64, end: f64, phi: f64) -> Self {
        PhiFunction::Linear(LinearSpline { x: vec![start, end], y: vec![phi, phi] })
    }

    /// Linear change in intensity from `phi_start` to `phi_end` over `[start, end]`, zero elsewhere
    pub fn ramp(start: f64, end: f64, phi_start: f64, phi_end: f64) -> Self {
        PhiFunction::Linear(LinearSpline { x: vec![start, end], y: vec![phi_start, phi_end] })
    }

    /// Wraps a closure as a light intensity
    pub fn custom<F: Fn(f64) -> f64 + Send + Sync + 'static>(f: F) -> Self {
        PhiFunction::Custom(Arc::new(f))
    }

    /// Evaluates the intensity at time `t` (ms)
    pub fn eval(&self, t: f64) -> f64 {
        match self {
            PhiFunction::Linear(spline) => spline.eval(t),
            PhiFunction::Cubic(spline) => spline.eval(t),
            PhiFunction::Custom(f) => f(t),
        }
    }

    /// Evaluates the intensity at every given time (ms)
    pub fn sample(&self, ts: &[f64]) -> Vec<f64> {
        ts.iter().map(|t| self.eval(*t)).collect()
    }
}
