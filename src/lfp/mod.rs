//! An approximation of the local field potential (LFP) generated by the cells of a network,
//! based on the line source method of Schomburg et al., J Neurosci 2012.
//!
//! The approximate LFP is the sum of the membrane current contributions of all compartments
//! of the cells chosen for the computation, each scaled by a coefficient derived from the
//! distance to the recording electrode and the extracellular resistivity. The time resolution
//! of the LFP may be lower than that of the simulation by setting `dt_lfp`.
//!
//! The simulator owning the cells is abstracted by [`CellHost`], cells are accessed through
//! [`LFPCell`]. [`RecordedNetwork`] is an in-memory, single rank host that replays recorded
//! membrane currents.

use std::collections::{BTreeMap, BTreeSet};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use log::{debug, info};
use crate::error::LFPError;
pub mod geometry;
use geometry::interpolate_segment_positions;
pub use geometry::{Point3, Section};
pub mod recorded;
pub use recorded::{RecordedCell, RecordedNetwork};
pub mod spectrum;


/// A compartmental cell that can contribute to the LFP
pub trait LFPCell: Send + Sync {
    /// Returns `true` if the cell is an artificial cell without membrane currents
    fn is_artificial(&self) -> bool {
        false
    }
    /// Returns `true` if the cell is a reduced order model without a morphology
    fn is_reduced(&self) -> bool {
        false
    }
    /// Position of the soma, the first 3D point of the first soma section (um)
    fn soma_position(&self) -> Option<Point3>;
    /// Every section of the cell
    fn sections(&self) -> &[Section];
    /// Instantaneous membrane current of each segment of the given section (mA/cm^2)
    fn membrane_currents(&self, section: usize) -> &[f64];
    /// Marks every section as taking part in the extracellular computation
    fn insert_extracellular(&mut self);
}

/// The simulation host that owns the cells, possibly distributed across ranks
pub trait CellHost: Sync {
    type Cell: LFPCell;
    /// Rank of this process
    fn rank(&self) -> usize {
        0
    }
    /// Whether the cell with the given gid is owned by this rank
    fn gid_exists(&self, gid: u64) -> bool;
    /// Retrieves a reference to a cell owned by this rank
    fn cell(&self, gid: u64) -> Option<&Self::Cell>;
    /// Retrieves a mutable reference to a cell owned by this rank
    fn cell_mut(&mut self, gid: u64) -> Option<&mut Self::Cell>;
    /// Sums the given value across every rank
    fn all_reduce_sum(&self, value: f64) -> f64;
}

/// Parameters of the LFP computation
#[derive(Debug, Clone, Copy)]
pub struct LFPParameters {
    /// Extracellular resistivity (ohm cm)
    pub rho: f64,
    /// Fraction of distant cells to include in the computation
    pub fdst: f64,
    /// Maximum distance from the electrode for a soma to be considered proximal (um)
    pub max_e_dist: f64,
    /// Interval between LFP samples (ms)
    pub dt_lfp: f64,
    /// Seed used to sample distant cells
    pub seed: u64,
}

impl Default for LFPParameters {
    fn default() -> Self {
        LFPParameters {
            rho: 333.,
            fdst: 0.1,
            max_e_dist: 100.,
            dt_lfp: 0.5,
            seed: 1,
        }
    }
}

impl LFPParameters {
    fn check(&self) -> Result<(), LFPError> {
        if !(self.dt_lfp > 0.) {
            return Err(LFPError::InvalidSamplingInterval);
        }
        if !(self.fdst > 0. && self.fdst <= 1.) {
            return Err(LFPError::InvalidDistalFraction);
        }
        if !(self.rho > 0.) {
            return Err(LFPError::InvalidResistivity);
        }

        Ok(())
    }
}

/// How a cell takes part in the LFP computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LFPCellType {
    /// Cell is not used
    Excluded,
    /// Soma is within the maximum distance of the electrode
    Proximal,
    /// Soma is far from the electrode but the cell was sampled, its contribution is scaled up
    Distal,
}

/// Decides how a cell takes part in the computation given the distance from its soma to
/// the electrode (um) and a uniform sample from `[0, 1)`
pub fn classify_cell(soma_distance: f64, sample: f64, max_e_dist: f64, fdst: f64) -> LFPCellType {
    if soma_distance < max_e_dist {
        LFPCellType::Proximal
    } else if sample < fdst {
        LFPCellType::Distal
    } else {
        LFPCellType::Excluded
    }
}

/// Calculates the line source coefficient of a segment given its length `l` (um), the
/// distance from the electrode to the segment `rd` (um), the longitudinal distance `ld` (um)
/// from the start of its section, the membrane area of the segment (um^2) and the
/// extracellular resistivity `rho` (ohm cm)
///
/// With `sd = l - ld` the coefficient is
/// `1e-4 * area * rho / (4 pi l) * |ln((sqrt(ld^2 + rd^2) - ld) / (sqrt(sd^2 + rd^2) - sd))|`,
/// the ratio is evaluated as `(sqrt(sd^2 + rd^2) + sd) / (sqrt(ld^2 + rd^2) + ld)`, which is equal
/// for `rd != 0` and reduces to `sd / ld` when `rd == 0`. Degenerate geometry results in `0`.
pub fn line_source_coefficient(l: f64, rd: f64, ld: f64, area: f64, rho: f64) -> f64 {
    if !(l > 0.) {
        return 0.;
    }

    let sd = l - ld;
    let ratio = ((sd * sd + rd * rd).sqrt() + sd) / ((ld * ld + rd * rd).sqrt() + ld);
    let k = 0.0001 * area * (rho / (4. * std::f64::consts::PI * l)) * ratio.ln().abs();

    if k.is_finite() {
        k
    } else {
        0.
    }
}

/// Scales the coefficient of a distal cell to account for the fraction of distant
/// cells that were sampled
pub fn distal_coefficient(k: f64, fdst: f64) -> f64 {
    (1. / fdst) * k
}

/// Calculates the coefficients of every segment of a cell, sections that do not take part
/// in the extracellular computation keep a coefficient of `0`
pub fn compute_cell_coefficients<C: LFPCell>(
    gid: u64,
    cell: &C,
    electrode: &Point3,
    params: &LFPParameters,
    cell_type: LFPCellType,
) -> Result<Vec<f64>, LFPError> {
    let total_segments: usize = cell.sections().iter().map(|section| section.nseg).sum();
    let mut coefficients = vec![0.; total_segments];

    let mut offset = 0;
    for section in cell.sections() {
        if !section.extracellular {
            offset += section.nseg;
            continue;
        }
        if section.areas.len() != section.nseg {
            return Err(LFPError::SegmentCountMismatch(gid));
        }

        let nodes = interpolate_segment_positions(&section.points, &section.arc_lengths, section.nseg)
            .ok_or(LFPError::SectionHasNoPoints(gid))?;
        let start = nodes[0];
        let l = section.segment_length();

        // segment j is measured from node j, so the first segment starts at the section start
        for j in 0..section.nseg {
            let node = nodes[j];
            let rd = electrode.distance(&node);
            let ld = node.distance(&start);

            let mut k = line_source_coefficient(l, rd, ld, section.areas[j], params.rho);
            if cell_type == LFPCellType::Distal {
                k = distal_coefficient(k, params.fdst);
            }

            coefficients[offset + j] = k;
        }

        offset += section.nseg;
    }

    Ok(coefficients)
}

fn cell_contribution<C: LFPCell>(gid: u64, cell: &C, coefficients: &[f64]) -> Result<f64, LFPError> {
    let mut contribution = 0.;
    let mut offset = 0;

    for (n, section) in cell.sections().iter().enumerate() {
        if section.extracellular {
            let currents = cell.membrane_currents(n);
            if currents.len() != section.nseg || offset + section.nseg > coefficients.len() {
                return Err(LFPError::SegmentCountMismatch(gid));
            }

            contribution += currents.iter()
                .zip(&coefficients[offset..offset + section.nseg])
                .map(|(current, k)| current * k)
                .sum::<f64>();
        }

        offset += section.nseg;
    }

    Ok(contribution)
}

/// Cells of a population chosen for the LFP computation alongside their coefficients
#[derive(Debug, Clone, Default)]
pub struct PopulationCoefficients {
    /// Gids of the chosen cells
    pub ids: Vec<u64>,
    /// How each chosen cell takes part in the computation
    pub types: Vec<LFPCellType>,
    /// Coefficients of every segment of each chosen cell
    pub coefficients: Vec<Vec<f64>>,
}

/// Approximate LFP recorded from a point electrode
#[derive(Debug, Clone)]
pub struct LFP {
    /// Name of the recording
    pub label: String,
    /// Position of the electrode (um)
    pub position: Point3,
    /// Parameters of the computation
    pub params: LFPParameters,
    populations: BTreeMap<String, PopulationCoefficients>,
    t: Vec<f64>,
    mean_lfp: Vec<f64>,
}

impl LFP {
    /// Chooses the cells of each population that take part in the LFP computation and
    /// calculates the coefficients of their segments
    ///
    /// Populations are processed in name order and each is given a random number generator
    /// seeded with `seed + population index`, one sample is drawn for every gid in ascending
    /// order even if the cell is not owned by this rank. Artificial and reduced cells are skipped.
    pub fn new<H: CellHost>(
        label: &str,
        host: &mut H,
        pop_gids: &BTreeMap<String, BTreeSet<u64>>,
        position: Point3,
        params: LFPParameters,
    ) -> Result<Self, LFPError> {
        params.check()?;

        let mut lfp = LFP {
            label: String::from(label),
            position,
            params,
            populations: BTreeMap::new(),
            t: vec![],
            mean_lfp: vec![],
        };

        lfp.setup_lfp(host, pop_gids)?;
        lfp.setup_lfp_coeffs(host)?;

        Ok(lfp)
    }

    fn setup_lfp<H: CellHost>(
        &mut self,
        host: &mut H,
        pop_gids: &BTreeMap<String, BTreeSet<u64>>,
    ) -> Result<(), LFPError> {
        for (ipop, (pop_name, gids)) in pop_gids.iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(self.params.seed + ipop as u64);
            let mut population = PopulationCoefficients::default();

            for &gid in gids {
                let sample: f64 = rng.gen();

                if !host.gid_exists(gid) {
                    continue;
                }

                let cell = host.cell(gid).ok_or(LFPError::CellNotFound(gid))?;
                if cell.is_artificial() || cell.is_reduced() {
                    debug!("{}: skipping gid {} of {}, cell is artificial or reduced", self.label, gid, pop_name);
                    continue;
                }

                let soma = cell.soma_position().ok_or(LFPError::SomaNotFound(gid))?;
                let cell_type = classify_cell(
                    soma.distance(&self.position), sample, self.params.max_e_dist, self.params.fdst,
                );

                if cell_type == LFPCellType::Excluded {
                    continue;
                }

                let cell = host.cell_mut(gid).ok_or(LFPError::CellNotFound(gid))?;
                cell.insert_extracellular();
                let total_segments: usize = cell.sections().iter().map(|section| section.nseg).sum();

                population.ids.push(gid);
                population.types.push(cell_type);
                population.coefficients.push(vec![0.; total_segments]);
            }

            info!(
                "{}: {} cells of {} chosen for the LFP computation ({} distal)",
                self.label,
                population.ids.len(),
                pop_name,
                population.types.iter().filter(|i| **i == LFPCellType::Distal).count(),
            );

            self.populations.insert(pop_name.clone(), population);
        }

        Ok(())
    }

    fn setup_lfp_coeffs<H: CellHost>(&mut self, host: &H) -> Result<(), LFPError> {
        for population in self.populations.values_mut() {
            for (i, &gid) in population.ids.iter().enumerate() {
                let cell = host.cell(gid).ok_or(LFPError::CellNotFound(gid))?;
                population.coefficients[i] = compute_cell_coefficients(
                    gid, cell, &self.position, &self.params, population.types[i],
                )?;
            }
        }

        Ok(())
    }

    /// Chosen cells and coefficients of each population
    pub fn populations(&self) -> &BTreeMap<String, PopulationCoefficients> {
        &self.populations
    }

    /// Calculates the LFP of the chosen cells at the current state of the host,
    /// summed across every rank
    pub fn pos_lfp<H: CellHost>(&self, host: &H) -> Result<f64, LFPError> {
        let cells: Vec<(u64, &Vec<f64>)> = self.populations.values()
            .flat_map(|population| population.ids.iter().copied().zip(population.coefficients.iter()))
            .collect();

        let contributions = cells.par_iter()
            .map(|(gid, coefficients)| {
                let cell = host.cell(*gid).ok_or(LFPError::CellNotFound(*gid))?;
                cell_contribution(*gid, cell, coefficients)
            })
            .collect::<Result<Vec<f64>, LFPError>>()?;

        Ok(host.all_reduce_sum(contributions.iter().sum()))
    }

    /// Samples the LFP at time `t` (ms), the sample is kept on rank 0,
    /// returns the time of the next sample
    pub fn sample_lfp<H: CellHost>(&mut self, host: &H, t: f64) -> Result<f64, LFPError> {
        let mean_lfp = self.pos_lfp(host)?;

        if host.rank() == 0 {
            self.mean_lfp.push(mean_lfp);
            self.t.push(t);
        }

        Ok(t + self.params.dt_lfp)
    }

    /// Samples the LFP every `dt_lfp` from `0` up to and including `t_stop` (ms), `advance`
    /// is called before each sample to integrate the host up to the sampling time
    pub fn run<H, F>(&mut self, host: &mut H, t_stop: f64, mut advance: F) -> Result<(), LFPError>
    where
        H: CellHost,
        F: FnMut(&mut H, f64) -> Result<(), LFPError>,
    {
        let tolerance = self.params.dt_lfp * 1e-9;
        let mut step: usize = 0;

        loop {
            let t = step as f64 * self.params.dt_lfp;
            if t > t_stop + tolerance {
                break;
            }

            advance(host, t)?;
            self.sample_lfp(host, t)?;

            step += 1;
        }

        Ok(())
    }

    /// Times at which the LFP was sampled (ms)
    pub fn times(&self) -> &[f64] {
        &self.t
    }

    /// Sampled LFP values
    pub fn values(&self) -> &[f64] {
        &self.mean_lfp
    }
}
