//! A single rank host that replays recorded membrane currents, useful to compute the
//! LFP of a simulation after the fact or to test the estimator.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::error::LFPError;
use super::{CellHost, LFPCell, Point3, Section};


/// A cell with its morphology and recorded membrane currents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedCell {
    /// Whether the cell is artificial
    #[serde(default)]
    pub artificial: bool,
    /// Whether the cell is a reduced order model
    #[serde(default)]
    pub reduced: bool,
    /// Indices of the soma sections within `sections`
    #[serde(default)]
    pub soma_sections: Vec<usize>,
    /// Sections of the cell
    pub sections: Vec<Section>,
    /// Membrane currents indexed by section, then frame, then segment (mA/cm^2)
    #[serde(default)]
    pub currents: Vec<Vec<Vec<f64>>>,
    #[serde(skip)]
    frame: usize,
}

impl RecordedCell {
    /// Creates a cell where the first section is the soma
    pub fn new(sections: Vec<Section>) -> Self {
        RecordedCell {
            soma_sections: if sections.is_empty() { vec![] } else { vec![0] },
            sections,
            ..RecordedCell::default()
        }
    }

    /// Adds a frame of membrane currents for every section
    pub fn push_frame(&mut self, frame: Vec<Vec<f64>>) {
        if self.currents.len() < frame.len() {
            self.currents.resize(frame.len(), vec![]);
        }
        for (section, currents) in frame.into_iter().enumerate() {
            self.currents[section].push(currents);
        }
    }

    /// Number of recorded frames
    pub fn num_frames(&self) -> usize {
        self.currents.iter().map(|frames| frames.len()).max().unwrap_or(0)
    }

    /// Selects the frame returned by [`LFPCell::membrane_currents`], clamped to the
    /// last recorded frame
    pub fn set_frame(&mut self, frame: usize) {
        self.frame = frame.min(self.num_frames().saturating_sub(1));
    }
}

impl LFPCell for RecordedCell {
    fn is_artificial(&self) -> bool {
        self.artificial
    }

    fn is_reduced(&self) -> bool {
        self.reduced
    }

    fn soma_position(&self) -> Option<Point3> {
        self.soma_sections.first()
            .and_then(|i| self.sections.get(*i))
            .and_then(|section| section.start())
    }

    fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn membrane_currents(&self, section: usize) -> &[f64] {
        self.currents.get(section)
            .and_then(|frames| frames.get(self.frame))
            .map(|currents| currents.as_slice())
            .unwrap_or(&[])
    }

    fn insert_extracellular(&mut self) {
        for section in self.sections.iter_mut() {
            section.extracellular = true;
        }
    }
}

/// Cells of a network alongside the timestep their currents were recorded at
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedNetwork {
    /// Time between recorded frames (ms)
    pub dt: f64,
    /// Cells indexed by gid
    pub cells: BTreeMap<u64, RecordedCell>,
}

impl Default for RecordedNetwork {
    fn default() -> Self {
        RecordedNetwork { dt: 0.1, cells: BTreeMap::new() }
    }
}

impl RecordedNetwork {
    /// Reads a network from its JSON representation
    pub fn from_json(contents: &str) -> Result<Self, LFPError> {
        serde_json::from_str(contents)
            .map_err(|e| LFPError::NetworkParseFailure(e.to_string()))
    }

    /// Writes the network to JSON
    pub fn to_json(&self) -> Result<String, LFPError> {
        serde_json::to_string(self)
            .map_err(|e| LFPError::NetworkParseFailure(e.to_string()))
    }

    /// Moves every cell to the frame recorded closest to time `t` (ms)
    pub fn advance_to(&mut self, t: f64) {
        let frame = if self.dt > 0. { (t / self.dt).round().max(0.) as usize } else { 0 };
        for cell in self.cells.values_mut() {
            cell.set_frame(frame);
        }
    }

    /// Duration covered by the recording (ms)
    pub fn duration(&self) -> f64 {
        let frames = self.cells.values().map(|cell| cell.num_frames()).max().unwrap_or(0);
        frames.saturating_sub(1) as f64 * self.dt
    }
}

impl CellHost for RecordedNetwork {
    type Cell = RecordedCell;

    fn gid_exists(&self, gid: u64) -> bool {
        self.cells.contains_key(&gid)
    }

    fn cell(&self, gid: u64) -> Option<&RecordedCell> {
        self.cells.get(&gid)
    }

    fn cell_mut(&mut self, gid: u64) -> Option<&mut RecordedCell> {
        self.cells.get_mut(&gid)
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        value
    }
}
