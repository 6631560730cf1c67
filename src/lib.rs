//! # LFP Opsin
//!
//! `lfp_opsin` covers two pieces of tooling used around compartmental and opsin
//! simulations: an approximation of the local field potential (LFP) recorded by a
//! point electrode, and a registry of light stimulation protocols that generate
//! time-varying light intensities to drive opsin models and analyze the resulting
//! photocurrents.
//!
//! ### Local Field Potential
//!
//! Cells are provided by a simulation host implementing [`lfp::CellHost`]. Cells
//! close to the electrode are always used, distant cells are sampled and their
//! contribution is scaled up by the inverse of the sampled fraction. Each segment
//! contributes its membrane current weighted by a line source coefficient.
//!
//! ```rust
//! use std::collections::{BTreeMap, BTreeSet};
//! use lfp_opsin::error::LfpOpsinError;
//! use lfp_opsin::lfp::{LFP, LFPParameters, Point3, RecordedCell, RecordedNetwork, Section};
//!
//! fn main() -> Result<(), LfpOpsinError> {
//!     let soma = Section::cylinder(
//!         vec![Point3::new(10., 0., 0.), Point3::new(10., 0., 20.)], 20., 2,
//!     );
//!     let mut cell = RecordedCell::new(vec![soma]);
//!     cell.push_frame(vec![vec![0.5, 0.5]]);
//!     cell.push_frame(vec![vec![-0.5, -0.5]]);
//!
//!     let mut network = RecordedNetwork { dt: 0.5, ..RecordedNetwork::default() };
//!     network.cells.insert(0, cell);
//!
//!     let populations = BTreeMap::from([(String::from("pyr"), BTreeSet::from([0]))]);
//!     let mut lfp = LFP::new(
//!         "electrode", &mut network, &populations, Point3::default(), LFPParameters::default(),
//!     )?;
//!
//!     lfp.run(&mut network, 0.5, |network, t| {
//!         network.advance_to(t);
//!         Ok(())
//!     })?;
//!
//!     assert_eq!(lfp.times(), &[0., 0.5]);
//!     assert!(lfp.values()[0] > 0.);
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Stimulation Protocols
//!
//! Protocols are selected by name, unset parameters fall back to each protocol's
//! defaults. The generated light intensity can be sampled at any resolution.
//!
//! ```rust
//! use lfp_opsin::error::LfpOpsinError;
//! use lfp_opsin::protocol::{select_protocol, Cycles, ProtocolParameters, ScalarOrList};
//!
//! fn main() -> Result<(), LfpOpsinError> {
//!     let params = ProtocolParameters {
//!         phis: Some(ScalarOrList::List(vec![1e16, 1e17])),
//!         vs: Some(ScalarOrList::List(vec![-70.])),
//!         dt_delay: Some(10.),
//!         cycles: Some(Cycles::Pulses(vec![vec![20., 10.], vec![20., 10.]])),
//!         ..ProtocolParameters::default()
//!     };
//!
//!     let protocol = select_protocol("step", Some(params))?;
//!     let phi = protocol.stim_array(0, 0, 1.)?;
//!
//!     // delay, then two on and off periods
//!     assert_eq!(phi.len(), 71);
//!     assert_eq!(phi[20], 1e17);
//!     assert_eq!(phi[35], 0.);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod fitting;
pub mod ga;
pub mod lfp;
pub mod protocol;
