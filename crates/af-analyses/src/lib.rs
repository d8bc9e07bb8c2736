//! # af-analyses
//!
//! Histogram specs most analyses need ([`common`]) and the reference
//! [`dilepton::Dilepton`] analysis, registered by name in [`registry`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod common;
pub mod dilepton;
pub mod registry;

pub use common::{DileptonMass, Discriminant, LeptonEta, LeptonPt, NJet};
pub use dilepton::Dilepton;
pub use registry::{ANALYSES, lookup};
