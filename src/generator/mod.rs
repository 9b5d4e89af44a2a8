//! Entity metadata generation from a live schema.

pub mod analyser;
pub mod datatypes;
pub mod view;

pub use analyser::{Analyser, AnalysisFailure, AnalysisReport};
pub use view::{DecomposedView, ViewDecomposer};
