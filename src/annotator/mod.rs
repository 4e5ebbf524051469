//! Composition of dataset layers into date-addressed annotators.

mod composite;
mod directory;

pub use composite::CompositeAnnotator;
pub use directory::{AnnotatorDirectory, Layers};
