//! The stages of a hair swap, from landmarks to the final composite.

pub mod alpha_matting;
pub(crate) mod box_filter;
pub mod color_statistics;
pub mod compositing;
pub mod energy;
pub mod face_model;
pub mod foreground_estimation;
pub mod guided_filter;
pub mod hair_segmenter;
pub mod landmarks;
pub mod placement_search;
pub mod seamless_clone;
pub mod skin_synthesizer;
pub mod texture_synthesis;
