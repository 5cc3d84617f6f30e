//! The pipeline stages.
//!
//! Each stage is a short linear orchestration: read the predecessor's
//! artifacts, call into the library crates, write this stage's artifacts.
//! Stages share no state beyond the files under `data/`.

pub mod determine_rois;
pub mod sensor_level;
pub mod simulate;
pub mod source_level;
pub mod time_decoding;
