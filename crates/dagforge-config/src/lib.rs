//! Job specification files and asset macro rendering for dagforge.
//!
//! This crate handles:
//! - Parsing job declarations from KDL (`job.kdl`)
//! - Rendering time-relative macros in job assets

pub mod error;
pub mod job;
pub mod macros;

pub use error::{ConfigError, ConfigResult};
pub use job::{parse_job, parse_jobs};
pub use macros::{MacroContext, MacroRenderer};
