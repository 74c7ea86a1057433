//! Buildroot Initializer (C4): computes the repo file, macros file, init
//! command list, build command, and environment for an RPM build.
//!
//! Grounded on `original_source/buildroot/{initializer,dependencies,repos,environment}.py`.

mod dependencies;
mod environment;
mod error;
mod initializer;
mod repos;

pub use error::{BuildrootError, BuildrootResult};
pub use initializer::{BuildrootInitializer, BuildrootPlan};
