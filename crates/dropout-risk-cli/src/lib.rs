//! Command line front end for the dropout risk pipeline.
//!
//! Argument parsing lives in the binaries; this library holds the pieces they
//! share: configuration loading with flag overrides, the training run and the
//! single-record prediction.
pub mod predict;
pub mod train;
pub mod util;
