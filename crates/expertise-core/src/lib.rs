//! Regression-test oracle for numerical-simulation runs.
//!
//! Experts turn run artifacts into [`summary::Summary`] documents and compare
//! them against a reference run; [`task::TaskRunner`] aggregates their
//! verdicts into one [`task::TaskSummary`].

pub mod domain;
pub mod experts;
pub mod format;
pub mod numerics;
pub mod pairing;
pub mod parsing;
pub mod summary;
pub mod task;
