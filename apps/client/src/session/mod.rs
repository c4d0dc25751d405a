//! Refinement sessions: the version collection, the job-queue seam, and the
//! polling that reconciles asynchronous job outcomes into version state.

pub mod controller;
pub mod naming;
pub mod poll;
pub mod state;
