// Assignment Consistency Core
//
// This crate is the consistency engine of the Certflow training
// administration platform. It classifies every AP user and team against the
// assignment invariants, scores system health, and repairs the fixable
// drift with idempotent, concurrency-safe writes. The platform's UI and API
// layers call it in-process through the engine surface in
// domains::reconciliation.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
