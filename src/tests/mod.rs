//! End-to-end tests of the gate.
//!
//! `cases_scaling_test` drives gates against the in-memory orchestrator on a
//! paused clock; the other cases run the whole application over HTTP.


pub mod support;
