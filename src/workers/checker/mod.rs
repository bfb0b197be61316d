// Package checker provides the idle checker worker.

pub mod checker;


pub use checker::{check_period, IdleChecker, MIN_CHECK_PERIOD};
