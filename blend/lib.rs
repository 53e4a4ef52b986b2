#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod helpers;
pub mod io;
pub mod matrix;
pub mod moments;
pub mod progress;
pub mod reconstruct;
pub mod solve;
pub mod solver;
