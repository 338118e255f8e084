pub mod cli;
pub mod emit;
pub mod runner;
pub mod suite;
