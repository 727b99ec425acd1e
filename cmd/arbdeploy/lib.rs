pub mod cli;
pub mod commands;
pub mod initializers;
pub mod runner;
