//! `brook` command line: inspect, verify and poke at a file-backed brook store.

pub mod commands;
pub mod engine;
