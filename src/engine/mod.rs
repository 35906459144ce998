//! Core engine: the fetch → match → evaluate → alert scan.

pub mod alerter;
pub mod scanner;
