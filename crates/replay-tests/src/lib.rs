//! Integration test crate for Replay Workbench.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on every replay crate to verify they work together.

#[cfg(test)]
mod buffer;

#[cfg(test)]
mod clips;

#[cfg(test)]
mod filter;
