//! Integration test crate for Partmix.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on the partmix crates to verify they work together.

#[cfg(test)]
mod support;

#[cfg(test)]
mod mixing;

#[cfg(test)]
mod tasks;
