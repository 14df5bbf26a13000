//! Scenario tests of the threads project.
//!
//! Every case is a plain function run as the first thread of a freshly booted
//! machine; a case passes when that thread exits with code 0.
pub mod alarm;
pub mod condition_variable;
pub mod reaction;
pub mod rendezvous;
