//! Attributes for writing grader test cases.
//!
//! The attributes expand to code that refers to the `tickos` crate, which the
//! grader must depend on.
extern crate grading_derive;

pub use grading_derive::*;
