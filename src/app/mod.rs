//! Process-level plumbing shared by every mode of the binary.

pub mod logging;
