//! This is a uname constant, and will be update automatically on building.
/// NOTE: This will be modified by build.rs on build. ***DONT CHANGE THESE LINE MANUALLY!!!!***
pub const VERSION : &str = "Sun, 18 Oct 2026 22:53:48 +0000";
/// NOTE: This will be modified by build.rs on build. ***DONT CHANGE THESE LINE MANUALLY!!!!***
pub const COMPILE_EPOCH : usize = 1792364028;
