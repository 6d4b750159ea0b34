//! Reserved exit codes.
//!
//! 9xxx codes are outside the 0..=255 range a process can report on Unix, so
//! they never collide with a program's own exit status.

/// No documentation block within the first 8 KiB.
pub const MISSING_DOC: i32 = 9001;
/// Documentation block is not valid JSON, lacks a required field or names
/// unsafe paths.
pub const INVALID_DOC: i32 = 9002;
/// `entry` is not `stdio-json`.
pub const UNSUPPORTED_ENTRY: i32 = 9003;
pub const UNKNOWN_LANGUAGE: i32 = 9004;
/// Run exceeded `timeout_ms` while enforcement was on.
pub const TIMED_OUT: i32 = 9005;
pub const IO_FAILURE: i32 = 9006;
pub const SPAWN_FAILURE: i32 = 9007;

pub const CPP_BUILD_BAND: i32 = 100;
pub const C_BUILD_BAND: i32 = 200;
pub const JAVA_BUILD_BAND: i32 = 300;
pub const PYTHON_SETUP_BAND: i32 = 400;

/// Fold a tool's return code into its build band. `rc` is clamped to 1..=99
/// so bands never overlap.
pub fn banded(band: i32, rc: i32) -> i32 {
    band + rc.clamp(1, 99)
}

/// The band base an exit code falls into, if any.
pub fn band_of(code: i32) -> Option<i32> {
    [CPP_BUILD_BAND, C_BUILD_BAND, JAVA_BUILD_BAND, PYTHON_SETUP_BAND]
        .into_iter()
        .find(|band| (band + 1..=band + 99).contains(&code))
}
