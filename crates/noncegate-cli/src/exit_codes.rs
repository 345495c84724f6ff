//! Exit codes for the `noncegate` binary. Part of the CLI contract.

pub const SUCCESS: i32 = 0;
pub const INVARIANT_FAILED: i32 = 1; // a check failed or a forged token got through
pub const CONFIG_ERROR: i32 = 2; // bad arguments, construction or runtime failure
