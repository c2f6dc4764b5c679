//! Exit code constants for the taskgate CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, unreadable config or task list)
//! - 2: Verification failure (`taskgate verify` verdict was fail)
//! - 3: Graph error (invalid dependency, duplicate id, cycle)
//! - 4: Project incomplete (some tasks failed, blocked, or stranded)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, unreadable input.
pub const USER_ERROR: i32 = 1;

/// Verification failure: a gate failed or the score stayed under the threshold.
pub const VERIFICATION_FAILURE: i32 = 2;

/// Graph construction failure: the task list cannot form a valid DAG.
pub const GRAPH_FAILURE: i32 = 3;

/// The run finished but the project is not complete.
pub const INCOMPLETE: i32 = 4;
