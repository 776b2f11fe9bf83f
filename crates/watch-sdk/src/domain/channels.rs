//! Well-known bus channels.
//!
//! Naming is hierarchical (`@<pipeline>:<signal>`); the bus itself treats
//! every name as an opaque key.

/// Enter the running state and kick the drain loop.
pub const WATCH_START: &str = "@watch:start";
/// Leave the running state; the loop exits at its next step.
pub const WATCH_STOP: &str = "@watch:stop";
/// Gate the drain loop (connection lost).
pub const WATCH_PAUSE: &str = "@watch:pause";
/// Lift the gate and emit a heartbeat.
pub const WATCH_RESUME: &str = "@watch:resume";
/// Offer a value for an index.
pub const WATCH_UPDATE: &str = "@watch:update";
/// Kick: spawn the drain loop if none is alive.
pub const WATCH_NEXT: &str = "@watch:next";
/// One sync request per fresh index, answered through its ack.
pub const WATCH_SYNC: &str = "@watch:sync";
/// The drain loop observed the stopped state and exited.
pub const WATCH_BREAK: &str = "@watch:break";

/// Interest in an index, forwarded upstream.
pub const LOOK_UPDATE: &str = "@look:update";
pub const LOOK_PAUSE: &str = "@look:pause";
pub const LOOK_RESUME: &str = "@look:resume";

pub const STATUS_ONLINE: &str = "@status:online";
pub const STATUS_OFFLINE: &str = "@status:offline";
pub const STATUS_ERROR: &str = "@status:error";

/// Reserved index carrying the resume heartbeat.
pub const HEARTBEAT_INDEX: &str = "token";

/// Channel receiving pushes for one looked index.
pub fn look_channel(index: &str) -> String {
    format!("@look#{index}")
}
