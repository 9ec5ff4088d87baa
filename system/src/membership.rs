pub use heartbeat::{push_heartbeat_to, run_heartbeat_loop, select_targets, HeartbeatLoop, Push};
pub use member::{Member, MemberRecord};
pub use table::Table;

mod heartbeat;
mod member;
mod table;
