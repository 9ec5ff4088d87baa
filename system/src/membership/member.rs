use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::identifier::Identifier;

/// A member as it travels between processes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub identifier: Identifier,
    pub heartbeat_counter: u64,
}

impl Member {
    pub async fn init(identifier: Identifier) -> Member {
        Member {
            identifier,
            heartbeat_counter: 0,
        }
    }

    pub fn num(&self) -> u64 {
        self.identifier.num
    }
}

/// A member as this process stores it. `last_seen_at` is a local clock
/// reading and never leaves the process.
#[derive(Clone, Debug)]
pub struct MemberRecord {
    pub member: Member,
    pub last_seen_at: Instant,
}

impl MemberRecord {
    pub fn new(member: Member, last_seen_at: Instant) -> MemberRecord {
        MemberRecord {
            member,
            last_seen_at,
        }
    }

    pub fn heartbeat_counter(&self) -> u64 {
        self.member.heartbeat_counter
    }
}
