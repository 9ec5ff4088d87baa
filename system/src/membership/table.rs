use std::collections::HashMap;

use tokio::time::{Duration, Instant};

use crate::channel::{ShutdownReceiver, ShutdownSender, TableReceiver, TableRequest, TableResponse};
use crate::error::Error;
use crate::identifier::Identifier;
use crate::membership::{Member, MemberRecord};
use crate::{debug, info, warn};

/// The local view of the cluster.
///
/// Exactly one task owns a `Table` and serves every read and write through
/// `run`, so each request observes and updates the records atomically.
pub struct Table {
    local: MemberRecord,
    members: HashMap<u64, MemberRecord>,
    removed: HashMap<u64, u64>,
    failure_timeout: Duration,
    receiver: TableReceiver,
    shutdown: ShutdownReceiver,
}

impl Table {
    pub async fn init(
        identifier: Identifier,
        failure_timeout: Duration,
        receiver: TableReceiver,
        shutdown: &ShutdownSender,
    ) -> Table {
        Table::resume(identifier, 0, failure_timeout, receiver, shutdown).await
    }

    /// Starts the self record at `heartbeat_counter` instead of zero, for an
    /// identifier that peers may still hold or have removed at some counter.
    pub async fn resume(
        identifier: Identifier,
        heartbeat_counter: u64,
        failure_timeout: Duration,
        receiver: TableReceiver,
        shutdown: &ShutdownSender,
    ) -> Table {
        let member = Member {
            heartbeat_counter,
            ..Member::init(identifier).await
        };
        let local = MemberRecord::new(member, Instant::now());
        let members = HashMap::with_capacity(10);
        let removed = HashMap::with_capacity(10);

        info!("initialized!");

        Table {
            local,
            members,
            removed,
            failure_timeout,
            receiver,
            shutdown: shutdown.subscribe(),
        }
    }

    pub async fn run(&mut self) -> Result<(), Error> {
        info!("running...");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.recv() => {
                    info!("shutting down...");

                    break
                }
                Some((request, response)) = self.receiver.recv() => {
                    let now = Instant::now();

                    let result = match request {
                        TableRequest::Local => TableResponse::Member(self.local()),
                        TableRequest::Snapshot => TableResponse::Members(self.snapshot()),
                        TableRequest::Peers => TableResponse::Peers(self.peers()),
                        TableRequest::Heartbeat => TableResponse::Member(self.heartbeat(now)),
                        TableRequest::Merge(members) => {
                            TableResponse::Merged(self.merge(&members, now))
                        }
                        TableRequest::Exchange(members) => {
                            self.merge(&members, now);

                            TableResponse::Members(self.snapshot())
                        }
                        TableRequest::Sweep => TableResponse::Removed(self.sweep(now)),
                    };

                    if response.send(result).is_err() {
                        debug!("requester went away before the table response");
                    }
                }
                else => break,
            }
        }

        Ok(())
    }

    pub fn local(&self) -> Member {
        self.local.member.to_owned()
    }

    /// Number of members including self.
    pub fn len(&self) -> usize {
        self.members.len() + 1
    }

    pub fn contains(&self, num: u64) -> bool {
        num == self.local.member.num() || self.members.contains_key(&num)
    }

    pub fn get(&self, num: u64) -> Option<&MemberRecord> {
        match num == self.local.member.num() {
            true => Some(&self.local),
            false => self.members.get(&num),
        }
    }

    /// Every stored member, self included, ordered by `num`.
    pub fn snapshot(&self) -> Vec<Member> {
        let mut snapshot = Vec::with_capacity(self.len());

        snapshot.push(self.local());
        snapshot.extend(self.members.values().map(|record| record.member.to_owned()));
        snapshot.sort_by_key(Member::num);

        snapshot
    }

    pub fn peers(&self) -> Vec<Identifier> {
        let mut peers: Vec<Identifier> = self
            .members
            .values()
            .map(|record| record.member.identifier.to_owned())
            .collect();

        peers.sort_by_key(|identifier| identifier.num);
        peers
    }

    pub fn heartbeat(&mut self, now: Instant) -> Member {
        self.local.member.heartbeat_counter += 1;
        self.local.last_seen_at = now;

        self.local()
    }

    /// Applies the anti-entropy rule to every incoming member and returns how
    /// many were adopted.
    pub fn merge(&mut self, incoming: &[Member], now: Instant) -> usize {
        let mut adopted = 0;

        for member in incoming {
            let num = member.num();

            if num == self.local.member.num() {
                continue;
            }

            if let Some(record) = self.members.get_mut(&num) {
                if member.heartbeat_counter > record.heartbeat_counter() {
                    record.member = member.to_owned();
                    record.last_seen_at = now;

                    adopted += 1;
                }

                continue;
            }

            if let Some(&counter_at_removal) = self.removed.get(&num) {
                if member.heartbeat_counter <= counter_at_removal {
                    debug!(
                        "ignoring stale member #{} at {} (removed at {})",
                        num, member.heartbeat_counter, counter_at_removal,
                    );

                    continue;
                }

                self.removed.remove(&num);

                info!("member rejoined -> {}", &member.identifier);
            } else {
                info!("added member -> {}", &member.identifier);
            }

            self.members
                .insert(num, MemberRecord::new(member.to_owned(), now));

            adopted += 1;
        }

        adopted
    }

    /// Removes every peer whose counter has not advanced within the failure
    /// timeout and returns the removed members.
    pub fn sweep(&mut self, now: Instant) -> Vec<Member> {
        let failed: Vec<u64> = self
            .members
            .values()
            .filter(|record| {
                now.saturating_duration_since(record.last_seen_at) > self.failure_timeout
            })
            .map(|record| record.member.num())
            .collect();

        let mut removed = Vec::with_capacity(failed.len());

        for num in failed {
            if let Some(record) = self.members.remove(&num) {
                warn!("member failed -> {}", &record.member.identifier);

                self.removed.insert(num, record.heartbeat_counter());
                removed.push(record.member);
            }
        }

        removed
    }
}
