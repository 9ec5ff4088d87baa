use rand::seq::SliceRandom;
use rand::thread_rng;
use tokio::task::JoinSet;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::channel::{Shutdown, ShutdownReceiver, ShutdownSender, TableRequest, TableSender};
use crate::config::Fanout;
use crate::error::Error;
use crate::identifier::Identifier;
use crate::rpc::Client;
use crate::{debug, info, warn};

/// What a heartbeat push carries to the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Push {
    Local,
    Full,
}

/// Sends this process's heartbeat to `address`, merges the peer's table from
/// the response and returns how many members were adopted.
pub async fn push_heartbeat_to(
    table: &TableSender,
    address: &str,
    push: Push,
    rpc_timeout: Duration,
) -> Result<usize, Error> {
    let members = match push {
        Push::Local => vec![TableRequest::local(table).await?],
        Push::Full => TableRequest::snapshot(table).await?,
    };

    let client = Client::init(address, rpc_timeout).await;
    let response = client.heartbeat_push(members).await?;

    TableRequest::merge(table, response).await
}

/// Chooses the peers contacted in one round.
pub fn select_targets(mut peers: Vec<Identifier>, fanout: Fanout) -> Vec<Identifier> {
    match fanout {
        Fanout::All => peers,
        Fanout::Random(limit) if limit >= peers.len() => peers,
        Fanout::Random(limit) => {
            peers.shuffle(&mut thread_rng());
            peers.truncate(limit);
            peers
        }
    }
}

pub struct HeartbeatLoop {
    heartbeat_interval: Duration,
    rpc_timeout: Duration,
    fanout: Fanout,
    table: TableSender,
    shutdown: ShutdownReceiver,
}

impl HeartbeatLoop {
    pub async fn init(
        heartbeat_interval: Duration,
        rpc_timeout: Duration,
        fanout: Fanout,
        table: TableSender,
        shutdown: &ShutdownSender,
    ) -> HeartbeatLoop {
        info!("heartbeat interval -> {:?}", &heartbeat_interval);

        HeartbeatLoop {
            heartbeat_interval,
            rpc_timeout,
            fanout,
            table,
            shutdown: shutdown.subscribe(),
        }
    }

    pub async fn run(&mut self) -> Result<(), Error> {
        let mut ticker = interval(self.heartbeat_interval);

        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("running...");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.recv() => {
                    info!("shutting down...");

                    break
                }
                _ = ticker.tick() => {
                    self.round().await?;
                }
            }
        }

        Ok(())
    }

    async fn round(&self) -> Result<(), Error> {
        let local = TableRequest::heartbeat(&self.table).await?;
        let peers = TableRequest::peers(&self.table).await?;
        let targets = select_targets(peers, self.fanout);

        debug!(
            "heartbeat {} -> {} peer(s)",
            local.heartbeat_counter,
            targets.len(),
        );

        let mut pushes = JoinSet::new();

        for target in targets {
            let table = self.table.to_owned();
            let rpc_timeout = self.rpc_timeout;

            pushes.spawn(async move {
                let result =
                    push_heartbeat_to(&table, &target.address, Push::Local, rpc_timeout).await;

                (target, result)
            });
        }

        while let Some(joined) = pushes.join_next().await {
            match joined {
                Ok((_, Ok(adopted))) if adopted > 0 => debug!("adopted {} member(s)", adopted),
                Ok((_, Ok(_))) => {}
                Ok((_, Err(Error::Closed(component)))) => return Err(Error::Closed(component)),
                Ok((target, Err(error))) => {
                    warn!("skipping {} this round -> {}", &target, error);
                }
                Err(error) => warn!("heartbeat push task -> {:?}", error),
            }
        }

        for removed in TableRequest::sweep(&self.table).await? {
            info!("removed failed member -> {}", &removed.identifier);
        }

        Ok(())
    }
}

/// Keeps the heartbeat loop alive for the process lifetime and raises the
/// termination signal if it stops with an error.
pub async fn run_heartbeat_loop(mut heartbeat_loop: HeartbeatLoop, shutdown: ShutdownSender) {
    if let Err(error) = heartbeat_loop.run().await {
        crate::error!("heartbeat loop -> {}", &error);

        Shutdown::fatal(&shutdown, &error).await;
    }
}
