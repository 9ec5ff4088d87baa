use std::time::{SystemTime, UNIX_EPOCH};

use tokio::signal::ctrl_c;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::authority::{request_id, Counter, IdAuthority};
use crate::channel::{AuthorityRequest, TableRequest, TableSender};
use crate::channel::{Shutdown, ShutdownReceiver, ShutdownSender};
use crate::config::Config;
use crate::error::Error;
use crate::identifier::Identifier;
use crate::membership::{push_heartbeat_to, run_heartbeat_loop, HeartbeatLoop, Member, Push, Table};
use crate::rpc;
use crate::{error, info};

/// A running member of the cluster.
pub struct Process {
    identifier: Identifier,
    table: TableSender,
    shutdown: ShutdownSender,
    terminated: ShutdownReceiver,
    handles: Vec<JoinHandle<()>>,
}

impl Process {
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub async fn members(&self) -> Result<Vec<Member>, Error> {
        TableRequest::snapshot(&self.table).await
    }

    pub async fn terminate(&self) {
        Shutdown::interrupt(&self.shutdown).await;
    }

    /// Resolves with the first termination cause once every task has stopped.
    pub async fn wait(&mut self) -> Shutdown {
        let cause = loop {
            match self.terminated.recv().await {
                Ok(cause) => break cause,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break Shutdown::Interrupt,
            }
        };

        for handle in self.handles.drain(..) {
            if let Err(error) = handle.await {
                error!("task -> {:?}", error);
            }
        }

        cause
    }
}

/// Brings up one member: identifier, listener, table, seed exchange and the
/// background tasks. Any failure before the returned `Process` exists is fatal
/// to the join.
pub async fn join(config: Config) -> Result<Process, Box<dyn std::error::Error>> {
    config.validate()?;

    // -------------------------------------------------------------------------------------------
    // |        init shutdown and table channels
    // -------------------------------------------------------------------------------------------

    let shutdown = Shutdown::build().await;
    let terminated = shutdown.subscribe();
    let (table_sender, table_receiver) = TableRequest::build().await;

    // -------------------------------------------------------------------------------------------
    // |        init rpc server
    // -------------------------------------------------------------------------------------------

    let (authority_sender, authority_receiver) = if config.is_leader() {
        let (authority_sender, authority_receiver) = AuthorityRequest::build().await;

        (Some(authority_sender), Some(authority_receiver))
    } else {
        (None, None)
    };

    let mut server = rpc::Server::init(
        config.bind_address,
        table_sender.to_owned(),
        authority_sender,
        config.rpc_timeout,
        &shutdown,
    )
    .await?;

    // -------------------------------------------------------------------------------------------
    // |        obtain identifier
    // -------------------------------------------------------------------------------------------

    let (num, heartbeat_counter, authority) = match (&config.leader_address, authority_receiver) {
        (_, Some(authority_receiver)) => {
            let counter = Counter::load(&config.counter_path).await?;
            let mut authority = IdAuthority::init(counter, authority_receiver, &shutdown).await;
            let (num, resumed) = authority.claim_leader_id().await?;
            let heartbeat_counter = if resumed { heartbeat_base() } else { 0 };

            (num, heartbeat_counter, Some(authority))
        }
        (Some(leader_address), None) => {
            let num = request_id(leader_address, config.rpc_timeout).await?;

            (num, 0, None)
        }
        (None, None) => {
            return Err(Box::new(Error::Config(String::from(
                "leader without an identifier authority",
            ))))
        }
    };

    let address = match &config.advertise_address {
        Some(advertise_address) => advertise_address.to_owned(),
        None => server.local_address()?.to_string(),
    };

    let identifier = Identifier::init(num, &config.name, &address).await;
    let span = tracing::info_span!(
        "member",
        num = identifier.num,
        name = %identifier.name,
        address = %identifier.address,
    );

    info!(parent: &span, "joined as {}", &identifier);

    // -------------------------------------------------------------------------------------------
    // |        init membership table
    // -------------------------------------------------------------------------------------------

    let mut handles = Vec::with_capacity(4);
    let mut table = Table::resume(
        identifier.to_owned(),
        heartbeat_counter,
        config.failure_timeout,
        table_receiver,
        &shutdown,
    )
    .await;

    let table_shutdown = shutdown.to_owned();

    handles.push(tokio::spawn(
        async move {
            if let Err(error) = table.run().await {
                error!("membership table -> {}", &error);

                Shutdown::fatal(&table_shutdown, &error).await;
            }
        }
        .instrument(span.to_owned()),
    ));

    // -------------------------------------------------------------------------------------------
    // |        seed exchange
    // -------------------------------------------------------------------------------------------

    if let Some(seed_address) = &config.seed_address {
        match push_heartbeat_to(&table_sender, seed_address, Push::Full, config.rpc_timeout)
            .instrument(span.to_owned())
            .await
        {
            Ok(adopted) => {
                info!(parent: &span, "seed {} -> adopted {} member(s)", seed_address, adopted)
            }
            Err(failure) => {
                error!(parent: &span, "seed {} -> {}", seed_address, &failure);

                Shutdown::fatal(&shutdown, &failure).await;

                return Err(Box::new(failure));
            }
        }
    }

    // -------------------------------------------------------------------------------------------
    // |        launch background tasks
    // -------------------------------------------------------------------------------------------

    let server_shutdown = shutdown.to_owned();

    handles.push(tokio::spawn(
        async move {
            if let Err(error) = server.run().await {
                error!("rpc server -> {}", &error);

                Shutdown::fatal(&server_shutdown, &error).await;
            }
        }
        .instrument(span.to_owned()),
    ));

    let heartbeat_loop = HeartbeatLoop::init(
        config.heartbeat_interval,
        config.rpc_timeout,
        config.gossip_fanout,
        table_sender.to_owned(),
        &shutdown,
    )
    .await;

    handles.push(tokio::spawn(
        run_heartbeat_loop(heartbeat_loop, shutdown.to_owned()).instrument(span.to_owned()),
    ));

    if let Some(mut authority) = authority {
        // raises the termination signal itself on a storage failure
        handles.push(tokio::spawn(
            async move {
                if let Err(error) = authority.run().await {
                    error!("identifier authority -> {}", &error);
                }
            }
            .instrument(span.to_owned()),
        ));
    }

    Ok(Process {
        identifier,
        table: table_sender,
        shutdown,
        terminated,
        handles,
    })
}

/// Milliseconds since the Unix epoch. A runner never advances its heartbeat
/// more than once per millisecond, so a resumed identity starting here is
/// ahead of every counter an earlier run of it reached.
fn heartbeat_base() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Runs one member until ctrl-c or a fatal error.
pub async fn launch(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut process = join(config).await?;
    let interrupt_shutdown = process.shutdown.to_owned();

    let interrupt = tokio::spawn(async move {
        match ctrl_c().await {
            Ok(()) => {
                info!("received interrupt, preparing to shut down...");

                Shutdown::interrupt(&interrupt_shutdown).await;
            }
            Err(error) => error!("ctrl-c handler -> {}", error),
        }
    });

    let cause = process.wait().await;

    interrupt.abort();

    match cause {
        Shutdown::Interrupt => {
            info!("shut down");

            Ok(())
        }
        Shutdown::Fatal(reason) => {
            error!("terminated -> {}", &reason);

            Err(reason.into())
        }
    }
}
