use tokio::time::Duration;

use crate::channel::{AuthorityReceiver, AuthorityRequest, AuthorityResponse};
use crate::channel::{Shutdown, ShutdownReceiver, ShutdownSender};
use crate::error::Error;
use crate::rpc::Client;
use crate::{error, info};

pub use counter::Counter;

mod counter;

/// Issues member identifiers on the leader. Requests are served one at a
/// time, so increment-and-persist is never interleaved.
pub struct IdAuthority {
    counter: Counter,
    receiver: AuthorityReceiver,
    shutdown: ShutdownSender,
    terminated: ShutdownReceiver,
}

impl IdAuthority {
    pub async fn init(
        counter: Counter,
        receiver: AuthorityReceiver,
        shutdown: &ShutdownSender,
    ) -> IdAuthority {
        info!("initialized from {}", counter.path().display());

        IdAuthority {
            counter,
            receiver,
            shutdown: shutdown.to_owned(),
            terminated: shutdown.subscribe(),
        }
    }

    pub fn last_issued(&self) -> u64 {
        self.counter.last_issued()
    }

    /// This process's own number, kept across restarts. The flag is true
    /// when a previous run of the leader already held it.
    pub async fn claim_leader_id(&mut self) -> Result<(u64, bool), Error> {
        let (num, resumed) = self.counter.claim_leader().await?;

        if resumed {
            info!("resumed leader identifier -> {}", num);
        } else {
            info!("claimed leader identifier -> {}", num);
        }

        Ok((num, resumed))
    }

    pub async fn issue_local_id(&mut self) -> Result<u64, Error> {
        let num = self.counter.increment().await?;

        info!("issued identifier -> {}", num);

        Ok(num)
    }

    pub async fn run(&mut self) -> Result<(), Error> {
        info!("running...");

        loop {
            tokio::select! {
                biased;
                _ = self.terminated.recv() => {
                    info!("shutting down...");

                    break
                }
                Some((request, response)) = self.receiver.recv() => {
                    match request {
                        AuthorityRequest::IssueId => match self.issue_local_id().await {
                            Ok(num) => {
                                if response.send(AuthorityResponse::Issued(num)).is_err() {
                                    // the number stays spent
                                    info!("requester for identifier {} went away", num);
                                }
                            }
                            Err(failure) => {
                                error!("identifier issuance -> {}", &failure);

                                let _ = response.send(AuthorityResponse::Failed(failure.to_owned()));

                                Shutdown::fatal(&self.shutdown, &failure).await;

                                return Err(failure);
                            }
                        },
                    }
                }
                else => break,
            }
        }

        Ok(())
    }
}

/// Asks the leader at `leader_address` for a fresh identifier.
pub async fn request_id(leader_address: &str, rpc_timeout: Duration) -> Result<u64, Error> {
    let client = Client::init(leader_address, rpc_timeout).await;
    let num = client.request_identifier().await?;

    info!("leader {} assigned identifier -> {}", leader_address, num);

    Ok(num)
}
