use std::fmt;
use tokio::sync::{mpsc, oneshot};

use crate::error::Error;
use crate::identifier::Identifier;
use crate::membership::Member;

pub type TableReceiver = mpsc::Receiver<(TableRequest, oneshot::Sender<TableResponse>)>;
pub type TableSender = mpsc::Sender<(TableRequest, oneshot::Sender<TableResponse>)>;

const TABLE: &str = "membership table";

#[derive(Clone, Debug)]
pub enum TableRequest {
    Local,
    Snapshot,
    Peers,
    Heartbeat,
    Merge(Vec<Member>),
    Exchange(Vec<Member>),
    Sweep,
}

impl TableRequest {
    pub async fn build() -> (TableSender, TableReceiver) {
        let (table_sender, table_receiver) =
            mpsc::channel::<(TableRequest, oneshot::Sender<TableResponse>)>(64);

        (table_sender, table_receiver)
    }

    async fn call(table: &TableSender, request: TableRequest) -> Result<TableResponse, Error> {
        let (request_sender, response) = oneshot::channel();

        table
            .send((request, request_sender))
            .await
            .map_err(|_| Error::Closed(TABLE))?;

        response.await.map_err(|_| Error::Closed(TABLE))
    }

    pub async fn local(table: &TableSender) -> Result<Member, Error> {
        match TableRequest::call(table, TableRequest::Local).await? {
            TableResponse::Member(member) => Ok(member),
            response => Err(Error::Protocol(format!("unexpected response -> {}", response))),
        }
    }

    pub async fn snapshot(table: &TableSender) -> Result<Vec<Member>, Error> {
        match TableRequest::call(table, TableRequest::Snapshot).await? {
            TableResponse::Members(members) => Ok(members),
            response => Err(Error::Protocol(format!("unexpected response -> {}", response))),
        }
    }

    pub async fn peers(table: &TableSender) -> Result<Vec<Identifier>, Error> {
        match TableRequest::call(table, TableRequest::Peers).await? {
            TableResponse::Peers(peers) => Ok(peers),
            response => Err(Error::Protocol(format!("unexpected response -> {}", response))),
        }
    }

    /// Advances the local heartbeat counter and returns the updated self record.
    pub async fn heartbeat(table: &TableSender) -> Result<Member, Error> {
        match TableRequest::call(table, TableRequest::Heartbeat).await? {
            TableResponse::Member(member) => Ok(member),
            response => Err(Error::Protocol(format!("unexpected response -> {}", response))),
        }
    }

    pub async fn merge(table: &TableSender, members: Vec<Member>) -> Result<usize, Error> {
        match TableRequest::call(table, TableRequest::Merge(members)).await? {
            TableResponse::Merged(adopted) => Ok(adopted),
            response => Err(Error::Protocol(format!("unexpected response -> {}", response))),
        }
    }

    /// Merges `members` and returns the resulting table in one step.
    pub async fn exchange(table: &TableSender, members: Vec<Member>) -> Result<Vec<Member>, Error> {
        match TableRequest::call(table, TableRequest::Exchange(members)).await? {
            TableResponse::Members(members) => Ok(members),
            response => Err(Error::Protocol(format!("unexpected response -> {}", response))),
        }
    }

    pub async fn sweep(table: &TableSender) -> Result<Vec<Member>, Error> {
        match TableRequest::call(table, TableRequest::Sweep).await? {
            TableResponse::Removed(removed) => Ok(removed),
            response => Err(Error::Protocol(format!("unexpected response -> {}", response))),
        }
    }
}

#[derive(Clone, Debug)]
pub enum TableResponse {
    Member(Member),
    Members(Vec<Member>),
    Peers(Vec<Identifier>),
    Merged(usize),
    Removed(Vec<Member>),
}

impl fmt::Display for TableResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table_response = "Table Response |";

        match self {
            TableResponse::Member(member) => {
                write!(f, "{} member -> {:?}", table_response, member)
            }
            TableResponse::Members(members) => {
                write!(f, "{} members -> {}", table_response, members.len())
            }
            TableResponse::Peers(peers) => {
                write!(f, "{} peers -> {}", table_response, peers.len())
            }
            TableResponse::Merged(adopted) => {
                write!(f, "{} merged -> {}", table_response, adopted)
            }
            TableResponse::Removed(removed) => {
                write!(f, "{} removed -> {}", table_response, removed.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn build() -> Result<(), Box<dyn std::error::Error>> {
        let (test_table_sender, _test_table_receiver) = TableRequest::build().await;

        assert_eq!(test_table_sender.capacity(), 64);
        assert!(!test_table_sender.is_closed());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn closed() -> Result<(), Box<dyn std::error::Error>> {
        let (test_table_sender, test_table_receiver) = TableRequest::build().await;

        drop(test_table_receiver);

        let test_error = TableRequest::snapshot(&test_table_sender).await.unwrap_err();

        assert_eq!(test_error, Error::Closed("membership table"));

        Ok(())
    }
}
