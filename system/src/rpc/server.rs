use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};

use crate::channel::{AuthorityRequest, AuthoritySender};
use crate::channel::{Shutdown, ShutdownReceiver, ShutdownSender};
use crate::channel::{TableRequest, TableSender};
use crate::error::Error;
use crate::rpc::build_tcp_socket;
use crate::rpc::{Data, MAX_MESSAGE_BYTES};
use crate::{debug, error, info, warn};

/// Connections served at once. Anything accepted beyond this is closed.
pub const MAX_CONNECTIONS: usize = 256;

/// Serves `heartbeatPush` and `requestIdentifier` for this process.
///
/// Each accepted connection carries exactly one request and one response.
pub struct Server {
    listener: TcpListener,
    connections: Arc<Semaphore>,
    table: TableSender,
    authority: Option<AuthoritySender>,
    rpc_timeout: Duration,
    shutdown: ShutdownSender,
    terminated: ShutdownReceiver,
}

impl Server {
    /// Binds right away so a port that is already taken fails the join
    /// before anything is announced to the cluster.
    pub async fn init(
        socket_address: SocketAddr,
        table: TableSender,
        authority: Option<AuthoritySender>,
        rpc_timeout: Duration,
        shutdown: &ShutdownSender,
    ) -> Result<Server, Error> {
        let tcp_socket = build_tcp_socket(&socket_address).await?;
        let bind_error =
            |error: std::io::Error| Error::Network(format!("bind {} -> {}", socket_address, error));

        tcp_socket.set_reuseaddr(true).map_err(bind_error)?;
        tcp_socket.bind(socket_address).map_err(bind_error)?;

        let backlog = 1024;
        let listener = tcp_socket.listen(backlog).map_err(bind_error)?;

        info!("listening on {}", socket_address);

        Ok(Server {
            listener,
            connections: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
            table,
            authority,
            rpc_timeout,
            shutdown: shutdown.to_owned(),
            terminated: shutdown.subscribe(),
        })
    }

    pub fn connection_limit(mut self, limit: usize) -> Server {
        self.connections = Arc::new(Semaphore::new(limit));
        self
    }

    pub fn local_address(&self) -> Result<SocketAddr, Error> {
        self.listener
            .local_addr()
            .map_err(|error| Error::Network(format!("local address -> {}", error)))
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
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((tcp_stream, socket_address)) => {
                            debug!("incoming connection -> {}", &socket_address);

                            let permit = match self.connections.to_owned().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!("connection limit reached, closing {}", &socket_address);

                                    continue
                                }
                            };

                            let table = self.table.to_owned();
                            let authority = self.authority.to_owned();
                            let shutdown = self.shutdown.to_owned();
                            let rpc_timeout = self.rpc_timeout;

                            tokio::spawn(async move {
                                Self::serve(tcp_stream, table, authority, rpc_timeout, shutdown).await;

                                drop(permit);
                            });
                        }
                        Err(error) => warn!("accept -> {}", error),
                    }
                }
            }
        }

        Ok(())
    }

    async fn serve(
        mut tcp_stream: TcpStream,
        table: TableSender,
        authority: Option<AuthoritySender>,
        rpc_timeout: Duration,
        shutdown: ShutdownSender,
    ) {
        let mut buffer = Vec::with_capacity(1024);
        let mut request = (&mut tcp_stream).take(MAX_MESSAGE_BYTES);
        let read = timeout(rpc_timeout, request.read_to_end(&mut buffer)).await;

        match read {
            Ok(Ok(_)) => {}
            Ok(Err(error)) => {
                warn!("tcp stream read -> {}", error);

                return;
            }
            Err(_) => {
                warn!("request not received within {:?}", &rpc_timeout);

                return;
            }
        }

        let response = match Self::route_incoming(&buffer, &table, &authority).await {
            Ok(response) => response,
            Err(failure @ Error::Closed(_)) => {
                error!("routing request -> {}", &failure);

                Shutdown::fatal(&shutdown, &failure).await;

                return;
            }
            Err(failure) => {
                warn!("dropping request -> {}", failure);

                return;
            }
        };

        let send_result = match response.build().await {
            Ok(send_result) => send_result,
            Err(failure) => {
                warn!("encoding response -> {}", failure);

                return;
            }
        };

        if let Err(error) = tcp_stream.write_all(&send_result).await {
            warn!("tcp stream write -> {}", error);
        }

        if let Err(error) = tcp_stream.shutdown().await {
            debug!("tcp stream shutdown -> {}", error);
        }
    }

    async fn route_incoming(
        data: &[u8],
        table: &TableSender,
        authority: &Option<AuthoritySender>,
    ) -> Result<Data, Error> {
        match Data::from_bytes(data).await? {
            Data::HeartbeatPush(members) => {
                debug!("received heartbeat push with {} member(s)", members.len());

                let members = TableRequest::exchange(table, members).await?;

                Ok(Data::HeartbeatTable(members))
            }
            Data::RequestIdentifier => match authority {
                Some(authority) => match AuthorityRequest::issue_id(authority).await {
                    Ok(num) => Ok(Data::AssignedIdentifier(num)),
                    Err(failure) => Ok(Data::Failure(failure.to_string())),
                },
                None => {
                    warn!("identifier requested from a process that is not the leader");

                    Ok(Data::Failure(String::from("not the leader")))
                }
            },
            unexpected => Err(Error::Protocol(format!(
                "not a request -> {:?}",
                unexpected,
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{Counter, IdAuthority};
    use crate::identifier::Identifier;
    use crate::membership::{Member, Table};
    use crate::rpc::Client;
    use std::str::FromStr;

    async fn test_server(
        num: u64,
        authority: Option<AuthoritySender>,
        shutdown: &ShutdownSender,
    ) -> Result<(String, TableSender), Box<dyn std::error::Error>> {
        test_limited_server(num, authority, MAX_CONNECTIONS, shutdown).await
    }

    async fn test_limited_server(
        num: u64,
        authority: Option<AuthoritySender>,
        limit: usize,
        shutdown: &ShutdownSender,
    ) -> Result<(String, TableSender), Box<dyn std::error::Error>> {
        let test_socket_address = SocketAddr::from_str("127.0.0.1:0")?;
        let (test_table_sender, test_table_receiver) = TableRequest::build().await;
        let mut test_server = Server::init(
            test_socket_address,
            test_table_sender.to_owned(),
            authority,
            Duration::from_millis(500),
            shutdown,
        )
        .await?
        .connection_limit(limit);

        let test_address = test_server.local_address()?.to_string();
        let test_identifier = Identifier::init(num, "some_server", &test_address).await;
        let mut test_table = Table::init(
            test_identifier,
            Duration::from_secs(5),
            test_table_receiver,
            shutdown,
        )
        .await;

        tokio::spawn(async move { test_table.run().await });
        tokio::spawn(async move { test_server.run().await });

        Ok((test_address, test_table_sender))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn init_port_in_use() -> Result<(), Box<dyn std::error::Error>> {
        let test_shutdown = Shutdown::build().await;
        let test_listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let test_socket_address = test_listener.local_addr()?;
        let (test_table_sender, _test_table_receiver) = TableRequest::build().await;

        let test_result = Server::init(
            test_socket_address,
            test_table_sender,
            None,
            Duration::from_millis(500),
            &test_shutdown,
        )
        .await;

        assert!(test_result.is_err());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn heartbeat_push_exchange() -> Result<(), Box<dyn std::error::Error>> {
        let test_shutdown = Shutdown::build().await;
        let (test_address, test_table) = test_server(1, None, &test_shutdown).await?;

        let test_pushed = Member {
            identifier: Identifier::init(2, "some_peer", "127.0.0.1:7002").await,
            heartbeat_counter: 4,
        };

        let test_client = Client::init(&test_address, Duration::from_millis(500)).await;
        let test_response = test_client.heartbeat_push(vec![test_pushed.to_owned()]).await?;

        assert_eq!(test_response.len(), 2);
        assert_eq!(test_response[0].num(), 1);
        assert_eq!(test_response[1], test_pushed);

        let test_peers = TableRequest::peers(&test_table).await?;

        assert_eq!(test_peers, vec![test_pushed.identifier]);

        Shutdown::interrupt(&test_shutdown).await;

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn request_identifier_from_leader() -> Result<(), Box<dyn std::error::Error>> {
        let test_shutdown = Shutdown::build().await;
        let test_path = std::env::temp_dir().join(format!(
            "roster-server-leader-{}/roster.id",
            std::process::id(),
        ));

        let _ = tokio::fs::remove_file(&test_path).await;

        let test_counter = Counter::load(&test_path).await?;
        let (test_authority_sender, test_authority_receiver) = AuthorityRequest::build().await;
        let mut test_authority =
            IdAuthority::init(test_counter, test_authority_receiver, &test_shutdown).await;

        assert_eq!(test_authority.issue_local_id().await?, 1);

        tokio::spawn(async move { test_authority.run().await });

        let (test_address, _test_table) =
            test_server(1, Some(test_authority_sender), &test_shutdown).await?;

        let test_client = Client::init(&test_address, Duration::from_millis(500)).await;

        assert_eq!(test_client.request_identifier().await?, 2);
        assert_eq!(test_client.request_identifier().await?, 3);

        Shutdown::interrupt(&test_shutdown).await;

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn request_identifier_from_non_leader() -> Result<(), Box<dyn std::error::Error>> {
        let test_shutdown = Shutdown::build().await;
        let (test_address, _test_table) = test_server(2, None, &test_shutdown).await?;

        let test_client = Client::init(&test_address, Duration::from_millis(500)).await;
        let test_error = test_client.request_identifier().await.unwrap_err();

        assert!(test_error.is_protocol());

        Shutdown::interrupt(&test_shutdown).await;

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_request_leaves_table_untouched() -> Result<(), Box<dyn std::error::Error>> {
        let test_shutdown = Shutdown::build().await;
        let (test_address, test_table) = test_server(1, None, &test_shutdown).await?;

        let mut test_stream = TcpStream::connect(&test_address).await?;

        test_stream.write_all(b"\x01\x02\x03").await?;
        test_stream.shutdown().await?;

        let mut test_response = Vec::new();

        test_stream.read_to_end(&mut test_response).await?;

        assert!(test_response.is_empty());
        assert_eq!(TableRequest::snapshot(&test_table).await?.len(), 1);

        Shutdown::interrupt(&test_shutdown).await;

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connections_beyond_limit_are_closed() -> Result<(), Box<dyn std::error::Error>> {
        let test_shutdown = Shutdown::build().await;
        let (test_address, _test_table) =
            test_limited_server(1, None, 1, &test_shutdown).await?;

        // holds the only permit until it is dropped or the read times out
        let test_idle = TcpStream::connect(&test_address).await?;

        tokio::time::sleep(Duration::from_millis(50)).await;

        let test_client = Client::init(&test_address, Duration::from_millis(300)).await;

        assert!(test_client.heartbeat_push(Vec::new()).await.is_err());

        drop(test_idle);

        tokio::time::sleep(Duration::from_millis(100)).await;

        let test_response = test_client.heartbeat_push(Vec::new()).await?;

        assert_eq!(test_response.len(), 1);

        Shutdown::interrupt(&test_shutdown).await;

        Ok(())
    }
}
