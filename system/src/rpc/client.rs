use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::error::Error;
use crate::membership::Member;
use crate::rpc::{Data, MAX_MESSAGE_BYTES};

/// One-shot caller for a peer's RPC endpoint. Every call, from connect to
/// the last response byte, is bounded by `rpc_timeout`.
pub struct Client {
    address: String,
    rpc_timeout: Duration,
}

impl Client {
    pub async fn init(address: &str, rpc_timeout: Duration) -> Client {
        Client {
            address: address.to_string(),
            rpc_timeout,
        }
    }

    pub async fn transmit(&self, data: &Data) -> Result<Data, Error> {
        let request = data.build().await?;

        let response = timeout(self.rpc_timeout, self.exchange(&request))
            .await
            .map_err(|_| {
                Error::Network(format!(
                    "{} did not answer within {:?}",
                    &self.address, &self.rpc_timeout,
                ))
            })?
            .map_err(|error| Error::Network(format!("{} -> {}", &self.address, error)))?;

        Data::from_bytes(&response).await
    }

    async fn exchange(&self, request: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut tcp_stream = TcpStream::connect(self.address.as_str()).await?;

        tcp_stream.write_all(request).await?;
        tcp_stream.shutdown().await?;

        let mut buffer = Vec::with_capacity(1024);

        tcp_stream
            .take(MAX_MESSAGE_BYTES)
            .read_to_end(&mut buffer)
            .await?;

        Ok(buffer)
    }

    pub async fn heartbeat_push(&self, members: Vec<Member>) -> Result<Vec<Member>, Error> {
        match self.transmit(&Data::HeartbeatPush(members)).await? {
            Data::HeartbeatTable(members) => Ok(members),
            Data::Failure(reason) => Err(Error::Protocol(format!(
                "{} refused heartbeat -> {}",
                &self.address, reason,
            ))),
            unexpected => Err(Error::Protocol(format!(
                "unexpected heartbeat response from {} -> {:?}",
                &self.address, unexpected,
            ))),
        }
    }

    pub async fn request_identifier(&self) -> Result<u64, Error> {
        match self.transmit(&Data::RequestIdentifier).await? {
            Data::AssignedIdentifier(num) => Ok(num),
            Data::Failure(reason) => Err(Error::Protocol(format!(
                "{} refused identifier request -> {}",
                &self.address, reason,
            ))),
            unexpected => Err(Error::Protocol(format!(
                "unexpected identifier response from {} -> {:?}",
                &self.address, unexpected,
            ))),
        }
    }
}
