use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpSocket;

use crate::error::Error;
use crate::membership::Member;

pub use client::Client;
pub use server::Server;

mod client;
mod server;

/// Upper bound on a single encoded request or response.
pub const MAX_MESSAGE_BYTES: u64 = 4 * 1024 * 1024;

/// Everything that crosses the wire, one value per connection direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Data {
    HeartbeatPush(Vec<Member>),
    HeartbeatTable(Vec<Member>),
    RequestIdentifier,
    AssignedIdentifier(u64),
    Failure(String),
}

impl Data {
    pub async fn build(&self) -> Result<Vec<u8>, Error> {
        let bytes = flexbuffers::to_vec(self)?;

        Ok(bytes)
    }

    pub async fn from_bytes(bytes: &[u8]) -> Result<Data, Error> {
        if bytes.is_empty() {
            return Err(Error::Protocol(String::from("empty message")));
        }

        let data = flexbuffers::from_slice(bytes)?;

        Ok(data)
    }
}

pub async fn build_tcp_socket(socket_address: &SocketAddr) -> Result<TcpSocket, Error> {
    let tcp_socket = match socket_address {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(|error| Error::Network(format!("socket for {} -> {}", socket_address, error)))?;

    Ok(tcp_socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Identifier;
    use std::str::FromStr;

    #[tokio::test(flavor = "multi_thread")]
    async fn data_assigned_identifier() -> Result<(), Box<dyn std::error::Error>> {
        let test_data = Data::AssignedIdentifier(42).build().await?;

        let test_flexbuffer_root = flexbuffers::Reader::get_root(test_data.as_slice())?;

        assert_eq!(test_flexbuffer_root.length(), 1);
        assert_eq!(
            test_flexbuffer_root
                .as_map()
                .idx("AssignedIdentifier")
                .as_u64(),
            42,
        );

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn data_heartbeat_push() -> Result<(), Box<dyn std::error::Error>> {
        let test_identifier = Identifier::init(3, "some_name", "127.0.0.1:7777").await;
        let test_members = vec![Member {
            identifier: test_identifier,
            heartbeat_counter: 11,
        }];

        let test_data = Data::HeartbeatPush(test_members.to_vec()).build().await?;
        let test_flexbuffer_root = flexbuffers::Reader::get_root(test_data.as_slice())?;
        let test_flexbuffer_members = test_flexbuffer_root
            .as_map()
            .idx("HeartbeatPush")
            .as_vector();

        assert_eq!(test_flexbuffer_members.len(), 1);

        let test_flexbuffer_member = test_flexbuffer_members.idx(0).as_map();

        assert_eq!(test_flexbuffer_member.idx("heartbeat_counter").as_u64(), 11);
        assert_eq!(
            test_flexbuffer_member
                .idx("identifier")
                .as_map()
                .idx("address")
                .as_str(),
            "127.0.0.1:7777",
        );

        assert_eq!(
            Data::from_bytes(&test_data).await?,
            Data::HeartbeatPush(test_members),
        );

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn data_from_bytes_malformed() -> Result<(), Box<dyn std::error::Error>> {
        assert!(Data::from_bytes(b"").await.unwrap_err().is_protocol());

        let test_wrong_shape = flexbuffers::to_vec(vec![1_u8, 2, 3])?;

        assert!(Data::from_bytes(&test_wrong_shape).await.unwrap_err().is_protocol());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn build_tcp_socket() -> Result<(), Box<dyn std::error::Error>> {
        let test_socket_address = SocketAddr::from_str("127.0.0.1:0")?;
        let test_tcp_socket = super::build_tcp_socket(&test_socket_address).await?;

        test_tcp_socket.bind(test_socket_address)?;

        let test_local_address = test_tcp_socket.local_addr()?;

        assert!(test_local_address.ip().is_loopback());
        assert_ne!(test_local_address.port(), 0);

        Ok(())
    }
}
