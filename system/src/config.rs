use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use tokio::time::Duration;

use crate::error::Error;

pub const DEFAULT_PORT: u16 = 7777;
pub const DEFAULT_NAME: &str = "roster";
pub const DEFAULT_COUNTER_PATH: &str = "roster.id";

/// How many peers a heartbeat round contacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fanout {
    All,
    Random(usize),
}

impl FromStr for Fanout {
    type Err = Error;

    /// `0` or `all` contacts every known peer, any other number bounds the
    /// round to that many randomly chosen peers.
    fn from_str(fanout: &str) -> Result<Fanout, Error> {
        if fanout.eq_ignore_ascii_case("all") {
            return Ok(Fanout::All);
        }

        match fanout.parse::<usize>() {
            Ok(0) => Ok(Fanout::All),
            Ok(peers) => Ok(Fanout::Random(peers)),
            Err(error) => Err(Error::Config(format!("gossip fanout {:?} -> {}", fanout, error))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub advertise_address: Option<String>,
    pub leader_address: Option<String>,
    pub seed_address: Option<String>,
    pub name: String,
    pub counter_path: PathBuf,
    pub heartbeat_interval: Duration,
    pub failure_timeout: Duration,
    pub gossip_fanout: Fanout,
    pub rpc_timeout: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            advertise_address: None,
            leader_address: None,
            seed_address: None,
            name: DEFAULT_NAME.to_string(),
            counter_path: PathBuf::from(DEFAULT_COUNTER_PATH),
            heartbeat_interval: Duration::from_millis(1000),
            failure_timeout: Duration::from_millis(5000),
            gossip_fanout: Fanout::All,
            rpc_timeout: Duration::from_millis(500),
        }
    }
}

impl Config {
    pub fn is_leader(&self) -> bool {
        self.leader_address.is_none()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.heartbeat_interval < Duration::from_millis(1) {
            return Err(Error::Config(String::from(
                "heartbeat interval must be at least one millisecond",
            )));
        }

        if self.rpc_timeout.is_zero() {
            return Err(Error::Config(String::from(
                "rpc timeout must be greater than zero",
            )));
        }

        if self.failure_timeout <= self.heartbeat_interval {
            return Err(Error::Config(format!(
                "failure timeout {:?} must exceed heartbeat interval {:?}",
                self.failure_timeout, self.heartbeat_interval,
            )));
        }

        if self.name.is_empty() {
            return Err(Error::Config(String::from("member name is empty")));
        }

        // peers dialing a wildcard address would reach themselves
        if self.bind_address.ip().is_unspecified() && self.advertise_address.is_none() {
            return Err(Error::Config(format!(
                "binding {} requires an advertise address",
                self.bind_address,
            )));
        }

        Ok(())
    }
}
