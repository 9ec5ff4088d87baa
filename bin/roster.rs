use clap::{Arg, ArgMatches, Command};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::time::Duration;
use tracing::Level;

use roster::{Config, Error, Fanout};

fn command() -> Command<'static> {
    Command::new("roster")
        .about("decentralized cluster membership")
        .arg(
            Arg::new("bind")
                .long("bind")
                .takes_value(true)
                .default_value("0.0.0.0:7777")
                .help("socket address the rpc server listens on"),
        )
        .arg(
            Arg::new("advertise")
                .long("advertise")
                .takes_value(true)
                .help("address peers use to reach this member, required when --bind is a wildcard address"),
        )
        .arg(
            Arg::new("leader")
                .long("leader")
                .takes_value(true)
                .help("leader to request an identifier from, omit to run as leader"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .takes_value(true)
                .help("member to exchange tables with on join"),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .takes_value(true)
                .default_value("roster"),
        )
        .arg(
            Arg::new("counter")
                .long("counter")
                .takes_value(true)
                .default_value("roster.id")
                .help("identifier counter file, used by the leader only"),
        )
        .arg(
            Arg::new("heartbeat-interval-ms")
                .long("heartbeat-interval-ms")
                .takes_value(true)
                .default_value("1000"),
        )
        .arg(
            Arg::new("failure-timeout-ms")
                .long("failure-timeout-ms")
                .takes_value(true)
                .default_value("5000"),
        )
        .arg(
            Arg::new("fanout")
                .long("fanout")
                .takes_value(true)
                .default_value("0")
                .help("peers contacted per heartbeat round, 0 for all"),
        )
        .arg(
            Arg::new("rpc-timeout-ms")
                .long("rpc-timeout-ms")
                .takes_value(true)
                .default_value("500"),
        )
        .arg(Arg::new("verbose").long("verbose").short('v'))
}

fn value(matches: &ArgMatches, name: &str) -> Result<String, Error> {
    matches
        .value_of(name)
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("--{} is missing", name)))
}

fn milliseconds(matches: &ArgMatches, name: &str) -> Result<Duration, Error> {
    let milliseconds = value(matches, name)?
        .parse::<u64>()
        .map_err(|error| Error::Config(format!("--{} -> {}", name, error)))?;

    Ok(Duration::from_millis(milliseconds))
}

fn config(matches: &ArgMatches) -> Result<Config, Error> {
    let bind = value(matches, "bind")?;
    let bind_address = SocketAddr::from_str(&bind)
        .map_err(|error| Error::Config(format!("--bind {} -> {}", bind, error)))?;

    Ok(Config {
        bind_address,
        advertise_address: matches.value_of("advertise").map(str::to_string),
        leader_address: matches.value_of("leader").map(str::to_string),
        seed_address: matches.value_of("seed").map(str::to_string),
        name: value(matches, "name")?,
        counter_path: PathBuf::from(value(matches, "counter")?),
        heartbeat_interval: milliseconds(matches, "heartbeat-interval-ms")?,
        failure_timeout: milliseconds(matches, "failure-timeout-ms")?,
        gossip_fanout: Fanout::from_str(&value(matches, "fanout")?)?,
        rpc_timeout: milliseconds(matches, "rpc-timeout-ms")?,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = command().get_matches();

    let level = if matches.is_present("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    let config = config(&matches)?;

    roster::launch(config).await
}
