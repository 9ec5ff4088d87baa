pub mod authority;
pub mod channel;
pub mod config;
pub mod error;
pub mod identifier;
pub mod membership;
pub mod rpc;
pub mod runtime;

pub use config::{Config, Fanout};
pub use error::Error;
pub use identifier::Identifier;
pub use runtime::{join, launch, Process};

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        ::tracing::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        ::tracing::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        ::tracing::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        ::tracing::error!($($arg)*)
    };
}
