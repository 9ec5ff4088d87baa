pub mod authority;
pub mod shutdown;
pub mod table;

pub use authority::{AuthorityReceiver, AuthorityRequest, AuthorityResponse, AuthoritySender};
pub use shutdown::{Shutdown, ShutdownReceiver, ShutdownSender};
pub use table::{TableReceiver, TableRequest, TableResponse, TableSender};
