use serde::{Deserialize, Serialize};
use std::fmt;

/// Who a member is. Only `num` carries identity; it is issued once by the
/// leader and never changes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub num: u64,
    pub name: String,
    pub address: String,
}

impl Identifier {
    pub async fn init(num: u64, name: &str, address: &str) -> Identifier {
        Identifier {
            num,
            name: name.to_string(),
            address: address.to_string(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} ({})", self.name, self.num, self.address)
    }
}
