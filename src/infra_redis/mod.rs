mod family_store_redis;
mod revocation_list_redis;

pub use family_store_redis::*;
pub use revocation_list_redis::*;
