mod family_store_mysql;
mod identity_verifier_mysql;

pub use family_store_mysql::*;
pub use identity_verifier_mysql::*;
