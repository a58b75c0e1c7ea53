mod claims;
mod family;
mod principal;

pub use claims::*;
pub use family::*;
pub use principal::*;
