mod grant_service_fake;

pub use grant_service_fake::*;
