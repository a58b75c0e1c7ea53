mod grant_service;
mod token_codec;

pub use grant_service::*;
pub use token_codec::*;
