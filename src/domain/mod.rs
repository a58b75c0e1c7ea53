mod codec;
mod credential;
mod grant_service_impl;
mod hasher;

pub use codec::*;
pub use credential::*;
pub use grant_service_impl::*;
pub use hasher::*;
