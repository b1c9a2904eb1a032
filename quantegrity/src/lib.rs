#[macro_use]
extern crate serde;

mod authority;
mod ballot;
mod bits;
mod board;
mod election;
mod error;
mod key_agreement;
mod keychain;
mod mixnet;
mod oplog;
mod random;
mod serde_hex;
mod store;
mod util;
mod voter;

pub use authority::*;
pub use ballot::*;
pub use bits::*;
pub use board::*;
pub use election::*;
pub use error::*;
pub use key_agreement::*;
pub use keychain::*;
pub use mixnet::*;
pub use oplog::*;
pub use random::*;
pub use serde_hex::*;
pub use store::*;
pub use util::*;
pub use voter::*;

#[cfg(test)]
mod tests;
