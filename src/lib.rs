//! Xbox Live presence bridge for the Unfolded Circle remote hub.
//!
//! Signs in to Xbox Live, polls the account's presence and mirrors it onto a
//! single media-player entity.

pub mod config;
pub mod driver;
pub mod entity;
pub mod error;
pub mod hub;
pub mod logging;
pub mod presence;
pub mod session;
pub mod setup;
pub mod xbox;

pub mod util {
    pub mod env;
}

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Result, XboxError};
