//! # Discovery providers
//!
//! A provider turns a flat option mapping into a list of addresses. The
//! discovery framework only relies on two calls, [`Provider::help`] and
//! [`Provider::addrs`]; [`Discover`] keeps providers by name and routes a
//! `key=value` config string to the one named by its `provider` key.
//!
//! ## Logging
//!
//! `addrs` takes an optional [`tracing::Dispatch`]. Providers emit their log
//! lines to that dispatcher for the duration of the call; passing `None`
//! discards them.

pub mod libvirt;
pub mod registry;

use tracing::Dispatch;

use crate::{config::DiscoverConfig, error::DiscoverResult};

pub use libvirt::{select_address, LibvirtProvider};
pub use registry::Discover;

pub trait Provider {
    /// Fixed description of the options the provider understands.
    fn help(&self) -> String;

    /// Runs one discovery pass. No partial result is returned on error.
    fn addrs(
        &self,
        config: &DiscoverConfig,
        logger: Option<&Dispatch>,
    ) -> DiscoverResult<Vec<String>>;
}

/// Runs `f` with `logger` as the default dispatcher, or with a discarding
/// one when no logger is given.
pub(crate) fn with_logger<T>(logger: Option<&Dispatch>, f: impl FnOnce() -> T) -> T {
    match logger {
        Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
        None => tracing::dispatcher::with_default(&Dispatch::none(), f),
    }
}
