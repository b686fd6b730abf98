//! # libvirt-discover
//!
//! Address discovery for libvirt hosts. Given a flat set of options, the
//! libvirt provider connects to a hypervisor, walks the active domains,
//! keeps the ones whose metadata element carries the requested key/value
//! pair and returns one IPv4 address per kept domain. The result is meant to
//! seed join lists of clustered services.
//!
//! ## Layout
//!
//! - [`config`]: option mapping, `key=value` config strings and the typed
//!   libvirt options
//! - [`hypervisor`]: the hypervisor capability the provider runs against,
//!   with an in-memory backend and, behind the `libvirt` feature, the real one
//! - [`metadata`]: decoding of the per-domain metadata element
//! - [`provider`]: the provider contract, the libvirt provider and the
//!   [`provider::Discover`] registry
//! - [`error`]: error types
//!
//! ## Example
//!
//! ```
//! use libvirt_discover::{
//!     config::DiscoverConfig,
//!     hypervisor::{
//!         memory::{DomainFixture, InMemoryHypervisor},
//!         IpAddress, NetworkInterface,
//!     },
//!     provider::{LibvirtProvider, Provider},
//! };
//!
//! let hypervisor = InMemoryHypervisor::new().with_domain(
//!     DomainFixture::new("consul-1")
//!         .with_metadata("urn:discover", "<m><key>role</key><value>consul</value></m>")
//!         .with_interface(NetworkInterface::new("lo").with_addr(IpAddress::ipv4("127.0.0.1", 8)))
//!         .with_interface(
//!             NetworkInterface::new("eth0")
//!                 .with_addr(IpAddress::ipv4("10.0.0.11", 24))
//!                 .with_addr(IpAddress::ipv6("fe80::11", 64)),
//!         ),
//! );
//! let provider = LibvirtProvider::new(hypervisor);
//!
//! let config = DiscoverConfig::parse(
//!     "provider=libvirt ns_identifier=urn:discover metadata_key=role metadata_value=consul",
//! )
//! .unwrap();
//! assert_eq!(provider.addrs(&config, None).unwrap(), vec!["10.0.0.11"]);
//! ```

pub mod config;
pub mod error;
pub mod hypervisor;
pub mod metadata;
pub mod provider;

// Re-exports
pub use error::*;

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
