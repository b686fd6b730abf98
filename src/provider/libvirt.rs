use tracing::{debug, info, instrument, warn, Dispatch};

use crate::{
    config::{DiscoverConfig, LibvirtOptions, MismatchPolicy},
    error::{DiscoverError, DiscoverResult},
    hypervisor::{Domain, Hypervisor, MetadataKind, NetworkInterface},
    metadata::MetadataTracker,
};

use super::{with_logger, Provider};

pub const PROVIDER_NAME: &str = "libvirt";

const METADATA_FLAGS: u32 = 0;
const INTERFACE_FLAGS: u32 = 0;

const HELP: &str = r#"Libvirt:

    provider:          "libvirt"
    qemu_uri:          The QEMU URI to connect to
    ns_identifier:     XML Namespace Identifier
    metadata_key:      The metadata key to filter on
    metadata_value:    The metadata value to filter on
    address_source:    Where interface addresses come from: "lease", "agent" or "arp".
                       Default "agent".
    on_mismatch:       "abort" fails the lookup when a domain's metadata does not match,
                       "skip" leaves that domain out. Default "abort".
    legacy_metadata:   "true" lets a domain whose metadata cannot be decoded inherit
                       the previous domain's key and value. Default "false".
"#;

/// Picks the first address of the second interface, if both the interface
/// list and that interface's address list hold more than one entry.
pub fn select_address(interfaces: &[NetworkInterface]) -> Option<&str> {
    match interfaces {
        [_, second, ..] if second.addrs.len() > 1 => Some(second.addrs[0].addr.as_str()),
        _ => None,
    }
}

/// Discovers running libvirt domains tagged with a metadata key/value pair.
pub struct LibvirtProvider {
    hypervisor: Box<dyn Hypervisor>,
}

impl LibvirtProvider {
    pub fn new(hypervisor: impl Hypervisor + 'static) -> Self {
        Self {
            hypervisor: Box::new(hypervisor),
        }
    }

    #[instrument(level = "debug", skip_all, fields(qemu_uri = %options.qemu_uri))]
    fn discover(&self, options: &LibvirtOptions) -> DiscoverResult<Vec<String>> {
        let connection =
            self.hypervisor
                .connect(&options.qemu_uri)
                .map_err(|source| DiscoverError::Connection {
                    uri: options.qemu_uri.clone(),
                    source,
                })?;

        let domains = connection
            .list_active_domains()
            .map_err(DiscoverError::ListDomains)?;

        let mut tracker = MetadataTracker::new(options.legacy_metadata);
        let mut addrs = Vec::new();

        for domain in domains {
            info!(
                "discover-libvirt: Filter domains with {}={}",
                options.metadata_key, options.metadata_value
            );
            match inspect_domain(domain.as_ref(), options, &mut tracker) {
                Ok(Some(addr)) => addrs.push(addr),
                Ok(None) => {}
                Err(e) if e.is_filter_mismatch() && options.on_mismatch == MismatchPolicy::Skip => {
                    debug!("discover-libvirt: Skipping domain: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        debug!("discover-libvirt: Found ip addresses: {:?}", addrs);
        Ok(addrs)
    }
}

#[cfg(feature = "libvirt")]
impl Default for LibvirtProvider {
    fn default() -> Self {
        Self::new(crate::hypervisor::libvirt::LibvirtHypervisor::new())
    }
}

fn inspect_domain(
    domain: &dyn Domain,
    options: &LibvirtOptions,
    tracker: &mut MetadataTracker,
) -> DiscoverResult<Option<String>> {
    let name = domain.name().unwrap_or_else(|e| {
        warn!("discover-libvirt: {}", e);
        String::new()
    });

    let xml = domain
        .metadata(MetadataKind::Element, &options.ns_identifier, METADATA_FLAGS)
        .map_err(|source| DiscoverError::Metadata {
            domain: name.clone(),
            source,
        })?;

    let metadata = tracker.resolve(&name, &xml);
    if metadata.key != options.metadata_key {
        return Err(DiscoverError::KeyNotFound {
            expected: options.metadata_key.clone(),
            found: metadata.key,
        });
    }
    if metadata.value != options.metadata_value {
        return Err(DiscoverError::ValueNotFound {
            key: metadata.key,
            expected: options.metadata_value.clone(),
            found: metadata.value,
        });
    }

    let interfaces = domain
        .interface_addresses(options.address_source, INTERFACE_FLAGS)
        .map_err(|source| DiscoverError::NoInterfaces {
            domain: name.clone(),
            source,
        })?;

    let addr = select_address(&interfaces).map(str::to_string);
    if let Some(addr) = &addr {
        debug!("discover-libvirt: Domain {} has IPv4 address: {}", name, addr);
    }
    Ok(addr)
}

impl Provider for LibvirtProvider {
    fn help(&self) -> String {
        HELP.to_string()
    }

    fn addrs(
        &self,
        config: &DiscoverConfig,
        logger: Option<&Dispatch>,
    ) -> DiscoverResult<Vec<String>> {
        if config.provider() != PROVIDER_NAME {
            return Err(DiscoverError::InvalidProvider(config.provider().to_string()));
        }
        let options = LibvirtOptions::try_from(config)?;
        with_logger(logger, || self.discover(&options))
    }
}
