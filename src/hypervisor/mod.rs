//! # Hypervisor capability
//!
//! The discovery pass needs four things from a hypervisor: open a connection
//! by URI, list the active domains, read a domain's name and namespaced
//! metadata element, and list a domain's interface addresses. Those calls are
//! expressed as the [`Hypervisor`], [`Connection`] and [`Domain`] traits so
//! the filtering logic can run against the real libvirt client
//! ([`libvirt::LibvirtHypervisor`], behind the `libvirt` feature) or against
//! canned data ([`memory::InMemoryHypervisor`]).
//!
//! ## Resource lifetime
//!
//! Connections and domains are handed out as boxed trait objects and are
//! released when the box is dropped. Dropping a handle on any path, early
//! return included, releases the underlying hypervisor resource.

#[cfg(feature = "libvirt")]
pub mod libvirt;
pub mod memory;

use thiserror::Error;

/// `VIR_DOMAIN_METADATA_*` selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MetadataKind {
    Description,
    Title,
    Element,
}

impl MetadataKind {
    pub fn raw(self) -> i32 {
        match self {
            MetadataKind::Description => 0,
            MetadataKind::Title => 1,
            MetadataKind::Element => 2,
        }
    }
}

/// `VIR_DOMAIN_INTERFACE_ADDRESSES_SRC_*` selectors.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum AddressSource {
    /// DHCP leases of libvirt managed networks.
    Lease,
    /// The QEMU guest agent running inside the domain.
    #[default]
    Agent,
    /// The host ARP table.
    Arp,
}

impl AddressSource {
    pub fn raw(self) -> u32 {
        match self {
            AddressSource::Lease => 0,
            AddressSource::Agent => 1,
            AddressSource::Arp => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
pub enum AddressFamily {
    #[default]
    #[strum(serialize = "ipv4")]
    Ipv4,
    #[strum(serialize = "ipv6")]
    Ipv6,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAddress {
    pub addr: String,
    pub family: AddressFamily,
    pub prefix: u64,
}

impl IpAddress {
    pub fn ipv4(addr: impl Into<String>, prefix: u64) -> Self {
        Self {
            addr: addr.into(),
            family: AddressFamily::Ipv4,
            prefix,
        }
    }

    pub fn ipv6(addr: impl Into<String>, prefix: u64) -> Self {
        Self {
            addr: addr.into(),
            family: AddressFamily::Ipv6,
            prefix,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub hwaddr: String,
    pub addrs: Vec<IpAddress>,
}

impl NetworkInterface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_hwaddr(mut self, hwaddr: impl Into<String>) -> Self {
        self.hwaddr = hwaddr.into();
        self
    }

    pub fn with_addr(mut self, addr: IpAddress) -> Self {
        self.addrs.push(addr);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum HypervisorOperation {
    #[strum(serialize = "connect")]
    Connect,
    #[strum(serialize = "list domains")]
    ListDomains,
    #[strum(serialize = "get domain name")]
    DomainName,
    #[strum(serialize = "get metadata")]
    Metadata,
    #[strum(serialize = "list interface addresses")]
    InterfaceAddresses,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct HypervisorError {
    pub operation: HypervisorOperation,
    pub message: String,
}

impl HypervisorError {
    pub fn new(operation: HypervisorOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

pub type HypervisorResult<T> = Result<T, HypervisorError>;

#[mockall::automock]
pub trait Hypervisor {
    /// Opens a connection; an empty `uri` selects the client's default.
    fn connect(&self, uri: &str) -> HypervisorResult<Box<dyn Connection>>;
}

#[mockall::automock]
pub trait Connection {
    /// Active domains, in the order the hypervisor reports them.
    fn list_active_domains(&self) -> HypervisorResult<Vec<Box<dyn Domain>>>;
}

#[mockall::automock]
pub trait Domain {
    fn name(&self) -> HypervisorResult<String>;

    fn metadata(&self, kind: MetadataKind, namespace: &str, flags: u32)
        -> HypervisorResult<String>;

    fn interface_addresses(
        &self,
        source: AddressSource,
        flags: u32,
    ) -> HypervisorResult<Vec<NetworkInterface>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_selectors() {
        assert_eq!(MetadataKind::Element.raw(), 2);
        assert_eq!(AddressSource::Lease.raw(), 0);
        assert_eq!(AddressSource::Agent.raw(), 1);
        assert_eq!(AddressSource::Arp.raw(), 2);
    }

    #[test]
    fn test_address_source_names() {
        assert_eq!("lease".parse::<AddressSource>().unwrap(), AddressSource::Lease);
        assert_eq!("arp".parse::<AddressSource>().unwrap(), AddressSource::Arp);
        assert!("dhcp".parse::<AddressSource>().is_err());
        assert_eq!(AddressSource::default().to_string(), "agent");
    }

    #[test]
    fn test_ip_address_constructors() {
        let v4 = IpAddress::ipv4("10.0.0.5", 24);
        let v6 = IpAddress::ipv6("fe80::1", 64);
        assert_eq!(v4.family, AddressFamily::Ipv4);
        assert_eq!(v6.family, AddressFamily::Ipv6);
        assert_eq!(v6.prefix, 64u64);
    }

    #[test]
    fn test_error_display() {
        let err = HypervisorError::new(HypervisorOperation::ListDomains, "connection reset");
        assert_eq!(err.to_string(), "list domains failed: connection reset");
    }
}
