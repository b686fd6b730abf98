//! libvirt backend over the `virt` bindings.
//!
//! `virt`'s own `Drop` impls panic when a close or free fails, so the handles
//! are held in [`ManuallyDrop`] and released exactly once here, with failures
//! logged instead.

use std::mem::ManuallyDrop;

use tracing::warn;
use virt::{connect::Connect, domain::Domain as VirtDomain, sys};

use super::{
    AddressFamily, AddressSource, Connection, Domain, Hypervisor, HypervisorError,
    HypervisorOperation, HypervisorResult, IpAddress, MetadataKind, NetworkInterface,
};

fn hypervisor_error(operation: HypervisorOperation, err: virt::error::Error) -> HypervisorError {
    HypervisorError::new(operation, err.to_string())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LibvirtHypervisor;

impl LibvirtHypervisor {
    pub fn new() -> Self {
        Self
    }
}

impl Hypervisor for LibvirtHypervisor {
    #[tracing::instrument(level = "debug", skip(self))]
    fn connect(&self, uri: &str) -> HypervisorResult<Box<dyn Connection>> {
        let uri = (!uri.is_empty()).then_some(uri);
        let conn = Connect::open(uri)
            .map_err(|e| hypervisor_error(HypervisorOperation::Connect, e))?;
        Ok(Box::new(LibvirtConnection {
            conn: ManuallyDrop::new(conn),
        }))
    }
}

struct LibvirtConnection {
    conn: ManuallyDrop<Connect>,
}

impl Connection for LibvirtConnection {
    fn list_active_domains(&self) -> HypervisorResult<Vec<Box<dyn Domain>>> {
        let domains = self
            .conn
            .list_all_domains(sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE)
            .map_err(|e| hypervisor_error(HypervisorOperation::ListDomains, e))?;
        Ok(domains
            .into_iter()
            .map(|dom| {
                Box::new(LibvirtDomain {
                    dom: ManuallyDrop::new(dom),
                }) as Box<dyn Domain>
            })
            .collect())
    }
}

impl Drop for LibvirtConnection {
    fn drop(&mut self) {
        if let Err(e) = self.conn.close() {
            warn!("failed to close libvirt connection: {}", e);
        }
    }
}

struct LibvirtDomain {
    dom: ManuallyDrop<VirtDomain>,
}

impl Domain for LibvirtDomain {
    fn name(&self) -> HypervisorResult<String> {
        self.dom
            .get_name()
            .map_err(|e| hypervisor_error(HypervisorOperation::DomainName, e))
    }

    fn metadata(
        &self,
        kind: MetadataKind,
        namespace: &str,
        flags: u32,
    ) -> HypervisorResult<String> {
        self.dom
            .get_metadata(kind.raw(), Some(namespace), flags)
            .map_err(|e| hypervisor_error(HypervisorOperation::Metadata, e))
    }

    fn interface_addresses(
        &self,
        source: AddressSource,
        flags: u32,
    ) -> HypervisorResult<Vec<NetworkInterface>> {
        let interfaces = self
            .dom
            .interface_addresses(source.raw(), flags)
            .map_err(|e| hypervisor_error(HypervisorOperation::InterfaceAddresses, e))?;
        Ok(interfaces
            .into_iter()
            .map(|iface| NetworkInterface {
                name: iface.name,
                hwaddr: iface.hwaddr,
                addrs: iface.addrs.into_iter().map(ip_address).collect(),
            })
            .collect())
    }
}

impl Drop for LibvirtDomain {
    fn drop(&mut self) {
        if let Err(e) = self.dom.free() {
            warn!("failed to free libvirt domain: {}", e);
        }
    }
}

fn ip_address(ip: virt::domain::IPAddress) -> IpAddress {
    IpAddress {
        addr: ip.addr,
        family: if ip.typed == sys::VIR_IP_ADDR_TYPE_IPV6 as i64 {
            AddressFamily::Ipv6
        } else {
            AddressFamily::Ipv4
        },
        prefix: ip.prefix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ip_address_keeps_family_and_prefix() {
        let v6 = ip_address(virt::domain::IPAddress {
            typed: sys::VIR_IP_ADDR_TYPE_IPV6 as i64,
            addr: "fe80::5054:ff:fe12:3456".to_string(),
            prefix: 64,
        });
        assert_eq!(v6, IpAddress::ipv6("fe80::5054:ff:fe12:3456", 64));

        let v4 = ip_address(virt::domain::IPAddress {
            typed: sys::VIR_IP_ADDR_TYPE_IPV4 as i64,
            addr: "192.168.122.10".to_string(),
            prefix: 24,
        });
        assert_eq!(v4, IpAddress::ipv4("192.168.122.10", 24));
    }
}
