//! In-memory hypervisor serving canned domains.
//!
//! Every connection and domain handle it hands out bumps a counter in
//! [`ReleaseStats`] when dropped, so callers can check that the discovery
//! pass released what it opened.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use super::{
    AddressSource, Connection, Domain, Hypervisor, HypervisorError, HypervisorOperation,
    HypervisorResult, MetadataKind, NetworkInterface,
};

#[derive(Debug, Default)]
pub struct ReleaseStats {
    connections_opened: AtomicUsize,
    connections_released: AtomicUsize,
    domains_listed: AtomicUsize,
    domains_released: AtomicUsize,
}

impl ReleaseStats {
    pub fn connections_opened(&self) -> usize {
        self.connections_opened.load(Ordering::SeqCst)
    }

    pub fn connections_released(&self) -> usize {
        self.connections_released.load(Ordering::SeqCst)
    }

    pub fn domains_listed(&self) -> usize {
        self.domains_listed.load(Ordering::SeqCst)
    }

    pub fn domains_released(&self) -> usize {
        self.domains_released.load(Ordering::SeqCst)
    }

    /// Every opened connection and listed domain has been released.
    pub fn all_released(&self) -> bool {
        self.connections_opened() == self.connections_released()
            && self.domains_listed() == self.domains_released()
    }
}

/// Canned state of one domain.
#[derive(Debug, Clone)]
pub struct DomainFixture {
    name: String,
    active: bool,
    name_error: Option<String>,
    metadata: HashMap<String, String>,
    metadata_error: Option<String>,
    interfaces: Vec<NetworkInterface>,
    interfaces_error: Option<String>,
}

impl DomainFixture {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            name_error: None,
            metadata: HashMap::new(),
            metadata_error: None,
            interfaces: Vec::new(),
            interfaces_error: None,
        }
    }

    /// Metadata element stored under `namespace`.
    pub fn with_metadata(mut self, namespace: impl Into<String>, xml: impl Into<String>) -> Self {
        self.metadata.insert(namespace.into(), xml.into());
        self
    }

    pub fn with_interface(mut self, interface: NetworkInterface) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn with_name_error(mut self, message: impl Into<String>) -> Self {
        self.name_error = Some(message.into());
        self
    }

    pub fn with_metadata_error(mut self, message: impl Into<String>) -> Self {
        self.metadata_error = Some(message.into());
        self
    }

    pub fn with_interfaces_error(mut self, message: impl Into<String>) -> Self {
        self.interfaces_error = Some(message.into());
        self
    }
}

#[derive(Debug, Default)]
pub struct InMemoryHypervisor {
    domains: Vec<DomainFixture>,
    connect_error: Option<String>,
    list_error: Option<String>,
    stats: Arc<ReleaseStats>,
}

impl InMemoryHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(mut self, domain: DomainFixture) -> Self {
        self.domains.push(domain);
        self
    }

    pub fn with_connect_error(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    pub fn with_list_error(mut self, message: impl Into<String>) -> Self {
        self.list_error = Some(message.into());
        self
    }

    /// Shared handle to the release counters, usable after the hypervisor
    /// has been moved into a provider.
    pub fn stats(&self) -> Arc<ReleaseStats> {
        Arc::clone(&self.stats)
    }
}

impl Hypervisor for InMemoryHypervisor {
    fn connect(&self, _uri: &str) -> HypervisorResult<Box<dyn Connection>> {
        if let Some(message) = &self.connect_error {
            return Err(HypervisorError::new(HypervisorOperation::Connect, message));
        }
        self.stats.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryConnection {
            domains: self.domains.clone(),
            list_error: self.list_error.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct InMemoryConnection {
    domains: Vec<DomainFixture>,
    list_error: Option<String>,
    stats: Arc<ReleaseStats>,
}

impl Connection for InMemoryConnection {
    fn list_active_domains(&self) -> HypervisorResult<Vec<Box<dyn Domain>>> {
        if let Some(message) = &self.list_error {
            return Err(HypervisorError::new(HypervisorOperation::ListDomains, message));
        }
        Ok(self
            .domains
            .iter()
            .filter(|fixture| fixture.active)
            .map(|fixture| {
                self.stats.domains_listed.fetch_add(1, Ordering::SeqCst);
                Box::new(InMemoryDomain {
                    fixture: fixture.clone(),
                    stats: Arc::clone(&self.stats),
                }) as Box<dyn Domain>
            })
            .collect())
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.stats.connections_released.fetch_add(1, Ordering::SeqCst);
    }
}

struct InMemoryDomain {
    fixture: DomainFixture,
    stats: Arc<ReleaseStats>,
}

impl Domain for InMemoryDomain {
    fn name(&self) -> HypervisorResult<String> {
        match &self.fixture.name_error {
            Some(message) => Err(HypervisorError::new(HypervisorOperation::DomainName, message)),
            None => Ok(self.fixture.name.clone()),
        }
    }

    fn metadata(
        &self,
        kind: MetadataKind,
        namespace: &str,
        _flags: u32,
    ) -> HypervisorResult<String> {
        if let Some(message) = &self.fixture.metadata_error {
            return Err(HypervisorError::new(HypervisorOperation::Metadata, message));
        }
        if kind != MetadataKind::Element {
            return Err(HypervisorError::new(
                HypervisorOperation::Metadata,
                format!("no {} metadata", kind),
            ));
        }
        self.fixture.metadata.get(namespace).cloned().ok_or_else(|| {
            HypervisorError::new(
                HypervisorOperation::Metadata,
                format!("metadata not found for namespace {:?}", namespace),
            )
        })
    }

    fn interface_addresses(
        &self,
        _source: AddressSource,
        _flags: u32,
    ) -> HypervisorResult<Vec<NetworkInterface>> {
        match &self.fixture.interfaces_error {
            Some(message) => Err(HypervisorError::new(
                HypervisorOperation::InterfaceAddresses,
                message,
            )),
            None => Ok(self.fixture.interfaces.clone()),
        }
    }
}

impl Drop for InMemoryDomain {
    fn drop(&mut self) {
        self.stats.domains_released.fetch_add(1, Ordering::SeqCst);
    }
}
