use std::collections::BTreeMap;

use tracing::{debug, Dispatch};

use crate::{
    config::DiscoverConfig,
    error::{DiscoverError, DiscoverResult},
};

use super::Provider;

const HELP_HEADER: &str = r#"The options for discovering ip addresses are provided as a
  single string value in "key=value key=value ..." format where
  values containing spaces are wrapped in double quotes.

  The "provider" key selects the provider. The remaining keys are
  provider specific:

"#;

/// Providers by name.
#[derive(Default)]
pub struct Discover {
    providers: BTreeMap<String, Box<dyn Provider>>,
}

impl Discover {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every provider built into this crate.
    #[cfg(feature = "libvirt")]
    pub fn with_default_providers() -> Self {
        Self::new().with_provider(
            super::libvirt::PROVIDER_NAME,
            super::LibvirtProvider::default(),
        )
    }

    pub fn with_provider(mut self, name: impl Into<String>, provider: impl Provider + 'static) -> Self {
        self.register(name, Box::new(provider));
        self
    }

    /// Registers `provider` under `name`, returning the one it replaces.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Box<dyn Provider>,
    ) -> Option<Box<dyn Provider>> {
        self.providers.insert(name.into(), provider)
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn help(&self) -> String {
        let mut help = HELP_HEADER.to_string();
        for provider in self.providers.values() {
            help.push_str(&provider.help());
            help.push('\n');
        }
        help
    }

    /// Parses `config` and hands it to the provider its `provider` key names.
    pub fn addrs(&self, config: &str, logger: Option<&Dispatch>) -> DiscoverResult<Vec<String>> {
        let config = DiscoverConfig::parse(config)?;
        let name = config.provider();
        if name.is_empty() {
            return Err(DiscoverError::NoProvider);
        }
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| DiscoverError::UnknownProvider(name.to_string()))?;
        debug!("dispatching to provider {}", name);
        provider.addrs(&config, logger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedProvider {
        addrs: Vec<String>,
    }

    impl Provider for FixedProvider {
        fn help(&self) -> String {
            "Fixed:\n\n    provider: \"fixed\"\n".to_string()
        }

        fn addrs(
            &self,
            config: &DiscoverConfig,
            _logger: Option<&Dispatch>,
        ) -> DiscoverResult<Vec<String>> {
            if config.get("fail") == "true" {
                return Err(DiscoverError::InvalidProvider(config.provider().to_string()));
            }
            Ok(self.addrs.clone())
        }
    }

    fn registry() -> Discover {
        Discover::new().with_provider(
            "fixed",
            FixedProvider {
                addrs: vec!["10.1.0.1".to_string(), "10.1.0.2".to_string()],
            },
        )
    }

    #[test]
    fn test_dispatches_by_provider_key() {
        let addrs = registry().addrs("provider=fixed region=eu", None).unwrap();
        assert_eq!(addrs, vec!["10.1.0.1", "10.1.0.2"]);
    }

    #[test]
    fn test_provider_errors_propagate() {
        assert!(registry().addrs("provider=fixed fail=true", None).is_err());
    }

    #[test]
    fn test_missing_and_unknown_provider() {
        let discover = registry();
        assert!(matches!(discover.addrs("", None), Err(DiscoverError::NoProvider)));
        assert!(matches!(
            discover.addrs("region=eu", None),
            Err(DiscoverError::NoProvider)
        ));
        assert!(matches!(
            discover.addrs("provider=gce", None),
            Err(DiscoverError::UnknownProvider(name)) if name == "gce"
        ));
    }

    #[test]
    fn test_bad_config_string() {
        assert!(matches!(
            registry().addrs("provider=fixed region", None),
            Err(DiscoverError::Config(_))
        ));
    }

    #[test]
    fn test_names_and_help() {
        let mut discover = registry();
        let replaced = discover.register(
            "another",
            Box::new(FixedProvider { addrs: Vec::new() }),
        );
        assert!(replaced.is_none());
        assert_eq!(discover.names(), vec!["another", "fixed"]);

        let help = discover.help();
        assert!(help.starts_with("The options for discovering ip addresses"));
        assert_eq!(help.matches("provider: \"fixed\"").count(), 2);
    }
}
