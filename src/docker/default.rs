use crate::image::{ImageName, Registry, Repository};

lazy_static! {
    static ref DOCKER_HUB: DefaultRegistry = DefaultRegistry {
        network_name: "registry-1.docker.io".parse().unwrap(),
        also_known_as: vec!["docker.io".parse().unwrap(), "index.docker.io".parse().unwrap()],
        library_prefix: Some("library".parse().unwrap()),
    };
}

/// Settings for the registry used by names which don't specify one
///
/// If you don't need the additional options, you can convert a plain [Registry]
/// [Into] a [DefaultRegistry]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DefaultRegistry {
    /// Connect to the registry under this name
    pub network_name: Registry,
    /// This registry is also known under additional names
    pub also_known_as: Vec<Registry>,
    /// Use this prefix when accessing an image repository with only a single
    /// path component
    pub library_prefix: Option<Repository>,
}

impl From<Registry> for DefaultRegistry {
    fn from(network_name: Registry) -> Self {
        DefaultRegistry {
            network_name,
            also_known_as: vec![],
            library_prefix: None,
        }
    }
}

impl Default for DefaultRegistry {
    fn default() -> Self {
        DefaultRegistry::new()
    }
}

impl DefaultRegistry {
    /// The Docker Hub, with its `library/` prefix for single-segment names
    pub fn new() -> Self {
        DOCKER_HUB.clone()
    }

    /// Check whether a particular registry is considered default under these
    /// settings
    ///
    /// Returns true if the given registry is None or if it matches either the
    /// `network_name` or any of the `also_known_as` settings here.
    pub fn is_default(&self, registry: Option<&Registry>) -> bool {
        match registry {
            None => true,
            Some(registry) => {
                registry == &self.network_name || self.also_known_as.contains(registry)
            }
        }
    }

    /// Use these settings to determine the actual network server and path for
    /// an image
    pub fn resolve_image_name(&self, image: &ImageName) -> (Registry, Repository) {
        let (network_name, library_prefix) = match image.registry() {
            Some(registry) if !self.is_default(Some(registry)) => (registry, None),
            _ => (&self.network_name, self.library_prefix.as_ref()),
        };
        let image_repo = image.repository();
        let complete_repo = match library_prefix {
            Some(prefix) if image_repo.is_single_segment() => prefix.join(image_repo),
            _ => image_repo.clone(),
        };
        (network_name.clone(), complete_repo)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn resolve(settings: &DefaultRegistry, name: &str) -> (String, String) {
        let (registry, repository) = settings.resolve_image_name(&name.parse().unwrap());
        (registry.as_str().to_owned(), repository.as_str().to_owned())
    }

    #[test]
    fn docker_hub_names() {
        let hub = DefaultRegistry::new();
        assert_eq!(
            resolve(&hub, "busybox"),
            ("registry-1.docker.io".into(), "library/busybox".into())
        );
        assert_eq!(
            resolve(&hub, "docker.io/busybox:latest"),
            ("registry-1.docker.io".into(), "library/busybox".into())
        );
        assert_eq!(
            resolve(&hub, "someone/busybox"),
            ("registry-1.docker.io".into(), "someone/busybox".into())
        );
        assert_eq!(
            resolve(&hub, "quay.io/busybox"),
            ("quay.io".into(), "busybox".into())
        );
    }

    #[test]
    fn custom_default() {
        let local: DefaultRegistry = "localhost:5000".parse::<Registry>().unwrap().into();
        assert!(local.is_default(None));
        assert_eq!(
            resolve(&local, "busybox"),
            ("localhost:5000".into(), "busybox".into())
        );
        assert_eq!(
            resolve(&local, "gcr.io/distroless/static"),
            ("gcr.io".into(), "distroless/static".into())
        );
    }
}
