//! Default configuration values

/// Repository settings file at the repository root
pub const SETTINGS_FILE: &str = "stackforge.toml";

/// Default directory holding one subdirectory per service
pub const DEFAULT_SERVICES_DIR: &str = "services";

/// Base service configuration file
pub const SERVICE_FILE: &str = "service.toml";

/// Platform manifest file (optional)
pub const PLATFORMS_FILE: &str = "platforms.toml";

/// Version manifest file (required)
pub const VERSIONS_FILE: &str = "versions.toml";

/// Default container builder CLI
pub const DEFAULT_BUILDER: &str = "docker";

/// Default prefix for generated image labels
pub const DEFAULT_LABEL_PREFIX: &str = "org.stackforge";

/// Label suffix carrying the service definition hash
pub const DEFINITION_HASH_LABEL: &str = "definition-hash";

/// Commit identifier used outside a git checkout
pub const LOCAL_COMMIT: &str = "local";

/// Last-resort cache-bust value
pub const DEFAULT_CACHEBUST: &str = "default";

/// Build argument carrying the cache-bust token
pub const CACHEBUST_ARG: &str = "CACHEBUST";

/// Number of hex characters kept from the source digest cache-bust
pub const CACHEBUST_DIGEST_LEN: usize = 16;

/// Number of hex characters in a short commit SHA
pub const SHORT_SHA_LEN: usize = 7;

/// Separator joining source revisions before hashing
pub const CACHEBUST_SEPARATOR: &str = "|";
