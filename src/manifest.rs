//! Configuration file parsing for ocsdk-target
//!
//! Parses `/etc/ocsdk-target.toml` using serde. Every field has a default,
//! so a host without a config file runs with the built-in layout.

use crate::error::{Error, Result};
use crate::network::SubnetPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ocsdk-target.toml";

/// Load configuration from a file
pub fn load(path: &Path) -> Result<ToolConfig> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: ToolConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Load an explicitly requested config, or fall back to defaults
///
/// An explicit path must exist. The default path is optional.
pub fn load_or_default(explicit: Option<&Path>) -> Result<ToolConfig> {
    match explicit {
        Some(path) => load(path),
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                load(path)
            } else {
                let config = ToolConfig::default();
                config.validate()?;
                Ok(config)
            }
        }
    }
}

/// Root configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct ToolConfig {
    /// Global settings
    #[serde(default)]
    pub config: GlobalConfig,

    /// Bridge network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Subordinate ID ranges
    #[serde(default)]
    pub idmap: IdMapConfig,

    /// Unprivileged network interface allowance
    #[serde(default)]
    pub usernet: UsernetConfig,
}

impl ToolConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.config.container_user.trim().is_empty() {
            return Err(Error::ConfigValidation(
                "container_user must not be empty".into(),
            ));
        }

        if self.network.bridge_name.trim().is_empty() {
            return Err(Error::ConfigValidation(
                "network.bridge_name must not be empty".into(),
            ));
        }

        // Parses the prefix and checks the subnet bound
        self.network.subnet_policy()?;

        if self.idmap.range_size == 0 {
            return Err(Error::ConfigValidation(
                "idmap.range_size must be greater than 0".into(),
            ));
        }

        if self.usernet.count == 0 {
            return Err(Error::ConfigValidation(
                "usernet.count must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Directories that must exist before containers are started again
    ///
    /// The backend root always comes first.
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.config.target_path.clone()];
        for dir in &self.config.required_dirs {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        dirs
    }
}

/// Global configuration settings
#[derive(Debug, Deserialize)]
pub struct GlobalConfig {
    /// Backend root path holding the SDK target containers
    #[serde(default = "default_target_path")]
    pub target_path: PathBuf,

    /// Service account that owns and starts the containers
    #[serde(default = "default_container_user")]
    pub container_user: String,

    /// Additional directories to provision
    #[serde(default)]
    pub required_dirs: Vec<PathBuf>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            target_path: default_target_path(),
            container_user: default_container_user(),
            required_dirs: Vec::new(),
        }
    }
}

fn default_target_path() -> PathBuf {
    PathBuf::from("/var/lib/ocsdk/targets")
}

fn default_container_user() -> String {
    "ocsdk".into()
}

/// Bridge network configuration
#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    /// Shell-style KEY=VALUE file read by the bridge service
    #[serde(default = "default_bridge_file")]
    pub bridge_file: PathBuf,

    /// Bridge device name
    #[serde(default = "default_bridge_name")]
    pub bridge_name: String,

    /// First two octets of the private range searched for a free /24
    #[serde(default = "default_subnet_prefix")]
    pub subnet_prefix: String,

    /// Highest third octet considered
    #[serde(default = "default_max_subnet")]
    pub max_subnet: u8,

    /// Service manager unit that owns the bridge
    #[serde(default = "default_service")]
    pub service: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bridge_file: default_bridge_file(),
            bridge_name: default_bridge_name(),
            subnet_prefix: default_subnet_prefix(),
            max_subnet: default_max_subnet(),
            service: default_service(),
        }
    }
}

impl NetworkConfig {
    /// Build the subnet search policy from the configured prefix and bound
    pub fn subnet_policy(&self) -> Result<SubnetPolicy> {
        let octets: Vec<&str> = self.subnet_prefix.split('.').collect();
        if octets.len() != 2 {
            return Err(Error::ConfigValidation(format!(
                "network.subnet_prefix must be two octets, got '{}'",
                self.subnet_prefix
            )));
        }

        let mut prefix = [0u8; 2];
        for (slot, octet) in prefix.iter_mut().zip(&octets) {
            *slot = octet.parse::<u8>().map_err(|_| {
                Error::ConfigValidation(format!(
                    "Invalid octet '{}' in network.subnet_prefix",
                    octet
                ))
            })?;
        }

        SubnetPolicy::new(prefix, self.max_subnet)
    }
}

fn default_bridge_file() -> PathBuf {
    PathBuf::from("/etc/default/lxc-net")
}

fn default_bridge_name() -> String {
    "lxcbr0".into()
}

fn default_subnet_prefix() -> String {
    "10.0".into()
}

fn default_max_subnet() -> u8 {
    254
}

fn default_service() -> String {
    "lxc-net".into()
}

/// Subordinate ID configuration
#[derive(Debug, Deserialize)]
pub struct IdMapConfig {
    #[serde(default = "default_subuid_file")]
    pub subuid_file: PathBuf,

    #[serde(default = "default_subgid_file")]
    pub subgid_file: PathBuf,

    /// Lowest ID handed out for new ranges
    #[serde(default = "default_range_start")]
    pub range_start: u32,

    /// Number of IDs in each new range
    #[serde(default = "default_range_size")]
    pub range_size: u32,
}

impl Default for IdMapConfig {
    fn default() -> Self {
        Self {
            subuid_file: default_subuid_file(),
            subgid_file: default_subgid_file(),
            range_start: default_range_start(),
            range_size: default_range_size(),
        }
    }
}

fn default_subuid_file() -> PathBuf {
    PathBuf::from("/etc/subuid")
}

fn default_subgid_file() -> PathBuf {
    PathBuf::from("/etc/subgid")
}

fn default_range_start() -> u32 {
    100_000
}

fn default_range_size() -> u32 {
    65_536
}

/// lxc-usernet configuration
#[derive(Debug, Deserialize)]
pub struct UsernetConfig {
    #[serde(default = "default_usernet_file")]
    pub file: PathBuf,

    /// Interface type granted to the container user
    #[serde(default = "default_interface_type")]
    pub interface_type: String,

    /// Number of interfaces the user may attach to the bridge
    #[serde(default = "default_usernet_count")]
    pub count: u32,
}

impl Default for UsernetConfig {
    fn default() -> Self {
        Self {
            file: default_usernet_file(),
            interface_type: default_interface_type(),
            count: default_usernet_count(),
        }
    }
}

fn default_usernet_file() -> PathBuf {
    PathBuf::from("/etc/lxc/lxc-usernet")
}

fn default_interface_type() -> String {
    "veth".into()
}

fn default_usernet_count() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ToolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.bridge_name, "lxcbr0");
        assert_eq!(config.network.bridge_file, PathBuf::from("/etc/default/lxc-net"));
        assert_eq!(config.network.max_subnet, 254);
        assert_eq!(config.required_dirs(), vec![default_target_path()]);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[config]
target_path = "/srv/targets"
container_user = "builder"
required_dirs = ["/srv/cache", "/srv/targets"]

[network]
bridge_name = "sdkbr0"
subnet_prefix = "10.3"
"#;
        let config: ToolConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.config.container_user, "builder");
        assert_eq!(config.network.bridge_name, "sdkbr0");
        assert_eq!(config.network.service, "lxc-net");
        assert_eq!(config.idmap.range_size, 65_536);

        // Duplicate of target_path is folded
        assert_eq!(
            config.required_dirs(),
            vec![PathBuf::from("/srv/targets"), PathBuf::from("/srv/cache")]
        );

        let policy = config.network.subnet_policy().unwrap();
        assert_eq!(policy.prefix(), [10, 3]);
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let toml = r#"
[network]
subnet_prefix = "10.0.0"
"#;
        let config: ToolConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(Error::ConfigValidation(_))));

        let toml = r#"
[network]
subnet_prefix = "10.x"
"#;
        let config: ToolConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_zero_max_subnet_rejected() {
        let toml = r#"
[network]
max_subnet = 0
"#;
        let config: ToolConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_empty_user_rejected() {
        let toml = r#"
[config]
container_user = " "
"#;
        let config: ToolConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[usernet]\ncount = 4").unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.usernet.count, 4);
        assert_eq!(config.usernet.interface_type, "veth");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load_or_default(Some(&missing)),
            Err(Error::ConfigRead { .. })
        ));
    }
}
