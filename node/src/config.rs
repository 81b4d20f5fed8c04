use std::path::Path;

use anyhow::Result;
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use toxbridge_transport::{AddressFamily, TransportConfig};

/// A virtual socket opened at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SocketSpec {
    pub family: AddressFamily,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub log_level: String,
    /// `pretty`, or anything else for compact lines.
    pub log_format: String,
    /// Reflect every inbound datagram back to its sender.
    pub echo: bool,
    /// Seconds between stats log lines; 0 disables them.
    pub stats_interval_secs: u64,
    pub transport: TransportConfig,
    pub sockets: Vec<SocketSpec>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            echo: false,
            stats_interval_secs: 60,
            transport: TransportConfig::default(),
            sockets: vec![SocketSpec {
                family: AddressFamily::Ipv4,
                port: 33445,
            }],
        }
    }
}

impl NodeConfig {
    /// Defaults, then the optional config file, then `TOXBRIDGE_*` variables
    /// (`TOXBRIDGE_TRANSPORT__IPV4_FORM=mapped` for nested keys).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("TOXBRIDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: NodeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            anyhow::bail!("LOG_LEVEL must not be empty");
        }
        if self.transport.recv_buffer_size == 0 {
            anyhow::bail!("transport.recv_buffer_size must be greater than zero");
        }
        if self.sockets.is_empty() {
            anyhow::bail!("at least one socket must be configured");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::Ipv4Addr;
    use toxbridge_transport::Ipv4Form;

    #[test]
    fn defaults_without_file() {
        let config = NodeConfig::load(None).unwrap();
        assert_eq!(config.sockets.len(), 1);
        assert_eq!(config.transport.recv_buffer_size, 65_535);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"
echo = true

[transport]
ipv4_form = "mapped"
bind_ipv4 = "127.0.0.1"

[[sockets]]
family = "ipv4"
port = 0

[[sockets]]
family = "ipv6"
"#
        )
        .unwrap();

        let config = NodeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(config.echo);
        assert_eq!(config.transport.ipv4_form, Ipv4Form::Mapped);
        assert_eq!(config.transport.bind_ipv4, Ipv4Addr::LOCALHOST);
        assert_eq!(
            config.sockets,
            vec![
                SocketSpec {
                    family: AddressFamily::Ipv4,
                    port: 0
                },
                SocketSpec {
                    family: AddressFamily::Ipv6,
                    port: 0
                },
            ]
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NodeConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
