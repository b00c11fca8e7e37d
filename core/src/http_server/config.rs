use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

const DEFAULT_PORT: u16 = 8260;
pub(super) const DEFAULT_WORKERS: usize = 1;
const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(PartialEq, Deserialize, Serialize, Debug, Clone)]
pub struct Port(u16);
#[derive(PartialEq, Deserialize, Serialize, Debug, Clone)]
pub struct Host(String);

/// The status server is read-only and loopback-bound by default (§10.5);
/// enabling it or exposing it on another interface is an explicit opt-in.
#[derive(PartialEq, Deserialize, Serialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default)]
    pub port: Port,
    #[serde(default)]
    pub host: Host,
    #[serde(default)]
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: Port::default(),
            host: Host::default(),
            enabled: false,
        }
    }
}

impl Default for Port {
    fn default() -> Self {
        Port(DEFAULT_PORT)
    }
}

impl From<Port> for u16 {
    fn from(value: Port) -> Self {
        value.0
    }
}

impl From<u16> for Port {
    fn from(value: u16) -> Self {
        Port(value)
    }
}

impl Default for Host {
    fn default() -> Self {
        Host(String::from(DEFAULT_HOST))
    }
}

impl Display for Port {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for Host {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, Default, Debug, PartialEq)]
    struct ConfigContainer {
        #[serde(default)]
        status_server: ServerConfig,
    }

    #[test]
    fn deserializes_defaults_when_section_is_absent() {
        let config: ConfigContainer = serde_yaml::from_str("").unwrap();
        assert_eq!(
            config,
            ConfigContainer {
                status_server: ServerConfig {
                    host: Host(String::from(DEFAULT_HOST)),
                    port: Port(DEFAULT_PORT),
                    enabled: false,
                },
            }
        );
    }

    #[test]
    fn host_and_enabled_can_be_overridden_independently() {
        let yaml = r#"
status_server:
  host: 0.0.0.0
  enabled: true
"#;
        let config: ConfigContainer = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.status_server.host, Host(String::from("0.0.0.0")));
        assert!(config.status_server.enabled);
        assert_eq!(config.status_server.port, Port(DEFAULT_PORT));
    }

    #[test]
    fn port_can_be_overridden() {
        let yaml = "status_server:\n  port: 9090\n";
        let config: ConfigContainer = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.status_server.port, Port(9090));
    }
}
