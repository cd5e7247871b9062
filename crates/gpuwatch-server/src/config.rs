//! Host registry loaded from a TOML file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use gpuwatch_common::HostDescriptor;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("host #{position}: {reason}")]
    Invalid { position: usize, reason: String },
}

#[derive(Debug, Default, Deserialize)]
struct HostsFile {
    #[serde(default)]
    hosts: Vec<HostDescriptor>,
}

/// Read and validate the registry. Order is preserved.
pub fn load_hosts(path: impl AsRef<Path>) -> Result<Vec<HostDescriptor>, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: HostsFile = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate(&file.hosts)?;
    Ok(file.hosts)
}

fn validate(hosts: &[HostDescriptor]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (i, host) in hosts.iter().enumerate() {
        let invalid = |reason: String| ConfigError::Invalid {
            position: i + 1,
            reason,
        };
        if host.hostname.trim().is_empty() {
            return Err(invalid("hostname is empty".to_string()));
        }
        if host.username.trim().is_empty() {
            return Err(invalid(format!("{}: username is empty", host.hostname)));
        }
        if host.port == 0 {
            return Err(invalid(format!("{}: port must be non-zero", host.hostname)));
        }
        if !seen.insert(host.hostname.as_str()) {
            return Err(invalid(format!("{}: duplicate hostname", host.hostname)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Vec<HostDescriptor>, ConfigError> {
        let file: HostsFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("hosts.toml"),
            source,
        })?;
        validate(&file.hosts)?;
        Ok(file.hosts)
    }

    #[test]
    fn test_parses_in_order() {
        let hosts = parse(
            r#"
            [[hosts]]
            hostname = "gpu-02.lab"
            username = "monitor"
            password = "a"

            [[hosts]]
            hostname = "gpu-01.lab"
            port = 2222
            username = "monitor"
            password = "b"
            "#,
        )
        .unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].hostname, "gpu-02.lab");
        assert_eq!(hosts[0].port, 22);
        assert_eq!(hosts[1].port, 2222);
        assert_eq!(hosts[1].password.expose(), "b");
    }

    #[test]
    fn test_empty_registry_is_allowed() {
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = parse(
            r#"
            [[hosts]]
            hostname = "gpu-01"
            username = "a"
            password = "x"

            [[hosts]]
            hostname = "gpu-01"
            username = "b"
            password = "y"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { position: 2, .. }));
        assert!(err.to_string().contains("duplicate hostname"));
    }

    #[test]
    fn test_rejects_blank_fields_and_zero_port() {
        let blank_user = parse(
            "[[hosts]]\nhostname = \"gpu-01\"\nusername = \" \"\npassword = \"x\"\n",
        )
        .unwrap_err();
        assert!(blank_user.to_string().contains("username is empty"));

        let zero_port = parse(
            "[[hosts]]\nhostname = \"gpu-01\"\nport = 0\nusername = \"u\"\npassword = \"x\"\n",
        )
        .unwrap_err();
        assert!(zero_port.to_string().contains("port must be non-zero"));
    }

    #[test]
    fn test_missing_password_is_parse_error() {
        let err = parse("[[hosts]]\nhostname = \"gpu-01\"\nusername = \"u\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_hosts("/nonexistent/gpuwatch/hosts.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
