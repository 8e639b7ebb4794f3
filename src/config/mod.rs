// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config = parse_config(&contents, is_yaml(path))?;
    config.validate()?;
    Ok(config)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn parse_config(contents: &str, yaml: bool) -> Result<Config> {
    let config = if yaml {
        serde_yaml::from_str(contents).context("Failed to parse YAML config")?
    } else {
        serde_json::from_str(contents).context("Failed to parse JSON config")?
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Endpoint;
    use std::time::Duration;

    #[test]
    fn parses_node_yaml_with_defaults() {
        let config = parse_config(
            "role: node\nlisten: 127.0.0.1:9601\npeers:\n  - localhost:9602\n  - localhost:9603\n",
            true,
        )
        .unwrap();

        let Config::Node(node) = config else {
            panic!("expected a node config");
        };
        assert_eq!(node.listen.port(), 9601);
        assert_eq!(
            node.peers,
            vec![Endpoint::new("localhost", 9602), Endpoint::new("localhost", 9603)]
        );
        assert_eq!(node.replication.timeout(), Duration::from_millis(2000));
        assert!(!node.metrics.enabled);
    }

    #[test]
    fn parses_balancer_json() {
        let config = parse_config(
            r#"{
                "role": "balancer",
                "listen": "0.0.0.0:9500",
                "backends": ["localhost:9501", "localhost:9502"],
                "health_check": { "interval_ms": 1000 },
                "metrics": { "enabled": true, "port": 9900 }
            }"#,
            false,
        )
        .unwrap();
        config.validate().unwrap();

        let Config::Balancer(balancer) = config else {
            panic!("expected a balancer config");
        };
        assert_eq!(balancer.backends.len(), 2);
        assert_eq!(balancer.health_check.interval(), Duration::from_secs(1));
        assert_eq!(balancer.health_check.path, "/health");
        assert_eq!(balancer.forwarding.connect_timeout(), Duration::from_secs(5));
        assert_eq!(balancer.metrics.port, 9900);
        assert_eq!(balancer.metrics.path, "/metrics");
    }

    #[test]
    fn rejects_unknown_role_and_bad_endpoints() {
        assert!(parse_config("role: proxy\nlisten: 127.0.0.1:1\n", true).is_err());
        assert!(parse_config(
            "role: node\nlisten: 127.0.0.1:1\npeers: [\"no-port\"]\n",
            true
        )
        .is_err());
    }

    #[test]
    fn validation_catches_empty_and_duplicate_backends() {
        let mut balancer = BalancerConfig::new("127.0.0.1:9500".parse().unwrap(), vec![]);
        assert!(matches!(
            Config::Balancer(balancer.clone()).validate(),
            Err(ConfigError::NoBackends)
        ));

        balancer.backends = vec![Endpoint::new("a", 1), Endpoint::new("a", 1)];
        assert!(matches!(
            Config::Balancer(balancer.clone()).validate(),
            Err(ConfigError::DuplicateEndpoint(_))
        ));

        balancer.backends = vec![Endpoint::new("a", 1)];
        balancer.health_check.interval_ms = 0;
        assert!(matches!(
            Config::Balancer(balancer).validate(),
            Err(ConfigError::ZeroDuration("health_check.interval_ms"))
        ));
    }

    #[test]
    fn validation_catches_duplicate_peers() {
        let mut node = NodeConfig::new("127.0.0.1:9601".parse().unwrap(), vec![]);
        node.peers = vec![Endpoint::new("b", 2), Endpoint::new("b", 2)];
        assert!(matches!(
            Config::Node(node).validate(),
            Err(ConfigError::DuplicateEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn load_config_reads_from_disk() {
        let path = std::env::temp_dir().join(format!("kv-balancer-{}.yaml", std::process::id()));
        tokio::fs::write(&path, "role: node\nlisten: 127.0.0.1:9700\n")
            .await
            .unwrap();

        let config = load_config(&path).await.unwrap();
        assert!(matches!(config, Config::Node(_)));
        assert_eq!(config.listen().port(), 9700);

        let _ = tokio::fs::remove_file(&path).await;
        assert!(load_config(&path).await.is_err());
    }
}
