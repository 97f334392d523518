use std::time::Duration;

use pretty_assertions::assert_eq;
use shieldbox_config::{ConfigError, FailurePolicy, ShieldConfig};

#[test]
fn test_full_config_deserialize() {
    let yaml = r#"
debug: false
rate_limit:
  default_limit: 100
  endpoints:
    news: 30
    cve: 10
  trusted_header: x-real-ip
  failure_policy: closed
cache:
  default_ttl: 10m
  ttls:
    news: 15m
    cve: 6h
http:
  timeout: 5s
  connect_timeout: 2s
  verify_tls: false
  max_redirects: 3
  user_agent: portfolio/2.0
storage:
  cache_dir: /var/lib/portfolio/cache
  rate_limit_dir: /var/lib/portfolio/ratelimit
  sweep_probability: 0.05
"#;

    let config = ShieldConfig::from_yaml_str(yaml).expect("failed to deserialize");

    assert_eq!(config.rate_limit("news"), 30);
    assert_eq!(config.rate_limit("cve"), 10);
    assert_eq!(config.rate_limit("ping"), 100);
    assert_eq!(config.rate_limit.trusted_header, "x-real-ip");
    assert_eq!(config.rate_limit.failure_policy, FailurePolicy::Closed);
    assert_eq!(config.cache_ttl("news"), Duration::from_secs(15 * 60));
    assert_eq!(config.cache_ttl("cve"), Duration::from_secs(6 * 3600));
    assert_eq!(config.cache_ttl("other"), Duration::from_secs(600));
    assert_eq!(config.http.timeout, Duration::from_secs(5));
    assert_eq!(config.http.connect_timeout, Duration::from_secs(2));
    assert!(!config.http.verify_tls);
    assert_eq!(config.http.max_redirects, 3);
    assert_eq!(config.http.user_agent, "portfolio/2.0");
    assert_eq!(
        config.storage.cache_dir.as_deref(),
        Some(std::path::Path::new("/var/lib/portfolio/cache"))
    );
    assert_eq!(config.storage.sweep_probability, 0.05);
    assert!(!config.is_debug());
}

#[test]
fn test_empty_document_uses_defaults() {
    let config = ShieldConfig::from_yaml_str("debug: false").unwrap();

    assert_eq!(config.rate_limit("anything"), 60);
    assert_eq!(config.rate_limit.trusted_header, "cf-connecting-ip");
    assert_eq!(config.rate_limit.failure_policy, FailurePolicy::Open);
    assert_eq!(config.cache_ttl("anything"), Duration::from_secs(300));
    assert_eq!(config.http.timeout, Duration::from_secs(30));
    assert_eq!(config.http.connect_timeout, Duration::from_secs(10));
    assert!(config.http.verify_tls);
    assert_eq!(config.storage.cache_dir, None);
    assert_eq!(config.storage.sweep_probability, 0.01);
}

#[test]
fn test_get_reads_dotted_settings() {
    let yaml = r#"
settings:
  server:
    bind: 0.0.0.0:9000
  news:
    feed_url: https://example.com/feed.json
    max_items: 25
"#;
    let config = ShieldConfig::from_yaml_str(yaml).unwrap();

    assert_eq!(
        config.get("news.feed_url", String::new()),
        "https://example.com/feed.json"
    );
    assert_eq!(config.get("news.max_items", 10u32), 25);
    assert_eq!(
        config.get("server.bind", "127.0.0.1:8080".to_owned()),
        "0.0.0.0:9000"
    );
    // Missing path and wrong type both fall back to the default.
    assert_eq!(config.get("news.missing", 7u32), 7);
    assert_eq!(config.get("news.feed_url", 3u32), 3);
    assert!(!config.get("", false));
}

#[test]
fn test_rejects_out_of_range_sweep_probability() {
    let yaml = r#"
storage:
  sweep_probability: 1.5
"#;
    let result = ShieldConfig::from_yaml_str(yaml);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_rejects_zero_ttl() {
    let yaml = r#"
cache:
  ttls:
    news: 0s
"#;
    let result = ShieldConfig::from_yaml_str(yaml);
    match result {
        Err(ConfigError::Invalid(message)) => assert!(message.contains("news")),
        other => panic!("expected invalid configuration, got {other:?}"),
    }
}

#[test]
fn test_rejects_unknown_failure_policy() {
    let yaml = r#"
rate_limit:
  failure_policy: sometimes
"#;
    let result = ShieldConfig::from_yaml_str(yaml);
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shield.yaml");
    std::fs::write(&path, "debug: true\n").unwrap();

    let config = ShieldConfig::from_path(&path).unwrap();
    assert!(config.is_debug());

    let missing = ShieldConfig::from_path(dir.path().join("missing.yaml"));
    assert!(matches!(missing, Err(ConfigError::Io { .. })));
}
