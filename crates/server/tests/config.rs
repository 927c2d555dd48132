mod common;

use std::path::Path;

use anyhow::Context;
use common::{CONFIG_TOML, SCHEMA_JSON};
use jobboard_server::config::{AppMode, ConfigError, ServerConfig, SqlDialect};

#[test]
fn bundled_config_parses() -> anyhow::Result<()> {
    let config = ServerConfig::parse(SCHEMA_JSON, CONFIG_TOML, "config.toml")?;
    assert_eq!(config.app.mode, AppMode::Dev);
    assert_eq!(config.dialect()?, SqlDialect::Sqlite);
    assert_eq!(config.billing.annual_price_cents, 99900);
    assert_eq!(config.billing.duration_days, 365);
    assert_eq!(config.matching.max_retries, 3);
    assert!(config.postgres.is_none());
    Ok(())
}

#[test]
fn unknown_keys_are_rejected_by_schema() {
    let content = format!("{CONFIG_TOML}\n[extras]\nflag = true\n");
    let err = ServerConfig::parse(SCHEMA_JSON, &content, "extra.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
}

#[test]
fn bad_dialect_is_rejected() {
    let content = CONFIG_TOML.replace("dialect = \"sqlite\"", "dialect = \"mysql\"");
    assert!(ServerConfig::parse(SCHEMA_JSON, &content, "dialect.toml").is_err());
}

#[test]
fn backoff_bounds_must_be_ordered() {
    let content = CONFIG_TOML.replace("backoff_max_ms = 8000", "backoff_max_ms = 100");
    let err = ServerConfig::parse(SCHEMA_JSON, &content, "backoff.toml").unwrap_err();
    assert!(err.to_string().contains("backoff_max_ms"), "{err}");
}

#[test]
fn postgres_dialect_needs_section() {
    let content = CONFIG_TOML.replace("dialect = \"sqlite\"", "dialect = \"postgres\"");
    let err = ServerConfig::parse(SCHEMA_JSON, &content, "pg.toml").unwrap_err();
    assert!(err.to_string().contains("postgres section missing"), "{err}");
}

#[test]
fn sqlite_path_is_relative_to_config_dir() {
    let config = common::test_config();
    let path = config.sqlite_path(Path::new("/srv/jobboard"));
    assert_eq!(path, Path::new("/srv/jobboard/jobboard.sqlite"));
}

#[tokio::test]
async fn load_reads_schema_next_to_config() -> anyhow::Result<()> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("res").join("config.toml");
    let config = ServerConfig::load(&path)
        .await
        .with_context(|| format!("loading {}", path.display()))?;
    assert_eq!(config.http.port, 8080);
    Ok(())
}
