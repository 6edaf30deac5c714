//! Tests for config module.

use super::*;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

// ==================== Duration parsing tests ====================

#[test]
fn test_parse_duration_seconds() {
    let d = duration::parse_duration("30s").unwrap();
    assert_eq!(d, Duration::from_secs(30));
}

#[test]
fn test_parse_duration_minutes() {
    let d = duration::parse_duration("5m").unwrap();
    assert_eq!(d, Duration::from_secs(300));
}

#[test]
fn test_parse_duration_milliseconds() {
    let d = duration::parse_duration("250ms").unwrap();
    assert_eq!(d, Duration::from_millis(250));
}

#[test]
fn test_parse_duration_bare_number_is_seconds() {
    let d = duration::parse_duration("2").unwrap();
    assert_eq!(d, Duration::from_secs(2));
}

#[test]
fn test_parse_duration_empty() {
    let d = duration::parse_duration("").unwrap();
    assert_eq!(d, Duration::ZERO);
}

#[test]
fn test_parse_duration_invalid_unit() {
    let result = duration::parse_duration("10x");
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("unknown duration unit"));
}

#[test]
fn test_parse_duration_out_of_range() {
    let result = duration::parse_duration("99999999999999999999999h");
    assert!(result.unwrap_err().contains("out of range"));
}

#[test]
fn test_out_of_range_duration_is_parse_error() {
    let yaml = minimal_valid_yaml() + "ingestion:\n  poll_interval: 99999999999999999999999h\n";
    assert!(matches!(from_yaml(&yaml), Err(ConfigError::Parse(_))));
}

#[test]
fn test_parse_duration_fractional() {
    let d = duration::parse_duration("1.5s").unwrap();
    assert_eq!(d, Duration::from_millis(1500));
}

// ==================== YAML field loading tests ====================

/// Parse config from YAML string (for testing).
fn from_yaml(yaml: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(yaml)?;
    Ok(config)
}

fn minimal_valid_yaml() -> String {
    r#"
app:
  name: spreadwatch
  env: development

venues:
  binance:
    enabled: true

instruments:
  - BTCUSDT
"#
    .to_string()
}

#[test]
fn test_load_app_fields() {
    let yaml = r#"
app:
  name: watcher
  env: production
  log_level: debug
  overview_interval: 30s

venues:
  binance:
    enabled: false

instruments:
  - ETHUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert_eq!(cfg.app.name, "watcher");
    assert_eq!(cfg.app.env, "production");
    assert_eq!(cfg.app.log_level, Some("debug".to_string()));
    assert_eq!(cfg.app.overview_interval, Duration::from_secs(30));
}

#[test]
fn test_load_venue_fields() {
    let yaml = r#"
app:
  name: test
  env: dev

venues:
  kraken:
    enabled: true
    kind: rest
    base_url: "http://localhost:9000"
    rate_limit: 60
    symbols:
      BTCUSDT: XBTUSDT
  binance:
    enabled: true
    kind: stream
    websocket:
      url: "wss://example.test/ws"
      ping_interval: 20s
      reconnect_delay: 1s
      max_reconnect_delay: 30s
      max_retries: 5
      cooldown: 1m
  sim:
    enabled: true
    kind: simulated
    price_offset: -30

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let kraken = cfg.venues.get("kraken").unwrap();
    assert!(kraken.enabled);
    assert_eq!(kraken.kind, VenueKind::Rest);
    assert_eq!(kraken.base_url.as_deref(), Some("http://localhost:9000"));
    assert_eq!(kraken.rate_limit, Some(60));
    assert_eq!(kraken.symbols.get("BTCUSDT").map(String::as_str), Some("XBTUSDT"));

    let binance = cfg.venues.get("binance").unwrap();
    assert_eq!(binance.kind, VenueKind::Stream);
    let ws = binance.websocket.as_ref().unwrap();
    assert_eq!(ws.url.as_deref(), Some("wss://example.test/ws"));
    assert_eq!(ws.ping_interval, Duration::from_secs(20));
    assert_eq!(ws.reconnect_delay, Duration::from_secs(1));
    assert_eq!(ws.max_reconnect_delay, Duration::from_secs(30));
    assert_eq!(ws.max_retries, Some(5));
    assert_eq!(ws.cooldown, Duration::from_secs(60));

    let sim = cfg.venues.get("sim").unwrap();
    assert_eq!(sim.kind, VenueKind::Simulated);
    assert_eq!(sim.price_offset, Some(-30.0));
}

#[test]
fn test_venue_kind_defaults_to_rest() {
    let cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    let binance = cfg.venues.get("binance").unwrap();
    assert_eq!(binance.kind, VenueKind::Rest);
    assert!(binance.symbols.is_empty());
    assert!(binance.websocket.is_none());
}

#[test]
fn test_load_detector_fields() {
    let yaml = r#"
app:
  name: test
  env: dev

venues:
  ex:
    enabled: false

detector:
  min_spread_percent: 0.75
  reference_volume: 0.25
  dedup_window: 10s
  spread_delta: 0.05
  id_bucket: 500ms

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let det = cfg.detector.unwrap();
    assert_eq!(det.min_spread_percent, Some(0.75));
    assert_eq!(det.reference_volume, Some(0.25));
    assert_eq!(det.dedup_window, Duration::from_secs(10));
    assert_eq!(det.spread_delta, Some(0.05));
    assert_eq!(det.id_bucket, Duration::from_millis(500));
}

#[test]
fn test_load_ingestion_ledger_feed_fields() {
    let yaml = r#"
app:
  name: test
  env: dev

venues:
  ex:
    enabled: false

ingestion:
  poll_interval: 2s
  fetch_timeout: 750ms
  queue_size: 64

ledger:
  capacity: 20

feed:
  subscriber_queue: 8

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let ing = cfg.ingestion.unwrap();
    assert_eq!(ing.poll_interval, Duration::from_secs(2));
    assert_eq!(ing.fetch_timeout, Duration::from_millis(750));
    assert_eq!(ing.queue_size, Some(64));
    assert_eq!(cfg.ledger.unwrap().capacity, Some(20));
    assert_eq!(cfg.feed.unwrap().subscriber_queue, Some(8));
}

#[test]
fn test_load_simulation_storage_server_fields() {
    let yaml = r#"
app:
  name: test
  env: dev

venues:
  ex:
    enabled: false

simulation:
  variance: 0.01
  noise: 5
  base_prices:
    BTCUSDT: 67500
    ETHUSDT: 3450

storage:
  enabled: true
  path: "data.db"
  max_connections: 2
  restore_max_age: 10m

server:
  enabled: true
  bind: "127.0.0.1:9090"

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let sim = cfg.simulation.unwrap();
    assert_eq!(sim.variance, Some(0.01));
    assert_eq!(sim.noise, Some(5.0));
    assert_eq!(sim.base_prices.get("BTCUSDT"), Some(&67500.0));
    assert_eq!(sim.base_prices.get("ETHUSDT"), Some(&3450.0));

    let storage = cfg.storage.unwrap();
    assert!(storage.enabled);
    assert_eq!(storage.path, Some("data.db".to_string()));
    assert_eq!(storage.max_connections, Some(2));
    assert_eq!(storage.restore_max_age, Duration::from_secs(600));

    let server = cfg.server.unwrap();
    assert!(server.enabled);
    assert_eq!(server.bind.as_deref(), Some("127.0.0.1:9090"));
}

#[test]
fn test_enabled_venues_sorted() {
    let yaml = r#"
app:
  name: test
  env: dev

venues:
  kraken:
    enabled: true
  binance:
    enabled: true
  coinbase:
    enabled: false

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    assert_eq!(cfg.enabled_venues(), vec!["binance", "kraken"]);
}

// ==================== Environment override tests ====================

#[test]
fn test_apply_env_overrides() {
    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();

    // Set env vars (unsafe because modifying env is not thread-safe)
    unsafe {
        env::set_var(ENV_THRESHOLD, "0.8");
        env::set_var(ENV_FETCH_INTERVAL, "3");
        env::set_var(ENV_DATABASE_PATH, "override.db");
    }

    let result = cfg.apply_env_overrides();

    // Cleanup
    unsafe {
        env::remove_var(ENV_THRESHOLD);
        env::remove_var(ENV_FETCH_INTERVAL);
        env::remove_var(ENV_DATABASE_PATH);
    }

    result.unwrap();
    assert_eq!(cfg.detector.unwrap().min_spread_percent, Some(0.8));
    assert_eq!(cfg.ingestion.unwrap().poll_interval, Duration::from_secs(3));
    let storage = cfg.storage.unwrap();
    assert!(storage.enabled);
    assert_eq!(storage.path.as_deref(), Some("override.db"));

    // Kept in this test: env vars are process-wide
    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    unsafe {
        env::set_var(ENV_FETCH_INTERVAL, "1e300");
    }
    let result = cfg.apply_env_overrides();
    unsafe {
        env::remove_var(ENV_FETCH_INTERVAL);
    }
    assert!(matches!(
        result,
        Err(ConfigError::Env { ref name, .. }) if name == ENV_FETCH_INTERVAL
    ));
}

// ==================== Validation tests ====================

#[test]
fn test_validate_empty_app_name() {
    let yaml = r#"
app:
  name: ""
  env: dev

venues:
  ex:
    enabled: true

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let result = cfg.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("app.name is required"));
}

#[test]
fn test_validate_empty_instruments() {
    let yaml = r#"
app:
  name: test
  env: dev

venues:
  ex:
    enabled: true

instruments: []
"#;
    let cfg = from_yaml(yaml).unwrap();

    let result = cfg.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("at least one instrument is required"));
}

#[test]
fn test_validate_no_enabled_venues() {
    let yaml = r#"
app:
  name: test
  env: dev

venues:
  ex:
    enabled: false

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let result = cfg.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("at least one venue must be enabled"));
}

#[test]
fn test_validate_simulated_venue_in_production() {
    let yaml = r#"
app:
  name: test
  env: production

venues:
  sim:
    enabled: true
    kind: simulated

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let result = cfg.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("simulated venues are not allowed in production"));
}

#[test]
fn test_validate_stream_venue_requires_websocket() {
    let yaml = r#"
app:
  name: test
  env: dev

venues:
  binance:
    enabled: true
    kind: stream

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let result = cfg.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("websocket settings are required"));
}

#[test]
fn test_validate_non_positive_threshold() {
    let yaml = r#"
app:
  name: test
  env: dev

venues:
  ex:
    enabled: true

detector:
  min_spread_percent: 0

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let result = cfg.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("min_spread_percent must be positive"));
}

#[test]
fn test_validate_negative_reference_volume() {
    let yaml = r#"
app:
  name: test
  env: dev

venues:
  ex:
    enabled: true

detector:
  reference_volume: -0.1

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let result = cfg.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("reference_volume must be positive"));
}

#[test]
fn test_validate_zero_ledger_capacity() {
    let yaml = r#"
app:
  name: test
  env: dev

venues:
  ex:
    enabled: true

ledger:
  capacity: 0

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let result = cfg.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("ledger.capacity must be positive"));
}

#[test]
fn test_validate_simulated_venue_in_development() {
    let yaml = r#"
app:
  name: test
  env: development

venues:
  sim:
    enabled: true
    kind: simulated

instruments:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let result = cfg.validate();
    assert!(result.is_ok(), "Expected simulated venues to be accepted outside production");
}

// ==================== File loading tests ====================

#[test]
fn test_load_from_file() {
    let yaml = minimal_valid_yaml();

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let cfg = Config::load(file.path().to_str().unwrap()).unwrap();

    assert_eq!(cfg.app.name, "spreadwatch");
    assert_eq!(cfg.app.env, "development");
    assert_eq!(cfg.instruments, vec!["BTCUSDT"]);
    assert!(cfg.venues.get("binance").unwrap().enabled);
}

#[test]
fn test_load_file_not_found() {
    let result = Config::load("nonexistent_config.yaml");
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("failed to read config file"));
}

#[test]
fn test_load_file_invalid_yaml() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"app: [not, a, map]").unwrap();

    let result = Config::load(file.path().to_str().unwrap());
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("failed to parse config"));
}
