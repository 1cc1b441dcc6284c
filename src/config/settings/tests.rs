use super::*;
use std::collections::HashMap;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.service.flavor, ApiFlavor::Azure);
    assert_eq!(config.service.embedding_model, "text-embedding-3-small");
    assert_eq!(config.service.api_key_env, "AZURE_OPENAI_KEY");
    assert_eq!(config.dataset.path, PathBuf::from("process info ai.xlsx"));
    assert_eq!(config.retrieval.max_neighbors, 5);
    assert_eq!(config.retrieval.top_k, 5);
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.service.endpoint = "ftp://files.example.com".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.service.endpoint = "not a url".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidUrl(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.service.chat_model = "  ".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.service.timeout_seconds = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.dataset.path = PathBuf::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 6;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTopK(6, 5))
    ));

    let mut invalid_config = config;
    invalid_config.retrieval.max_neighbors = 0;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn api_version_only_required_for_azure() {
    let mut config = Config::default();
    config.service.api_version = String::new();
    assert!(config.validate().is_err());

    config.service.flavor = ApiFlavor::OpenAi;
    assert!(config.validate().is_ok());
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let partial = r#"
        [service]
        flavor = "openai"
        endpoint = "http://localhost:1234"

        [retrieval]
        top_k = 3
    "#;

    let config: Config = toml::from_str(partial).expect("should parse partial toml");
    assert_eq!(config.service.flavor, ApiFlavor::OpenAi);
    assert_eq!(config.service.chat_model, "RPA-Test-Nano");
    assert_eq!(config.retrieval.top_k, 3);
    assert_eq!(config.retrieval.max_neighbors, 5);
    assert_eq!(config.dataset, DatasetConfig::default());
}

#[test]
#[serial]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load defaults");
    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.retrieval, RetrievalConfig::default());
}

#[test]
#[serial]
fn save_then_load() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_dir = temp_dir.path().join("nested");

    let mut config = Config {
        base_dir: config_dir.clone(),
        ..Default::default()
    };
    config.dataset.path = PathBuf::from("data/processes.csv");
    config.retrieval.top_k = 2;
    config.save().expect("should save config");

    assert!(config_dir.join("config.toml").exists());

    let loaded = Config::load(&config_dir).expect("should load saved config");
    assert_eq!(loaded.dataset.path, PathBuf::from("data/processes.csv"));
    assert_eq!(loaded.retrieval.top_k, 2);
}

#[test]
#[serial]
fn load_rejects_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[retrieval]\nmax_neighbors = 500\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn overrides_replace_endpoint_and_version() {
    let env: HashMap<&str, &str> = HashMap::from([
        (ENDPOINT_ENV, "https://override.openai.azure.com"),
        (API_VERSION_ENV, "2025-01-01-preview"),
    ]);

    let mut config = Config::default();
    config.apply_overrides(|name| env.get(name).map(|value| (*value).to_string()));

    assert_eq!(config.service.endpoint, "https://override.openai.azure.com");
    assert_eq!(config.service.api_version, "2025-01-01-preview");
}

#[test]
fn blank_overrides_are_ignored() {
    let mut config = Config::default();
    config.apply_overrides(|_| Some("   ".to_string()));
    assert_eq!(config.service, ServiceConfig::default());
}

#[test]
fn setter_validation() {
    let mut service = ServiceConfig::default();
    assert!(service.set_endpoint("http://127.0.0.1:8080".to_string()).is_ok());
    assert!(service.set_endpoint("localhost".to_string()).is_err());
    assert_eq!(service.endpoint, "http://127.0.0.1:8080");

    assert!(service.set_embedding_model("embed".to_string()).is_ok());
    assert!(service.set_chat_model(String::new()).is_err());
    assert!(service.set_timeout_seconds(600).is_ok());
    assert!(service.set_timeout_seconds(601).is_err());

    let mut retrieval = RetrievalConfig::default();
    assert!(retrieval.set_max_neighbors(3).is_ok());
    assert_eq!(retrieval.top_k, 3);
    assert!(retrieval.set_top_k(4).is_err());
    assert!(retrieval.set_top_k(1).is_ok());
    assert!(retrieval.set_max_neighbors(101).is_err());
}

#[test]
fn error_display_messages() {
    let errors = vec![
        ConfigError::InvalidProtocol("ftp".to_string()),
        ConfigError::InvalidTimeout(0),
        ConfigError::InvalidMaxNeighbors(0),
        ConfigError::InvalidTopK(9, 5),
        ConfigError::InvalidUrl("invalid-url".to_string()),
    ];

    for error in errors {
        let message = format!("{error}");
        assert!(message.len() > 10);
    }
}
