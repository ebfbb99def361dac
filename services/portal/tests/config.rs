use portal_lib::config::{BackendKind, Config, ConfigError};
use std::collections::HashMap;
use std::time::Duration;

fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|name| vars.get(name).cloned())
}

#[test]
fn memory_backend_uses_defaults() {
    let config = load(&[("PORTAL_BACKEND", "memory")]).unwrap();
    assert_eq!(config.backend, BackendKind::Memory);
    assert!(config.firebase.is_none());
    assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
    assert_eq!(config.lesson_page_size, 24);
    assert_eq!(config.cache_ttl, None);
    assert_eq!(config.cache_generation, 0);
    assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    assert_eq!(config.allowed_origin, "http://localhost:3000");
    assert_eq!(config.client_idle_timeout, Duration::from_secs(1800));

    let settings = config.portal_settings();
    assert_eq!(settings.page_size, 24);
    assert_eq!(settings.cache_policy.ttl, None);
}

#[test]
fn firebase_backend_requires_project_settings() {
    let err = load(&[("FIREBASE_API_KEY", "k")]).unwrap_err();
    assert!(matches!(err, ConfigError::MissingVar(ref name) if name == "FIREBASE_PROJECT_ID"));

    let config = load(&[
        ("FIREBASE_API_KEY", "k"),
        ("FIREBASE_PROJECT_ID", "kids-portal"),
        ("FIREBASE_STORAGE_BUCKET", "kids-portal.appspot.com"),
    ])
    .unwrap();
    assert_eq!(config.backend, BackendKind::Firebase);
    let firebase = config.firebase.unwrap();
    assert_eq!(firebase.project_id, "kids-portal");
    assert_eq!(firebase.storage_bucket, "kids-portal.appspot.com");
}

#[test]
fn cache_settings_flow_into_the_portal() {
    let config = load(&[
        ("PORTAL_BACKEND", "Memory"),
        ("CACHE_TTL_SECS", "300"),
        ("CACHE_GENERATION", "3"),
        ("LESSON_PAGE_SIZE", "12"),
    ])
    .unwrap();
    let settings = config.portal_settings();
    assert_eq!(settings.cache_policy.ttl, Some(Duration::from_secs(300)));
    assert_eq!(settings.cache_policy.generation, 3);
    assert_eq!(settings.page_size, 12);
}

#[test]
fn malformed_values_name_their_variable() {
    for (name, value) in [
        ("BIND_ADDRESS", "nowhere"),
        ("RUST_LOG", "chatty"),
        ("PORTAL_BACKEND", "sqlite"),
        ("LESSON_PAGE_SIZE", "0"),
        ("CACHE_TTL_SECS", "-1"),
        ("CLIENT_IDLE_SECS", "0"),
    ] {
        let err = load(&[("PORTAL_BACKEND", "memory"), (name, value)]).unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, name),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
