use std::fs;

use arcspi::{Error, Host, HostConfig, MemoryContext, SpiExecutor};
use tempfile::tempdir;

#[test]
fn test_load_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("host.json");
    fs::write(
        &path,
        r#"{ "max_connections": 2, "cache_arena_name": "PlanCache" }"#,
    )
    .unwrap();

    let config = HostConfig::load(&path).unwrap();
    assert_eq!(config.max_connections, 2);
    assert_eq!(config.cache_arena_name, "PlanCache");
    assert!(config.recycle_addresses);
}

#[test]
fn test_loaded_config_drives_host() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("host.json");
    fs::write(&path, r#"{ "max_connections": 1, "cache_arena_name": "PlanCache" }"#).unwrap();

    let host = Host::new(HostConfig::load(&path).unwrap());
    let outer = SpiExecutor::connect(&host).unwrap();
    let err = SpiExecutor::connect(&host).unwrap_err();
    assert!(matches!(err, Error::ConnectionLimit(1)));

    let mut plan = outer.plan::<()>("SELECT 1").unwrap();
    plan.keep().unwrap();
    let ctx = MemoryContext::for_pointer(&host, plan.handle()).unwrap();
    assert_eq!(ctx.parent(&host).unwrap().name(), "PlanCache");
}

#[test]
fn test_load_missing_file() {
    let dir = tempdir().unwrap();
    let err = HostConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, Error::IoError(_)));
}

#[test]
fn test_load_rejects_invalid() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("host.json");

    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(HostConfig::load(&path), Err(Error::Config(_))));

    fs::write(&path, r#"{ "max_connections": 0 }"#).unwrap();
    assert!(matches!(HostConfig::load(&path), Err(Error::Config(_))));
}
