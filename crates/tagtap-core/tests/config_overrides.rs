//! Environment overrides for configuration.
//!
//! Kept in its own test binary: process environment is shared by every test in a binary,
//! and the unit tests in `config.rs` expect defaults.

use tagtap_core::{Config, MifareKey};

#[test]
fn environment_overrides_every_section() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("tagtap.toml");

    std::env::set_var("TAGTAP_RECORD__TEXT", "hello");
    std::env::set_var("TAGTAP_LEGACY__SECTOR", "2");
    std::env::set_var("TAGTAP_LEGACY__KEY", "000000000000");
    std::env::set_var("TAGTAP_DISPATCH__FOREGROUND_ON_START", "false");
    // Variables for other components share the prefix and are ignored.
    std::env::set_var("TAGTAP_LOG_LEVEL", "debug");

    let config = Config::load_or_default(&missing).unwrap();

    assert_eq!(config.record.text, "hello");
    assert_eq!(config.record.language, "en");
    assert_eq!(config.legacy.sector, 2);
    assert_eq!(config.legacy.key, "000000000000");
    let zero_key: MifareKey = [0; 6];
    assert_eq!(config.legacy.key_bytes().unwrap(), zero_key);
    assert!(!config.dispatch.foreground_on_start);

    // Overrides win over the file as well.
    std::fs::write(&missing, "[record]\ntext = \"from file\"\nlanguage = \"de\"\n").unwrap();
    let config = Config::load(&missing).unwrap();
    assert_eq!(config.record.text, "hello");
    assert_eq!(config.record.language, "de");

    // An override that fails validation is reported, not silently dropped.
    std::env::set_var("TAGTAP_LEGACY__KEY", "zz");
    assert!(Config::load_or_default(dir.path().join("absent.toml")).is_err());
}
