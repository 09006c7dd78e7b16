use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use filesweeper::config::{Config, ENV_PREFIX};
use filesweeper::scanner::FileTypeFilter;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config.filter.file_type, FileTypeFilter::All);
    assert_eq!(config.optimization.fast_scan_size_mb, 4);
    assert_eq!(config.cache.max_age_hours, 24);
}

#[test]
fn test_env_overrides_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[optimization]
fast_scan_mode = false
fast_scan_size_mb = 2

[cache]
max_entries = 100
"#,
    )
    .unwrap();

    std::env::set_var("FSTEST_OPTIMIZATION__FAST_SCAN_MODE", "true");
    std::env::set_var("FSTEST_FILTER__FILE_TYPE", "video");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("FSTEST_").split("__"))
        .extract()
        .unwrap();

    std::env::remove_var("FSTEST_OPTIMIZATION__FAST_SCAN_MODE");
    std::env::remove_var("FSTEST_FILTER__FILE_TYPE");

    assert!(config.optimization.fast_scan_mode);
    assert_eq!(config.optimization.fast_scan_size_mb, 2);
    assert_eq!(config.filter.file_type, FileTypeFilter::Video);
    assert_eq!(config.cache.max_entries, 100);
    assert_eq!(config.cache.prune_to, 2000);
}

#[test]
fn test_load_from_path_reads_prefixed_env() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[filter]\nmin_size_kb = 8\n").unwrap();

    let var = format!("{ENV_PREFIX}FILTER__MAX_SIZE_KB");
    std::env::set_var(&var, "64");
    let config = Config::load_from_path(Some(&path));
    std::env::remove_var(&var);

    let config = config.unwrap();
    assert_eq!(config.filter.min_size_kb, 8);
    assert_eq!(config.filter.max_size_kb, 64);
}

#[test]
fn test_config_save_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.filter.file_type = FileTypeFilter::Image;
    config.optimization.fast_scan_mode = true;
    config.save(&path).unwrap();

    let saved = fs::read_to_string(&path).unwrap();
    assert!(saved.contains("file_type = \"image\""));
    assert!(saved.contains("fast_scan_mode = true"));
}

#[test]
fn test_config_invalid_value_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[filter]\nfile_type = \"spreadsheets\"\n").unwrap();

    let result: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract();
    assert!(result.is_err());
}
