//! `.env` values reach the figment chain through the process environment.

use std::io::Write;

use figment::Jail;
use sta_config::StaConfig;

#[test]
fn dotenv_file_values_are_visible_to_load() {
    Jail::expect_with(|jail| {
        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path).map_err(|e| e.to_string())?;
        writeln!(file, "STA_SERVICE__BASE_URL=http://dotenv.example/v1.1")
            .map_err(|e| e.to_string())?;

        dotenvy::from_path(&path).map_err(|e| e.to_string())?;
        let config = StaConfig::load().map_err(|e| e.to_string())?;
        assert_eq!(config.service.base_url, "http://dotenv.example/v1.1");
        assert!(config.require_service().is_ok());

        jail.set_env("STA_SERVICE__BASE_URL", "http://env.example/v1.1");
        let config = StaConfig::load().map_err(|e| e.to_string())?;
        assert_eq!(config.service.base_url, "http://env.example/v1.1");
        Ok(())
    });
}
