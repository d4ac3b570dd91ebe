#[cfg(test)]
mod tests {
    use serial_test::serial;

    use crate::backend::AuthSettings;
    use crate::env::{Config, ConfigError, MAX_RESET_MINUTES, MAX_SESSION_HOURS};

    const KEYS: [&str; 6] = [
        "DATABASE_URL",
        "SESSION_HOURS",
        "PASSWORD_RESET_MINUTES",
        "OTEL_EXPORTER_OTLP_ENDPOINT",
        "OTEL_API_KEY",
        "DEPLOYMENT_ENVIRONMENT",
    ];

    /// Every config key unset except the given ones.
    fn vars<'a>(set: &[(&'a str, &'a str)]) -> Vec<(&'a str, Option<&'a str>)> {
        KEYS.iter()
            .map(|key| {
                let value = set.iter().find(|(k, _)| k == key).map(|(_, v)| *v);
                (*key, value)
            })
            .collect()
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let config = temp_env::with_vars(vars(&[("DATABASE_URL", "sqlite::memory:")]), Config::from_env)
            .expect("Config should load");

        assert_eq!(
            config,
            Config {
                database_url: "sqlite::memory:".to_string(),
                session_hours: 12,
                password_reset_minutes: 30,
                otlp_endpoint: None,
                otlp_api_key: None,
                deployment_environment: "develop".to_string(),
            }
        );

        let settings = AuthSettings::from_config(&config);
        assert_eq!(settings.session_ttl, chrono::TimeDelta::hours(12));
        assert_eq!(settings.reset_ttl, chrono::TimeDelta::minutes(30));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        let config = temp_env::with_vars(
            vars(&[
                ("DATABASE_URL", "sqlite://coach.db"),
                ("SESSION_HOURS", " 48 "),
                ("PASSWORD_RESET_MINUTES", "5"),
                ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
                ("OTEL_API_KEY", "  "),
                ("DEPLOYMENT_ENVIRONMENT", "production"),
            ]),
            Config::from_env,
        )
        .expect("Config should load");

        assert_eq!(config.session_hours, 48);
        assert_eq!(config.password_reset_minutes, 5);
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://localhost:4317"));
        assert_eq!(config.otlp_api_key, None);
        assert_eq!(config.deployment_environment, "production");
    }

    #[test]
    #[serial]
    fn test_missing_database_url() {
        let result = temp_env::with_vars(vars(&[]), Config::from_env);
        assert_eq!(result, Err(ConfigError::MissingVar("DATABASE_URL".to_string())));
    }

    #[test]
    #[serial]
    fn test_invalid_numbers() {
        for bad in ["0", "-3", "twelve"] {
            let result = temp_env::with_vars(
                vars(&[("DATABASE_URL", "sqlite::memory:"), ("SESSION_HOURS", bad)]),
                Config::from_env,
            );
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(ref key, _)) if key == "SESSION_HOURS"),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    #[serial]
    fn test_durations_are_bounded() {
        let session_limit = MAX_SESSION_HOURS.to_string();
        let reset_limit = MAX_RESET_MINUTES.to_string();
        let config = temp_env::with_vars(
            vars(&[
                ("DATABASE_URL", "sqlite::memory:"),
                ("SESSION_HOURS", session_limit.as_str()),
                ("PASSWORD_RESET_MINUTES", reset_limit.as_str()),
            ]),
            Config::from_env,
        )
        .expect("Limits themselves are accepted");
        let settings = AuthSettings::from_config(&config);
        assert_eq!(settings.session_ttl, chrono::TimeDelta::hours(MAX_SESSION_HOURS));

        for (key, value) in [
            ("SESSION_HOURS", "9223372036854775807"),
            ("SESSION_HOURS", "100000"),
            ("PASSWORD_RESET_MINUTES", "9223372036854775807"),
            ("PASSWORD_RESET_MINUTES", "1441"),
        ] {
            let result = temp_env::with_vars(
                vars(&[("DATABASE_URL", "sqlite::memory:"), (key, value)]),
                Config::from_env,
            );
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(ref k, _)) if k == key),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }
}
