#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serial_test::serial;

    use crate::env::{load_env_files, AppConfig, EnvFile};

    const VARS: [&str; 4] = [
        "DATABASE_URL",
        "SESSION_HOURS",
        "REMEMBER_ME_DAYS",
        "SESSION_CLEANUP_INTERVAL_SECS",
    ];

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        temp_env::with_vars_unset(VARS, || {
            let config = AppConfig::from_env().expect("defaults should load");
            assert_eq!(config, AppConfig::default());
            assert_eq!(config.session_lifetime(false), Duration::hours(1));
            assert_eq!(config.session_lifetime(true), Duration::days(30));
        });
    }

    #[test]
    #[serial]
    fn test_reads_overrides() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("sqlite::memory:")),
                ("SESSION_HOURS", Some("4")),
                ("REMEMBER_ME_DAYS", Some(" 7 ")),
                ("SESSION_CLEANUP_INTERVAL_SECS", Some("60")),
            ],
            || {
                let config = AppConfig::from_env().expect("overrides should load");
                assert_eq!(config.database_url, "sqlite::memory:");
                assert_eq!(config.session_hours, 4);
                assert_eq!(config.remember_me_days, 7);
                assert_eq!(config.session_cleanup_interval_secs, 60);
            },
        );
    }

    #[test]
    #[serial]
    fn test_empty_database_url_falls_back() {
        temp_env::with_var("DATABASE_URL", Some(""), || {
            let config = AppConfig::from_env().expect("config should load");
            assert_eq!(config.database_url, AppConfig::default().database_url);
        });
    }

    #[test]
    #[serial]
    fn test_rejects_non_numeric_values() {
        temp_env::with_var("SESSION_HOURS", Some("soon"), || {
            let err = AppConfig::from_env().expect_err("non-numeric hours must fail");
            assert!(err.to_string().contains("SESSION_HOURS"));
        });
    }

    #[test]
    #[serial]
    fn test_rejects_out_of_range_lifetimes() {
        let cases = [
            ("SESSION_HOURS", "0"),
            ("SESSION_HOURS", "-5"),
            ("SESSION_HOURS", "9223372036854775807"),
            ("REMEMBER_ME_DAYS", "-1"),
            ("REMEMBER_ME_DAYS", "4611686018427387903"),
        ];

        for (name, value) in cases {
            temp_env::with_vars_unset(VARS, || {
                temp_env::with_var(name, Some(value), || {
                    let err = AppConfig::from_env()
                        .expect_err("out-of-range lifetime must fail");
                    assert!(
                        err.to_string().contains(name),
                        "{}={} gave unexpected error: {}",
                        name,
                        value,
                        err
                    );
                });
            });
        }
    }

    #[test]
    fn test_session_lifetime_never_panics() {
        let config = AppConfig {
            session_hours: -5,
            remember_me_days: i64::MAX / 2,
            ..AppConfig::default()
        };

        assert_eq!(config.session_lifetime(false), Duration::hours(1));
        assert_eq!(config.session_lifetime(true), Duration::days(3650));
    }

    #[test]
    #[serial]
    fn test_env_files_populate_telemetry_settings() {
        let dir = std::env::temp_dir().join(format!("habit-tracker-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let present = dir.join("common.env");
        let missing = dir.join("missing.env");
        std::fs::write(
            &present,
            "OTEL_EXPORTER_OTLP_ENDPOINT=http://collector:4317\nSESSION_HOURS=6\n",
        )
        .unwrap();

        let present_path = present.to_string_lossy().to_string();
        let missing_path = missing.to_string_lossy().to_string();

        temp_env::with_vars_unset(["OTEL_EXPORTER_OTLP_ENDPOINT", "SESSION_HOURS"], || {
            let files = load_env_files(&[present_path.as_str(), missing_path.as_str()])
                .expect("env files should load");

            assert_eq!(
                files,
                vec![
                    EnvFile {
                        path: present_path.clone(),
                        loaded: true,
                    },
                    EnvFile {
                        path: missing_path.clone(),
                        loaded: false,
                    },
                ]
            );
            assert_eq!(
                std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").as_deref(),
                Ok("http://collector:4317")
            );
            assert_eq!(AppConfig::from_env().unwrap().session_hours, 6);
        });

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
