//! Integration tests for the afpi-crm binary
//!
//! These drive the CLI end to end against throwaway SQLite files.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Environment variables that would otherwise leak into the tests.
const CRM_ENV: &[&str] = &[
    "APP_NAME",
    "APP_ENV",
    "APP_HOST",
    "APP_PORT",
    "FRONTEND_URL",
    "DATABASE_PATH",
    "JWT_SECRET",
    "JWT_TTL_MINUTES",
    "SEED_ADMIN_EMAIL",
    "SEED_ADMIN_PASSWORD",
    "SEED_ON_STARTUP",
    "LOG_FORMAT",
    "LOG_DIR",
];

/// Helper to create an afpi-crm Command running inside `dir`
fn crm(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("afpi-crm");
    cmd.current_dir(dir.path());
    for key in CRM_ENV {
        cmd.env_remove(key);
    }
    cmd
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("init-db"))
            .stdout(predicate::str::contains("seed"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_unknown_command_fails() {
        let dir = TempDir::new().unwrap();
        crm(&dir).arg("migrate").assert().failure();
    }
}

// =============================================================================
// Database Commands
// =============================================================================

mod database {
    use super::*;

    #[test]
    fn test_init_db_creates_file_and_directories() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .args(["init-db", "--db-path", "data/nested/crm.db"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Database initialized"));

        assert!(dir.path().join("data/nested/crm.db").exists());
    }

    #[test]
    fn test_seed_reports_created_records() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .args(["seed", "--db-path", "crm.db"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "77 permissions, 7 roles, 5 localisations created; admin created",
            ))
            .stdout(predicate::str::contains("admin@afpi-crm.fr"));
    }

    #[test]
    fn test_seed_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .args(["seed", "--db-path", "crm.db"])
            .assert()
            .success();

        crm(&dir)
            .args(["seed", "--db-path", "crm.db"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "0 permissions, 0 roles, 0 localisations created; admin already present",
            ));
    }

    #[test]
    fn test_database_path_from_environment() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .env("DATABASE_PATH", "from-env.db")
            .arg("init-db")
            .assert()
            .success();

        assert!(dir.path().join("from-env.db").exists());
    }

    #[test]
    fn test_seed_uses_configured_admin() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("crm.toml"),
            "[seed]\nadmin_email = \"direction@afpi.fr\"\nadmin_password = \"Direction2025!\"\n",
        )
        .unwrap();

        crm(&dir)
            .args(["seed", "--db-path", "crm.db"])
            .assert()
            .success()
            .stdout(predicate::str::contains("direction@afpi.fr"));
    }
}

// =============================================================================
// Configuration Commands
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_show_masks_secrets() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .env("JWT_SECRET", "a-very-secret-value-that-is-long-enough")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 3000"))
            .stdout(predicate::str::contains("a-very-secret-value").not())
            .stdout(predicate::str::contains("Admin123!").not());
    }

    #[test]
    fn test_config_validate_defaults() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("development secret"));
    }

    #[test]
    fn test_config_validate_rejects_short_secret() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .env("JWT_SECRET", "short")
            .args(["config", "validate"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("auth.jwt_secret is 5 bytes"));
    }

    #[test]
    fn test_config_validate_requires_secret_in_production() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .env("APP_ENV", "production")
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("JWT_SECRET must be set"));
    }

    #[test]
    fn test_config_init_writes_file() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created crm.toml"));

        let content = fs::read_to_string(dir.path().join("crm.toml")).unwrap();
        assert!(content.contains("[server]"));

        crm(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_explicit_missing_config_fails() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .args(["--config", "missing.toml", "config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read config file"));
    }

    #[test]
    fn test_invalid_port_in_environment_fails() {
        let dir = TempDir::new().unwrap();
        crm(&dir)
            .env("APP_PORT", "not-a-port")
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid APP_PORT"));
    }
}
