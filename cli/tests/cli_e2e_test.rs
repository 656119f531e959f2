use assert_cmd::{cargo_bin_cmd, Command};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn secrets_sync() -> Command {
    cargo_bin_cmd!("secrets-sync")
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

mod help_and_usage {
    use super::*;
    use predicates::prelude::predicate;

    #[test]
    fn test_help_lists_the_flags() {
        secrets_sync()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--file"))
            .stdout(predicate::str::contains("--dry-run"))
            .stdout(predicate::str::contains("--print-values"))
            .stdout(predicate::str::contains("--print-format"))
            .stdout(predicate::str::contains("--print-sync-details"));
    }

    #[test]
    fn test_version_flag() {
        secrets_sync()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("secrets-sync"));
    }

    #[test]
    fn test_missing_config_flag_is_a_usage_error() {
        secrets_sync().assert().failure().code(2);
    }
}

mod config_errors {
    use super::*;
    use predicates::prelude::predicate;

    #[test]
    fn test_unreadable_config_exits_2() {
        secrets_sync()
            .args(["-f", "/no/such/config.yaml"])
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("failed to load config"));
    }

    #[test]
    fn test_sink_referencing_unknown_source_exits_2() {
        let dir = TempDir::new().unwrap();
        let cfg = write(
            &dir,
            "cfg.yaml",
            "sources:\n  - name: app\n    type: env\nsinks:\n  - name: params\n    type: ssm\n    sources: [ghost]\n",
        );
        secrets_sync()
            .args(["-f", cfg.to_str().unwrap()])
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("ghost"));
    }

    #[test]
    fn test_invalid_ssm_type_exits_2() {
        let dir = TempDir::new().unwrap();
        let cfg = write(
            &dir,
            "cfg.yaml",
            "sinks:\n  - name: params\n    type: ssm\n    options:\n      type: StringList\n",
        );
        secrets_sync()
            .args(["-f", cfg.to_str().unwrap()])
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("SecureString"));
    }
}

mod dry_run_preview {
    use super::*;
    use predicates::prelude::predicate;

    fn preview_config(dir: &TempDir) -> PathBuf {
        write(dir, "defaults.yaml", "FEATURE_FLAG: false\n");
        write(dir, "dev.yaml", "FEATURE_FLAG: true\n");
        write(
            dir,
            "config.yaml",
            "sources:\n  - name: files\n    type: yaml\n    options:\n      files:\n        - defaults.yaml\n        - dev.yaml\nsinks:\n  - name: params\n    type: ssm\n    options:\n      prefix: /env/dev/\n    sources: [files]\n",
        )
    }

    #[test]
    fn test_json_preview_shows_the_layered_override() {
        let dir = TempDir::new().unwrap();
        let cfg = preview_config(&dir);

        let assert = secrets_sync()
            .args([
                "-f",
                cfg.to_str().unwrap(),
                "--dry-run",
                "--print-values",
                "--print-format",
                "json",
            ])
            .assert()
            .success();

        let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
        assert_eq!(parsed[0]["name"], "params");
        assert_eq!(parsed[0]["type"], "ssm");
        assert_eq!(parsed[0]["prefix"], "/env/dev/");
        assert_eq!(parsed[0]["items"][0]["name"], "/env/dev/FEATURE_FLAG");
        assert_eq!(parsed[0]["items"][0]["value"], "true");
    }

    #[test]
    fn test_list_preview_masks_values_by_default() {
        let dir = TempDir::new().unwrap();
        let cfg = preview_config(&dir);

        secrets_sync()
            .args(["-f", cfg.to_str().unwrap(), "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("/env/dev/FEATURE_FLAG=***"))
            .stdout(predicate::str::contains("--- Sink: params [ssm]"));
    }

    #[test]
    fn test_table_preview_renders_headers() {
        let dir = TempDir::new().unwrap();
        let cfg = preview_config(&dir);

        secrets_sync()
            .args([
                "-f",
                cfg.to_str().unwrap(),
                "--dry-run",
                "--print-values",
                "--print-format",
                "table",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Name"))
            .stdout(predicate::str::contains("/env/dev/FEATURE_FLAG"));
    }

    #[test]
    fn test_dry_run_with_failing_source_still_previews() {
        let dir = TempDir::new().unwrap();
        let cfg = write(
            &dir,
            "config.yaml",
            "sources:\n  - name: missing\n    type: yaml\n    options:\n      files: [nowhere.yaml]\nsinks:\n  - name: params\n    type: ssm\n    sources: [missing]\n",
        );

        secrets_sync()
            .args(["-f", cfg.to_str().unwrap(), "--dry-run", "--print-values"])
            .assert()
            .success()
            .stdout(predicate::str::contains("source 'missing' failed"));
    }

    #[test]
    fn test_failing_source_without_dry_run_fails() {
        let dir = TempDir::new().unwrap();
        let cfg = write(
            &dir,
            "config.yaml",
            "sources:\n  - name: missing\n    type: yaml\n    options:\n      files: [nowhere.yaml]\nsinks:\n  - name: params\n    type: ssm\n    sources: [missing]\n",
        );

        secrets_sync()
            .args(["-f", cfg.to_str().unwrap()])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("missing"));
    }
}
