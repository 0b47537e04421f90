//! Table-driven tests for configuration loading and validation.

use photoscan::config::{load_config, load_config_from_str};

struct ConfigTestCase {
    name: &'static str,
    config_json: &'static str,
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{ "version": "1.0", "work_directory": "/work" }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_docker_tool",
        config_json: r#"{
            "version": "1.0",
            "work_directory": "/work",
            "worker_count": 2,
            "tool": { "program": "colmap", "docker_image": "colmap/colmap:latest" },
            "pipeline": { "stage_timeout_secs": 900, "single_camera": false },
            "mesh": { "normalize_bound": 1.5, "precision": 4 },
            "logging": { "filter": "photoscan=debug,warn", "format": "json" }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_json: r#"{ "version": "2.0", "work_directory": "/work" }"#,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "missing_work_directory",
        config_json: r#"{ "version": "1.0" }"#,
        should_succeed: false,
        expected_error: Some("work_directory"),
    },
    ConfigTestCase {
        name: "zero_workers",
        config_json: r#"{ "version": "1.0", "work_directory": "/work", "worker_count": 0 }"#,
        should_succeed: false,
        expected_error: Some("worker_count"),
    },
    ConfigTestCase {
        name: "empty_program",
        config_json: r#"{ "version": "1.0", "work_directory": "/work", "tool": { "program": " " } }"#,
        should_succeed: false,
        expected_error: Some("tool.program"),
    },
    ConfigTestCase {
        name: "zero_stage_timeout",
        config_json: r#"{ "version": "1.0", "work_directory": "/work", "pipeline": { "stage_timeout_secs": 0 } }"#,
        should_succeed: false,
        expected_error: Some("stage_timeout_secs"),
    },
    ConfigTestCase {
        name: "negative_normalize_bound",
        config_json: r#"{ "version": "1.0", "work_directory": "/work", "mesh": { "normalize_bound": -1.0 } }"#,
        should_succeed: false,
        expected_error: Some("normalize_bound"),
    },
    ConfigTestCase {
        name: "zero_retention",
        config_json: r#"{ "version": "1.0", "work_directory": "/work", "retention_days": 0 }"#,
        should_succeed: false,
        expected_error: Some("retention_days"),
    },
    ConfigTestCase {
        name: "malformed_json",
        config_json: r#"{ "version": "1.0", "work_directory": "#,
        should_succeed: false,
        expected_error: None,
    },
];

#[test]
fn test_config_loading_table() {
    for case in CONFIG_TESTS {
        let result = load_config_from_str(case.config_json);

        if case.should_succeed {
            assert!(
                result.is_ok(),
                "case '{}' should load, got {:?}",
                case.name,
                result.err()
            );
            continue;
        }

        let err = match result {
            Ok(_) => panic!("case '{}' should fail", case.name),
            Err(e) => e.to_string(),
        };
        if let Some(expected) = case.expected_error {
            assert!(
                err.contains(expected),
                "case '{}': expected error containing '{}', got '{}'",
                case.name,
                expected,
                err
            );
        }
    }
}

#[test]
fn test_load_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photoscan.json");
    std::fs::write(&path, CONFIG_TESTS[1].config_json).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.worker_count, 2);
    assert_eq!(config.mesh.precision, 4);
    assert!(!config.pipeline.single_camera);
}

#[test]
fn test_load_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(dir.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().contains("absent.json"));
}
