use std::io::Write;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 8] = [
    "SHELLGATE_LOCAL_TIMEOUT",
    "SHELLGATE_REMOTE_TIMEOUT",
    "SHELLGATE_REMOTE_CONNECT_TIMEOUT",
    "SHELLGATE_LOCAL_ALLOWED_COMMANDS",
    "SHELLGATE_LOCAL_BLOCKED_COMMANDS",
    "SHELLGATE_REMOTE_BLOCKED_COMMANDS",
    "SHELLGATE_AUDIT_ENABLED",
    "SHELLGATE_AUDIT_DESTINATION",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn load_missing_file_uses_defaults() {
    clear_env();
    let config = Config::load(Path::new("/nonexistent/shellgate.toml")).unwrap();
    assert_eq!(config.local.timeout, 30);
    assert_eq!(config.remote.timeout, 30);
    assert_eq!(config.remote.connect_timeout, 10);
    assert_eq!(config.remote.port, 22);
    assert!(config.audit.enabled);
    assert_eq!(config.audit.destination, "stdout");
    config.validate().unwrap();
}

#[test]
#[serial]
fn load_full_file() {
    clear_env();
    let file = write_config(
        r#"
[local]
timeout = 45
blocked_commands = ["chmod"]

[local.allowed_commands]
cat = "print files"

[remote]
timeout = 90
port = 2222
max_output_chars = 5000

[audit]
destination = "/tmp/shellgate-audit.jsonl"
"#,
    );

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.local.timeout, 45);
    assert_eq!(config.local.blocked_commands, vec!["chmod"]);
    assert_eq!(config.local.allowed_commands["cat"], "print files");
    assert_eq!(config.remote.timeout, 90);
    assert_eq!(config.remote.port, 2222);
    assert_eq!(config.remote.max_output_chars, 5000);
    assert_eq!(config.remote.connect_timeout, 10);
    assert_eq!(config.audit.destination, "/tmp/shellgate-audit.jsonl");
}

#[test]
#[serial]
fn load_partial_file_keeps_other_sections_default() {
    clear_env();
    let file = write_config("[remote]\nconnect_timeout = 4\n");
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.remote.connect_timeout, 4);
    assert_eq!(config.local.timeout, 30);
    assert!(config.audit.enabled);
}

#[test]
#[serial]
fn load_invalid_toml_fails() {
    clear_env();
    let file = write_config("[local\ntimeout = ");
    let err = Config::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}

#[test]
#[serial]
fn load_wrong_type_fails() {
    clear_env();
    let file = write_config("[local]\ntimeout = \"soon\"\n");
    assert!(Config::load(file.path()).is_err());
}

#[test]
#[serial]
fn env_overrides_timeouts() {
    clear_env();
    unsafe {
        std::env::set_var("SHELLGATE_LOCAL_TIMEOUT", "5");
        std::env::set_var("SHELLGATE_REMOTE_TIMEOUT", "120");
        std::env::set_var("SHELLGATE_REMOTE_CONNECT_TIMEOUT", "3");
    }
    let config = Config::load(Path::new("/nonexistent/shellgate.toml")).unwrap();
    clear_env();

    assert_eq!(config.local.timeout, 5);
    assert_eq!(config.remote.timeout, 120);
    assert_eq!(config.remote.connect_timeout, 3);
}

#[test]
#[serial]
fn env_invalid_timeouts_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("SHELLGATE_LOCAL_TIMEOUT", "soon");
        std::env::set_var("SHELLGATE_REMOTE_TIMEOUT", "0");
    }
    let config = Config::load(Path::new("/nonexistent/shellgate.toml")).unwrap();
    clear_env();

    assert_eq!(config.local.timeout, 30);
    assert_eq!(config.remote.timeout, 30);
}

#[test]
#[serial]
fn env_allowed_commands_extend_file_entries() {
    clear_env();
    let file = write_config("[local.allowed_commands]\ncat = \"print files\"\n");
    unsafe { std::env::set_var("SHELLGATE_LOCAL_ALLOWED_COMMANDS", "sleep, cat ,,make") };
    let config = Config::load(file.path()).unwrap();
    clear_env();

    let allowed = &config.local.allowed_commands;
    assert_eq!(allowed.len(), 3);
    assert_eq!(allowed["cat"], "print files");
    assert_eq!(allowed["sleep"], "user-allowed command");
    assert_eq!(allowed["make"], "user-allowed command");
}

#[test]
#[serial]
fn env_blocked_commands_append() {
    clear_env();
    let file = write_config("[local]\nblocked_commands = [\"chmod\"]\n");
    unsafe {
        std::env::set_var("SHELLGATE_LOCAL_BLOCKED_COMMANDS", "chown,kill");
        std::env::set_var("SHELLGATE_REMOTE_BLOCKED_COMMANDS", "kill");
    }
    let config = Config::load(file.path()).unwrap();
    clear_env();

    assert_eq!(config.local.blocked_commands, vec!["chmod", "chown", "kill"]);
    assert_eq!(config.remote.blocked_commands, vec!["kill"]);
}

#[test]
#[serial]
fn env_audit_overrides() {
    clear_env();
    unsafe {
        std::env::set_var("SHELLGATE_AUDIT_ENABLED", "false");
        std::env::set_var("SHELLGATE_AUDIT_DESTINATION", "/var/log/sg.jsonl");
    }
    let config = Config::load(Path::new("/nonexistent/shellgate.toml")).unwrap();
    clear_env();

    assert!(!config.audit.enabled);
    assert_eq!(config.audit.destination, "/var/log/sg.jsonl");
}

#[test]
#[serial]
fn env_invalid_audit_flag_is_ignored() {
    clear_env();
    unsafe { std::env::set_var("SHELLGATE_AUDIT_ENABLED", "maybe") };
    let config = Config::load(Path::new("/nonexistent/shellgate.toml")).unwrap();
    clear_env();

    assert!(config.audit.enabled);
}

#[test]
fn validate_rejects_zero_timeouts() {
    let mut config = Config::default();
    config.local.timeout = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("local.timeout"));

    let mut config = Config::default();
    config.remote.connect_timeout = 0;
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_zero_output_cap() {
    let mut config = Config::default();
    config.remote.max_output_chars = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("remote.max_output_chars"));
}

#[test]
fn validate_rejects_empty_audit_destination() {
    let mut config = Config::default();
    config.audit.destination = "  ".into();
    assert!(config.validate().is_err());
}
