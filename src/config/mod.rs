pub mod schema;
pub mod watcher;

use crate::error::{Result, SyncError};
use crate::schema::ConfigPayload;
use schema::AppConfig;
use std::path::Path;

/// Load and parse client settings from a TOML file.
///
/// # Errors
/// Returns `SyncError::ConfigNotFound` if the file doesn't exist,
/// `SyncError::Io` on read errors, `SyncError::TomlParse` on syntax errors,
/// or `SyncError::Config` on validation failures.
pub fn load(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Err(SyncError::ConfigNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let content = expand_env_vars(&content);
    let config: AppConfig = toml::from_str(&content)?;

    validate(&config)?;
    Ok(config)
}

/// Read a configuration payload (the device's JSON shape) from a file.
///
/// # Errors
/// Returns `SyncError::Io` on read errors or `SyncError::Json` on bad JSON.
pub fn read_payload(path: &Path) -> Result<ConfigPayload> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Expand `${VAR}` and `$VAR` patterns in the settings text.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        if chars.peek() == Some(&'{') {
            chars.next();
            let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
            match std::env::var(&name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    result.push_str("${");
                    result.push_str(&name);
                    result.push('}');
                }
            }
            continue;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            chars.next();
        }
        match std::env::var(&name) {
            Ok(val) if !name.is_empty() => result.push_str(&val),
            _ => {
                result.push('$');
                result.push_str(&name);
            }
        }
    }

    result
}

/// Validate settings constraints.
fn validate(config: &AppConfig) -> Result<()> {
    let url = &config.device.url;
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(SyncError::Config(format!(
            "device.url must start with ws:// or wss://, got '{url}'"
        )));
    }

    if config.device.reconnect_interval_ms == 0 {
        return Err(SyncError::Config(
            "device.reconnect_interval_ms must be > 0".to_string(),
        ));
    }

    config
        .live
        .layout()
        .map_err(|e| SyncError::Config(format!("live: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("hmilink-{}-{name}", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn env_var_expansion() {
        std::env::set_var("HMILINK_TEST_HOST", "pendant.local");
        let result = expand_env_vars("url = \"ws://${HMILINK_TEST_HOST}/ws\"");
        assert_eq!(result, "url = \"ws://pendant.local/ws\"");
        let result = expand_env_vars("url = \"ws://$HMILINK_TEST_HOST/ws\"");
        assert_eq!(result, "url = \"ws://pendant.local/ws\"");
        std::env::remove_var("HMILINK_TEST_HOST");
    }

    #[test]
    fn env_var_missing_kept() {
        let result = expand_env_vars("url = \"${HMILINK_NONEXISTENT}/ws\" cost = $5 $");
        assert_eq!(result, "url = \"${HMILINK_NONEXISTENT}/ws\" cost = $5 $");
    }

    #[test]
    fn missing_file() {
        let err = load(Path::new("/nonexistent/hmilink.toml")).unwrap_err();
        assert!(matches!(err, SyncError::ConfigNotFound(_)));
    }

    #[test]
    fn load_and_validate() {
        let path = write_temp("ok.toml", "[device]\nurl = \"ws://hmi.local/ws\"\n");
        let config = load(&path).unwrap();
        assert_eq!(config.device.url, "ws://hmi.local/ws");
        std::fs::remove_file(path).ok();

        let path = write_temp("bad-url.toml", "[device]\nurl = \"http://hmi.local\"\n");
        assert!(matches!(load(&path), Err(SyncError::Config(_))));
        std::fs::remove_file(path).ok();

        let path = write_temp(
            "bad-interval.toml",
            "[device]\nurl = \"ws://hmi/ws\"\nreconnect_interval_ms = 0\n",
        );
        assert!(matches!(load(&path), Err(SyncError::Config(_))));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn read_payload_file() {
        let path = write_temp(
            "payload.json",
            r#"{"buttons":[{"name":"Stop","is_toggle":false,"radio_group_id":0}]}"#,
        );
        let payload = read_payload(&path).unwrap();
        assert_eq!(payload.buttons[0].name, "Stop");
        std::fs::remove_file(path).ok();
    }
}
