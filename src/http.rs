use crate::error::Result;
use crate::schema::ConfigPayload;
use std::time::Duration;
use tracing::debug;

const CONFIG_PATH: &str = "/get_config_json";

/// Full URL of the device's configuration endpoint.
pub fn config_url(http_base: &str) -> String {
    format!("{}{CONFIG_PATH}", http_base.trim_end_matches('/'))
}

/// Fetch the device's configuration over plain HTTP.
///
/// Unlike the WebSocket snapshot this carries no live state, and the
/// device answers with the bare payload.
///
/// # Errors
/// Returns `SyncError::Http` on connection failures, timeouts, non-2xx
/// responses, or a body that is not a configuration payload.
pub async fn fetch_config(http_base: &str) -> Result<ConfigPayload> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()?;

    let url = config_url(http_base);
    debug!("GET {url}");
    let payload = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json::<ConfigPayload>()
        .await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_url_joins_cleanly() {
        assert_eq!(
            config_url("http://linuxcnc-hmi.local"),
            "http://linuxcnc-hmi.local/get_config_json"
        );
        assert_eq!(
            config_url("http://10.0.0.7:8080/"),
            "http://10.0.0.7:8080/get_config_json"
        );
    }

    #[tokio::test]
    async fn unreachable_device_is_an_error() {
        // Port 9 on localhost: nothing listens, the connect fails fast.
        let result = fetch_config("http://127.0.0.1:9").await;
        assert!(result.is_err());
    }
}
