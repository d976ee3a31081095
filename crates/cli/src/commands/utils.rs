use explorer_core::{
    provider::RegistryError,
    runtime::RuntimeError,
    ProviderHealth, RpcError,
};
use serde_json::Value;
use std::fmt;

#[derive(Debug)]
pub enum CliError {
    Config(String),
    Io(String),
    Rpc(String),
    Registry(String),
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Rpc(msg) => write!(f, "RPC error: {msg}"),
            Self::Registry(msg) => write!(f, "Provider error: {msg}"),
            Self::General(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::General(error.to_string())
    }
}

impl From<RpcError> for CliError {
    fn from(error: RpcError) -> Self {
        Self::Rpc(error.to_string())
    }
}

impl From<RegistryError> for CliError {
    fn from(error: RegistryError) -> Self {
        Self::Registry(error.to_string())
    }
}

impl From<RuntimeError> for CliError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::ConfigValidation(msg) => Self::Config(msg),
            other => Self::General(other.to_string()),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

pub fn print_success(message: &str) {
    println!("[SUCCESS] {message}");
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {message}");
}

pub fn print_info(message: &str) {
    println!("[INFO] {message}");
}

/// Pretty-prints any serializable value as JSON.
pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One-line health summary, e.g. `healthy 120ms` or `unhealthy: connection refused`.
pub fn format_health(health: Option<&ProviderHealth>) -> String {
    match health {
        None => "unknown".to_string(),
        Some(h) if h.is_healthy => match h.response_time {
            Some(rt) => format!("healthy {}ms", rt.as_millis()),
            None => "healthy".to_string(),
        },
        Some(h) => format!("unhealthy: {}", h.error.as_deref().unwrap_or("no details")),
    }
}

/// Compact rendering of a transaction's action list.
pub fn format_actions(actions: &[Value]) -> String {
    let names: Vec<String> = actions
        .iter()
        .map(|action| match action {
            Value::String(name) => name.clone(),
            Value::Object(map) => map.keys().next().cloned().unwrap_or_else(|| "?".to_string()),
            _ => "?".to_string(),
        })
        .collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_cli_error_display() {
        assert_eq!(
            CliError::Config("invalid config".to_string()).to_string(),
            "Configuration error: invalid config"
        );
        assert_eq!(CliError::Rpc("boom".to_string()).to_string(), "RPC error: boom");
        assert_eq!(
            CliError::Registry("nope".to_string()).to_string(),
            "Provider error: nope"
        );
    }

    #[test]
    fn test_cli_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        match CliError::from(io_error) {
            CliError::Io(msg) => assert!(msg.contains("file not found")),
            other => panic!("Expected Io variant, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_error_from_rpc_error() {
        let error = RpcError::Validation("bad range".to_string());
        match CliError::from(error) {
            CliError::Rpc(msg) => assert!(msg.contains("bad range")),
            other => panic!("Expected Rpc variant, got {other:?}"),
        }
    }

    #[test]
    fn test_runtime_config_error_maps_to_config() {
        let error = RuntimeError::ConfigValidation("window".to_string());
        assert!(matches!(CliError::from(error), CliError::Config(_)));
    }

    #[test]
    fn test_format_health() {
        assert_eq!(format_health(None), "unknown");

        let healthy = ProviderHealth {
            is_healthy: true,
            last_checked: Utc::now(),
            response_time: Some(Duration::from_millis(120)),
            error: None,
        };
        assert_eq!(format_health(Some(&healthy)), "healthy 120ms");

        let unhealthy = ProviderHealth {
            is_healthy: false,
            error: Some("connection refused".to_string()),
            ..healthy
        };
        assert_eq!(format_health(Some(&unhealthy)), "unhealthy: connection refused");
    }

    #[test]
    fn test_format_actions() {
        let actions = vec![json!({"Transfer": {"deposit": "1"}}), json!("CreateAccount")];
        assert_eq!(format_actions(&actions), "Transfer,CreateAccount");
        assert_eq!(format_actions(&[]), "-");
    }
}
