use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// How interleaved `system` messages are consolidated into the single system
/// string the backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SystemPlacement {
    /// Concatenate every system message, regardless of position.
    MergeAll,
    /// Leading system messages become the system string; later ones are
    /// appended to the nearest user message.
    #[default]
    MergeTopUser,
    /// Like `MergeTopUser`, but later system messages attach to the nearest
    /// assistant message.
    MergeTopAssistant,
    /// First system message only; the rest become one trailing user message.
    OnlyFirstUser,
    /// First system message only; the rest become one trailing assistant message.
    OnlyFirstAssistant,
    /// First system message only; the rest are dropped.
    OnlyFirstRemove,
}

impl FromStr for SystemPlacement {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge_all" => Ok(SystemPlacement::MergeAll),
            "merge_top_user" => Ok(SystemPlacement::MergeTopUser),
            "merge_top_assistant" => Ok(SystemPlacement::MergeTopAssistant),
            "only_first_user" => Ok(SystemPlacement::OnlyFirstUser),
            "only_first_assistant" => Ok(SystemPlacement::OnlyFirstAssistant),
            "only_first_remove" => Ok(SystemPlacement::OnlyFirstRemove),
            other => Err(BridgeError::Config(format!(
                "unknown system merge mode: {other}"
            ))),
        }
    }
}

/// Whether conversational turns are consolidated into token-budgeted chunks
/// before being sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnConsolidation {
    /// Pass messages through unchanged after system extraction.
    #[default]
    None,
    /// Merge all non-system messages into synthetic user chunks bounded by
    /// `max_chunk_tokens`.
    All,
}

impl FromStr for TurnConsolidation {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // "only_system" is the wire name of the pass-through mode.
            "none" | "only_system" => Ok(TurnConsolidation::None),
            "all" => Ok(TurnConsolidation::All),
            other => Err(BridgeError::Config(format!(
                "unknown prompt merge mode: {other}"
            ))),
        }
    }
}

/// Recovery strategy when the merged message list does not start with a user
/// turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnsureFirstMode {
    /// Drop leading non-user messages until a user message is found.
    #[default]
    Remove,
    /// Prepend a synthetic `user` message with content "continue".
    Continue,
}

impl EnsureFirstMode {
    /// Parse the configured strategy, falling back to `Remove` with a warning
    /// for unrecognized values instead of failing.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "remove" => EnsureFirstMode::Remove,
            "continue" => EnsureFirstMode::Continue,
            other => {
                tracing::warn!(
                    "ensure_first_mode '{other}' is not supported, using 'remove' instead"
                );
                EnsureFirstMode::Remove
            }
        }
    }
}

impl fmt::Display for EnsureFirstMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsureFirstMode::Remove => write!(f, "remove"),
            EnsureFirstMode::Continue => write!(f, "continue"),
        }
    }
}

/// Immutable per-request merge parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    pub system_placement: SystemPlacement,
    pub turn_consolidation: TurnConsolidation,
    pub max_chunk_tokens: usize,
    pub join_separator: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            system_placement: SystemPlacement::default(),
            turn_consolidation: TurnConsolidation::default(),
            max_chunk_tokens: default_max_chunk_tokens(),
            join_separator: default_join_separator(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: "INFO".to_string(),
        }
    }
}

/// Vertex AI backend credentials and placement.
#[derive(Debug, Clone, Serialize)]
pub struct VertexConfig {
    pub access_token: String,
    pub project_id: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
}

/// Full process configuration, read once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Empty string disables client authentication.
    pub private_key: String,
    pub ensure_first_mode: EnsureFirstMode,
    pub merge: MergeConfig,
    pub vertex: VertexConfig,
}

fn default_port() -> u16 {
    3565
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_region() -> String {
    "us-east5".to_string()
}
fn default_max_chunk_tokens() -> usize {
    4096
}
fn default_join_separator() -> String {
    "\n----\n".to_string()
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` when a numeric or enum-valued variable
    /// does not parse. An unrecognized `ENSURE_FIRST_MODE` is not an error;
    /// it falls back to `remove` with a warning.
    pub fn from_env() -> Result<Self, BridgeError> {
        let port = env_or("PORT", &default_port().to_string())
            .parse::<u16>()
            .map_err(|e| BridgeError::Config(format!("invalid PORT: {e}")))?;
        let max_chunk_tokens = env_or("MAX_TOKEN_LENGTH", &default_max_chunk_tokens().to_string())
            .parse::<usize>()
            .map_err(|e| BridgeError::Config(format!("invalid MAX_TOKEN_LENGTH: {e}")))?;
        if max_chunk_tokens == 0 {
            return Err(BridgeError::Config(
                "MAX_TOKEN_LENGTH must be greater than 0".to_string(),
            ));
        }

        let system_placement =
            SystemPlacement::from_str(&env_or("SYSTEM_MERGE_MODE", "merge_top_user"))?;
        let turn_consolidation =
            TurnConsolidation::from_str(&env_or("PROMPT_MERGE_MODE", "only_system"))?;
        let ensure_first_mode =
            EnsureFirstMode::parse_lenient(&env_or("ENSURE_FIRST_MODE", "remove"));

        Ok(Self {
            server: ServerConfig {
                host: env_or("HOST", &default_host()),
                port,
                log_level: env_or("LOG_LEVEL", "INFO"),
            },
            private_key: env_or("PRIVATE_KEY", ""),
            ensure_first_mode,
            merge: MergeConfig {
                system_placement,
                turn_consolidation,
                max_chunk_tokens,
                join_separator: default_join_separator(),
            },
            vertex: VertexConfig {
                access_token: env_or("ACCESS_TOKEN", ""),
                project_id: env_or("ANTHROPIC_VERTEX_PROJECT_ID", ""),
                region: env_or("CLOUD_ML_REGION", &default_region()),
                https_proxy: env::var("HTTPS_PROXY").ok(),
            },
        })
    }

    /// Log a startup summary with credentials redacted.
    pub fn log_startup_summary(&self) {
        tracing::info!(
            access_token = %redact(&self.vertex.access_token),
            project_id = %redact(&self.vertex.project_id),
            region = %self.vertex.region,
            https_proxy = ?self.vertex.https_proxy,
            system_merge_mode = ?self.merge.system_placement,
            prompt_merge_mode = ?self.merge.turn_consolidation,
            ensure_first_mode = %self.ensure_first_mode,
            auth_enabled = !self.private_key.is_empty(),
            "configuration loaded"
        );
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "<unset>".to_string();
    }
    let head: String = secret.chars().take(5).collect();
    format!("{head}***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_placement_parses_all_variants() {
        for (name, expected) in [
            ("merge_all", SystemPlacement::MergeAll),
            ("merge_top_user", SystemPlacement::MergeTopUser),
            ("merge_top_assistant", SystemPlacement::MergeTopAssistant),
            ("only_first_user", SystemPlacement::OnlyFirstUser),
            ("only_first_assistant", SystemPlacement::OnlyFirstAssistant),
            ("only_first_remove", SystemPlacement::OnlyFirstRemove),
        ] {
            assert_eq!(SystemPlacement::from_str(name).unwrap(), expected);
        }
    }

    #[test]
    fn test_unknown_system_placement_is_config_error() {
        let err = SystemPlacement::from_str("merge_bottom").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_turn_consolidation_wire_names() {
        assert_eq!(
            TurnConsolidation::from_str("only_system").unwrap(),
            TurnConsolidation::None
        );
        assert_eq!(
            TurnConsolidation::from_str("all").unwrap(),
            TurnConsolidation::All
        );
        assert!(TurnConsolidation::from_str("some").is_err());
    }

    #[test]
    fn test_ensure_first_mode_lenient_fallback() {
        assert_eq!(
            EnsureFirstMode::parse_lenient("continue"),
            EnsureFirstMode::Continue
        );
        assert_eq!(
            EnsureFirstMode::parse_lenient("bogus"),
            EnsureFirstMode::Remove
        );
    }

    #[test]
    fn test_redact_keeps_prefix_only() {
        assert_eq!(redact("supersecrettoken"), "super***");
        assert_eq!(redact(""), "<unset>");
    }
}
