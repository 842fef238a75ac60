use serde::{Deserialize, Serialize};

/// Credential source for the LLM provider collaborator (spec §6.4: "exactly
/// one mode applies per process"). Only the *location* of a credential is
/// stored here, never the secret value — following the teacher's
/// `AdminConfig.token_env` pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CredentialMode {
    /// Static API key read from an environment variable.
    ApiKey { env: String },
    /// Static access key pair (e.g. cloud-provider style) read from two
    /// environment variables.
    AccessKeyPair {
        access_key_env: String,
        secret_key_env: String,
    },
    /// Ambient instance credentials (e.g. an attached IAM role); no env var
    /// lookup is performed.
    Ambient,
}

impl Default for CredentialMode {
    fn default() -> Self {
        CredentialMode::ApiKey {
            env: "LLM_API_KEY".into(),
        }
    }
}

/// Which adapter crate the LLM collaborator is constructed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum LlmProvider {
    /// Any OpenAI chat-completions-compatible endpoint.
    OpenAiCompat { base_url: String },
    /// The native Anthropic Messages API.
    Anthropic,
}

impl Default for LlmProvider {
    fn default() -> Self {
        LlmProvider::OpenAiCompat {
            base_url: "https://api.openai.com/v1".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default)]
    pub credential_mode: CredentialMode,
    #[serde(default = "d_model_id")]
    pub default_model_id: String,
    #[serde(default)]
    pub default_region: Option<String>,
    #[serde(default = "d_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            credential_mode: CredentialMode::default(),
            default_model_id: d_model_id(),
            default_region: None,
            request_timeout_ms: d_timeout_ms(),
        }
    }
}

fn d_model_id() -> String {
    "gpt-4o-mini".into()
}
fn d_timeout_ms() -> u64 {
    20_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_mode_defaults_to_api_key() {
        let mode = CredentialMode::default();
        matches!(mode, CredentialMode::ApiKey { .. });
    }

    #[test]
    fn credential_mode_deserializes_access_key_pair() {
        let json = r#"{"mode":"access_key_pair","access_key_env":"A","secret_key_env":"B"}"#;
        let mode: CredentialMode = serde_json::from_str(json).unwrap();
        match mode {
            CredentialMode::AccessKeyPair {
                access_key_env,
                secret_key_env,
            } => {
                assert_eq!(access_key_env, "A");
                assert_eq!(secret_key_env, "B");
            }
            _ => panic!("expected AccessKeyPair"),
        }
    }

    #[test]
    fn credential_mode_deserializes_ambient() {
        let json = r#"{"mode":"ambient"}"#;
        let mode: CredentialMode = serde_json::from_str(json).unwrap();
        assert!(matches!(mode, CredentialMode::Ambient));
    }
}
