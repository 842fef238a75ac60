//! Shared utility functions for provider adapters.

use hae_domain::config::CredentialMode;
use hae_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    Error::Other(format!("http transport: {e}"))
}

/// Resolve the credential configured for the LLM provider collaborator
/// (spec §6.4: "exactly one mode applies per process").
///
/// `ApiKey`/`AccessKeyPair` read the named environment variables; `Ambient`
/// performs no lookup (the provider is expected to rely on instance
/// credentials it discovers on its own, e.g. via the HTTP client's
/// environment-proxy resolution).
pub(crate) fn resolve_credential(mode: &CredentialMode) -> Result<String> {
    match mode {
        CredentialMode::ApiKey { env } => std::env::var(env).map_err(|_| {
            Error::Config(format!(
                "environment variable '{env}' not set or not valid UTF-8"
            ))
        }),
        CredentialMode::AccessKeyPair {
            access_key_env,
            secret_key_env,
        } => {
            let access = std::env::var(access_key_env).map_err(|_| {
                Error::Config(format!(
                    "environment variable '{access_key_env}' not set or not valid UTF-8"
                ))
            })?;
            let secret = std::env::var(secret_key_env).map_err(|_| {
                Error::Config(format!(
                    "environment variable '{secret_key_env}' not set or not valid UTF-8"
                ))
            })?;
            Ok(format!("{access}:{secret}"))
        }
        CredentialMode::Ambient => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_env_var() {
        let var_name = "HAE_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var_name, "env-secret-value");
        let mode = CredentialMode::ApiKey {
            env: var_name.into(),
        };
        assert_eq!(resolve_credential(&mode).unwrap(), "env-secret-value");
        std::env::remove_var(var_name);
    }

    #[test]
    fn resolve_api_key_env_var_missing() {
        let mode = CredentialMode::ApiKey {
            env: "HAE_TEST_NONEXISTENT_VAR_8888".into(),
        };
        let err = resolve_credential(&mode).unwrap_err();
        assert!(err.to_string().contains("HAE_TEST_NONEXISTENT_VAR_8888"));
    }

    #[test]
    fn resolve_ambient_is_empty() {
        assert_eq!(resolve_credential(&CredentialMode::Ambient).unwrap(), "");
    }
}
