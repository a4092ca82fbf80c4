//! Function host configuration, read once from the process environment.

use relay_functions_core::batch::DEFAULT_MAX_BATCH_BYTES;
use relay_functions_core::blob_names::{DEFAULT_CONTAINER_NAME, DEFAULT_ENDPOINT_TEMPLATE};
use relay_functions_core::connection::EventHubConnection;
use relay_functions_core::contract::SourceSelection;
use thiserror::Error;

use crate::adapters::azure::kusto::{KustoAuth, DEFAULT_AUTHORITY_HOST};
use crate::adapters::azure::signing::StorageCredential;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(String),
    #[error("{variable} is invalid: {message}")]
    Invalid {
        variable: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct StorageAccountConfig {
    pub account: String,
    pub credential: StorageCredential,
}

#[derive(Debug, Clone)]
pub struct CopyBlobConfig {
    pub source: StorageAccountConfig,
    pub destination: StorageAccountConfig,
    pub container: String,
    pub endpoint_template: String,
    pub source_selection: SourceSelection,
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub cluster_url: String,
    pub database: String,
    pub query_auth: KustoAuth,
    pub event_hub: EventHubConnection,
    pub hub_name: String,
    pub max_batch_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct FunctionsConfig {
    pub copy: CopyBlobConfig,
    pub publish: PublishConfig,
    pub port: u16,
}

impl FunctionsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Blank values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup: &lookup };

        let copy = CopyBlobConfig {
            source: env.storage_account(
                "SOURCE_STORAGE_ACCOUNT",
                "SOURCE_STORAGE_KEY",
                "SOURCE_STORAGE_SAS_TOKEN",
            )?,
            destination: env.storage_account(
                "DEST_STORAGE_ACCOUNT",
                "DEST_STORAGE_KEY",
                "DEST_STORAGE_SAS_TOKEN",
            )?,
            container: env
                .optional("BLOB_CONTAINER")
                .unwrap_or_else(|| DEFAULT_CONTAINER_NAME.to_string()),
            endpoint_template: env
                .optional("STORAGE_ENDPOINT_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_ENDPOINT_TEMPLATE.to_string()),
            source_selection: match env.optional("COPY_SOURCE_SELECTION") {
                Some(raw) => SourceSelection::parse_mode(&raw).map_err(|error| {
                    ConfigError::Invalid {
                        variable: "COPY_SOURCE_SELECTION",
                        message: error.message().to_string(),
                    }
                })?,
                None => SourceSelection::JustUploaded,
            },
        };

        let event_hub = EventHubConnection::parse(&env.required("EVENT_HUB_CONNECTION_STRING")?)
            .map_err(|error| ConfigError::Invalid {
                variable: "EVENT_HUB_CONNECTION_STRING",
                message: error.message().to_string(),
            })?;
        let hub_name = event_hub
            .resolve_hub(env.optional("EVENT_HUB_NAME").as_deref())
            .map_err(|_| ConfigError::Missing("EVENT_HUB_NAME".to_string()))?;

        let publish = PublishConfig {
            cluster_url: env.required("KUSTO_CLUSTER_URL")?,
            database: env.required("KUSTO_DATABASE")?,
            query_auth: env.query_auth()?,
            event_hub,
            hub_name,
            max_batch_bytes: env
                .parsed("EVENT_HUB_MAX_BATCH_BYTES")?
                .unwrap_or(DEFAULT_MAX_BATCH_BYTES),
        };

        Ok(Self {
            copy,
            publish,
            port: env
                .parsed("FUNCTIONS_CUSTOMHANDLER_PORT")?
                .unwrap_or(DEFAULT_PORT),
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.optional(name)
            .ok_or_else(|| ConfigError::Missing(name.to_string()))
    }

    fn parsed<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(name)
            .map(|raw| {
                raw.parse::<T>().map_err(|error| ConfigError::Invalid {
                    variable: name,
                    message: format!("'{raw}': {error}"),
                })
            })
            .transpose()
    }

    /// An account key wins over a SAS token when both are set.
    fn storage_account(
        &self,
        account_variable: &'static str,
        key_variable: &'static str,
        sas_variable: &'static str,
    ) -> Result<StorageAccountConfig, ConfigError> {
        let account = self.required(account_variable)?;
        let credential = match (self.optional(key_variable), self.optional(sas_variable)) {
            (Some(key), _) => {
                StorageCredential::shared_key(&key).map_err(|error| ConfigError::Invalid {
                    variable: key_variable,
                    message: error.to_string(),
                })?
            }
            (None, Some(token)) => StorageCredential::sas_token(&token),
            (None, None) => {
                return Err(ConfigError::Missing(format!(
                    "{key_variable} or {sas_variable}"
                )))
            }
        };

        Ok(StorageAccountConfig {
            account,
            credential,
        })
    }

    fn query_auth(&self) -> Result<KustoAuth, ConfigError> {
        if let Some(token) = self.optional("KUSTO_ACCESS_TOKEN") {
            return Ok(KustoAuth::StaticToken(token));
        }

        if self.optional("AZURE_CLIENT_SECRET").is_none() {
            return Err(ConfigError::Missing(
                "KUSTO_ACCESS_TOKEN or AZURE_CLIENT_SECRET".to_string(),
            ));
        }

        Ok(KustoAuth::ClientSecret {
            authority_host: self
                .optional("AZURE_AUTHORITY_HOST")
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            tenant_id: self.required("AZURE_TENANT_ID")?,
            client_id: self.required("AZURE_CLIENT_ID")?,
            client_secret: self.required("AZURE_CLIENT_SECRET")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SOURCE_STORAGE_ACCOUNT", "sadevdmz001"),
            ("SOURCE_STORAGE_KEY", "c2VjcmV0"),
            ("DEST_STORAGE_ACCOUNT", "sadevdmz002"),
            ("DEST_STORAGE_SAS_TOKEN", "?sv=2022&sig=abc"),
            ("KUSTO_CLUSTER_URL", "https://cluster.eastus.kusto.windows.net"),
            ("KUSTO_DATABASE", "mydb1"),
            ("KUSTO_ACCESS_TOKEN", "token"),
            (
                "EVENT_HUB_CONNECTION_STRING",
                "Endpoint=sb://relay-ns.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=key;EntityPath=audit",
            ),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<FunctionsConfig, ConfigError> {
        FunctionsConfig::from_lookup(|name| env.get(name).map(|value| value.to_string()))
    }

    #[test]
    fn applies_defaults_for_optional_values() {
        let config = load(&base_env()).expect("config should load");

        assert_eq!(config.copy.container, "test1");
        assert_eq!(config.copy.endpoint_template, DEFAULT_ENDPOINT_TEMPLATE);
        assert_eq!(config.copy.source_selection, SourceSelection::JustUploaded);
        assert!(matches!(
            config.copy.source.credential,
            StorageCredential::SharedKey { .. }
        ));
        assert!(matches!(
            config.copy.destination.credential,
            StorageCredential::SasToken(ref token) if token == "sv=2022&sig=abc"
        ));
        assert_eq!(config.publish.hub_name, "audit");
        assert_eq!(config.publish.max_batch_bytes, DEFAULT_MAX_BATCH_BYTES);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn reports_missing_variable_by_name() {
        let mut env = base_env();
        env.remove("KUSTO_DATABASE");

        let error = load(&env).expect_err("missing database should fail");
        assert_eq!(error.to_string(), "KUSTO_DATABASE must be configured");
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut env = base_env();
        env.insert("SOURCE_STORAGE_ACCOUNT", "  ");

        let error = load(&env).expect_err("blank account should fail");
        assert_eq!(error.to_string(), "SOURCE_STORAGE_ACCOUNT must be configured");
    }

    #[test]
    fn storage_credential_is_required() {
        let mut env = base_env();
        env.remove("DEST_STORAGE_SAS_TOKEN");

        let error = load(&env).expect_err("missing credential should fail");
        assert_eq!(
            error.to_string(),
            "DEST_STORAGE_KEY or DEST_STORAGE_SAS_TOKEN must be configured"
        );
    }

    #[test]
    fn client_secret_auth_requires_tenant_and_client() {
        let mut env = base_env();
        env.remove("KUSTO_ACCESS_TOKEN");
        env.insert("AZURE_CLIENT_SECRET", "shh");
        env.insert("AZURE_CLIENT_ID", "app");

        let error = load(&env).expect_err("missing tenant should fail");
        assert_eq!(error.to_string(), "AZURE_TENANT_ID must be configured");

        env.insert("AZURE_TENANT_ID", "tenant");
        let config = load(&env).expect("config should load");
        match config.publish.query_auth {
            KustoAuth::ClientSecret { authority_host, .. } => {
                assert_eq!(authority_host, DEFAULT_AUTHORITY_HOST)
            }
            other => panic!("unexpected auth: {other:?}"),
        }
    }

    #[test]
    fn explicit_hub_name_overrides_entity_path() {
        let mut env = base_env();
        env.insert("EVENT_HUB_NAME", "audit-replay");
        let config = load(&env).expect("config should load");
        assert_eq!(config.publish.hub_name, "audit-replay");
    }

    #[test]
    fn rejects_unparseable_numbers_and_modes() {
        let mut env = base_env();
        env.insert("FUNCTIONS_CUSTOMHANDLER_PORT", "http");
        let error = load(&env).expect_err("bad port should fail");
        assert!(error
            .to_string()
            .starts_with("FUNCTIONS_CUSTOMHANDLER_PORT is invalid"));

        let mut env = base_env();
        env.insert("COPY_SOURCE_SELECTION", "newest");
        let error = load(&env).expect_err("bad mode should fail");
        assert!(error.to_string().starts_with("COPY_SOURCE_SELECTION is invalid"));
    }

    #[test]
    fn first_listed_mode_is_opt_in() {
        let mut env = base_env();
        env.insert("COPY_SOURCE_SELECTION", "first-listed");
        env.insert("EVENT_HUB_MAX_BATCH_BYTES", "4096");
        let config = load(&env).expect("config should load");
        assert_eq!(config.copy.source_selection, SourceSelection::FirstListed);
        assert_eq!(config.publish.max_batch_bytes, 4096);
    }
}
