use crate::app::ports::{SecretStoreError, SecretStorePort};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

/// Reads secrets from a JSON document mapping reference -> secret. A secret
/// may be stored either as a nested object or as a JSON-encoded string.
///
/// The file is re-read on every lookup; caching belongs to the resolver.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretStorePort for FileSecretStore {
    async fn get_secret(&self, reference: &str) -> Result<String, SecretStoreError> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| SecretStoreError::Unavailable {
            message: format!("cannot read {}", self.path.display()),
            source: Some(Box::new(e)),
        })?;
        let doc: Value = serde_json::from_slice(&raw).map_err(|e| SecretStoreError::Unavailable {
            message: format!("{} is not valid JSON", self.path.display()),
            source: Some(Box::new(e)),
        })?;
        match doc.get(reference) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(SecretStoreError::NotFound(reference.to_string())),
        }
    }
}

/// Looks secrets up in environment variables named `<prefix><REFERENCE>`, where
/// the reference is upper-cased and every non-alphanumeric character becomes `_`.
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn var_name(&self, reference: &str) -> String {
        let suffix: String = reference
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

#[async_trait]
impl SecretStorePort for EnvSecretStore {
    async fn get_secret(&self, reference: &str) -> Result<String, SecretStoreError> {
        let name = self.var_name(reference);
        match std::env::var(&name) {
            Ok(value) => Ok(value),
            Err(std::env::VarError::NotPresent) => Err(SecretStoreError::NotFound(reference.to_string())),
            Err(e) => Err(SecretStoreError::Unavailable {
                message: format!("{} is not readable", name),
                source: Some(Box::new(e)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_store_returns_objects_and_strings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(
            &path,
            r#"{
                "a": {"endpoint": "https://a.example", "authToken": "t", "sourceId": "a"},
                "b": "{\"endpoint\":\"https://b.example\",\"authToken\":\"t\",\"sourceId\":\"b\"}"
            }"#,
        )
        .unwrap();
        let store = FileSecretStore::new(&path);

        let a: Value = serde_json::from_str(&store.get_secret("a").await.unwrap()).unwrap();
        assert_eq!(a["sourceId"], "a");
        let b: Value = serde_json::from_str(&store.get_secret("b").await.unwrap()).unwrap();
        assert_eq!(b["sourceId"], "b");
        assert!(matches!(store.get_secret("c").await, Err(SecretStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let store = FileSecretStore::new("/nonexistent/secrets.json");
        assert!(matches!(
            store.get_secret("a").await,
            Err(SecretStoreError::Unavailable { .. })
        ));
    }

    #[test]
    fn env_names_are_normalized() {
        let store = EnvSecretStore::new("RAW_INGEST_SECRET_");
        assert_eq!(store.var_name("prod/source-a"), "RAW_INGEST_SECRET_PROD_SOURCE_A");
    }

    #[tokio::test]
    async fn env_store_reads_variable() {
        let store = EnvSecretStore::new("RAW_INGEST_TEST_SECRET_");
        std::env::set_var("RAW_INGEST_TEST_SECRET_ENV_CASE", "{}");
        assert_eq!(store.get_secret("env-case").await.unwrap(), "{}");
        assert!(matches!(
            store.get_secret("absent-case").await,
            Err(SecretStoreError::NotFound(_))
        ));
    }
}
