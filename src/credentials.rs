//! Application credentials for the mail API.
//!
//! Credentials are resolved once at startup from an ordered list of sources.
//! The first source that produces a complete set wins:
//! 1. Explicit override values (CLI flags)
//! 2. A credentials file (TOML)
//! 3. Environment variables (`AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`)

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, SortError};

/// Environment variable holding the Azure AD tenant id.
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
/// Environment variable holding the application (client) id.
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Environment variable holding the client secret.
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";

/// Client-credentials grant parameters.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    fn from_parts(
        tenant: Option<String>,
        client: Option<String>,
        secret: Option<String>,
    ) -> Option<Self> {
        let non_empty =
            |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Some(Self {
            tenant_id: non_empty(tenant)?,
            client_id: non_empty(client)?,
            client_secret: non_empty(secret)?,
        })
    }

    fn is_complete(&self) -> bool {
        !self.tenant_id.trim().is_empty()
            && !self.client_id.trim().is_empty()
            && !self.client_secret.trim().is_empty()
    }
}

/// One place credentials may come from.
pub trait CredentialSource {
    /// Short name used in logs and error messages.
    fn name(&self) -> String;

    /// `Ok(None)` when this source has nothing to offer; `Err` when it has
    /// something but it is unusable.
    fn resolve(&self) -> Result<Option<Credentials>>;
}

/// Values given explicitly on the command line.
#[derive(Debug, Default, Clone)]
pub struct OverrideSource {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl CredentialSource for OverrideSource {
    fn name(&self) -> String {
        "override".to_string()
    }

    fn resolve(&self) -> Result<Option<Credentials>> {
        Ok(Credentials::from_parts(
            self.tenant_id.clone(),
            self.client_id.clone(),
            self.client_secret.clone(),
        ))
    }
}

/// A TOML file with `tenant_id`, `client_id` and `client_secret` keys.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialSource for FileSource {
    fn name(&self) -> String {
        format!("file '{}'", self.path.display())
    }

    fn resolve(&self) -> Result<Option<Credentials>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SortError::io(&self.path, e)),
        };
        let creds: Credentials = toml::from_str(&contents).map_err(|e| {
            SortError::Credentials(format!("{}: {e}", self.name()))
        })?;
        if !creds.is_complete() {
            return Err(SortError::Credentials(format!(
                "{}: tenant_id, client_id and client_secret must all be non-empty",
                self.name()
            )));
        }
        Ok(Some(creds))
    }
}

/// Process environment, read through an injectable lookup.
pub struct EnvSource {
    lookup: Box<dyn Fn(&str) -> Option<String>>,
}

impl EnvSource {
    /// Read from the real process environment.
    pub fn from_process() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Read through a custom lookup function.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }
}

impl CredentialSource for EnvSource {
    fn name(&self) -> String {
        "environment".to_string()
    }

    fn resolve(&self) -> Result<Option<Credentials>> {
        Ok(Credentials::from_parts(
            (self.lookup)(ENV_TENANT_ID),
            (self.lookup)(ENV_CLIENT_ID),
            (self.lookup)(ENV_CLIENT_SECRET),
        ))
    }
}

/// Try each source in order and return the first complete set of credentials.
pub fn resolve(sources: &[&dyn CredentialSource]) -> Result<Credentials> {
    let mut attempted = Vec::with_capacity(sources.len());
    for source in sources {
        let name = source.name();
        match source.resolve()? {
            Some(creds) => {
                info!(source = %name, "Resolved credentials");
                return Ok(creds);
            }
            None => {
                debug!(source = %name, "No credentials from source");
                attempted.push(name);
            }
        }
    }
    Err(SortError::Credentials(format!(
        "no complete credentials found (tried: {})",
        attempted.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> EnvSource {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvSource::with_lookup(move |k| map.get(k).cloned())
    }

    fn full_env() -> EnvSource {
        env(&[
            (ENV_TENANT_ID, "env-tenant"),
            (ENV_CLIENT_ID, "env-client"),
            (ENV_CLIENT_SECRET, "env-secret"),
        ])
    }

    fn full_override() -> OverrideSource {
        OverrideSource {
            tenant_id: Some("o-tenant".into()),
            client_id: Some("o-client".into()),
            client_secret: Some("o-secret".into()),
        }
    }

    #[test]
    fn test_override_beats_file_beats_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.toml");
        std::fs::write(
            &path,
            "tenant_id = \"f-tenant\"\nclient_id = \"f-client\"\nclient_secret = \"f-secret\"\n",
        )
        .unwrap();
        let file = FileSource::new(&path);
        let environment = full_env();

        let creds = resolve(&[&full_override(), &file, &environment]).unwrap();
        assert_eq!(creds.tenant_id, "o-tenant");

        let creds = resolve(&[&OverrideSource::default(), &file, &environment]).unwrap();
        assert_eq!(creds.tenant_id, "f-tenant");

        let missing = FileSource::new(dir.path().join("absent.toml"));
        let creds = resolve(&[&OverrideSource::default(), &missing, &environment]).unwrap();
        assert_eq!(creds.client_secret, "env-secret");
    }

    #[test]
    fn test_partial_env_is_not_present() {
        let partial = env(&[(ENV_TENANT_ID, "t"), (ENV_CLIENT_ID, "c")]);
        assert!(partial.resolve().unwrap().is_none());
        let blank = env(&[(ENV_TENANT_ID, "t"), (ENV_CLIENT_ID, "c"), (ENV_CLIENT_SECRET, "  ")]);
        assert!(blank.resolve().unwrap().is_none());
    }

    #[test]
    fn test_error_lists_every_source_tried() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileSource::new(dir.path().join("absent.toml"));
        let err = resolve(&[&OverrideSource::default(), &file, &env(&[])]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("override"));
        assert!(msg.contains("absent.toml"));
        assert!(msg.contains("environment"));
    }

    #[test]
    fn test_malformed_file_is_an_error_not_a_fallthrough() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.toml");
        std::fs::write(&path, "tenant_id = \"only\"\n").unwrap();
        let err = resolve(&[&FileSource::new(&path), &full_env()]).unwrap_err();
        assert!(matches!(err, SortError::Credentials(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = full_override().resolve().unwrap().unwrap();
        let shown = format!("{creds:?}");
        assert!(!shown.contains("o-secret"));
        assert!(shown.contains("redacted"));
    }
}
