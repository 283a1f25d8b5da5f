use std::{collections::HashSet, path::PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// JSON snapshot holding every short link, e.g. "/var/tmp/store.json"
    pub data_path: PathBuf,

    /// Folder receiving page captures (`<token>.png` / `<token>.pdf`).
    /// `None` disables the archive feature entirely.
    pub metadata_folder: Option<PathBuf>,

    /// Route prefix serving archive pages and files, e.g. "/metadata/".
    /// Always starts and ends with a slash.
    pub metadata_path: String,

    /// Number of background capture workers
    pub archive_workers: usize,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// URL schemes accepted for shortening
    pub allowed_schemes: HashSet<String>,

    /// Route that accepts new links, e.g. "/update"
    pub update_path: String,

    /// Prefix prepended to a token to form the public short URL,
    /// e.g. "http://127.0.0.1:8080/". Kept verbatim.
    pub url_prefix: String,

    /// Headless browser binary used for page captures
    pub chrome_bin: String,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let archive_workers = std::env::var("ARCHIVE_WORKERS")
            .unwrap_or_else(|_| "2".into())
            .parse::<usize>()
            .context("ARCHIVE_WORKERS must be a non-negative integer")?;

        let metadata_folder = std::env::var("METADATA_FOLDER")
            .unwrap_or_else(|_| "/var/tmp/".into());
        let metadata_folder = (!metadata_folder.trim().is_empty())
            .then(|| PathBuf::from(metadata_folder.trim()));

        let metadata_path = std::env::var("METADATA_PATH").unwrap_or_else(|_| "/metadata/".into());
        validate_route("METADATA_PATH", &metadata_path)?;
        if !metadata_path.ends_with('/') {
            anyhow::bail!("METADATA_PATH must end with '/', got {metadata_path:?}");
        }

        let update_path = std::env::var("UPDATE_PATH").unwrap_or_else(|_| "/update".into());
        validate_route("UPDATE_PATH", &update_path)?;

        let allowed_schemes = parse_scheme_allowlist(
            &std::env::var("SCHEME_ALLOWLIST").unwrap_or_else(|_| "http,https,ftp".into()),
        );
        if allowed_schemes.is_empty() {
            anyhow::bail!("SCHEME_ALLOWLIST must name at least one scheme");
        }

        Ok(Self {
            data_path: std::env::var("DATA_PATH")
                .unwrap_or_else(|_| "/var/tmp/store.json".into())
                .into(),
            metadata_folder,
            metadata_path,
            archive_workers,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            allowed_schemes,
            update_path,
            url_prefix: std::env::var("URL_PREFIX")
                .unwrap_or_else(|_| format!("http://127.0.0.1:{port}/")),
            chrome_bin: std::env::var("CHROME_BIN").unwrap_or_else(|_| "chromium".into()),
        })
    }

    /// Public short URL for `token`.
    pub fn short_url(&self, token: &str) -> String {
        format!("{}{}", self.url_prefix, token)
    }

    /// Absolute link to an archive resource. A prefix without a scheme is
    /// turned into a protocol-relative link.
    pub fn archive_link(&self, resource: &str) -> String {
        let route = self.metadata_path.trim_start_matches('/');
        if self.url_prefix.starts_with("http") {
            format!("{}{route}{resource}", self.url_prefix)
        } else {
            format!("//{}{route}{resource}", self.url_prefix)
        }
    }

    pub fn archive_enabled(&self) -> bool {
        self.metadata_folder.is_some() && self.archive_workers > 0
    }
}

/// Split a comma separated scheme list, ignoring blanks and case.
pub fn parse_scheme_allowlist(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn validate_route(name: &str, route: &str) -> Result<()> {
    if !route.starts_with('/') {
        anyhow::bail!("{name} must start with '/', got {route:?}");
    }
    if route.contains(':') || route.contains('*') {
        anyhow::bail!("{name} must be a literal path, got {route:?}");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config(data_path: PathBuf, metadata_folder: Option<PathBuf>) -> AppConfig {
    AppConfig {
        data_path,
        metadata_folder,
        metadata_path: "/metadata/".into(),
        archive_workers: 1,
        host: "127.0.0.1".into(),
        port: 8080,
        allowed_schemes: parse_scheme_allowlist("http,https,ftp"),
        update_path: "/update".into(),
        url_prefix: "http://127.0.0.1:8080/".into(),
        chrome_bin: "chromium".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_allowlist_is_normalised() {
        let schemes = parse_scheme_allowlist(" HTTP, https,,ftp ,");
        assert_eq!(schemes.len(), 3);
        assert!(schemes.contains("http"));
        assert!(schemes.contains("https"));
        assert!(schemes.contains("ftp"));
    }

    #[test]
    fn routes_must_be_literal_absolute_paths() {
        assert!(validate_route("X", "/update").is_ok());
        assert!(validate_route("X", "update").is_err());
        assert!(validate_route("X", "/:token").is_err());
    }

    #[test]
    fn archive_links_follow_the_prefix() {
        let mut config = test_config("store.json".into(), None);
        assert_eq!(config.short_url("AbC_"), "http://127.0.0.1:8080/AbC_");
        assert_eq!(
            config.archive_link("AbC_.pdf"),
            "http://127.0.0.1:8080/metadata/AbC_.pdf"
        );

        config.url_prefix = "go.example.com/".into();
        assert_eq!(
            config.archive_link("AbC_.png"),
            "//go.example.com/metadata/AbC_.png"
        );
    }

    #[test]
    fn archive_needs_folder_and_workers() {
        let mut config = test_config("store.json".into(), Some("/tmp".into()));
        assert!(config.archive_enabled());
        config.archive_workers = 0;
        assert!(!config.archive_enabled());
        config.archive_workers = 2;
        config.metadata_folder = None;
        assert!(!config.archive_enabled());
    }
}
