use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Result, StoreError, CART_STORAGE_KEY, STOREFRONT_FOLDER};

pub const API_URL_VAR: &str = "STOREFRONT_API_URL";
pub const STORAGE_DIR_VAR: &str = "STOREFRONT_STORAGE_DIR";
pub const REQUEST_TIMEOUT_VAR: &str = "STOREFRONT_REQUEST_TIMEOUT";

const DEFAULT_API_URL: &str = "http://localhost:8080/api/";
const DETAIL_PLACEHOLDER: &str =
    "https://placehold.co/400x400/E0E0E0/808080?text=No+Image";
const THUMBNAIL_PLACEHOLDER: &str =
    "https://placehold.co/150x150/E0E0E0/808080?text=No+Image";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the catalog service; endpoint paths are joined onto it.
    pub api_base_url: Url,
    pub storage_dir: PathBuf,
    pub cart_key: String,
    pub detail_placeholder: Url,
    pub thumbnail_placeholder: Url,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: parse_static(DEFAULT_API_URL),
            storage_dir: PathBuf::from(STOREFRONT_FOLDER),
            cart_key: CART_STORAGE_KEY.to_owned(),
            detail_placeholder: parse_static(DETAIL_PLACEHOLDER),
            thumbnail_placeholder: parse_static(THUMBNAIL_PLACEHOLDER),
            request_timeout_secs: 30,
            user_agent: format!("storefront/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&content).map_err(|err| {
            StoreError::Config(format!(
                "{}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        Ok(config)
    }

    /// Defaults overlaid with `STOREFRONT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var(API_URL_VAR) {
            self.api_base_url = Url::parse(&url).map_err(|err| {
                StoreError::Config(format!("{}: {}", API_URL_VAR, err))
            })?;
        }
        if let Ok(dir) = std::env::var(STORAGE_DIR_VAR) {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Ok(secs) = std::env::var(REQUEST_TIMEOUT_VAR) {
            self.request_timeout_secs = secs.trim().parse().map_err(|_| {
                StoreError::Config(format!(
                    "{}: not a number of seconds: {}",
                    REQUEST_TIMEOUT_VAR, secs
                ))
            })?;
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL with a trailing slash; `Url::join` drops the last path
    /// segment otherwise.
    pub fn api_root(&self) -> Url {
        let mut root = self.api_base_url.clone();
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        root
    }
}

fn parse_static(url: &str) -> Url {
    Url::parse(url).expect("built-in URL must be valid")
}
