//! Download cache for remote notification icons.
//!
//! Cached assets are tracked in a JSON manifest keyed by URL, with a
//! content digest and fetch timestamp per entry. Only render-safe image
//! types make it into the cache; everything else is refused before the
//! download starts. Failures never escape the cache boundary - callers
//! always get a `CacheOutcome` and decide their own fallback.

use crate::config::SharedConfig;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

/// Content types the relay is willing to download and hand to the OS
/// notifier, with the file extension each maps to.
const SUPPORTED_MIME_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/vnd.microsoft.icon", "ico"),
    ("image/x-icon", "ico"),
];

/// One cached asset in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// External URL the asset was downloaded from.
    pub url: String,
    /// Local path of the downloaded file.
    pub path: String,
    /// SHA-256 digest of the content, base64 encoded.
    pub hash: String,
    /// Millisecond UNIX timestamp of the fetch.
    pub time: i64,
}

/// Result of a cache attempt. Never an error - a failed download or an
/// unsupported resource is an unsuccessful outcome, not a crash.
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub success: bool,
    pub message: String,
    pub path: Option<PathBuf>,
}

impl CacheOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            path: None,
        }
    }

    fn success(message: impl Into<String>, path: PathBuf) -> Self {
        Self {
            success: true,
            message: message.into(),
            path: Some(path),
        }
    }
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Clone)]
pub struct AssetCache {
    manifest_path: PathBuf,
    assets_dir: PathBuf,
    config: SharedConfig,
    client: reqwest::Client,
    clock: Clock,
}

impl AssetCache {
    pub fn new(
        manifest_path: impl Into<PathBuf>,
        assets_dir: impl Into<PathBuf>,
        config: SharedConfig,
    ) -> Result<Self, String> {
        let client = build_client(&config)?;
        Ok(Self {
            manifest_path: manifest_path.into(),
            assets_dir: assets_dir.into(),
            config,
            client,
            clock: Arc::new(|| chrono::Utc::now().timestamp_millis()),
        })
    }

    /// Replace the time source. Entry expiry becomes deterministic in
    /// tests.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Try to resolve `url` to a locally cached file, downloading it if
    /// there is no live entry.
    pub async fn try_cache(&self, url: &str) -> CacheOutcome {
        let manifest = match self.read_manifest().await {
            Ok(manifest) => manifest,
            Err(e) => return CacheOutcome::failure(e),
        };

        let now = (self.clock)();
        let expires_after_ms = self.expires_after_ms();

        if let Some(live) = manifest
            .iter()
            .filter(|entry| now - entry.time < expires_after_ms)
            .find(|entry| entry.url == url)
        {
            let path = PathBuf::from(&live.path);
            if path.exists() {
                return CacheOutcome::success(
                    "Asset is already cached and didn't expire yet",
                    path,
                );
            }
        }

        // Preflight to make sure the resource is valid and downloadable.
        let preflight = match self.client.head(url).send().await {
            Ok(response) => response,
            Err(e) => return CacheOutcome::failure(format!("Preflight of resource failed: {}", e)),
        };

        let status = preflight.status();
        if !status.is_success() {
            return CacheOutcome::failure(format!(
                "Preflight of resource yielded status {}",
                status.as_u16()
            ));
        }

        let content_type = preflight
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_default();

        let Some(&(_, extension)) = SUPPORTED_MIME_TYPES
            .iter()
            .find(|(mime, _)| *mime == content_type)
        else {
            return CacheOutcome::failure(format!(
                "Content type '{}' of the requested resource is not supported",
                content_type
            ));
        };

        let bytes = match self.download(url).await {
            Ok(bytes) => bytes,
            Err(e) => return CacheOutcome::failure(e),
        };

        let asset_path = self.asset_path(url, extension);
        if let Err(e) = fs::write(&asset_path, &bytes).await {
            return CacheOutcome::failure(format!(
                "Can't write asset to {}: {}",
                asset_path.display(),
                e
            ));
        }

        let hash = base64::engine::general_purpose::STANDARD.encode(Sha256::digest(&bytes));
        let entry = CacheEntry {
            url: url.to_string(),
            path: asset_path.to_string_lossy().to_string(),
            hash,
            time: (self.clock)(),
        };

        if let Err(e) = self.add_entry(manifest, entry).await {
            return CacheOutcome::failure(e);
        }

        CacheOutcome::success("Successfully fetched asset and added cache entry", asset_path)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Couldn't GET the resource: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Couldn't GET the resource, status {}", status.as_u16()));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| format!("Couldn't read the resource body: {}", e))
    }

    /// Insert `entry`, dropping a superseded same-URL entry and every
    /// expired entry along the way.
    async fn add_entry(
        &self,
        mut manifest: Vec<CacheEntry>,
        entry: CacheEntry,
    ) -> Result<(), String> {
        if manifest.iter().any(|e| e.hash == entry.hash && e.url == entry.url) {
            return Ok(());
        }

        // New content for a known URL supersedes the old entry.
        manifest.retain(|e| !(e.url == entry.url && e.hash != entry.hash));

        let now = (self.clock)();
        let expires_after_ms = self.expires_after_ms();
        manifest.retain(|e| now - e.time < expires_after_ms);

        manifest.push(entry);
        self.write_manifest(&manifest).await
    }

    /// Deterministic local path for a URL with the mapped extension.
    fn asset_path(&self, url: &str, extension: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&digest[..12]);
        self.assets_dir.join(format!("asset-{}.{}", token, extension))
    }

    fn expires_after_ms(&self) -> i64 {
        self.config.snapshot().server.asset_cache.entry_expires_after as i64 * 1000
    }

    async fn read_manifest(&self) -> Result<Vec<CacheEntry>, String> {
        if !self.manifest_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.manifest_path)
            .await
            .map_err(|e| format!("Can't read {}: {}", self.manifest_path.display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Can't parse {}: {}", self.manifest_path.display(), e))
    }

    async fn write_manifest(&self, manifest: &[CacheEntry]) -> Result<(), String> {
        let content = serde_json::to_string_pretty(manifest)
            .map_err(|e| format!("Can't serialize cache manifest: {}", e))?;
        fs::write(&self.manifest_path, content)
            .await
            .map_err(|e| format!("Can't write {}: {}", self.manifest_path.display(), e))
    }
}

fn build_client(config: &SharedConfig) -> Result<reqwest::Client, String> {
    let proxy_cfg = config.snapshot().server.proxy;
    let mut builder = reqwest::Client::builder();

    if proxy_cfg.enabled {
        let mut proxy = reqwest::Proxy::all(format!("http://{}:{}", proxy_cfg.host, proxy_cfg.port))
            .map_err(|e| format!("Invalid proxy configuration: {}", e))?;
        if !proxy_cfg.user.is_empty() {
            proxy = proxy.basic_auth(&proxy_cfg.user, &proxy_cfg.pass);
        }
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| format!("Can't build HTTP client: {}", e))
}
