use biascope_core::{
    CachePolicy, DocumentOrigin, DocumentRequest, DocumentSource, DocumentText, Error, Result,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod extract;
pub mod oracle;

/// Extraction width passed to html2text. Oracle quotes are matched verbatim
/// against the extracted text, so paragraphs must not be re-wrapped: keep
/// this wide enough that no prose line ever folds.
const EXTRACT_WIDTH: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheMeta {
    schema_version: u32,
    fetched_at_epoch_s: u64,
    url: String,
    final_url: String,
    title: Option<String>,
    truncated: bool,
}

/// Filesystem cache for extracted page text.
///
/// Two files per entry under a two-level fan-out: `<key>.json` metadata and
/// `<key>.txt` body. Keys are deterministic over the request knobs that
/// change the stored text.
#[derive(Debug, Clone)]
pub struct PageCache {
    root: PathBuf,
}

impl PageCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn key_for(req: &DocumentRequest) -> String {
        let mut h = Sha256::new();
        h.update(b"url:");
        h.update(req.url.as_bytes());
        h.update(b"\nmax_bytes:");
        match req.max_bytes {
            Some(n) => h.update(n.to_string().as_bytes()),
            None => h.update(b"none"),
        }
        hex::encode(h.finalize())
    }

    fn paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let dir = self.root.join(&key[0..2]).join(&key[2..4]);
        let meta = dir.join(format!("{key}.json"));
        let body = dir.join(format!("{key}.txt"));
        (meta, body)
    }

    pub fn get(&self, req: &DocumentRequest) -> Result<Option<DocumentText>> {
        if !req.cache.read {
            return Ok(None);
        }
        let key = Self::key_for(req);
        let (meta_p, body_p) = self.paths(&key);
        if !meta_p.exists() || !body_p.exists() {
            return Ok(None);
        }
        let meta_bytes = fs::read(&meta_p).map_err(|e| Error::Cache(e.to_string()))?;
        let meta: CacheMeta =
            serde_json::from_slice(&meta_bytes).map_err(|e| Error::Cache(e.to_string()))?;

        if let Some(ttl_s) = req.cache.ttl_s {
            let now_s = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::from_secs(0))
                .as_secs();
            if now_s.saturating_sub(meta.fetched_at_epoch_s) > ttl_s {
                return Ok(None);
            }
        }

        let text =
            fs::read_to_string(&body_p).map_err(|e| Error::Cache(e.to_string()))?;
        Ok(Some(DocumentText {
            url: meta.url,
            final_url: meta.final_url,
            title: meta.title,
            text,
            truncated: meta.truncated,
            origin: DocumentOrigin::Cache,
        }))
    }

    pub fn put(&self, req: &DocumentRequest, doc: &DocumentText) -> Result<()> {
        if !req.cache.write {
            return Ok(());
        }
        let key = Self::key_for(req);
        let (meta_p, body_p) = self.paths(&key);
        if let Some(parent) = meta_p.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Cache(e.to_string()))?;
        }
        let now_s = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs();

        let meta = CacheMeta {
            schema_version: 1,
            fetched_at_epoch_s: now_s,
            url: doc.url.clone(),
            final_url: doc.final_url.clone(),
            title: doc.title.clone(),
            truncated: doc.truncated,
        };

        fs::write(&body_p, doc.text.as_bytes()).map_err(|e| Error::Cache(e.to_string()))?;
        fs::write(
            &meta_p,
            serde_json::to_vec(&meta).map_err(|e| Error::Cache(e.to_string()))?,
        )
        .map_err(|e| Error::Cache(e.to_string()))?;
        Ok(())
    }
}

fn env_csv(key: &str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn host_matches(host: &str, pat: &str) -> bool {
    let host = host.trim().to_ascii_lowercase();
    let pat = pat.trim().to_ascii_lowercase();
    if host == pat {
        return true;
    }
    host.ends_with(&format!(".{pat}"))
}

fn wiki_hosts() -> Vec<String> {
    let v = env_csv("BIASCOPE_WIKI_HOSTS");
    if v.is_empty() {
        vec!["wikipedia.org".to_string()]
    } else {
        v
    }
}

/// Check that `raw` is an http(s) Wikipedia article URL (`/wiki/<Title>`).
pub fn validate_wiki_url(raw: &str) -> Result<url::Url> {
    let u = url::Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    if !matches!(u.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl(format!("unsupported scheme: {}", u.scheme())));
    }
    let host = u
        .host_str()
        .ok_or_else(|| Error::InvalidUrl("missing host".to_string()))?;
    if !wiki_hosts().iter().any(|h| host_matches(host, h)) {
        return Err(Error::InvalidUrl(format!("not a wikipedia host: {host}")));
    }
    if page_title(&u).is_none() {
        return Err(Error::InvalidUrl(format!("not an article path: {}", u.path())));
    }
    Ok(u)
}

/// Extract the article title from a `/wiki/<Title>` path, underscores as spaces.
pub fn page_title(u: &url::Url) -> Option<String> {
    let parts: Vec<&str> = u.path().trim_matches('/').split('/').collect();
    if parts.len() != 2 || parts[0] != "wiki" {
        return None;
    }
    let title = parts[1].trim();
    if title.is_empty() {
        return None;
    }
    Some(title.replace('_', " "))
}

/// Wikipedia-backed [`DocumentSource`]: fetches article HTML over HTTP and
/// reduces it to segmenter-ready plain text.
#[derive(Debug, Clone)]
pub struct WikiSource {
    client: reqwest::Client,
    cache: Option<PageCache>,
}

impl WikiSource {
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("biascope/0.1")
            .redirect(reqwest::redirect::Policy::limited(10))
            // Avoid "hang forever" on DNS/TLS/body stalls; per-request
            // timeouts (DocumentRequest.timeout_ms) can still override.
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        let cache = cache_dir.map(PageCache::new);
        Ok(Self { client, cache })
    }
}

#[async_trait::async_trait]
impl DocumentSource for WikiSource {
    async fn fetch(&self, req: &DocumentRequest) -> Result<DocumentText> {
        let u = validate_wiki_url(&req.url)?;
        let title = page_title(&u);

        if let Some(cache) = self.cache.clone() {
            let req2 = req.clone();
            let hit = tokio::task::spawn_blocking(move || cache.get(&req2))
                .await
                .map_err(|e| Error::Cache(format!("cache get join failed: {e}")))??;
            if let Some(hit) = hit {
                tracing::debug!(url = %req.url, "page cache hit");
                return Ok(hit);
            }
        }

        tracing::debug!(url = %req.url, "fetching page");
        let mut rb = self.client.get(u);
        if let Some(to) = req.timeout() {
            rb = rb.timeout(to);
        }
        let resp = rb.send().await.map_err(|e| Error::Fetch(e.to_string()))?;
        let final_url = resp.url().to_string();
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP {status} for {}", req.url)));
        }

        let max_bytes = req.max_bytes.unwrap_or(u64::MAX) as usize;
        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        let html = String::from_utf8_lossy(&bytes);
        let text = extract::clean_page_text(&extract::html_to_text(&html, EXTRACT_WIDTH));

        let out = DocumentText {
            url: req.url.clone(),
            final_url,
            title,
            text,
            truncated,
            origin: DocumentOrigin::Network,
        };

        if let Some(cache) = self.cache.clone() {
            let req2 = req.clone();
            let out2 = out.clone();
            tokio::task::spawn_blocking(move || cache.put(&req2, &out2))
                .await
                .map_err(|e| Error::Cache(format!("cache put join failed: {e}")))??;
        }

        Ok(out)
    }
}

/// Convenience request with defaults suitable for article-sized pages.
pub fn article_request(url: &str) -> DocumentRequest {
    DocumentRequest {
        url: url.to_string(),
        timeout_ms: Some(30_000),
        max_bytes: Some(8_000_000),
        cache: CachePolicy::default(),
    }
}
