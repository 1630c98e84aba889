use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use {
    anyhow::{Context, Result},
    sha2::{Digest, Sha256},
    tracing::{debug, warn},
};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Downloads avatars once and keeps them on disk, keyed by the sha256 of
/// their URL.
pub struct AvatarCache {
    dir: PathBuf,
    http: reqwest::Client,
    entries: RwLock<HashMap<String, PathBuf>>,
}

impl AvatarCache {
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create avatar cache {}", dir.display()))?;
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            dir,
            http,
            entries: RwLock::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        self.dir.join(format!("{digest:x}.png"))
    }

    /// Local path of the avatar, downloading it on first use. `None` when
    /// the URL is empty or the download fails.
    pub async fn get(&self, url: &str) -> Option<PathBuf> {
        if url.is_empty() {
            return None;
        }
        if let Some(path) = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
        {
            return Some(path.clone());
        }

        let path = self.path_for(url);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "avatar found on disk");
        } else if let Err(e) = self.download(url, &path).await {
            warn!(url, error = %e, "avatar download failed");
            return None;
        }

        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), path.clone());
        Some(path)
    }

    async fn download(&self, url: &str, path: &Path) -> Result<()> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let partial = path.with_extension("part");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, path).await?;
        debug!(url, path = %path.display(), bytes = bytes.len(), "avatar cached");
        Ok(())
    }

    /// Forget every entry and delete the cache directory.
    pub async fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        wiremock::{
            Mock, MockServer, ResponseTemplate,
            matchers::{method, path},
        },
    };

    #[tokio::test]
    async fn downloads_once_and_reuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let cache = AvatarCache::create(tmp.path().join("avatars")).await.unwrap();
        let url = format!("{}/a.png", server.uri());

        let first = cache.get(&url).await.unwrap();
        let second = cache.get(&url).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), b"png");
        assert!(first.file_name().unwrap().to_str().unwrap().ends_with(".png"));
    }

    #[tokio::test]
    async fn existing_file_skips_download() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = AvatarCache::create(tmp.path()).await.unwrap();
        let url = "http://127.0.0.1:9/never.png";
        std::fs::write(cache.path_for(url), b"old").unwrap();
        assert_eq!(cache.get(url).await.unwrap(), cache.path_for(url));
    }

    #[tokio::test]
    async fn failed_download_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let cache = AvatarCache::create(tmp.path()).await.unwrap();
        assert!(cache.get(&format!("{}/gone.png", server.uri())).await.is_none());
        assert!(cache.get("").await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("avatars");
        let cache = AvatarCache::create(&dir).await.unwrap();
        cache.clear().await.unwrap();
        assert!(!dir.exists());
        cache.clear().await.unwrap();
    }
}
