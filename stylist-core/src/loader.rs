use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use hf_hub::{
    api::tokio::{ApiBuilder, ApiRepo},
    Cache,
};

use crate::DeviceKind;

/// Builds a model from a source. Implementations pick the device and the
/// precision; the slot decides when to call them.
#[async_trait]
pub trait Loader: Send + Sync {
    type Model: ?Sized + Send + Sync;

    async fn load(&self, source: &ModelSource, token: Option<&str>) -> Result<Arc<Self::Model>>;

    fn device(&self) -> DeviceKind;
}

/// A normalized model identifier: a hub repo id, a local directory, or a
/// GitHub repository URL reduced to `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelSource(String);

impl ModelSource {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let Some(rest) = ["https://github.com/", "http://github.com/", "github.com/"]
            .iter()
            .find_map(|prefix| raw.strip_prefix(prefix))
        else {
            return Self(raw.to_string());
        };
        let mut parts = rest.split('/').filter(|part| !part.is_empty());
        match (parts.next(), parts.next()) {
            (Some(owner), Some(repo)) => {
                let repo = repo.strip_suffix(".git").unwrap_or(repo);
                Self(format!("{owner}/{repo}"))
            }
            _ => Self(raw.to_string()),
        }
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn is_github_url(raw: &str) -> bool {
        raw.contains("github.com")
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where weight files are fetched from.
pub enum WeightRepo {
    Local(PathBuf),
    Hub(ApiRepo),
}

impl WeightRepo {
    pub fn open(source: &ModelSource, token: Option<&str>) -> Result<Self> {
        let path = Path::new(source.id());
        if path.is_dir() {
            return Ok(Self::Local(path.to_path_buf()));
        }
        let cache = Cache::default();
        let api = ApiBuilder::from_cache(cache.clone())
            .with_token(hub_token(token, cache.token()))
            .build()
            .context("failed to create hf hub API")?;
        Ok(Self::Hub(api.model(source.id().to_string())))
    }

    pub async fn get(&self, file: &str) -> Result<PathBuf> {
        match self {
            WeightRepo::Local(dir) => {
                let path = dir.join(file);
                anyhow::ensure!(path.exists(), "{} does not exist", path.display());
                Ok(path)
            }
            WeightRepo::Hub(repo) => repo
                .get(file)
                .await
                .with_context(|| format!("failed to fetch {file}")),
        }
    }

    /// Resolves every shard named in a safetensors index, or the single
    /// `model.safetensors` file when the repository is not sharded.
    pub async fn get_safetensors(&self, index_file: &str) -> Result<Vec<PathBuf>> {
        let index = match self.get(index_file).await {
            Ok(index) => index,
            Err(_) => return Ok(vec![self.get("model.safetensors").await?]),
        };
        let index = std::fs::read_to_string(&index)
            .with_context(|| format!("failed to read {}", index.display()))?;
        let mut shards = Vec::new();
        for shard in shard_names(&index)? {
            shards.push(self.get(&shard).await?);
        }
        Ok(shards)
    }
}

fn shard_names(index: &str) -> Result<BTreeSet<String>> {
    let index: serde_json::Value =
        serde_json::from_str(index).context("failed to parse safetensors index")?;
    let weight_map = index
        .get("weight_map")
        .and_then(|map| map.as_object())
        .context("no weight map in safetensors index")?;
    Ok(weight_map
        .values()
        .filter_map(|file| file.as_str().map(str::to_string))
        .collect())
}

/// A token sent with the request wins over the one saved by
/// `huggingface-cli login`.
fn hub_token(requested: Option<&str>, cached: Option<String>) -> Option<String> {
    requested.map(str::to_string).or(cached)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_token_overrides_cached_login() {
        assert_eq!(
            hub_token(Some("hf_request"), Some("hf_cached".to_string())).as_deref(),
            Some("hf_request")
        );
    }

    #[test]
    fn cached_login_is_kept_without_request_token() {
        assert_eq!(
            hub_token(None, Some("hf_cached".to_string())).as_deref(),
            Some("hf_cached")
        );
        assert_eq!(hub_token(None, None), None);
    }

    #[test]
    fn github_urls_are_reduced_to_owner_and_repo() {
        let source = ModelSource::parse("https://github.com/acme/stylist-sd/tree/main");
        assert_eq!(source.id(), "acme/stylist-sd");
        assert_eq!(
            ModelSource::parse("github.com/acme/phi.git").id(),
            "acme/phi"
        );
    }

    #[test]
    fn hub_ids_are_kept_verbatim() {
        let source = ModelSource::parse(" microsoft/Phi-3-mini-4k-instruct ");
        assert_eq!(source.id(), "microsoft/Phi-3-mini-4k-instruct");
        assert_eq!(source.to_string(), "microsoft/Phi-3-mini-4k-instruct");
        assert!(!ModelSource::is_github_url(source.id()));
    }

    #[test]
    fn incomplete_github_url_is_not_rewritten() {
        let raw = "https://github.com/acme";
        assert_eq!(ModelSource::parse(raw).id(), raw);
    }

    #[test]
    fn shard_names_are_deduplicated() -> Result<()> {
        let index = r#"{"metadata":{},"weight_map":{
            "a.weight":"model-00001-of-00002.safetensors",
            "b.weight":"model-00001-of-00002.safetensors",
            "c.weight":"model-00002-of-00002.safetensors"}}"#;
        let names: Vec<_> = shard_names(index)?.into_iter().collect();
        assert_eq!(
            names,
            vec![
                "model-00001-of-00002.safetensors",
                "model-00002-of-00002.safetensors"
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn local_directories_serve_files_directly() -> Result<()> {
        let dir = std::env::temp_dir().join("stylist_local_repo_test");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("config.json"), "{}")?;

        let source = ModelSource::parse(dir.to_str().context("non utf-8 temp dir")?);
        let repo = WeightRepo::open(&source, None)?;
        assert!(matches!(repo, WeightRepo::Local(_)));
        assert_eq!(repo.get("config.json").await?, dir.join("config.json"));
        assert!(repo.get("missing.safetensors").await.is_err());

        let _ = std::fs::remove_dir_all(&dir);
        Ok(())
    }
}
