use anyhow::{anyhow, bail, Context, Result};
use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::collections::BTreeSet;
use std::{fs, path::Path, path::PathBuf};
use tracing::info;

use crate::config::Config;

const INDEX_FILE: &str = "model.safetensors.index.json";
const SINGLE_WEIGHTS: &str = "model.safetensors";

/// Files a Llama snapshot needs, resolved to local paths.
#[derive(Debug, Clone)]
pub struct SnapshotFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub tokenizer_config: Option<PathBuf>,
    pub weights: Vec<PathBuf>,
}

pub fn resolve(cfg: &Config) -> Result<SnapshotFiles> {
    match &cfg.model_dir {
        Some(dir) => from_dir(dir),
        None => from_hub(cfg),
    }
}

pub fn from_dir(dir: &Path) -> Result<SnapshotFiles> {
    info!(snapshot = %dir.display(), "resolving local snapshot");

    let required = |name: &str| -> Result<PathBuf> {
        let path = dir.join(name);
        if path.exists() {
            Ok(path)
        } else {
            Err(anyhow!("{} missing from {}", name, dir.display()))
        }
    };

    let config = required("config.json")?;
    let tokenizer = required("tokenizer.json")?;
    let tokenizer_config = Some(dir.join("tokenizer_config.json")).filter(|p| p.exists());

    let index_path = dir.join(INDEX_FILE);
    let weights = if index_path.exists() {
        let index = read_index(&index_path)?;
        shard_names(&index)?
            .into_iter()
            .map(|name| dir.join(name))
            .collect()
    } else {
        vec![required(SINGLE_WEIGHTS)?]
    };

    Ok(SnapshotFiles {
        config,
        tokenizer,
        tokenizer_config,
        weights,
    })
}

pub fn hub_api(cfg: &Config) -> Result<Api> {
    fs::create_dir_all(&cfg.cache_dir)
        .with_context(|| format!("cannot create cache dir {}", cfg.cache_dir.display()))?;

    ApiBuilder::new()
        .with_cache_dir(cfg.cache_dir.clone())
        .with_progress(true)
        .build()
        .context("failed to build hf-hub client")
}

pub fn from_hub(cfg: &Config) -> Result<SnapshotFiles> {
    info!(
        model_id = %cfg.model_id,
        revision = %cfg.revision,
        cache = %cfg.cache_dir.display(),
        "resolving hub snapshot"
    );

    let api = hub_api(cfg)?;
    let repo = api.repo(Repo::with_revision(
        cfg.model_id.clone(),
        RepoType::Model,
        cfg.revision.clone(),
    ));

    let config = fetch(&repo, "config.json")?;
    let tokenizer = fetch(&repo, "tokenizer.json")?;
    let tokenizer_config = repo.get("tokenizer_config.json").ok();

    let weights = match repo.get(INDEX_FILE) {
        Ok(index_path) => {
            let index = read_index(&index_path)?;
            shard_names(&index)?
                .iter()
                .map(|name| fetch(&repo, name))
                .collect::<Result<Vec<_>>>()?
        }
        Err(_) => vec![fetch(&repo, SINGLE_WEIGHTS)?],
    };

    info!(shards = weights.len(), "snapshot ready");

    Ok(SnapshotFiles {
        config,
        tokenizer,
        tokenizer_config,
        weights,
    })
}

fn fetch(repo: &ApiRepo, name: &str) -> Result<PathBuf> {
    repo.get(name)
        .with_context(|| format!("failed to fetch {name}"))
}

fn read_index(path: &Path) -> Result<serde_json::Value> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("invalid {}", path.display()))
}

/// Distinct shard file names from a safetensors index, sorted.
pub fn shard_names(index: &serde_json::Value) -> Result<Vec<String>> {
    let map = index["weight_map"]
        .as_object()
        .ok_or_else(|| anyhow!("index.json: weight_map is not an object"))?;

    let mut names = BTreeSet::new();
    for value in map.values() {
        let file = value
            .as_str()
            .ok_or_else(|| anyhow!("invalid shard entry in index.json"))?;
        names.insert(file.to_string());
    }

    if names.is_empty() {
        bail!("index.json lists no shards");
    }

    Ok(names.into_iter().collect())
}
