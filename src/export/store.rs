//! Versioned artifact stores
//!
//! A store keeps one [`SelectedModel`] bundle per [`VersionTag`]. Tags grow
//! strictly; `get(Latest)` always returns the bundle of the last successful
//! `put`.

use crate::data::{Dataset, Label};
use crate::error::{Result, SentinelError};
use crate::selection::SelectedModel;
use crate::training::ModelFamily;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Deployment version, rendered as `v<n>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(pub u64);

impl VersionTag {
    pub fn first() -> Self {
        VersionTag(1)
    }

    pub fn next(self) -> Self {
        VersionTag(self.0 + 1)
    }

    /// Parse `"v3"` or `"3"`
    pub fn parse(s: &str) -> Result<Self> {
        let digits = s.trim().strip_prefix('v').unwrap_or(s.trim());
        match digits.parse::<u64>() {
            Ok(n) if n >= 1 => Ok(VersionTag(n)),
            _ => Err(SentinelError::ArtifactStore(format!("Invalid version tag: {}", s))),
        }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Which version to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    Latest,
    Tag(VersionTag),
}

impl FromStr for VersionSelector {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("latest") {
            Ok(VersionSelector::Latest)
        } else {
            VersionTag::parse(s).map(VersionSelector::Tag)
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Latest => write!(f, "latest"),
            VersionSelector::Tag(tag) => write!(f, "{}", tag),
        }
    }
}

/// Location of a stored bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactUri(pub String);

impl fmt::Display for ArtifactUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bundle pinned to the version it was loaded from. Serving code holds
/// one of these per request instead of reading a shared mutable slot.
#[derive(Debug, Clone)]
pub struct DeployedModel {
    pub tag: VersionTag,
    pub bundle: Arc<SelectedModel>,
}

impl DeployedModel {
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<Label>> {
        self.bundle.predict(dataset)
    }
}

/// Persistence and versioning of selected bundles
pub trait ArtifactStore: Send + Sync {
    /// Persist `bundle` under `tag`; fails unless `tag` is newer than the latest
    fn put(&self, bundle: &SelectedModel, tag: VersionTag) -> Result<ArtifactUri>;

    fn get(&self, selector: VersionSelector) -> Result<SelectedModel>;

    fn latest_tag(&self) -> Result<Option<VersionTag>>;

    /// All stored tags, ascending
    fn list_tags(&self) -> Result<Vec<VersionTag>>;

    fn next_tag(&self) -> Result<VersionTag> {
        Ok(self.latest_tag()?.map_or_else(VersionTag::first, VersionTag::next))
    }

    /// Load a bundle together with the tag it resolved to
    fn deploy(&self, selector: VersionSelector) -> Result<DeployedModel> {
        let tag = match selector {
            VersionSelector::Tag(tag) => tag,
            VersionSelector::Latest => self
                .latest_tag()?
                .ok_or_else(|| SentinelError::ArtifactStore("Store is empty".to_string()))?,
        };
        Ok(DeployedModel {
            tag,
            bundle: Arc::new(self.get(VersionSelector::Tag(tag))?),
        })
    }
}

fn check_newer(tag: VersionTag, latest: Option<VersionTag>) -> Result<()> {
    match latest {
        Some(latest) if tag <= latest => Err(SentinelError::ArtifactStore(format!(
            "Version {} is not newer than latest {}",
            tag, latest
        ))),
        _ => Ok(()),
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    bundles: RwLock<BTreeMap<VersionTag, Arc<SelectedModel>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn put(&self, bundle: &SelectedModel, tag: VersionTag) -> Result<ArtifactUri> {
        let mut bundles = self.bundles.write();
        check_newer(tag, bundles.keys().next_back().copied())?;
        bundles.insert(tag, Arc::new(bundle.clone()));
        Ok(ArtifactUri(format!("memory://{}", tag)))
    }

    fn get(&self, selector: VersionSelector) -> Result<SelectedModel> {
        let bundles = self.bundles.read();
        let found = match selector {
            VersionSelector::Latest => bundles.values().next_back(),
            VersionSelector::Tag(tag) => bundles.get(&tag),
        };
        found
            .map(|b| b.as_ref().clone())
            .ok_or_else(|| SentinelError::ArtifactStore(format!("No bundle for {}", selector)))
    }

    fn latest_tag(&self) -> Result<Option<VersionTag>> {
        Ok(self.bundles.read().keys().next_back().copied())
    }

    fn list_tags(&self) -> Result<Vec<VersionTag>> {
        Ok(self.bundles.read().keys().copied().collect())
    }
}

/// Index entry, metadata only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub tag: VersionTag,
    /// Bundle path relative to the store root
    pub path: String,
    pub family: ModelFamily,
    pub f1: f64,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreIndex {
    latest: Option<VersionTag>,
    versions: Vec<IndexEntry>,
}

const INDEX_FILE: &str = "index.json";
const BUNDLE_FILE: &str = "bundle.bin";

fn store_err(action: &str, path: &Path, e: impl fmt::Display) -> SentinelError {
    SentinelError::ArtifactStore(format!("Failed to {} {}: {}", action, path.display(), e))
}

/// Write through a sibling temp file and rename into place
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp).map_err(|e| store_err("create", &tmp, e))?;
        file.write_all(bytes).map_err(|e| store_err("write", &tmp, e))?;
        file.sync_all().map_err(|e| store_err("sync", &tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| store_err("rename", path, e))
}

/// Directory-backed store: `<root>/v<n>/bundle.bin` plus `<root>/index.json`.
/// The index, and with it the latest pointer, is only rewritten after the
/// bundle file is complete.
#[derive(Debug)]
pub struct LocalArtifactStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalArtifactStore {
    /// Create or open a store at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| store_err("create", &root, e))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_index(&self) -> Result<StoreIndex> {
        let path = self.root.join(INDEX_FILE);
        if !path.exists() {
            return Ok(StoreIndex::default());
        }
        let file = File::open(&path).map_err(|e| store_err("open", &path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| store_err("parse", &path, e))
    }

    fn save_index(&self, index: &StoreIndex) -> Result<()> {
        let path = self.root.join(INDEX_FILE);
        let bytes = serde_json::to_vec_pretty(index).map_err(|e| store_err("encode", &path, e))?;
        write_atomic(&path, &bytes)
    }

    /// Index entries, oldest first
    pub fn entries(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.load_index()?.versions)
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn put(&self, bundle: &SelectedModel, tag: VersionTag) -> Result<ArtifactUri> {
        let _guard = self.write_lock.lock();
        let mut index = self.load_index()?;
        check_newer(tag, index.latest)?;

        let dir = self.root.join(tag.to_string());
        fs::create_dir_all(&dir).map_err(|e| store_err("create", &dir, e))?;
        let path = dir.join(BUNDLE_FILE);

        let bytes = bincode::serialize(bundle).map_err(|e| store_err("encode", &path, e))?;
        write_atomic(&path, &bytes)?;

        index.versions.push(IndexEntry {
            tag,
            path: format!("{}/{}", tag, BUNDLE_FILE),
            family: bundle.family(),
            f1: bundle.test_metrics.f1,
            stored_at: Utc::now(),
        });
        index.latest = Some(tag);
        self.save_index(&index)?;

        info!(version = %tag, path = %path.display(), bytes = bytes.len(), "Stored bundle");
        Ok(ArtifactUri(path.display().to_string()))
    }

    fn get(&self, selector: VersionSelector) -> Result<SelectedModel> {
        let index = self.load_index()?;
        let tag = match selector {
            VersionSelector::Latest => index.latest,
            VersionSelector::Tag(tag) => Some(tag),
        };
        let entry = tag
            .and_then(|t| index.versions.iter().find(|e| e.tag == t))
            .ok_or_else(|| SentinelError::ArtifactStore(format!("No bundle for {}", selector)))?;

        let path = self.root.join(&entry.path);
        let mut bytes = Vec::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|e| store_err("read", &path, e))?;
        bincode::deserialize(&bytes).map_err(|e| store_err("decode", &path, e))
    }

    fn latest_tag(&self) -> Result<Option<VersionTag>> {
        Ok(self.load_index()?.latest)
    }

    fn list_tags(&self) -> Result<Vec<VersionTag>> {
        let mut tags: Vec<VersionTag> = self.load_index()?.versions.iter().map(|e| e.tag).collect();
        tags.sort();
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::preprocessing::TransformPipeline;
    use crate::schema::{ColumnType, Schema, SchemaVersion};
    use crate::split::{SplitConfig, Splitter};
    use crate::training::{DecisionTreeParams, HyperParams};

    fn dataset() -> Dataset {
        Dataset::from_columns(
            vec!["x".to_string()],
            vec![(0..20i64).map(Value::from).collect()],
            Some((0..20).map(|i| Label::from_f64(if i >= 10 { 1.0 } else { 0.0 })).collect()),
            SchemaVersion(1),
            "test",
        )
        .unwrap()
    }

    fn bundle() -> SelectedModel {
        let schema = Schema::new(SchemaVersion(1)).with_column("x", ColumnType::Integer, true);
        let (train, _) = Splitter::new(SplitConfig::default()).unwrap().split(&dataset()).unwrap();
        let transform = TransformPipeline::default().fit(&train, &schema).unwrap();
        let features = transform.apply(&train).unwrap();
        let params = HyperParams::DecisionTree(DecisionTreeParams::default());
        let labels = features.labels.clone().unwrap();
        let model = params.fit(&features.features, &labels, 0).unwrap();
        let metrics = model.score(&features.features, &labels).unwrap();
        SelectedModel {
            transform,
            model,
            params,
            test_metrics: metrics,
            train_metrics: metrics,
            ordinal: 0,
            selected_at: Utc::now(),
        }
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!(VersionTag::parse("v3").unwrap(), VersionTag(3));
        assert_eq!(VersionTag::parse("12").unwrap(), VersionTag(12));
        assert!(VersionTag::parse("v0").is_err());
        assert!(VersionTag::parse("latest").is_err());
        assert_eq!("latest".parse::<VersionSelector>().unwrap(), VersionSelector::Latest);
        assert_eq!(
            "v2".parse::<VersionSelector>().unwrap(),
            VersionSelector::Tag(VersionTag(2))
        );
        assert_eq!(VersionTag(4).to_string(), "v4");
    }

    #[test]
    fn test_in_memory_latest_follows_put() {
        let store = InMemoryArtifactStore::new();
        assert_eq!(store.next_tag().unwrap(), VersionTag(1));
        assert!(store.get(VersionSelector::Latest).is_err());

        let b = bundle();
        store.put(&b, VersionTag(1)).unwrap();
        store.put(&b, VersionTag(2)).unwrap();

        assert_eq!(store.latest_tag().unwrap(), Some(VersionTag(2)));
        assert_eq!(store.next_tag().unwrap(), VersionTag(3));
        assert_eq!(store.deploy(VersionSelector::Latest).unwrap().tag, VersionTag(2));
    }

    #[test]
    fn test_stale_tag_is_rejected() {
        let store = InMemoryArtifactStore::new();
        let b = bundle();
        store.put(&b, VersionTag(2)).unwrap();
        assert!(matches!(
            store.put(&b, VersionTag(2)),
            Err(SentinelError::ArtifactStore(_))
        ));
        assert!(store.put(&b, VersionTag(1)).is_err());
        assert_eq!(store.list_tags().unwrap(), vec![VersionTag(2)]);
    }

    #[test]
    fn test_local_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let b = bundle();
        {
            let store = LocalArtifactStore::open(dir.path()).unwrap();
            store.put(&b, VersionTag(1)).unwrap();
            store.put(&b, VersionTag(2)).unwrap();
        }

        let store = LocalArtifactStore::open(dir.path()).unwrap();
        assert_eq!(store.list_tags().unwrap(), vec![VersionTag(1), VersionTag(2)]);
        assert_eq!(store.latest_tag().unwrap(), Some(VersionTag(2)));

        let deployed = store.deploy(VersionSelector::Tag(VersionTag(1))).unwrap();
        let predictions = deployed.predict(&dataset()).unwrap();
        assert_eq!(predictions, b.predict(&dataset()).unwrap());

        assert!(!dir.path().join("index.tmp").exists());
        assert!(dir.path().join("v2").join(BUNDLE_FILE).exists());
    }

    #[test]
    fn test_local_store_failures_are_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::open(dir.path()).unwrap();
        let b = bundle();

        fs::write(dir.path().join("v1"), b"not a directory").unwrap();
        assert!(matches!(
            store.put(&b, VersionTag(1)),
            Err(SentinelError::ArtifactStore(_))
        ));
        assert_eq!(store.latest_tag().unwrap(), None);

        store.put(&b, VersionTag(2)).unwrap();
        fs::write(dir.path().join("v2").join(BUNDLE_FILE), b"garbage").unwrap();
        assert!(matches!(
            store.get(VersionSelector::Latest),
            Err(SentinelError::ArtifactStore(_))
        ));

        fs::write(dir.path().join(INDEX_FILE), b"{").unwrap();
        assert!(matches!(
            store.put(&b, VersionTag(3)),
            Err(SentinelError::ArtifactStore(_))
        ));
    }

    #[test]
    fn test_local_store_missing_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::open(dir.path()).unwrap();
        assert_eq!(store.latest_tag().unwrap(), None);
        assert!(store.get(VersionSelector::Tag(VersionTag(5))).is_err());
    }
}
