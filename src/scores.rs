use crate::terms::Difficulty;
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
};
use tracing::warn;

pub const HIGH_SCORE_KEY: &str = "higherlower-highscore";
pub const CONNECTOR_KEY: &str = "higherlower-connector";
pub const SCORES_FILE: &str = "scores.json";

pub fn mode_score_key(mode: Difficulty) -> String {
    format!("{HIGH_SCORE_KEY}-{}", mode.key())
}

/// Best-effort key-value persistence. Implementations swallow their own failures.
pub trait ScoreStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryScoreStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            entries: Arc::new(Mutex::new(map)),
        }
    }

    pub fn entries(&self) -> Arc<Mutex<HashMap<String, String>>> {
        self.entries.clone()
    }
}

impl ScoreStore for InMemoryScoreStore {
    fn get(&self, key: &str) -> Option<String> {
        let guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard.remove(key);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ScoreFileError {
    #[error("failed to prepare score file at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse score records JSON")]
    Parse(#[from] serde_json::Error),
}

/// Scores kept as a JSON array of [`ScoreRecord`] in a single file.
#[derive(Clone, Debug)]
pub struct JsonFileScoreStore {
    path: PathBuf,
}

impl JsonFileScoreStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ScoreFileError> {
        let path = ensure_store(dir.as_ref())?;
        Ok(Self { path })
    }

    pub fn load(&self) -> Result<Vec<ScoreRecord>, ScoreFileError> {
        read_records(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn upsert(&self, key: &str, value: &str) -> Result<(), ScoreFileError> {
        let mut records = self.load()?;
        let updated_at = Utc::now().to_rfc3339();
        match records.iter_mut().find(|r| r.key == key) {
            Some(existing) => {
                existing.value = value.to_string();
                existing.updated_at = updated_at;
            }
            None => records.push(ScoreRecord {
                key: key.to_string(),
                value: value.to_string(),
                updated_at,
            }),
        }
        write_records(&self.path, &records)
    }

    fn delete(&self, key: &str) -> Result<(), ScoreFileError> {
        let mut records = self.load()?;
        records.retain(|r| r.key != key);
        write_records(&self.path, &records)
    }
}

impl ScoreStore for JsonFileScoreStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.load() {
            Ok(records) => records.into_iter().find(|r| r.key == key).map(|r| r.value),
            Err(err) => {
                warn!(%err, key, "score read failed");
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        if let Err(err) = self.upsert(key, value) {
            warn!(%err, key, "score write failed");
        }
    }

    fn remove(&mut self, key: &str) {
        if let Err(err) = self.delete(key) {
            warn!(%err, key, "score remove failed");
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ScoreFileError {
    move |source| ScoreFileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_store(dir: &Path) -> Result<PathBuf, ScoreFileError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(io_error(dir))?;
    }

    let file_path = dir.join(SCORES_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).map_err(io_error(&file_path))?;
        file.write_all(b"[]").map_err(io_error(&file_path))?;
    }

    Ok(file_path)
}

fn read_records(path: &Path) -> Result<Vec<ScoreRecord>, ScoreFileError> {
    let data = fs::read(path).map_err(io_error(path))?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice::<Vec<ScoreRecord>>(&data)?)
}

fn write_records(path: &Path, records: &[ScoreRecord]) -> Result<(), ScoreFileError> {
    let json = serde_json::to_vec_pretty(records)?;
    fs::write(path, json).map_err(io_error(path))
}

/// Global and per-tier best scores, read once from a [`ScoreStore`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HighScores {
    pub global: u32,
    per_tier: [u32; 3],
}

impl HighScores {
    pub fn hydrate<S: ScoreStore>(store: &S) -> Self {
        let read = |key: &str| {
            store
                .get(key)
                .and_then(|raw| raw.trim().parse::<u32>().ok())
                .unwrap_or(0)
        };
        let mut per_tier = [0; 3];
        for tier in Difficulty::ALL {
            per_tier[tier.ordinal() as usize] = read(&mode_score_key(tier));
        }
        Self {
            global: read(HIGH_SCORE_KEY),
            per_tier,
        }
    }

    pub fn for_tier(&self, tier: Difficulty) -> u32 {
        self.per_tier[tier.ordinal() as usize]
    }

    /// Raises and persists whichever bests `score` beats. Returns true when the
    /// global best moved.
    pub fn record<S: ScoreStore>(
        &mut self,
        store: &mut S,
        tier: Difficulty,
        score: u32,
    ) -> bool {
        let mut raised_global = false;
        if score > self.global {
            self.global = score;
            store.set(HIGH_SCORE_KEY, &score.to_string());
            raised_global = true;
        }
        let slot = &mut self.per_tier[tier.ordinal() as usize];
        if score > *slot {
            *slot = score;
            store.set(&mode_score_key(tier), &score.to_string());
        }
        raised_global
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use tempdir::TempDir;

    #[test]
    fn sut__when_setting_a_key_then_a_fresh_handle_reads_it_back() {
        // given
        let temp_dir = TempDir::new("score_store").unwrap();
        let mut store = JsonFileScoreStore::open(temp_dir.path()).unwrap();

        // when
        store.set(HIGH_SCORE_KEY, "12");
        store.set(HIGH_SCORE_KEY, "14");

        // then
        let reopened = JsonFileScoreStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.get(HIGH_SCORE_KEY).as_deref(), Some("14"));
        assert_eq!(reopened.load().unwrap().len(), 1);
    }

    #[test]
    fn sut__when_file_is_corrupt_then_reads_are_swallowed() {
        // given
        let temp_dir = TempDir::new("score_store_corrupt").unwrap();
        let store = JsonFileScoreStore::open(temp_dir.path()).unwrap();
        fs::write(store.path(), b"{not json").unwrap();

        // when
        let value = store.get(HIGH_SCORE_KEY);

        // then
        assert_eq!(value, None);
    }

    #[test]
    fn sut__when_removing_then_key_is_gone() {
        let temp_dir = TempDir::new("score_store_remove").unwrap();
        let mut store = JsonFileScoreStore::open(temp_dir.path()).unwrap();
        store.set(CONNECTOR_KEY, "injected");
        store.remove(CONNECTOR_KEY);
        assert_eq!(store.get(CONNECTOR_KEY), None);
    }

    #[test]
    fn hydrate__treats_unparsable_values_as_zero() {
        let store = InMemoryScoreStore::with_entries([
            (HIGH_SCORE_KEY, "9"),
            ("higherlower-highscore-hard", "oops"),
            ("higherlower-highscore-easy", "4"),
        ]);
        let scores = HighScores::hydrate(&store);
        assert_eq!(scores.global, 9);
        assert_eq!(scores.for_tier(Difficulty::Easy), 4);
        assert_eq!(scores.for_tier(Difficulty::Hard), 0);
    }

    #[test]
    fn record__only_writes_bests_that_were_beaten() {
        // given
        let mut store = InMemoryScoreStore::with_entries([
            (HIGH_SCORE_KEY, "5"),
            ("higherlower-highscore-medium", "2"),
        ]);
        let mut scores = HighScores::hydrate(&store);

        // when
        let raised = scores.record(&mut store, Difficulty::Medium, 3);

        // then
        assert!(!raised);
        assert_eq!(store.get(HIGH_SCORE_KEY).as_deref(), Some("5"));
        assert_eq!(
            store.get("higherlower-highscore-medium").as_deref(),
            Some("3")
        );
        assert_eq!(scores.for_tier(Difficulty::Medium), 3);
    }
}
