//! Collaborators the server consumes: credential storage and match persistence.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use log::{debug, info};

use crate::common::AuthError;
use crate::game::{Match, MatchId};

/// Credential storage.
pub trait UserStore: Send + Sync {
    /// Returns the identity when the password matches, `None` otherwise.
    fn validate_user(&self, name: &str, password: &str) -> Result<Option<String>, AuthError>;
    fn register_user(&self, name: &str, password: &str) -> Result<(), AuthError>;
    fn load_users(&self) -> Vec<String>;
}

/// Archive of concluded matches.
pub trait MatchStore: Send + Sync {
    fn save_match(&self, game: &Match) -> anyhow::Result<()>;
    fn load_match(&self, id: MatchId) -> anyhow::Result<Option<Match>>;
    /// Highest id already archived, so new ids never collide with saved ones.
    fn max_id(&self) -> MatchId {
        0
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Names are single protocol tokens: no whitespace and none of the reply delimiters.
pub fn valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && name
            .chars()
            .all(|c| !c.is_whitespace() && !matches!(c, ':' | '|' | ',' | ';' | '@'))
}

/// bcrypt-hashed credentials, optionally mirrored to a JSON file.
pub struct FileUserStore {
    path: Option<PathBuf>,
    cost: u32,
    users: Mutex<HashMap<String, String>>,
}

impl FileUserStore {
    /// Volatile store with a cheap hash cost, for tests and simulations.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cost: 4,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Load users from `path` if it exists; new registrations are written back to it.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let users = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            HashMap::new()
        };
        info!("Loaded {} users from {}", users.len(), path.display());
        Ok(Self {
            path: Some(path),
            cost: bcrypt::DEFAULT_COST,
            users: Mutex::new(users),
        })
    }

    fn persist(&self, users: &HashMap<String, String>) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(users)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl UserStore for FileUserStore {
    fn validate_user(&self, name: &str, password: &str) -> Result<Option<String>, AuthError> {
        let hash = match lock(&self.users).get(name) {
            Some(h) => h.clone(),
            None => return Ok(None),
        };
        let ok = bcrypt::verify(password, &hash).map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(ok.then(|| name.to_string()))
    }

    fn register_user(&self, name: &str, password: &str) -> Result<(), AuthError> {
        if !valid_username(name) {
            return Err(AuthError::InvalidName(name.to_string()));
        }
        if lock(&self.users).contains_key(name) {
            return Err(AuthError::UserExists(name.to_string()));
        }
        let hash = bcrypt::hash(password, self.cost).map_err(|e| AuthError::Store(e.to_string()))?;

        let mut users = lock(&self.users);
        if users.contains_key(name) {
            return Err(AuthError::UserExists(name.to_string()));
        }
        users.insert(name.to_string(), hash);
        if let Err(e) = self.persist(&users) {
            users.remove(name);
            return Err(AuthError::Store(e.to_string()));
        }
        debug!("Registered user {}", name);
        Ok(())
    }

    fn load_users(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.users).keys().cloned().collect();
        names.sort();
        names
    }
}

/// Matches archived as bincode files named `<id>.bin`.
pub struct FileMatchStore {
    dir: PathBuf,
}

impl FileMatchStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, id: MatchId) -> PathBuf {
        self.dir.join(format!("{}.bin", id))
    }
}

impl MatchStore for FileMatchStore {
    fn save_match(&self, game: &Match) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let data = bincode::serialize(game)
            .map_err(|e| anyhow::anyhow!("Serialization error: {}", e))?;
        let path = self.path_for(game.id());
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, data).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("renaming to {}", path.display()))?;
        Ok(())
    }

    fn load_match(&self, id: MatchId) -> anyhow::Result<Option<Match>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        let game = bincode::deserialize(&data)
            .map_err(|e| anyhow::anyhow!("Deserialization error: {}", e))?;
        Ok(Some(game))
    }

    fn max_id(&self) -> MatchId {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .filter_map(Result::ok)
            .filter_map(|e| {
                e.path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<MatchId>().ok())
            })
            .max()
            .unwrap_or(0)
    }
}

#[derive(Default)]
pub struct MemoryMatchStore {
    matches: Mutex<HashMap<MatchId, Match>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.matches).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MatchStore for MemoryMatchStore {
    fn save_match(&self, game: &Match) -> anyhow::Result<()> {
        lock(&self.matches).insert(game.id(), game.clone());
        Ok(())
    }

    fn load_match(&self, id: MatchId) -> anyhow::Result<Option<Match>> {
        Ok(lock(&self.matches).get(&id).cloned())
    }

    fn max_id(&self) -> MatchId {
        lock(&self.matches).keys().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StarterPolicy;
    use crate::fleet::FleetRules;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("naval-store-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn register_and_validate() {
        let store = FileUserStore::in_memory();
        store.register_user("ana", "secreto").unwrap();
        assert_eq!(
            store.register_user("ana", "otra"),
            Err(AuthError::UserExists("ana".into()))
        );
        assert_eq!(
            store.register_user("a b", "x"),
            Err(AuthError::InvalidName("a b".into()))
        );
        assert_eq!(store.validate_user("ana", "secreto"), Ok(Some("ana".into())));
        assert_eq!(store.validate_user("ana", "mal"), Ok(None));
        assert_eq!(store.validate_user("nadie", "x"), Ok(None));
        assert_eq!(store.load_users(), vec!["ana".to_string()]);
    }

    #[test]
    fn users_survive_reopen() {
        let dir = scratch_dir("users");
        let path = dir.join("users.json");
        {
            let mut store = FileUserStore::open(&path).unwrap();
            store.cost = 4;
            store.register_user("bea", "pw").unwrap();
        }
        let store = FileUserStore::open(&path).unwrap();
        assert_eq!(store.validate_user("bea", "pw"), Ok(Some("bea".into())));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_match_store_roundtrip() {
        let dir = scratch_dir("matches");
        let store = FileMatchStore::new(&dir);
        assert_eq!(store.max_id(), 0);
        assert!(store.load_match(9).unwrap().is_none());

        let mut game = Match::new(9, "ana", FleetRules::default(), StarterPolicy::Creator);
        game.join("bea").unwrap();
        store.save_match(&game).unwrap();

        let loaded = store.load_match(9).unwrap().unwrap();
        assert_eq!(loaded.opponent(), Some("bea"));
        assert_eq!(store.max_id(), 9);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn match_archive_replaces_whole_file() {
        let dir = scratch_dir("rewrite");
        let store = FileMatchStore::new(&dir);
        let mut game = Match::new(3, "ana", FleetRules::default(), StarterPolicy::Creator);
        store.save_match(&game).unwrap();
        game.join("bea").unwrap();
        store.save_match(&game).unwrap();

        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["3.bin".to_string()]);
        assert_eq!(store.load_match(3).unwrap().unwrap().opponent(), Some("bea"));

        // A leftover partial write is not mistaken for an archived match.
        fs::write(dir.join("7.bin.tmp"), b"partial").unwrap();
        assert_eq!(store.max_id(), 3);
        assert!(store.load_match(7).unwrap().is_none());
        let _ = fs::remove_dir_all(&dir);
    }
}
