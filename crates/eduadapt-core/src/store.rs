//! Keyed record storage.
//!
//! The store holds four independent collections, each a mapping from username
//! to a JSON record. [`RecordStore`] is the raw contract; [`Records`] is the
//! typed view the workflows use, and it owns the subject-code index.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{EduError, Result};
use crate::model::{ClassGroup, Credential, StudentProfile, SubjectInstance, TeacherProfile};
use crate::scoring::SubjectCode;

// ============================================================================
// Collections
// ============================================================================

/// The four record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Username to [`Credential`].
    Credentials,
    /// Username to [`StudentProfile`].
    StudentProfiles,
    /// Username to [`TeacherProfile`].
    TeacherProfiles,
    /// Username to a list of [`ClassGroup`].
    TeacherGroups,
}

impl Collection {
    /// Every collection.
    pub const ALL: [Self; 4] = [
        Self::Credentials,
        Self::StudentProfiles,
        Self::TeacherProfiles,
        Self::TeacherGroups,
    ];

    /// Stable collection name, also used as the file stem.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::StudentProfiles => "student_profiles",
            Self::TeacherProfiles => "teacher_profiles",
            Self::TeacherGroups => "teacher_groups",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// RecordStore
// ============================================================================

/// Raw keyed storage. Writes are last-write-wins with no versioning.
pub trait RecordStore: Send + Sync {
    /// Reads the record stored under `key`.
    fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>>;

    /// Replaces the record stored under `key`.
    fn put(&self, collection: Collection, key: &str, value: Value) -> Result<()>;

    /// Lists every key in the collection.
    fn keys(&self, collection: Collection) -> Result<Vec<String>>;
}

type Tables = HashMap<Collection, BTreeMap<String, Value>>;

/// In-process store; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.get(&collection).and_then(|t| t.get(key)).cloned())
    }

    fn put(&self, collection: Collection, key: &str, value: Value) -> Result<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables
            .entry(collection)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn keys(&self, collection: Collection) -> Result<Vec<String>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .get(&collection)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default())
    }
}

/// File-backed store: one `<collection>.json` object per collection.
///
/// Collections are read once at open and cached. Every put rewrites the
/// collection file through a temporary file and a rename, so a reader never
/// observes a half-written file.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    tables: RwLock<Tables>,
}

impl JsonFileStore {
    /// Opens (creating if needed) the store directory and loads every collection.
    ///
    /// # Errors
    ///
    /// Returns `EduError::StoreCorrupted` if a collection file is not a JSON object.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut tables = Tables::new();
        for collection in Collection::ALL {
            let path = Self::collection_path(&dir, collection);
            let table = Self::read_table(&path)?;
            debug!(collection = %collection, records = table.len(), "Loaded collection");
            tables.insert(collection, table);
        }

        info!(dir = %dir.display(), "Opened record store");
        Ok(Self {
            dir,
            tables: RwLock::new(tables),
        })
    }

    /// The store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collection_path(dir: &Path, collection: Collection) -> PathBuf {
        dir.join(format!("{}.json", collection.name()))
    }

    fn read_table(path: &Path) -> Result<BTreeMap<String, Value>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| EduError::store_corrupted(path, e.to_string()))
    }

    fn write_table(&self, collection: Collection, table: &BTreeMap<String, Value>) -> Result<()> {
        let path = Self::collection_path(&self.dir, collection);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(table)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), records = table.len(), "Wrote collection");
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.get(&collection).and_then(|t| t.get(key)).cloned())
    }

    fn put(&self, collection: Collection, key: &str, value: Value) -> Result<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut table = tables.get(&collection).cloned().unwrap_or_default();
        table.insert(key.to_string(), value);
        // The cache only changes once the file write succeeded.
        self.write_table(collection, &table)?;
        tables.insert(collection, table);
        Ok(())
    }

    fn keys(&self, collection: Collection) -> Result<Vec<String>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .get(&collection)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// Records
// ============================================================================

/// The (student, subject) pair a lookup code resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeOwner {
    /// Owning student's username.
    pub username: String,
    /// The subject's id within that profile.
    pub subject_id: String,
}

/// Typed access to the record store plus the subject-code index.
///
/// The index maps every normalized subject code to its owner. It is rebuilt
/// from the student profiles at open and kept in step with every profile
/// write, so lookups never scan profiles.
pub struct Records {
    store: Arc<dyn RecordStore>,
    code_index: RwLock<HashMap<String, CodeOwner>>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for Records {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records")
            .field("indexed_codes", &self.indexed_codes())
            .finish_non_exhaustive()
    }
}

impl Records {
    /// Wraps a store and builds the code index from its student profiles.
    pub fn open(store: Arc<dyn RecordStore>) -> Result<Self> {
        let records = Self {
            store,
            code_index: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        };
        records.rebuild_index()?;
        Ok(records)
    }

    /// An empty in-memory instance.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            code_index: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    fn rebuild_index(&self) -> Result<()> {
        let mut index = HashMap::new();
        for username in self.store.keys(Collection::StudentProfiles)? {
            let Some(profile) = self.student_profile(&username)? else {
                continue;
            };
            for subject in &profile.subjects {
                index.insert(
                    SubjectCode::normalize(&subject.code),
                    CodeOwner {
                        username: profile.username.clone(),
                        subject_id: subject.id.clone(),
                    },
                );
            }
        }
        info!(codes = index.len(), "Built subject code index");
        *self
            .code_index
            .write()
            .unwrap_or_else(PoisonError::into_inner) = index;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, collection: Collection, key: &str) -> Result<Option<T>> {
        self.store
            .get(collection, key)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    fn write<T: Serialize + ?Sized>(&self, collection: Collection, key: &str, value: &T) -> Result<()> {
        self.store
            .put(collection, key, serde_json::to_value(value)?)
    }

    // ------------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------------

    /// Looks up a credential by username.
    pub fn credential(&self, username: &str) -> Result<Option<Credential>> {
        self.read(Collection::Credentials, username)
    }

    /// Inserts a credential, failing if the username is taken under any role.
    pub fn insert_credential(&self, credential: &Credential) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.store.get(Collection::Credentials, &credential.username)?.is_some() {
            return Err(EduError::user_exists(&credential.username));
        }
        self.write(Collection::Credentials, &credential.username, credential)
    }

    // ------------------------------------------------------------------------
    // Student profiles
    // ------------------------------------------------------------------------

    /// Loads a student's profile.
    pub fn student_profile(&self, username: &str) -> Result<Option<StudentProfile>> {
        self.read(Collection::StudentProfiles, username)
    }

    /// Persists a student's profile and re-syncs that student's index entries.
    pub fn save_student_profile(&self, profile: &StudentProfile) -> Result<()> {
        self.write(Collection::StudentProfiles, &profile.username, profile)?;

        let mut index = self
            .code_index
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        index.retain(|_, owner| {
            owner.username != profile.username
                || profile.subject(&owner.subject_id).is_some()
        });
        for subject in &profile.subjects {
            index.insert(
                SubjectCode::normalize(&subject.code),
                CodeOwner {
                    username: profile.username.clone(),
                    subject_id: subject.id.clone(),
                },
            );
        }
        debug!(username = %profile.username, subjects = profile.subjects.len(), "Saved student profile");
        Ok(())
    }

    /// Creates a subject with a freshly minted code reserved for `username`.
    ///
    /// The code is claimed in the index immediately, so two subjects created
    /// before either profile is saved still get distinct codes.
    pub fn new_subject(&self, username: &str, name: &str) -> Result<SubjectInstance> {
        let mut index = self
            .code_index
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let code = SubjectCode::mint(name, &mut rand::thread_rng(), |c| index.contains_key(c))?;
        let subject = SubjectInstance::new(name.trim(), code);
        index.insert(
            SubjectCode::normalize(&subject.code),
            CodeOwner {
                username: username.to_string(),
                subject_id: subject.id.clone(),
            },
        );
        debug!(username, code = %subject.code, "Minted subject code");
        Ok(subject)
    }

    /// Number of codes in the index, reservations included.
    #[must_use]
    pub fn indexed_codes(&self) -> usize {
        self.code_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops index reservations for subjects that were never persisted.
    ///
    /// Entries now owned by a different subject are left alone.
    pub fn release_codes(&self, subjects: &[SubjectInstance]) {
        let mut index = self
            .code_index
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for subject in subjects {
            let key = SubjectCode::normalize(&subject.code);
            if index.get(&key).is_some_and(|o| o.subject_id == subject.id) {
                index.remove(&key);
                debug!(code = %subject.code, "Released subject code");
            }
        }
    }

    /// Resolves a lookup code to its owner, comparing case-insensitively.
    pub fn code_owner(&self, code: &str) -> Option<CodeOwner> {
        self.code_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&SubjectCode::normalize(code))
            .cloned()
    }

    /// Resolves a lookup code to the owning profile and subject.
    ///
    /// Returns `None` when the code is unknown or its reservation was never
    /// persisted with a profile.
    pub fn resolve_code(&self, code: &str) -> Result<Option<(StudentProfile, SubjectInstance)>> {
        let Some(owner) = self.code_owner(code) else {
            return Ok(None);
        };
        let Some(profile) = self.student_profile(&owner.username)? else {
            return Ok(None);
        };
        let subject = profile.subject(&owner.subject_id).cloned();
        Ok(subject.map(|s| (profile, s)))
    }

    // ------------------------------------------------------------------------
    // Teacher records
    // ------------------------------------------------------------------------

    /// Loads a teacher's profile.
    pub fn teacher_profile(&self, username: &str) -> Result<Option<TeacherProfile>> {
        self.read(Collection::TeacherProfiles, username)
    }

    /// Persists a teacher's profile.
    pub fn save_teacher_profile(&self, profile: &TeacherProfile) -> Result<()> {
        self.write(Collection::TeacherProfiles, &profile.username, profile)
    }

    /// Loads a teacher's groups, empty if none were saved.
    pub fn groups(&self, username: &str) -> Result<Vec<ClassGroup>> {
        Ok(self
            .read(Collection::TeacherGroups, username)?
            .unwrap_or_default())
    }

    /// Replaces a teacher's group list.
    pub fn save_groups(&self, username: &str, groups: &[ClassGroup]) -> Result<()> {
        self.write(Collection::TeacherGroups, username, groups)?;
        debug!(username, groups = groups.len(), "Saved teacher groups");
        Ok(())
    }

    /// Usernames of every teacher with at least one saved group list.
    pub fn teachers_with_groups(&self) -> Result<Vec<String>> {
        self.store.keys(Collection::TeacherGroups)
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{LearningStyle, ProficiencyLevel, Role};

    fn profile(username: &str, subjects: Vec<SubjectInstance>) -> StudentProfile {
        StudentProfile {
            username: username.to_string(),
            name: "Alice".to_string(),
            school: "North".to_string(),
            grade: "5th".to_string(),
            division: "B".to_string(),
            learning_style: LearningStyle::Visual,
            current_level: ProficiencyLevel::Intermediate,
            weak_areas: vec!["Algebra".to_string()],
            interests: Vec::new(),
            subjects,
        }
    }

    #[test]
    fn test_memory_store_get_put_keys() {
        let store = MemoryStore::new();
        assert!(store.get(Collection::Credentials, "a").unwrap().is_none());

        store.put(Collection::Credentials, "a", json!({"x": 1})).unwrap();
        store.put(Collection::Credentials, "a", json!({"x": 2})).unwrap();
        store.put(Collection::TeacherGroups, "t", json!([])).unwrap();

        assert_eq!(
            store.get(Collection::Credentials, "a").unwrap(),
            Some(json!({"x": 2}))
        );
        assert_eq!(store.keys(Collection::Credentials).unwrap(), vec!["a"]);
        assert!(store.keys(Collection::StudentProfiles).unwrap().is_empty());
    }

    #[test]
    fn test_json_file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).unwrap();
            store
                .put(Collection::TeacherProfiles, "bob", json!({"firstName": "Bob"}))
                .unwrap();
        }
        assert!(dir.path().join("teacher_profiles.json").exists());
        assert!(!dir.path().join("teacher_profiles.json.tmp").exists());

        let store = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get(Collection::TeacherProfiles, "bob").unwrap(),
            Some(json!({"firstName": "Bob"}))
        );
        assert_eq!(store.dir(), dir.path());
    }

    #[test]
    fn test_json_file_store_rejects_corrupted_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("credentials.json"), "[1, 2").unwrap();

        let err = JsonFileStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, EduError::StoreCorrupted { .. }));
    }

    #[test]
    fn test_insert_credential_is_unique_across_roles() {
        let records = Records::in_memory();
        let cred = Credential {
            username: "alice".to_string(),
            password: "pw1".to_string(),
            role: Role::Student,
        };
        records.insert_credential(&cred).unwrap();

        let teacher = Credential {
            role: Role::Teacher,
            ..cred.clone()
        };
        let err = records.insert_credential(&teacher).unwrap_err();
        assert!(matches!(err, EduError::UserExists { .. }));
        assert_eq!(records.credential("alice").unwrap(), Some(cred));
    }

    #[test]
    fn test_code_resolves_after_profile_save() {
        let records = Records::in_memory();
        let subject = records.new_subject("alice", "Algebra").unwrap();
        let code = subject.code.clone();
        assert!(code.starts_with("ALG-"));

        // Reserved but not yet persisted.
        assert!(records.code_owner(&code).is_some());
        assert!(records.resolve_code(&code).unwrap().is_none());

        records
            .save_student_profile(&profile("alice", vec![subject.clone()]))
            .unwrap();

        let (owner, found) = records
            .resolve_code(&code.to_lowercase())
            .unwrap()
            .unwrap();
        assert_eq!(owner.username, "alice");
        assert_eq!(found.id, subject.id);
    }

    #[test]
    fn test_release_codes_only_drops_own_reservation() {
        let records = Records::in_memory();
        let kept = records.new_subject("alice", "Algebra").unwrap();
        let dropped = records.new_subject("alice", "History").unwrap();

        // A stale subject carrying the kept code must not evict it.
        let stale = SubjectInstance::new("Algebra", kept.code.clone());
        records.release_codes(&[dropped.clone(), stale]);

        assert!(records.code_owner(&dropped.code).is_none());
        assert_eq!(records.code_owner(&kept.code).unwrap().subject_id, kept.id);
    }

    #[test]
    fn test_index_rebuilt_at_open() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let subject = SubjectInstance::new("History", "HIS-4821");
        store
            .put(
                Collection::StudentProfiles,
                "alice",
                serde_json::to_value(profile("alice", vec![subject])).unwrap(),
            )
            .unwrap();

        let records = Records::open(store).unwrap();
        let owner = records.code_owner(" his-4821 ").unwrap();
        assert_eq!(owner.username, "alice");
        assert!(records.code_owner("HIS-0000").is_none());
    }

    #[test]
    fn test_minted_codes_are_distinct() {
        let records = Records::in_memory();
        let mut codes = std::collections::HashSet::new();
        for _ in 0..200 {
            let subject = records.new_subject("alice", "Algebra").unwrap();
            assert!(codes.insert(subject.code));
        }
    }

    #[test]
    fn test_groups_default_to_empty() {
        let records = Records::in_memory();
        assert!(records.groups("bob").unwrap().is_empty());

        let group = ClassGroup::new("X", "5th", "B").unwrap();
        records.save_groups("bob", &[group.clone()]).unwrap();
        assert_eq!(records.groups("bob").unwrap(), vec![group]);
        assert_eq!(records.teachers_with_groups().unwrap(), vec!["bob"]);
    }
}
