//! Sessions and the shared service context.
//!
//! There is no global "current user". Each successful login creates a
//! [`SessionSlot`] holding the authenticated identity, that user's workflow,
//! and an in-flight flag. The slot is torn down at logout, or once it has
//! been idle longer than the manager's timeout.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::auth;
use crate::config::Config;
use crate::error::{EduError, Result};
use crate::generator::{self, ContentGenerator, ContentService};
use crate::model::Role;
use crate::progression::StudentFlow;
use crate::store::{JsonFileStore, Records};
use crate::teacher::TeacherFlow;

// ============================================================================
// Services
// ============================================================================

/// Everything a workflow call needs besides its own state.
#[derive(Debug, Clone)]
pub struct Services {
    /// Typed record access.
    pub records: Arc<Records>,
    /// Generated content with fallbacks.
    pub content: ContentService,
    /// Loaded configuration.
    pub config: Arc<Config>,
}

impl Services {
    /// Assembles services from parts.
    #[must_use]
    pub fn new(records: Arc<Records>, content: ContentService, config: Config) -> Self {
        Self {
            records,
            content,
            config: Arc::new(config),
        }
    }

    /// Opens the JSON record store under `dataDir` and the configured generator.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = JsonFileStore::open(Path::new(&config.data_dir))?;
        let records = Records::open(Arc::new(store))?;
        let generator = generator::from_config(&config.generator)?;
        let content = ContentService::new(generator, config.generator.timeout());
        Ok(Self::new(Arc::new(records), content, config))
    }

    /// In-memory records with the given generator.
    #[must_use]
    pub fn in_memory(config: Config, generator: Arc<dyn ContentGenerator>) -> Self {
        let content = ContentService::new(generator, config.generator.timeout());
        Self::new(Arc::new(Records::in_memory()), content, config)
    }
}

// ============================================================================
// Session types
// ============================================================================

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque session id.
    pub id: String,
    /// Authenticated username.
    pub username: String,
    /// Role the user logged in as.
    pub role: Role,
}

/// The workflow bound to a session.
#[derive(Debug)]
pub enum Workflow {
    /// A student's progression.
    Student(StudentFlow),
    /// A teacher's aggregation.
    Teacher(TeacherFlow),
}

/// Flag marking a generation-backed request as outstanding.
#[derive(Debug, Default)]
pub struct InFlight(AtomicBool);

impl InFlight {
    /// Claims the flag, failing if a request is already outstanding.
    pub fn try_acquire(&self) -> Result<InFlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EduError::RequestInFlight)?;
        Ok(InFlightGuard(&self.0))
    }

    /// Returns `true` while a request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the in-flight flag on drop.
#[derive(Debug)]
pub struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Per-session state.
#[derive(Debug)]
pub struct SessionSlot {
    /// The authenticated identity.
    pub session: Session,
    /// The session's workflow.
    pub workflow: Mutex<Workflow>,
    /// Guards against duplicate submissions while generation is pending.
    pub in_flight: InFlight,
    last_seen: std::sync::Mutex<Instant>,
}

impl SessionSlot {
    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time since the session was opened or last resolved.
    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn is_expired(&self, idle_timeout: Duration) -> bool {
        // A busy session is never expired under a running request.
        !self.in_flight.is_busy() && self.idle_for() > idle_timeout
    }
}

// ============================================================================
// SessionManager
// ============================================================================

/// Sessions idle longer than this are dropped unless configured otherwise.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Issues, resolves and tears down sessions.
#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    idle_timeout: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionManager {
    /// Creates a manager with no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager that drops sessions idle longer than `idle_timeout`.
    #[must_use]
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Authenticates and opens a session with the role's workflow.
    pub fn login(
        &self,
        services: &Services,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<Arc<SessionSlot>> {
        auth::login(&services.records, username, password, role)?;
        let username = username.trim();

        let workflow = match role {
            Role::Student => Workflow::Student(StudentFlow::start(services, username)?),
            Role::Teacher => Workflow::Teacher(TeacherFlow::start(services, username)?),
        };
        let slot = Arc::new(SessionSlot {
            session: Session {
                id: uuid::Uuid::new_v4().to_string(),
                username: username.to_string(),
                role,
            },
            workflow: Mutex::new(workflow),
            in_flight: InFlight::default(),
            last_seen: std::sync::Mutex::new(Instant::now()),
        });

        self.prune_idle();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot.session.id.clone(), Arc::clone(&slot));
        info!(username, %role, "Session opened");
        Ok(slot)
    }

    /// Looks up a live session and marks it active.
    ///
    /// An expired session is removed and reported as not found.
    pub fn get(&self, id: &str) -> Result<Arc<SessionSlot>> {
        let slot = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or(EduError::SessionNotFound)?;

        if slot.is_expired(self.idle_timeout) {
            self.sessions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(id);
            info!(username = %slot.session.username, "Session expired");
            return Err(EduError::SessionNotFound);
        }
        slot.touch();
        Ok(slot)
    }

    /// Drops every expired session and returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, slot| !slot.is_expired(self.idle_timeout));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "Pruned idle sessions");
        }
        removed
    }

    /// Ends a session.
    pub fn logout(&self, id: &str) -> Result<()> {
        let slot = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .ok_or(EduError::SessionNotFound)?;
        info!(username = %slot.session.username, "Session closed");
        Ok(())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
