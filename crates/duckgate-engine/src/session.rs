//! The shared DuckDB session.
//!
//! One [`EngineSession`] exists per process. It owns the database and its
//! single connection, and runs the trusted setup sequence lazily on first
//! use.
//!
//! # Initialization
//!
//! [`EngineSession::ensure_initialized`] is backed by a
//! [`tokio::sync::OnceCell`]: the first caller runs the setup sequence and
//! every concurrent caller awaits that same attempt instead of starting its
//! own. If the sequence fails the cell stays empty, the triggering call
//! returns [`EngineError::Initialization`], and the next call reruns the
//! whole sequence from the first step. Every step is idempotent
//! (`INSTALL`, `LOAD`, `SET`, `CREATE OR REPLACE SECRET`,
//! `ATTACH IF NOT EXISTS`) so rerunning after a partial failure is safe.
//!
//! The sequence itself runs on the blocking pool and keeps going when the
//! caller that started it is dropped. Completion is therefore also recorded
//! inside the blocking job, and every attempt checks that record while
//! holding the connection: a sequence that finished for a cancelled caller
//! is never run a second time (after `lock_configuration` a rerun would fail
//! at its first `SET`).
//!
//! # Connection access
//!
//! A DuckDB `Connection` is `Send` but not `Sync`: statements must not be
//! interleaved on it from several threads. All access goes through a
//! FIFO-fair async mutex, and the engine work runs on the blocking pool so
//! request handlers never stall the runtime while a statement executes.

use crate::config::{Completeness, SessionConfig, CATALOG_SECRET_NAME, IN_MEMORY_DATABASE};
use crate::error::{EngineError, Result};
use duckdb::Connection;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};
use tracing::{debug, info, warn, Span};

/// One trusted statement of the setup sequence.
///
/// `Debug` prints only the label: the SQL may embed credentials.
#[derive(Clone)]
pub struct SetupStep {
    label: String,
    sql: String,
}

impl SetupStep {
    fn new(label: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sql: sql.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl fmt::Debug for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SetupStep").field(&self.label).finish()
    }
}

/// Build the ordered setup sequence for `config`.
///
/// Order: working directory, extension directory, extensions, caches,
/// storage credentials, external catalog, custom init statements, local
/// filesystem lockdown, configuration lock.
pub fn setup_plan(config: &SessionConfig) -> Vec<SetupStep> {
    let mut steps = vec![SetupStep::new(
        "set working directory",
        format!(
            "SET home_directory={}",
            quote_literal(&config.working_dir.to_string_lossy())
        ),
    )];

    if let Some(dir) = &config.extension_dir {
        steps.push(SetupStep::new(
            "set extension directory",
            format!(
                "SET extension_directory={}",
                quote_literal(&dir.to_string_lossy())
            ),
        ));
    }

    for ext in config.effective_extensions() {
        let install = match &ext.repository {
            Some(repo) => format!("INSTALL {} FROM {}", ext.name, repo),
            None => format!("INSTALL {}", ext.name),
        };
        steps.push(SetupStep::new(format!("install extension {}", ext), install));
        steps.push(SetupStep::new(
            format!("load extension {}", ext.name),
            format!("LOAD {}", ext.name),
        ));
    }

    if config.http_metadata_cache {
        steps.push(SetupStep::new(
            "enable http metadata cache",
            "SET enable_http_metadata_cache=true",
        ));
    }
    if config.object_cache {
        steps.push(SetupStep::new(
            "enable object cache",
            "SET enable_object_cache=true",
        ));
    }

    if let Completeness::Complete(creds) = config.storage_credentials() {
        steps.push(SetupStep::new(
            "set s3 region",
            format!("SET s3_region={}", quote_literal(&creds.region)),
        ));
        steps.push(SetupStep::new(
            "set s3 access key id",
            format!("SET s3_access_key_id={}", quote_literal(&creds.access_key_id)),
        ));
        steps.push(SetupStep::new(
            "set s3 secret access key",
            format!(
                "SET s3_secret_access_key={}",
                quote_literal(&creds.secret_access_key)
            ),
        ));
    }

    if let Completeness::Complete(catalog) = config.catalog() {
        steps.push(SetupStep::new(
            "create catalog secret",
            format!(
                "CREATE OR REPLACE SECRET {} (TYPE ICEBERG, TOKEN {})",
                CATALOG_SECRET_NAME,
                quote_literal(&catalog.token)
            ),
        ));
        steps.push(SetupStep::new(
            format!("attach catalog {}", catalog.alias),
            format!(
                "ATTACH IF NOT EXISTS {} AS {} (TYPE ICEBERG, ENDPOINT {})",
                quote_literal(&catalog.catalog_id),
                catalog.alias,
                quote_literal(&catalog.endpoint)
            ),
        ));
    }

    for (i, sql) in config.init_sql.iter().enumerate() {
        steps.push(SetupStep::new(
            format!("run init statement #{}", i + 1),
            sql.clone(),
        ));
    }

    if config.disable_local_filesystem {
        steps.push(SetupStep::new(
            "disable local filesystem",
            "SET disabled_filesystems='LocalFileSystem'",
        ));
    }
    if config.lock_configuration {
        steps.push(SetupStep::new(
            "lock configuration",
            "SET lock_configuration=true",
        ));
    }

    steps
}

/// Quote a value as a SQL string literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// The process-wide DuckDB session.
pub struct EngineSession {
    connection: Arc<Mutex<Connection>>,
    config: SessionConfig,
    initialized: OnceCell<()>,
    setup_complete: Arc<AtomicBool>,
    init_attempts: Arc<AtomicUsize>,
    setup_steps_run: Arc<AtomicUsize>,
}

impl EngineSession {
    /// Open the database described by `config`.
    ///
    /// Nothing from the setup sequence runs here; see
    /// [`ensure_initialized`](Self::ensure_initialized).
    pub fn open(config: SessionConfig) -> Result<Self> {
        config.validate()?;

        let mut flags = duckdb::Config::default();
        if config.allow_unsigned_extensions {
            flags = flags.with("allow_unsigned_extensions", "true")?;
        }

        let connection = if config.database == IN_MEMORY_DATABASE {
            Connection::open_in_memory_with_flags(flags)
        } else {
            Connection::open_with_flags(&config.database, flags)
        }
        .map_err(|e| EngineError::Internal(format!("Failed to open DuckDB database: {}", e)))?;

        info!(database = %config.database, "DuckDB session opened");

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            config,
            initialized: OnceCell::new(),
            setup_complete: Arc::new(AtomicBool::new(false)),
            init_attempts: Arc::new(AtomicUsize::new(0)),
            setup_steps_run: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the setup sequence unless it already completed.
    ///
    /// Concurrent first callers share a single attempt.
    pub async fn ensure_initialized(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| self.run_setup())
            .await
            .map(|_| ())
    }

    /// Whether the setup sequence has completed successfully.
    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// How many times the setup sequence has been started.
    pub fn initialization_attempts(&self) -> usize {
        self.init_attempts.load(Ordering::SeqCst)
    }

    /// How many setup statements have executed successfully, across all
    /// attempts.
    pub fn setup_steps_run(&self) -> usize {
        self.setup_steps_run.load(Ordering::SeqCst)
    }

    async fn run_setup(&self) -> Result<()> {
        if let Completeness::Partial(missing) = self.config.storage_credentials() {
            warn!(missing = ?missing, "Incomplete storage credentials, skipping");
        }
        if let Completeness::Partial(missing) = self.config.catalog() {
            warn!(missing = ?missing, "Incomplete external catalog settings, skipping");
        }

        let steps = setup_plan(&self.config);
        let complete = self.setup_complete.clone();
        let attempts = self.init_attempts.clone();
        let counter = self.setup_steps_run.clone();

        let outcome = self
            .with_connection(move |conn| {
                // Checked under the connection lock.
                if complete.load(Ordering::SeqCst) {
                    debug!("Setup sequence already completed by an earlier attempt");
                    return Ok(None);
                }

                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let start = Instant::now();
                info!(attempt, steps = steps.len(), "Initializing DuckDB session");

                for step in &steps {
                    debug!(step = %step.label(), "Running setup step");
                    if let Err(e) = conn.execute_batch(step.sql()) {
                        let err = EngineError::initialization(step.label(), e);
                        warn!(attempt, error = %err, "DuckDB session initialization failed");
                        return Err(err);
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                }

                complete.store(true, Ordering::SeqCst);
                Ok(Some((attempt, start.elapsed())))
            })
            .await;

        match outcome {
            Ok(Some((attempt, elapsed))) => {
                info!(
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "DuckDB session initialized"
                );
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e @ EngineError::Initialization(_)) => Err(e),
            Err(other) => {
                warn!(error = %other, "DuckDB session initialization failed");
                Err(EngineError::Initialization(other.to_string()))
            }
        }
    }

    /// Wait for exclusive use of the connection.
    ///
    /// Waiters are served in arrival order.
    pub(crate) async fn connection(&self) -> OwnedMutexGuard<Connection> {
        self.connection.clone().lock_owned().await
    }

    /// Run `f` against the connection on the blocking pool.
    pub(crate) async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.connection().await;
        let span = Span::current();
        tokio::task::spawn_blocking(move || span.in_scope(|| f(&guard)))
            .await
            .map_err(EngineError::worker)?
    }
}

impl fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSession")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .field("init_attempts", &self.initialization_attempts())
            .finish()
    }
}
