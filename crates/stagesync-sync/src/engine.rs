//! Sync orchestrator
//!
//! The [`SyncEngine`] runs one pass at a time between the local data store
//! and the team snapshot held by an [`ISyncProvider`].
//!
//! ## Pass Flow
//!
//! 1. **Fetch**: Download the team snapshot into a freshly wiped scratch
//!    directory. No snapshot means the local data is simply uploaded.
//! 2. **Reconcile**: Load the change ledger, then reconcile every snapshot
//!    entry concurrently against the local store, followed by local-only
//!    entities.
//! 3. **Publish**: Unless the method is read-only, stage the local store,
//!    compress it together with the updated ledger and upload it.
//! 4. **Backup**: Refresh the team's official backup in the background.
//!
//! Per-entity failures are collected in [`SyncReport::errors`] and never
//! abort the pass. The ledger lives behind a lock that is only ever held
//! for synchronous decision steps, never across an await.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use stagesync_core::config::Config;
use stagesync_core::domain::device::resolve_device_id;
use stagesync_core::domain::entity::{
    classify_entry, is_present, show_file_name, BIBLES_STORE, BIBLE_PREFIX, SHOWS_STORE,
    SHOW_EXTENSION,
};
use stagesync_core::domain::{
    ChangeLedger, ChurchRef, DeviceId, EntityCategory, EntityKey, LedgerError, MergeStrategy,
    NamingScheme, StoreId, SyncMethod, SyncSession, TeamRef, Verdict, LEDGER_ENTRY_NAME,
    LEDGER_VERSION,
};
use stagesync_core::ports::{INotificationService, ISyncProvider, Notification, Team};
use stagesync_core::usecases::{
    check_cloud_entry, check_local_entry, is_cloud_newer_than_file, CloudEntry, LocalEntry,
};

use crate::archive::{self, ArchiveEntry, ExtractedEntry};
use crate::background::{BackgroundTasks, ShutdownMode};
use crate::backup::{refresh_backup, BackupOutcome, BackupPolicy};
use crate::export::export_snapshot;
use crate::rotation::{self, RotationPolicy};
use crate::store::{remove_dir_all, LocalDataStore};
use crate::SyncError;

/// Subdirectory of the scratch dir the snapshot is extracted into
const SNAPSHOT_DIR: &str = "snapshot";

/// Subdirectory of the scratch dir the local store is staged in
const STAGING_DIR: &str = "Backup";

/// Rotation archive names: local wall-clock time of the upload
const TIMEPOINT_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

// ============================================================================
// SyncRequest / SyncReport
// ============================================================================

/// Parameters of one sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Church owning the team
    pub church: ChurchRef,
    /// Team whose snapshot to sync with
    pub team: TeamRef,
    /// How local and cloud data are combined
    pub method: SyncMethod,
    /// The application is closing; skip background work
    pub closing: bool,
}

impl SyncRequest {
    /// A regular merge pass
    pub fn new(church: ChurchRef, team: TeamRef) -> Self {
        Self {
            church,
            team,
            method: SyncMethod::Merge,
            closing: false,
        }
    }

    /// Sets the sync method
    pub fn with_method(mut self, method: SyncMethod) -> Self {
        self.method = method;
        self
    }

    /// Marks the pass as the last one before exit
    pub fn closing(mut self, closing: bool) -> Self {
        self.closing = closing;
        self
    }
}

/// Summary of a completed sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// The pass completed and, unless read-only, the upload was accepted
    pub success: bool,
    /// Entities written or deleted locally
    pub changed_files: Vec<String>,
    /// Entities created or overwritten from the snapshot
    pub downloaded: u32,
    /// Entities where the local copy won and goes out with the upload
    pub uploaded: u32,
    /// Entities deleted locally
    pub deleted: u32,
    /// Entities left alone
    pub skipped: u32,
    /// Non-fatal errors, one per failed entity
    pub errors: Vec<String>,
    /// Wall-clock duration of the pass in milliseconds
    pub duration_ms: u64,
    /// Why the pass failed, if it did
    pub error: Option<String>,
}

impl SyncReport {
    /// A report for a pass that could not run
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Total number of local changes
    pub fn change_count(&self) -> usize {
        self.changed_files.len()
    }

    fn absorb(&mut self, outcome: Outcome) {
        self.downloaded += outcome.downloaded;
        self.uploaded += outcome.uploaded;
        self.deleted += outcome.deleted;
        self.skipped += outcome.skipped;
        self.changed_files.extend(outcome.changed);
        self.errors.extend(outcome.errors);
    }
}

// ============================================================================
// EngineSettings
// ============================================================================

/// Tunables of a [`SyncEngine`]
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Scratch directory snapshots are extracted into
    pub scratch_dir: PathBuf,
    /// Keep the scratch directory and skip background backups
    pub keep_scratch: bool,
    /// Wall-clock budget of [`SyncEngine::sync_data`]
    pub timeout: Duration,
    /// Local rotation rules
    pub rotation: RotationPolicy,
    /// Official backup rules
    pub backup: BackupPolicy,
}

impl EngineSettings {
    /// Default settings using `scratch_dir`
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            keep_scratch: false,
            timeout: Duration::from_secs(300),
            rotation: RotationPolicy::default(),
            backup: BackupPolicy::default(),
        }
    }

    /// Settings taken from the configuration file
    pub fn from_config(config: &Config) -> Self {
        Self {
            scratch_dir: config.sync.scratch_dir.clone(),
            keep_scratch: config.sync.keep_scratch,
            timeout: Duration::from_secs(config.sync.timeout_secs),
            rotation: RotationPolicy::from(&config.backup),
            backup: BackupPolicy::from(&config.backup),
        }
    }

    fn backup_scratch_dir(&self) -> PathBuf {
        sibling_dir(&self.scratch_dir, "backup")
    }

    fn inspect_scratch_dir(&self) -> PathBuf {
        sibling_dir(&self.scratch_dir, "inspect")
    }
}

fn sibling_dir(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir.as_os_str().to_owned();
    name.push("-");
    name.push(suffix);
    PathBuf::from(name)
}

// ============================================================================
// Pass bookkeeping
// ============================================================================

/// Tally of one part of a pass
#[derive(Debug, Default)]
struct Outcome {
    downloaded: u32,
    uploaded: u32,
    deleted: u32,
    skipped: u32,
    changed: Vec<String>,
    errors: Vec<String>,
}

impl Outcome {
    fn record(&mut self, verdict: Verdict, name: impl Into<String>) {
        match verdict {
            Verdict::Skip => self.skipped += 1,
            Verdict::Upload => self.uploaded += 1,
            Verdict::Create | Verdict::Download => {
                self.downloaded += 1;
                self.changed.push(name.into());
            }
            Verdict::Delete => {
                self.deleted += 1;
                self.changed.push(name.into());
            }
        }
    }

    fn error(&mut self, msg: String) {
        warn!(%msg);
        self.errors.push(msg);
    }

    fn merge(&mut self, other: Outcome) {
        self.downloaded += other.downloaded;
        self.uploaded += other.uploaded;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.changed.extend(other.changed);
        self.errors.extend(other.errors);
    }
}

/// State shared by the concurrent reconcile steps of one pass
struct Pass {
    session: Mutex<SyncSession>,
    method: SyncMethod,
    dates: HashMap<String, DateTime<Utc>>,
}

impl Pass {
    fn session(&self) -> MutexGuard<'_, SyncSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self) -> bool {
        self.method == SyncMethod::Replace
    }

    fn is_new_device(&self) -> bool {
        self.session().is_new_device()
    }

    fn cloud_date(&self, entry: &str) -> Option<DateTime<Utc>> {
        self.dates.get(entry).copied()
    }

    fn check_cloud(
        &self,
        key: &EntityKey,
        cloud: CloudEntry<'_>,
        local: LocalEntry<'_>,
    ) -> Verdict {
        check_cloud_entry(&mut self.session(), key, cloud, local)
    }

    fn check_local(&self, key: &EntityKey) -> Verdict {
        check_local_entry(&mut self.session(), key)
    }

    fn acknowledge(&self, key: &EntityKey, verdict: Verdict) {
        self.session().acknowledge(key, verdict);
    }

    fn into_session(self) -> SyncSession {
        self.session.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the busy flag when a pass ends, however it ends
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SyncError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Parses a downloaded ledger, falling back to `None` on any problem
fn parse_ledger(bytes: &[u8]) -> Option<ChangeLedger> {
    match ChangeLedger::from_json(bytes) {
        Ok(ledger) => Some(ledger),
        Err(LedgerError::VersionMismatch { found }) => {
            warn!(%found, expected = LEDGER_VERSION, "Ignoring change ledger from another version");
            None
        }
        Err(e) => {
            warn!(error = %e, "Ignoring malformed change ledger");
            None
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && Path::new(name).file_name() == Some(OsStr::new(name))
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Multi-device sync orchestrator
pub struct SyncEngine {
    provider: Arc<dyn ISyncProvider>,
    notifier: Arc<dyn INotificationService>,
    store: LocalDataStore,
    device: DeviceId,
    settings: EngineSettings,
    busy: AtomicBool,
    carried: Mutex<Option<ChangeLedger>>,
    background: BackgroundTasks,
}

impl SyncEngine {
    /// Creates a new sync engine
    ///
    /// # Arguments
    /// * `provider` - Remote team storage
    /// * `notifier` - Receives local data change notifications
    /// * `store` - The local data store
    /// * `device` - This installation's identifier
    /// * `settings` - Scratch location and policies
    pub fn new(
        provider: Arc<dyn ISyncProvider>,
        notifier: Arc<dyn INotificationService>,
        store: LocalDataStore,
        device: DeviceId,
        settings: EngineSettings,
    ) -> Self {
        Self {
            provider,
            notifier,
            store,
            device,
            settings,
            busy: AtomicBool::new(false),
            carried: Mutex::new(None),
            background: BackgroundTasks::new(),
        }
    }

    /// Creates an engine from the configuration file
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn ISyncProvider>,
        notifier: Arc<dyn INotificationService>,
    ) -> Self {
        Self::new(
            provider,
            notifier,
            LocalDataStore::new(config.sync.data_dir.clone()),
            resolve_device_id(config.device.id.as_ref()),
            EngineSettings::from_config(config),
        )
    }

    // --- Getters ---

    /// This installation's identifier
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// The local data store
    pub fn store(&self) -> &LocalDataStore {
        &self.store
    }

    /// Whether a pass is running
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Background work started by earlier passes
    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Ledger carried over from the last pass, used by upload-only passes
    ///
    /// A fresh engine carries nothing; its first upload-only pass reads the
    /// team's ledger from the provider instead.
    pub fn carried_ledger(&self) -> Option<ChangeLedger> {
        self.carried
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn carry(&self, ledger: ChangeLedger) {
        *self.carried.lock().unwrap_or_else(PoisonError::into_inner) = Some(ledger);
    }

    // --- Provider queries ---

    /// Checks whether the provider is reachable
    pub async fn can_sync(&self) -> anyhow::Result<bool> {
        self.provider.has_valid_connection().await
    }

    /// Lists the teams the provider offers
    pub async fn list_teams(&self) -> anyhow::Result<Vec<Team>> {
        self.provider.list_teams().await
    }

    /// Checks whether a team has uploaded a snapshot
    pub async fn has_team_data(&self, church: &ChurchRef, team: &TeamRef) -> anyhow::Result<bool> {
        self.provider.existing_data(church, team).await
    }

    /// Checks whether a team's snapshot changed since the provider last saw it
    pub async fn has_data_changed(
        &self,
        church: &ChurchRef,
        team: &TeamRef,
    ) -> anyhow::Result<bool> {
        self.provider.has_changed(church, team).await
    }

    /// Downloads a team's snapshot and reads only its change ledger
    ///
    /// # Returns
    /// `None` if the team has no snapshot or its ledger is missing or unusable
    #[tracing::instrument(skip(self))]
    pub async fn fetch_remote_ledger(
        &self,
        church: &ChurchRef,
        team: &TeamRef,
    ) -> Result<Option<ChangeLedger>, SyncError> {
        let dir = self.settings.inspect_scratch_dir();
        remove_dir_all(&dir).await?;
        tokio::fs::create_dir_all(&dir).await?;

        let result = self.read_remote_ledger(church, team, &dir).await;

        if let Err(e) = remove_dir_all(&dir).await {
            debug!(error = %e, "could not remove inspection directory");
        }
        result
    }

    async fn read_remote_ledger(
        &self,
        church: &ChurchRef,
        team: &TeamRef,
        dir: &Path,
    ) -> Result<Option<ChangeLedger>, SyncError> {
        let Some(archive) = self
            .provider
            .fetch_snapshot(church, team, dir)
            .await
            .map_err(SyncError::ProviderError)?
        else {
            return Ok(None);
        };
        let bytes = archive::read_entry(&archive, LEDGER_ENTRY_NAME).await?;
        Ok(bytes.as_deref().and_then(parse_ledger))
    }

    // --- Passes ---

    /// Runs a sync pass and folds any failure into the report
    ///
    /// The pass runs as a background task. Once the configured timeout
    /// elapses the report says so, but the pass itself keeps running and
    /// holds the busy flag until it finishes; [`SyncEngine::shutdown`] waits
    /// for it like any other background task. The user is notified of
    /// failures and of passes that changed local data.
    pub async fn sync_data(self: &Arc<Self>, request: &SyncRequest) -> SyncReport {
        let (tx, rx) = oneshot::channel();
        let engine = Arc::clone(self);
        let pass_request = request.clone();
        self.background.spawn("sync pass", async move {
            let result = engine.sync(&pass_request).await;
            if tx.send(result).is_err() {
                info!("Timed-out sync pass finished");
            }
        });

        let report = match tokio::time::timeout(self.settings.timeout, rx).await {
            Ok(Ok(Ok(report))) => report,
            Ok(Ok(Err(e))) => SyncReport::failed(e.to_string()),
            Ok(Err(_)) => SyncReport::failed("Sync pass was cancelled"),
            Err(_) => {
                warn!(
                    timeout_secs = self.settings.timeout.as_secs(),
                    "Sync pass timed out; letting it finish in the background"
                );
                SyncReport::failed(format!(
                    "Sync timed out after {}s",
                    self.settings.timeout.as_secs()
                ))
            }
        };

        let notification = match (&report.error, report.success) {
            (Some(error), _) => Some(Notification::error("Sync failed", error.clone())),
            (None, false) => Some(Notification::error(
                "Sync failed",
                "The provider did not accept the upload",
            )),
            (None, true) if report.change_count() > 0 => Some(Notification::sync(
                "Synced",
                format!("{} local changes from the team", report.change_count()),
            )),
            _ => None,
        };
        if let Some(notification) = notification {
            if let Err(e) = self.notifier.notify(&notification).await {
                debug!(error = %e, "notification failed");
            }
        }

        report
    }

    /// Runs one sync pass
    ///
    /// # Errors
    /// - [`SyncError::AlreadyRunning`] if another pass is in progress
    /// - [`SyncError::ScratchOverlapsData`] if wiping the scratch directory
    ///   would touch the local data
    /// - Fetch, extraction, and upload transport failures
    #[tracing::instrument(skip(self), fields(team = %request.team, method = %request.method))]
    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncReport, SyncError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let scratch = &self.settings.scratch_dir;
        let root = self.store.root();
        if scratch.starts_with(root) || root.starts_with(scratch) {
            warn!(
                scratch = %scratch.display(),
                data = %root.display(),
                "Refusing to wipe data directory"
            );
            return Err(SyncError::ScratchOverlapsData(scratch.clone()));
        }
        let start = Instant::now();
        info!(device = %self.device, "Starting sync pass");

        let result = self.run_pass(request).await;

        if !self.settings.keep_scratch {
            if let Err(e) = remove_dir_all(&self.settings.scratch_dir).await {
                warn!(error = %e, "Could not remove scratch directory");
            }
        }

        let mut report = result?;
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            success = report.success,
            downloaded = report.downloaded,
            uploaded = report.uploaded,
            deleted = report.deleted,
            skipped = report.skipped,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "Sync pass finished"
        );
        Ok(report)
    }

    /// Stops background work
    pub async fn shutdown(&self, mode: ShutdownMode) {
        self.background.shutdown(mode).await;
    }

    async fn run_pass(&self, request: &SyncRequest) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        if request.method == SyncMethod::Upload {
            let carried = match self.carried_ledger() {
                Some(ledger) => ledger,
                None => {
                    debug!("No carried ledger; reading the team's ledger before upload");
                    self.fetch_remote_ledger(&request.church, &request.team)
                        .await?
                        .unwrap_or_default()
                }
            };
            let session = SyncSession::resume(self.device.clone(), carried);
            report.success = self.publish(request, &session).await?;
            return Ok(report);
        }

        let scratch = &self.settings.scratch_dir;
        remove_dir_all(scratch).await?;
        tokio::fs::create_dir_all(scratch).await?;

        let fetched = self
            .provider
            .fetch_snapshot(&request.church, &request.team, scratch)
            .await
            .map_err(SyncError::ProviderError)?;

        let Some(snapshot) = fetched else {
            let session = SyncSession::begin(self.device.clone(), None);
            if request.method.is_read_only() {
                info!("Team has no snapshot yet; nothing to read");
                self.carry(session.into_ledger(Utc::now()));
                report.success = true;
            } else {
                info!("Team has no snapshot yet; uploading local data");
                report.success = self.publish(request, &session).await?;
            }
            return Ok(report);
        };

        let entries = archive::extract(&snapshot, &scratch.join(SNAPSHOT_DIR)).await?;
        let dates = archive::entry_dates(&snapshot).await?;
        let remote = self.load_ledger(&entries).await;

        if request.method == SyncMethod::Replace {
            info!("Clearing local shows before replacing them");
            self.store.wipe_dir(&self.store.shows_dir()).await?;
        }

        let session = SyncSession::begin(self.device.clone(), remote);
        info!(
            session = %session.id(),
            new_device = session.is_new_device(),
            devices = session.ledger().devices().len(),
            entries = entries.len(),
            "Reconciling snapshot"
        );

        let pass = Pass {
            session: Mutex::new(session),
            method: request.method,
            dates,
        };

        let outcomes =
            join_all(entries.iter().map(|entry| self.reconcile_entry(&pass, entry))).await;
        let mut outcome = Outcome::default();
        for part in outcomes {
            outcome.merge(part);
        }

        let cloud_scriptures: HashSet<&str> = entries
            .iter()
            .filter_map(|entry| entry.name.strip_prefix(BIBLE_PREFIX))
            .collect();
        outcome.merge(self.reconcile_local_scriptures(&pass, &cloud_scriptures).await);

        report.absorb(outcome);
        let session = pass.into_session();

        report.success = if request.method.is_read_only() {
            self.carry(session.into_ledger(Utc::now()));
            true
        } else {
            self.publish(request, &session).await?
        };
        Ok(report)
    }

    async fn load_ledger(&self, entries: &[ExtractedEntry]) -> Option<ChangeLedger> {
        let Some(entry) = entries.iter().find(|e| e.name == LEDGER_ENTRY_NAME) else {
            info!("Snapshot has no change ledger");
            return None;
        };
        match tokio::fs::read(&entry.path).await {
            Ok(bytes) => parse_ledger(&bytes),
            Err(e) => {
                warn!(error = %e, "Could not read change ledger");
                None
            }
        }
    }

    // --- Reconciliation ---

    async fn reconcile_entry(&self, pass: &Pass, entry: &ExtractedEntry) -> Outcome {
        if entry.name == LEDGER_ENTRY_NAME {
            return Outcome::default();
        }

        let Some((store, category)) = classify_entry(&entry.name) else {
            warn!(entry = %entry.name, "No local store for cloud data");
            return Outcome::default();
        };

        if category == EntityCategory::FileCollection(NamingScheme::Scriptures) {
            return self.reconcile_scripture(pass, &store, entry).await;
        }
        if category == EntityCategory::Ignored {
            return Outcome::default();
        }

        let content = match tokio::fs::read(&entry.path).await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(content) => content,
                Err(e) => {
                    warn!(
                        entry = %entry.name,
                        error = %e,
                        "Skipping cloud entry that is not valid JSON"
                    );
                    return Outcome::default();
                }
            },
            Err(e) => {
                let mut outcome = Outcome::default();
                outcome.error(format!("{}: {e}", entry.name));
                return outcome;
            }
        };

        match category {
            EntityCategory::FileCollection(_) => self.reconcile_shows(pass, content).await,
            EntityCategory::Document(_) if pass.replace() => {
                self.replace_document(pass, &store, entry, &content).await
            }
            EntityCategory::FullReplace => {
                self.replace_document(pass, &store, entry, &content).await
            }
            EntityCategory::Document(strategy) => {
                self.merge_document(pass, &store, strategy, content).await
            }
            EntityCategory::Ignored => Outcome::default(),
        }
    }

    /// Takes the cloud copy of a whole store when it is newer
    async fn replace_document(
        &self,
        pass: &Pass,
        store: &StoreId,
        entry: &ExtractedEntry,
        content: &Value,
    ) -> Outcome {
        let mut outcome = Outcome::default();
        let target = self.store.document_path(store);

        let take = if pass.replace() || pass.is_new_device() {
            true
        } else {
            match self.store.file_state(&target).await {
                Ok(local) => is_cloud_newer_than_file(pass.cloud_date(&entry.name), local.modified),
                Err(e) => {
                    outcome.error(format!("{store}: {e}"));
                    return outcome;
                }
            }
        };

        if !take {
            debug!(store = %store, "local store is current");
            outcome.record(Verdict::Skip, store.as_str());
            return outcome;
        }

        if let Err(e) = self.store.move_file(&entry.path, &target).await {
            outcome.error(format!("{store}: {e}"));
            return outcome;
        }
        debug!(store = %store, "store replaced from cloud");
        self.notify_store(store, content).await;
        outcome.record(Verdict::Download, store.as_str());
        outcome
    }

    /// Merges a keyed document store entity by entity
    async fn merge_document(
        &self,
        pass: &Pass,
        store: &StoreId,
        strategy: MergeStrategy,
        cloud: Value,
    ) -> Outcome {
        let mut outcome = Outcome::default();

        let Value::Object(cloud) = cloud else {
            warn!(store = %store, "Skipping cloud store that is not an object");
            return outcome;
        };

        let committed = match self.store.read_document(store).await {
            Ok(Some(Value::Object(map))) => map,
            Ok(None) => Map::new(),
            Ok(Some(_)) => {
                outcome.error(format!("{store}: local store is not an object"));
                return outcome;
            }
            Err(e) => {
                outcome.error(format!("{store}: {e}"));
                return outcome;
            }
        };

        let mut working = committed.clone();
        {
            let mut session = pass.session();
            match strategy {
                MergeStrategy::Flat => {
                    merge_entities(&mut session, store, &cloud, &mut working, false, &mut outcome);
                }
                MergeStrategy::Nested => {
                    for (group, cloud_group) in &cloud {
                        let Value::Object(cloud_group) = cloud_group else {
                            warn!(
                                store = %store,
                                %group,
                                "Skipping cloud group that is not an object"
                            );
                            continue;
                        };
                        let local_group = working
                            .entry(group.clone())
                            .or_insert_with(|| Value::Object(Map::new()));
                        let Value::Object(local_group) = local_group else {
                            outcome.error(format!("{store}: local group {group} is not an object"));
                            continue;
                        };
                        merge_entities(
                            &mut session,
                            store,
                            cloud_group,
                            local_group,
                            true,
                            &mut outcome,
                        );
                    }
                }
            }
        }

        if working != committed {
            let content = Value::Object(working);
            if let Err(e) = self.store.write_document(store, &content).await {
                outcome.error(format!("{store}: {e}"));
                return outcome;
            }
            debug!(store = %store, "merged store written");
            self.notify_store(store, &content).await;
        }
        outcome
    }

    /// Reconciles the show collection
    async fn reconcile_shows(&self, pass: &Pass, cloud: Value) -> Outcome {
        let mut outcome = Outcome::default();

        let Value::Object(cloud) = cloud else {
            warn!("Skipping cloud shows that are not an object");
            return outcome;
        };
        let store = match StoreId::new(SHOWS_STORE.to_string()) {
            Ok(store) => store,
            Err(e) => {
                outcome.error(e.to_string());
                return outcome;
            }
        };

        let mut cloud_names = HashSet::new();
        let mut pending = Vec::new();
        for (id, show) in &cloud {
            match show_file_name(id, show) {
                Ok(name) => {
                    cloud_names.insert(name.clone());
                    pending.push(self.reconcile_show(pass, &store, id, show, name));
                }
                Err(e) => outcome.error(format!("{SHOWS_STORE}: {e}")),
            }
        }

        let mut replaced = Vec::new();
        let mut written = false;
        for (part, verdict, name) in join_all(pending).await {
            outcome.merge(part);
            match verdict {
                Some(Verdict::Download) => {
                    written = true;
                    replaced.push(name);
                }
                Some(Verdict::Create) => written = true,
                _ => {}
            }
        }

        let shows_dir = self.store.shows_dir();
        let local_names = match self.store.list_files(&shows_dir, Some(SHOW_EXTENSION)).await {
            Ok(names) => names,
            Err(e) => {
                outcome.error(format!("{SHOWS_STORE}: {e}"));
                Vec::new()
            }
        };
        for name in local_names.into_iter().filter(|n| !cloud_names.contains(n)) {
            let path = shows_dir.join(&name);
            self.reconcile_local_file(pass, &store, &name, &path, &mut outcome).await;
        }

        if written {
            if let Err(e) = self.notifier.shows_reloaded(&replaced).await {
                debug!(error = %e, "notification failed");
            }
        }
        outcome
    }

    async fn reconcile_show(
        &self,
        pass: &Pass,
        store: &StoreId,
        id: &str,
        show: &Value,
        name: String,
    ) -> (Outcome, Option<Verdict>, String) {
        let mut outcome = Outcome::default();
        let key = match EntityKey::new(store.clone(), name.as_str()) {
            Ok(key) => key,
            Err(e) => {
                outcome.error(e.to_string());
                return (outcome, None, name);
            }
        };
        let path = self.store.shows_dir().join(&name);

        let verdict = if pass.replace() {
            Verdict::Create
        } else {
            let mut local = match self.store.read_show(&path).await {
                Ok(local) => local,
                Err(e) => {
                    outcome.error(format!("{key}: {e}"));
                    return (outcome, None, name);
                }
            };
            let local_entry = local.as_mut().map_or(LocalEntry::Missing, LocalEntry::Document);
            pass.check_cloud(&key, CloudEntry::Document(show), local_entry)
        };

        let applied = match verdict {
            Verdict::Create | Verdict::Download => self.store.write_show(&path, id, show).await,
            Verdict::Delete => self.store.remove_file(&path).await,
            Verdict::Skip | Verdict::Upload => Ok(()),
        };
        if let Err(e) = applied {
            outcome.error(format!("{key}: {e}"));
            return (outcome, None, name);
        }

        pass.acknowledge(&key, verdict);
        outcome.record(verdict, key.composite());
        let stem = name
            .strip_suffix(&format!(".{SHOW_EXTENSION}"))
            .unwrap_or(&name)
            .to_string();
        (outcome, Some(verdict), stem)
    }

    /// Reconciles one scripture file from the snapshot
    async fn reconcile_scripture(
        &self,
        pass: &Pass,
        store: &StoreId,
        entry: &ExtractedEntry,
    ) -> Outcome {
        let mut outcome = Outcome::default();
        let name = entry.name.strip_prefix(BIBLE_PREFIX).unwrap_or(&entry.name);
        if !is_plain_file_name(name) {
            warn!(entry = %entry.name, "Skipping scripture with unusable name");
            return outcome;
        }
        let key = match EntityKey::new(store.clone(), name) {
            Ok(key) => key,
            Err(e) => {
                outcome.error(e.to_string());
                return outcome;
            }
        };
        let target = self.store.scriptures_dir().join(name);

        let verdict = if pass.replace() {
            Verdict::Download
        } else {
            let local = match self.store.file_state(&target).await {
                Ok(local) => local,
                Err(e) => {
                    outcome.error(format!("{key}: {e}"));
                    return outcome;
                }
            };
            let local_entry = if local.exists {
                LocalEntry::File {
                    modified: local.modified,
                }
            } else {
                LocalEntry::Missing
            };
            let cloud_entry = CloudEntry::File {
                modified: pass.cloud_date(&entry.name),
            };
            pass.check_cloud(&key, cloud_entry, local_entry)
        };

        let applied = match verdict {
            Verdict::Create | Verdict::Download => self.store.move_file(&entry.path, &target).await,
            Verdict::Delete => self.store.remove_file(&target).await,
            Verdict::Skip | Verdict::Upload => Ok(()),
        };
        if let Err(e) = applied {
            outcome.error(format!("{key}: {e}"));
            return outcome;
        }

        pass.acknowledge(&key, verdict);
        outcome.record(verdict, key.composite());
        outcome
    }

    /// Reconciles scriptures that exist locally but not in the snapshot
    async fn reconcile_local_scriptures(&self, pass: &Pass, cloud: &HashSet<&str>) -> Outcome {
        let mut outcome = Outcome::default();
        let store = match StoreId::new(BIBLES_STORE.to_string()) {
            Ok(store) => store,
            Err(e) => {
                outcome.error(e.to_string());
                return outcome;
            }
        };

        let dir = self.store.scriptures_dir();
        let local_names = match self.store.list_files(&dir, None).await {
            Ok(names) => names,
            Err(e) => {
                outcome.error(format!("{store}: {e}"));
                return outcome;
            }
        };
        for name in local_names.iter().filter(|n| !cloud.contains(n.as_str())) {
            let path = dir.join(name);
            self.reconcile_local_file(pass, &store, name, &path, &mut outcome).await;
        }
        outcome
    }

    /// Decides the fate of a file-backed entity missing from the snapshot
    async fn reconcile_local_file(
        &self,
        pass: &Pass,
        store: &StoreId,
        name: &str,
        path: &Path,
        outcome: &mut Outcome,
    ) {
        let key = match EntityKey::new(store.clone(), name) {
            Ok(key) => key,
            Err(e) => {
                outcome.error(e.to_string());
                return;
            }
        };

        let verdict = if pass.replace() {
            Verdict::Delete
        } else {
            pass.check_local(&key)
        };

        if verdict == Verdict::Delete {
            if let Err(e) = self.store.remove_file(path).await {
                outcome.error(format!("{key}: {e}"));
                return;
            }
        }
        pass.acknowledge(&key, verdict);
        outcome.record(verdict, key.composite());
    }

    async fn notify_store(&self, store: &StoreId, content: &Value) {
        if let Err(e) = self.notifier.store_changed(store, content).await {
            debug!(store = %store, error = %e, "notification failed");
        }
    }

    // --- Publishing ---

    /// Uploads the local store with the session's ledger
    ///
    /// # Returns
    /// `false` if the provider rejected the snapshot. A snapshot that could
    /// not be composed counts as success and skips the upload.
    async fn publish(
        &self,
        request: &SyncRequest,
        session: &SyncSession,
    ) -> Result<bool, SyncError> {
        let ledger = session.ledger_for_upload(Utc::now());
        self.carry(ledger.clone());

        let archive = match self.compose_snapshot(&ledger).await {
            Ok(Some(archive)) => archive,
            Ok(None) => {
                info!("Local store is empty; nothing to upload");
                return Ok(true);
            }
            Err(e) => {
                warn!(error = %e, "Could not compose snapshot; skipping upload");
                return Ok(true);
            }
        };

        let accepted = self
            .provider
            .upload_snapshot(&request.team, &archive)
            .await
            .map_err(SyncError::ProviderError)?;
        if !accepted {
            warn!(archive = %archive.display(), "Provider rejected the snapshot");
            return Ok(false);
        }
        info!(archive = %archive.display(), "Snapshot uploaded");

        if !request.closing && !self.settings.keep_scratch {
            self.schedule_backup(request);
        }
        Ok(true)
    }

    /// Stages, compresses and rotates a new snapshot archive
    ///
    /// # Returns
    /// The archive in the rotation folder, or `None` when there is nothing to
    /// upload
    async fn compose_snapshot(&self, ledger: &ChangeLedger) -> Result<Option<PathBuf>, SyncError> {
        let staging = self.settings.scratch_dir.join(STAGING_DIR);
        let mut entries = export_snapshot(&self.store, &staging).await?;
        if entries.is_empty() {
            return Ok(None);
        }
        entries.push(ArchiveEntry::bytes(LEDGER_ENTRY_NAME, ledger.to_json()?));

        let name = format!("{}.zip", Local::now().format(TIMEPOINT_FORMAT));
        let dest = self.store.rotation_dir().join(name);
        archive::compress(entries, &dest).await?;

        if let Err(e) = rotation::rotate(&self.store, &dest, &self.settings.rotation).await {
            warn!(error = %e, "Could not rotate local archives");
        }
        Ok(Some(dest))
    }

    fn schedule_backup(&self, request: &SyncRequest) {
        let provider = Arc::clone(&self.provider);
        let store = self.store.clone();
        let church = request.church.clone();
        let team = request.team.clone();
        let dir = self.settings.backup_scratch_dir();
        let policy = self.settings.backup;

        self.background.spawn("official-backup", async move {
            match refresh_backup(provider, &store, &church, &team, &dir, &policy).await {
                Ok(BackupOutcome::Rejected) => warn!(team = %team, "Provider rejected the backup"),
                Ok(outcome) => debug!(team = %team, ?outcome, "backup check finished"),
                Err(e) => warn!(team = %team, error = %e, "Backup refresh failed"),
            }
            if let Err(e) = remove_dir_all(&dir).await {
                debug!(error = %e, "could not remove backup scratch directory");
            }
        });
    }
}

// ============================================================================
// Entity merge
// ============================================================================

/// Reconciles every entity of a keyed map in place
///
/// `legacy_deletes` honours entities the cloud flags with a truthy
/// `deleted` field by removing them locally without consulting the ledger.
fn merge_entities(
    session: &mut SyncSession,
    store: &StoreId,
    cloud: &Map<String, Value>,
    local: &mut Map<String, Value>,
    legacy_deletes: bool,
    outcome: &mut Outcome,
) {
    for (key, cloud_value) in cloud {
        if legacy_deletes && cloud_value.get("deleted").is_some_and(is_present) {
            if local.remove(key).is_some() {
                outcome.record(Verdict::Delete, format!("{store}_{key}"));
            }
            continue;
        }

        let entity = match EntityKey::new(store.clone(), key.as_str()) {
            Ok(entity) => entity,
            Err(e) => {
                outcome.error(format!("{store}: {e}"));
                continue;
            }
        };

        let local_entry = local
            .get_mut(key)
            .map_or(LocalEntry::Missing, LocalEntry::Document);
        let verdict = check_cloud_entry(
            session,
            &entity,
            CloudEntry::Document(cloud_value),
            local_entry,
        );
        match verdict {
            Verdict::Create | Verdict::Download => {
                local.insert(key.clone(), cloud_value.clone());
            }
            Verdict::Delete => {
                local.remove(key);
            }
            Verdict::Skip | Verdict::Upload => {}
        }
        session.acknowledge(&entity, verdict);
        outcome.record(verdict, entity.composite());
    }

    let local_only: Vec<String> = local
        .keys()
        .filter(|key| !cloud.contains_key(key.as_str()))
        .cloned()
        .collect();
    for key in local_only {
        let entity = match EntityKey::new(store.clone(), key.as_str()) {
            Ok(entity) => entity,
            Err(e) => {
                outcome.error(format!("{store}: {e}"));
                continue;
            }
        };
        let verdict = check_local_entry(session, &entity);
        if verdict == Verdict::Delete {
            local.remove(&key);
        }
        session.acknowledge(&entity, verdict);
        outcome.record(verdict, entity.composite());
    }
}
