/*!
 # Settings synchronization

 Load, save, backup and restore the settings document against the device.
 Only one of these operations may run at a time; a second one started while
 another is in flight fails with [`Error::Busy`].
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time;
use tracing::{debug, error, info, instrument, warn};

use crate::codec::SettingsAggregate;
use crate::schedule::ScheduleEntry;
use crate::state::AppState;
use crate::status::{Operation, Status};
use crate::transport::{Response, SettingsTransport};
use crate::{Error, Result};

/// Time a single request may take before it is reported as a timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Where the device lives and how long to wait for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Device base URL, e.g. `http://192.168.4.1`
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Owns the application state and keeps it in sync with the device
pub struct Synchronizer<T> {
    transport: T,
    config: SyncConfig,
    state: RwLock<AppState>,
    status: Mutex<Status>,
    /// One permit: held for the whole of a load/save/backup/restore
    in_flight: Semaphore,
}

impl<T: SettingsTransport> Synchronizer<T> {
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self::with_state(transport, config, AppState::default())
    }

    pub fn with_state(transport: T, config: SyncConfig, state: AppState) -> Self {
        Self {
            transport,
            config,
            state: RwLock::new(state),
            status: Mutex::new(Status::default()),
            in_flight: Semaphore::new(1),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Read access to the current state. Do not hold across an await.
    pub fn state(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read()
    }

    /// Mutates the state in place, e.g. for a grid edit or a sweep
    pub fn update<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        f(&mut self.state.write())
    }

    /// Records the grid's current schedule rows for the next save
    pub fn stage_rows(&self, rows: Vec<ScheduleEntry>) {
        self.update(|state| state.stage_rows(rows));
    }

    /// Latest status message
    pub fn status(&self) -> Status {
        self.status.lock().clone()
    }

    fn set_status(&self, status: Status) {
        debug!("Status: {}", status.message);
        *self.status.lock() = status;
    }

    fn begin(&self, operation: Operation) -> Result<SemaphorePermit<'_>> {
        let permit = self.in_flight.try_acquire().map_err(|_| {
            warn!("{:?} rejected, another operation is in flight", operation);
            Error::Busy
        })?;
        self.set_status(Status::in_progress(operation));
        Ok(permit)
    }

    fn finish<R>(&self, operation: Operation, result: Result<R>, success: &str) -> Result<R> {
        match &result {
            Ok(_) => {
                info!("{:?} complete", operation);
                self.set_status(Status::success(success));
            }
            Err(e) => {
                error!("{:?} failed: {}", operation, e);
                self.set_status(Status::failure(operation, e));
            }
        }
        result
    }

    /// Runs one request with the configured timeout; anything but 200 is a failure
    async fn request(&self, call: BoxFuture<'_, Result<Response>>) -> Result<Response> {
        let response = match time::timeout(self.config.timeout, call).await {
            Ok(response) => response?,
            Err(_) => {
                warn!("No response within {:?}", self.config.timeout);
                return Err(Error::Timeout(self.config.timeout));
            }
        };

        if !response.is_success() {
            return Err(Error::Status {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }

    async fn fetch_document(&self) -> Result<String> {
        let response = self.request(self.transport.fetch()).await?;
        debug!("Fetched settings document ({} bytes)", response.body.len());
        Ok(response.body)
    }

    /// Fetches the device settings and replaces the local state with them.
    ///
    /// On any failure the local state is left untouched.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<()> {
        let _permit = self.begin(Operation::Load)?;
        let result = self.load_document().await;
        self.finish(Operation::Load, result, "Settings loaded.")
    }

    async fn load_document(&self) -> Result<()> {
        let body = self.fetch_document().await?;
        let settings = SettingsAggregate::from_json(&body)?;
        self.state.write().apply(settings);
        Ok(())
    }

    /// Validates the local state and sends it to the device.
    ///
    /// Validation failures never reach the network.
    #[instrument(skip(self))]
    pub async fn save(&self) -> Result<()> {
        let _permit = self.begin(Operation::Save)?;
        let result = self.send_state().await;
        self.finish(Operation::Save, result, "Complete.")
    }

    async fn send_state(&self) -> Result<()> {
        let body = {
            let mut state = self.state.write();
            let mut candidate = state.clone();
            candidate.commit_rows();
            candidate.validate()?;

            let body = candidate.to_aggregate().to_wire_json()?;
            *state = candidate;
            body
        };

        debug!("Sending settings document ({} bytes)", body.len());
        self.request(self.transport.send(body)).await?;
        Ok(())
    }

    /// Fetches the device settings and writes them, unmodified, into `dir`.
    ///
    /// The file is named after the device hostname. Local state is not changed.
    #[instrument(skip(self))]
    pub async fn backup(&self, dir: &Path) -> Result<PathBuf> {
        let _permit = self.begin(Operation::Backup)?;
        let result = self.write_backup(dir).await;
        let success = match &result {
            Ok(path) => format!("Backup saved to {}.", path.display()),
            Err(_) => String::new(),
        };
        self.finish(Operation::Backup, result, &success)
    }

    async fn write_backup(&self, dir: &Path) -> Result<PathBuf> {
        let body = self.fetch_document().await?;
        let settings = SettingsAggregate::from_json(&body)?;

        let path = dir.join(backup_file_name(&settings.system.hostname));
        tokio::fs::write(&path, body.as_bytes()).await?;
        info!("Backup written to {}", path.display());
        Ok(path)
    }

    /// Loads a backup file into the local state.
    ///
    /// `confirm_save` sees the restored state and decides whether it is sent
    /// to the device right away.
    #[instrument(skip(self, confirm_save))]
    pub async fn restore<F>(&self, path: &Path, confirm_save: F) -> Result<()>
    where
        F: FnOnce(&AppState) -> bool,
    {
        let _permit = self.begin(Operation::Restore)?;
        let result = self.restore_file(path, confirm_save).await;
        self.finish(Operation::Restore, result, "Settings restored.")
    }

    async fn restore_file<F>(&self, path: &Path, confirm_save: F) -> Result<()>
    where
        F: FnOnce(&AppState) -> bool,
    {
        let text = tokio::fs::read_to_string(path).await?;
        let settings = SettingsAggregate::from_json(&text)?;
        self.state.write().apply(settings);

        let save = confirm_save(&self.state.read());
        if save {
            self.set_status(Status::in_progress(Operation::Save));
            self.send_state().await?;
        } else {
            debug!("Restored settings kept local");
        }
        Ok(())
    }
}

/// Backup artifact name for a hostname, `settings.json` when it is blank
pub fn backup_file_name(hostname: &str) -> String {
    let stem: String = hostname
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    if stem.is_empty() {
        "settings.json".to_string()
    } else {
        format!("{stem}.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_names_follow_hostname() {
        assert_eq!(backup_file_name("aquarium-1"), "aquarium-1.json");
        assert_eq!(backup_file_name(""), "settings.json");
        assert_eq!(backup_file_name("../etc"), "etc.json");
    }

    #[test]
    fn config_defaults_to_five_second_timeout() {
        let config = SyncConfig::new("http://ledc.local");
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert_eq!(
            config.with_timeout(Duration::from_secs(1)).timeout,
            Duration::from_secs(1)
        );
    }
}
