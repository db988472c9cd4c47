//! Application context: shared state and background workers.
//!
//! `AppContext` owns the active catalog and the two "busy" flags. It is the
//! only place where shared state changes, and every blocking operation it
//! offers runs on a worker thread and reports back over a channel.
//!
//! # Flags
//!
//! - `job_running`: held by an install or uninstall worker. A second request
//!   while it is held is rejected with `JobAlreadyRunning`, not queued.
//! - `update_checking`: held by the update-check worker. A second request is
//!   rejected with `UpdateCheckInProgress`.
//!
//! Flags are claimed with a compare-exchange and released by a guard that
//! lives in the worker, so a panicking worker still frees them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, PackageDescriptor};
use crate::catalog_source::{CatalogLoader, LoadedCatalog, UpdateCheck};
use crate::error::{PostInstallError, Result};
use crate::orchestrator::{self, CancellationToken, JobEvent, JobOptions, JobReport, SystemControl};
use crate::package_manager::{self, PackageManager};

/// Clears its flag when dropped.
struct FlagGuard(Arc<AtomicBool>);

impl FlagGuard {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A running install job.
pub struct JobHandle {
    /// Events in production order, ending with `JobEvent::Finished`.
    pub events: Receiver<JobEvent>,
    cancel: CancellationToken,
    join: JoinHandle<Result<JobReport>>,
}

impl JobHandle {
    /// Ask the job to stop before the next package.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker and return its report.
    pub fn join(self) -> Result<JobReport> {
        self.join
            .join()
            .map_err(|_| PostInstallError::Io(std::io::Error::other("install worker panicked")))?
    }
}

pub struct AppContext {
    catalog: Arc<RwLock<Arc<Catalog>>>,
    job_running: Arc<AtomicBool>,
    update_checking: Arc<AtomicBool>,
    package_manager: Arc<dyn PackageManager>,
    system: Arc<dyn SystemControl>,
    loader: Arc<CatalogLoader>,
    options: JobOptions,
}

impl AppContext {
    pub fn new(
        catalog: Catalog,
        package_manager: Arc<dyn PackageManager>,
        system: Arc<dyn SystemControl>,
        loader: CatalogLoader,
        options: JobOptions,
    ) -> Self {
        Self {
            catalog: Arc::new(RwLock::new(Arc::new(catalog))),
            job_running: Arc::new(AtomicBool::new(false)),
            update_checking: Arc::new(AtomicBool::new(false)),
            package_manager,
            system,
            loader: Arc::new(loader),
            options,
        }
    }

    /// Snapshot of the active catalog.
    pub fn catalog(&self) -> Arc<Catalog> {
        match self.catalog.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn replace_catalog(slot: &RwLock<Arc<Catalog>>, catalog: Catalog) {
        let catalog = Arc::new(catalog);
        match slot.write() {
            Ok(mut guard) => *guard = catalog,
            Err(poisoned) => *poisoned.into_inner() = catalog,
        }
    }

    pub fn package_manager(&self) -> Arc<dyn PackageManager> {
        Arc::clone(&self.package_manager)
    }

    pub fn is_job_running(&self) -> bool {
        self.job_running.load(Ordering::SeqCst)
    }

    pub fn is_update_checking(&self) -> bool {
        self.update_checking.load(Ordering::SeqCst)
    }

    /// Load the catalog (remote, cache, built-in) on a worker and make it
    /// active. The result is also sent on the returned channel.
    pub fn spawn_load(&self) -> Result<Receiver<LoadedCatalog>> {
        self.spawn_catalog_worker("catalog-load", CatalogLoader::load)
    }

    /// Like `spawn_load` without the remote step: cache, then built-in.
    pub fn spawn_load_local(&self) -> Result<Receiver<LoadedCatalog>> {
        self.spawn_catalog_worker("catalog-load-local", CatalogLoader::load_local)
    }

    fn spawn_catalog_worker(
        &self,
        name: &str,
        load: fn(&CatalogLoader) -> LoadedCatalog,
    ) -> Result<Receiver<LoadedCatalog>> {
        let (tx, rx) = mpsc::channel();
        let loader = Arc::clone(&self.loader);
        let slot = Arc::clone(&self.catalog);

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let loaded = load(loader.as_ref());
                info!(
                    "Active catalog: {} package(s) from {}",
                    loaded.catalog.len(),
                    loaded.origin
                );
                Self::replace_catalog(&slot, loaded.catalog.clone());
                let _ = tx.send(loaded);
            })?;
        Ok(rx)
    }

    /// Start an install job for `selection` with a fresh cancellation token.
    pub fn start_install(&self, selection: Vec<PackageDescriptor>) -> Result<JobHandle> {
        self.start_install_with_token(selection, CancellationToken::new())
    }

    /// Start an install job that stops when `cancel` fires.
    ///
    /// # Errors
    ///
    /// - `EmptySelection` if nothing is selected (no flag is claimed)
    /// - `JobAlreadyRunning` if another job holds the job flag
    pub fn start_install_with_token(
        &self,
        selection: Vec<PackageDescriptor>,
        cancel: CancellationToken,
    ) -> Result<JobHandle> {
        if selection.is_empty() {
            return Err(PostInstallError::EmptySelection);
        }
        let guard = FlagGuard::claim(&self.job_running).ok_or_else(|| {
            warn!("Install requested while a job is running");
            PostInstallError::JobAlreadyRunning
        })?;

        let (tx, rx) = mpsc::channel();
        let pm = Arc::clone(&self.package_manager);
        let system = Arc::clone(&self.system);
        let options = self.options;
        let token = cancel.clone();

        let join = thread::Builder::new()
            .name("install-job".to_string())
            .spawn(move || {
                let _guard = guard;
                orchestrator::run_job(&selection, pm.as_ref(), system.as_ref(), &options, &token, &tx)
            })?;

        Ok(JobHandle {
            events: rx,
            cancel,
            join,
        })
    }

    /// Uninstall `id` on a worker. Shares the job flag with installs.
    pub fn uninstall_in_background(&self, id: &str) -> Result<Receiver<bool>> {
        let guard = FlagGuard::claim(&self.job_running).ok_or(PostInstallError::JobAlreadyRunning)?;
        let (tx, rx) = mpsc::channel();
        let pm = Arc::clone(&self.package_manager);
        let id = id.to_string();

        thread::Builder::new()
            .name("uninstall".to_string())
            .spawn(move || {
                let removed = pm.uninstall(&id);
                drop(guard);
                let _ = tx.send(removed);
            })?;
        Ok(rx)
    }

    /// Ask the package manager which catalog entries are installed, on a worker.
    pub fn installed_in_background(&self) -> Result<Receiver<Vec<PackageDescriptor>>> {
        let (tx, rx) = mpsc::channel();
        let pm = Arc::clone(&self.package_manager);
        let catalog = self.catalog();

        thread::Builder::new()
            .name("installed-query".to_string())
            .spawn(move || {
                let _ = tx.send(package_manager::installed_packages(pm.as_ref(), &catalog));
            })?;
        Ok(rx)
    }

    /// Compare the remote catalog with the active one on a worker.
    ///
    /// The active catalog is left alone; see `apply_catalog_update`.
    pub fn check_for_update_in_background(&self) -> Result<Receiver<UpdateCheck>> {
        let guard =
            FlagGuard::claim(&self.update_checking).ok_or(PostInstallError::UpdateCheckInProgress)?;
        let (tx, rx) = mpsc::channel();
        let loader = Arc::clone(&self.loader);
        let current = self.catalog();

        thread::Builder::new()
            .name("update-check".to_string())
            .spawn(move || {
                let check = loader.check_for_update(&current);
                drop(guard);
                let _ = tx.send(check);
            })?;
        Ok(rx)
    }

    /// Persist `catalog` to the cache and make it the active one. Only called
    /// after the user confirmed.
    ///
    /// A failed cache write leaves the active catalog unchanged.
    pub fn apply_catalog_update(&self, catalog: Catalog) -> Result<()> {
        info!("Applying catalog update ({} package(s))", catalog.len());
        self.loader.save_cache(&catalog).map_err(|e| {
            warn!(
                "Failed to persist catalog update to {}: {}",
                self.loader.cache_path().display(),
                e
            );
            e
        })?;
        Self::replace_catalog(&self.catalog, catalog);
        debug!("Catalog replaced");
        Ok(())
    }
}
