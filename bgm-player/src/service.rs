//! Playback service facade
//!
//! `BgmService` owns the playback worker and translates the `Music` API into
//! queued commands. Tearing the service down enqueues Release followed by
//! Shutdown and joins the worker thread.

use crate::assets::AssetProvider;
use crate::command::Command;
use crate::error::Result;
use crate::playback::{PlaybackWorker, WorkerConfig};
use crate::player::PlayerFactory;
use bgm_common::events::{EventReceiver, EventSender};
use bgm_common::PlaybackState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, warn};

/// Playback control surface used by the coordinator
pub trait Music: Send + Sync {
    fn start(&self, file_name: &str);
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
    fn release(&self);
    fn is_playing(&self) -> bool;
    fn is_playable(&self) -> bool;
}

/// Produces a bound `Music` service
pub trait ServiceBinder: Send + Sync {
    fn bind(&self) -> Result<Arc<dyn Music>>;
}

/// Service hosting one playback worker
pub struct BgmService {
    worker: Mutex<Option<PlaybackWorker>>,
    config: WorkerConfig,
    assets: Arc<dyn AssetProvider>,
    factory: Arc<dyn PlayerFactory>,
    events: EventSender,
}

impl BgmService {
    /// Create the service and start its worker
    pub fn new(
        config: WorkerConfig,
        assets: Arc<dyn AssetProvider>,
        factory: Arc<dyn PlayerFactory>,
        events: EventSender,
    ) -> Result<Self> {
        let worker = PlaybackWorker::spawn(config, Arc::clone(&assets), Arc::clone(&factory), events.clone())?;
        info!("Playback service created");
        Ok(Self {
            worker: Mutex::new(Some(worker)),
            config,
            assets,
            factory,
            events,
        })
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Last published worker state; Ended once the service is destroyed
    pub fn state(&self) -> PlaybackState {
        self.worker()
            .as_ref()
            .map(PlaybackWorker::state)
            .unwrap_or(PlaybackState::Ended)
    }

    pub fn current_file(&self) -> Option<String> {
        self.worker().as_ref().and_then(PlaybackWorker::current_file)
    }

    /// Release the decoder and stop the worker thread
    pub fn destroy(&self) {
        let worker = self.worker().take();
        if let Some(worker) = worker {
            worker.enqueue(Command::release());
            worker.shutdown();
            info!("Playback service destroyed");
        }
    }

    fn worker(&self) -> MutexGuard<'_, Option<PlaybackWorker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, command: Command) {
        match self.worker().as_ref() {
            Some(worker) => {
                worker.enqueue(command);
            }
            None => debug!("Service destroyed, dropping {}", command),
        }
    }
}

impl Music for BgmService {
    fn start(&self, file_name: &str) {
        let mut worker = self.worker();
        if worker.is_none() {
            // A destroyed service comes back on the next start
            match PlaybackWorker::spawn(
                self.config,
                Arc::clone(&self.assets),
                Arc::clone(&self.factory),
                self.events.clone(),
            ) {
                Ok(spawned) => *worker = Some(spawned),
                Err(e) => {
                    warn!("Cannot restart playback worker: {}", e);
                    return;
                }
            }
        }
        if let Some(worker) = worker.as_ref() {
            worker.enqueue(Command::start(file_name));
        }
    }

    fn pause(&self) {
        self.send(Command::pause());
    }

    fn resume(&self) {
        self.send(Command::resume());
    }

    fn stop(&self) {
        self.send(Command::stop());
    }

    fn release(&self) {
        self.send(Command::release());
    }

    fn is_playing(&self) -> bool {
        self.worker().as_ref().is_some_and(PlaybackWorker::is_playing)
    }

    fn is_playable(&self) -> bool {
        self.worker().as_ref().is_some_and(PlaybackWorker::is_playable)
    }
}

impl Drop for BgmService {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Binder handing out one shared `BgmService` while any client holds it
///
/// Once every client has dropped the service it is torn down, and the next
/// `bind` creates a fresh one.
pub struct BgmServiceBinder {
    config: WorkerConfig,
    assets: Arc<dyn AssetProvider>,
    factory: Arc<dyn PlayerFactory>,
    events: EventSender,
    bound: Mutex<Weak<BgmService>>,
}

impl BgmServiceBinder {
    pub fn new(
        config: WorkerConfig,
        assets: Arc<dyn AssetProvider>,
        factory: Arc<dyn PlayerFactory>,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            assets,
            factory,
            events,
            bound: Mutex::new(Weak::new()),
        }
    }

    /// Concrete handle to the live service, if one is bound
    pub fn service(&self) -> Option<Arc<BgmService>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner).upgrade()
    }

    pub fn bind_service(&self) -> Result<Arc<BgmService>> {
        let mut bound = self.bound.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(service) = bound.upgrade() {
            return Ok(service);
        }
        let service = Arc::new(BgmService::new(
            self.config,
            Arc::clone(&self.assets),
            Arc::clone(&self.factory),
            self.events.clone(),
        )?);
        *bound = Arc::downgrade(&service);
        Ok(service)
    }
}

impl ServiceBinder for BgmServiceBinder {
    fn bind(&self) -> Result<Arc<dyn Music>> {
        let service: Arc<dyn Music> = self.bind_service()?;
        Ok(service)
    }
}
