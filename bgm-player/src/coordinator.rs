//! Foreground/background coordination
//!
//! Tracks which components are alive and which are visible, and drives the
//! bound `Music` service: music starts when the service connects, resumes when
//! a component comes to the foreground, pauses once when the last visible
//! component goes to the background, and the service is unbound when the last
//! component is destroyed. Configuration changes (a component being recreated)
//! never pause or unbind.

use crate::error::Result;
use crate::service::{Music, ServiceBinder};
use bgm_common::config::BgmSettings;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identifier of a UI component (screen, window, activity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct BackgroundPlaybackCoordinator {
    settings: BgmSettings,
    binder: Arc<dyn ServiceBinder>,
    service: Option<Arc<dyn Music>>,
    created: HashSet<ComponentId>,
    visible: HashSet<ComponentId>,
    /// Set once Pause was issued for the current background transition
    backgrounded: bool,
}

impl BackgroundPlaybackCoordinator {
    pub fn new(settings: BgmSettings, binder: Arc<dyn ServiceBinder>) -> Self {
        Self {
            settings,
            binder,
            service: None,
            created: HashSet::new(),
            visible: HashSet::new(),
            backgrounded: false,
        }
    }

    pub fn settings(&self) -> &BgmSettings {
        &self.settings
    }

    pub fn is_bound(&self) -> bool {
        self.service.is_some()
    }

    pub fn service(&self) -> Option<Arc<dyn Music>> {
        self.service.clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    pub fn is_created(&self, id: ComponentId) -> bool {
        self.created.contains(&id)
    }

    pub fn is_visible(&self, id: ComponentId) -> bool {
        self.visible.contains(&id)
    }

    /// Bind the service and start the configured track unless already playing
    pub fn connect(&mut self) -> Result<()> {
        let service = match &self.service {
            Some(service) => Arc::clone(service),
            None => {
                let service = self.binder.bind()?;
                info!("Playback service bound");
                self.service = Some(Arc::clone(&service));
                service
            }
        };
        self.on_connected(service.as_ref());
        Ok(())
    }

    /// Drop the service handle
    pub fn disconnect(&mut self) {
        if self.service.take().is_some() {
            info!("Playback service unbound");
        }
        self.backgrounded = false;
    }

    /// Switch the configured track; plays it right away when bound
    pub fn set_track(&mut self, file_name: impl Into<String>) {
        self.settings.set_file_name(file_name);
        if let Some(service) = &self.service {
            service.start(self.settings.file_name());
        }
    }

    pub fn on_created(&mut self, id: ComponentId) {
        debug!("Component {} created", id);
        self.created.insert(id);
    }

    pub fn on_started(&mut self, id: ComponentId) {
        debug!("Component {} started", id);
        if self.service.is_none() {
            self.try_connect();
        }
    }

    pub fn on_resumed(&mut self, id: ComponentId) {
        debug!("Component {} resumed", id);
        self.visible.insert(id);
        self.backgrounded = false;

        match self.service.clone() {
            Some(service) if service.is_playable() => service.resume(),
            Some(service) => self.on_connected(service.as_ref()),
            None => self.try_connect(),
        }
    }

    pub fn on_paused(&mut self, id: ComponentId) {
        debug!("Component {} paused", id);
        self.visible.remove(&id);
    }

    pub fn on_stopped(&mut self, id: ComponentId, changing_configuration: bool) {
        debug!("Component {} stopped", id);
        let Some(service) = &self.service else {
            return;
        };
        if changing_configuration || !self.visible.is_empty() || self.backgrounded {
            return;
        }
        info!("Application in background, pausing music");
        service.pause();
        self.backgrounded = true;
    }

    pub fn on_destroyed(&mut self, id: ComponentId, changing_configuration: bool) {
        debug!("Component {} destroyed", id);
        self.created.remove(&id);
        self.visible.remove(&id);
        if !self.created.is_empty() || changing_configuration {
            return;
        }
        self.disconnect();
    }

    fn on_connected(&self, service: &dyn Music) {
        if !service.is_playing() {
            service.start(self.settings.file_name());
        }
    }

    fn try_connect(&mut self) {
        if let Err(e) = self.connect() {
            warn!("Cannot bind playback service: {}", e);
        }
    }
}
