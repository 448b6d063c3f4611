//! Playback worker
//!
//! One dedicated thread consumes a blocking FIFO of messages and is the only
//! writer of the playback state and the decoder. Callers enqueue `Command`s;
//! the decoder's asynchronous notifications come back through the same queue,
//! tagged with the data-source generation they belong to.
//!
//! Queries (`state`, `is_playing`, `is_playable`, `current_file`) may run on any
//! thread and read the most recently published values.

use super::state::PlaybackStateMachine;
use crate::assets::AssetProvider;
use crate::command::{Command, CommandKind};
use crate::error::Result;
use crate::player::{MediaPlayer, NotificationSink, PlayerFactory, PlayerListener, PlayerNotification};
use bgm_common::config::{TomlConfig, DEFAULT_QUEUE_CAPACITY};
use bgm_common::events::{EventReceiver, EventSender, PlaybackEvent};
use bgm_common::{CommandOutcome, PlaybackState};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Worker tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Maximum pending commands; notifications and Shutdown are not counted
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl From<&TomlConfig> for WorkerConfig {
    fn from(config: &TomlConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
        }
    }
}

enum Message {
    Command(Command),
    Notification {
        generation: u64,
        notification: PlayerNotification,
    },
}

/// Blocking FIFO shared between producers and the worker thread
struct CommandQueue {
    messages: Mutex<VecDeque<Message>>,
    condvar: Condvar,
    /// Only written with `messages` locked
    quit: AtomicBool,
    capacity: usize,
}

impl CommandQueue {
    fn new(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            quit: AtomicBool::new(false),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, message: Message, bounded: bool) -> bool {
        let mut messages = self.lock();
        if self.quit.load(Ordering::Acquire) {
            return false;
        }
        if bounded && messages.len() >= self.capacity {
            return false;
        }
        messages.push_back(message);
        drop(messages);

        self.condvar.notify_one();
        true
    }

    /// Block until a message is available; None once the queue is closed
    fn next(&self) -> Option<Message> {
        let mut messages = self.lock();
        loop {
            if self.quit.load(Ordering::Acquire) {
                return None;
            }
            if let Some(message) = messages.pop_front() {
                return Some(message);
            }
            // Spurious wake-ups fall through to another wait
            messages = self
                .condvar
                .wait(messages)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Set the quit flag and discard pending messages; returns how many were dropped
    fn close(&self) -> usize {
        let mut messages = self.lock();
        self.quit.store(true, Ordering::Release);
        let dropped = messages.len();
        messages.clear();
        drop(messages);

        self.condvar.notify_all();
        dropped
    }

    fn is_closed(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }
}

impl NotificationSink for CommandQueue {
    fn notify(&self, generation: u64, notification: PlayerNotification) {
        let message = Message::Notification {
            generation,
            notification,
        };
        if !self.push(message, false) {
            debug!("Worker closed, dropping decoder notification (generation {})", generation);
        }
    }
}

/// Values published by the worker thread for readers on other threads
struct WorkerStatus {
    state: RwLock<PlaybackState>,
    current_file: RwLock<Option<String>>,
    player: Mutex<Option<Box<dyn MediaPlayer>>>,
}

impl WorkerStatus {
    fn player(&self) -> MutexGuard<'_, Option<Box<dyn MediaPlayer>>> {
        self.player.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_current_file(&self, file: Option<String>) {
        *self.current_file.write().unwrap_or_else(PoisonError::into_inner) = file;
    }
}

/// Handle to the playback worker thread
pub struct PlaybackWorker {
    queue: Arc<CommandQueue>,
    status: Arc<WorkerStatus>,
    events: EventSender,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    /// Spawn the `bgm-worker` thread
    ///
    /// No decoder exists until the first Start command.
    pub fn spawn(
        config: WorkerConfig,
        assets: Arc<dyn AssetProvider>,
        factory: Arc<dyn PlayerFactory>,
        events: EventSender,
    ) -> Result<Self> {
        let queue = Arc::new(CommandQueue::new(config.queue_capacity));
        let status = Arc::new(WorkerStatus {
            state: RwLock::new(PlaybackState::Idle),
            current_file: RwLock::new(None),
            player: Mutex::new(None),
        });

        let mut worker_loop = WorkerLoop {
            queue: Arc::clone(&queue),
            status: Arc::clone(&status),
            machine: PlaybackStateMachine::new(),
            generation: 0,
            assets,
            factory,
            events: events.clone(),
        };

        let handle = thread::Builder::new()
            .name("bgm-worker".to_string())
            .spawn(move || worker_loop.run())?;

        info!("Playback worker started (queue capacity {})", queue.capacity);

        Ok(Self {
            queue,
            status,
            events,
            thread: Some(handle),
        })
    }

    /// Append a command; false if the worker has quit or the queue is full
    pub fn enqueue(&self, command: Command) -> bool {
        let bounded = command.kind() != CommandKind::Shutdown;
        debug!("Enqueue {}", command);
        let accepted = self.queue.push(Message::Command(command), bounded);
        if !accepted && !self.queue.is_closed() {
            warn!("Playback queue full, command rejected");
        }
        accepted
    }

    /// Whether the decoder reports that it is playing
    pub fn is_playing(&self) -> bool {
        match self.status.player().as_ref() {
            Some(player) => match player.is_playing() {
                Ok(playing) => playing,
                Err(e) => {
                    warn!("Decoder query failed: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    /// Whether a decoder instance exists
    pub fn is_playable(&self) -> bool {
        self.status.player().is_some()
    }

    pub fn state(&self) -> PlaybackState {
        *self.status.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_file(&self) -> Option<String> {
        self.status
            .current_file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Enqueue Shutdown and wait for the worker thread to exit
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        self.enqueue(Command::shutdown());
        match handle.join() {
            Ok(()) => debug!("Playback worker joined"),
            Err(e) => error!("Playback worker panicked: {:?}", e),
        }
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        self.join();
    }
}

/// State owned by the worker thread
struct WorkerLoop {
    queue: Arc<CommandQueue>,
    status: Arc<WorkerStatus>,
    machine: PlaybackStateMachine,
    /// Bumped on every data-source rebind and release
    generation: u64,
    assets: Arc<dyn AssetProvider>,
    factory: Arc<dyn PlayerFactory>,
    events: EventSender,
}

impl WorkerLoop {
    fn run(&mut self) {
        debug!("Playback worker loop started");

        while let Some(message) = self.queue.next() {
            match message {
                Message::Command(command) => self.handle_command(command),
                Message::Notification {
                    generation,
                    notification,
                } => self.handle_notification(generation, notification),
            }
        }

        // Shutdown does not release the decoder by itself
        let leftover = self.status.player().take();
        if let Some(mut player) = leftover {
            player.reset();
            player.release();
        }

        let _ = self.events.send(PlaybackEvent::WorkerExited);
        debug!("Playback worker loop exiting");
    }

    fn handle_command(&mut self, command: Command) {
        let state = self.machine.state();
        let outcome = if !self.machine.accepts_commands()
            && !matches!(command.kind(), CommandKind::Release | CommandKind::Shutdown)
        {
            debug!("Ignoring {} in state {}", command, state);
            CommandOutcome::Ignored
        } else {
            match command.kind() {
                CommandKind::Start => self.start(command.payload()),
                CommandKind::Pause => self.pause(),
                CommandKind::Resume => self.resume(),
                CommandKind::Stop => self.stop(),
                CommandKind::Release => self.release(),
                CommandKind::Shutdown => self.shutdown(),
            }
        };

        debug!("{} -> {} (state {})", command, outcome, self.machine.state());
        let _ = self.events.send(PlaybackEvent::CommandHandled {
            command: command.to_string(),
            outcome,
            state: self.machine.state(),
        });
    }

    fn handle_notification(&mut self, generation: u64, notification: PlayerNotification) {
        if generation != self.generation {
            debug!(
                "Dropping stale {:?} (generation {}, current {})",
                notification, generation, self.generation
            );
            return;
        }

        match notification {
            PlayerNotification::Prepared => {
                if self.machine.state() != PlaybackState::Preparing {
                    debug!("Prepared notification in state {}, ignored", self.machine.state());
                    return;
                }
                self.set_state(PlaybackState::Prepared);

                let status = Arc::clone(&self.status);
                let mut slot = status.player();
                let Some(player) = slot.as_mut() else {
                    return;
                };
                match player.start() {
                    Ok(()) => {
                        self.set_state(PlaybackState::Started);
                    }
                    Err(e) => warn!("Auto-start after prepare failed: {}", e),
                }
            }
            PlayerNotification::Completed => {
                if self.machine.state() == PlaybackState::Started {
                    self.set_state(PlaybackState::Completed);
                }
            }
            PlayerNotification::Error(message) => {
                error!("Decoder fault: {}", message);
                self.set_state(PlaybackState::Error);
                let _ = self.events.send(PlaybackEvent::DecoderFault { message });
            }
        }
    }

    fn start(&mut self, name: Option<&str>) -> CommandOutcome {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            debug!("Start without a file name ignored");
            return CommandOutcome::Ignored;
        };

        let state = self.machine.state();
        let loaded = self.status.current_file.read().unwrap_or_else(PoisonError::into_inner).as_deref() == Some(name);
        if loaded && !matches!(state, PlaybackState::Idle | PlaybackState::Stopped) {
            debug!("{} already loaded ({}), start ignored", name, state);
            return CommandOutcome::Ignored;
        }

        // Open first so a missing asset leaves the current playback untouched
        let source = match self.assets.open(name) {
            Ok(source) => source,
            Err(e) => {
                warn!("Cannot open {}: {}", name, e);
                return CommandOutcome::Failed;
            }
        };

        let status = Arc::clone(&self.status);
        let mut slot = status.player();
        if slot.is_none() {
            match self.factory.create() {
                Ok(player) => *slot = Some(player),
                Err(e) => {
                    warn!("Cannot create decoder: {}", e);
                    return CommandOutcome::Failed;
                }
            }
        }
        let Some(player) = slot.as_mut() else {
            return CommandOutcome::Failed;
        };

        // Switching tracks: stop, then reset before binding the next source
        if player.is_playing().unwrap_or(false) {
            if let Err(e) = player.stop() {
                warn!("Stop before track switch failed: {}", e);
            }
        }
        if self.machine.state().is_active() {
            self.set_state(PlaybackState::Stopped);
        }
        player.reset();
        self.generation += 1;
        self.status.set_current_file(None);
        self.set_state(PlaybackState::Idle);

        if let Err(e) = player.set_data_source(source) {
            warn!("Cannot bind {}: {}", name, e);
            return CommandOutcome::Failed;
        }
        if let Err(e) = player.set_looping(true) {
            warn!("Cannot enable looping for {}: {}", name, e);
        }
        self.status.set_current_file(Some(name.to_string()));
        self.set_state(PlaybackState::Initialized);
        let _ = self.events.send(PlaybackEvent::TrackLoaded {
            file: name.to_string(),
        });

        let sink: Arc<dyn NotificationSink> = self.queue.clone();
        let listener = PlayerListener::new(self.generation, sink);
        if let Err(e) = player.prepare_async(listener) {
            warn!("Cannot prepare {}: {}", name, e);
            player.reset();
            self.status.set_current_file(None);
            self.set_state(PlaybackState::Idle);
            return CommandOutcome::Failed;
        }
        self.set_state(PlaybackState::Preparing);

        info!("Loading {}", name);
        CommandOutcome::Applied
    }

    fn pause(&mut self) -> CommandOutcome {
        if !self.machine.can_pause() || self.machine.state() == PlaybackState::Paused {
            return CommandOutcome::Ignored;
        }

        let status = Arc::clone(&self.status);
        let mut slot = status.player();
        let Some(player) = slot.as_mut() else {
            return CommandOutcome::Ignored;
        };
        match player.pause() {
            Ok(()) => {
                self.set_state(PlaybackState::Paused);
                CommandOutcome::Applied
            }
            Err(e) => {
                warn!("Pause failed: {}", e);
                CommandOutcome::Failed
            }
        }
    }

    fn resume(&mut self) -> CommandOutcome {
        let has_file = self
            .status
            .current_file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if !has_file || !self.machine.can_start() || self.machine.state() == PlaybackState::Started {
            return CommandOutcome::Ignored;
        }

        let status = Arc::clone(&self.status);
        let mut slot = status.player();
        let Some(player) = slot.as_mut() else {
            return CommandOutcome::Ignored;
        };
        match player.start() {
            Ok(()) => {
                self.set_state(PlaybackState::Started);
                CommandOutcome::Applied
            }
            Err(e) => {
                warn!("Resume failed: {}", e);
                CommandOutcome::Failed
            }
        }
    }

    fn stop(&mut self) -> CommandOutcome {
        if !self.machine.state().is_active() {
            return CommandOutcome::Ignored;
        }

        let status = Arc::clone(&self.status);
        let mut slot = status.player();
        if let Some(player) = slot.as_mut() {
            if let Err(e) = player.stop() {
                debug!("Decoder stop: {}", e);
            }
        }
        self.set_state(PlaybackState::Stopped);
        CommandOutcome::Applied
    }

    fn release(&mut self) -> CommandOutcome {
        let Some(mut player) = self.status.player().take() else {
            return CommandOutcome::Ignored;
        };

        if player.is_playing().unwrap_or(false) {
            if let Err(e) = player.stop() {
                warn!("Stop before release failed: {}", e);
            }
        }
        player.reset();
        player.release();
        drop(player);

        self.generation += 1;
        self.status.set_current_file(None);
        self.set_state(PlaybackState::Idle);
        info!("Decoder released");
        CommandOutcome::Applied
    }

    fn shutdown(&mut self) -> CommandOutcome {
        let dropped = self.queue.close();
        if dropped > 0 {
            debug!("Shutdown discarded {} pending messages", dropped);
        }
        self.set_state(PlaybackState::Ended);
        CommandOutcome::Applied
    }

    /// Apply a transition and publish it
    fn set_state(&mut self, to: PlaybackState) -> bool {
        match self.machine.transition(to) {
            Ok(old) => {
                *self.status.state.write().unwrap_or_else(PoisonError::into_inner) = to;
                if old != to {
                    debug!("State {} -> {}", old, to);
                    let _ = self.events.send(PlaybackEvent::state_changed(old, to));
                }
                true
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }
}
