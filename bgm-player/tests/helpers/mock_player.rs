//! Scripted decoder for worker tests
//!
//! Every call is recorded with the name of the thread it ran on. Preparation
//! completes on a separate `mock-prepare` thread, the way a real decoder
//! reports from its own context, unless the script leaves it to the test.

use bgm_player::assets::AssetDescriptor;
use bgm_player::player::{MediaPlayer, PlayerFactory, PlayerListener, PlayerResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How `prepare_async` completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareScript {
    /// Report prepared from another thread shortly after the call
    Succeed,
    /// Report an error from another thread
    Fail(String),
    /// Report nothing; the test calls `MockControl::trigger_prepared`
    Manual,
}

/// One recorded decoder call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: String,
    pub thread: Option<String>,
}

/// Shared view of every mock player created by a `MockFactory`
pub struct MockControl {
    calls: Mutex<Vec<Call>>,
    listeners: Mutex<Vec<PlayerListener>>,
    script: Mutex<PrepareScript>,
    created: AtomicUsize,
}

impl MockControl {
    pub fn new(script: PrepareScript) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            script: Mutex::new(script),
            created: AtomicUsize::new(0),
        })
    }

    pub fn set_script(&self, script: PrepareScript) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of prepare listeners handed out so far
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Deliver prepared through the listener of prepare call `index`
    pub fn trigger_prepared(&self, index: usize) {
        let listener = self.listeners.lock().unwrap()[index].clone();
        listener.prepared();
    }

    pub fn trigger_completed(&self, index: usize) {
        let listener = self.listeners.lock().unwrap()[index].clone();
        listener.completed();
    }

    pub fn trigger_error(&self, index: usize, message: &str) {
        let listener = self.listeners.lock().unwrap()[index].clone();
        listener.error(message);
    }

    fn record(&self, op: impl Into<String>) {
        self.calls.lock().unwrap().push(Call {
            op: op.into(),
            thread: thread::current().name().map(str::to_owned),
        });
    }
}

pub struct MockPlayer {
    control: Arc<MockControl>,
    playing: bool,
}

impl MediaPlayer for MockPlayer {
    fn set_data_source(&mut self, source: AssetDescriptor) -> PlayerResult<()> {
        self.control.record(format!("set_data_source {}", source.name()));
        Ok(())
    }

    fn set_looping(&mut self, looping: bool) -> PlayerResult<()> {
        self.control.record(format!("set_looping {}", looping));
        Ok(())
    }

    fn prepare_async(&mut self, listener: PlayerListener) -> PlayerResult<()> {
        self.control.record("prepare_async");
        self.control.listeners.lock().unwrap().push(listener.clone());

        let script = self.control.script.lock().unwrap().clone();
        match script {
            PrepareScript::Succeed => {
                thread::Builder::new()
                    .name("mock-prepare".to_string())
                    .spawn(move || {
                        thread::sleep(Duration::from_millis(10));
                        listener.prepared();
                    })
                    .unwrap();
            }
            PrepareScript::Fail(message) => {
                thread::Builder::new()
                    .name("mock-prepare".to_string())
                    .spawn(move || {
                        thread::sleep(Duration::from_millis(10));
                        listener.error(message);
                    })
                    .unwrap();
            }
            PrepareScript::Manual => {}
        }
        Ok(())
    }

    fn start(&mut self) -> PlayerResult<()> {
        self.control.record("start");
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> PlayerResult<()> {
        self.control.record("pause");
        self.playing = false;
        Ok(())
    }

    fn stop(&mut self) -> PlayerResult<()> {
        self.control.record("stop");
        self.playing = false;
        Ok(())
    }

    fn reset(&mut self) {
        self.control.record("reset");
        self.playing = false;
    }

    fn release(&mut self) {
        self.control.record("release");
        self.playing = false;
    }

    fn is_playing(&self) -> PlayerResult<bool> {
        Ok(self.playing)
    }
}

pub struct MockFactory {
    control: Arc<MockControl>,
}

impl MockFactory {
    pub fn new(control: Arc<MockControl>) -> Self {
        Self { control }
    }
}

impl PlayerFactory for MockFactory {
    fn create(&self) -> PlayerResult<Box<dyn MediaPlayer>> {
        self.control.created.fetch_add(1, Ordering::SeqCst);
        self.control.record("create");
        Ok(Box::new(MockPlayer {
            control: Arc::clone(&self.control),
            playing: false,
        }))
    }
}
