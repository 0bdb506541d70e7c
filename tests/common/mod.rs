#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use embed_bridge::protocol::ScriptCall;
use embed_bridge::{
    BridgeConfig, CallHandle, EmbeddedCorrelator, ScriptEvaluator, SurfaceError, TransportAdapter,
};
use serde_json::Value;
use tempfile::TempDir;

pub const GLOBAL: &str = "window.NativeBridge";

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_config(dir: &Path, filename: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(filename);
    fs::write(&path, content).expect("Failed to write config file");
    path
}

pub fn envelope(method: &str, data: Option<&str>, callback_id: Option<&str>) -> String {
    serde_json::json!({ "method": method, "data": data, "callbackId": callback_id }).to_string()
}

/// Stand-in for a web view: records every evaluated script and plays the
/// embedded half of the protocol once the bootstrap has been installed.
pub struct SimulatedSurface {
    global: String,
    scripts: Mutex<Vec<String>>,
    page: Mutex<Option<EmbeddedCorrelator>>,
    transport: Mutex<Option<Weak<dyn TransportAdapter>>>,
    cross_origin: AtomicBool,
}

impl SimulatedSurface {
    pub fn new() -> Arc<Self> {
        Self::with_global(GLOBAL)
    }

    pub fn with_global(global: &str) -> Arc<Self> {
        Arc::new(Self {
            global: global.to_string(),
            scripts: Mutex::new(Vec::new()),
            page: Mutex::new(None),
            transport: Mutex::new(None),
            cross_origin: AtomicBool::new(false),
        })
    }

    /// Route page traffic through `transport`
    pub fn connect(&self, transport: &Arc<dyn TransportAdapter>) {
        *self.transport.lock().unwrap() = Some(Arc::downgrade(transport));
    }

    /// Make every evaluation fail as a same-origin violation
    pub fn block_cross_origin(&self) {
        self.cross_origin.store(true, Ordering::SeqCst);
    }

    /// Start a navigation: the old page and its globals are gone
    pub fn reload(&self) {
        *self.page.lock().unwrap() = None;
    }

    /// Install the embedded correlator directly, as a static on-load
    /// injection would
    pub fn load_page(&self) {
        let mut page = self.page.lock().unwrap();
        if page.is_none() {
            *page = Some(self.new_correlator());
        }
    }

    fn new_correlator(&self) -> EmbeddedCorrelator {
        let transport = self.transport.lock().unwrap().clone();
        EmbeddedCorrelator::new(self.global.clone(), move |raw| {
            match transport.as_ref().and_then(|t| t.upgrade()) {
                Some(transport) => transport.send_from_embedded(&raw),
                None => Err(embed_bridge::BridgeError::TransportUnavailable),
            }
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.page.lock().unwrap().is_some()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn script_count(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    /// Scripts that are settlement or trigger calls
    pub fn calls(&self) -> Vec<ScriptCall> {
        self.scripts()
            .iter()
            .filter_map(|s| ScriptCall::parse(&self.global, s).ok())
            .collect()
    }

    pub fn call(&self, method: &str, data: Option<&str>) -> CallHandle {
        self.page
            .lock()
            .unwrap()
            .as_mut()
            .expect("page not loaded")
            .call(method, data.map(|d| d.to_string()))
    }

    pub fn notify(&self, method: &str, data: Option<&str>) {
        self.page
            .lock()
            .unwrap()
            .as_mut()
            .expect("page not loaded")
            .notify(method, data.map(|d| d.to_string()))
            .expect("notify failed");
    }

    pub fn on(&self, event: &str, seen: Arc<Mutex<Vec<Value>>>) {
        self.page
            .lock()
            .unwrap()
            .as_mut()
            .expect("page not loaded")
            .on(event, move |v| seen.lock().unwrap().push(v.clone()));
    }

    pub fn pending_count(&self) -> usize {
        self.page
            .lock()
            .unwrap()
            .as_ref()
            .map(|p| p.pending_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ScriptEvaluator for SimulatedSurface {
    async fn evaluate(&self, script: &str) -> Result<(), SurfaceError> {
        if self.cross_origin.load(Ordering::SeqCst) {
            return Err(SurfaceError::CrossOrigin("https://other.example".to_string()));
        }
        self.scripts.lock().unwrap().push(script.to_string());

        if ScriptCall::parse(&self.global, script).is_ok() {
            if let Some(page) = self.page.lock().unwrap().as_mut() {
                page.evaluate(script)
                    .map_err(|e| SurfaceError::Evaluation(e.to_string()))?;
            }
            return Ok(());
        }

        let guard = format!("if ({}) {{", self.global);
        if script.contains(&guard) && script.contains(&format!("{} = {{", self.global)) {
            self.load_page();
        }
        Ok(())
    }
}

/// Evaluator for a page that stopped responding: every evaluation hangs
#[derive(Default)]
pub struct StuckSurface {
    started: AtomicBool,
}

impl StuckSurface {
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptEvaluator for StuckSurface {
    async fn evaluate(&self, _script: &str) -> Result<(), SurfaceError> {
        self.started.store(true, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Poll until the surface has seen at least `count` scripts
pub async fn wait_for_scripts(surface: &SimulatedSurface, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while surface.script_count() < count {
        if tokio::time::Instant::now() > deadline {
            panic!(
                "expected {} scripts, saw {:?}",
                count,
                surface.scripts()
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Give the bridge queue time to run anything still in flight
pub async fn settle_queue() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("timed out")
}

pub fn default_config() -> BridgeConfig {
    BridgeConfig::default()
}
