//! Shared fixtures: a scripted generation service and store setup

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use uuid::Uuid;

use thoughtmap::ai::{AiError, AiResult, ExpandedSubtopic, GenerationService, Subtopic};
use thoughtmap::models::OwnerAccount;
use thoughtmap::{ExpansionOrchestrator, InMemoryTreeStore};

/// What the scripted generator returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Exactly the requested number of subtopics
    Normal,
    /// One subtopic fewer than requested
    Short,
    /// Output that could not be parsed
    Malformed,
}

/// Deterministic stand-in for the language model.
///
/// With `hold` enabled every call parks after signalling `entered` until
/// `release` is called. Calls made while released are not counted, so
/// `wait_entered` only observes calls that are actually parked.
pub struct ScriptedGenerator {
    script: Mutex<Script>,
    calls: AtomicUsize,
    paths: Mutex<Vec<Vec<String>>>,
    entered: Arc<Semaphore>,
    release_tx: watch::Sender<bool>,
    release_rx: watch::Receiver<bool>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        let (release_tx, release_rx) = watch::channel(true);
        Self {
            script: Mutex::new(Script::Normal),
            calls: AtomicUsize::new(0),
            paths: Mutex::new(Vec::new()),
            entered: Arc::new(Semaphore::new(0)),
            release_tx,
            release_rx,
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    /// Park subsequent calls until `release`
    pub fn hold(&self) {
        while let Ok(permit) = self.entered.try_acquire() {
            permit.forget();
        }
        self.release_tx.send_replace(false);
    }

    pub fn release(&self) {
        self.release_tx.send_replace(true);
    }

    /// Wait until `n` calls have reached the generator
    pub async fn wait_entered(&self, n: u32) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.acquire_many(n))
            .await
            .expect("generator was not reached in time")
            .expect("semaphore closed")
            .forget();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<Vec<String>> {
        self.paths.lock().unwrap().clone()
    }

    async fn enter(&self) -> Script {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.release_rx.clone();
        let held = !*rx.borrow_and_update();
        if held {
            self.entered.add_permits(1);
        }
        rx.wait_for(|released| *released)
            .await
            .expect("release channel closed");
        *self.script.lock().unwrap()
    }

    fn batch_size(script: Script, count: usize) -> AiResult<usize> {
        match script {
            Script::Normal => Ok(count),
            Script::Short => Ok(count.saturating_sub(1)),
            Script::Malformed => Err(AiError::InvalidResponse(
                "subtopic 0 is missing \"title\"".to_string(),
            )),
        }
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate_subtopics(&self, topic: &str, count: usize) -> AiResult<Vec<Subtopic>> {
        let script = self.enter().await;
        self.paths.lock().unwrap().push(vec![topic.to_string()]);
        let n = Self::batch_size(script, count)?;
        Ok((0..n)
            .map(|i| Subtopic {
                title: format!("{} {}", topic, i + 1),
                explanation: format!("Part {} of {}.", i + 1, topic),
            })
            .collect())
    }

    async fn expand_topic(
        &self,
        _main_topic: &str,
        path: &[String],
        current_topic: &str,
        count: usize,
    ) -> AiResult<Vec<ExpandedSubtopic>> {
        let script = self.enter().await;
        self.paths.lock().unwrap().push(path.to_vec());
        let n = Self::batch_size(script, count)?;
        Ok((0..n)
            .map(|i| ExpandedSubtopic {
                title: format!("{} / {}", current_topic, i + 1),
                explanation: format!("Detail {}.", i + 1),
                importance: Some("It matters.".to_string()),
            })
            .collect())
    }

    async fn explain_topic(
        &self,
        main_topic: &str,
        path: &[String],
        current_topic: &str,
    ) -> AiResult<String> {
        self.enter().await;
        self.paths.lock().unwrap().push(path.to_vec());
        Ok(format!("{} is part of {}.", current_topic, main_topic))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryTreeStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub orchestrator: Arc<ExpansionOrchestrator>,
    pub owner: OwnerAccount,
}

pub async fn fixture() -> Fixture {
    let store = Arc::new(InMemoryTreeStore::new());
    let generator = Arc::new(ScriptedGenerator::new());
    let owner = store.insert_account("ada@example.com", Some("Ada")).await;
    let orchestrator = Arc::new(ExpansionOrchestrator::new(
        store.clone(),
        generator.clone(),
    ));
    Fixture {
        store,
        generator,
        orchestrator,
        owner,
    }
}

/// Poll until the store holds `expected` nodes
pub async fn wait_for_node_count(store: &InMemoryTreeStore, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.node_count().await != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("node count not reached in time");
}

pub fn other_owner() -> Uuid {
    Uuid::new_v4()
}
