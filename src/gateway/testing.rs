//! Gateway wrapper for unit tests: injected failures, call counters and
//! reads that wait until the test releases them.

use super::{Gateway, GatewayError, ProgressFn, UploadOptions};
use crate::filter::FactQuery;
use crate::model::{Category, Fact, FactId, FactPatch, NewFact};
use crate::storage::Database;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

pub(crate) struct FlakyGateway {
    pub inner: Database,
    pub fail_reads: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fail_updates: AtomicBool,
    pub fail_uploads: AtomicBool,
    pub panic_updates: AtomicBool,
    pub reads: AtomicUsize,
    pub inserts: AtomicUsize,
    pub updates: AtomicUsize,
    pub uploads: AtomicUsize,
    gate_reads: AtomicBool,
    gates: Mutex<Vec<(Option<Category>, Option<oneshot::Sender<()>>)>>,
}

fn injected() -> GatewayError {
    GatewayError::HttpStatus {
        status: 503,
        message: "injected failure".to_string(),
    }
}

impl FlakyGateway {
    pub async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Database::open(":memory:").await.unwrap(),
            fail_reads: AtomicBool::new(false),
            fail_inserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_uploads: AtomicBool::new(false),
            panic_updates: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            gate_reads: AtomicBool::new(false),
            gates: Mutex::new(Vec::new()),
        })
    }

    /// Make every later read wait for [`release_read`](Self::release_read).
    pub fn gate_reads(&self) {
        self.gate_reads.store(true, Ordering::SeqCst);
    }

    /// Number of gated reads that have started, released or not.
    pub fn started_reads(&self) -> usize {
        self.gates.lock().unwrap().len()
    }

    /// Let the oldest waiting read filtered on `category` proceed.
    pub fn release_read(&self, category: Option<Category>) {
        let mut gates = self.gates.lock().unwrap();
        let waiting = gates
            .iter_mut()
            .find(|(c, gate)| *c == category && gate.is_some());
        if let Some((_, gate)) = waiting {
            if let Some(gate) = gate.take() {
                let _ = gate.send(());
            }
        }
    }

    /// Every gateway call made so far.
    pub fn calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
            + self.inserts.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.uploads.load(Ordering::SeqCst)
    }

    /// Wait until `n` gated reads have started.
    pub async fn wait_for_reads(&self, n: usize) {
        while self.started_reads() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Gateway for FlakyGateway {
    async fn read_facts(&self, query: &FactQuery) -> Result<Vec<Fact>, GatewayError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.gate_reads.load(Ordering::SeqCst) {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push((query.category, Some(tx)));
            let _ = rx.await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.read_facts(query).await
    }

    async fn insert_fact(&self, fact: &NewFact) -> Result<Fact, GatewayError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.insert_fact(fact).await
    }

    async fn update_fact(&self, id: FactId, patch: &FactPatch) -> Result<Fact, GatewayError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.panic_updates.load(Ordering::SeqCst) {
            panic!("update exploded");
        }
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.update_fact(id, patch).await
    }

    async fn upload_blob(
        &self,
        container: &str,
        object: &str,
        bytes: Vec<u8>,
        content_type: &str,
        options: &UploadOptions,
        progress: Option<ProgressFn>,
    ) -> Result<(), GatewayError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner
            .upload_blob(container, object, bytes, content_type, options, progress)
            .await
    }

    fn public_url(&self, container: &str, object: &str) -> String {
        self.inner.public_url(container, object)
    }
}
