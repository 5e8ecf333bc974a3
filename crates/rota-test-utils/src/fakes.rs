use parking_lot::Mutex;
use rota_core::{DatasetId, LiveSchedule};
use rota_edit::{Conflict, Mutation, ValidationError, Validator};
use rota_repair::{InMemoryRepairStore, RepairDisplay, RepairStore, StoreError, StoredRepairs};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// In-memory store whose writes can be switched to fail
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryRepairStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(dataset: DatasetId, tokens: Vec<String>) -> Self {
        Self {
            inner: InMemoryRepairStore::new().with_tokens(dataset, tokens),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn tokens(&self, dataset: &DatasetId) -> Vec<String> {
        self.inner.tokens(dataset)
    }

    pub fn write_count(&self) -> usize {
        self.inner.write_count()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RepairStore for FlakyStore {
    async fn save_repairs(
        &self,
        dataset: &DatasetId,
        tokens: &[String],
        display: &RepairDisplay,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.save_repairs(dataset, tokens, display).await
    }

    async fn clear_repairs(&self, dataset: &DatasetId) -> Result<(), StoreError> {
        self.check()?;
        self.inner.clear_repairs(dataset).await
    }

    async fn get_repairs(&self, dataset: &DatasetId) -> Result<StoredRepairs, StoreError> {
        self.inner.get_repairs(dataset).await
    }
}

/// One scripted validation response
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub delay: Duration,
    pub result: Result<Vec<Conflict>, ValidationError>,
}

/// Validator answering from a script, in call order.
///
/// Once the script runs out every call succeeds with no conflicts.
#[derive(Debug, Default)]
pub struct ScriptedValidator {
    script: Mutex<VecDeque<ScriptedResponse>>,
    seen: Mutex<Vec<Mutation>>,
}

impl ScriptedValidator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(self, delay: Duration, conflicts: Vec<Conflict>) -> Self {
        self.script.lock().push_back(ScriptedResponse {
            delay,
            result: Ok(conflicts),
        });
        self
    }

    #[must_use]
    pub fn then_fail(self, delay: Duration, error: ValidationError) -> Self {
        self.script.lock().push_back(ScriptedResponse {
            delay,
            result: Err(error),
        });
        self
    }

    /// Mutations received so far
    pub fn seen(&self) -> Vec<Mutation> {
        self.seen.lock().clone()
    }
}

#[async_trait::async_trait]
impl Validator for ScriptedValidator {
    async fn validate(
        &self,
        _schedule: LiveSchedule,
        mutation: Mutation,
    ) -> Result<Vec<Conflict>, ValidationError> {
        self.seen.lock().push(mutation);
        let response = self.script.lock().pop_front();
        match response {
            Some(ScriptedResponse { delay, result }) => {
                tokio::time::sleep(delay).await;
                result
            }
            None => Ok(Vec::new()),
        }
    }
}
