use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use depwatch::{DependencyType, Endpoint, Probe, ProbeError};
use prometheus::Registry;

/// Finds the gauge value of the single series matching `name` and every label in
/// `expected_labels`; `None` if no such series exists (e.g. it was deleted or never set).
pub fn metric_value(registry: &Registry, name: &str, expected_labels: &[(&str, &str)]) -> Option<f64> {
    for family in registry.gather() {
        if family.name() != name {
            continue;
        }
        for metric in family.get_metric() {
            let matches = expected_labels
                .iter()
                .all(|(k, v)| metric.get_label().iter().any(|pair| pair.name() == *k && pair.value() == *v));
            if matches && metric.has_gauge() {
                return Some(metric.get_gauge().value());
            }
        }
    }
    None
}

/// Number of distinct label-tuple series currently registered under `name`.
pub fn count_series(registry: &Registry, name: &str) -> usize {
    registry.gather().into_iter().find(|f| f.name() == name).map(|f| f.get_metric().len()).unwrap_or(0)
}

/// Replays a fixed sequence of outcomes, one per call; the last entry repeats once exhausted.
pub struct ScriptedProbe {
    kind: DependencyType,
    script: Vec<Result<(), ProbeError>>,
    cursor: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(kind: DependencyType, script: Vec<Result<(), ProbeError>>) -> Self {
        ScriptedProbe { kind, script, cursor: AtomicUsize::new(0) }
    }

    pub fn always_ok(kind: DependencyType) -> Self {
        ScriptedProbe::new(kind, vec![Ok(())])
    }

    pub fn call_count(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn check(&self, _endpoint: &Endpoint) -> Result<(), ProbeError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let slot = index.min(self.script.len() - 1);
        match &self.script[slot] {
            Ok(()) => Ok(()),
            Err(ProbeError::Timeout) => Err(ProbeError::Timeout),
            Err(ProbeError::ConnectionRefused) => Err(ProbeError::ConnectionRefused),
            Err(ProbeError::Dns) => Err(ProbeError::Dns),
            Err(ProbeError::Auth) => Err(ProbeError::Auth),
            Err(ProbeError::Tls) => Err(ProbeError::Tls),
            Err(ProbeError::Unhealthy(detail)) => Err(ProbeError::Unhealthy(detail.clone())),
            Err(ProbeError::Check(cat, detail)) => Err(ProbeError::Check(*cat, detail.clone())),
            Err(_) => Err(ProbeError::Unhealthy("error".to_string())),
        }
    }

    fn kind(&self) -> DependencyType {
        self.kind
    }
}

pub struct AlwaysErrProbe {
    kind: DependencyType,
    make: Box<dyn Fn() -> ProbeError + Send + Sync>,
}

impl AlwaysErrProbe {
    pub fn new(kind: DependencyType, make: impl Fn() -> ProbeError + Send + Sync + 'static) -> Self {
        AlwaysErrProbe { kind, make: Box::new(make) }
    }
}

#[async_trait]
impl Probe for AlwaysErrProbe {
    async fn check(&self, _endpoint: &Endpoint) -> Result<(), ProbeError> {
        Err((self.make)())
    }

    fn kind(&self) -> DependencyType {
        self.kind
    }
}

/// Records every call for assertions, always succeeding.
pub struct CountingProbe {
    kind: DependencyType,
    calls: Mutex<usize>,
}

impl CountingProbe {
    pub fn new(kind: DependencyType) -> Self {
        CountingProbe { kind, calls: Mutex::new(0) }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Probe for CountingProbe {
    async fn check(&self, _endpoint: &Endpoint) -> Result<(), ProbeError> {
        *self.calls.lock().unwrap() += 1;
        Ok(())
    }

    fn kind(&self) -> DependencyType {
        self.kind
    }
}

/// Never returns — used to exercise cancellation under `stop()`.
pub struct HangingProbe {
    kind: DependencyType,
}

impl HangingProbe {
    pub fn new(kind: DependencyType) -> Self {
        HangingProbe { kind }
    }
}

#[async_trait]
impl Probe for HangingProbe {
    async fn check(&self, _endpoint: &Endpoint) -> Result<(), ProbeError> {
        futures::future::pending::<()>().await;
        unreachable!()
    }

    fn kind(&self) -> DependencyType {
        self.kind
    }
}
