use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::providers::{DataAttachment, Provider, ProviderFuture, ProviderResponse, ToolSpec};

/// Runs `func` with the base directory pointed at a fresh temp dir.
pub(crate) fn with_temp_base_dir<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    static BASE_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let _guard = BASE_MUTEX
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let dir = tempfile::tempdir().expect("tempdir");
    let old = std::env::var("VERBABRIDGE_DIR").ok();
    // SAFETY: guarded by BASE_MUTEX; tests touching the variable hold it.
    unsafe { std::env::set_var("VERBABRIDGE_DIR", dir.path()) };
    let result = func(dir.path());
    match old {
        Some(old) => unsafe { std::env::set_var("VERBABRIDGE_DIR", old) },
        None => unsafe { std::env::remove_var("VERBABRIDGE_DIR") },
    }
    result
}

/// Provider that answers every call with a canned tool result.
#[derive(Clone)]
pub(crate) struct TestProvider {
    response: serde_json::Value,
    calls: Arc<AtomicUsize>,
    inputs: Vec<String>,
    attachments: Arc<Mutex<Vec<DataAttachment>>>,
}

impl TestProvider {
    pub(crate) fn new(response: serde_json::Value) -> Self {
        Self {
            response,
            calls: Arc::new(AtomicUsize::new(0)),
            inputs: Vec::new(),
            attachments: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every attachment sent through this provider or its clones.
    pub(crate) fn attachments(&self) -> Vec<DataAttachment> {
        self.attachments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Provider for TestProvider {
    fn append_system_input(mut self, input: String) -> Self {
        self.inputs.push(input);
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.inputs.push(input);
        self
    }

    fn append_user_data(self, data: DataAttachment) -> Self {
        self.attachments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(data);
        self
    }

    fn register_tool(self, _tool: ToolSpec) -> Self {
        self
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompted = self.inputs.iter().any(|input| input.contains(tool_name));
        let attachments = self.attachments().len();
        let args = self.response;
        Box::pin(async move {
            if !prompted {
                anyhow::bail!("prompt never named the tool");
            }
            Ok(ProviderResponse {
                args,
                model: Some(format!("test+{}", attachments)),
                usage: None,
            })
        })
    }
}
