use std::sync::Arc;

use rocket::tokio::sync::{watch, OnceCell};
use serde::Serialize;
use tracing::{error, info, instrument};

use super::{Execution, Interpreter, Program, RuntimeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum RuntimeStatus {
    Uninitialized,
    LoadingInterpreter,
    LoadingPackages,
    Ready,
    Error(String),
}

struct Inner {
    interpreter: Arc<dyn Interpreter>,
    packages: Vec<String>,
    init: OnceCell<Result<(), String>>,
    status: watch::Sender<RuntimeStatus>,
}

/// Process-wide handle to the challenge interpreter. Cloning shares the
/// same initialization.
#[derive(Clone)]
pub struct RuntimeBridge {
    inner: Arc<Inner>,
}

impl RuntimeBridge {
    pub fn new(interpreter: Arc<dyn Interpreter>, packages: Vec<String>) -> Self {
        let (status, _) = watch::channel(RuntimeStatus::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                interpreter,
                packages,
                init: OnceCell::new(),
                status,
            }),
        }
    }

    pub fn status(&self) -> RuntimeStatus {
        self.inner.status.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<RuntimeStatus> {
        self.inner.status.subscribe()
    }

    fn set_status(&self, status: RuntimeStatus) {
        self.inner.status.send_replace(status);
    }

    /// Starts the interpreter on first use. Concurrent callers wait on the
    /// same attempt, and its outcome (success or failure) is kept for the
    /// life of the process.
    pub async fn ensure_ready(&self) -> Result<(), RuntimeError> {
        self.inner
            .init
            .get_or_init(|| self.initialize())
            .await
            .clone()
            .map_err(RuntimeError::Unavailable)
    }

    #[instrument(skip(self))]
    async fn initialize(&self) -> Result<(), String> {
        self.set_status(RuntimeStatus::LoadingInterpreter);
        let version = match self.inner.interpreter.probe().await {
            Ok(version) => version,
            Err(e) => return Err(self.fail(e)),
        };
        info!(version = %version, "Interpreter available");

        self.set_status(RuntimeStatus::LoadingPackages);
        if let Err(e) = self.inner.interpreter.load_packages(&self.inner.packages).await {
            return Err(self.fail(e));
        }
        info!(packages = ?self.inner.packages, "Packages loaded");

        self.set_status(RuntimeStatus::Ready);
        Ok(())
    }

    fn fail(&self, error: RuntimeError) -> String {
        let message = match error {
            RuntimeError::Unavailable(message) => message,
            other => other.to_string(),
        };
        error!(error = %message, "Runtime initialization failed");
        self.set_status(RuntimeStatus::Error(message.clone()));
        message
    }

    pub async fn execute(&self, program: Program) -> Result<Execution, RuntimeError> {
        self.ensure_ready().await?;
        self.inner.interpreter.execute(program).await
    }
}
