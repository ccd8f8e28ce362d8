use std::process::Stdio;
use std::time::Duration;

use rocket::tokio::io::AsyncWriteExt;
use rocket::tokio::process::Command;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::AppError;

/// Prefix of the stdout line carrying the harness result. Anything the
/// trainee writes straight to file descriptor 1 lands on other lines.
const RESULT_MARKER: &str = "__portal_result__:";

/// Runs every step in one shared namespace with `print` and `sys.stdout`
/// pointed at a private buffer. The value of the last step's trailing
/// expression is reported as `value`. The result is written to the real
/// stdout on its own line behind [`RESULT_MARKER`].
const HARNESS: &str = r#"
import ast, builtins, io, json, sys, traceback

MARKER = "__portal_result__:"

def clean(text):
    if text is None:
        return None
    return text.encode("utf-8", "backslashreplace").decode("utf-8")

payload = json.loads(sys.stdin.read())
real_stdout = sys.stdout
buffer = io.StringIO()
sys.stdout = buffer
namespace = {"__name__": "__main__", "__builtins__": builtins}
result = {"output": "", "value": None, "error": None}

def run_step(source, want_value):
    tree = ast.parse(source, "<portal>", "exec")
    tail = None
    if want_value and tree.body and isinstance(tree.body[-1], ast.Expr):
        tail = ast.Expression(tree.body.pop().value)
    exec(compile(tree, "<portal>", "exec"), namespace)
    if tail is not None:
        return eval(compile(tail, "<portal>", "eval"), namespace)
    return None

try:
    steps = payload["steps"]
    value = None
    for index, source in enumerate(steps):
        value = run_step(source, index == len(steps) - 1)
    if value is not None:
        result["value"] = value if isinstance(value, str) else repr(value)
except BaseException as exc:
    result["error"] = "".join(traceback.format_exception_only(type(exc), exc)).strip()
finally:
    sys.stdout = real_stdout
    result["output"] = buffer.getvalue()
    result = {key: clean(value) for key, value in result.items()}
    real_stdout.flush()
    real_stdout.write("\n" + MARKER + json.dumps(result) + "\n")
    real_stdout.flush()
"#;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Python runtime unavailable: {0}")]
    Unavailable(String),
    #[error("Execution timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("Interpreter process failed: {0}")]
    Process(String),
    #[error("Unreadable interpreter output: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for RuntimeError {
    fn from(error: std::io::Error) -> Self {
        RuntimeError::Process(error.to_string())
    }
}

impl From<RuntimeError> for AppError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::Unavailable(msg) => AppError::ExternalService(msg),
            RuntimeError::Timeout(_) => AppError::Execution(error.to_string()),
            RuntimeError::Process(_) | RuntimeError::Protocol(_) => {
                AppError::Internal(error.to_string())
            }
        }
    }
}

/// Source snippets executed in order against one fresh namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub steps: Vec<String>,
}

impl Program {
    pub fn single(code: impl Into<String>) -> Self {
        Self {
            steps: vec![code.into()],
        }
    }
}

/// What one program run produced. A raised error ends the run early and
/// `error` holds its text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub output: String,
    pub value: Option<String>,
    pub error: Option<String>,
}

#[rocket::async_trait]
pub trait Interpreter: Send + Sync {
    /// Confirms the interpreter can be started and returns its version.
    async fn probe(&self) -> Result<String, RuntimeError>;

    async fn load_packages(&self, packages: &[String]) -> Result<(), RuntimeError>;

    async fn execute(&self, program: Program) -> Result<Execution, RuntimeError>;
}

/// Local CPython. Every execution gets its own process, killed when the
/// timeout elapses.
#[derive(Debug, Clone)]
pub struct PythonInterpreter {
    python: String,
    timeout: Duration,
}

impl PythonInterpreter {
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.python);
        command
            .env("MPLBACKEND", "Agg")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[rocket::async_trait]
impl Interpreter for PythonInterpreter {
    #[instrument(skip(self), fields(python = %self.python))]
    async fn probe(&self) -> Result<String, RuntimeError> {
        let output = self
            .command()
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("{}: {}", self.python, e)))?;

        if !output.status.success() {
            return Err(RuntimeError::Unavailable(format!(
                "{} --version exited with {}",
                self.python, output.status
            )));
        }

        // Older interpreters print the version on stderr.
        let mut version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            version = String::from_utf8_lossy(&output.stderr).trim().to_string();
        }

        Ok(version)
    }

    #[instrument(skip(self))]
    async fn load_packages(&self, packages: &[String]) -> Result<(), RuntimeError> {
        if packages.is_empty() {
            return Ok(());
        }

        let script = format!("import {}", packages.join(", "));
        let output = self
            .command()
            .arg("-c")
            .arg(&script)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("import failed").to_string();
            Err(RuntimeError::Unavailable(format!(
                "Failed to load packages: {}",
                reason
            )))
        }
    }

    #[instrument(skip_all, fields(steps = program.steps.len()))]
    async fn execute(&self, program: Program) -> Result<Execution, RuntimeError> {
        let payload = serde_json::to_vec(&program)
            .map_err(|e| RuntimeError::Protocol(e.to_string()))?;

        let mut child = self
            .command()
            .arg("-c")
            .arg(HARNESS)
            .spawn()
            .map_err(|e| RuntimeError::Unavailable(format!("{}: {}", self.python, e)))?;

        let run = async {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        // Dropping the future on timeout drops the child, which kills it.
        let output = match rocket::tokio::time::timeout(self.timeout, run).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(timeout = ?self.timeout, "Execution timed out, process killed");
                return Err(RuntimeError::Timeout(self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(line) = stdout
            .lines()
            .rev()
            .find_map(|l| l.strip_prefix(RESULT_MARKER))
        else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::Process(format!(
                "interpreter exited with {} and no result: {}",
                output.status,
                stderr.trim()
            )));
        };

        let execution: Execution =
            serde_json::from_str(line).map_err(|e| RuntimeError::Protocol(e.to_string()))?;
        debug!(
            printed = execution.output.len(),
            failed = execution.error.is_some(),
            "Execution finished"
        );

        Ok(execution)
    }
}
