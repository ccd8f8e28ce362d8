use tracing::{info, instrument, warn};

use crate::models::{Challenge, ExampleData};

use super::{Execution, Program, RuntimeBridge, RuntimeError};

pub const INPUT_PLACEHOLDER: &str = "${challenge_input_data}";
pub const OUTPUT_PLACEHOLDER: &str = "${challenge_output_data}";
pub const NO_OUTPUT: &str = "Code executed without printing anything.";

pub fn validation_failed(message: &str) -> String {
    format!("❌ Validation failed with an error: {}", message)
}

/// Replaces every occurrence of both placeholders with the JSON text of the
/// example tables.
pub fn substitute_placeholders(
    script: &str,
    example: &ExampleData,
) -> Result<String, serde_json::Error> {
    let input = serde_json::to_string(&example.input)?;
    let output = serde_json::to_string(&example.output)?;

    Ok(script
        .replace(INPUT_PLACEHOLDER, &input)
        .replace(OUTPUT_PLACEHOLDER, &output))
}

/// Text shown in the output panel after a run.
pub fn run_output(execution: Execution) -> String {
    match execution.error {
        Some(error) => error,
        None if execution.output.is_empty() => NO_OUTPUT.to_string(),
        None => execution.output,
    }
}

/// Runs trainee code and returns what it printed. Only an unavailable
/// interpreter is an error; everything else is shown to the trainee.
#[instrument(skip(bridge, code))]
pub async fn run_code(bridge: &RuntimeBridge, code: &str) -> Result<String, RuntimeError> {
    match bridge.execute(Program::single(code)).await {
        Ok(execution) => Ok(run_output(execution)),
        Err(RuntimeError::Unavailable(msg)) => Err(RuntimeError::Unavailable(msg)),
        Err(other) => Ok(other.to_string()),
    }
}

/// Defines the trainee's code, then evaluates the challenge's validation
/// script against the example data. The script's last expression is the
/// verdict.
#[instrument(skip(bridge, challenge, code), fields(challenge_id = challenge.id))]
pub async fn submit_code(
    bridge: &RuntimeBridge,
    challenge: &Challenge,
    code: &str,
) -> Result<String, RuntimeError> {
    if let Some(error) = &challenge.example_error {
        warn!(error = %error, "Refusing to grade against unreadable example data");
        return Ok(validation_failed(&format!(
            "the challenge's example data could not be read ({})",
            error
        )));
    }

    let script = match substitute_placeholders(&challenge.validation_script, &challenge.example_code)
    {
        Ok(script) => script,
        Err(e) => return Ok(validation_failed(&e.to_string())),
    };

    let program = Program {
        steps: vec![code.to_string(), script],
    };

    match bridge.execute(program).await {
        Ok(Execution {
            error: Some(error), ..
        }) => Ok(validation_failed(&error)),
        Ok(execution) => {
            let verdict = execution.value.unwrap_or_default();
            info!(verdict = %verdict, "Submission validated");
            Ok(verdict)
        }
        Err(RuntimeError::Unavailable(msg)) => Err(RuntimeError::Unavailable(msg)),
        Err(other) => Ok(validation_failed(&other.to_string())),
    }
}
