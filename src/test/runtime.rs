#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rocket::futures::future::join_all;
    use rocket::http::{ContentType, Status};
    use serde_json::json;

    use crate::api::challenges::{RunResponse, SubmitResponse};
    use crate::db::get_challenge;
    use crate::runtime::{
        Execution, INPUT_PLACEHOLDER, NO_OUTPUT, OUTPUT_PLACEHOLDER, RuntimeBridge, RuntimeError,
        RuntimeStatus, run_code, submit_code, substitute_placeholders,
    };
    use crate::test::test_db::sample_example;
    use crate::test::test_utils::{
        FakeInterpreter, STANDARD_PASSWORD, TRAINEE_EMAIL, create_standard_test_db,
        login_test_user, setup_test_client_with,
    };

    fn bridge_with(fake: &Arc<FakeInterpreter>) -> RuntimeBridge {
        RuntimeBridge::new(fake.clone(), vec!["pandas".to_string()])
    }

    #[rocket::async_test]
    async fn test_concurrent_initialization_probes_once() {
        let fake = Arc::new(FakeInterpreter::ok());
        let bridge = bridge_with(&fake);

        assert_eq!(bridge.status(), RuntimeStatus::Uninitialized);

        let results = join_all((0..5).map(|_| bridge.ensure_ready())).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(fake.probe_count(), 1);
        assert_eq!(bridge.status(), RuntimeStatus::Ready);

        bridge.clone().ensure_ready().await.unwrap();
        assert_eq!(fake.probe_count(), 1);
    }

    #[rocket::async_test]
    async fn test_failed_initialization_is_remembered() {
        let fake = Arc::new(FakeInterpreter::unavailable("python3 not found"));
        let bridge = bridge_with(&fake);

        let first = bridge.ensure_ready().await;
        let second = bridge.ensure_ready().await;

        assert_eq!(
            first,
            Err(RuntimeError::Unavailable("python3 not found".to_string()))
        );
        assert_eq!(first, second);
        assert_eq!(fake.probe_count(), 1);
        assert_eq!(
            bridge.status(),
            RuntimeStatus::Error("python3 not found".to_string())
        );

        let run = run_code(&bridge, "print(1)").await;
        assert!(matches!(run, Err(RuntimeError::Unavailable(_))));
    }

    #[test]
    fn test_substitution_replaces_every_occurrence() {
        let script = format!(
            "a = {INPUT_PLACEHOLDER}\nb = {INPUT_PLACEHOLDER}\nc = {OUTPUT_PLACEHOLDER}"
        );

        let substituted = substitute_placeholders(&script, &sample_example()).unwrap();

        assert!(!substituted.contains(INPUT_PLACEHOLDER));
        assert!(!substituted.contains(OUTPUT_PLACEHOLDER));
        assert_eq!(substituted.matches(r#""value":2"#).count(), 2);
        assert_eq!(substituted.matches(r#""value":4"#).count(), 1);
        assert!(substituted.starts_with(r#"a = {"columns":["id","value"]"#));
    }

    #[rocket::async_test]
    async fn test_run_output() {
        let fake = Arc::new(FakeInterpreter::responding(|program| {
            let code = &program.steps[0];
            if code.contains("raise") {
                Ok(Execution {
                    error: Some("ValueError: boom".to_string()),
                    ..Execution::default()
                })
            } else if code.contains("print") {
                Ok(Execution {
                    output: "hello\n".to_string(),
                    ..Execution::default()
                })
            } else {
                Ok(Execution::default())
            }
        }));
        let bridge = bridge_with(&fake);

        assert_eq!(run_code(&bridge, "x = 1").await.unwrap(), NO_OUTPUT);
        assert_eq!(run_code(&bridge, "print('hello')").await.unwrap(), "hello\n");
        assert_eq!(
            run_code(&bridge, "raise ValueError('boom')").await.unwrap(),
            "ValueError: boom"
        );
        assert_eq!(fake.programs().len(), 3);
    }

    #[rocket::async_test]
    async fn test_timeout_is_reported_as_output() {
        let fake = Arc::new(FakeInterpreter::responding(|_| {
            Err(RuntimeError::Timeout(std::time::Duration::from_secs(10)))
        }));
        let bridge = bridge_with(&fake);

        let output = run_code(&bridge, "while True: pass").await.unwrap();
        assert_eq!(output, "Execution timed out after 10 seconds");
    }

    #[rocket::async_test]
    async fn test_submit_runs_code_then_substituted_script() {
        let test_db = create_standard_test_db().await;
        let challenge_id = test_db.challenge_id("Double values").unwrap();
        let challenge = get_challenge(&test_db.pool, challenge_id).await.unwrap();

        let fake = Arc::new(FakeInterpreter::responding(|_| {
            Ok(Execution {
                value: Some("✅ All tests passed!".to_string()),
                ..Execution::default()
            })
        }));
        let bridge = bridge_with(&fake);

        let code = "def solve(df):\n    return df * 2\n";
        let first = submit_code(&bridge, &challenge, code).await.unwrap();
        let second = submit_code(&bridge, &challenge, code).await.unwrap();

        assert_eq!(first, "✅ All tests passed!");
        assert_eq!(first, second);

        let programs = fake.programs();
        assert_eq!(programs.len(), 2);
        assert_eq!(programs[0], programs[1]);
        assert_eq!(programs[0].steps[0], code);
        assert!(programs[0].steps[1].starts_with("check({\"columns\""));
        assert!(!programs[0].steps[1].contains("${"));
    }

    #[rocket::async_test]
    async fn test_submit_reports_validation_errors() {
        let test_db = create_standard_test_db().await;
        let challenge_id = test_db.challenge_id("Double values").unwrap();
        let challenge = get_challenge(&test_db.pool, challenge_id).await.unwrap();

        let fake = Arc::new(FakeInterpreter::responding(|_| {
            Ok(Execution {
                error: Some("NameError: name 'solve' is not defined".to_string()),
                ..Execution::default()
            })
        }));
        let bridge = bridge_with(&fake);

        let result = submit_code(&bridge, &challenge, "").await.unwrap();
        assert_eq!(
            result,
            "❌ Validation failed with an error: NameError: name 'solve' is not defined"
        );
    }

    #[rocket::async_test]
    async fn test_challenge_endpoints() {
        let test_db = create_standard_test_db().await;
        let challenge_id = test_db.challenge_id("Double values").unwrap();

        let fake = Arc::new(FakeInterpreter::responding(|program| {
            Ok(Execution {
                output: "ran\n".to_string(),
                value: (program.steps.len() == 2).then(|| "passed".to_string()),
                error: None,
            })
        }));
        let (client, _) = setup_test_client_with(test_db, fake.clone()).await;

        let body = json!({ "code": "print('ran')" }).to_string();

        let response = client
            .post(format!("/api/challenges/{}/run", challenge_id))
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        login_test_user(&client, TRAINEE_EMAIL, STANDARD_PASSWORD).await;

        let response = client
            .post(format!("/api/challenges/{}/run", challenge_id))
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let run: RunResponse = response.into_json().await.unwrap();
        assert_eq!(run.output, "ran\n");

        let response = client
            .post(format!("/api/challenges/{}/submit", challenge_id))
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let submit: SubmitResponse = response.into_json().await.unwrap();
        assert_eq!(submit.result, "passed");

        let response = client
            .post("/api/challenges/9999/submit")
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        let response = client.get("/api/runtime/status").dispatch().await;
        let status: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(status["state"], "ready");
    }

    #[rocket::async_test]
    async fn test_unavailable_runtime_endpoint() {
        let test_db = create_standard_test_db().await;
        let challenge_id = test_db.challenge_id("FizzBuzz").unwrap();

        let fake = Arc::new(FakeInterpreter::unavailable("no interpreter"));
        let (client, _) = setup_test_client_with(test_db, fake).await;

        login_test_user(&client, TRAINEE_EMAIL, STANDARD_PASSWORD).await;

        let response = client
            .post(format!("/api/challenges/{}/run", challenge_id))
            .header(ContentType::JSON)
            .body(json!({ "code": "print(1)" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::ServiceUnavailable);

        let response = client.get("/api/runtime/status").dispatch().await;
        let status: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(status["state"], "error");
        assert_eq!(status["message"], "no interpreter");
    }

    #[rocket::async_test]
    async fn test_unreadable_examples_fail_validation() {
        let test_db = create_standard_test_db().await;
        let challenge_id = test_db.challenge_id("Double values").unwrap();

        sqlx::query("UPDATE challenges SET example_code = ? WHERE id = ?")
            .bind("{not json")
            .bind(challenge_id)
            .execute(&test_db.pool)
            .await
            .unwrap();

        let challenge = get_challenge(&test_db.pool, challenge_id).await.unwrap();
        assert!(challenge.example_error.is_some());

        let fake = Arc::new(FakeInterpreter::ok());
        let bridge = bridge_with(&fake);

        let result = submit_code(&bridge, &challenge, "def solve(df): pass")
            .await
            .unwrap();

        assert!(result.starts_with("❌ Validation failed with an error:"));
        assert!(result.contains("example data could not be read"));
        assert!(fake.programs().is_empty());
    }
}

/// Runs against the local `python3`. Each test returns early when no
/// interpreter is installed.
#[cfg(test)]
mod local_python {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use rocket::futures::future::join_all;

    use crate::db::get_challenge;
    use crate::runtime::{
        INPUT_PLACEHOLDER, Interpreter, NO_OUTPUT, OUTPUT_PLACEHOLDER, Program, PythonInterpreter,
        RuntimeBridge, RuntimeError, run_code, submit_code,
    };
    use crate::test::test_utils::create_standard_test_db;

    async fn python(timeout: Duration) -> Option<PythonInterpreter> {
        let interpreter = PythonInterpreter::new("python3", timeout);
        match interpreter.probe().await {
            Ok(_) => Some(interpreter),
            Err(e) => {
                eprintln!("python3 not available, skipping: {}", e);
                None
            }
        }
    }

    async fn python_bridge() -> Option<RuntimeBridge> {
        let interpreter = python(Duration::from_secs(3)).await?;
        Some(RuntimeBridge::new(Arc::new(interpreter), Vec::new()))
    }

    #[rocket::async_test]
    async fn test_run_captures_printed_text() {
        let Some(bridge) = python_bridge().await else {
            return;
        };

        assert_eq!(
            run_code(&bridge, "print('hello')\nprint(1, 2)").await.unwrap(),
            "hello\n1 2\n"
        );
        assert_eq!(run_code(&bridge, "x = 1").await.unwrap(), NO_OUTPUT);
        assert_eq!(
            run_code(&bridge, "raise ValueError('boom')").await.unwrap(),
            "ValueError: boom"
        );
    }

    #[rocket::async_test]
    async fn test_concurrent_runs_keep_their_own_output() {
        let Some(bridge) = python_bridge().await else {
            return;
        };

        let codes: Vec<String> = (0..4)
            .map(|i| format!("for _ in range(3):\n    print('run {}')", i))
            .collect();
        let outputs = join_all(codes.iter().map(|code| run_code(&bridge, code))).await;

        for (i, output) in outputs.into_iter().enumerate() {
            assert_eq!(output.unwrap(), format!("run {i}\n").repeat(3));
        }
    }

    #[rocket::async_test]
    async fn test_raw_writes_do_not_corrupt_the_result() {
        let Some(bridge) = python_bridge().await else {
            return;
        };

        assert_eq!(
            run_code(&bridge, "import os\nos.write(1, b'x')").await.unwrap(),
            NO_OUTPUT
        );
        assert_eq!(
            run_code(&bridge, "print('\\ud800')").await.unwrap(),
            "\\ud800\n"
        );
    }

    #[rocket::async_test]
    async fn test_last_expression_is_the_value() {
        let Some(interpreter) = python(Duration::from_secs(3)).await else {
            return;
        };

        let execution = interpreter
            .execute(Program {
                steps: vec![
                    "def solve(x):\n    return x * 2".to_string(),
                    "'ok' if solve(2) == 4 else 'bad'".to_string(),
                ],
            })
            .await
            .unwrap();
        assert_eq!(execution.value.as_deref(), Some("ok"));
        assert!(execution.error.is_none());

        let execution = interpreter.execute(Program::single("1 + 1")).await.unwrap();
        assert_eq!(execution.value.as_deref(), Some("2"));
    }

    #[rocket::async_test]
    async fn test_runaway_code_is_killed() {
        let Some(interpreter) = python(Duration::from_secs(1)).await else {
            return;
        };

        let started = Instant::now();
        let result = interpreter.execute(Program::single("while True: pass")).await;

        assert_eq!(result, Err(RuntimeError::Timeout(Duration::from_secs(1))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[rocket::async_test]
    async fn test_verdict_is_unchanged_by_earlier_runs() {
        let Some(bridge) = python_bridge().await else {
            return;
        };

        let test_db = create_standard_test_db().await;
        let challenge_id = test_db.challenge_id("Double values").unwrap();
        let mut challenge = get_challenge(&test_db.pool, challenge_id).await.unwrap();
        challenge.validation_script = format!(
            "result = solve({INPUT_PLACEHOLDER}['data'])\n\
             '✅ All tests passed!' if result == {OUTPUT_PLACEHOLDER}['data'] else '❌ Wrong answer'"
        );

        let code = "def solve(rows):\n    return [{'id': r['id'], 'value': r['value'] * 2} for r in rows]\n";

        let first = submit_code(&bridge, &challenge, code).await.unwrap();
        for _ in 0..3 {
            run_code(&bridge, code).await.unwrap();
        }
        let second = submit_code(&bridge, &challenge, code).await.unwrap();

        assert_eq!(first, "✅ All tests passed!");
        assert_eq!(first, second);

        let wrong = "def solve(rows):\n    return rows\n";
        assert_eq!(
            submit_code(&bridge, &challenge, wrong).await.unwrap(),
            "❌ Wrong answer"
        );
    }
}
