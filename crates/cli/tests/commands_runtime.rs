use std::env;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;

use actiongate_agent::runtime::build_dispatcher;
use actiongate_agent::services::EchoBackend;
use actiongate_cli::commands::{actions, ask, doctor, gates, migrate, outcomes, runs};
use actiongate_core::domain::conversation::{ConversationId, TurnRole};
use actiongate_core::domain::run::NewRun;
use actiongate_core::{
    Actor, ActorRole, AppConfig, ConversationStore, DispatchContext, DispatchOutcome, RunLedger,
    WindowAlgorithm,
};
use actiongate_db::{connect, migrations, SqlConversationStore, SqlRateLimitStore, SqlRunLedger};
use chrono::Utc;
use serde_json::{json, Value};

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("ACTIONGATE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_override() {
    with_env(
        &[
            ("ACTIONGATE_DATABASE_URL", "sqlite::memory:"),
            ("ACTIONGATE_RATE_LIMIT_ALGORITHM", "leaky-bucket"),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn doctor_reports_complete_catalog_and_reachable_database() {
    with_env(&[("ACTIONGATE_DATABASE_URL", "sqlite::memory:")], || {
        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "pass", "{report}");

        let checks = report["checks"].as_array().expect("checks");
        let names: Vec<&str> = checks.iter().filter_map(|check| check["name"].as_str()).collect();
        assert_eq!(
            names,
            vec![
                "catalog_completeness",
                "config_validation",
                "dispatcher_wiring",
                "database_connectivity"
            ]
        );
    });
}

#[test]
fn doctor_skips_runtime_checks_when_config_is_invalid() {
    with_env(&[("ACTIONGATE_LOGGING_FORMAT", "xml")], || {
        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][0]["status"], "pass");
        assert_eq!(report["checks"][1]["status"], "fail");
        assert_eq!(report["checks"][2]["status"], "skipped");
        assert_eq!(report["checks"][3]["status"], "skipped");
    });
}

#[test]
fn actions_are_filtered_by_role_and_router() {
    let result = actions::run(Some("carrier"), None);
    assert_eq!(result.exit_code, 0);
    let payload = parse_payload(&result.output);
    let rows = payload["data"].as_array().expect("rows");
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|row| row["router"].as_str().unwrap_or("").starts_with("carrier_")));

    let outreach = parse_payload(&actions::run(None, Some("recruiter_outreach")).output);
    let campaign = outreach["data"]
        .as_array()
        .expect("rows")
        .iter()
        .find(|row| row["name"] == "sendCampaignMessage")
        .cloned()
        .expect("sendCampaignMessage listed");
    assert_eq!(campaign["risk_level"], "execute_high");
    assert_eq!(campaign["requires_approval"], true);
    assert_eq!(campaign["rate_limit"], "1 per 3600s on `sendCampaignMessage`");
}

#[test]
fn actions_reject_unknown_role() {
    let result = actions::run(Some("dispatcher"), None);
    assert_eq!(result.exit_code, 6);
    assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
}

#[test]
fn pending_gate_can_be_listed_resolved_and_traced() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("actiongate.db").display());
    let (run_id, gate_id) = seed_pending_campaign(&url, 86_400);

    with_env(&[("ACTIONGATE_DATABASE_URL", url.as_str())], || {
        let pending = parse_payload(&gates::pending(10).output);
        assert_eq!(pending["status"], "ok");
        let listed = pending["data"].as_array().expect("gates");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["gate_id"], gate_id.as_str());
        assert_eq!(listed[0]["reason"], "Send campaign spring to carrier 123456");

        let refused = gates::resolve(&gate_id, "approve", "driver-9", "driver");
        assert_eq!(refused.exit_code, 8);
        assert_eq!(parse_payload(&refused.output)["error_class"], "forbidden");

        let approved = parse_payload(&gates::resolve(&gate_id, "approve", "lead-1", "admin").output);
        assert_eq!(approved["status"], "ok");
        assert_eq!(approved["data"]["changed"], true);
        assert_eq!(approved["data"]["gate"]["state"], "approved");

        let repeated = parse_payload(&gates::resolve(&gate_id, "approve", "lead-1", "admin").output);
        assert_eq!(repeated["data"]["changed"], false);

        let rejected_late = gates::resolve(&gate_id, "reject", "lead-1", "admin");
        assert_eq!(rejected_late.exit_code, 8);
        assert_eq!(parse_payload(&rejected_late.output)["error_class"], "conflict");

        let trace = parse_payload(&runs::trace(&run_id).output);
        assert_eq!(trace["status"], "ok");
        assert_eq!(trace["data"]["steps"].as_array().map(Vec::len), Some(1));
        assert_eq!(trace["data"]["gates"][0]["state"], "approved");

        let listed_runs = parse_payload(&runs::list(None, Some("recruiter"), Some("open"), 10).output);
        assert_eq!(listed_runs["data"].as_array().map(Vec::len), Some(1));

        let empty_queue = parse_payload(&gates::pending(10).output);
        assert_eq!(empty_queue["data"], json!([]));
    });
}

#[test]
fn open_run_cannot_be_evaluated() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("actiongate.db").display());
    let (run_id, _) = seed_pending_campaign(&url, 86_400);

    with_env(&[("ACTIONGATE_DATABASE_URL", url.as_str())], || {
        let result = outcomes::evaluate(&run_id);
        assert_eq!(result.exit_code, 8);
        assert_eq!(parse_payload(&result.output)["error_class"], "run_not_complete");
    });
}

#[test]
fn unknown_run_trace_is_not_found() {
    with_env(&[("ACTIONGATE_DATABASE_URL", "sqlite::memory:")], || {
        let result = runs::trace("run-missing");
        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "not_found");
    });
}

#[test]
fn outcome_stats_on_empty_database_are_zero() {
    with_env(&[("ACTIONGATE_DATABASE_URL", "sqlite::memory:")], || {
        let payload = parse_payload(&outcomes::stats(Some("driver"), Some(24)).output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["stats"]["total_runs"], 0);
        assert_eq!(payload["data"]["action_effectiveness"], json!([]));

        let regressions = parse_payload(&outcomes::regressions(24).output);
        assert_eq!(regressions["data"], json!([]));
        assert_eq!(outcomes::regressions(0).exit_code, 6);
    });
}

#[test]
fn sweep_on_empty_queue_expires_nothing() {
    with_env(&[("ACTIONGATE_DATABASE_URL", "sqlite::memory:")], || {
        let payload = parse_payload(&gates::sweep().output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "expired 0 gates");
    });
}

#[test]
fn sweep_watch_runs_on_the_configured_interval_until_the_pass_limit() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("actiongate.db").display());
    let (run_id, gate_id) = seed_pending_campaign(&url, 1);

    with_env(
        &[
            ("ACTIONGATE_DATABASE_URL", url.as_str()),
            ("ACTIONGATE_APPROVALS_SWEEP_INTERVAL_SECS", "1"),
        ],
        || {
            let payload = parse_payload(&gates::watch(Some(2)).output);
            assert_eq!(payload["status"], "ok", "{payload}");
            assert_eq!(payload["data"]["passes"], 2);
            let expired = payload["data"]["expired"].as_array().expect("expired gates");
            assert_eq!(expired.len(), 1);
            assert_eq!(expired[0]["gate_id"], gate_id.as_str());
            assert_eq!(expired[0]["state"], "expired");

            let trace = parse_payload(&runs::trace(&run_id).output);
            assert_eq!(trace["data"]["steps"][0]["status"], "denied");

            assert_eq!(gates::watch(Some(0)).exit_code, 6);
        },
    );
}

#[test]
fn ask_routes_through_the_configured_model_and_bounds_the_conversation() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("actiongate.db").display());
    let completion = json!({
        "message": {
            "role": "assistant",
            "content": "{\"action\": \"findParking\", \"params\": {\"lat\": 35.14, \"lng\": -90.05}}"
        },
        "prompt_eval_count": 10,
        "eval_count": 5,
    });
    let (base_url, model) = serve_model(vec![completion.to_string()]);

    let data = with_env(
        &[
            ("ACTIONGATE_DATABASE_URL", url.as_str()),
            ("ACTIONGATE_AI_PROVIDER", "ollama"),
            ("ACTIONGATE_AI_BASE_URL", base_url.as_str()),
            ("ACTIONGATE_CONVERSATION_MAX_TURNS", "2"),
        ],
        || {
            let result = ask::run("driver-7", "driver", "find parking near Memphis", None);
            assert_eq!(result.exit_code, 0, "{}", result.output);
            parse_payload(&result.output)["data"].clone()
        },
    );

    assert_eq!(data["decision"], "allow");
    assert_eq!(data["action"], "findParking");
    assert_eq!(data["pending_gates"], json!([]));
    assert_eq!(data["evaluation"]["quality_score"], 100);
    assert_eq!(data["evaluation"]["total_tokens"], 15);

    let requests = model.join().expect("model stub");
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("POST /api/chat "));
    assert!(requests[0].contains("find parking near Memphis"));

    let conversation_id = ConversationId(data["conversation_id"].as_str().expect("id").to_string());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let roles: Vec<TurnRole> = runtime.block_on(async {
        let pool = connect(&url).await.expect("connect");
        let turns = SqlConversationStore::new(pool.clone())
            .recent_context(&conversation_id, 10)
            .await
            .expect("turns");
        pool.close().await;
        turns.into_iter().map(|turn| turn.role).collect()
    });
    assert_eq!(roles, vec![TurnRole::Tool, TurnRole::Assistant]);
}

#[test]
fn ask_rejects_unknown_role_and_empty_message() {
    assert_eq!(ask::run("driver-7", "pilot", "hello", None).exit_code, 6);
    assert_eq!(ask::run("driver-7", "driver", "  ", None).exit_code, 6);
}

/// Serves canned chat completions, one connection each, and returns the raw requests.
fn serve_model(bodies: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base_url = format!("http://{}", listener.local_addr().expect("addr"));
    let handle = std::thread::spawn(move || {
        let mut requests = Vec::new();
        for body in bodies {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut received = Vec::new();
            let mut chunk = [0u8; 8192];
            loop {
                let read = stream.read(&mut chunk).expect("read");
                if read == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..read]);
                let text = String::from_utf8_lossy(&received).to_string();
                let complete = text.split_once("\r\n\r\n").is_some_and(|(head, rest)| {
                    let length = head
                        .lines()
                        .find_map(|line| {
                            line.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .and_then(|value| value.trim().parse::<usize>().ok())
                        })
                        .unwrap_or(0);
                    rest.len() >= length
                });
                if complete {
                    break;
                }
            }
            requests.push(String::from_utf8_lossy(&received).to_string());
            let reply = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(reply.as_bytes()).expect("reply");
        }
        requests
    });
    (base_url, handle)
}

/// Opens a recruiter run and parks one campaign send behind an approval gate.
fn seed_pending_campaign(url: &str, gate_timeout_secs: i64) -> (String, String) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    runtime.block_on(async {
        let pool = connect(url).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let ledger = Arc::new(SqlRunLedger::new(pool.clone()));
        let mut config = AppConfig::default();
        config.approvals.gate_timeout_secs = gate_timeout_secs;
        let dispatcher = build_dispatcher(
            &config,
            ledger.clone(),
            Arc::new(SqlRateLimitStore::new(pool.clone(), WindowAlgorithm::Fixed)),
            Arc::new(EchoBackend),
        )
        .expect("dispatcher");

        let actor = Actor::new("rec-1", ActorRole::Recruiter);
        let run = ledger
            .start_run(
                &actor,
                NewRun { conversation_id: None, goal: Some("spring hiring".to_string()) },
                Utc::now(),
            )
            .await
            .expect("run");
        let outcome = dispatcher
            .execute(
                "sendCampaignMessage",
                json!({ "campaignId": "spring", "carrierDot": "123456" }),
                &DispatchContext::new(run.run_id.clone(), actor),
            )
            .await
            .expect("dispatch");

        let DispatchOutcome::PendingApproval { gate_id, .. } = outcome else {
            panic!("expected the campaign to wait for approval");
        };
        pool.close().await;
        (run.run_id.0, gate_id.0)
    })
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env<T>(vars: &[(&str, &str)], test_fn: impl FnOnce() -> T) -> T {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ACTIONGATE_DATABASE_URL",
        "ACTIONGATE_DATABASE_MAX_CONNECTIONS",
        "ACTIONGATE_DATABASE_TIMEOUT_SECS",
        "ACTIONGATE_AI_PROVIDER",
        "ACTIONGATE_AI_API_KEY",
        "ACTIONGATE_AI_BASE_URL",
        "ACTIONGATE_AI_MODEL",
        "ACTIONGATE_AI_TIMEOUT_SECS",
        "ACTIONGATE_DISPATCH_MAX_TRANSIENT_RETRIES",
        "ACTIONGATE_DISPATCH_RETRY_BASE_DELAY_MS",
        "ACTIONGATE_APPROVALS_GATE_TIMEOUT_SECS",
        "ACTIONGATE_APPROVALS_SWEEP_INTERVAL_SECS",
        "ACTIONGATE_RATE_LIMIT_ALGORITHM",
        "ACTIONGATE_CONVERSATION_MAX_TURNS",
        "ACTIONGATE_LOGGING_LEVEL",
        "ACTIONGATE_LOGGING_FORMAT",
        "ACTIONGATE_LOG_LEVEL",
        "ACTIONGATE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let result = test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
    result
}
