use rulesmith::config::{RunsConfig, SimulationConfig};
use rulesmith::gateway::{AppState, run_gateway_with_listener};
use rulesmith::store::{RunStore, SqliteRunStore};
use rulesmith::{Backends, RunLoop};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

async fn serve(db_path: &Path) -> String {
    let store: Arc<dyn RunStore> = Arc::new(SqliteRunStore::open(db_path).await.unwrap());
    let runner = RunLoop::new(store, Backends::simulation(SimulationConfig::instant()));
    let state = AppState::new(runner, RunsConfig::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        run_gateway_with_listener(listener, state).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn executed_run_survives_a_gateway_restart() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("data").join("runs.db");
    let client = reqwest::Client::new();

    let base = serve(&db_path).await;
    let created: Value = client
        .post(format!("{base}/api/runs"))
        .json(&json!({"title": "Refund", "taskText": "Reply to a double charge."}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let run_id = created["runId"].as_str().unwrap().to_string();

    let executed = client
        .post(format!("{base}/api/runs/{run_id}/execute"))
        .send()
        .await
        .unwrap();
    assert_eq!(executed.status(), reqwest::StatusCode::OK);
    let executed: Value = executed.json().await.unwrap();
    assert_eq!(executed["status"], "completed");
    assert_eq!(executed["attempts"].as_array().unwrap().len(), 4);

    // A second gateway on the same database sees the finished run.
    let restarted = serve(&db_path).await;
    let detail: Value = client
        .get(format!("{restarted}/api/runs/{run_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["title"], "Refund");
    assert_eq!(detail["status"], "completed");
    assert_eq!(detail["policyVersions"].as_array().unwrap().len(), 4);
    assert_eq!(detail["attempts"][3]["scoreTotal"], 92);

    let listed: Value = client
        .get(format!("{restarted}/api/runs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["runs"][0]["bestScore"], 92);
}
