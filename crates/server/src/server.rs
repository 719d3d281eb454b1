//! Request handling and the stdio transport.

use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use taskrank_core::{EvaluationContext, NewTask, TaskId, TaskPatch};
use taskrank_prioritization::{EngineConfig, PrioritizationEngine};
use taskrank_storage::Storage;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, error, info};

use crate::protocol::{error_codes, Request, Response, RpcError};

/// taskrank server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Storage path for task records
    pub storage_path: PathBuf,
    /// Scorer model artifact
    pub model_path: PathBuf,
    /// Server name reported by `ping`
    pub server_name: String,
    /// Server version
    pub version: String,
    /// Engine settings
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_path: ".taskrank".into(),
            model_path: PathBuf::from(".taskrank").join("model.json"),
            server_name: "taskrank".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct IdParams {
    id: TaskId,
}

#[derive(Deserialize)]
struct UpdateParams {
    id: TaskId,
    #[serde(flatten)]
    patch: TaskPatch,
}

#[derive(Deserialize)]
struct PrioritizeParams {
    #[serde(default)]
    completed_ids: Vec<TaskId>,
}

/// Serves task CRUD and prioritization over any line transport.
pub struct TaskServer<S: Storage> {
    config: ServerConfig,
    storage: S,
    engine: PrioritizationEngine,
}

impl<S: Storage> TaskServer<S> {
    /// Create a server over `storage` ranking with `engine`.
    pub fn new(config: ServerConfig, storage: S, engine: PrioritizationEngine) -> Self {
        Self { config, storage, engine }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get a reference to the storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Handle one parsed request.
    pub async fn handle_request(&mut self, request: Request) -> Response {
        let Request { id, method, params } = request;
        debug!("Request {}", method);
        match self.dispatch(&method, params).await {
            Ok(result) => Response::success(id, result),
            Err(e) => {
                debug!("Request {} failed: {}", method, e.message);
                Response::failure(id, e)
            }
        }
    }

    /// Parse and handle one request line.
    pub async fn handle_line(&mut self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                Response::failure(
                    None,
                    RpcError::new(error_codes::PARSE_ERROR, format!("Parse error: {}", e)),
                )
            }
        }
    }

    async fn dispatch(&mut self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "ping" => Ok(json!({
                "status": "ok",
                "name": self.config.server_name,
                "version": self.config.version,
                "scorer": self.engine.is_ready(),
            })),

            "tasks/list" => {
                let tasks = self.storage.list_tasks().await?;
                to_value(&tasks)
            }

            "tasks/get" => {
                let IdParams { id } = parse_params(params)?;
                match self.storage.load_task(id).await? {
                    Some(task) => to_value(&task),
                    None => Err(taskrank_storage::StorageError::NotFound(id).into()),
                }
            }

            "tasks/create" => {
                let new_task: NewTask = parse_params(params)?;
                let task = self.storage.create_task(new_task).await?;
                info!("Created task {}", task.id);
                Ok(json!({ "message": "Task created", "id": task.id }))
            }

            "tasks/update" => {
                let UpdateParams { id, patch } = parse_params(params)?;
                self.storage.update_task(id, patch).await?;
                info!("Updated task {}", id);
                Ok(json!({ "message": "Task updated" }))
            }

            "tasks/delete" => {
                let IdParams { id } = parse_params(params)?;
                self.storage.delete_task(id).await?;
                info!("Deleted task {}", id);
                Ok(json!({ "message": "Task deleted" }))
            }

            "tasks/prioritize" => {
                let PrioritizeParams { completed_ids } = parse_params(params)?;
                // Fail before touching the store.
                self.engine.ensure_scorer()?;
                let tasks = self.storage.list_tasks().await?;
                let ctx = EvaluationContext::new(completed_ids);
                let ranked = self.engine.prioritize(&tasks, &ctx)?;
                to_value(&ranked)
            }

            other => Err(RpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        }
    }

    /// Serve requests from stdin, writing responses to stdout.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        info!("Starting {} v{} (stdio transport)", self.config.server_name, self.config.version);
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve requests from `reader` until EOF, one response line per request.
    pub async fn serve<R, W>(&mut self, reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut writer = BufWriter::new(writer);

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = self.handle_line(&line).await;
            let response_json = serde_json::to_string(&response)?;

            writer.write_all(response_json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        info!("Server stopped");
        Ok(())
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(RpcError::invalid_params)
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskrank_prioritization::{FeatureVector, ScoreError, ScorerState};
    use taskrank_storage::JsonStorage;

    fn urgency_engine() -> PrioritizationEngine {
        PrioritizationEngine::new(ScorerState::loaded(
            |v: &FeatureVector| -> Result<f64, ScoreError> { Ok(v.urgency_score() * 10.0) },
        ))
    }

    async fn server(dir: &tempfile::TempDir, engine: PrioritizationEngine) -> TaskServer<JsonStorage> {
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        TaskServer::new(ServerConfig::default(), storage, engine)
    }

    async fn call(server: &mut TaskServer<JsonStorage>, method: &str, params: Value) -> Response {
        server.handle_request(Request::new(method, params)).await
    }

    fn create_params(name: &str, urgency: i64, deps: &[i64]) -> Value {
        json!({
            "name": name,
            "deadline": "2099-01-01",
            "urgency_score": urgency,
            "normalized_urgency": 0.5,
            "dependencies": deps,
        })
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(&dir, urgency_engine()).await;

        let created = call(&mut server, "tasks/create", create_params("Write docs", 2, &[])).await;
        assert_eq!(created.result.unwrap(), json!({"message": "Task created", "id": 1}));

        let updated = call(&mut server, "tasks/update", json!({"id": 1, "name": "Write more docs"})).await;
        assert!(updated.error.is_none());

        let fetched = call(&mut server, "tasks/get", json!({"id": 1})).await.result.unwrap();
        assert_eq!(fetched["name"], "Write more docs");
        assert_eq!(fetched["status"], "Pending");

        let listed = call(&mut server, "tasks/list", Value::Null).await.result.unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let deleted = call(&mut server, "tasks/delete", json!({"id": 1})).await;
        assert_eq!(deleted.result.unwrap()["message"], "Task deleted");

        let missing = call(&mut server, "tasks/get", json!({"id": 1})).await;
        assert_eq!(missing.error.unwrap().code, error_codes::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_with_missing_fields_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(&dir, urgency_engine()).await;

        let response = call(&mut server, "tasks/create", json!({"name": "half"})).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::INVALID_PARAMS);
        assert!(error.message.starts_with("Missing required fields"));
    }

    #[tokio::test]
    async fn test_prioritize_ranks_and_classifies() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(&dir, urgency_engine()).await;

        call(&mut server, "tasks/create", create_params("low", 1, &[])).await;
        call(&mut server, "tasks/create", create_params("high", 8, &[1])).await;
        call(&mut server, "tasks/create", create_params("mid", 4, &[1])).await;

        let ranked = call(&mut server, "tasks/prioritize", json!({"completed_ids": [1]})).await;
        let ranked = ranked.result.unwrap();
        let ranked = ranked.as_array().unwrap();

        let names: Vec<_> = ranked.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
        assert_eq!(ranked[0]["score"], 80.0);
        assert_eq!(ranked[0]["status"], "Ready");

        let blocked = call(&mut server, "tasks/prioritize", Value::Null).await.result.unwrap();
        assert_eq!(blocked[0]["status"], "Blocked");
        assert_eq!(blocked[2]["status"], "Ready");

        // Prioritizing never writes back.
        let stored = call(&mut server, "tasks/get", json!({"id": 2})).await.result.unwrap();
        assert_eq!(stored["status"], "Pending");
    }

    #[tokio::test]
    async fn test_prioritize_without_scorer_fails_whole_call() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PrioritizationEngine::new(ScorerState::unavailable("model missing"));
        let mut server = server(&dir, engine).await;
        call(&mut server, "tasks/create", create_params("a", 1, &[])).await;

        let response = call(&mut server, "tasks/prioritize", json!({})).await;
        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::SCORER_UNAVAILABLE);
        assert_eq!(error.message, "scorer unavailable: model missing");

        let ping = call(&mut server, "ping", Value::Null).await.result.unwrap();
        assert_eq!(ping["scorer"], false);
    }

    #[tokio::test]
    async fn test_prioritize_fails_on_unreadable_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(&dir, urgency_engine()).await;
        call(&mut server, "tasks/create", create_params("a", 1, &[])).await;
        call(&mut server, "tasks/create", create_params("b", 2, &[])).await;

        std::fs::write(dir.path().join("tasks").join("2.json"), "{ not json").unwrap();

        let response = call(&mut server, "tasks/prioritize", json!({})).await;
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, error_codes::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_params() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(&dir, urgency_engine()).await;

        let unknown = call(&mut server, "tasks/explode", Value::Null).await;
        assert_eq!(unknown.error.unwrap().code, error_codes::METHOD_NOT_FOUND);

        let bad = call(&mut server, "tasks/get", json!({"id": "seven"})).await;
        assert_eq!(bad.error.unwrap().code, error_codes::INVALID_PARAMS);

        let no_id = call(&mut server, "tasks/delete", Value::Null).await;
        assert_eq!(no_id.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_serve_answers_each_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = server(&dir, urgency_engine()).await;

        let input = concat!(
            r#"{"id": 1, "method": "ping"}"#, "\n",
            "\n",
            "not json\n",
            r#"{"id": "p", "method": "tasks/prioritize", "params": {"completed_ids": []}}"#, "\n",
        );
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[0]["result"]["status"], "ok");
        assert_eq!(lines[1]["error"]["code"], error_codes::PARSE_ERROR);
        assert_eq!(lines[2]["id"], "p");
        assert_eq!(lines[2]["result"], json!([]));
    }
}
