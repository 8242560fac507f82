//! JSON-RPC server loop and method dispatch

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};

use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use super::transport::{LineTransport, ReadError};
use crate::error::{ServiceError, ServiceResult};
use crate::handlers::*;
use crate::memory::MemoryService;

/// Serves one client over a line transport
pub struct RpcServer {
    service: Arc<MemoryService>,
}

impl RpcServer {
    pub fn new(service: Arc<MemoryService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<MemoryService> {
        &self.service
    }

    /// Serve requests until the peer closes the stream
    pub async fn run<R, W>(&self, transport: &mut LineTransport<R, W>) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("JSON-RPC server ready");

        loop {
            match transport.read_request().await {
                Ok(Some(request)) => {
                    let is_notification = request.id.is_none();
                    let response = self.handle_request(request);
                    if !is_notification {
                        transport.write_response(&response).await?;
                    }
                }
                Ok(None) => {
                    tracing::info!("Client closed the stream");
                    break;
                }
                Err(ReadError::Io(e)) => {
                    tracing::error!("Transport error: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    let response =
                        JsonRpcResponse::error(None, JsonRpcError::parse_error(e.to_string()));
                    transport.write_response(&response).await?;
                }
            }
        }

        Ok(())
    }

    /// Handle a JSON-RPC request
    pub fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        tracing::debug!("Handling request: {}", request.method);

        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request(format!(
                    "Unsupported jsonrpc version: {}",
                    request.jsonrpc
                )),
            );
        }

        match self.dispatch(&request.method, request.params) {
            Ok(Some(result)) => JsonRpcResponse::success(request.id, result),
            Ok(None) => {
                JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method))
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", request.method, e);
                JsonRpcResponse::error(request.id, e.into())
            }
        }
    }

    /// Route a method to the service; `Ok(None)` for unknown methods
    fn dispatch(&self, method: &str, params: Option<Value>) -> ServiceResult<Option<Value>> {
        let svc = &self.service;

        let result = match method {
            "ping" => json!({}),

            "memory/create" => {
                let p: CreateEntryParams = parse(params)?;
                to_value(svc.create_entry(&p.entry_type, p.content, p.metadata)?)?
            }
            "memory/get" => {
                let p: EntryIdParams = parse(params)?;
                to_value(svc.get_entry(&p.id)?)?
            }
            "memory/byType" => {
                let p: ByTypeParams = parse(params)?;
                list(svc.entries_by_type(&p.entry_type, p.limit))?
            }
            "memory/last" => {
                let p: LastEntriesParams = parse(params)?;
                list(svc.last_entries(p.n))?
            }
            "memory/all" => list(svc.all_entries())?,
            "memory/insights" => {
                let p: InsightsParams = parse(params)?;
                list(svc.insights(p.limit))?
            }

            "memory/update" => {
                let p: UpdateEntryParams = parse(params)?;
                let success = svc.update_entry(&p.id, p.content, p.metadata)?;
                to_value(SuccessResponse { success })?
            }
            "memory/delete" => {
                let p: EntryIdParams = parse(params)?;
                let success = svc.delete_entry(&p.id)?;
                to_value(SuccessResponse { success })?
            }
            "memory/clear" => {
                let p: ClearParams = parse(params)?;
                let removed = svc.clear(p.entry_type.as_deref());
                to_value(ClearResponse { removed })?
            }

            "memory/search" => {
                let p: KeywordSearchParams = parse(params)?;
                list(svc.keyword_search(&p.keyword, p.type_filter.as_deref())?)?
            }
            "memory/searchRegex" => {
                let p: RegexSearchParams = parse(params)?;
                list(svc.regex_search(&p.pattern, p.type_filter.as_deref())?)?
            }
            "memory/searchMetadata" => {
                let p: MetadataSearchParams = parse(params)?;
                list(svc.metadata_search(&p.key, &p.value))?
            }
            "memory/searchMetadataValue" => {
                let p: MetadataValueSearchParams = parse(params)?;
                list(svc.metadata_value_search(&p.key, &p.value, p.limit))?
            }
            "memory/semantic" => {
                let p: SemanticSearchParams = parse(params)?;
                list(svc.semantic_search(&p.query, p.n, p.type_filter.as_deref()))?
            }

            "memory/stats" => svc.stats(),
            "memory/counts" => to_value(svc.counts_by_type())?,
            "memory/eventsSummary" => {
                let p: EventsSummaryParams = parse(params)?;
                to_value(EventsSummaryResponse {
                    summary: svc.events_summary(p.n),
                })?
            }
            "memory/patterns" => {
                let p: PatternsParams = parse(params)?;
                to_value(PatternsResponse {
                    patterns: svc.patterns(p.days),
                })?
            }
            "memory/projectDecisions" => {
                let p: ProjectDecisionsParams = parse(params)?;
                list(svc.project_decisions(&p.project_name))?
            }

            "reflection/trigger" => {
                let p: TriggerReflectionParams = parse(params)?;
                to_value(ReflectionResponse::from(svc.trigger_reflection(p.force)))?
            }
            "reflection/topic" => {
                let p: TopicReflectionParams = parse(params)?;
                let prompt = svc.reflect_on_topic(&p.topic);
                to_value(ReflectionResponse::from(Some(prompt)))?
            }
            "events/notify" => {
                let p: EventNotifyParams = parse(params)?;
                let reflection = svc.notify_event(&p.event_type);
                to_value(EventNotifyResponse {
                    event_type: p.event_type,
                    reflection: reflection.into(),
                })?
            }

            _ => return Ok(None),
        };

        Ok(Some(result))
    }
}

/// Missing or null params deserialize like an empty object
fn parse<P: DeserializeOwned>(params: Option<Value>) -> ServiceResult<P> {
    let value = match params {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(value) => value,
    };
    serde_json::from_value(value).map_err(|e| ServiceError::invalid_params(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> ServiceResult<Value> {
    serde_json::to_value(value).map_err(|e| almanac_memory::MemoryError::from(e).into())
}

fn list(entries: Vec<almanac_memory::MemoryEntry>) -> ServiceResult<Value> {
    to_value(EntryListResponse::from(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlmanacConfig;
    use crate::rpc::protocol::{INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};

    fn server() -> RpcServer {
        let mut config = AlmanacConfig::default();
        config.scheduler.seed = Some(11);
        RpcServer::new(Arc::new(MemoryService::new(&config)))
    }

    fn call(server: &RpcServer, method: &str, params: Value) -> JsonRpcResponse {
        server.handle_request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: method.to_string(),
            params: Some(params),
        })
    }

    fn ok(server: &RpcServer, method: &str, params: Value) -> Value {
        let response = call(server, method, params);
        assert!(response.error.is_none(), "{:?}", response.error);
        response.result.unwrap()
    }

    fn error_code(server: &RpcServer, method: &str, params: Value) -> i32 {
        call(server, method, params).error.unwrap().code
    }

    #[test]
    fn test_ping() {
        let server = server();
        assert_eq!(ok(&server, "ping", Value::Null), json!({}));
    }

    #[test]
    fn test_unknown_method() {
        let server = server();
        assert_eq!(error_code(&server, "memory/unknown", json!({})), METHOD_NOT_FOUND);
    }

    #[test]
    fn test_wrong_version_is_invalid_request() {
        let server = server();
        let response = server.handle_request(JsonRpcRequest {
            jsonrpc: "1.0".to_string(),
            id: Some(json!(1)),
            method: "ping".to_string(),
            params: None,
        });
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn test_create_then_get() {
        let server = server();
        let created = ok(
            &server,
            "memory/create",
            json!({"type": "project", "content": "Started machine learning project", "metadata": {"project_name": "ML"}}),
        );
        let id = created["id"].as_str().unwrap().to_string();

        let fetched = ok(&server, "memory/get", json!({ "id": id }));
        assert_eq!(fetched["content"], "Started machine learning project");
        assert_eq!(fetched["type"], "project");
        assert_eq!(fetched["metadata"]["project_name"], "ML");
    }

    #[test]
    fn test_get_unknown_is_null() {
        let server = server();
        let id = almanac_memory::EntryId::new().to_string();
        assert_eq!(ok(&server, "memory/get", json!({ "id": id })), Value::Null);
    }

    #[test]
    fn test_validation_maps_to_invalid_params() {
        let server = server();
        assert_eq!(
            error_code(&server, "memory/create", json!({"type": "event", "content": ""})),
            INVALID_PARAMS
        );
        assert_eq!(
            error_code(&server, "memory/searchRegex", json!({"pattern": "("})),
            INVALID_PARAMS
        );
        assert_eq!(error_code(&server, "memory/get", json!({"id": "nope"})), INVALID_PARAMS);
        assert_eq!(error_code(&server, "memory/get", json!({})), INVALID_PARAMS);
    }

    #[test]
    fn test_semantic_search() {
        let server = server();
        ok(
            &server,
            "memory/create",
            json!({"type": "project", "content": "Started machine learning project", "metadata": {"project_name": "ML"}}),
        );
        ok(
            &server,
            "memory/create",
            json!({"type": "event", "content": "Went grocery shopping"}),
        );

        let result = ok(&server, "memory/semantic", json!({"query": "ML project", "n": 1}));
        assert_eq!(result["total"], 1);
        assert_eq!(result["entries"][0]["content"], "Started machine learning project");
    }

    #[test]
    fn test_update_delete_clear() {
        let server = server();
        let created = ok(
            &server,
            "memory/create",
            json!({"type": "event", "content": "Practice scales"}),
        );
        let id = created["id"].as_str().unwrap().to_string();

        let updated = ok(
            &server,
            "memory/update",
            json!({"id": id, "content": "Practice arpeggios"}),
        );
        assert_eq!(updated["success"], true);

        let found = ok(&server, "memory/search", json!({"keyword": "ARPEGGIOS"}));
        assert_eq!(found["total"], 1);

        let deleted = ok(&server, "memory/delete", json!({ "id": id }));
        assert_eq!(deleted["success"], true);
        let deleted = ok(&server, "memory/delete", json!({ "id": id }));
        assert_eq!(deleted["success"], false);

        ok(&server, "memory/create", json!({"type": "event", "content": "a"}));
        ok(&server, "memory/create", json!({"type": "decision", "content": "b"}));
        let cleared = ok(&server, "memory/clear", json!({"type": "event"}));
        assert_eq!(cleared["removed"], 1);
        let stats = ok(&server, "memory/stats", Value::Null);
        assert_eq!(stats["totalEntries"], 1);
    }

    #[test]
    fn test_metadata_searches() {
        let server = server();
        for (content, activity) in [("Lifted weights", "gym"), ("Stretching", "yoga")] {
            ok(
                &server,
                "memory/create",
                json!({"type": "event", "content": content, "metadata": {"activity": activity}}),
            );
        }

        let exact = ok(
            &server,
            "memory/searchMetadata",
            json!({"key": "activity", "value": "yoga"}),
        );
        assert_eq!(exact["entries"][0]["content"], "Stretching");

        let partial = ok(
            &server,
            "memory/searchMetadataValue",
            json!({"key": "activity", "value": "gy"}),
        );
        assert_eq!(partial["total"], 1);
        assert_eq!(partial["entries"][0]["content"], "Lifted weights");
    }

    #[test]
    fn test_events_summary_empty() {
        let server = server();
        let result = ok(&server, "memory/eventsSummary", json!({}));
        assert_eq!(result["summary"], "No recent events recorded.");
    }

    #[test]
    fn test_reflection_methods() {
        let server = server();
        let result = ok(&server, "reflection/trigger", json!({}));
        assert_eq!(result["status"], "no_insight");

        let result = ok(&server, "reflection/topic", json!({"topic": "my decisions"}));
        assert_eq!(result["status"], "success");
        assert!(result["prompt"].as_str().is_some());

        let result = ok(&server, "events/notify", json!({"eventType": "user_input"}));
        assert_eq!(result["eventType"], "user_input");
        assert_eq!(result["status"], "no_insight");
    }

    #[tokio::test]
    async fn test_run_loop_over_buffers() {
        let server = server();
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"memory/create\",\"params\":{\"type\":\"event\",\"content\":\"Morning run\"}}\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"memory/create\",\"params\":{\"type\":\"event\",\"content\":\"Evening walk\"}}\n",
            "this is not json\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"memory/last\",\"params\":{\"n\":5}}\n",
        );
        let mut transport = LineTransport::new(input.as_bytes(), Vec::new());
        server.run(&mut transport).await.unwrap();

        let output = String::from_utf8(transport.into_writer()).unwrap();
        let responses: Vec<Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        // the notification gets no response
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], PARSE_ERROR);
        assert_eq!(responses[2]["id"], 2);
        assert_eq!(responses[2]["result"]["total"], 2);
    }

    #[tokio::test]
    async fn test_run_loop_survives_invalid_utf8() {
        let server = server();
        let mut input = b"\xff\xfe\n".to_vec();
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"ping\"}\n");
        let mut transport = LineTransport::new(input.as_slice(), Vec::new());
        server.run(&mut transport).await.unwrap();

        let output = String::from_utf8(transport.into_writer()).unwrap();
        let responses: Vec<Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(responses[1]["id"], 3);
        assert_eq!(responses[1]["result"], json!({}));
    }
}
