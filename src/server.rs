//! MCP server implementation using rmcp.
//!
//! The server owns the dataset handle, the monitoring system, the
//! analytics bundle, and the optional LLM/embedding collaborators. The
//! `call_tool` override is the monitoring integration point: every call
//! gets an operation id, a performance span, a deadline, per-document
//! usage events, and (for LLM tools) an estimated cost event.

use crate::analytics::Analytics;
use crate::config::ServerConfig;
use crate::dataset::Dataset;
use crate::embed::EmbeddingProvider;
use crate::enhance::Enhancer;
use crate::error::ServerError;
use crate::llm::LlmClient;
use crate::monitoring::{MonitoringSystem, OperationStatus};
use crate::tools;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::ToolCallContext;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    Annotated, CallToolRequestParams, CallToolResult, Content, ErrorCode, Implementation,
    ListResourcesResult, ListToolsResult, PaginatedRequestParams, ProtocolVersion, RawContent,
    RawResource, ReadResourceRequestParams, ReadResourceResult, ResourceContents,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{tool, tool_router, ErrorData, ServerHandler};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Tools that invoke the LLM collaborator. They are withheld from the
/// catalog when no client is configured, and their calls carry an
/// estimated cost event.
const LLM_TOOLS: [&str; 6] = [
    "enhance_context",
    "extract_metadata",
    "generate_tags",
    "improve_title",
    "enhance_for_purpose",
    "batch_enhance",
];

/// Resource URIs served by the resource registry.
const RESOURCE_DATASET_INFO: &str = "contextframe://dataset/info";
const RESOURCE_DATASET_SCHEMA: &str = "contextframe://dataset/schema";

/// Fallback content-size estimate when an LLM tool references a document
/// that cannot be sized upfront.
const DEFAULT_CONTENT_ESTIMATE: u64 = 1000;

/// MCP server for a ContextFrame document dataset.
#[derive(Clone)]
pub struct ContextFrameServer {
    dataset: Arc<dyn Dataset>,
    monitoring: Arc<MonitoringSystem>,
    analytics: Arc<Analytics>,
    enhancer: Option<Arc<Enhancer>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: Arc<ServerConfig>,
    tool_router: ToolRouter<ContextFrameServer>,
}

impl ContextFrameServer {
    /// Creates a server with collaborators discovered from the
    /// environment.
    #[must_use]
    pub fn new(dataset: Arc<dyn Dataset>, config: ServerConfig) -> Self {
        let llm = crate::llm::from_env(&config.enhance_model);
        let embedder = crate::embed::from_env(&config.embed_model);
        Self::with_collaborators(dataset, config, llm, embedder)
    }

    /// Creates a server with explicit collaborators (used by tests and
    /// embedding hosts).
    #[must_use]
    pub fn with_collaborators(
        dataset: Arc<dyn Dataset>,
        config: ServerConfig,
        llm: Option<Arc<dyn LlmClient>>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        let monitoring = Arc::new(MonitoringSystem::new(
            Some(Arc::clone(&dataset)),
            config.monitoring.clone(),
            config.pricing.clone(),
        ));
        let analytics = Arc::new(Analytics::new(Arc::clone(&dataset)));
        let enhancer = llm.map(|client| Arc::new(Enhancer::new(client)));
        Self {
            dataset,
            monitoring,
            analytics,
            enhancer,
            embedder,
            config: Arc::new(config),
            tool_router: Self::tool_router(),
        }
    }

    /// Starts the monitoring background tasks.
    pub fn start_monitoring(&self) {
        self.monitoring.start();
    }

    /// Stops background tasks and flushes pending metrics. Idempotent;
    /// called on `shutdown` and at transport close.
    pub async fn shutdown(&self) {
        self.monitoring.stop().await;
    }

    /// The monitoring system, for embedding hosts and tests.
    #[must_use]
    pub fn monitoring(&self) -> &Arc<MonitoringSystem> {
        &self.monitoring
    }

    /// The analytics bundle, for embedding hosts and tests.
    #[must_use]
    pub fn analytics(&self) -> &Arc<Analytics> {
        &self.analytics
    }

    /// The dataset handle.
    #[must_use]
    pub fn dataset(&self) -> &Arc<dyn Dataset> {
        &self.dataset
    }

    /// Whether a tool is currently callable (LLM tools require a client).
    fn tool_enabled(&self, name: &str) -> bool {
        !LLM_TOOLS.contains(&name) || self.enhancer.is_some()
    }

    fn enhancer_or_unknown(&self, tool: &str) -> Result<&Arc<Enhancer>, ErrorData> {
        self.enhancer.as_ref().ok_or_else(|| {
            ErrorData::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Unknown tool: {tool} (enhancement tools require an LLM credential)"),
                None,
            )
        })
    }

    /// Agent id resolution order: `agent_id`, then `metadata.agent_id`.
    fn extract_agent_id(arguments: Option<&serde_json::Map<String, Value>>) -> Option<String> {
        let arguments = arguments?;
        if let Some(agent) = arguments.get("agent_id").and_then(Value::as_str) {
            return Some(agent.to_string());
        }
        arguments
            .get("metadata")
            .and_then(|m| m.get("agent_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Estimated input size for an LLM tool call: inline content, then
    /// the referenced document, then a flat default.
    async fn estimate_content_bytes(
        &self,
        arguments: Option<&serde_json::Map<String, Value>>,
    ) -> u64 {
        let Some(arguments) = arguments else {
            return DEFAULT_CONTENT_ESTIMATE;
        };
        if let Some(content) = arguments.get("content").and_then(Value::as_str) {
            return content.len() as u64;
        }
        if let Some(id) = arguments
            .get("document_id")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<Uuid>().ok())
        {
            if let Ok(Some(record)) = self.dataset.get_by_uuid(id).await {
                return record.content_bytes() as u64;
            }
        }
        DEFAULT_CONTENT_ESTIMATE
    }

    /// Records the estimated cost of one LLM tool invocation:
    /// input tokens = content bytes / 4, output = input / 2.
    pub async fn record_llm_cost(
        &self,
        tool_name: &str,
        operation_id: &str,
        agent_id: Option<&str>,
        arguments: Option<&serde_json::Map<String, Value>>,
    ) {
        let content_bytes = self.estimate_content_bytes(arguments).await;
        let input_tokens = content_bytes / 4;
        let output_tokens = input_tokens / 2;
        let (provider, model) = self.config.enhance_provider_model();
        self.monitoring.cost.track_llm_usage(
            &provider,
            &model,
            input_tokens,
            output_tokens,
            operation_id,
            agent_id,
            Some(tool_name),
        );
    }

    /// Per-document usage events derived from a completed tool call.
    pub fn record_document_usage(
        &self,
        tool_name: &str,
        arguments: Option<&serde_json::Map<String, Value>>,
        result: &CallToolResult,
        agent_id: Option<&str>,
    ) {
        let payload = result.content.iter().find_map(|c| match &c.raw {
            RawContent::Text(t) => serde_json::from_str::<Value>(&t.text).ok(),
            _ => None,
        });
        match tool_name {
            "get_document" => {
                if let Some(id) = payload
                    .as_ref()
                    .and_then(|p| p["document"]["uuid"].as_str())
                {
                    self.monitoring
                        .usage
                        .track_document_access(id, "read", agent_id, None);
                    self.analytics.usage.record_access(id, "read");
                }
            }
            "search_documents" => {
                let Some(hits) = payload
                    .as_ref()
                    .and_then(|p| p["documents"].as_array())
                else {
                    return;
                };
                for hit in hits {
                    if let Some(id) = hit["uuid"].as_str() {
                        self.monitoring
                            .usage
                            .track_document_access(id, "search_hit", agent_id, None);
                        self.analytics.usage.record_access(id, "search");
                    }
                }
            }
            "update_document" => {
                if let Some(id) = arguments
                    .and_then(|a| a.get("document_id"))
                    .and_then(Value::as_str)
                {
                    self.monitoring
                        .usage
                        .track_document_access(id, "update", agent_id, None);
                    self.analytics.usage.record_access(id, "update");
                }
            }
            _ => {}
        }
    }

    async fn read_dataset_info(&self) -> Result<Value, ServerError> {
        let storage = self.dataset.storage_stats().await?;
        let collections = self
            .dataset
            .count_rows(Some("record_type = 'collection_header'"))
            .await?;
        let version = self.dataset.current_version().await?;
        let embedding = self.embedder.as_ref().map(|e| {
            let info = e.info();
            json!({
                "provider": info.name,
                "model": info.model,
                "dimension": info.dimension,
                "max_input_length": info.max_input_length,
            })
        });
        Ok(json!({
            "name": "contextframe",
            "version": env!("CARGO_PKG_VERSION"),
            "documents": storage.num_rows,
            "collections": collections,
            "storage": storage,
            "dataset_version": version,
            "embedding_provider": embedding,
            "enhancement_enabled": self.enhancer.is_some(),
            "monitoring_enabled": self.monitoring.collector.config().enabled,
        }))
    }

    async fn read_dataset_schema(&self) -> Result<Value, ServerError> {
        let fields = self.dataset.schema_fields().await?;
        Ok(json!({
            "fields": fields,
            "record_types": ["document", "collection_header", "dataset_header", "frameset"],
            "statuses": crate::types::DocumentStatus::VALID,
            "relationship_types": crate::types::RelationshipType::VALID,
        }))
    }
}

/// Serializes a tool output as the JSON text payload of a successful
/// call; errors travel on the protocol channel with their JSON-RPC code.
fn json_result<T: serde::Serialize>(
    result: Result<T, ServerError>,
) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(output) => {
            let json = serde_json::to_string(&output)
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
            Ok(CallToolResult::success(vec![Content::text(json)]))
        }
        Err(e) => Err(e.into()),
    }
}

#[tool_router]
impl ContextFrameServer {
    // ── CRUD / search ───────────────────────────────────────────────────────

    #[tool(
        description = "Add a document to the dataset.\n\nProvide content plus optional metadata (title, tags, status, collection, custom_metadata with string values) and relationships. Returns the new document's UUID."
    )]
    async fn add_document(
        &self,
        Parameters(input): Parameters<tools::AddDocumentInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_add_document(&self.dataset, self.embedder.as_ref(), input).await)
    }

    #[tool(description = "Get a document by UUID, optionally without content or with its embedding.")]
    async fn get_document(
        &self,
        Parameters(input): Parameters<tools::GetDocumentInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_get_document(&self.dataset, input).await)
    }

    #[tool(
        description = "Update a document. Only supplied fields change; custom_metadata merges; the update timestamp is bumped."
    )]
    async fn update_document(
        &self,
        Parameters(input): Parameters<tools::UpdateDocumentInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_update_document(&self.dataset, input).await)
    }

    #[tool(description = "Delete a document by UUID.")]
    async fn delete_document(
        &self,
        Parameters(input): Parameters<tools::DeleteDocumentInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_delete_document(&self.dataset, input).await)
    }

    #[tool(
        description = "List documents with an optional SQL-like filter, e.g. record_type = 'document' or collection = 'papers'."
    )]
    async fn list_documents(
        &self,
        Parameters(input): Parameters<tools::ListDocumentsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_list_documents(&self.dataset, input).await)
    }

    #[tool(
        description = "Search documents.\n\nModes: vector (needs an embedding provider), text (full-text), hybrid (weighted merge). Supports a filter expression applied before scoring."
    )]
    async fn search_documents(
        &self,
        Parameters(input): Parameters<tools::SearchDocumentsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(
            tools::execute_search_documents(
                &self.dataset,
                self.embedder.as_ref(),
                &self.analytics.queries,
                &self.analytics.advisor,
                input,
            )
            .await,
        )
    }

    // ── Enhancement ─────────────────────────────────────────────────────────

    #[tool(description = "Write an LLM-generated context description for a document.")]
    async fn enhance_context(
        &self,
        Parameters(input): Parameters<tools::EnhanceContextInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let enhancer = self.enhancer_or_unknown("enhance_context")?;
        json_result(tools::execute_enhance_context(&self.dataset, enhancer, input).await)
    }

    #[tool(
        description = "Extract custom metadata from a document with the LLM. Values are stringified and merged into custom_metadata."
    )]
    async fn extract_metadata(
        &self,
        Parameters(input): Parameters<tools::ExtractMetadataInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let enhancer = self.enhancer_or_unknown("extract_metadata")?;
        json_result(tools::execute_extract_metadata(&self.dataset, enhancer, input).await)
    }

    #[tool(description = "Generate tags for a document; merged with existing tags, order preserved.")]
    async fn generate_tags(
        &self,
        Parameters(input): Parameters<tools::GenerateTagsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let enhancer = self.enhancer_or_unknown("generate_tags")?;
        json_result(tools::execute_generate_tags(&self.dataset, enhancer, input).await)
    }

    #[tool(description = "Generate or improve a document title (descriptive, technical, or concise).")]
    async fn improve_title(
        &self,
        Parameters(input): Parameters<tools::ImproveTitleInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let enhancer = self.enhancer_or_unknown("improve_title")?;
        json_result(tools::execute_improve_title(&self.dataset, enhancer, input).await)
    }

    #[tool(
        description = "Enhance several fields of a document toward a purpose. Failed fields are reported; successful ones are merged."
    )]
    async fn enhance_for_purpose(
        &self,
        Parameters(input): Parameters<tools::EnhanceForPurposeInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let enhancer = self.enhancer_or_unknown("enhance_for_purpose")?;
        json_result(tools::execute_enhance_for_purpose(&self.dataset, enhancer, input).await)
    }

    #[tool(
        description = "Enhance one field across many documents (by ids or filter). Per-document failures don't stop the batch."
    )]
    async fn batch_enhance(
        &self,
        Parameters(input): Parameters<tools::BatchEnhanceInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let enhancer = self.enhancer_or_unknown("batch_enhance")?;
        json_result(tools::execute_batch_enhance(&self.dataset, enhancer, input).await)
    }

    // ── Extraction ──────────────────────────────────────────────────────────

    #[tool(
        description = "Extract a file (markdown/json/yaml/csv/plain) into a document. Absolute paths only."
    )]
    async fn extract_from_file(
        &self,
        Parameters(input): Parameters<tools::ExtractFromFileInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(
            tools::execute_extract_from_file(&self.dataset, self.embedder.as_ref(), input).await,
        )
    }

    #[tool(
        description = "Extract every file matching glob patterns under a directory, one document per file."
    )]
    async fn batch_extract(
        &self,
        Parameters(input): Parameters<tools::BatchExtractInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(
            tools::execute_batch_extract(&self.dataset, self.embedder.as_ref(), input).await,
        )
    }

    // ── Analytics ───────────────────────────────────────────────────────────

    #[tool(
        description = "Comprehensive dataset statistics: storage, versions, content, embeddings, relationships, indices."
    )]
    async fn get_dataset_stats(
        &self,
        Parameters(input): Parameters<tools::DatasetStatsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_dataset_stats(&self.analytics.stats, input).await)
    }

    #[tool(description = "Analyze document access patterns: hot documents, temporal buckets, per-collection activity.")]
    async fn analyze_usage(
        &self,
        Parameters(input): Parameters<tools::AnalyzeUsageInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_analyze_usage(&self.analytics.usage, input).await)
    }

    #[tool(description = "Analyze recorded query performance: percentiles, per-type stats, slow queries with hints.")]
    async fn query_performance(
        &self,
        Parameters(input): Parameters<tools::QueryPerformanceInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_query_performance(&self.analytics.queries, input))
    }

    #[tool(description = "Analyze the relationship graph: components, degree metrics, cycles, orphans.")]
    async fn relationship_analysis(
        &self,
        Parameters(input): Parameters<tools::RelationshipAnalysisInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(
            tools::execute_relationship_analysis(&self.analytics.relationships, input).await,
        )
    }

    #[tool(
        description = "Run storage maintenance (compact, vacuum, reindex). dry_run=true (the default) previews without mutating."
    )]
    async fn optimize_storage(
        &self,
        Parameters(input): Parameters<tools::OptimizeStorageInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_optimize_storage(&self.analytics.optimizer, input).await)
    }

    #[tool(description = "Prioritized index recommendations for the chosen workload profile.")]
    async fn index_recommendations(
        &self,
        Parameters(input): Parameters<tools::IndexRecommendationsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_index_recommendations(&self.analytics.advisor, input).await)
    }

    #[tool(
        description = "Benchmark dataset operations. Search and scan run for real; insert and update are simulated and never mutate."
    )]
    async fn benchmark_operations(
        &self,
        Parameters(input): Parameters<tools::BenchmarkOperationsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_benchmark_operations(&self.analytics.benchmark, input).await)
    }

    // ── Monitoring ──────────────────────────────────────────────────────────

    #[tool(description = "Usage metrics over a window: queries, document accesses, unique agents.")]
    async fn get_usage_metrics(
        &self,
        Parameters(input): Parameters<tools::UsageMetricsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_usage_metrics(&self.monitoring, input))
    }

    #[tool(description = "Operation performance metrics: counts, durations, error rates, percentiles, snapshots.")]
    async fn get_performance_metrics(
        &self,
        Parameters(input): Parameters<tools::PerformanceMetricsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_performance_metrics(&self.monitoring, input))
    }

    #[tool(description = "Cost attribution report with breakdown, grouping, recommendations, and projections.")]
    async fn get_cost_report(
        &self,
        Parameters(input): Parameters<tools::CostReportInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(tools::execute_cost_report(&self.monitoring, input))
    }

    #[tool(description = "Monitoring system status: configuration, buffer sizes, activity.")]
    async fn get_monitoring_status(
        &self,
        Parameters(_input): Parameters<tools::MonitoringStatusInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(Ok(tools::execute_monitoring_status(&self.monitoring)))
    }

    #[tool(description = "Export metrics as json, prometheus text exposition, or csv.")]
    async fn export_metrics(
        &self,
        Parameters(input): Parameters<tools::ExportMetricsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        json_result(Ok(tools::execute_export_metrics(&self.monitoring, input)))
    }
}

// ─── ServerHandler ───────────────────────────────────────────────────────────
// Manual impl (no #[tool_handler]) so call_tool carries the monitoring
// shim and list_tools can withhold degraded capabilities.
impl ServerHandler for ContextFrameServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = "contextframe: MCP access to a columnar document dataset.\n\n\
             WORKFLOW:\n\
             1. add_document / extract_from_file -> ingest content\n\
             2. search_documents -> retrieve (vector, text, or hybrid)\n\
             3. enhance_* -> enrich metadata with the LLM\n\
             4. get_dataset_stats / analyze_usage / query_performance -> inspect\n\
             5. optimize_storage / index_recommendations -> maintain\n\n\
             TIPS:\n\
             - Filters are SQL-like: record_type = 'document', collection = 'x'\n\
             - optimize_storage defaults to dry_run=true; set dry_run=false to apply\n\
             - get_monitoring_status shows what the server is recording"
            .to_string();

        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            server_info: Implementation {
                name: "contextframe-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            instructions: Some(instructions),
        }
    }

    /// Monitoring shim: operation span, deadline, cost estimation, and
    /// per-document usage events around every tool call.
    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let tool_name = request.name.to_string();
        let operation_id = Uuid::new_v4().to_string();
        let arguments = request.arguments.clone();
        let agent_id = Self::extract_agent_id(arguments.as_ref());

        self.monitoring.performance.start_operation(
            &operation_id,
            "tools/call",
            agent_id.as_deref(),
            Some(json!({"tool": tool_name})),
        );

        if self.tool_router.get(&tool_name).is_none() || !self.tool_enabled(&tool_name) {
            self.monitoring.performance.end_operation(
                &operation_id,
                OperationStatus::Error,
                None,
                Some(format!("unknown tool: {tool_name}")),
            );
            return Err(ErrorData::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Unknown tool: {tool_name}"),
                None,
            ));
        }

        if LLM_TOOLS.contains(&tool_name.as_str()) {
            self.record_llm_cost(&tool_name, &operation_id, agent_id.as_deref(), arguments.as_ref())
                .await;
        }

        let deadline = std::time::Duration::from_secs(self.config.deadline_secs);
        let tcc = ToolCallContext::new(self, request, context);
        let result = match tokio::time::timeout(deadline, self.tool_router.call(tcc)).await {
            Ok(result) => result,
            Err(_) => {
                // Deadline expiry drops the tool future: outstanding I/O
                // is cancelled and no partial response is written.
                self.monitoring.performance.end_operation(
                    &operation_id,
                    OperationStatus::Timeout,
                    None,
                    Some(format!("deadline of {}s exceeded", self.config.deadline_secs)),
                );
                return Err(ServerError::Timeout {
                    seconds: self.config.deadline_secs,
                }
                .into());
            }
        };

        match &result {
            Ok(call_result) => {
                let result_size: usize = call_result
                    .content
                    .iter()
                    .map(|c| match &c.raw {
                        RawContent::Text(t) => t.text.len(),
                        _ => 0,
                    })
                    .sum();
                self.monitoring.performance.end_operation(
                    &operation_id,
                    OperationStatus::Success,
                    Some(result_size as u64),
                    None,
                );
                self.record_document_usage(
                    &tool_name,
                    arguments.as_ref(),
                    call_result,
                    agent_id.as_deref(),
                );
            }
            Err(error) => {
                self.monitoring.performance.end_operation(
                    &operation_id,
                    OperationStatus::Error,
                    None,
                    Some(error.message.to_string()),
                );
            }
        }

        result
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools = self
            .tool_router
            .list_all()
            .into_iter()
            .filter(|tool| self.tool_enabled(&tool.name))
            .collect();
        Ok(ListToolsResult {
            tools,
            next_cursor: None,
            meta: None,
        })
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        if !self.tool_enabled(name) {
            return None;
        }
        self.tool_router.get(name).cloned()
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult {
            resources: resource_list(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let value = match request.uri.as_str() {
            RESOURCE_DATASET_INFO => self.read_dataset_info().await,
            RESOURCE_DATASET_SCHEMA => self.read_dataset_schema().await,
            other => Err(ServerError::ResourceNotFound(other.to_string())),
        }
        .map_err(ErrorData::from)?;

        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri: request.uri,
                mime_type: Some("application/json".to_string()),
                text,
                meta: None,
            }],
        })
    }
}

fn resource_list() -> Vec<Annotated<RawResource>> {
    let no_ann = |raw: RawResource| Annotated::new(raw, None);
    vec![
        no_ann(RawResource {
            uri: RESOURCE_DATASET_INFO.to_string(),
            name: "dataset-info".to_string(),
            title: Some("Dataset Info".to_string()),
            description: Some("Row counts, storage counters, versions, collaborators".to_string()),
            mime_type: Some("application/json".to_string()),
            size: None,
            icons: None,
            meta: None,
        }),
        no_ann(RawResource {
            uri: RESOURCE_DATASET_SCHEMA.to_string(),
            name: "dataset-schema".to_string(),
            title: Some("Dataset Schema".to_string()),
            description: Some("Logical fields plus the closed enum sets".to_string()),
            mime_type: Some("application/json".to_string()),
            size: None,
            icons: None,
            meta: None,
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;

    fn server() -> ContextFrameServer {
        ContextFrameServer::with_collaborators(
            Arc::new(MemoryDataset::new()),
            ServerConfig::default(),
            None,
            None,
        )
    }

    #[test]
    fn test_llm_tools_disabled_without_client() {
        let server = server();
        assert!(!server.tool_enabled("enhance_context"));
        assert!(!server.tool_enabled("batch_enhance"));
        assert!(server.tool_enabled("add_document"));
        assert!(server.tool_enabled("get_dataset_stats"));
    }

    #[test]
    fn test_llm_tools_enabled_with_client() {
        let server = ContextFrameServer::with_collaborators(
            Arc::new(MemoryDataset::new()),
            ServerConfig::default(),
            Some(crate::enhance::testing::ScriptedClient::new(vec![])),
            None,
        );
        assert!(server.tool_enabled("enhance_context"));
    }

    #[test]
    fn test_agent_id_extraction_order() {
        let top: serde_json::Map<String, Value> =
            serde_json::from_value(json!({"agent_id": "direct", "metadata": {"agent_id": "nested"}}))
                .unwrap();
        assert_eq!(
            ContextFrameServer::extract_agent_id(Some(&top)).as_deref(),
            Some("direct")
        );

        let nested: serde_json::Map<String, Value> =
            serde_json::from_value(json!({"metadata": {"agent_id": "nested"}})).unwrap();
        assert_eq!(
            ContextFrameServer::extract_agent_id(Some(&nested)).as_deref(),
            Some("nested")
        );

        assert_eq!(ContextFrameServer::extract_agent_id(None), None);
    }

    #[test]
    fn test_tool_catalog_has_wire_stable_names() {
        let server = server();
        let names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        for expected in [
            "add_document",
            "get_document",
            "update_document",
            "delete_document",
            "list_documents",
            "search_documents",
            "enhance_context",
            "extract_metadata",
            "generate_tags",
            "improve_title",
            "enhance_for_purpose",
            "batch_enhance",
            "extract_from_file",
            "batch_extract",
            "get_dataset_stats",
            "analyze_usage",
            "query_performance",
            "relationship_analysis",
            "optimize_storage",
            "index_recommendations",
            "benchmark_operations",
            "export_metrics",
            "get_usage_metrics",
            "get_performance_metrics",
            "get_cost_report",
            "get_monitoring_status",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing tool {expected}");
        }
    }

    #[test]
    fn test_resource_list() {
        let resources = resource_list();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].raw.uri, RESOURCE_DATASET_INFO);
        assert_eq!(resources[1].raw.uri, RESOURCE_DATASET_SCHEMA);
        assert!(resources
            .iter()
            .all(|r| r.raw.mime_type.as_deref() == Some("application/json")));
    }
}
