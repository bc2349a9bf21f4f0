//! MCP tool implementations.
//!
//! Each tool is a typed `execute_*` function with its own input/output
//! structs; the server layer owns routing, schemas, and monitoring.

mod analytics;
mod documents;
mod enhancement;
mod extraction;
mod monitoring;

// analytics
pub use analytics::{
    execute_analyze_usage, execute_benchmark_operations, execute_dataset_stats,
    execute_index_recommendations, execute_optimize_storage, execute_query_performance,
    execute_relationship_analysis, AnalyzeUsageInput, AnalyzeUsageOutput,
    BenchmarkOperationsInput, BenchmarkOperationsOutput, DatasetStatsInput, DatasetStatsOutput,
    IndexRecommendationsInput, IndexRecommendationsOutput, OptimizeStorageInput,
    OptimizeStorageOutput, QueryPerformanceInput, QueryPerformanceOutput,
    RelationshipAnalysisInput, RelationshipAnalysisOutput,
};

// documents
pub use documents::{
    execute_add_document, execute_delete_document, execute_get_document, execute_list_documents,
    execute_search_documents, execute_update_document, AddDocumentInput, AddDocumentOutput,
    DeleteDocumentInput, DeleteDocumentOutput, GetDocumentInput, GetDocumentOutput,
    ListDocumentsInput, ListDocumentsOutput, ListedDocument, MetadataInput, RelationshipInput,
    SearchDocumentsInput, SearchDocumentsOutput, SearchHit, SearchType, UpdateDocumentInput,
    UpdateDocumentOutput,
};

// enhancement
pub use enhancement::{
    execute_batch_enhance, execute_enhance_context, execute_enhance_for_purpose,
    execute_extract_metadata, execute_generate_tags, execute_improve_title, BatchEnhanceEntry,
    BatchEnhanceInput, BatchEnhanceOutput, EnhanceContextInput, EnhanceContextOutput,
    EnhanceForPurposeInput, EnhanceForPurposeOutput, ExtractMetadataInput, ExtractMetadataOutput,
    GenerateTagsInput, GenerateTagsOutput, ImproveTitleInput, ImproveTitleOutput,
};

// extraction
pub use extraction::{
    execute_batch_extract, execute_extract_from_file, BatchExtractError, BatchExtractInput,
    BatchExtractOutput, ExtractFromFileInput, ExtractFromFileOutput,
};

// monitoring
pub use monitoring::{
    execute_cost_report, execute_export_metrics, execute_monitoring_status,
    execute_performance_metrics, execute_usage_metrics, CostReportInput, CostReportOutput,
    ExportMetricsInput, ExportMetricsOutput, MonitoringStatusInput, MonitoringStatusOutput,
    PerformanceMetricsInput, PerformanceMetricsOutput, UsageMetricsInput, UsageMetricsOutput,
};
