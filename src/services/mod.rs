/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Overview SSE event construction and publishing.
pub mod overview_events;
/// Overview snapshot assembly and facility counters.
pub mod overview_service;
/// Orphaned-session recovery and the proactive expiry sweep.
pub mod reconcile_service;
/// Session lifecycle orchestration: start, deliver, end, override.
pub mod session_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervision and degraded-mode handling.
pub mod storage_supervisor;
/// Session timing rules.
pub mod timing;
