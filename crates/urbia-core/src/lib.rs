//! Urbia Core: Domain Model, Configuration, e Storage Seams
//!
//! Núcleo compartilhado do motor de análise: registros de ocorrência,
//! artefatos persistidos (cache de insights, relatórios, auditoria),
//! erro unificado e os contratos de armazenamento.

pub mod artifacts;
pub mod config;
pub mod domain;
pub mod error;
pub mod store;
pub mod telemetry;

pub use artifacts::{AuditEntry, AuditSummary, InsightCacheEntry, Report};
pub use config::{EngineConfig, TtlConfig};
pub use domain::{
    AnalysisKind, Category, IncidentRecord, InsightKind, ReportKind, ReportStatus,
    CRITICAL_SEVERITY, SEVERITY_MAX, SEVERITY_MIN,
};
pub use error::EngineError;
pub use store::{
    AuditStore, IncidentStore, InsightStore, MemoryAuditStore, MemoryIncidentStore,
    MemoryInsightStore, MemoryReportStore, ReportStore,
};

/// Versão do motor urbia
pub const ENGINE_VERSION: &str = "0.3.0";
