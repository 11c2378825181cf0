//! Storage Seams: contratos assíncronos + implementações em memória
//!
//! O motor só conhece estes traits; backends reais (SQL, Redis) vivem fora
//! deste núcleo. As implementações em memória sustentam os testes e servem
//! de referência de semântica.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::artifacts::{AuditEntry, AuditSummary, InsightCacheEntry, Report};
use crate::domain::{AnalysisKind, IncidentRecord, ReportKind, ReportStatus};
use crate::error::EngineError;

/// Leitura de ocorrências por período (colaborador externo, somente leitura).
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Retorna todas as ocorrências com `created_at` em `[start, end]`.
    async fn find_by_period(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<IncidentRecord>, EngineError>;
}

/// Persistência do cache de insights, indexado por digest.
#[async_trait]
pub trait InsightStore: Send + Sync {
    async fn find_by_digest(
        &self,
        digest: &str,
    ) -> Result<Option<InsightCacheEntry>, EngineError>;

    /// Insere ou substitui a entrada sob o digest dela (last write wins).
    async fn put(&self, entry: InsightCacheEntry) -> Result<InsightCacheEntry, EngineError>;

    /// Varredura: remove entradas expiradas em relação a `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, EngineError>;

    /// Invalidação explícita quando os dados de uma área mudam.
    async fn delete_by_area(&self, area: &str) -> Result<usize, EngineError>;
}

/// Persistência de relatórios.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert(&self, report: Report) -> Result<Report, EngineError>;

    async fn update(&self, report: Report) -> Result<Report, EngineError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Report>, EngineError>;

    async fn find_latest(&self, kind: ReportKind) -> Result<Option<Report>, EngineError>;

    async fn list(
        &self,
        kind: Option<ReportKind>,
        status: Option<ReportStatus>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Report>, EngineError>;
}

/// Trilha de auditoria, append-only.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), EngineError>;

    async fn find(
        &self,
        kind: Option<AnalysisKind>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, EngineError>;

    /// Sumário de custo/uso de uma janela, para acompanhamento de gasto.
    async fn summarize(
        &self,
        kind: Option<AnalysisKind>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<AuditSummary, EngineError> {
        let entries = self.find(kind, from, to).await?;
        Ok(AuditSummary::from_entries(&entries))
    }
}

// ============================================================================
// Implementações em memória
// ============================================================================

/// Loja de ocorrências em memória, para testes e demonstração.
#[derive(Default)]
pub struct MemoryIncidentStore {
    records: RwLock<Vec<IncidentRecord>>,
}

impl MemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, record: IncidentRecord) {
        self.records.write().await.push(record);
    }

    pub async fn extend(&self, records: impl IntoIterator<Item = IncidentRecord>) {
        self.records.write().await.extend(records);
    }
}

#[async_trait]
impl IncidentStore for MemoryIncidentStore {
    async fn find_by_period(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<IncidentRecord>, EngineError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.created_at >= start && r.created_at <= end)
            .cloned()
            .collect())
    }
}

/// Cache de insights em memória, indexado por digest.
#[derive(Default)]
pub struct MemoryInsightStore {
    entries: RwLock<HashMap<String, InsightCacheEntry>>,
}

impl MemoryInsightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// O contexto canônico referencia a área sob `bairro` ou `area`.
fn context_mentions_area(context: &Value, area: &str) -> bool {
    let Some(map) = context.as_object() else {
        return false;
    };
    ["bairro", "area"].iter().any(|key| {
        map.get(*key)
            .and_then(Value::as_str)
            .is_some_and(|v| v.eq_ignore_ascii_case(area))
    })
}

#[async_trait]
impl InsightStore for MemoryInsightStore {
    async fn find_by_digest(
        &self,
        digest: &str,
    ) -> Result<Option<InsightCacheEntry>, EngineError> {
        Ok(self.entries.read().await.get(digest).cloned())
    }

    async fn put(&self, entry: InsightCacheEntry) -> Result<InsightCacheEntry, EngineError> {
        self.entries
            .write()
            .await
            .insert(entry.digest.clone(), entry.clone());
        Ok(entry)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }

    async fn delete_by_area(&self, area: &str) -> Result<usize, EngineError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !context_mentions_area(&entry.context, area));
        Ok(before - entries.len())
    }
}

/// Loja de relatórios em memória.
#[derive(Default)]
pub struct MemoryReportStore {
    reports: RwLock<HashMap<Uuid, Report>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn insert(&self, report: Report) -> Result<Report, EngineError> {
        self.reports
            .write()
            .await
            .insert(report.id, report.clone());
        Ok(report)
    }

    async fn update(&self, report: Report) -> Result<Report, EngineError> {
        let mut reports = self.reports.write().await;
        if !reports.contains_key(&report.id) {
            return Err(EngineError::NotFound(format!("report {}", report.id)));
        }
        reports.insert(report.id, report.clone());
        Ok(report)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Report>, EngineError> {
        Ok(self.reports.read().await.get(&id).cloned())
    }

    async fn find_latest(&self, kind: ReportKind) -> Result<Option<Report>, EngineError> {
        let reports = self.reports.read().await;
        Ok(reports
            .values()
            .filter(|r| r.kind == kind)
            .max_by_key(|r| r.generated_at)
            .cloned())
    }

    async fn list(
        &self,
        kind: Option<ReportKind>,
        status: Option<ReportStatus>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Report>, EngineError> {
        let reports = self.reports.read().await;
        let mut out: Vec<Report> = reports
            .values()
            .filter(|r| kind.is_none_or(|k| r.kind == k))
            .filter(|r| status.is_none_or(|s| r.status == s))
            .filter(|r| from.is_none_or(|f| r.generated_at >= f))
            .filter(|r| to.is_none_or(|t| r.generated_at <= t))
            .cloned()
            .collect();
        out.sort_by_key(|r| std::cmp::Reverse(r.generated_at));
        Ok(out)
    }
}

/// Trilha de auditoria em memória.
#[derive(Default)]
pub struct MemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), EngineError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn find(
        &self,
        kind: Option<AnalysisKind>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, EngineError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .filter(|e| from.is_none_or(|f| e.executed_at >= f))
            .filter(|e| to.is_none_or(|t| e.executed_at <= t))
            .cloned()
            .collect())
    }
}
