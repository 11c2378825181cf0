//! Agregação de métricas por período, com comparação ao período anterior.
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use urbia_core::config::EngineConfig;
use urbia_core::domain::{Category, IncidentRecord, CRITICAL_SEVERITY};
use urbia_core::error::EngineError;
use urbia_core::store::IncidentStore;

use crate::patterns::{correlations, temporal_patterns, Correlations, TemporalPatterns};
use crate::statistics;

/// Áreas entram no ranking crítico com pelo menos este número de registros
/// de gravidade crítica.
const CRITICAL_AREA_MIN_RECORDS: usize = 3;
const CRITICAL_AREA_CAP: usize = 10;

/// Filtros opcionais aplicados identicamente ao período atual e ao anterior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// Busca por substring no nome da área, sem distinção de caixa.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_contains: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_severity: Option<u8>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_area_contains(mut self, fragment: impl Into<String>) -> Self {
        self.area_contains = Some(fragment.into());
        self
    }

    pub fn with_min_severity(mut self, min: u8) -> Self {
        self.min_severity = Some(min);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.area_contains.is_none() && self.min_severity.is_none()
    }

    pub fn matches(&self, record: &IncidentRecord) -> bool {
        if let Some(category) = self.category {
            if record.category != category {
                return false;
            }
        }
        if let Some(fragment) = &self.area_contains {
            if !record
                .area
                .to_lowercase()
                .contains(&fragment.to_lowercase())
            {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if record.severity < min {
                return false;
            }
        }
        true
    }
}

/// Linha do ranking de áreas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaBreakdown {
    pub area: String,
    pub total: u64,
    pub mean_severity: f64,
    pub max_severity: u8,
}

/// Fatia de distribuição por categoria ou por área.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSlice {
    pub label: String,
    pub total: u64,
    pub percent: f64,
}

/// Área com acúmulo de registros críticos no período.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalArea {
    pub area: String,
    pub critical_count: u64,
    pub mean_severity: f64,
}

/// Métricas agregadas de um período. Calculadas sob demanda; nunca
/// persistidas fora do snapshot embutido num relatório.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMetrics {
    pub total_current: u64,
    pub total_prior: u64,
    pub variance_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_max: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_min: Option<u8>,
    pub top_areas: Vec<AreaBreakdown>,
    pub by_category: Vec<DistributionSlice>,
    pub by_area: Vec<DistributionSlice>,
    pub severity_histogram: BTreeMap<u8, u64>,
    pub temporal: TemporalPatterns,
    pub correlations: Correlations,
    pub critical_areas: Vec<CriticalArea>,
}

/// Variação percentual entre períodos: 0 se ambos vazios, 100 se o anterior
/// era vazio e o atual não, senão a variação relativa.
pub fn variance_pct(prior: u64, current: u64) -> f64 {
    if prior == 0 {
        if current > 0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current as f64 - prior as f64) / prior as f64 * 100.0
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Orquestra statistics + patterns sobre um período filtrado.
pub struct Aggregator {
    incidents: Arc<dyn IncidentStore>,
    top_areas: usize,
    area_distribution_cap: usize,
    offset: FixedOffset,
}

impl Aggregator {
    pub fn new(incidents: Arc<dyn IncidentStore>, config: &EngineConfig) -> Self {
        Self {
            incidents,
            top_areas: config.top_areas,
            area_distribution_cap: config.area_distribution_cap,
            offset: config.reference_offset(),
        }
    }

    /// Agrega métricas de `[start, end]`, comparando com o período
    /// imediatamente anterior de mesma duração.
    pub async fn aggregate(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: &RecordFilter,
    ) -> Result<AggregatedMetrics, EngineError> {
        debug!(%start, %end, "agregando métricas do período");

        let current = self.fetch_filtered(start, end, filter).await?;

        let span = end - start;
        let prior = self
            .fetch_filtered(start - span, start, filter)
            .await?;

        let severities: Vec<u8> = current.iter().map(|r| r.severity).collect();

        Ok(AggregatedMetrics {
            total_current: current.len() as u64,
            total_prior: prior.len() as u64,
            variance_pct: variance_pct(prior.len() as u64, current.len() as u64),
            severity_mean: statistics::mean(&severities).map(round1),
            severity_max: statistics::max_severity(&severities),
            severity_min: statistics::min_severity(&severities),
            top_areas: self.rank_areas(&current),
            by_category: category_distribution(&current),
            by_area: self.area_distribution(&current),
            severity_histogram: severity_histogram(&current),
            temporal: temporal_patterns(&current, self.offset),
            correlations: correlations(&current),
            critical_areas: critical_areas(&current),
        })
    }

    async fn fetch_filtered(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: &RecordFilter,
    ) -> Result<Vec<IncidentRecord>, EngineError> {
        let mut records = self.incidents.find_by_period(start, end).await?;
        if !filter.is_empty() {
            records.retain(|r| filter.matches(r));
        }
        Ok(records)
    }

    /// Ranking por gravidade máxima, desempate por total; corte em
    /// `top_areas`.
    fn rank_areas(&self, records: &[IncidentRecord]) -> Vec<AreaBreakdown> {
        let mut by_area: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
        for record in records {
            by_area
                .entry(record.area.as_str())
                .or_default()
                .push(record.severity);
        }

        let mut ranked: Vec<AreaBreakdown> = by_area
            .into_iter()
            .map(|(area, severities)| AreaBreakdown {
                area: area.to_string(),
                total: severities.len() as u64,
                mean_severity: statistics::mean(&severities).map(round1).unwrap_or(0.0),
                max_severity: statistics::max_severity(&severities).unwrap_or(0),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.max_severity
                .cmp(&a.max_severity)
                .then(b.total.cmp(&a.total))
                .then(a.area.cmp(&b.area))
        });
        ranked.truncate(self.top_areas);
        ranked
    }

    fn area_distribution(&self, records: &[IncidentRecord]) -> Vec<DistributionSlice> {
        let mut slices = distribution(records, |r| r.area.clone());
        slices.truncate(self.area_distribution_cap);
        slices
    }
}

fn category_distribution(records: &[IncidentRecord]) -> Vec<DistributionSlice> {
    distribution(records, |r| r.category.as_str().to_string())
}

/// Distribuição com percentuais de uma casa decimal; lista vazia quando o
/// total é zero, nunca divisão por zero.
fn distribution(
    records: &[IncidentRecord],
    label_of: impl Fn(&IncidentRecord) -> String,
) -> Vec<DistributionSlice> {
    let total = records.len();
    if total == 0 {
        return Vec::new();
    }

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for record in records {
        *counts.entry(label_of(record)).or_default() += 1;
    }

    let mut slices: Vec<DistributionSlice> = counts
        .into_iter()
        .map(|(label, count)| DistributionSlice {
            label,
            total: count,
            percent: round1(count as f64 * 100.0 / total as f64),
        })
        .collect();

    slices.sort_by(|a, b| b.total.cmp(&a.total).then(a.label.cmp(&b.label)));
    slices
}

fn severity_histogram(records: &[IncidentRecord]) -> BTreeMap<u8, u64> {
    let mut histogram = BTreeMap::new();
    for record in records {
        *histogram.entry(record.severity).or_default() += 1;
    }
    histogram
}

/// Áreas com pelo menos três registros de gravidade crítica, ordenadas por
/// contagem decrescente, corte em dez.
fn critical_areas(records: &[IncidentRecord]) -> Vec<CriticalArea> {
    let mut by_area: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.severity >= CRITICAL_SEVERITY) {
        by_area
            .entry(record.area.as_str())
            .or_default()
            .push(record.severity);
    }

    let mut areas: Vec<CriticalArea> = by_area
        .into_iter()
        .filter(|(_, severities)| severities.len() >= CRITICAL_AREA_MIN_RECORDS)
        .map(|(area, severities)| CriticalArea {
            area: area.to_string(),
            critical_count: severities.len() as u64,
            mean_severity: statistics::mean(&severities).map(round1).unwrap_or(0.0),
        })
        .collect();

    areas.sort_by(|a, b| {
        Reverse(a.critical_count)
            .cmp(&Reverse(b.critical_count))
            .then(a.area.cmp(&b.area))
    });
    areas.truncate(CRITICAL_AREA_CAP);
    areas
}
