//! Engine Configuration: objeto de valor explícito, sem estado global
//!
//! Os orquestradores recebem um `EngineConfig` na construção; nada é lido
//! de ambiente ou de singletons durante a execução.

use chrono::{Duration, FixedOffset};
use serde::Deserialize;

use crate::domain::InsightKind;

/// TTLs de cache por tipo de insight, em segundos.
///
/// Insights de área crítica mudam rápido e expiram cedo; explicações são
/// estáveis e vivem um dia inteiro.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TtlConfig {
    pub critical_area_secs: u64,
    pub trend_secs: u64,
    pub pattern_secs: u64,
    pub prediction_secs: u64,
    pub explanation_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            critical_area_secs: 3_600,
            trend_secs: 21_600,
            pattern_secs: 86_400,
            prediction_secs: 43_200,
            explanation_secs: 86_400,
        }
    }
}

impl TtlConfig {
    pub fn for_kind(&self, kind: InsightKind) -> Duration {
        let secs = match kind {
            InsightKind::CriticalArea => self.critical_area_secs,
            InsightKind::Trend => self.trend_secs,
            InsightKind::Pattern => self.pattern_secs,
            InsightKind::Prediction => self.prediction_secs,
            InsightKind::Explanation => self.explanation_secs,
        };
        Duration::seconds(secs as i64)
    }
}

/// Configuração completa do motor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Identificador do modelo no backend de texto.
    pub model: String,
    pub ttl: TtlConfig,
    /// Tentativas adicionais após a primeira chamada à IA.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Limite do ranking de áreas na agregação.
    pub top_areas: usize,
    /// Corte da distribuição por área.
    pub area_distribution_cap: usize,
    /// Limite de caracteres do resumo executivo persistido.
    pub summary_limit: usize,
    /// Deslocamento fixo em horas usado no agrupamento temporal.
    pub utc_offset_hours: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "meta-llama/llama-3.2-3b-instruct:free".to_string(),
            ttl: TtlConfig::default(),
            max_retries: 2,
            retry_base_delay_ms: 1_000,
            top_areas: 10,
            area_distribution_cap: 20,
            summary_limit: 2_000,
            utc_offset_hours: -3,
        }
    }
}

impl EngineConfig {
    /// Fuso de referência para os histogramas de dia da semana e hora.
    pub fn reference_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3_600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_per_kind() {
        let ttl = TtlConfig::default();
        assert_eq!(ttl.for_kind(InsightKind::CriticalArea).num_seconds(), 3_600);
        assert_eq!(ttl.for_kind(InsightKind::Explanation).num_seconds(), 86_400);
        assert!(
            ttl.for_kind(InsightKind::CriticalArea) < ttl.for_kind(InsightKind::Explanation)
        );
    }

    #[test]
    fn test_reference_offset() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.reference_offset().local_minus_utc(), -3 * 3_600);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{\"maxRetries\": 5}").unwrap();
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.top_areas, 10);
    }
}
