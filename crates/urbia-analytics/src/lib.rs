//! Urbia Analytics: agregação determinística de ocorrências
//!
//! Três camadas puras, das folhas para cima:
//!
//! ```text
//! statistics  →  média / mediana / desvio padrão de gravidade
//! patterns    →  histogramas temporais, correlações, anomalias
//! aggregator  →  métricas de período com variação e ranking de áreas
//! ```
//!
//! Nenhuma função aqui chama a IA; tudo é CPU puro sobre a lista de
//! registros, e o mesmo conjunto de registros produz sempre as mesmas
//! métricas.

pub mod aggregator;
pub mod patterns;
pub mod statistics;

pub use aggregator::{
    AggregatedMetrics, Aggregator, AreaBreakdown, CriticalArea, DistributionSlice, RecordFilter,
    variance_pct,
};
pub use patterns::{
    anomalies, correlations, temporal_patterns, Anomaly, Correlations, TemporalPatterns,
    WEEKDAY_NAMES,
};
pub use statistics::{max_severity, mean, median, min_severity, std_dev};
