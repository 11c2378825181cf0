//! Detecção de padrões: histogramas temporais, correlações e anomalias.
use std::collections::BTreeMap;

use chrono::{Datelike, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use urbia_core::domain::{Category, IncidentRecord};

use crate::statistics;

/// Nomes estáveis dos dias da semana, segunda-feira primeiro.
pub const WEEKDAY_NAMES: [&str; 7] = [
    "MONDAY",
    "TUESDAY",
    "WEDNESDAY",
    "THURSDAY",
    "FRIDAY",
    "SATURDAY",
    "SUNDAY",
];

/// Histogramas por dia da semana e hora do dia, com o balde mais cheio de
/// cada um. Baldes sempre completos (7 e 24 posições), mesmo zerados.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalPatterns {
    /// Contagens de segunda (índice 0) a domingo (índice 6).
    pub by_weekday: Vec<u64>,
    /// Contagens da hora 0 à hora 23.
    pub by_hour: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busiest_weekday: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busiest_hour: Option<u32>,
}

/// Agrupa por dia da semana e hora no fuso de referência.
///
/// Empates no balde mais cheio resolvem para o menor índice.
pub fn temporal_patterns(records: &[IncidentRecord], offset: FixedOffset) -> TemporalPatterns {
    let mut by_weekday = vec![0u64; 7];
    let mut by_hour = vec![0u64; 24];

    for record in records {
        let local = record.created_at.with_timezone(&offset);
        by_weekday[local.weekday().num_days_from_monday() as usize] += 1;
        by_hour[local.hour() as usize] += 1;
    }

    let busiest_weekday = argmax(&by_weekday).map(|i| WEEKDAY_NAMES[i].to_string());
    let busiest_hour = argmax(&by_hour).map(|i| i as u32);

    TemporalPatterns {
        by_weekday,
        by_hour,
        busiest_weekday,
        busiest_hour,
    }
}

/// Índice do maior valor, `None` se tudo for zero. Empate → menor índice.
fn argmax(counts: &[u64]) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (i, &count) in counts.iter().enumerate() {
        if count > 0 && best.is_none_or(|(_, b)| count > b) {
            best = Some((i, count));
        }
    }
    best.map(|(i, _)| i)
}

/// Correlações cruzadas entre área e categoria.
///
/// A assimetria é intencional: a categoria dominante de uma área é a mais
/// *frequente*; a área mais afetada de uma categoria é a de maior gravidade
/// *média*.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlations {
    pub dominant_category_by_area: BTreeMap<String, Category>,
    pub most_affected_area_by_category: BTreeMap<Category, String>,
}

pub fn correlations(records: &[IncidentRecord]) -> Correlations {
    // área → categoria → contagem
    let mut counts_by_area: BTreeMap<&str, BTreeMap<&'static str, (Category, u64)>> =
        BTreeMap::new();
    // categoria → área → (soma, contagem)
    let mut severity_by_category: BTreeMap<&'static str, (Category, BTreeMap<&str, (u64, u64)>)> =
        BTreeMap::new();

    for record in records {
        counts_by_area
            .entry(record.area.as_str())
            .or_default()
            .entry(record.category.as_str())
            .or_insert((record.category, 0))
            .1 += 1;

        let per_area = severity_by_category
            .entry(record.category.as_str())
            .or_insert((record.category, BTreeMap::new()));
        let slot = per_area.1.entry(record.area.as_str()).or_insert((0, 0));
        slot.0 += u64::from(record.severity);
        slot.1 += 1;
    }

    let mut dominant_category_by_area = BTreeMap::new();
    for (area, categories) in &counts_by_area {
        // Iteração em ordem de nome de categoria: o primeiro máximo estrito
        // vence, logo empates resolvem lexicograficamente.
        let mut best: Option<(Category, u64)> = None;
        for (category, count) in categories.values() {
            if best.is_none_or(|(_, b)| *count > b) {
                best = Some((*category, *count));
            }
        }
        if let Some((category, _)) = best {
            dominant_category_by_area.insert((*area).to_string(), category);
        }
    }

    let mut most_affected_area_by_category = BTreeMap::new();
    for (category, per_area) in severity_by_category.values() {
        let mut best: Option<(&str, f64)> = None;
        for (area, (sum, count)) in per_area {
            let avg = *sum as f64 / *count as f64;
            if best.is_none_or(|(_, b)| avg > b) {
                best = Some((area, avg));
            }
        }
        if let Some((area, _)) = best {
            most_affected_area_by_category.insert(*category, area.to_string());
        }
    }

    Correlations {
        dominant_category_by_area,
        most_affected_area_by_category,
    }
}

/// Registro cuja gravidade ultrapassa `média + 2·desvio`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: Uuid,
    pub area: String,
    pub category: Category,
    pub severity: u8,
    pub mean: f64,
    pub deviation: f64,
}

/// Entrada vazia devolve lista vazia, nunca erro.
pub fn anomalies(records: &[IncidentRecord]) -> Vec<Anomaly> {
    let severities: Vec<u8> = records.iter().map(|r| r.severity).collect();
    let (Some(avg), Some(deviation)) =
        (statistics::mean(&severities), statistics::std_dev(&severities))
    else {
        return Vec::new();
    };

    let upper_bound = avg + 2.0 * deviation;
    records
        .iter()
        .filter(|r| f64::from(r.severity) > upper_bound)
        .map(|r| Anomaly {
            id: r.id,
            area: r.area.clone(),
            category: r.category,
            severity: r.severity,
            mean: avg,
            deviation: f64::from(r.severity) - avg,
        })
        .collect()
}
