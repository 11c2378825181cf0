//! Extração e reparo de respostas da IA.
//!
//! O backend devolve texto livre: às vezes JSON puro, às vezes JSON dentro
//! de um bloco markdown, às vezes JSON cercado de prosa ou levemente
//! quebrado. A extração acha o objeto balanceado contando chaves com
//! consciência de strings; quando tudo falha, o chamador ainda recebe uma
//! resposta degradada utilizável — erro de parsing nunca sobe.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use urbia_core::error::EngineError;

/// Confiança atribuída quando a resposta inteira é degradada.
pub const DEGRADED_CONFIDENCE: f64 = 0.7;
/// Relevância atribuída quando a resposta inteira é degradada.
pub const DEGRADED_RELEVANCE: i32 = 5;
/// Confiança padrão quando o JSON parseou mas não declarou `confianca`.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;
/// Relevância padrão quando o JSON parseou mas não declarou `relevancia`.
pub const DEFAULT_RELEVANCE: i32 = 7;

/// Corte do texto bruto aproveitado numa resposta degradada.
const DEGRADED_TEXT_LIMIT: usize = 500;

/// Chaves de coleção que o restante do pipeline espera sempre presentes.
const EXPECTED_COLLECTIONS: [&str; 4] = [
    "principaisAchados",
    "areasCriticas",
    "recomendacoes",
    "insights",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("nenhum JSON encontrado na resposta")]
    NoJsonFound,
    #[error("JSON incompleto ou malformado na resposta")]
    MalformedJson,
}

static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x1F\x7F]").expect("padrão de caracteres de controle"));
static COLON_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*:\s*").expect("padrão de dois-pontos"));
static COMMA_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*").expect("padrão de vírgula"));

/// Extrai o primeiro objeto JSON balanceado do texto.
pub fn extract_json(raw: &str) -> Result<Value, ExtractError> {
    let text = strip_fences(raw.trim());

    let first_brace = text.find('{').ok_or(ExtractError::NoJsonFound)?;

    let end = balanced_close(text, first_brace)
        // Sem fechamento balanceado: último `}` literal como plano B.
        .or_else(|| text.rfind('}').filter(|&i| i > first_brace))
        .ok_or(ExtractError::MalformedJson)?;

    let fragment = &text[first_brace..=end];

    match serde_json::from_str::<Value>(fragment) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            warn!(error = %first_err, "JSON extraído inválido, tentando limpeza");
            let cleaned = cleanup_json(fragment);
            serde_json::from_str::<Value>(&cleaned).map_err(|second_err| {
                warn!(error = %second_err, "JSON continua inválido após limpeza");
                ExtractError::MalformedJson
            })
        }
    }
}

/// Remove um cerco de bloco de código (com ou sem tag de linguagem).
fn strip_fences(text: &str) -> &str {
    let mut out = text;
    if let Some(rest) = out.strip_prefix("```") {
        // Descarta a tag de linguagem até a quebra de linha.
        out = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
    }
    if let Some(rest) = out.strip_suffix("```") {
        out = rest;
    }
    out.trim()
}

/// Varre a partir de `start` contando profundidade de chaves, ignorando
/// chaves dentro de strings e escapes. Devolve o índice (em bytes) do `}`
/// que devolve a profundidade a zero.
fn balanced_close(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0u32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Limpeza de último recurso: remove caracteres de controle e normaliza o
/// espaçamento ao redor de `:` e `,`.
fn cleanup_json(fragment: &str) -> String {
    let no_controls = CONTROL_CHARS.replace_all(fragment, "");
    let tight_colons = COLON_SPACING.replace_all(&no_controls, ":");
    COMMA_SPACING.replace_all(&tight_colons, ",").into_owned()
}

/// Resposta estruturada de um insight.
///
/// As chaves conhecidas do contrato são tipadas; o que mais a IA mandar
/// fica preservado em `extra` sem quebrar ninguém.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub insight: String,
    #[serde(rename = "confianca")]
    pub confidence: f64,
    #[serde(rename = "relevancia")]
    pub relevance: i32,
    #[serde(rename = "recomendacoes", default)]
    pub recommendations: Vec<Value>,
    #[serde(rename = "principaisAchados", default)]
    pub key_findings: Vec<Value>,
    #[serde(rename = "areasCriticas", default)]
    pub critical_areas: Vec<Value>,
    #[serde(default)]
    pub insights: Vec<Value>,
    /// Preenchida apenas no caminho degradado.
    #[serde(rename = "observacao", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StructuredAnswer {
    /// Monta a resposta a partir de um objeto JSON já parseado, aplicando
    /// os defaults do caminho de sucesso.
    fn from_map(mut map: Map<String, Value>) -> Self {
        let insight = map
            .remove("insight")
            .and_then(|v| v.as_str().map(str::to_string))
            .map(|s| sanitize(&s))
            .unwrap_or_else(|| "Insight gerado pela IA".to_string());

        let confidence = map
            .remove("confianca")
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_CONFIDENCE);
        let relevance = map
            .remove("relevancia")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .unwrap_or(DEFAULT_RELEVANCE);

        let mut take_list = |key: &str| -> Vec<Value> {
            match map.remove(key) {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => Vec::new(),
            }
        };

        let recommendations = take_list("recomendacoes");
        let key_findings = take_list("principaisAchados");
        let critical_areas = take_list("areasCriticas");
        let insights = take_list("insights");

        Self {
            insight,
            confidence,
            relevance,
            recommendations,
            key_findings,
            critical_areas,
            insights,
            note: None,
            extra: map,
        }
    }

    /// Fallback quando nenhum JSON aproveitável foi encontrado.
    fn degraded(raw: &str) -> Self {
        Self {
            insight: truncate(&sanitize(raw), DEGRADED_TEXT_LIMIT),
            confidence: DEGRADED_CONFIDENCE,
            relevance: DEGRADED_RELEVANCE,
            recommendations: Vec::new(),
            key_findings: Vec::new(),
            critical_areas: Vec::new(),
            insights: Vec::new(),
            note: Some(
                "Resposta da IA aproveitada como texto por erro de formatação JSON".to_string(),
            ),
            extra: Map::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.note.is_some()
    }

    /// Recomendações com valor textual, para resposta ao chamador.
    pub fn recommendation_texts(&self) -> Vec<String> {
        self.recommendations
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Dados de suporte persistidos junto do insight no cache.
    pub fn support_data(&self) -> Option<Value> {
        let mut data = Map::new();
        for key in ["fatores", "padroes", "areasRisco"] {
            if let Some(value) = self.extra.get(key) {
                data.insert(key.to_string(), value.clone());
            }
        }
        if !self.recommendations.is_empty() {
            data.insert(
                "recomendacoes".to_string(),
                Value::Array(self.recommendations.clone()),
            );
        }
        if data.is_empty() {
            None
        } else {
            Some(Value::Object(data))
        }
    }
}

/// Parseia a resposta de um insight. Nunca falha: sem JSON aproveitável,
/// devolve a resposta degradada.
pub fn parse_insight(raw: &str) -> StructuredAnswer {
    match extract_json(raw) {
        Ok(Value::Object(map)) => {
            for key in ["insight", "confianca", "relevancia"] {
                if !map.contains_key(key) {
                    warn!(key, "resposta de insight sem chave esperada, usando default");
                }
            }
            StructuredAnswer::from_map(map)
        }
        Ok(_) => {
            warn!("resposta da IA parseou como JSON não-objeto, degradando");
            StructuredAnswer::degraded(raw)
        }
        Err(err) => {
            warn!(error = %err, "resposta de insight sem JSON aproveitável, degradando");
            StructuredAnswer::degraded(raw)
        }
    }
}

/// Parseia a resposta de um relatório num objeto genérico, garantindo as
/// coleções esperadas mesmo se ausentes. Nunca falha.
pub fn parse_report(raw: &str) -> Map<String, Value> {
    let mut map = match extract_json(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!("resposta de relatório sem objeto JSON, criando resposta padrão");
            let mut fallback = Map::new();
            fallback.insert(
                "resumoExecutivo".to_string(),
                Value::String(truncate(&sanitize(raw), DEGRADED_TEXT_LIMIT)),
            );
            fallback.insert(
                "observacao".to_string(),
                Value::String(
                    "Resposta da IA aproveitada como texto por erro de formatação JSON"
                        .to_string(),
                ),
            );
            fallback
        }
    };

    for key in EXPECTED_COLLECTIONS {
        if !map.contains_key(key) {
            warn!(key, "resposta sem chave esperada, preenchendo vazia");
            map.insert(key.to_string(), Value::Array(Vec::new()));
        }
    }
    map
}

/// Remove caracteres de controle, normaliza quebras de linha para `\n` e
/// apara as pontas.
pub fn sanitize(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    normalized
        .chars()
        .filter(|&c| c == '\n' || (!c.is_control() && c != '\u{7F}'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Trunca em `limit` caracteres, marcando o corte com reticências.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{}...", cut)
}

static SEVERITY_GRADE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([1-9]|10)\b").expect("padrão de gravidade"));

/// Extrai a primeira nota 1–10 isolada da resposta de classificação.
pub fn extract_severity(raw: &str) -> Result<u8, EngineError> {
    SEVERITY_GRADE
        .find(raw)
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .ok_or_else(|| {
            EngineError::InvalidResponse(format!(
                "resposta de classificação sem nota 1-10: {}",
                truncate(&sanitize(raw), 120)
            ))
        })
}
