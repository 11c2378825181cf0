//! Contexto canônico de um insight e seu digest.
//!
//! O contexto determina unicamente a requisição: mesmas chaves e valores,
//! em qualquer ordem de inserção, produzem o mesmo JSON canônico e portanto
//! o mesmo digest.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use urbia_core::domain::InsightKind;

/// Construtor ordenado do contexto de um insight.
#[derive(Debug, Clone)]
pub struct InsightContext {
    kind: InsightKind,
    fields: BTreeMap<String, Value>,
}

impl InsightContext {
    pub fn new(kind: InsightKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// Acrescenta um campo ao contexto. Campos `Null` são omitidos para que
    /// "ausente" e "nulo" tenham o mesmo hash.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.fields.insert(key.into(), value);
        }
        self
    }

    /// Mescla os campos de um objeto JSON arbitrário.
    pub fn merge_object(mut self, object: &Value) -> Self {
        if let Some(map) = object.as_object() {
            for (key, value) in map {
                if !value.is_null() {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
        self
    }

    pub fn kind(&self) -> InsightKind {
        self.kind
    }

    /// Representação canônica: objeto com chaves ordenadas (recursivamente)
    /// e o tipo do insight sob `tipo`.
    pub fn canonical(&self) -> Value {
        let mut map = Map::new();
        map.insert("tipo".to_string(), Value::String(self.kind.as_str().into()));
        for (key, value) in &self.fields {
            map.insert(key.clone(), sort_value(value.clone()));
        }
        Value::Object(map)
    }

    /// Digest hex de tamanho fixo do contexto canônico — a chave do cache.
    pub fn digest(&self) -> String {
        digest_of(&self.canonical())
    }
}

/// Reordena recursivamente as chaves de objetos aninhados.
fn sort_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, sort_value(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        other => other,
    }
}

/// Digest blake3 (64 caracteres hex) da serialização canônica.
pub fn digest_of(canonical: &Value) -> String {
    blake3::hash(canonical.to_string().as_bytes())
        .to_hex()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insertion_order_does_not_change_digest() {
        let a = InsightContext::new(InsightKind::Trend)
            .with("a", 1)
            .with("b", 2);
        let b = InsightContext::new(InsightKind::Trend)
            .with("b", 2)
            .with("a", 1);

        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let a = InsightContext::new(InsightKind::Pattern)
            .with("filtros", json!({"x": 1, "a": 2}));
        let b = InsightContext::new(InsightKind::Pattern)
            .with("filtros", json!({"a": 2, "x": 1}));

        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_different_values_different_digest() {
        let a = InsightContext::new(InsightKind::Trend).with("bairro", "Centro");
        let b = InsightContext::new(InsightKind::Trend).with("bairro", "Norte");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_kind_is_part_of_context() {
        let a = InsightContext::new(InsightKind::Trend).with("bairro", "Centro");
        let b = InsightContext::new(InsightKind::Pattern).with("bairro", "Centro");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_null_fields_hash_like_absent_fields() {
        let a = InsightContext::new(InsightKind::Explanation).with("pergunta", Value::Null);
        let b = InsightContext::new(InsightKind::Explanation);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_is_64_hex_chars() {
        let digest = InsightContext::new(InsightKind::Prediction).digest();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
