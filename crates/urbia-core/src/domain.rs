//! Domain Model: ocorrências e os enums fechados do motor
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Menor gravidade válida de uma ocorrência.
pub const SEVERITY_MIN: u8 = 1;
/// Maior gravidade válida de uma ocorrência.
pub const SEVERITY_MAX: u8 = 10;
/// A partir desta gravidade uma ocorrência conta como crítica.
pub const CRITICAL_SEVERITY: u8 = 8;

/// Categoria fechada de problema urbano.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Pothole,
    Paving,
    Signage,
    StreetLighting,
    FallenPole,
    GarbageAccumulation,
    MissedCollection,
    TreePruning,
    FallenTree,
    Drainage,
    Flooding,
    WaterLeak,
    Sewage,
    StrayAnimals,
    DamagedSidewalk,
    Accessibility,
    Vandalism,
    PublicPark,
    UrbanFurniture,
    Other,
}

impl Category {
    /// Rótulo humano usado nos prompts e relatórios.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Pothole => "Buraco na via",
            Category::Paving => "Pavimentação danificada",
            Category::Signage => "Sinalização de trânsito",
            Category::StreetLighting => "Iluminação pública",
            Category::FallenPole => "Poste caído",
            Category::GarbageAccumulation => "Lixo acumulado",
            Category::MissedCollection => "Falha na coleta de lixo",
            Category::TreePruning => "Poda de árvore",
            Category::FallenTree => "Árvore caída",
            Category::Drainage => "Problema de drenagem",
            Category::Flooding => "Alagamento",
            Category::WaterLeak => "Vazamento de água",
            Category::Sewage => "Problema de esgoto",
            Category::StrayAnimals => "Animais soltos na via",
            Category::DamagedSidewalk => "Calçada danificada",
            Category::Accessibility => "Problema de acessibilidade",
            Category::Vandalism => "Vandalismo",
            Category::PublicPark => "Parque ou praça com problemas",
            Category::UrbanFurniture => "Mobiliário urbano danificado",
            Category::Other => "Outros",
        }
    }

    /// Nome estável (o mesmo usado na serialização).
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Pothole => "POTHOLE",
            Category::Paving => "PAVING",
            Category::Signage => "SIGNAGE",
            Category::StreetLighting => "STREET_LIGHTING",
            Category::FallenPole => "FALLEN_POLE",
            Category::GarbageAccumulation => "GARBAGE_ACCUMULATION",
            Category::MissedCollection => "MISSED_COLLECTION",
            Category::TreePruning => "TREE_PRUNING",
            Category::FallenTree => "FALLEN_TREE",
            Category::Drainage => "DRAINAGE",
            Category::Flooding => "FLOODING",
            Category::WaterLeak => "WATER_LEAK",
            Category::Sewage => "SEWAGE",
            Category::StrayAnimals => "STRAY_ANIMALS",
            Category::DamagedSidewalk => "DAMAGED_SIDEWALK",
            Category::Accessibility => "ACCESSIBILITY",
            Category::Vandalism => "VANDALISM",
            Category::PublicPark => "PUBLIC_PARK",
            Category::UrbanFurniture => "URBAN_FURNITURE",
            Category::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Registro de ocorrência consumido pelo motor (somente leitura).
///
/// Invariante: `severity` está sempre em `[SEVERITY_MIN, SEVERITY_MAX]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    pub id: Uuid,
    pub category: Category,
    pub description: Option<String>,
    /// Nome do bairro/área.
    pub area: String,
    pub severity: u8,
    pub created_at: DateTime<Utc>,
}

impl IncidentRecord {
    pub fn new(category: Category, area: impl Into<String>, severity: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            description: None,
            area: area.into(),
            severity: severity.clamp(SEVERITY_MIN, SEVERITY_MAX),
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity >= CRITICAL_SEVERITY
    }
}

/// Tipos de insight gerados pela IA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightKind {
    CriticalArea,
    Trend,
    Pattern,
    Prediction,
    Explanation,
}

impl InsightKind {
    /// Nome estável usado no contexto canônico (e portanto no hash).
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::CriticalArea => "CRITICAL_AREA",
            InsightKind::Trend => "TREND",
            InsightKind::Pattern => "PATTERN",
            InsightKind::Prediction => "PREDICTION",
            InsightKind::Explanation => "EXPLANATION",
        }
    }
}

/// Tipos de relatório.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportKind {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

impl ReportKind {
    /// Rótulo usado na composição do título do relatório.
    pub fn label(&self) -> &'static str {
        match self {
            ReportKind::Daily => "diário",
            ReportKind::Weekly => "semanal",
            ReportKind::Monthly => "mensal",
            ReportKind::Custom => "customizado",
        }
    }
}

/// Estados do ciclo de vida de um relatório.
///
/// `Generating` é o único estado não terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Generating,
    Completed,
    Error,
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Error)
    }
}

/// Tipos de análise registrados na trilha de auditoria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisKind {
    Report,
    Insight,
    Classification,
}
