use serde::{Deserialize, Serialize};

use crate::core::domain::EvaluationRow;

/// JSON shape of the review listing, shared by `review --json` and `GET /evaluations`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvaluationListExport {
    pub evaluations: Vec<EvaluationRow>,
}

impl EvaluationListExport {
    pub fn from_rows(rows: Vec<EvaluationRow>) -> Self {
        Self { evaluations: rows }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CatalogExport {
    pub models: Vec<String>,
}

/// Single-line, width-limited rendering of free text for tables.
pub fn clip(text: &str, width: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        return flat;
    }
    let kept: String = flat.chars().take(width.saturating_sub(1)).collect();
    format!("{kept}…")
}
