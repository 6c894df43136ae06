//! Benefit catalog seeding from CSV exports.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::domain::{Benefit, BenefitId};

#[derive(Debug)]
pub enum CatalogImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    MissingField { row: usize, field: &'static str },
    DuplicateId(String),
}

impl std::fmt::Display for CatalogImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogImportError::Io(err) => write!(f, "failed to read benefit catalog: {}", err),
            CatalogImportError::Csv(err) => write!(f, "invalid benefit catalog CSV: {}", err),
            CatalogImportError::MissingField { row, field } => {
                write!(f, "benefit catalog row {} has an empty '{}'", row, field)
            }
            CatalogImportError::DuplicateId(id) => {
                write!(f, "benefit catalog lists '{}' more than once", id)
            }
        }
    }
}

impl std::error::Error for CatalogImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogImportError::Io(err) => Some(err),
            CatalogImportError::Csv(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CatalogImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

#[derive(Debug, Deserialize)]
struct BenefitRow {
    id: String,
    title: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    authority: String,
    #[serde(default)]
    required_documents: String,
    #[serde(default)]
    eligible_statuses: String,
}

pub fn load_benefits_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Benefit>, CatalogImportError> {
    let file = std::fs::File::open(path)?;
    load_benefits(file)
}

/// Reads `id,title,category,description,authority,required_documents,eligible_statuses`.
/// Document labels are separated by `|` or by line breaks inside a quoted field.
pub fn load_benefits<R: Read>(reader: R) -> Result<Vec<Benefit>, CatalogImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut benefits: Vec<Benefit> = Vec::new();

    for (index, record) in csv_reader.deserialize::<BenefitRow>().enumerate() {
        let row = record?;
        let line = index + 1;
        if row.id.is_empty() {
            return Err(CatalogImportError::MissingField { row: line, field: "id" });
        }
        if row.title.is_empty() {
            return Err(CatalogImportError::MissingField {
                row: line,
                field: "title",
            });
        }
        if benefits.iter().any(|benefit| benefit.id.0 == row.id) {
            return Err(CatalogImportError::DuplicateId(row.id));
        }

        let required_documents = row
            .required_documents
            .split(['|', '\n'])
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        benefits.push(Benefit {
            id: BenefitId(row.id),
            title: row.title,
            category: row.category,
            description: row.description,
            authority: row.authority,
            required_documents,
            eligible_statuses: row.eligible_statuses,
        });
    }

    Ok(benefits)
}

/// Catalog used when no CSV seed is configured.
pub fn default_catalog() -> Vec<Benefit> {
    vec![
        Benefit {
            id: BenefitId::from("housing-utilities"),
            title: "Housing and utility compensation".to_string(),
            category: "housing".to_string(),
            description: "Discounts and compensation for housing and utility payments for \
                          eligible categories."
                .to_string(),
            authority: "Social protection office / administrative service centre".to_string(),
            required_documents: "Passport\nTaxpayer ID\nProof of status\nApplication".to_string(),
            eligible_statuses: "veteran,combatant,family,disabled".to_string(),
        },
        Benefit {
            id: BenefitId::from("one-time-payment"),
            title: "One-time financial assistance".to_string(),
            category: "payments".to_string(),
            description: "Lump-sum payment granted under specific conditions.".to_string(),
            authority: "Social protection office / administrative service centre".to_string(),
            required_documents:
                "Passport\nTaxpayer ID\nStatus certificate\nIBAN details\nApplication"
                    .to_string(),
            eligible_statuses: "veteran,combatant".to_string(),
        },
        Benefit {
            id: BenefitId::from("medical-services"),
            title: "Medical service privileges".to_string(),
            category: "medical".to_string(),
            description: "Priority and preferential terms for medical services.".to_string(),
            authority: "Healthcare provider / family doctor / national health service".to_string(),
            required_documents: "Passport\nProof of status".to_string(),
            eligible_statuses: "veteran,combatant,disabled".to_string(),
        },
    ]
}
