//! Drug search: the local `drugs` table, extended on demand from an
//! external drug database.

pub mod rxnav;

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::DrugSource;
use crate::models::Drug;

pub use rxnav::RxNavClient;

/// Upper bound on search results, whatever the caller asks for.
pub const MAX_SEARCH_RESULTS: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum DrugLookupError {
    #[error("Drug lookup service is not reachable at {0}")]
    Connection(String),
    #[error("HTTP client error: {0}")]
    HttpClient(String),
    #[error("Drug lookup returned error (status {status}): {body}")]
    Status { status: u16, body: String },
    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
}

/// A drug as described by the external database, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct DrugCandidate {
    pub name: String,
    pub active_ingredient: Option<String>,
    pub form: Option<String>,
    pub strength: Option<String>,
    /// Identifier in the external database (RxCUI).
    pub external_code: String,
}

/// External drug database.
pub trait DrugLookup: Send + Sync {
    fn search(&self, query: &str) -> Result<Vec<DrugCandidate>, DrugLookupError>;
}

/// Search local drugs, topping up from `lookup` when fewer than `limit`
/// were found. Looked-up drugs are stored with `source = lookup` so later
/// searches and scan matching see them. Lookup failures are logged and the
/// local results returned.
pub fn search_drugs(
    conn: &Connection,
    lookup: Option<&dyn DrugLookup>,
    query: &str,
    limit: usize,
) -> Result<Vec<Drug>, DatabaseError> {
    let query = query.trim();
    let limit = limit.clamp(1, MAX_SEARCH_RESULTS);
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let mut drugs = db::search_local_drugs(conn, query, limit)?;
    let Some(lookup) = lookup else {
        return Ok(drugs);
    };
    if drugs.len() >= limit {
        return Ok(drugs);
    }

    let candidates = match lookup.search(query) {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!(error = %e, "Drug lookup failed, returning local results");
            return Ok(drugs);
        }
    };

    let mut stored = 0;
    for candidate in candidates {
        if drugs.len() >= limit {
            break;
        }
        let drug = match db::get_drug_by_external_code(conn, &candidate.external_code)? {
            Some(existing) => existing,
            None => {
                let drug = Drug {
                    id: Uuid::new_v4(),
                    name: candidate.name,
                    active_ingredient: candidate.active_ingredient,
                    form: candidate.form,
                    strength: candidate.strength,
                    external_code: Some(candidate.external_code),
                    source: DrugSource::Lookup,
                };
                db::insert_drug(conn, &drug)?;
                stored += 1;
                drug
            }
        };
        if !drugs.iter().any(|d| d.id == drug.id) {
            drugs.push(drug);
        }
    }

    if stored > 0 {
        tracing::info!(stored, "Stored drugs from external lookup");
    }
    Ok(drugs)
}

/// Lookup double for tests: fixed candidates or a fixed failure.
pub struct MockDrugLookup {
    result: Result<Vec<DrugCandidate>, u16>,
}

impl MockDrugLookup {
    pub fn new(candidates: Vec<DrugCandidate>) -> Self {
        Self {
            result: Ok(candidates),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self { result: Err(status) }
    }
}

impl DrugLookup for MockDrugLookup {
    fn search(&self, _query: &str) -> Result<Vec<DrugCandidate>, DrugLookupError> {
        match &self.result {
            Ok(candidates) => Ok(candidates.clone()),
            Err(status) => Err(DrugLookupError::Status {
                status: *status,
                body: String::new(),
            }),
        }
    }
}
