use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{map_unique_violation, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::DrugSource;
use crate::models::Drug;

pub fn insert_drug(conn: &Connection, drug: &Drug) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO drugs (id, name, active_ingredient, form, strength, external_code, source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            drug.id.to_string(),
            drug.name,
            drug.active_ingredient,
            drug.form,
            drug.strength,
            drug.external_code,
            drug.source.as_str(),
        ],
    )
    .map_err(|e| map_unique_violation(e, "drug external code already stored"))?;
    Ok(())
}

pub fn get_drug(conn: &Connection, id: &Uuid) -> Result<Option<Drug>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, active_ingredient, form, strength, external_code, source
             FROM drugs WHERE id = ?1",
            params![id.to_string()],
            drug_row_from_rusqlite,
        )
        .optional()?;
    row.map(drug_from_row).transpose()
}

pub fn get_drug_by_external_code(conn: &Connection, code: &str) -> Result<Option<Drug>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, active_ingredient, form, strength, external_code, source
             FROM drugs WHERE external_code = ?1",
            params![code],
            drug_row_from_rusqlite,
        )
        .optional()?;
    row.map(drug_from_row).transpose()
}

/// Case-insensitive substring search over name and active ingredient.
pub fn search_local_drugs(conn: &Connection, query: &str, limit: usize) -> Result<Vec<Drug>, DatabaseError> {
    let escaped = query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    let pattern = format!("%{escaped}%");
    let mut stmt = conn.prepare(
        "SELECT id, name, active_ingredient, form, strength, external_code, source
         FROM drugs
         WHERE LOWER(name) LIKE LOWER(?1) ESCAPE '\\'
            OR LOWER(COALESCE(active_ingredient, '')) LIKE LOWER(?1) ESCAPE '\\'
         ORDER BY name COLLATE NOCASE
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![pattern, limit as i64], |row| Ok(drug_row_from_rusqlite(row)))?;

    let mut drugs = Vec::new();
    for row in rows {
        drugs.push(drug_from_row(row??)?);
    }
    Ok(drugs)
}

/// Whole drug table, used as the candidate set for fuzzy matching.
pub fn list_drugs(conn: &Connection) -> Result<Vec<Drug>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, active_ingredient, form, strength, external_code, source
         FROM drugs ORDER BY name COLLATE NOCASE",
    )?;
    let rows = stmt.query_map([], |row| Ok(drug_row_from_rusqlite(row)))?;

    let mut drugs = Vec::new();
    for row in rows {
        drugs.push(drug_from_row(row??)?);
    }
    Ok(drugs)
}

struct DrugRow {
    id: String,
    name: String,
    active_ingredient: Option<String>,
    form: Option<String>,
    strength: Option<String>,
    external_code: Option<String>,
    source: String,
}

fn drug_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<DrugRow, rusqlite::Error> {
    Ok(DrugRow {
        id: row.get(0)?,
        name: row.get(1)?,
        active_ingredient: row.get(2)?,
        form: row.get(3)?,
        strength: row.get(4)?,
        external_code: row.get(5)?,
        source: row.get(6)?,
    })
}

fn drug_from_row(row: DrugRow) -> Result<Drug, DatabaseError> {
    Ok(Drug {
        id: parse_uuid(&row.id)?,
        name: row.name,
        active_ingredient: row.active_ingredient,
        form: row.form,
        strength: row.strength,
        external_code: row.external_code,
        source: DrugSource::from_str(&row.source)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_drug(code: &str) -> Drug {
        Drug {
            id: Uuid::new_v4(),
            name: "metformin hydrochloride 850 MG Oral Tablet".into(),
            active_ingredient: Some("metformin hydrochloride".into()),
            form: Some("Oral Tablet".into()),
            strength: Some("850 MG".into()),
            external_code: Some(code.into()),
            source: DrugSource::Lookup,
        }
    }

    #[test]
    fn local_search_is_case_insensitive() {
        let conn = crate::db::open_memory_database().unwrap();
        let found = search_local_drugs(&conn, "METFOR", 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Metformin");
        assert_eq!(found[0].source, DrugSource::Local);
    }

    #[test]
    fn local_search_matches_ingredient_and_respects_limit() {
        let conn = crate::db::open_memory_database().unwrap();
        insert_drug(&conn, &lookup_drug("861004")).unwrap();
        let found = search_local_drugs(&conn, "metformin", 10).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(search_local_drugs(&conn, "metformin", 1).unwrap().len(), 1);
    }

    #[test]
    fn like_wildcards_are_literal() {
        let conn = crate::db::open_memory_database().unwrap();
        assert!(search_local_drugs(&conn, "%", 10).unwrap().is_empty());
    }

    #[test]
    fn external_code_is_unique() {
        let conn = crate::db::open_memory_database().unwrap();
        insert_drug(&conn, &lookup_drug("861004")).unwrap();
        assert!(matches!(
            insert_drug(&conn, &lookup_drug("861004")),
            Err(DatabaseError::Duplicate(_))
        ));
        let stored = get_drug_by_external_code(&conn, "861004").unwrap().unwrap();
        assert_eq!(get_drug(&conn, &stored.id).unwrap().unwrap().strength.as_deref(), Some("850 MG"));
    }
}
