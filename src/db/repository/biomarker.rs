use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::Biomarker;

pub fn list_biomarkers(conn: &Connection) -> Result<Vec<Biomarker>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, code, unit, normal_min, normal_max, aliases
         FROM biomarkers ORDER BY name COLLATE NOCASE",
    )?;
    let rows = stmt.query_map([], |row| Ok(biomarker_row_from_rusqlite(row)))?;

    let mut biomarkers = Vec::new();
    for row in rows {
        biomarkers.push(biomarker_from_row(row??)?);
    }
    Ok(biomarkers)
}

pub fn get_biomarker(conn: &Connection, id: &Uuid) -> Result<Option<Biomarker>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, code, unit, normal_min, normal_max, aliases
             FROM biomarkers WHERE id = ?1",
            params![id.to_string()],
            biomarker_row_from_rusqlite,
        )
        .optional()?;
    row.map(biomarker_from_row).transpose()
}

struct BiomarkerRow {
    id: String,
    name: String,
    code: Option<String>,
    unit: Option<String>,
    normal_min: Option<f64>,
    normal_max: Option<f64>,
    aliases: String,
}

fn biomarker_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<BiomarkerRow, rusqlite::Error> {
    Ok(BiomarkerRow {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        unit: row.get(3)?,
        normal_min: row.get(4)?,
        normal_max: row.get(5)?,
        aliases: row.get(6)?,
    })
}

fn biomarker_from_row(row: BiomarkerRow) -> Result<Biomarker, DatabaseError> {
    Ok(Biomarker {
        id: parse_uuid(&row.id)?,
        name: row.name,
        code: row.code,
        unit: row.unit,
        normal_min: row.normal_min,
        normal_max: row.normal_max,
        aliases: row
            .aliases
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_biomarkers_have_aliases() {
        let conn = crate::db::open_memory_database().unwrap();
        let biomarkers = list_biomarkers(&conn).unwrap();
        let glucose = biomarkers.iter().find(|b| b.name == "Glucose").unwrap();
        assert_eq!(glucose.unit.as_deref(), Some("mg/dL"));
        assert_eq!(glucose.normal_min, Some(70.0));
        assert!(glucose.aliases.iter().any(|a| a == "glycémie"));

        let again = get_biomarker(&conn, &glucose.id).unwrap().unwrap();
        assert_eq!(again.name, "Glucose");
        assert!(get_biomarker(&conn, &Uuid::new_v4()).unwrap().is_none());
    }
}
