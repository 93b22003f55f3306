use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::{DrugCandidate, DrugLookup, DrugLookupError};
use crate::config::DrugLookupConfig;

/// Term types kept from RxNav: clinical drugs and branded drugs.
const KEPT_TERM_TYPES: &[&str] = &["SCD", "SBD"];

/// `ingredient STRENGTH Form [Brand]`, e.g.
/// `metformin hydrochloride 500 MG Oral Tablet [Glucophage]`.
static CONCEPT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<ingredient>.+?)\s+(?P<strength>\d+(?:\.\d+)?\s*(?:MG|MCG|G|ML|UNT|MEQ|%)(?:/(?:ML|HR|ACTUAT|MG))?)\s+(?P<form>[^\[]+?)\s*(?:\[(?P<brand>[^\]]+)\])?$",
    )
    .unwrap()
});

/// Blocking client for the RxNav REST API (`/drugs.json?name=`).
pub struct RxNavClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl RxNavClient {
    pub fn new(config: &DrugLookupConfig) -> Result<Self, DrugLookupError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DrugLookupError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrugsResponse {
    drug_group: DrugGroup,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrugGroup {
    #[serde(default)]
    concept_group: Vec<ConceptGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConceptGroup {
    tty: String,
    #[serde(default)]
    concept_properties: Vec<ConceptProperties>,
}

#[derive(Debug, Deserialize)]
struct ConceptProperties {
    rxcui: String,
    name: String,
}

impl DrugLookup for RxNavClient {
    fn search(&self, query: &str) -> Result<Vec<DrugCandidate>, DrugLookupError> {
        let url = format!("{}/drugs.json", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("name", query)])
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    DrugLookupError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    DrugLookupError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    DrugLookupError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(DrugLookupError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .map_err(|e| DrugLookupError::ResponseParsing(e.to_string()))?;
        parse_drugs_response(body)
    }
}

/// Candidates from a `drugs.json` body. An unknown name yields a drug group
/// without concept groups, i.e. an empty list.
pub(crate) fn parse_drugs_response(body: serde_json::Value) -> Result<Vec<DrugCandidate>, DrugLookupError> {
    let parsed: DrugsResponse = serde_json::from_value(body)
        .map_err(|e| DrugLookupError::ResponseParsing(e.to_string()))?;

    Ok(parsed
        .drug_group
        .concept_group
        .into_iter()
        .filter(|g| KEPT_TERM_TYPES.contains(&g.tty.as_str()))
        .flat_map(|g| g.concept_properties)
        .map(|c| candidate_from_concept(c.rxcui, &c.name))
        .collect())
}

fn candidate_from_concept(rxcui: String, name: &str) -> DrugCandidate {
    let name = name.trim();
    match CONCEPT_NAME.captures(name) {
        Some(caps) => DrugCandidate {
            name: caps
                .name("brand")
                .map(|b| format!("{} {}", b.as_str().trim(), &caps["strength"]))
                .unwrap_or_else(|| format!("{} {}", &caps["ingredient"], &caps["strength"])),
            active_ingredient: Some(caps["ingredient"].to_string()),
            form: Some(caps["form"].trim().to_string()),
            strength: Some(caps["strength"].to_string()),
            external_code: rxcui,
        },
        None => DrugCandidate {
            name: name.to_string(),
            active_ingredient: None,
            form: None,
            strength: None,
            external_code: rxcui,
        },
    }
}
