use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::domain::Eov;
use crate::error::BrokerError;

/// One P01 parameter linked to an EOV, with its P02 parameter group when NVS has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotationBinding {
    pub p01: String,
    pub p02: Option<String>,
    pub label: Option<String>,
}

/// Vocabulary terms for one EOV. Bindings are unordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VocabularyEntry {
    pub bindings: Vec<NotationBinding>,
}

impl VocabularyEntry {
    pub fn primary_notations(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|binding| binding.p01.as_str())
    }

    pub fn secondary_notations(&self) -> impl Iterator<Item = &str> {
        self.bindings
            .iter()
            .filter_map(|binding| binding.p02.as_deref())
    }
}

pub trait VocabularyClient: Send + Sync {
    fn query_eov(&self, eov: Eov) -> Result<VocabularyEntry, BrokerError>;
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<SparqlBinding>,
}

#[derive(Debug, Deserialize)]
struct SparqlBinding {
    #[serde(rename = "P01notation")]
    p01: Option<SparqlTerm>,
    #[serde(rename = "P02")]
    p02: Option<SparqlTerm>,
    #[serde(rename = "prefLabel")]
    label: Option<SparqlTerm>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    value: String,
}

/// Parses SPARQL 1.1 JSON results. Bindings without a P01 notation are skipped.
pub fn parse_sparql_bindings(content: &[u8]) -> Result<VocabularyEntry, BrokerError> {
    let response: SparqlResponse = serde_json::from_slice(content)
        .map_err(|err| BrokerError::VocabularyParse(err.to_string()))?;
    let bindings = response
        .results
        .bindings
        .into_iter()
        .filter_map(|binding| {
            Some(NotationBinding {
                p01: binding.p01?.value,
                p02: binding.p02.map(|term| term.value),
                label: binding.label.map(|term| term.value),
            })
        })
        .collect();
    Ok(VocabularyEntry { bindings })
}

/// P01 parameters related to the A05 EOV concept, with their R03, P09 and P02 notations.
pub fn eov_query(eov: Eov) -> String {
    format!(
        r#"PREFIX skos: <http://www.w3.org/2004/02/skos/core#>
PREFIX pav: <http://purl.org/pav/>
PREFIX owl: <http://www.w3.org/2002/07/owl#>

select distinct ?dt ?P01notation ?prefLabel (?R03notation as ?R03) (?P09notation as ?P09) (?P02notation as ?P02) where {{
  <http://vocab.nerc.ac.uk/collection/A05/current/{eov}/>
    <https://w3id.org/env/puv#matrix> ?v1 ;
    <https://w3id.org/env/puv#property> ?v2 .

  <http://vocab.nerc.ac.uk/collection/P01/current/> skos:member ?dt .
  ?dt owl:deprecated ?depr . FILTER((str(?depr)="false"))

  NOT EXISTS {{
    ?dt ?rel ?v . filter(regex(str(?v),'S07/current/'))
  }}

  ?dt ?rel1 ?v1 .
  ?dt ?rel2 ?v2 .
  optional {{ ?dt ?rel3 ?v3 . filter(regex(str(?v3),'R03/current/')) . ?v3 skos:notation ?R03notation . }}
  optional {{ ?dt ?rel4 ?v4 . filter(regex(str(?v4),'P09/current/')) . ?v4 skos:notation ?P09notation . }}
  optional {{ ?dt ?rel5 ?v5 . filter(regex(str(?v5),'P02/current/')) . ?v5 skos:notation ?P02notation . }}

  ?dt skos:prefLabel ?prefLabel . FILTER(langMatches(lang(?prefLabel), "en"))
  ?dt skos:notation ?P01notation .
}}"#,
        eov = eov.as_str()
    )
}

#[derive(Clone)]
pub struct NvsHttpClient {
    client: Client,
    endpoint: String,
}

impl NvsHttpClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, BrokerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("eov-broker/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BrokerError::VocabularyHttp(err.to_string()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/sparql-results+json"),
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| BrokerError::VocabularyHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl VocabularyClient for NvsHttpClient {
    fn query_eov(&self, eov: Eov) -> Result<VocabularyEntry, BrokerError> {
        let query = eov_query(eov);
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("query", query.as_str())])
            .send()
            .map_err(|err| BrokerError::VocabularyHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "vocabulary request failed".to_string());
            return Err(BrokerError::VocabularyStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| BrokerError::VocabularyHttp(err.to_string()))?;
        parse_sparql_bindings(&bytes)
    }
}
