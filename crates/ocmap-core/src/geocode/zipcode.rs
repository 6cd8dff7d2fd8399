use async_trait::async_trait;

use super::{html, GeocodeProvider};
use crate::error::{OcmapError, Result};
use crate::types::Coordinate;

const TOKEN_FIELDS: [&str; 3] = ["__VIEWSTATEGENERATOR", "__EVENTVALIDATION", "__VIEWSTATE"];
const LATITUDE_LABEL: &str = "緯度";
const LONGITUDE_LABEL: &str = "經度";
/// Label cells sit at even indices inside this window of the result table.
const LABEL_WINDOW: std::ops::Range<usize> = 14..32;

/// Postal-zone lookup: GET the search form for its session tokens, then POST
/// the address and read the labelled coordinate cells from the second table.
pub struct ZipcodeProvider {
    http: reqwest::Client,
    url: String,
}

impl ZipcodeProvider {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    async fn form_tokens(&self) -> Result<Vec<(&'static str, String)>> {
        let page = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        TOKEN_FIELDS
            .iter()
            .map(|&name| {
                html::input_value(&page, name)
                    .map(|v| (name, v))
                    .ok_or_else(|| OcmapError::Provider(format!("form token {name} not found")))
            })
            .collect()
    }
}

#[async_trait]
impl GeocodeProvider for ZipcodeProvider {
    fn name(&self) -> &'static str {
        "zipcode"
    }

    async fn lookup(&self, address: &str) -> Result<Option<Coordinate>> {
        let mut form = self.form_tokens().await?;
        form.push(("Search_C_T", address.to_string()));
        form.push(("submit", "找找".to_string()));

        let page = self
            .http
            .post(&self.url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(parse_result_page(&page))
    }
}

/// `None` unless the second table carries both labels.
fn parse_result_page(page: &str) -> Option<Coordinate> {
    let tables = html::tables(page);
    let cells = html::cell_texts(tables.get(1)?);

    let end = LABEL_WINDOW.end.min(cells.len());
    let mut latitude = None;
    let mut longitude = None;
    for i in (LABEL_WINDOW.start..end).step_by(2) {
        let Some(value) = cells.get(i + 1) else {
            break;
        };
        // first labelled cell wins
        if latitude.is_none() && cells[i].contains(LATITUDE_LABEL) {
            latitude = Some(value.clone());
        } else if longitude.is_none() && cells[i].contains(LONGITUDE_LABEL) {
            longitude = Some(value.clone());
        }
    }

    Some(Coordinate {
        latitude: Some(latitude?),
        longitude: Some(longitude?),
    })
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------
