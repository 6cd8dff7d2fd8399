use async_trait::async_trait;

use super::GeocodeProvider;
use crate::error::Result;
use crate::types::Coordinate;

/// Literal that precedes the embedded coordinate tuple in the search page.
pub const MARKER: &str = ";window.APP_INITIALIZATION_STATE";
/// Characters after the marker that hold the tuple.
const WINDOW: usize = 53;

/// Place search: GET `<url>?q=<address>` and read the coordinate tuple
/// embedded after [`MARKER`].
pub struct PlaceSearchProvider {
    http: reqwest::Client,
    url: String,
}

impl PlaceSearchProvider {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl GeocodeProvider for PlaceSearchProvider {
    fn name(&self) -> &'static str {
        "place_search"
    }

    async fn lookup(&self, address: &str) -> Result<Option<Coordinate>> {
        let page = self
            .http
            .get(&self.url)
            .query(&[("q", address)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(parse_embedded_tuple(&page))
    }
}

/// The tuple reads `<zoom>,<longitude>,<latitude>,...`: field 1 is the
/// longitude and field 2 the latitude.
fn parse_embedded_tuple(page: &str) -> Option<Coordinate> {
    let start = page.find(MARKER)? + MARKER.len();
    let window: String = page[start..].chars().take(WINDOW).collect();
    let fields: Vec<&str> = window
        .split(',')
        .map(|f| f.trim_matches(|c: char| matches!(c, '[' | ']' | '=' | '"') || c.is_whitespace()))
        .collect();
    if fields.len() < 3 {
        return None;
    }
    Some(Coordinate::new(fields[2], fields[1]))
}
