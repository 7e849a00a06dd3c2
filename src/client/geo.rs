//! Cascading geo choices: regions, cities and ISPs for a country.

use super::CheckClient;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// One selectable option: `value` is what the run form carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GeoChoices {
    pub regions: Vec<Choice>,
    pub cities: Vec<Choice>,
    pub isps: Vec<Choice>,
}

#[derive(Deserialize)]
struct CodedEntry {
    code: Option<String>,
    name: Option<String>,
}

/// `[{code, name}]` lists; entries missing either half are skipped.
fn coded_choices(items: Vec<serde_json::Value>) -> Vec<Choice> {
    items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<CodedEntry>(v).ok())
        .filter_map(|e| match (e.code, e.name) {
            (Some(code), Some(name)) if !code.is_empty() && !name.is_empty() => Some(Choice {
                value: code,
                label: name,
            }),
            _ => None,
        })
        .collect()
}

/// Plain string lists; the form value is the lowercased name with spaces as `+`.
fn named_choices(items: Vec<serde_json::Value>) -> Vec<Choice> {
    items
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .map(|name| Choice {
            value: name.to_lowercase().replace(' ', "+"),
            label: name,
        })
        .collect()
}

async fn fetch_list(
    client: &CheckClient,
    path: &str,
    query: &[(&str, &str)],
) -> Result<Vec<serde_json::Value>> {
    let url = client.url(path)?;
    let resp = client
        .http
        .get(url.clone())
        .query(query)
        .timeout(client.request_timeout())
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;
    if !resp.status().is_success() {
        bail!("GET {url} returned HTTP {}", resp.status().as_u16());
    }
    resp.json::<Vec<serde_json::Value>>()
        .await
        .with_context(|| format!("decode {url}"))
}

/// Fetch all three dependent lists in parallel. Any failed request fails
/// the whole lookup.
pub async fn fetch_choices(
    client: &CheckClient,
    country: &str,
    region: Option<&str>,
) -> Result<GeoChoices> {
    let country = country.trim();
    if country.is_empty() {
        return Ok(GeoChoices::default());
    }
    let endpoints = client.endpoints();
    let by_country = [("country", country)];
    let mut city_query = vec![("country", country)];
    if let Some(r) = region.filter(|r| !r.is_empty()) {
        city_query.push(("region", r));
    }
    let (regions, cities, isps) = tokio::try_join!(
        fetch_list(client, &endpoints.regions, &by_country),
        fetch_list(client, &endpoints.cities, &city_query),
        fetch_list(client, &endpoints.isps, &by_country),
    )?;
    Ok(GeoChoices {
        regions: coded_choices(regions),
        cities: coded_choices(cities),
        isps: named_choices(isps),
    })
}
