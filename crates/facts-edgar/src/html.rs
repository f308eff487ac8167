//! Anchor extraction from directory listings and HTML filing documents.

use facts_core::{FactsError, Result};
use reqwest::Url;
use scraper::{Html, Selector};

/// An `<a href>` element with its visible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Raw `href` attribute.
    pub href: String,
    /// Visible text, whitespace-collapsed.
    pub text: String,
}

/// Returns every anchor with an `href`, in document order.
///
/// # Errors
///
/// Returns [`FactsError::Parse`] if the selector cannot be built.
pub fn anchors(body: &str) -> Result<Vec<Anchor>> {
    let selector =
        Selector::parse("a[href]").map_err(|e| FactsError::Parse(format!("selector: {e}")))?;
    let document = Html::parse_document(body);

    Ok(document
        .select(&selector)
        .filter_map(|element| {
            let href = element.value().attr("href")?.trim();
            if href.is_empty() {
                return None;
            }
            let text = element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ");
            Some(Anchor {
                href: href.to_string(),
                text,
            })
        })
        .collect())
}

/// Lowercased last path segment of a URL or href, without query or fragment.
#[must_use]
pub fn file_name(href: &str) -> String {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.rsplit('/')
        .next()
        .unwrap_or(path)
        .to_ascii_lowercase()
}

/// True if the href points at an `.xml` file.
#[must_use]
pub fn is_xml_link(href: &str) -> bool {
    file_name(href).ends_with(".xml")
}

/// True for linkbase files and the filing summary, which never carry facts.
#[must_use]
pub fn is_auxiliary(href: &str) -> bool {
    let name = file_name(href);
    name == "filingsummary.xml"
        || ["_lab.xml", "_pre.xml", "_cal.xml", "_def.xml"]
            .iter()
            .any(|suffix| name.ends_with(suffix))
}

/// Resolves `href` against `base`.
///
/// # Errors
///
/// Returns [`FactsError::Parse`] if either URL is malformed.
pub fn resolve_href(base: &str, href: &str) -> Result<String> {
    let base = Url::parse(base).map_err(|e| FactsError::Parse(format!("{base}: {e}")))?;
    base.join(href)
        .map(String::from)
        .map_err(|e| FactsError::Parse(format!("{href}: {e}")))
}

/// Absolute URLs of every non-auxiliary `.xml` anchor, deduplicated in
/// document order.
///
/// # Errors
///
/// Returns [`FactsError::Parse`] if `base` is malformed.
pub fn xml_links(body: &str, base: &str) -> Result<Vec<String>> {
    let mut links: Vec<String> = Vec::new();
    for anchor in anchors(body)? {
        if !is_xml_link(&anchor.href) || is_auxiliary(&anchor.href) {
            continue;
        }
        let url = resolve_href(base, &anchor.href)?;
        if !links.contains(&url) {
            links.push(url);
        }
    }
    Ok(links)
}
