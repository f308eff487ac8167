//! Location of the XBRL instance document inside a filing package.
//!
//! Strategies run in order and the first success wins:
//!
//! 1. [`SourceStrategy::PrimaryDoc`]: the primary document is itself an instance.
//! 2. [`SourceStrategy::DirectoryScan`]: rank the `.xml` files of the directory listing.
//! 3. [`SourceStrategy::HtmlScan`]: follow an instance link from the HTML primary document.
//!
//! A candidate that answers with HTML gets one [`SourceStrategy::RedirectFollow`]
//! hop. If that hop fails too, the filing is given up on.

use facts_core::{Cik, ContentKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::fetch::{FetchClient, FetchedDocument};
use crate::html::{self, file_name};
use crate::instance::InstanceDocument;

/// Filename fragments of files that are never the instance when a listing
/// offers several candidates.
const NON_INSTANCE_MARKERS: [&str; 6] = ["schema", "xsd", "cal", "def", "lab", "pre"];

/// How an instance document was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStrategy {
    /// The primary document was an `.xml` instance.
    PrimaryDoc,
    /// Chosen from the filing directory listing.
    DirectoryScan,
    /// Linked from the HTML primary document.
    HtmlScan,
    /// Linked from an HTML page returned in place of a candidate.
    RedirectFollow,
}

impl SourceStrategy {
    /// Returns the strategy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryDoc => "primary_doc",
            Self::DirectoryScan => "directory_scan",
            Self::HtmlScan => "html_scan",
            Self::RedirectFollow => "redirect_follow",
        }
    }
}

impl fmt::Display for SourceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate instance URL with its ranking score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCandidate {
    /// Absolute URL.
    pub url: String,
    /// Strategy that proposed it.
    pub source: SourceStrategy,
    /// Number of filing identifiers found in the filename.
    pub relevance_score: u32,
}

/// A located and parsed instance document.
#[derive(Debug, Clone)]
pub struct LocatedDocument {
    /// URL the document was fetched from.
    pub url: String,
    /// Strategy that produced it.
    pub source: SourceStrategy,
    /// Parsed facts and contexts.
    pub document: InstanceDocument,
}

/// Identifiers of one filing package.
#[derive(Debug, Clone, Copy)]
pub struct FilingRef<'a> {
    /// Filer CIK.
    pub cik: Cik,
    /// Accession number, with dashes.
    pub accession_number: &'a str,
    /// Primary document filename.
    pub primary_document: &'a str,
    /// Directory URL, with trailing slash.
    pub directory_url: &'a str,
}

enum Resolution {
    Document(LocatedDocument),
    CandidateFailed,
    HardFailure,
}

/// True for linkbases, the filing summary, and anything that is not `.xml`.
fn is_instance_name(name: &str) -> bool {
    html::is_xml_link(name) && !html::is_auxiliary(name)
}

fn stem(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

/// Orders directory-listing candidates best first.
///
/// With several candidates, names containing a schema or linkbase marker are
/// dropped unless that would drop all of them. Each remaining candidate scores
/// one point each for the accession number (with or without dashes), the
/// zero-padded CIK, and the primary document's base name. Ties go to the
/// shorter filename, then listing order.
#[must_use]
pub fn rank_candidates(urls: &[String], filing: FilingRef<'_>) -> Vec<DocumentCandidate> {
    let mut pool: Vec<&String> = urls.iter().collect();
    if pool.len() > 1 {
        let filtered: Vec<&String> = pool
            .iter()
            .copied()
            .filter(|url| {
                let name = file_name(url);
                !NON_INSTANCE_MARKERS.iter().any(|m| name.contains(m))
            })
            .collect();
        if !filtered.is_empty() {
            pool = filtered;
        }
    }

    let accession = filing.accession_number.to_ascii_lowercase();
    let accession_plain = accession.replace('-', "");
    let cik = filing.cik.padded();
    let primary_name = file_name(filing.primary_document);
    let primary_stem = stem(&primary_name);

    let mut ranked: Vec<(usize, DocumentCandidate)> = pool
        .into_iter()
        .map(|url| {
            let name = file_name(url);
            let mut score = 0;
            if !accession.is_empty() && (name.contains(&accession) || name.contains(&accession_plain))
            {
                score += 1;
            }
            if name.contains(&cik) {
                score += 1;
            }
            if !primary_stem.is_empty() && name.contains(primary_stem) {
                score += 1;
            }
            (
                name.len(),
                DocumentCandidate {
                    url: url.clone(),
                    source: SourceStrategy::DirectoryScan,
                    relevance_score: score,
                },
            )
        })
        .collect();

    ranked.sort_by(|(a_len, a), (b_len, b)| {
        b.relevance_score
            .cmp(&a.relevance_score)
            .then_with(|| a_len.cmp(b_len))
    });
    ranked.into_iter().map(|(_, candidate)| candidate).collect()
}

/// Finds the instance document of a filing.
#[derive(Debug)]
pub struct DocumentLocator {
    client: Arc<FetchClient>,
}

impl DocumentLocator {
    /// Creates a locator.
    #[must_use]
    pub const fn new(client: Arc<FetchClient>) -> Self {
        Self { client }
    }

    /// Runs the strategies in order and returns the first instance found.
    ///
    /// `Ok(None)` means the filing is unresolved.
    ///
    /// # Errors
    ///
    /// Errors that are not candidate failures (network, rate limit,
    /// configuration) are returned as-is.
    #[instrument(skip(self, filing), fields(accession = %filing.accession_number))]
    pub async fn locate(&self, filing: FilingRef<'_>) -> Result<Option<LocatedDocument>> {
        let primary_url = html::resolve_href(filing.directory_url, filing.primary_document)?;

        if is_instance_name(filing.primary_document) {
            match self
                .resolve_candidate(&primary_url, SourceStrategy::PrimaryDoc)
                .await?
            {
                Resolution::Document(doc) => return Ok(Some(doc)),
                Resolution::HardFailure => return Ok(None),
                Resolution::CandidateFailed => {}
            }
        }

        match self.directory_scan(filing).await? {
            Resolution::Document(doc) => return Ok(Some(doc)),
            Resolution::HardFailure => return Ok(None),
            Resolution::CandidateFailed => {}
        }

        let primary_name = file_name(filing.primary_document);
        if primary_name.ends_with(".htm") || primary_name.ends_with(".html") {
            match self.html_scan(&primary_url).await? {
                Resolution::Document(doc) => return Ok(Some(doc)),
                Resolution::HardFailure => return Ok(None),
                Resolution::CandidateFailed => {}
            }
        }

        info!("No instance document found");
        Ok(None)
    }

    async fn directory_scan(&self, filing: FilingRef<'_>) -> Result<Resolution> {
        let Some(listing) = self
            .fetch_candidate(filing.directory_url, &[ContentKind::Html])
            .await?
        else {
            return Ok(Resolution::CandidateFailed);
        };

        let links = match html::xml_links(&listing.body, filing.directory_url) {
            Ok(links) => links,
            Err(e) => {
                debug!(error = %e, "Unreadable directory listing");
                return Ok(Resolution::CandidateFailed);
            }
        };

        let ranked = rank_candidates(&links, filing);
        let Some(best) = ranked.first() else {
            debug!("Directory listing has no instance candidates");
            return Ok(Resolution::CandidateFailed);
        };
        debug!(url = %best.url, score = best.relevance_score, candidates = ranked.len(), "Directory scan picked candidate");
        self.resolve_candidate(&best.url, SourceStrategy::DirectoryScan)
            .await
    }

    async fn html_scan(&self, primary_url: &str) -> Result<Resolution> {
        let Some(page) = self
            .fetch_candidate(primary_url, &[ContentKind::Html])
            .await?
        else {
            return Ok(Resolution::CandidateFailed);
        };

        let anchors = match html::anchors(&page.body) {
            Ok(anchors) => anchors,
            Err(e) => {
                debug!(error = %e, "Unreadable primary document");
                return Ok(Resolution::CandidateFailed);
            }
        };

        let link = anchors.into_iter().find(|a| {
            let text = a.text.to_ascii_uppercase();
            is_instance_name(&a.href)
                && (text.is_empty() || text.contains("INSTANCE") || text.contains("XBRL"))
        });
        let Some(link) = link else {
            debug!("Primary document links no instance");
            return Ok(Resolution::CandidateFailed);
        };

        match html::resolve_href(primary_url, &link.href) {
            Ok(url) => self.resolve_candidate(&url, SourceStrategy::HtmlScan).await,
            Err(_) => Ok(Resolution::CandidateFailed),
        }
    }

    /// Fetches a candidate as XML. An HTML answer gets one follow-up hop to
    /// the first `.xml` link on that page.
    async fn resolve_candidate(&self, url: &str, source: SourceStrategy) -> Result<Resolution> {
        let Some(fetched) = self
            .fetch_candidate(url, &[ContentKind::Xml, ContentKind::Html])
            .await?
        else {
            return Ok(Resolution::CandidateFailed);
        };

        if fetched.kind == ContentKind::Xml {
            return Ok(Self::parse(fetched, source)
                .map_or(Resolution::CandidateFailed, Resolution::Document));
        }

        let target = html::xml_links(&fetched.body, url)
            .ok()
            .and_then(|links| links.into_iter().next());
        let Some(target) = target else {
            debug!(url, "Candidate returned HTML without an instance link");
            return Ok(Resolution::CandidateFailed);
        };

        debug!(from = url, to = %target, "Following HTML redirect page");
        match self.client.get(&target, &[ContentKind::Xml]).await {
            Ok(fetched) => Ok(Self::parse(fetched, SourceStrategy::RedirectFollow)
                .map_or(Resolution::HardFailure, Resolution::Document)),
            Err(e) if e.is_candidate_failure() => {
                warn!(url = %target, error = %e, "Redirect target is not an instance, giving up on filing");
                Ok(Resolution::HardFailure)
            }
            Err(e) => Err(e),
        }
    }

    /// `Ok(None)` for candidate-level failures.
    async fn fetch_candidate(
        &self,
        url: &str,
        expected: &[ContentKind],
    ) -> Result<Option<FetchedDocument>> {
        match self.client.get(url, expected).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.is_candidate_failure() => {
                debug!(url, error = %e, "Candidate failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Parses an instance. Unparseable or fact-free documents are rejected.
    fn parse(fetched: FetchedDocument, source: SourceStrategy) -> Option<LocatedDocument> {
        let document = match InstanceDocument::parse(&fetched.body) {
            Ok(document) => document,
            Err(e) => {
                debug!(url = %fetched.url, error = %e, "Candidate is not a parseable instance");
                return None;
            }
        };
        if document.is_empty() {
            debug!(url = %fetched.url, "Candidate carries no numeric facts");
            return None;
        }
        debug!(url = %fetched.url, %source, facts = document.facts().len(), "Located instance");
        Some(LocatedDocument {
            url: fetched.url,
            source,
            document,
        })
    }
}
