//! Scripted transport and fixtures shared by the integration tests.

#![allow(dead_code, unreachable_pub)]

use async_trait::async_trait;
use facts_core::{FactsConfig, Result};
use facts_edgar::{HttpResponse, HttpTransport};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub const SUBMISSIONS: &str = "https://data.sec.test";
pub const ARCHIVE: &str = "https://www.sec.test";

/// Replays queued responses per URL. The last queued response repeats;
/// unscripted URLs answer 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<HttpResponse>>>>,
    calls: Mutex<Vec<String>>,
    user_agents: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: HttpResponse) -> &Self {
        self.push(url, Ok(response))
    }

    pub fn fail(&self, url: &str, error: facts_core::FactsError) -> &Self {
        self.push(url, Err(error))
    }

    pub fn json(&self, url: &str, body: &str) -> &Self {
        self.respond(url, HttpResponse::new(200, "application/json", body))
    }

    pub fn html(&self, url: &str, body: &str) -> &Self {
        self.respond(url, HttpResponse::new(200, "text/html; charset=utf-8", body))
    }

    pub fn xml(&self, url: &str, body: &str) -> &Self {
        self.respond(url, HttpResponse::new(200, "application/xml", body))
    }

    pub fn status(&self, url: &str, status: u16) -> &Self {
        self.respond(url, HttpResponse::new(status, "text/plain", ""))
    }

    fn push(&self, url: &str, response: Result<HttpResponse>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &str, user_agent: &str, _timeout: Duration) -> Result<HttpResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        self.user_agents.lock().unwrap().push(user_agent.to_string());

        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => match queue.front().unwrap() {
                Ok(response) => Ok(response.clone()),
                Err(e) => Err(e.clone()),
            },
            None => Ok(HttpResponse::new(404, "text/html", "Not Found")),
        }
    }
}

/// Fast limits and short backoff against the test hosts.
pub fn test_config() -> FactsConfig {
    FactsConfig::new("Test Suite test@example.com")
        .with_rate_limit(1000.0, 1000.0)
        .with_base_delay(Duration::from_millis(1))
        .with_max_retries(3)
        .with_base_urls(SUBMISSIONS, ARCHIVE)
}

pub fn directory_url(cik: u64, accession: &str) -> String {
    format!(
        "{ARCHIVE}/Archives/edgar/data/{cik}/{}/",
        accession.replace('-', "")
    )
}

pub fn submissions_url(cik: u64) -> String {
    format!("{SUBMISSIONS}/submissions/CIK{cik:010}.json")
}

pub fn tickers_url() -> String {
    format!("{ARCHIVE}/files/company_tickers.json")
}

/// Builds a submissions index from `(accession, filing date, form, primary document)`.
pub fn submissions_json(filings: &[(&str, &str, &str, &str)]) -> String {
    let column = |i: usize| {
        filings
            .iter()
            .map(|row| format!("\"{}\"", [row.0, row.1, row.2, row.3][i]))
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        r#"{{"cik":"0","name":"Test Co","filings":{{"recent":{{
            "accessionNumber":[{}],
            "filingDate":[{}],
            "form":[{}],
            "primaryDocument":[{}]
        }},"files":[]}}}}"#,
        column(0),
        column(1),
        column(2),
        column(3),
    )
}

/// A directory listing linking `names`.
pub fn listing(names: &[&str]) -> String {
    let rows: String = names
        .iter()
        .map(|n| format!("<tr><td><a href=\"{n}\">{n}</a></td></tr>"))
        .collect();
    format!("<html><body><table>{rows}</table></body></html>")
}

/// One numeric fact: `(concept, context id, value)`.
pub type Fact<'a> = (&'a str, &'a str, &'a str);

/// An instance with one instant context per `(id, date)` and the given facts.
pub fn instance(contexts: &[(&str, &str)], facts: &[Fact<'_>]) -> String {
    let contexts: String = contexts
        .iter()
        .map(|(id, date)| {
            format!(
                "<xbrli:context id=\"{id}\"><xbrli:entity><xbrli:identifier scheme=\"http://www.sec.gov/CIK\">1</xbrli:identifier></xbrli:entity><xbrli:period><xbrli:instant>{date}</xbrli:instant></xbrli:period></xbrli:context>\n"
            )
        })
        .collect();
    let facts: String = facts
        .iter()
        .map(|(concept, context, value)| {
            format!("<{concept} contextRef=\"{context}\" unitRef=\"usd\" decimals=\"-6\">{value}</{concept}>\n")
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance" xmlns:us-gaap="http://fasb.org/us-gaap/2024" xmlns:ifrs-full="http://xbrl.ifrs.org/taxonomy/2024-03-27/ifrs-full">
{contexts}{facts}</xbrli:xbrl>"#
    )
}

/// All four critical fields for one context.
pub fn critical_facts<'a>(context: &'a str, assets: &'a str) -> Vec<Fact<'a>> {
    vec![
        ("us-gaap:Assets", context, assets),
        ("us-gaap:AssetsCurrent", context, "400"),
        ("us-gaap:LiabilitiesCurrent", context, "300"),
        ("us-gaap:RetainedEarningsAccumulatedDeficit", context, "(50)"),
    ]
}
