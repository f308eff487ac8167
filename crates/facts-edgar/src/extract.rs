//! Resolution of a concept's numeric value from a parsed document.

use chrono::NaiveDate;
use std::cmp::Reverse;
use tracing::{trace, warn};

use crate::instance::{FactDocument, InstanceDocument, NumericFact};

/// One candidate value found while resolving a concept.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptMatch {
    /// Alias the fact matched.
    pub concept_alias: String,
    /// Position of the alias in the alias list.
    pub alias_rank: usize,
    /// Context the fact refers to.
    pub context_id: String,
    /// Period end of that context.
    pub period_end: NaiveDate,
    /// True if the context carries dimension members.
    pub dimensional: bool,
    /// Fact text as it appears in the document.
    pub raw_text: String,
    /// Power of ten applied to the text.
    pub scale_exponent: i32,
    /// Raw `sign` attribute.
    pub sign: Option<String>,
    /// Final value.
    pub numeric_value: f64,
    /// Document order of the fact.
    pub position: usize,
}

/// Parses fact text: thousands separators and whitespace are dropped and a
/// parenthesised number is negative.
#[must_use]
pub fn parse_fact_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (negative, digits) = match cleaned
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_str()),
    };

    let value: f64 = digits.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Parses a `scale` attribute. Missing means 0; an unparseable value is
/// logged and also treated as 0.
pub fn parse_scale(raw: Option<&str>) -> i32 {
    match raw.map(str::trim) {
        None | Some("") => 0,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(scale = raw, "Invalid scale attribute, using 0");
            0
        }),
    }
}

/// Value of a fact after sign, parentheses and scale are applied.
pub fn fact_value(fact: &NumericFact) -> Option<(f64, i32)> {
    let mut value = parse_fact_text(&fact.text)?;
    if fact.sign.as_deref().map(str::trim) == Some("-") {
        value = -value;
    }
    let scale = parse_scale(fact.scale.as_deref());
    Some((value * 10f64.powi(scale), scale))
}

/// Resolves canonical fields from any [`FactDocument`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConceptExtractor;

impl ConceptExtractor {
    /// Creates an extractor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Every usable fact matching one of `aliases`.
    ///
    /// Facts whose context is missing, has no parseable period end, or whose
    /// text is not a number are skipped.
    pub fn extract_matches<D: FactDocument + ?Sized>(
        &self,
        document: &D,
        aliases: &[&str],
    ) -> Vec<ConceptMatch> {
        let mut matches = Vec::new();
        for (alias_rank, alias) in aliases.iter().enumerate() {
            for fact in document.find_facts_by_name(alias) {
                let Some(context) = document.context(&fact.context_ref) else {
                    trace!(concept = alias, context = %fact.context_ref, "Unknown context");
                    continue;
                };
                let Some(period_end) = context.period.end() else {
                    trace!(concept = alias, context = %fact.context_ref, "No usable period end");
                    continue;
                };
                let Some((numeric_value, scale_exponent)) = fact_value(fact) else {
                    trace!(concept = alias, text = %fact.text, "Unparseable fact text");
                    continue;
                };

                matches.push(ConceptMatch {
                    concept_alias: (*alias).to_string(),
                    alias_rank,
                    context_id: context.id.clone(),
                    period_end,
                    dimensional: context.dimensional,
                    raw_text: fact.text.clone(),
                    scale_exponent,
                    sign: fact.sign.clone(),
                    numeric_value,
                    position: fact.position,
                });
            }
        }
        matches
    }

    /// Picks the winning match: newest period end, then non-dimensional
    /// contexts, then alias order, then document order.
    #[must_use]
    pub fn select(matches: &[ConceptMatch]) -> Option<&ConceptMatch> {
        matches.iter().min_by_key(|m| {
            (
                Reverse(m.period_end),
                m.dimensional,
                m.alias_rank,
                m.position,
            )
        })
    }

    /// Resolves a concept to a value, or `None` if no alias yields one.
    pub fn extract<D: FactDocument + ?Sized>(&self, document: &D, aliases: &[&str]) -> Option<f64> {
        Self::select(&self.extract_matches(document, aliases)).map(|m| m.numeric_value)
    }

    /// Resolves a concept for a single period end.
    pub fn extract_for_period(
        &self,
        document: &InstanceDocument,
        aliases: &[&str],
        period_end: NaiveDate,
    ) -> Option<f64> {
        self.extract(&document.for_period(period_end), aliases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn instance(facts: &str) -> InstanceDocument {
        let xml = format!(
            r#"<xbrl xmlns:xbrli="x" xmlns:us-gaap="y" xmlns:ifrs-full="z" xmlns:xbrldi="w">
  <xbrli:context id="q1_24"><xbrli:period><xbrli:instant>2024-03-31</xbrli:instant></xbrli:period></xbrli:context>
  <xbrli:context id="q1_23"><xbrli:period><xbrli:instant>2023-03-31</xbrli:instant></xbrli:period></xbrli:context>
  <xbrli:context id="seg_24"><xbrli:entity><xbrli:segment><xbrldi:explicitMember dimension="a">b</xbrldi:explicitMember></xbrli:segment></xbrli:entity>
    <xbrli:period><xbrli:instant>2024-03-31</xbrli:instant></xbrli:period></xbrli:context>
  <xbrli:context id="bad"><xbrli:period><xbrli:instant>March 2024</xbrli:instant></xbrli:period></xbrli:context>
  {facts}
</xbrl>"#
        );
        InstanceDocument::parse(&xml).unwrap()
    }

    #[test]
    fn test_parse_fact_text() {
        assert_eq!(parse_fact_text("1,234"), Some(1234.0));
        assert_eq!(parse_fact_text(" 12 345 "), Some(12345.0));
        assert_eq!(parse_fact_text("(200)"), Some(-200.0));
        assert_eq!(parse_fact_text("-7.5"), Some(-7.5));
        assert_eq!(parse_fact_text("—"), None);
        assert_eq!(parse_fact_text(""), None);
        assert_eq!(parse_fact_text("n/a"), None);
    }

    #[test]
    fn test_parse_scale() {
        assert_eq!(parse_scale(None), 0);
        assert_eq!(parse_scale(Some("3")), 3);
        assert_eq!(parse_scale(Some("-2")), -2);
        assert_eq!(parse_scale(Some("thousands")), 0);
    }

    #[test]
    fn test_scale_and_parentheses() {
        let doc = instance(
            r#"<us-gaap:Assets contextRef="q1_24" unitRef="usd" scale="3">150</us-gaap:Assets>
               <us-gaap:RetainedEarningsAccumulatedDeficit contextRef="q1_24" unitRef="usd">(200)</us-gaap:RetainedEarningsAccumulatedDeficit>"#,
        );
        let extractor = ConceptExtractor::new();
        assert_relative_eq!(
            extractor.extract(&doc, &["us-gaap:Assets"]).unwrap(),
            150_000.0
        );
        assert_relative_eq!(
            extractor
                .extract(&doc, &["us-gaap:RetainedEarningsAccumulatedDeficit"])
                .unwrap(),
            -200.0
        );
    }

    #[test]
    fn test_sign_attribute_negates() {
        let doc = instance(
            r#"<us-gaap:Assets contextRef="q1_24" unitRef="usd" sign="-">10</us-gaap:Assets>"#,
        );
        assert_relative_eq!(
            ConceptExtractor::new()
                .extract(&doc, &["us-gaap:Assets"])
                .unwrap(),
            -10.0
        );
    }

    #[test]
    fn test_most_recent_period_wins() {
        let doc = instance(
            r#"<us-gaap:Assets contextRef="q1_23" unitRef="usd">400</us-gaap:Assets>
               <us-gaap:Assets contextRef="q1_24" unitRef="usd">500</us-gaap:Assets>"#,
        );
        assert_relative_eq!(
            ConceptExtractor::new()
                .extract(&doc, &["us-gaap:Assets"])
                .unwrap(),
            500.0
        );
    }

    #[test]
    fn test_non_dimensional_context_preferred() {
        let doc = instance(
            r#"<us-gaap:Assets contextRef="seg_24" unitRef="usd">90</us-gaap:Assets>
               <us-gaap:Assets contextRef="q1_24" unitRef="usd">500</us-gaap:Assets>"#,
        );
        assert_relative_eq!(
            ConceptExtractor::new()
                .extract(&doc, &["us-gaap:Assets"])
                .unwrap(),
            500.0
        );
    }

    #[test]
    fn test_alias_order_breaks_ties() {
        let doc = instance(
            r#"<ifrs-full:Assets contextRef="q1_24" unitRef="usd">2</ifrs-full:Assets>
               <us-gaap:Assets contextRef="q1_24" unitRef="usd">1</us-gaap:Assets>"#,
        );
        let matches =
            ConceptExtractor::new().extract_matches(&doc, &["us-gaap:Assets", "ifrs-full:Assets"]);
        assert_eq!(matches.len(), 2);
        let winner = ConceptExtractor::select(&matches).unwrap();
        assert_eq!(winner.concept_alias, "us-gaap:Assets");
        assert_relative_eq!(winner.numeric_value, 1.0);
    }

    #[test]
    fn test_unusable_facts_are_skipped() {
        let doc = instance(
            r#"<us-gaap:Assets contextRef="bad" unitRef="usd">1</us-gaap:Assets>
               <us-gaap:Assets contextRef="missing" unitRef="usd">2</us-gaap:Assets>
               <us-gaap:Assets contextRef="q1_23" unitRef="usd">—</us-gaap:Assets>"#,
        );
        let extractor = ConceptExtractor::new();
        assert!(extractor.extract_matches(&doc, &["us-gaap:Assets"]).is_empty());
        assert_eq!(extractor.extract(&doc, &["us-gaap:Assets"]), None);
    }

    #[test]
    fn test_extract_for_period() {
        let doc = instance(
            r#"<us-gaap:Assets contextRef="q1_23" unitRef="usd">400</us-gaap:Assets>
               <us-gaap:Assets contextRef="q1_24" unitRef="usd">500</us-gaap:Assets>"#,
        );
        let extractor = ConceptExtractor::new();
        let period = NaiveDate::from_ymd_opt(2023, 3, 31).unwrap();
        assert_relative_eq!(
            extractor
                .extract_for_period(&doc, &["us-gaap:Assets"], period)
                .unwrap(),
            400.0
        );
        let absent = NaiveDate::from_ymd_opt(2022, 3, 31).unwrap();
        assert_eq!(
            extractor.extract_for_period(&doc, &["us-gaap:Assets"], absent),
            None
        );
    }
}
