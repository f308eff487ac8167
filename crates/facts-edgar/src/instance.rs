//! XBRL instance parsing.
//!
//! [`InstanceDocument`] reads contexts and numeric facts from either a plain
//! XBRL instance or an inline-XBRL (XHTML) document. Only what fact
//! extraction needs is kept: context periods, whether a context carries
//! dimensions, and each numeric fact's raw attributes and text.

use chrono::NaiveDate;
use facts_core::{FactsError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};

/// Date formats accepted in period elements.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y-%m-%dT%H:%M:%S"];

/// Parses a period date, accepting a plain date or a date-time.
#[must_use]
pub fn parse_period_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMATS[0])
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, DATE_FORMATS[1])
                .ok()
                .map(|dt| dt.date())
        })
}

/// Raw period of a context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Period {
    /// `<instant>` text.
    pub instant: Option<String>,
    /// `<startDate>` text.
    pub start_date: Option<String>,
    /// `<endDate>` text.
    pub end_date: Option<String>,
}

impl Period {
    /// The instant, or the end of a duration, if it parses.
    #[must_use]
    pub fn end(&self) -> Option<NaiveDate> {
        self.instant
            .as_deref()
            .or(self.end_date.as_deref())
            .and_then(parse_period_date)
    }
}

/// An XBRL context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    /// Context id referenced by facts.
    pub id: String,
    /// Reporting period.
    pub period: Period,
    /// True if the context has explicit or typed dimension members.
    pub dimensional: bool,
}

/// A numeric fact as it appears in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericFact {
    /// Qualified concept name (e.g. `us-gaap:Assets`).
    pub name: String,
    /// Referenced context id.
    pub context_ref: String,
    /// Referenced unit id.
    pub unit_ref: Option<String>,
    /// Raw `scale` attribute.
    pub scale: Option<String>,
    /// Raw `sign` attribute.
    pub sign: Option<String>,
    /// Text content with whitespace preserved between fragments.
    pub text: String,
    /// Position among numeric facts in document order.
    pub position: usize,
}

/// Read access to parsed facts, independent of how they were obtained.
pub trait FactDocument {
    /// Every numeric fact whose qualified name equals `name`, ignoring case.
    fn find_facts_by_name(&self, name: &str) -> Vec<&NumericFact>;

    /// Looks up a context by id.
    fn context(&self, id: &str) -> Option<&Context>;
}

/// Parsed XBRL or inline-XBRL document.
#[derive(Debug, Clone, Default)]
pub struct InstanceDocument {
    contexts: HashMap<String, Context>,
    facts: Vec<NumericFact>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodField {
    Instant,
    Start,
    End,
}

fn local_name_lower(name: &[u8]) -> String {
    let local = name
        .iter()
        .rposition(|b| *b == b':')
        .map_or(name, |i| &name[i + 1..]);
    String::from_utf8_lossy(local).to_ascii_lowercase()
}

fn attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| FactsError::Parse(format!("XML attribute: {e}")))?;
        let key = local_name_lower(attr.key.as_ref());
        let value = attr
            .unescape_value()
            .map_err(|e| FactsError::Parse(format!("XML attribute value: {e}")))?
            .into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

/// Prefix the alias tables use for concepts of a standard taxonomy namespace.
fn canonical_prefix(uri: &str) -> Option<&'static str> {
    let uri = uri.trim_end_matches('/');
    if uri.contains("fasb.org/us-gaap") {
        Some("us-gaap")
    } else if uri.contains("xbrl.ifrs.org") && uri.ends_with("ifrs-full") {
        Some("ifrs-full")
    } else {
        None
    }
}

/// Streaming parse state. Open elements are tracked by depth because end-tag
/// names are not checked (inline documents are not always strict XML).
#[derive(Debug, Default)]
struct Parser {
    doc: InstanceDocument,
    depth: usize,
    context: Option<(usize, Context)>,
    period_field: Option<(usize, PeriodField)>,
    open_facts: Vec<(usize, usize)>,
    /// Namespace declarations seen so far, prefix to URI ("" is the default).
    namespaces: HashMap<String, String>,
}

impl Parser {
    fn declare_namespaces(&mut self, element: &BytesStart<'_>) {
        for attr in element.attributes().flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref());
            let prefix = match key.strip_prefix("xmlns") {
                Some("") => "",
                Some(rest) => match rest.strip_prefix(':') {
                    Some(prefix) => prefix,
                    None => continue,
                },
                None => continue,
            };
            if let Ok(uri) = attr.unescape_value() {
                self.namespaces.insert(prefix.to_string(), uri.into_owned());
            }
        }
    }

    /// Rewrites `raw` to the `us-gaap:`/`ifrs-full:` form when its prefix is
    /// bound to one of those taxonomies.
    fn concept_name(&self, raw: &str) -> String {
        let (prefix, local) = raw.rsplit_once(':').unwrap_or(("", raw));
        self.namespaces
            .get(prefix)
            .and_then(|uri| canonical_prefix(uri))
            .map_or_else(|| raw.to_string(), |canonical| format!("{canonical}:{local}"))
    }

    fn start(&mut self, element: &BytesStart<'_>, self_closing: bool) -> Result<()> {
        self.declare_namespaces(element);
        let depth = self.depth + 1;
        if !self_closing {
            self.depth = depth;
        }
        let local = local_name_lower(element.name().as_ref());

        if let Some((_, context)) = self.context.as_mut() {
            match local.as_str() {
                "explicitmember" | "typedmember" => context.dimensional = true,
                "instant" if !self_closing => self.period_field = Some((depth, PeriodField::Instant)),
                "startdate" if !self_closing => self.period_field = Some((depth, PeriodField::Start)),
                "enddate" if !self_closing => self.period_field = Some((depth, PeriodField::End)),
                _ => {}
            }
            return Ok(());
        }

        let is_context = local == "context";
        let is_non_fraction = local == "nonfraction";
        let has_refs = element
            .attributes()
            .flatten()
            .any(|a| local_name_lower(a.key.as_ref()) == "contextref");
        if !is_context && !has_refs {
            return Ok(());
        }

        let mut attrs = attributes(element)?;
        if is_context {
            if let Some(id) = attrs.remove("id")
                && !self_closing
            {
                self.context = Some((
                    depth,
                    Context {
                        id,
                        period: Period::default(),
                        dimensional: false,
                    },
                ));
            }
            return Ok(());
        }

        let Some(context_ref) = attrs.remove("contextref") else {
            return Ok(());
        };
        let name = if is_non_fraction {
            match attrs.remove("name") {
                Some(name) => self.concept_name(&name),
                None => return Ok(()),
            }
        } else if attrs.contains_key("unitref") {
            self.concept_name(&String::from_utf8_lossy(element.name().as_ref()))
        } else {
            // Non-numeric fact (text block, date, ...).
            return Ok(());
        };

        let position = self.doc.facts.len();
        self.doc.facts.push(NumericFact {
            name,
            context_ref,
            unit_ref: attrs.remove("unitref"),
            scale: attrs.remove("scale"),
            sign: attrs.remove("sign"),
            text: String::new(),
            position,
        });
        if !self_closing {
            self.open_facts.push((depth, position));
        }
        Ok(())
    }

    fn wants_text(&self) -> bool {
        self.period_field.is_some() || !self.open_facts.is_empty()
    }

    fn text(&mut self, text: &str) {
        if let (Some((_, field)), Some((_, context))) = (self.period_field, self.context.as_mut()) {
            let slot = match field {
                PeriodField::Instant => &mut context.period.instant,
                PeriodField::Start => &mut context.period.start_date,
                PeriodField::End => &mut context.period.end_date,
            };
            slot.get_or_insert_with(String::new).push_str(text);
        }
        for (_, index) in &self.open_facts {
            if let Some(fact) = self.doc.facts.get_mut(*index) {
                fact.text.push_str(text);
            }
        }
    }

    fn end(&mut self) {
        let depth = self.depth;
        while self.open_facts.last().is_some_and(|(d, _)| *d == depth) {
            self.open_facts.pop();
        }
        if self.period_field.is_some_and(|(d, _)| d == depth) {
            self.period_field = None;
        }
        if self.context.as_ref().is_some_and(|(d, _)| *d == depth)
            && let Some((_, context)) = self.context.take()
        {
            self.doc.contexts.insert(context.id.clone(), context);
        }
        self.depth = depth.saturating_sub(1);
    }
}

impl InstanceDocument {
    /// Parses a document.
    ///
    /// Numeric facts are elements carrying both `contextRef` and `unitRef`,
    /// plus inline-XBRL `ix:nonFraction` elements (named by their `name`
    /// attribute).
    ///
    /// # Errors
    ///
    /// Returns [`FactsError::Parse`] if the document is not well-formed enough
    /// to read.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let config = reader.config_mut();
        config.trim_text(true);
        config.check_end_names = false;

        let mut parser = Parser::default();
        loop {
            let event = reader.read_event().map_err(|e| {
                FactsError::Parse(format!(
                    "XML error at byte {}: {e}",
                    reader.buffer_position()
                ))
            })?;

            match event {
                Event::Start(element) => parser.start(&element, false)?,
                Event::Empty(element) => parser.start(&element, true)?,
                Event::Text(raw) if parser.wants_text() => {
                    // HTML entities such as &nbsp; are not XML; keep the raw text.
                    let text = raw
                        .unescape()
                        .unwrap_or_else(|_| Cow::Owned(String::from_utf8_lossy(&raw).into_owned()));
                    parser.text(&text);
                }
                Event::CData(data) if parser.wants_text() => {
                    parser.text(&String::from_utf8_lossy(&data));
                }
                Event::End(_) => parser.end(),
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(parser.doc)
    }

    /// All numeric facts in document order.
    #[must_use]
    pub fn facts(&self) -> &[NumericFact] {
        &self.facts
    }

    /// Number of parsed contexts.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// True if the document holds no numeric facts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Distinct period ends of non-dimensional contexts referenced by numeric
    /// facts, newest first.
    #[must_use]
    pub fn reporting_periods(&self) -> Vec<NaiveDate> {
        let periods: BTreeSet<NaiveDate> = self
            .facts
            .iter()
            .filter_map(|fact| self.contexts.get(&fact.context_ref))
            .filter(|context| !context.dimensional)
            .filter_map(|context| context.period.end())
            .collect();
        periods.into_iter().rev().collect()
    }

    /// A view restricted to facts whose context ends on `period_end`.
    #[must_use]
    pub const fn for_period(&self, period_end: NaiveDate) -> PeriodView<'_> {
        PeriodView {
            document: self,
            period_end,
        }
    }
}

impl FactDocument for InstanceDocument {
    fn find_facts_by_name(&self, name: &str) -> Vec<&NumericFact> {
        self.facts
            .iter()
            .filter(|fact| fact.name.eq_ignore_ascii_case(name))
            .collect()
    }

    fn context(&self, id: &str) -> Option<&Context> {
        self.contexts.get(id)
    }
}

/// [`FactDocument`] over the facts of a single period end.
#[derive(Debug, Clone, Copy)]
pub struct PeriodView<'a> {
    document: &'a InstanceDocument,
    period_end: NaiveDate,
}

impl PeriodView<'_> {
    /// The period end this view selects.
    #[must_use]
    pub const fn period_end(&self) -> NaiveDate {
        self.period_end
    }
}

impl FactDocument for PeriodView<'_> {
    fn find_facts_by_name(&self, name: &str) -> Vec<&NumericFact> {
        self.document
            .find_facts_by_name(name)
            .into_iter()
            .filter(|fact| {
                self.document
                    .context(&fact.context_ref)
                    .and_then(|context| context.period.end())
                    == Some(self.period_end)
            })
            .collect()
    }

    fn context(&self, id: &str) -> Option<&Context> {
        self.document.context(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
            xmlns:us-gaap="http://fasb.org/us-gaap/2023"
            xmlns:xbrldi="http://xbrl.org/2006/xbrldi">
  <xbrli:context id="c2024">
    <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:instant>2024-03-31</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:context id="d2023">
    <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier></xbrli:entity>
    <xbrli:period>
      <xbrli:startDate>2022-04-01</xbrli:startDate>
      <xbrli:endDate>2023-03-31T00:00:00</xbrli:endDate>
    </xbrli:period>
  </xbrli:context>
  <xbrli:context id="seg2024">
    <xbrli:entity>
      <xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier>
      <xbrli:segment><xbrldi:explicitMember dimension="us-gaap:StatementBusinessSegmentsAxis">x:AmericasMember</xbrldi:explicitMember></xbrli:segment>
    </xbrli:entity>
    <xbrli:period><xbrli:instant>2024-06-30</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:unit id="usd"><xbrli:measure>iso4217:USD</xbrli:measure></xbrli:unit>
  <us-gaap:Assets contextRef="c2024" unitRef="usd" decimals="-6">500</us-gaap:Assets>
  <us-gaap:Revenues contextRef="d2023" unitRef="usd" decimals="-6">1,200</us-gaap:Revenues>
  <us-gaap:Assets contextRef="seg2024" unitRef="usd" decimals="-6">90</us-gaap:Assets>
  <us-gaap:AccountingPolicies contextRef="d2023">text block</us-gaap:AccountingPolicies>
</xbrli:xbrl>"#;

    const INLINE: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:ix="http://www.xbrl.org/2013/inlineXBRL" xmlns:xbrli="http://www.xbrl.org/2003/instance">
<body>
  <div style="display:none"><ix:header><ix:resources>
    <xbrli:context id="FY24"><xbrli:entity><xbrli:identifier scheme="x">1</xbrli:identifier></xbrli:entity>
      <xbrli:period><xbrli:instant>2024-09-28</xbrli:instant></xbrli:period></xbrli:context>
  </ix:resources></ix:header></div>
  <table><tr>
    <td>Total assets</td>
    <td>$<ix:nonFraction name="us-gaap:Assets" contextRef="FY24" unitRef="usd" scale="6" decimals="-6">364,<span>980</span></ix:nonFraction></td>
    <td>(<ix:nonFraction name="us-gaap:RetainedEarningsAccumulatedDeficit" contextRef="FY24" unitRef="usd" scale="6" sign="-">19,154</ix:nonFraction>)</td>
    <td><ix:nonFraction name="us-gaap:Liabilities" contextRef="FY24" unitRef="usd" xsi:nil="true"/></td>
  </tr></table>
  <p>&nbsp;</p>
</body></html>"#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_period_date_formats() {
        assert_eq!(parse_period_date("2024-03-31"), Some(date(2024, 3, 31)));
        assert_eq!(
            parse_period_date("2024-03-31T00:00:00"),
            Some(date(2024, 3, 31))
        );
        assert_eq!(parse_period_date("31/03/2024"), None);
        assert_eq!(parse_period_date(""), None);
    }

    #[test]
    fn test_parse_instance_contexts() {
        let doc = InstanceDocument::parse(INSTANCE).unwrap();
        assert_eq!(doc.context_count(), 3);

        let instant = doc.context("c2024").unwrap();
        assert_eq!(instant.period.end(), Some(date(2024, 3, 31)));
        assert!(!instant.dimensional);

        let duration = doc.context("d2023").unwrap();
        assert_eq!(duration.period.start_date.as_deref(), Some("2022-04-01"));
        assert_eq!(duration.period.end(), Some(date(2023, 3, 31)));

        assert!(doc.context("seg2024").unwrap().dimensional);
    }

    #[test]
    fn test_parse_instance_numeric_facts() {
        let doc = InstanceDocument::parse(INSTANCE).unwrap();
        // The text block has no unitRef and is not numeric.
        assert_eq!(doc.facts().len(), 3);

        let assets = doc.find_facts_by_name("US-GAAP:assets");
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].text, "500");
        assert_eq!(assets[0].unit_ref.as_deref(), Some("usd"));
        assert_eq!(assets[1].position, 2);
    }

    #[test]
    fn test_reporting_periods_skip_dimensional() {
        let doc = InstanceDocument::parse(INSTANCE).unwrap();
        assert_eq!(
            doc.reporting_periods(),
            vec![date(2024, 3, 31), date(2023, 3, 31)]
        );
    }

    #[test]
    fn test_period_view_filters_facts() {
        let doc = InstanceDocument::parse(INSTANCE).unwrap();
        let view = doc.for_period(date(2024, 3, 31));
        let assets = view.find_facts_by_name("us-gaap:Assets");
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].context_ref, "c2024");
        assert!(view.find_facts_by_name("us-gaap:Revenues").is_empty());
    }

    #[test]
    fn test_parse_inline_xbrl() {
        let doc = InstanceDocument::parse(INLINE).unwrap();
        assert_eq!(doc.facts().len(), 3);

        let assets = doc.find_facts_by_name("us-gaap:Assets");
        assert_eq!(assets[0].text, "364,980");
        assert_eq!(assets[0].scale.as_deref(), Some("6"));

        let retained = doc.find_facts_by_name("us-gaap:RetainedEarningsAccumulatedDeficit");
        assert_eq!(retained[0].sign.as_deref(), Some("-"));

        let nil = doc.find_facts_by_name("us-gaap:Liabilities");
        assert!(nil[0].text.is_empty());

        assert_eq!(doc.reporting_periods(), vec![date(2024, 9, 28)]);
    }

    #[test]
    fn test_concepts_resolved_through_namespace_bindings() {
        let xml = r#"<xbrl xmlns="http://www.xbrl.org/2003/instance"
                          xmlns:gaap="http://fasb.org/us-gaap/2024"
                          xmlns:ifrs="https://xbrl.ifrs.org/taxonomy/2024-03-27/ifrs-full"
                          xmlns:acme="http://acme.example/2024">
  <context id="c1"><period><instant>2024-06-30</instant></period></context>
  <gaap:Assets contextRef="c1" unitRef="usd">100</gaap:Assets>
  <ifrs:Revenue contextRef="c1" unitRef="usd">7</ifrs:Revenue>
  <acme:Assets contextRef="c1" unitRef="usd">5</acme:Assets>
</xbrl>"#;
        let doc = InstanceDocument::parse(xml).unwrap();

        let assets = doc.find_facts_by_name("us-gaap:Assets");
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].text, "100");
        assert_eq!(doc.find_facts_by_name("ifrs-full:Revenue").len(), 1);
        // Company extensions keep their own prefix.
        assert_eq!(doc.find_facts_by_name("acme:Assets").len(), 1);
    }

    #[test]
    fn test_default_namespace_concepts_are_qualified() {
        let xml = r#"<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance">
  <xbrli:context id="c1"><xbrli:period><xbrli:instant>2024-06-30</xbrli:instant></xbrli:period></xbrli:context>
  <facts xmlns="http://fasb.org/us-gaap/2024">
    <AssetsCurrent contextRef="c1" unitRef="usd">40</AssetsCurrent>
  </facts>
</xbrli:xbrl>"#;
        let doc = InstanceDocument::parse(xml).unwrap();
        let current = doc.find_facts_by_name("us-gaap:AssetsCurrent");
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].text, "40");
    }

    #[test]
    fn test_inline_name_attribute_uses_bindings() {
        let xml = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:ix="http://www.xbrl.org/2013/inlineXBRL" xmlns:fasb="http://fasb.org/us-gaap/2024">
<ix:nonFraction name="fasb:Assets" contextRef="c1" unitRef="usd">12</ix:nonFraction>
</html>"#;
        let doc = InstanceDocument::parse(xml).unwrap();
        assert_eq!(doc.find_facts_by_name("us-gaap:Assets").len(), 1);
    }

    #[test]
    fn test_parse_document_without_facts() {
        let doc = InstanceDocument::parse("<html><body>no facts</body></html>").unwrap();
        assert!(doc.is_empty());
    }
}
