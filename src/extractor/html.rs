use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};

use crate::duration::parse_duration;
use crate::page::Page;

use super::{identifier_from_contact, CandidateRecord, RecordExtractor};

const ENABLE_LOGS: bool = false;

use crate::log_debug;

/// How far to walk back (siblings, then parents) from a card to find the
/// student details block it belongs to.
const MAX_WALK_STEPS: usize = 140;

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("invalid selector {css:?}: {err}"))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn previous_element_sibling(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.prev_siblings().find_map(ElementRef::wrap)
}

fn parent_element(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.parent().and_then(ElementRef::wrap)
}

struct Selectors {
    card: Selector,
    heading: Selector,
    flex_row: Selector,
    label: Selector,
    div: Selector,
    student_heading: Selector,
    student_container: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            card: parse_selector(".list-group-item.py-3")?,
            heading: parse_selector("h3")?,
            flex_row: parse_selector(".d-flex.flex-wrap")?,
            label: parse_selector(".pe-1")?,
            div: parse_selector("div")?,
            student_heading: parse_selector("details summary h3")?,
            student_container: parse_selector(".d-flex.flex-wrap.mt-2")?,
        })
    }
}

#[derive(Debug, Default)]
struct StudentInfo {
    name: Option<String>,
    email: Option<String>,
}

/// Extracts "Variant" cards from an assessment grading page.
///
/// Each card is a `.list-group-item.py-3` whose first `h3` reads `Variant`
/// and that contains a `Duration:` label row. The identifier comes from the
/// nearest preceding "Student details" block.
pub struct VariantCardExtractor {
    selectors: Selectors,
}

impl VariantCardExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            selectors: Selectors::new()?,
        })
    }

    fn is_variant_card(&self, card: ElementRef<'_>) -> bool {
        card.select(&self.selectors.heading)
            .next()
            .map(|h3| text_of(h3) == "Variant")
            .unwrap_or(false)
    }

    /// Text of the value cell next to the first `Duration:` label.
    fn duration_text(&self, card: ElementRef<'_>) -> Option<String> {
        for row in card.select(&self.selectors.flex_row) {
            let Some(label) = row.select(&self.selectors.label).next() else {
                continue;
            };
            if text_of(label).to_lowercase() != "duration:" {
                continue;
            }
            return row
                .select(&self.selectors.div)
                .find(|div| div.id() != label.id())
                .map(text_of);
        }
        None
    }

    fn student_info(&self, card: ElementRef<'_>) -> StudentInfo {
        let mut node = Some(card);
        for _ in 0..MAX_WALK_STEPS {
            let Some(current) = node else { break };

            let titled = current
                .select(&self.selectors.student_heading)
                .next()
                .map(|h3| text_of(h3).to_lowercase() == "student details")
                .unwrap_or(false);

            if titled {
                let parts: Vec<String> = current
                    .select(&self.selectors.student_container)
                    .next()
                    .map(|container| {
                        container
                            .select(&self.selectors.div)
                            .map(text_of)
                            .filter(|text| !text.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();

                return StudentInfo {
                    email: parts.iter().find(|part| part.contains('@')).cloned(),
                    name: parts.into_iter().next(),
                };
            }

            node = previous_element_sibling(current).or_else(|| parent_element(current));
        }
        StudentInfo::default()
    }
}

impl RecordExtractor for VariantCardExtractor {
    fn extract(&self, page: &Page) -> Vec<CandidateRecord> {
        let document = Html::parse_document(&page.html);
        let mut records = Vec::new();

        for card in document.select(&self.selectors.card) {
            if !self.is_variant_card(card) {
                continue;
            }
            let Some(duration_text) = self.duration_text(card) else {
                continue;
            };

            let student = self.student_info(card);
            log_debug!(
                "Variant card for {} ({}): {duration_text}",
                student.name.as_deref().unwrap_or("Unknown"),
                student.email.as_deref().unwrap_or("Unknown")
            );

            records.push(CandidateRecord {
                identifier: identifier_from_contact(student.email.as_deref()),
                duration_seconds: parse_duration(&duration_text),
                duration_text,
                contact: student.email,
            });
        }

        records
    }
}

/// `href` of the document's `<link rel="canonical">`, if present.
pub fn canonical_location(html: &str) -> Option<String> {
    let selector = Selector::parse(r#"link[rel="canonical"]"#).ok()?;
    let document = Html::parse_document(html);
    let href = document
        .select(&selector)
        .next()?
        .value()
        .attr("href")?
        .trim()
        .to_string();
    (!href.is_empty()).then_some(href)
}
