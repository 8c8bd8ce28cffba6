//! Mathematics Genealogy Project page scraping
//!
//! Page-specific glue: extracts the biographical facts from one
//! mathematician page and assembles them into typed records for the
//! persistence engine. Parsing is tolerant; missing sections become absent
//! fields, only a page without a name is rejected.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use reqwest::Url;

use crate::model;
use crate::record::Record;
use crate::{Error, Result};

pub const BASE_URL: &str = "genealogy.math.ndsu.nodak.edu";
pub const MATHEMATICIAN_PATH: &str = "/id.php";

pub fn mathematician_query(id: i64) -> String {
    format!("id={id}")
}

pub fn mathematician_url(id: i64) -> String {
    format!("https://{BASE_URL}{MATHEMATICIAN_PATH}?{}", mathematician_query(id))
}

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<h2[^>]*>(.*?)</h2>").unwrap());
static UNIVERSITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<span[^>]*#006633[^>]*>(.*?)</span>\s*(\d{4})?").unwrap()
});
static FLAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"img/flags/([A-Za-z_\-]+)\.\w+").unwrap());
static THESIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<span id="thesisTitle"[^>]*>(.*?)</span>"#).unwrap());
static SUBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Mathematics Subject Classification:\s*(\d+)\W*([^<]+)").unwrap()
});
static ADVISOR_SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<p[^>]*>\s*Advisor.*?</p>").unwrap());
static STUDENTS_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<table[^>]*>.*?</table>").unwrap());
static ID_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"id\.php\?id=(\d+)").unwrap());
static LINKS_SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<p[^>]*id="otherLinks"[^>]*>(.*?)</p>"#).unwrap());
static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<a href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap());

/// Everything extracted from one mathematician page
#[derive(Debug, Clone)]
pub struct MathematicianPage {
    pub id: i64,
    pub name: String,
    pub university: Option<String>,
    pub country: Option<String>,
    pub year: Option<i64>,
    pub thesis_title: Option<String>,
    /// Mathematics Subject Classification (code, name)
    pub subject: Option<(i64, String)>,
    pub advisor_ids: Vec<i64>,
    pub student_ids: Vec<i64>,
    /// Associated external links as (href, anchor text)
    pub links: Vec<(String, String)>,
}

/// Parse one mathematician page
pub fn parse_mathematician_page(id: i64, html: &str) -> Result<MathematicianPage> {
    let name = NAME_RE
        .captures(html)
        .map(|c| strip_tags(&c[1]))
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::Parse(format!("page for id {id} has no mathematician name")))?;

    let (university, year) = match UNIVERSITY_RE.captures(html) {
        Some(c) => {
            let univ = strip_tags(&c[1]);
            let year = c.get(2).and_then(|m| m.as_str().parse::<i64>().ok());
            ((!univ.is_empty()).then_some(univ), year)
        }
        None => (None, None),
    };

    let country = FLAG_RE.captures(html).map(|c| c[1].replace('_', " "));

    let thesis_title = THESIS_RE
        .captures(html)
        .map(|c| strip_tags(&c[1]))
        .filter(|t| !t.is_empty());

    let subject = SUBJECT_RE.captures(html).and_then(|c| {
        let code = c[1].parse::<i64>().ok()?;
        Some((code, c[2].trim().to_string()))
    });

    let mut advisor_ids = Vec::new();
    for section in ADVISOR_SECTION_RE.find_iter(html) {
        for cap in ID_LINK_RE.captures_iter(section.as_str()) {
            if let Ok(advisor_id) = cap[1].parse::<i64>() {
                advisor_ids.push(advisor_id);
            }
        }
    }

    let student_ids = STUDENTS_TABLE_RE
        .find(html)
        .map(|table| {
            ID_LINK_RE
                .captures_iter(table.as_str())
                .filter_map(|c| c[1].parse::<i64>().ok())
                .collect()
        })
        .unwrap_or_default();

    let links = LINKS_SECTION_RE
        .captures(html)
        .map(|section| {
            ANCHOR_RE
                .captures_iter(&section[1])
                .map(|c| (c[1].to_string(), strip_tags(&c[2])))
                .collect()
        })
        .unwrap_or_default();

    Ok(MathematicianPage {
        id,
        name,
        university,
        country,
        year,
        thesis_title,
        subject,
        advisor_ids,
        student_ids,
        links,
    })
}

/// Records assembled from one parsed page, ready to persist
pub struct PageRecords {
    pub mathematician: Record,
    pub webpage: Record,
    pub links: Vec<Record>,
}

/// Assemble typed records from a parsed page.
///
/// The dissertation chain (subject, university, country) nests inside the
/// mathematician record; the engine persists it bottom-up.
pub fn page_records(page: &MathematicianPage, fetched_at: NaiveDateTime) -> PageRecords {
    let country = page.country.as_deref().map(model::country);
    let university = page
        .university
        .as_deref()
        .map(|name| model::university(name, country));
    let subject = page
        .subject
        .as_ref()
        .map(|(code, name)| model::subject(*code, name));

    let has_dissertation = page.thesis_title.is_some()
        || page.year.is_some()
        || subject.is_some()
        || university.is_some();
    let dissertation = has_dissertation.then(|| {
        model::dissertation(page.thesis_title.as_deref(), page.year, subject, university)
    });

    // TODO: populate birth/death dates once a biography source is wired in
    let mathematician = model::mathematician(page.id, Some(&page.name), dissertation);

    let webpage = model::webpage(
        BASE_URL,
        MATHEMATICIAN_PATH,
        &mathematician_query(page.id),
        Some(fetched_at),
    );

    let links = page
        .links
        .iter()
        .filter_map(|(href, text)| {
            let url = Url::parse(href).ok()?;
            let host = url.host_str()?.to_string();
            let linked_page =
                model::webpage(&host, url.path(), url.query().unwrap_or(""), None);
            Some(model::associated_link(page.id, linked_page, text))
        })
        .collect();

    PageRecords {
        mathematician,
        webpage,
        links,
    }
}

fn strip_tags(fragment: &str) -> String {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
    let text = TAG_RE.replace_all(fragment, " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
