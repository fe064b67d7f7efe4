//! Generic extractor for arbitrary documentation pages.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use scraper::Html;
use url::Url;

use super::html::{
    code_blocks, dedup_tags, first_attr, first_text, meta, select_doc, structured_text, text_of,
};
use super::ExtractedPage;

/// Container candidates, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    ".content",
    ".main-content",
    ".post-content",
    ".entry-content",
    ".article-content",
    ".documentation",
    ".docs",
    "#content",
    "#main",
    "body",
];

const HOST_CATEGORIES: &[(&str, &str)] = &[
    ("stackoverflow.com", "Q&A"),
    ("github.com", "Repository"),
    ("docs.python.org", "Python"),
    ("nodejs.org", "Node.js"),
    ("reactjs.org", "React"),
    ("react.dev", "React"),
    ("vuejs.org", "Vue.js"),
    ("angular.io", "Angular"),
    ("go.dev", "Go"),
    ("golang.org", "Go"),
    ("rust-lang.org", "Rust"),
];

const MDN_CATEGORIES: &[(&str, &str)] = &[
    ("/html", "HTML"),
    ("/css", "CSS"),
    ("/javascript", "JavaScript"),
    ("/api", "Web API"),
    ("/http", "HTTP"),
];

/// Path fragments checked in order; longer names precede their prefixes.
const PATH_TECHNOLOGIES: &[(&str, &str)] = &[
    ("javascript", "JavaScript"),
    ("typescript", "TypeScript"),
    ("nodejs", "Node.js"),
    ("python", "Python"),
    ("golang", "Go"),
    ("rust", "Rust"),
    ("html", "HTML"),
    ("css", "CSS"),
    ("java", "Java"),
    ("php", "PHP"),
    ("ruby", "Ruby"),
    ("csharp", "C#"),
    ("cpp", "C++"),
    ("react", "React"),
    ("vue", "Vue.js"),
    ("angular", "Angular"),
    ("docker", "Docker"),
    ("kubernetes", "Kubernetes"),
    ("aws", "AWS"),
    ("azure", "Azure"),
    ("gcp", "Google Cloud"),
];

const CONTENT_TECHNOLOGIES: &[(&str, &str)] = &[
    ("javascript", "JavaScript"),
    ("python", "Python"),
    ("golang", "Go"),
    ("rust", "Rust"),
    ("html", "HTML"),
    ("css", "CSS"),
    ("php", "PHP"),
    ("ruby", "Ruby"),
    ("react", "React"),
    ("vue", "Vue.js"),
    ("angular", "Angular"),
    ("node", "Node.js"),
    ("docker", "Docker"),
    ("kubernetes", "Kubernetes"),
];

const CONTENT_TAGS: &[&str] = &[
    "tutorial",
    "guide",
    "api",
    "reference",
    "example",
    "demo",
    "sample",
    "code",
    "programming",
    "development",
    "web",
    "mobile",
    "frontend",
    "backend",
];

fn lookup(haystack: &str, table: &[(&str, &'static str)]) -> Option<&'static str> {
    table
        .iter()
        .find(|(needle, _)| haystack.contains(needle))
        .map(|(_, category)| *category)
}

pub(super) fn category_for(url: &Url, body_text: &str) -> String {
    let host = url.host_str().unwrap_or("").to_lowercase();
    let path = url.path().to_lowercase();

    if host.contains("w3schools.com") {
        return super::w3schools::category_for(url).to_string();
    }
    if host.contains("developer.mozilla.org") {
        return lookup(&path, MDN_CATEGORIES)
            .unwrap_or("Web Development")
            .to_string();
    }
    if let Some(category) = lookup(&host, HOST_CATEGORIES) {
        return category.to_string();
    }
    if let Some(category) = lookup(&path, PATH_TECHNOLOGIES) {
        return category.to_string();
    }

    // Most-mentioned technology; the earlier entry wins a tie.
    let mut best: Option<(&str, usize)> = None;
    for (needle, category) in CONTENT_TECHNOLOGIES {
        let count = body_text.matches(needle).count();
        if count > 0 && best.map_or(true, |(_, c)| count > c) {
            best = Some((category, count));
        }
    }
    best.map(|(c, _)| c)
        .unwrap_or("Documentation")
        .to_string()
}

pub(super) fn extract(url: &Url, html: &str, now: DateTime<Utc>) -> ExtractedPage {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, "h1")
        .or_else(|| first_text(&doc, ".article-title, .post-title"))
        .or_else(|| meta(&doc, "og:title"))
        .or_else(|| first_text(&doc, "title"))
        .unwrap_or_else(|| "Untitled Document".to_string());

    let content = CONTENT_SELECTORS
        .iter()
        .find_map(|css| select_doc(&doc, css).into_iter().next())
        .map(structured_text)
        .unwrap_or_default();

    let body_text = select_doc(&doc, "body")
        .into_iter()
        .next()
        .map(text_of)
        .unwrap_or_default()
        .to_lowercase();

    let category = category_for(url, &body_text);

    let host = url.host_str().unwrap_or("").to_lowercase();
    let mut tags = vec![category.clone(), "documentation".to_string()];
    if host.contains("github.com") {
        tags.extend(["github".to_string(), "repository".to_string()]);
    } else if host.contains("stackoverflow.com") {
        tags.extend(["stackoverflow".to_string(), "qa".to_string()]);
    } else if host.contains("medium.com") {
        tags.extend(["medium".to_string(), "article".to_string()]);
    }
    if let Some(keywords) = meta(&doc, "keywords") {
        tags.extend(keywords.split(',').map(|k| k.trim().to_string()));
    }
    for tag in CONTENT_TAGS {
        if body_text.contains(tag) {
            tags.push(tag.to_string());
        }
    }

    let mut metadata = HashMap::new();
    metadata.insert("domain".to_string(), host);
    for key in ["description", "keywords", "og:type"] {
        if let Some(value) = meta(&doc, key) {
            metadata.insert(key.to_string(), value);
        }
    }
    if let Some(date) = meta(&doc, "article:published_time")
        .or_else(|| first_attr(&doc, "time[datetime]", "datetime"))
    {
        metadata.insert("published_date".to_string(), date);
    }
    if let Some(lang) = first_attr(&doc, "html", "lang") {
        metadata.insert("language".to_string(), lang);
    }

    let examples = code_blocks(&doc, "pre");
    let mut full = content;
    if !examples.is_empty() {
        full.push_str("\n\n## Code Examples\n\n");
        for (i, example) in examples.iter().enumerate() {
            full.push_str(&format!("### Example {}\n\n```\n{}\n```\n\n", i + 1, example));
        }
    }

    ExtractedPage {
        id: format!("universal_{}", uuid::Uuid::new_v4().simple()),
        title,
        content: full.trim_end().to_string(),
        category,
        tags: dedup_tags(tags),
        author: meta(&doc, "author").unwrap_or_default(),
        metadata,
        scraped_at: now,
    }
}
