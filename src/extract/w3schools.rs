//! Extractor tuned for w3schools.com tutorial pages.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use scraper::Html;
use url::Url;

use super::html::{code_blocks, dedup_tags, first_text, meta, select_doc, structured_text};
use super::ExtractedPage;

const PATH_CATEGORIES: &[(&str, &str)] = &[
    ("/html/", "HTML"),
    ("/css/", "CSS"),
    ("/js/", "JavaScript"),
    ("/python/", "Python"),
    ("/sql/", "SQL"),
    ("/php/", "PHP"),
    ("/java/", "Java"),
    ("/cpp/", "C++"),
    ("/csharp/", "C#"),
    ("/react/", "React"),
    ("/bootstrap/", "Bootstrap"),
    ("/jquery/", "jQuery"),
    ("/nodejs/", "Node.js"),
    ("/mongodb/", "MongoDB"),
    ("/git/", "Git"),
    ("/typescript/", "TypeScript"),
    ("/django/", "Django"),
    ("/postgresql/", "PostgreSQL"),
];

pub(super) fn category_for(url: &Url) -> &'static str {
    let path = url.path().to_lowercase();
    PATH_CATEGORIES
        .iter()
        .find(|(needle, _)| path.contains(needle))
        .map(|(_, category)| *category)
        .unwrap_or("Web Development")
}

fn category_tags(category: &str) -> &'static [&'static str] {
    match category {
        "HTML" => &["web", "markup", "semantic"],
        "CSS" => &["styling", "design", "layout"],
        "JavaScript" => &["programming", "frontend", "es6"],
        "Python" => &["programming", "backend", "data-science"],
        "SQL" => &["database", "query", "data"],
        "React" => &["frontend", "javascript", "framework"],
        "Node.js" => &["backend", "javascript", "server"],
        _ => &[],
    }
}

pub(super) fn extract(url: &Url, html: &str, now: DateTime<Utc>) -> ExtractedPage {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, "h1")
        .or_else(|| first_text(&doc, "title"))
        .unwrap_or_else(|| "Untitled Document".to_string());

    let category = category_for(url).to_string();

    let content = select_doc(&doc, "#main")
        .into_iter()
        .chain(select_doc(&doc, "body"))
        .map(structured_text)
        .find(|t| !t.is_empty())
        .unwrap_or_default();

    let examples = code_blocks(&doc, ".w3-code, .w3-example pre, pre");

    let mut tags: Vec<String> = [category.as_str(), "tutorial", "documentation", "w3schools"]
        .iter()
        .chain(category_tags(&category))
        .map(|t| t.to_string())
        .collect();
    let body_text = content.to_lowercase();
    for (needle, tag) in [
        ("api", "api"),
        ("function", "functions"),
        ("class", "classes"),
        ("object", "objects"),
    ] {
        if body_text.contains(needle) {
            tags.push(tag.to_string());
        }
    }

    let author = first_text(&doc, ".author, .byline").unwrap_or_else(|| "W3Schools".to_string());

    let mut metadata = HashMap::new();
    if let Some(description) = meta(&doc, "description") {
        metadata.insert("description".to_string(), description);
    }
    if let Some(modified) = first_text(&doc, ".modified, .updated") {
        metadata.insert("last_modified".to_string(), modified);
    }

    let mut full = content;
    if !examples.is_empty() {
        full.push_str("\n\nCode Examples:\n");
        for (i, example) in examples.iter().enumerate() {
            full.push_str(&format!("\nExample {}:\n{}\n", i + 1, example));
        }
    }

    ExtractedPage {
        id: format!("w3s_{}", uuid::Uuid::new_v4().simple()),
        title,
        content: full,
        category,
        tags: dedup_tags(tags),
        author,
        metadata,
        scraped_at: now,
    }
}
