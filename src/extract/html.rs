//! Small helpers over `scraper` shared by both extractors.
//!
//! `scraper` trees are immutable, so "removing" page chrome is done by
//! skipping any element that sits inside an excluded ancestor.

use scraper::{ElementRef, Html, Selector};

/// Elements whose subtree never contributes text.
const CHROME_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form",
];

/// Classes whose subtree never contributes text.
const CHROME_CLASSES: &[&str] = &[
    "sidebar",
    "navigation",
    "menu",
    "ads",
    "ad",
    "advertisement",
    "social",
    "share",
    "w3-sidebar",
    "w3-bar",
    "w3-hide",
];

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Every match of `css` under the document root, in document order.
pub fn select_doc<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => doc.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// Every match of `css` under `root`, in document order.
pub fn select_in<'a>(root: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => root.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// Visible text of `el` with runs of whitespace collapsed to one space.
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first non-empty match of `css` outside page chrome.
pub fn first_text(doc: &Html, css: &str) -> Option<String> {
    select_doc(doc, css)
        .into_iter()
        .filter(|el| !in_chrome(*el))
        .map(text_of)
        .find(|t| !t.is_empty())
}

/// Trimmed attribute of the first match of `css` carrying a non-empty value.
pub fn first_attr(doc: &Html, css: &str, attr: &str) -> Option<String> {
    select_doc(doc, css)
        .into_iter()
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// `content` of `<meta name=…>` or `<meta property=…>`.
pub fn meta(doc: &Html, key: &str) -> Option<String> {
    first_attr(doc, &format!("meta[name='{}']", key), "content")
        .or_else(|| first_attr(doc, &format!("meta[property='{}']", key), "content"))
}

fn is_chrome(el: ElementRef<'_>) -> bool {
    let value = el.value();
    CHROME_TAGS.contains(&value.name()) || value.classes().any(|c| CHROME_CLASSES.contains(&c))
}

/// True if `el` or any ancestor is page chrome.
pub fn in_chrome(el: ElementRef<'_>) -> bool {
    is_chrome(el)
        || el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(is_chrome)
}

fn has_ancestor(el: ElementRef<'_>, names: &[&str]) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| names.contains(&a.value().name()))
}

/// Markdown-flavoured text of the content blocks under `root`.
///
/// Headings become `#` lines, substantial paragraphs are kept, list items
/// become bullets, table rows become `|`-separated lines. Code blocks are
/// left to the example extraction.
pub fn structured_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for el in select_in(root, "h1, h2, h3, h4, h5, h6, p, li, blockquote, tr") {
        if in_chrome(el) {
            continue;
        }
        let name = el.value().name();
        let text = text_of(el);
        if text.is_empty() {
            continue;
        }
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                out.push_str(&format!("\n{} {}\n", "#".repeat(level), text));
            }
            "p" => {
                if text.len() > 10 && !has_ancestor(el, &["li", "blockquote", "td", "th"]) {
                    out.push_str(&text);
                    out.push_str("\n\n");
                }
            }
            "li" => {
                if !has_ancestor(el, &["li"]) {
                    out.push_str(&format!("• {}\n", text));
                }
            }
            "blockquote" => out.push_str(&format!("> {}\n\n", text)),
            "tr" => {
                let cells: Vec<String> = select_in(el, "td, th")
                    .into_iter()
                    .map(text_of)
                    .filter(|c| !c.is_empty())
                    .collect();
                if !cells.is_empty() {
                    out.push_str(&format!("| {} |\n", cells.join(" | ")));
                }
            }
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Raw text of `<pre>` style blocks longer than 10 characters, each
/// prefixed with a language label when one can be read off its classes.
pub fn code_blocks(doc: &Html, css: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut examples = Vec::new();
    for el in select_doc(doc, css) {
        if in_chrome(el) {
            continue;
        }
        let code: String = el.text().collect::<String>().trim().replace("\n\n", "\n");
        if code.len() <= 10 || !seen.insert(code.clone()) {
            continue;
        }
        let class = el.value().attr("class").unwrap_or("").to_lowercase();
        examples.push(match detect_language(&class) {
            Some(lang) => format!("{}:\n{}", lang, code),
            None => code,
        });
    }
    examples
}

fn detect_language(class: &str) -> Option<&'static str> {
    const LANGUAGES: &[(&str, &str)] = &[
        ("javascript", "JavaScript"),
        ("typescript", "TypeScript"),
        ("python", "Python"),
        ("html", "HTML"),
        ("css", "CSS"),
        ("sql", "SQL"),
        ("java", "Java"),
        ("php", "PHP"),
        ("ruby", "Ruby"),
        ("rust", "Rust"),
        ("cpp", "C++"),
        ("csharp", "C#"),
        ("bash", "Bash"),
        ("shell", "Shell"),
        ("json", "JSON"),
        ("yaml", "YAML"),
        ("xml", "XML"),
        ("js", "JavaScript"),
        ("go", "Go"),
    ];
    LANGUAGES
        .iter()
        .find(|(needle, _)| class.contains(needle))
        .map(|(_, name)| *name)
}

/// Keep the first occurrence of each tag, drop empties.
pub fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_text_skips_chrome() {
        let html = Html::parse_document(
            r#"<html><body>
                <nav><p>Navigation paragraph that is long</p></nav>
                <h2>Selectors</h2>
                <p>Selectors pick the elements to style.</p>
                <p>short</p>
                <ul><li>class</li><li>id</li></ul>
                <table><tr><th>Name</th><th>Use</th></tr></table>
                <footer><p>Copyright footer text here</p></footer>
            </body></html>"#,
        );
        let body = select_doc(&html, "body")[0];
        let text = structured_text(body);
        assert!(text.starts_with("## Selectors"));
        assert!(text.contains("Selectors pick the elements to style."));
        assert!(!text.contains("short"));
        assert!(text.contains("• class\n• id"));
        assert!(text.contains("| Name | Use |"));
        assert!(!text.contains("Navigation"));
        assert!(!text.contains("Copyright"));
    }

    #[test]
    fn test_code_blocks_label_and_dedup() {
        let html = Html::parse_document(
            r#"<pre class="language-css">body { color: red; }</pre>
               <pre class="language-css">body { color: red; }</pre>
               <pre>tiny</pre>"#,
        );
        let blocks = code_blocks(&html, "pre");
        assert_eq!(blocks, vec!["CSS:\nbody { color: red; }".to_string()]);
    }

    #[test]
    fn test_meta_by_name_or_property() {
        let html = Html::parse_document(
            r#"<head><meta name="description" content=" Learn CSS ">
               <meta property="og:title" content="CSS Tutorial"></head>"#,
        );
        assert_eq!(meta(&html, "description").as_deref(), Some("Learn CSS"));
        assert_eq!(meta(&html, "og:title").as_deref(), Some("CSS Tutorial"));
        assert!(meta(&html, "author").is_none());
    }
}
