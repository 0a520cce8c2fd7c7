use std::sync::LazyLock;

use dom_smoothie::Readability;
use regex::Regex;

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").unwrap_or_else(|_| unreachable!()));

/// Convert an HTML document or fragment to plain text. Readability
/// extraction first; a plain tag stripper covers fragments readability
/// rejects or hollows out.
pub fn html_to_text(html: &str) -> String {
    let extracted = Readability::new(html.to_string(), None, None)
        .ok()
        .and_then(|mut readability| readability.parse().ok())
        .map(|article| article.text_content.trim().to_string())
        .filter(|text| !text.is_empty());

    let text = extracted.unwrap_or_else(|| strip_tags(html));
    EXCESS_NEWLINES.replace_all(&text, "\n\n").trim().to_string()
}

/// Inner HTML of the `<main>` region, when present.
pub fn extract_main_region(html: &str) -> Option<String> {
    let lower = html.to_lowercase();
    let open = lower.find("<main")?;
    let content_start = html[open..].find('>').map(|offset| open + offset + 1)?;
    let close = lower[content_start..]
        .find("</main>")
        .map(|offset| content_start + offset)?;

    Some(html[content_start..close].to_string())
}

/// Minimal tag stripper: skips script/style bodies, breaks on block tags.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len() / 2);
    let mut rest = html;
    let mut skip_until: Option<&str> = None;

    while let Some(open) = rest.find('<') {
        if skip_until.is_none() {
            text.push_str(&rest[..open]);
        }
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        let tag_body = &rest[open + 1..open + close];
        let tag_name = tag_body
            .trim_start_matches('/')
            .split([' ', '\t', '\n', '/'])
            .next()
            .unwrap_or_default()
            .to_lowercase();

        match skip_until {
            Some(terminator) => {
                if tag_body.starts_with('/') && tag_name == terminator {
                    skip_until = None;
                }
            }
            None => match tag_name.as_str() {
                "script" => skip_until = Some("script"),
                "style" => skip_until = Some("style"),
                "p" | "div" | "br" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "tr" => {
                    text.push('\n');
                }
                _ => {}
            },
        }

        rest = &rest[open + close + 1..];
    }
    if skip_until.is_none() {
        text.push_str(rest);
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    EXCESS_NEWLINES
        .replace_all(&decoded, "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_drops_script_and_style() {
        let html = "<p>Hello</p><script>var x = 1;</script><style>p{}</style><p>World</p>";
        let text = strip_tags(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("p{}"));
    }

    #[test]
    fn strip_tags_breaks_on_block_tags() {
        let html = "<h1>Title</h1><p>First</p><p>Second</p>";
        let text = strip_tags(html);
        assert!(text.contains("Title"));
        let title_pos = text.find("Title").unwrap();
        let first_pos = text.find("First").unwrap();
        assert!(title_pos < first_pos);
        assert!(text[title_pos..first_pos].contains('\n'));
    }

    #[test]
    fn strip_tags_decodes_common_entities() {
        assert_eq!(strip_tags("a &amp; b"), "a & b");
        assert_eq!(strip_tags("1 &lt; 2"), "1 < 2");
    }

    #[test]
    fn extract_main_region_finds_inner_html() {
        let html = "<html><body><nav>menu</nav><main class=\"site\"><p>Body</p></main></body></html>";
        let main = extract_main_region(html).expect("main region");
        assert_eq!(main, "<p>Body</p>");
    }

    #[test]
    fn extract_main_region_missing_returns_none() {
        assert!(extract_main_region("<html><body>no main</body></html>").is_none());
    }

    #[test]
    fn html_to_text_handles_plain_fragments() {
        let text = html_to_text("<p>QGIS is a GIS.</p>");
        assert!(text.contains("QGIS is a GIS."));
    }

    #[test]
    fn html_to_text_collapses_newline_runs() {
        let text = html_to_text("<p>a</p><br><br><br><p>b</p>");
        assert!(!text.contains("\n\n\n"));
    }
}
