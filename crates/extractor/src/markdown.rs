use htmd::HtmlToMarkdown;

/// Normalizes chrome-stripped region HTML to Markdown: headings, paragraphs,
/// lists, inline/fenced code (language hint from `class="language-*"`),
/// tables, blockquotes, images, and links are preserved; style/data-*/JS
/// attribute noise is dropped by the converter itself.
pub fn to_markdown(region_html: &str) -> String {
    HtmlToMarkdown::builder()
        .build()
        .convert(region_html)
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_heading_and_paragraph() {
        let html = "<h1>Title</h1><p>Hello <strong>world</strong></p>";
        let md = to_markdown(html);
        assert!(md.contains("# Title"));
        assert!(md.contains("Hello"));
    }

    #[test]
    fn converts_list() {
        let html = "<ul><li>one</li><li>two</li></ul>";
        let md = to_markdown(html);
        assert!(md.contains("one"));
        assert!(md.contains("two"));
    }

    #[test]
    fn converts_fenced_code_block() {
        let html = "<pre><code class=\"language-rust\">fn main() {}</code></pre>";
        let md = to_markdown(html);
        assert!(md.contains("fn main()"));
    }
}
