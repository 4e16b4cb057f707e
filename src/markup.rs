//! Rendering of the legacy structured content document (block editor JSON)
//! into the destination markup string.
//!
//! Treated as a pure function by the pipeline: document in, HTML out.
//! Unknown block types are dropped rather than failing the record.

use serde_json::Value;

/// Render a structured document (`{"blocks": [...]}`) to HTML.
pub fn render(doc: &Value) -> String {
    let Some(blocks) = doc.get("blocks").and_then(|b| b.as_array()) else {
        return String::new();
    };
    let mut out = String::new();
    for block in blocks {
        let kind = block.get("type").and_then(|t| t.as_str()).unwrap_or("");
        let data = block.get("data").cloned().unwrap_or(Value::Null);
        match kind {
            "paragraph" => {
                if let Some(text) = data.get("text").and_then(|t| t.as_str()) {
                    out.push_str(&format!("<p class=\"paragraph\">{text}</p>"));
                }
            }
            "header" | "heading" => {
                let level = data
                    .get("level")
                    .and_then(|l| l.as_u64())
                    .unwrap_or(2)
                    .clamp(1, 6);
                if let Some(text) = data.get("text").and_then(|t| t.as_str()) {
                    out.push_str(&format!("<h{level}>{text}</h{level}>"));
                }
            }
            "image" => {
                let url = data
                    .get("file")
                    .and_then(|f| f.get("url"))
                    .or_else(|| data.get("url"))
                    .and_then(|u| u.as_str())
                    .unwrap_or("");
                if !url.is_empty() {
                    let caption = data.get("caption").and_then(|c| c.as_str()).unwrap_or("");
                    out.push_str(&format!(
                        "<figure class=\"image\"><img class=\"img\" src=\"{url}\"/><figcaption class=\"figcaption\">{caption}</figcaption></figure>"
                    ));
                }
            }
            "quote" => {
                if let Some(text) = data.get("text").and_then(|t| t.as_str()) {
                    out.push_str(&format!("<blockquote>{text}</blockquote>"));
                }
            }
            "list" => {
                if let Some(items) = data.get("items").and_then(|i| i.as_array()) {
                    let ordered = data.get("style").and_then(|s| s.as_str()) == Some("ordered");
                    let tag = if ordered { "ol" } else { "ul" };
                    out.push_str(&format!("<{tag}>"));
                    for item in items {
                        if let Some(text) = item.as_str() {
                            out.push_str(&format!("<li>{text}</li>"));
                        }
                    }
                    out.push_str(&format!("</{tag}>"));
                }
            }
            "code" => {
                if let Some(code) = data.get("code").and_then(|c| c.as_str()) {
                    out.push_str(&format!("<pre class=\"code-block\">{code}</pre>"));
                }
            }
            "embed" => {
                if let Some(embed) = data.get("embed").and_then(|e| e.as_str()) {
                    out.push_str(&format!("<iframe src=\"{embed}\"></iframe>"));
                }
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_paragraphs_and_headings() {
        let doc = json!({"blocks": [
            {"type": "header", "data": {"level": 3, "text": "Ara Başlık"}},
            {"type": "paragraph", "data": {"text": "Metin."}},
        ]});
        assert_eq!(
            render(&doc),
            "<h3>Ara Başlık</h3><p class=\"paragraph\">Metin.</p>"
        );
    }

    #[test]
    fn unknown_blocks_are_dropped() {
        let doc = json!({"blocks": [
            {"type": "poll", "data": {"question": "?"}},
            {"type": "paragraph", "data": {"text": "kaldı"}},
        ]});
        assert_eq!(render(&doc), "<p class=\"paragraph\">kaldı</p>");
    }

    #[test]
    fn missing_blocks_yield_empty_markup() {
        assert_eq!(render(&json!({})), "");
    }
}
