//! Per-turn context accumulation and rendering.

use super::store::RetrievedDocument;

/// Append a topic's retrieval results to the turn's buffer.
///
/// Order is preserved and duplicates are kept.
pub fn accumulate(existing: &mut Vec<RetrievedDocument>, new: Vec<RetrievedDocument>) {
    existing.extend(new);
}

/// Join document contents with blank lines for the `{context}` slot.
pub fn render_context(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|doc| doc.content.trim())
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn doc(content: &str) -> RetrievedDocument {
        RetrievedDocument::new(content, Value::Null)
    }

    #[test]
    fn accumulate_concatenates_in_order_with_duplicates() {
        let mut buffer = vec![doc("a")];
        accumulate(&mut buffer, vec![doc("b"), doc("a")]);
        accumulate(&mut buffer, Vec::new());

        let contents: Vec<&str> = buffer.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "a"]);
    }

    #[test]
    fn render_joins_with_blank_lines() {
        assert_eq!(render_context(&[]), "");
        assert_eq!(
            render_context(&[doc("first\n"), doc("   "), doc("second")]),
            "first\n\nsecond"
        );
    }
}
