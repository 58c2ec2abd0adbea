use serde_json::{Map, Value};

use crate::core::errors::RagError;
use crate::pipeline::classifier::MAX_TOPICS;
use crate::rag::normalize_topic;

pub const CONTEXT_PLACEHOLDER: &str = "{context}";

pub fn validate_config(config: &Value) -> Result<(), RagError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.provider", "provider")?;
        if let Some(provider) = llm.get("provider").and_then(|v| v.as_str()) {
            if provider != "openai" {
                return Err(RagError::Config(format!(
                    "Invalid config at 'llm.provider': unsupported provider '{}'",
                    provider
                )));
            }
        }
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_nonempty_string_field(llm, "llm.model", "model")?;
        validate_optional_nonempty_string_field(llm, "llm.embedding_model", "embedding_model")?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 3_600)?;
        validate_non_negative_number_field(llm, "llm.prompt_cost_per_1k", "prompt_cost_per_1k")?;
        validate_non_negative_number_field(
            llm,
            "llm.completion_cost_per_1k",
            "completion_cost_per_1k",
        )?;
        if let Some(value) = llm.get("api_key") {
            if !value.is_null() && value.as_str().is_none() {
                return Err(config_type_error("llm.api_key", "string"));
            }
        }
    }

    if let Some(checkpoint) = expect_optional_object(root, "checkpoint")? {
        validate_optional_nonempty_string_field(checkpoint, "checkpoint.path", "path")?;
    }

    if let Some(chunking) = expect_optional_object(root, "chunking")? {
        validate_u64_field(chunking, "chunking.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(
            chunking,
            "chunking.chunk_overlap",
            "chunk_overlap",
            0,
            1_000_000,
        )?;
        let size = chunking.get("chunk_size").and_then(|v| v.as_u64());
        let overlap = chunking.get("chunk_overlap").and_then(|v| v.as_u64());
        if let (Some(size), Some(overlap)) = (size, overlap) {
            if overlap >= size {
                return Err(RagError::Config(
                    "Invalid config at 'chunking.chunk_overlap': must be smaller than chunk_size"
                        .to_string(),
                ));
            }
        }
    }

    if let Some(branches) = expect_optional_object(root, "branches")? {
        for (branch_name, value) in branches {
            validate_branch(branch_name, value)?;
        }
    }

    Ok(())
}

fn validate_branch(branch_name: &str, value: &Value) -> Result<(), RagError> {
    let path_prefix = format!("branches.{}", branch_name);
    if branch_name.trim().is_empty() {
        return Err(RagError::Config(
            "Invalid config at 'branches': branch name cannot be empty".to_string(),
        ));
    }
    let entry = value
        .as_object()
        .ok_or_else(|| config_type_error(&path_prefix, "object"))?;

    validate_optional_string_field(entry, &format!("{}.label", path_prefix), "label")?;
    validate_optional_string_field(
        entry,
        &format!("{}.fallback_answer", path_prefix),
        "fallback_answer",
    )?;
    if let Some(fallback) = entry.get("fallback_answer").and_then(|v| v.as_str()) {
        if fallback.trim().is_empty() {
            return Err(RagError::Config(format!(
                "Invalid config at '{}.fallback_answer': value cannot be empty",
                path_prefix
            )));
        }
    }

    if let Some(prompt) = entry.get("system_prompt") {
        let Some(prompt) = prompt.as_str() else {
            return Err(config_type_error(
                &format!("{}.system_prompt", path_prefix),
                "string",
            ));
        };
        validate_prompt_template(&format!("{}.system_prompt", path_prefix), prompt)?;
    }

    if let Some(classifier) = entry.get("classifier") {
        match classifier.as_str() {
            Some("multi" | "sticky" | "single") => {}
            Some(other) => {
                return Err(RagError::Config(format!(
                    "Invalid config at '{}.classifier': expected 'multi', 'sticky' or 'single', got '{}'",
                    path_prefix, other
                )))
            }
            None => {
                return Err(config_type_error(
                    &format!("{}.classifier", path_prefix),
                    "string",
                ))
            }
        }
    }

    if let Some(value) = entry.get("summarize_history") {
        if !value.is_boolean() {
            return Err(config_type_error(
                &format!("{}.summarize_history", path_prefix),
                "boolean",
            ));
        }
    }

    validate_u64_field(
        entry,
        &format!("{}.history_window", path_prefix),
        "history_window",
        0,
        10_000,
    )?;
    validate_u64_field(
        entry,
        &format!("{}.retrieval_k", path_prefix),
        "retrieval_k",
        1,
        100,
    )?;

    if let Some(topics) = entry.get("topics") {
        let topics = topics
            .as_object()
            .ok_or_else(|| config_type_error(&format!("{}.topics", path_prefix), "object"))?;
        validate_topic_table(&format!("{}.topics", path_prefix), topics)?;

        let single = entry.get("classifier").and_then(|v| v.as_str()) == Some("single");
        if single && topics.len() > MAX_TOPICS {
            return Err(RagError::Config(format!(
                "Invalid config at '{}.topics': the 'single' classifier queries every topic and allows at most {}",
                path_prefix, MAX_TOPICS
            )));
        }
    }

    Ok(())
}

/// Topic keys must already be in normalized form and map to a store path.
pub fn validate_topic_table(path: &str, topics: &Map<String, Value>) -> Result<(), RagError> {
    for (topic, store) in topics {
        if topic.trim().is_empty() {
            return Err(RagError::Config(format!(
                "Invalid config at '{}': topic name cannot be empty",
                path
            )));
        }
        if normalize_topic(topic) != *topic {
            return Err(RagError::Config(format!(
                "Invalid config at '{}.{}': topic names must be lower case without surrounding whitespace",
                path, topic
            )));
        }
        if topic == "none" {
            return Err(RagError::Config(format!(
                "Invalid config at '{}.{}': 'none' is reserved",
                path, topic
            )));
        }
        let Some(store) = store.as_str() else {
            return Err(config_type_error(&format!("{}.{}", path, topic), "string"));
        };
        if store.trim().is_empty() {
            return Err(RagError::Config(format!(
                "Invalid config at '{}.{}': store path cannot be empty",
                path, topic
            )));
        }
    }
    Ok(())
}

pub fn validate_prompt_template(path: &str, template: &str) -> Result<(), RagError> {
    let count = template.matches(CONTEXT_PLACEHOLDER).count();
    if count != 1 {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': template must contain exactly one {} placeholder (found {})",
            path, CONTEXT_PLACEHOLDER, count
        )));
    }
    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, RagError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_non_negative_number_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    match value.as_f64() {
        Some(number) if number >= 0.0 => Ok(()),
        Some(_) => Err(RagError::Config(format!(
            "Invalid config at '{}': must not be negative",
            path
        ))),
        None => Err(config_type_error(path, "number")),
    }
}

fn validate_optional_nonempty_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> RagError {
    RagError::Config(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_prompt_without_context_placeholder() {
        let config = json!({
            "branches": { "main": { "system_prompt": "no placeholder here" } }
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("exactly one {context}"));
    }

    #[test]
    fn rejects_prompt_with_two_placeholders() {
        assert!(validate_prompt_template("p", "{context} and {context}").is_err());
        assert!(validate_prompt_template("p", "Answer from:\n{context}\n").is_ok());
    }

    #[test]
    fn rejects_non_normalized_topic_keys() {
        let config = json!({
            "branches": { "main": { "topics": { "BYU History": "stores/byu.db" } } }
        });
        assert!(validate_config(&config).is_err());

        let config = json!({
            "branches": { "main": { "topics": { " byu history": "stores/byu.db" } } }
        });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_reserved_and_empty_topics() {
        let config = json!({
            "branches": { "main": { "topics": { "none": "stores/none.db" } } }
        });
        assert!(validate_config(&config).is_err());

        let config = json!({
            "branches": { "main": { "topics": { "history": "" } } }
        });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_unknown_classifier_strategy() {
        let config = json!({
            "branches": { "main": { "classifier": "fuzzy" } }
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("classifier"));
    }

    #[test]
    fn single_strategy_is_limited_to_three_topics() {
        let topics = |n: usize| {
            (0..n)
                .map(|i| (format!("topic {}", i), json!(format!("stores/{}.db", i))))
                .collect::<Map<String, Value>>()
        };
        let config = json!({
            "branches": { "main": { "classifier": "single", "topics": topics(3) } }
        });
        validate_config(&config).unwrap();

        let config = json!({
            "branches": { "main": { "classifier": "single", "topics": topics(4) } }
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("single"));
    }

    #[test]
    fn summarize_history_must_be_boolean() {
        let config = json!({ "branches": { "main": { "summarize_history": "yes" } } });
        assert!(validate_config(&config).is_err());
        let config = json!({ "branches": { "main": { "summarize_history": true } } });
        validate_config(&config).unwrap();
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let config = json!({
            "chunking": { "chunk_size": 100, "chunk_overlap": 100 }
        });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_negative_prices_and_wrong_types() {
        assert!(validate_config(&json!({ "llm": { "prompt_cost_per_1k": -1.0 } })).is_err());
        assert!(validate_config(&json!({ "llm": { "timeout_secs": "fast" } })).is_err());
        assert!(validate_config(&json!({ "llm": { "provider": "anthropic" } })).is_err());
        assert!(validate_config(&json!({ "llm": { "api_key": 42 } })).is_err());
    }

    #[test]
    fn accepts_minimal_config() {
        validate_config(&json!({})).unwrap();
        validate_config(&json!({
            "llm": { "model": "gpt-4o-mini", "api_key": null },
            "branches": {
                "main": {
                    "history_window": 0,
                    "topics": { "karl g maeser": "stores/maeser.db" }
                }
            }
        }))
        .unwrap();
    }
}
