//! `{{node.output}}` references into the run context.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use taskflow_core::error::NodeError;
use taskflow_core::executor::ContextView;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+)\s*\}\}")
            .expect("placeholder pattern is valid")
    })
}

/// Replace every placeholder with the referenced value. Unknown keys are a
/// `MissingInput` error.
pub fn render(text: &str, view: &ContextView) -> Result<String, NodeError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for cap in placeholder().captures_iter(text) {
        let (Some(whole), Some(key)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let value = view
            .get(key.as_str())
            .ok_or_else(|| NodeError::MissingInput(key.as_str().to_string()))?;
        out.push_str(&text[last..whole.start()]);
        out.push_str(&value_to_text(value));
        last = whole.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// A string that is exactly one placeholder resolves to the referenced value;
/// anything else is a literal.
pub fn resolve_operand(operand: &Value, view: &ContextView) -> Result<Value, NodeError> {
    let Value::String(s) = operand else {
        return Ok(operand.clone());
    };
    match placeholder().captures(s.trim()) {
        Some(cap) if cap.get(0).map(|m| m.as_str()) == Some(s.trim()) => view
            .get(&cap[1])
            .cloned()
            .ok_or_else(|| NodeError::MissingInput(cap[1].to_string())),
        _ => Ok(operand.clone()),
    }
}

pub fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn view() -> ContextView {
        let mut map = BTreeMap::new();
        map.insert("doc.text".to_string(), json!("hello"));
        map.insert("count.n".to_string(), json!(3));
        ContextView::from(map)
    }

    #[test]
    fn test_render_substitutes_values() {
        let out = render("Say {{doc.text}} {{ count.n }} times", &view()).unwrap();
        assert_eq!(out, "Say hello 3 times");
    }

    #[test]
    fn test_render_missing_reference() {
        let err = render("{{doc.text}} and {{ghost.out}}", &view()).unwrap_err();
        assert_eq!(err, NodeError::MissingInput("ghost.out".into()));
    }

    #[test]
    fn test_resolve_operand() {
        assert_eq!(resolve_operand(&json!("{{count.n}}"), &view()).unwrap(), json!(3));
        assert_eq!(
            resolve_operand(&json!("n is {{count.n}}"), &view()).unwrap(),
            json!("n is {{count.n}}")
        );
        assert_eq!(resolve_operand(&json!(7), &view()).unwrap(), json!(7));
    }
}
