use serde_json::{Map, Value};

/// Substitutes `{{name}}` placeholders in action-box text. The resolver
/// decides what each token means; unclosed or empty placeholders are
/// config errors.
pub fn render_placeholders<F>(template: &str, mut resolve: F) -> Result<String, String>
where
    F: FnMut(&str) -> Result<String, String>,
{
    let mut rendered = String::new();
    let mut cursor = template;

    while let Some(start) = cursor.find("{{") {
        rendered.push_str(&cursor[..start]);
        let after_open = &cursor[start + 2..];
        let Some(close_offset) = after_open.find("}}") else {
            return Err("unclosed placeholder in template".to_string());
        };
        let token = after_open[..close_offset].trim();
        if token.is_empty() {
            return Err("empty placeholder in template".to_string());
        }
        rendered.push_str(&resolve(token)?);
        cursor = &after_open[close_offset + 2..];
    }

    rendered.push_str(cursor);
    Ok(rendered)
}

pub fn render_with_values(template: &str, values: &Map<String, Value>) -> Result<String, String> {
    render_placeholders(template, |token| {
        let value = values
            .get(token)
            .ok_or_else(|| format!("unknown placeholder `{token}`"))?;
        value_text(value)
    })
}

fn value_text(value: &Value) -> Result<String, String> {
    if let Some(text) = value.as_str() {
        return Ok(text.to_string());
    }
    serde_json::to_string(value).map_err(|err| format!("failed to render placeholder value: {err}"))
}
