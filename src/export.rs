use crate::memory::Message;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Writes a rendered transcript; the format follows the file extension
/// (`json`, `html`, anything else is markdown).
pub fn save(path: &Path, messages: &[Message]) -> Result<()> {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let text = match ext {
        "json" => to_json(messages)?,
        "html" => to_html(messages),
        _ => to_md(messages),
    };
    fs::write(path, text).with_context(|| format!("writing export to {}", path.display()))
}

fn to_json(messages: &[Message]) -> Result<String> {
    Ok(serde_json::to_string_pretty(messages)?)
}

fn to_md(messages: &[Message]) -> String {
    let mut out = String::new();
    for m in messages {
        out.push_str(&format!("### {}\n\n{}\n\n", m.role, m.content));
    }
    out
}

fn to_html(messages: &[Message]) -> String {
    let mut out = String::from(
        "<html><head><meta charset=\"utf-8\"><title>ollama-chat export</title></head><body>\n",
    );
    for m in messages {
        out.push_str(&format!(
            "<h3>{}</h3>\n<pre>{}</pre>\n",
            html_escape::encode_text(m.role.as_str()),
            html_escape::encode_text(&m.content)
        ));
    }
    out.push_str("</body></html>\n");
    out
}
