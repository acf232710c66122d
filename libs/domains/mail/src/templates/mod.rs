//! Template rendering.
//!
//! Handlebars-based rendering of a template's subject and body with the
//! job data. Rendering is strict: a placeholder missing from the data is an
//! error, never empty text.

use crate::error::{MailError, MailResult};
use crate::models::RenderedMessage;
use handlebars::Handlebars;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Placeholder a layout uses for the rendered body.
pub const LAYOUT_CONTENT_KEY: &str = "content";

/// Renders template subject/body pairs.
///
/// Implementations hold no per-call state and are shared across jobs.
pub trait TemplateRenderer: Send + Sync {
    /// Render subject and body with `data`.
    fn render(&self, subject: &str, body: &str, data: &Map<String, Value>) -> MailResult<RenderedMessage>;

    /// Render the body, then wrap it in `layout` through its `{{{content}}}`
    /// placeholder. The layout sees the same data as the body.
    fn render_with_layout(
        &self,
        layout: &str,
        subject: &str,
        body: &str,
        data: &Map<String, Value>,
    ) -> MailResult<RenderedMessage>;
}

/// Handlebars renderer.
///
/// Bodies are HTML-escaped, subjects are not.
#[derive(Clone)]
pub struct HandlebarsRenderer {
    subject: Arc<Handlebars<'static>>,
    body: Arc<Handlebars<'static>>,
}

impl HandlebarsRenderer {
    pub fn new() -> Self {
        let mut subject = Handlebars::new();
        subject.set_strict_mode(true);
        subject.register_escape_fn(handlebars::no_escape);

        let mut body = Handlebars::new();
        body.set_strict_mode(true);

        Self {
            subject: Arc::new(subject),
            body: Arc::new(body),
        }
    }

    /// Like [`TemplateRenderer::render_with_layout`], reading the layout from a file.
    pub fn render_layout_file(
        &self,
        layout_path: impl AsRef<Path>,
        subject: &str,
        body: &str,
        data: &Map<String, Value>,
    ) -> MailResult<RenderedMessage> {
        let path = layout_path.as_ref();
        let layout = std::fs::read_to_string(path)
            .map_err(|e| MailError::Render(format!("Failed to read layout {}: {}", path.display(), e)))?;
        self.render_with_layout(&layout, subject, body, data)
    }
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, subject: &str, body: &str, data: &Map<String, Value>) -> MailResult<RenderedMessage> {
        debug!(keys = data.len(), "Rendering mail template");

        Ok(RenderedMessage {
            subject: self.subject.render_template(subject, data)?,
            body: self.body.render_template(body, data)?,
        })
    }

    fn render_with_layout(
        &self,
        layout: &str,
        subject: &str,
        body: &str,
        data: &Map<String, Value>,
    ) -> MailResult<RenderedMessage> {
        let inner = self.render(subject, body, data)?;

        let mut layout_data = data.clone();
        layout_data.insert(LAYOUT_CONTENT_KEY.to_string(), Value::String(inner.body));

        Ok(RenderedMessage {
            subject: inner.subject,
            body: self.body.render_template(layout, &layout_data)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_render_substitutes_subject_and_body() {
        let renderer = HandlebarsRenderer::new();
        let rendered = renderer
            .render("Hi {{name}}", "Hello {{name}}!", &data(json!({ "name": "Ann" })))
            .unwrap();

        assert_eq!(rendered.subject, "Hi Ann");
        assert_eq!(rendered.body, "Hello Ann!");
    }

    #[test]
    fn test_missing_placeholder_is_render_error() {
        let renderer = HandlebarsRenderer::new();
        let err = renderer
            .render("Hi {{name}}", "Order {{order_id}}", &data(json!({ "name": "Ann" })))
            .unwrap_err();

        assert!(matches!(err, MailError::Render(_)));
    }

    #[test]
    fn test_malformed_syntax_is_render_error() {
        let renderer = HandlebarsRenderer::new();
        let err = renderer.render("Hi {{name", "body", &data(json!({ "name": "Ann" }))).unwrap_err();

        assert!(matches!(err, MailError::Render(_)));
    }

    #[test]
    fn test_subject_is_not_html_escaped() {
        let renderer = HandlebarsRenderer::new();
        let rendered = renderer
            .render("{{company}} news", "<p>{{company}}</p>", &data(json!({ "company": "A & B" })))
            .unwrap();

        assert_eq!(rendered.subject, "A & B news");
        assert_eq!(rendered.body, "<p>A &amp; B</p>");
    }

    #[test]
    fn test_render_with_layout_wraps_body() {
        let renderer = HandlebarsRenderer::new();
        let rendered = renderer
            .render_with_layout(
                "<html><h1>{{brand}}</h1>{{{content}}}</html>",
                "Hi {{name}}",
                "<p>Hello {{name}}!</p>",
                &data(json!({ "name": "Ann", "brand": "Acme" })),
            )
            .unwrap();

        assert_eq!(rendered.subject, "Hi Ann");
        assert_eq!(rendered.body, "<html><h1>Acme</h1><p>Hello Ann!</p></html>");
    }

    #[test]
    fn test_layout_uses_same_strictness() {
        let renderer = HandlebarsRenderer::new();
        let err = renderer
            .render_with_layout("{{footer}}{{{content}}}", "s", "b", &Map::new())
            .unwrap_err();

        assert!(matches!(err, MailError::Render(_)));
    }

    #[test]
    fn test_render_layout_file() {
        let path = std::env::temp_dir().join(format!("mail-layout-{}.hbs", std::process::id()));
        std::fs::write(&path, "<div>{{{content}}}</div>").unwrap();

        let renderer = HandlebarsRenderer::new();
        let rendered = renderer
            .render_layout_file(&path, "s", "Hello {{name}}", &data(json!({ "name": "Ann" })))
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(rendered.body, "<div>Hello Ann</div>");
    }

    #[test]
    fn test_missing_layout_file_is_render_error() {
        let renderer = HandlebarsRenderer::new();
        let err = renderer
            .render_layout_file("/nonexistent/layout.hbs", "s", "b", &Map::new())
            .unwrap_err();

        assert!(matches!(err, MailError::Render(_)));
    }
}
