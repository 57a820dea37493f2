//! Page rendering.
//!
//! Handlers produce a template name plus JSON data; a [`ViewRenderer`] turns that into
//! HTML for browser flows. The bundled [`HtmlShell`] emits a plain document with the
//! navigation menu, the flash message and the escaped data, which is enough to drive the
//! API from a browser and to test page flows.

use super::session::{Flash, FlashKind};
use crate::config::roles::MenuItem;
use crate::core::access::SessionIdentity;
use crate::errors::{Error, Result};
use serde_json::Value;
use std::fmt::Write;

/// Everything a template sees.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    /// Template name, e.g. `dashboard/student`
    pub template: &'a str,
    pub identity: Option<&'a SessionIdentity>,
    /// Menu of the logged-in role; empty when anonymous
    pub menu: &'static [MenuItem],
    pub flash: Option<&'a Flash>,
    pub data: &'a Value,
}

/// Renders pages for non-API requests.
pub trait ViewRenderer: Send + Sync {
    /// Produces the HTML body for `page`.
    fn render(&self, page: &PageContext<'_>) -> Result<String>;
}

/// Minimal built-in renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlShell;

/// Escapes text for HTML element content and attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl ViewRenderer for HtmlShell {
    fn render(&self, page: &PageContext<'_>) -> Result<String> {
        let template = escape_html(page.template);
        let data = serde_json::to_string_pretty(page.data).map_err(|e| Error::Internal {
            message: format!("page data: {e}"),
        })?;

        let mut html = String::new();
        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{template}</title></head>\n<body data-template=\"{template}\">\n"
        );
        if let Some(identity) = page.identity {
            let _ = writeln!(
                html,
                "<header>Signed in as {} ({})</header>",
                escape_html(&identity.display_name),
                escape_html(&identity.role_name)
            );
        }
        if !page.menu.is_empty() {
            html.push_str("<nav><ul>\n");
            for item in page.menu {
                let _ = writeln!(
                    html,
                    "<li><a href=\"{}\">{}</a></li>",
                    escape_html(item.url),
                    escape_html(item.label)
                );
            }
            html.push_str("</ul></nav>\n");
        }
        if let Some(flash) = page.flash {
            let kind = match flash.kind {
                FlashKind::Success => "success",
                FlashKind::Error => "error",
            };
            let _ = writeln!(
                html,
                "<div class=\"flash flash-{kind}\">{}</div>",
                escape_html(&flash.message)
            );
        }
        let _ = write!(
            html,
            "<main><pre id=\"page-data\">{}</pre></main>\n</body>\n</html>\n",
            escape_html(&data)
        );
        Ok(html)
    }
}
