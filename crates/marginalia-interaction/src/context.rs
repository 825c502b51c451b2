//! Page context sent alongside each request.

use marginalia_core::host::{ContextOptions, ContextProvider, PageSnapshot};
use marginalia_core::session::Session;

/// Default extraction: page URL, title and selection, followed by body text
/// cut to `budget` characters when truncation is enabled.
pub fn default_context(page: &PageSnapshot, options: ContextOptions, budget: usize) -> String {
    let body = if options.truncate_context {
        truncate_chars(page.body_text.trim(), budget)
    } else {
        page.body_text.trim().to_string()
    };

    format!(
        "URL: {}\nTitle: {}\nSelection: {}\n\n{}",
        page.url, page.title, page.selection, body
    )
}

/// Asks the host provider first and falls back to [`default_context`] when
/// there is none or it fails.
pub fn resolve_context(
    provider: Option<&dyn ContextProvider>,
    session: &Session,
    page: &PageSnapshot,
    options: ContextOptions,
    budget: usize,
) -> String {
    if let Some(provider) = provider {
        match provider.provide(session, options) {
            Ok(context) => return context,
            Err(e) => {
                tracing::warn!("[Context] Provider failed, using default extraction: {}", e);
            }
        }
    }
    default_context(page, options, budget)
}

fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((byte_index, _)) => format!("{}…", &text[..byte_index]),
        None => text.to_string(),
    }
}
