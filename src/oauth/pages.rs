//! Human-readable pages for the browser-facing endpoints.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

/// A browser-facing failure, rendered as an HTML page instead of JSON.
#[derive(Debug)]
pub struct ErrorPage {
    status: StatusCode,
    error: &'static str,
    description: String,
}

impl ErrorPage {
    /// OAuth error code shown on the page
    #[must_use]
    pub fn error(&self) -> &'static str {
        self.error
    }
}

impl From<crate::Error> for ErrorPage {
    fn from(err: crate::Error) -> Self {
        let status = err.status();
        if status.is_server_error() {
            tracing::error!(error = %err, "Interactive request failed");
        }
        Self {
            status,
            error: err.oauth_code(),
            description: err.public_description(),
        }
    }
}

impl IntoResponse for ErrorPage {
    fn into_response(self) -> Response {
        (
            self.status,
            [("cache-control", "no-store")],
            Html(error_page(self.error, &self.description)),
        )
            .into_response()
    }
}

/// Escape text for inclusion in HTML.
fn escape(text: &str) -> String {
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

fn error_page(error: &str, description: &str) -> String {
    let error = escape(error);
    let description = escape(description);
    format!(r#"<!DOCTYPE html>
<html>
<head>
    <title>Authorization Failed</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: #f4f4f6;
            color: #222;
        }}
        .container {{
            text-align: center;
            padding: 2rem;
            background: white;
            border-radius: 12px;
            max-width: 420px;
        }}
        h1 {{ margin: 0 0 0.5rem 0; }}
        p {{ margin: 0; opacity: 0.9; }}
        .error-code {{ font-family: monospace; margin-top: 1rem; opacity: 0.7; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Authorization Failed</h1>
        <p>{description}</p>
        <p class="error-code">Error: {error}</p>
    </div>
</body>
</html>"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_escapes_markup() {
        let html = error_page("invalid_request", "<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn page_from_error_keeps_taxonomy_code() {
        let page = ErrorPage::from(crate::Error::invalid_request("missing client_id"));
        assert_eq!(page.error(), "invalid_request");
        assert_eq!(page.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
