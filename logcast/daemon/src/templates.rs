//! HTML pages served to viewers
//!
//! The viewer page opens a WebSocket back to the daemon and appends every
//! binary message it receives to a `<pre>` block.

use logcast_core::Identity;

/// Values substituted into the viewer page
#[derive(Debug, Clone)]
pub struct LogPage<'a> {
    /// Job whose output the page streams
    pub identity: &'a Identity,
    /// Route prefix the daemon is mounted under
    pub base_path: &'a str,
    /// Daemon version shown in the footer
    pub version: &'a str,
}

/// Escape text for inclusion in HTML element content or attribute values
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

/// Encode a string as a JavaScript literal safe to embed in `<script>`
fn js_string(raw: &str) -> String {
    serde_json::Value::String(raw.to_string())
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
}

/// Render the live viewer page
#[must_use]
pub fn render_log_page(page: &LogPage<'_>) -> String {
    let id = page.identity;
    let title = escape_html(&id.to_string());
    let repo = escape_html(&id.repository_full_name());
    let project = escape_html(id.project());
    let version = escape_html(page.version);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} - logcast</title>
<style>
body {{ margin: 0; background: #1e1e1e; color: #d4d4d4; font-family: sans-serif; }}
header {{ padding: 0.75rem 1rem; background: #2d2d2d; }}
header .status {{ float: right; color: #9e9e9e; }}
pre {{ margin: 0; padding: 1rem; font-family: monospace; white-space: pre-wrap; }}
footer {{ padding: 0.5rem 1rem; color: #6e6e6e; font-size: 0.8rem; }}
</style>
</head>
<body>
<header>
<span class="status" id="status">connecting</span>
<strong>{repo}</strong> #{number} &middot; {project}
</header>
<pre id="log"></pre>
<footer>logcast {version}</footer>
<script>
(function () {{
  const basePath = {base_path};
  const parts = [{org}, {repository}, {number_js}, {project_js}].map(encodeURIComponent);
  const scheme = window.location.protocol === "https:" ? "wss" : "ws";
  const url = scheme + "://" + window.location.host + basePath + "/jobs/" + parts.join("/") + "/ws";
  const log = document.getElementById("log");
  const status = document.getElementById("status");
  const decoder = new TextDecoder();
  const socket = new WebSocket(url);
  socket.binaryType = "arraybuffer";
  socket.onopen = function () {{ status.textContent = "live"; }};
  socket.onmessage = function (event) {{
    const atBottom = window.innerHeight + window.scrollY >= document.body.scrollHeight - 4;
    log.textContent += typeof event.data === "string" ? event.data : decoder.decode(event.data);
    if (atBottom) {{ window.scrollTo(0, document.body.scrollHeight); }}
  }};
  socket.onclose = function () {{ status.textContent = "disconnected"; }};
}})();
</script>
</body>
</html>
"#,
        number = id.request_number(),
        base_path = js_string(page.base_path),
        org = js_string(id.organization()),
        repository = js_string(id.repository()),
        number_js = js_string(&id.request_number().to_string()),
        project_js = js_string(id.project()),
    )
}

/// Render the page returned for an unknown project
#[must_use]
pub fn render_not_found(identity: &Identity) -> String {
    let what = escape_html(&identity.to_string());
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Not found - logcast</title>
</head>
<body>
<h1>Not found</h1>
<p>No project <code>{what}</code> has reported output.</p>
</body>
</html>
"#
    )
}
