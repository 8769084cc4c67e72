/// Page shell for the dashboard. `{{TOKEN}}` placeholders are filled by
/// `render_page`; anything left over is blanked.
const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{TITLE}} · captcha-trainer</title>
<style>
body { font-family: system-ui, sans-serif; margin: 2rem; color: #222; }
table { border-collapse: collapse; }
th, td { padding: .3rem .8rem; border-bottom: 1px solid #ddd; text-align: right; }
th:first-child, td:first-child { text-align: left; }
.status-running { color: #b60; } .status-completed { color: #070; }
.status-stopped_early { color: #057; } .status-interrupted { color: #a00; }
.status-failed { color: #a00; font-weight: bold; }
pre { background: #f5f5f5; padding: .5rem; max-height: 20rem; overflow: auto; }
</style>
</head>
<body>
<h1>{{TITLE}}</h1>
{{BODY}}
{{SCRIPT}}
</body>
</html>
"#;

pub fn render_page(title: &str, body: &str, script: Option<&str>) -> String {
    let html = TEMPLATE
        .replace("{{TITLE}}", &html_escape(title))
        .replace("{{BODY}}", body)
        .replace("{{SCRIPT}}", &script.map(|s| format!("<script>{}</script>", s)).unwrap_or_default());
    blank_remaining(html)
}

/// Replaces any `{{TOKEN}}` that was not substituted with an empty string.
fn blank_remaining(mut html: String) -> String {
    while let Some(start) = html.find("{{") {
        if let Some(end) = html[start..].find("}}") {
            html.replace_range(start..start + end + 2, "");
        } else {
            break;
        }
    }
    html
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_escaped_and_tokens_blanked() {
        let html = render_page("<runs>", "<p>x</p>", None);
        assert!(html.contains("<h1>&lt;runs&gt;</h1>"));
        assert!(html.contains("<p>x</p>"));
        assert!(!html.contains("{{"));
    }
}
