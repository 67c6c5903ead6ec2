use chrono::{Datelike, Utc};

const BASE_STYLES: &str = r#"
        :root { color-scheme: light; }
        body { font-family: "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; }
        header { background: #ffffff; padding: 1.5rem; border-bottom: 1px solid #e2e8f0; }
        .header-bar { display: flex; justify-content: space-between; align-items: center; flex-wrap: wrap; gap: 1rem; }
        .header-bar h1 { margin: 0; font-size: 1.5rem; }
        nav { display: flex; gap: 0.5rem; flex-wrap: wrap; align-items: center; }
        nav a { color: #1d4ed8; text-decoration: none; font-weight: 600; background: #e0f2fe; padding: 0.45rem 0.9rem; border-radius: 999px; border: 1px solid #bfdbfe; }
        nav a:hover { background: #bfdbfe; }
        nav form { margin: 0; }
        nav button { padding: 0.45rem 0.9rem; border-radius: 999px; background: #fee2e2; color: #0f172a; border: 1px solid #fecaca; }
        main { padding: 2rem 1.5rem; max-width: 960px; margin: 0 auto; box-sizing: border-box; }
        .panel { background: #ffffff; border-radius: 12px; border: 1px solid #e2e8f0; padding: 1.5rem; box-shadow: 0 18px 40px rgba(15, 23, 42, 0.08); margin-bottom: 2rem; }
        .panel h2 { margin-top: 0; }
        label { display: block; margin: 1rem 0 0.5rem; font-weight: 600; }
        textarea, input[type="url"], input[type="text"], input[type="password"], select { width: 100%; padding: 0.75rem; border-radius: 8px; border: 1px solid #cbd5f5; background: #f8fafc; color: #0f172a; box-sizing: border-box; font-size: 1rem; }
        textarea { min-height: 14rem; }
        button { margin-top: 1.25rem; padding: 0.85rem 1.2rem; border: none; border-radius: 8px; background: #2563eb; color: #ffffff; font-weight: 600; cursor: pointer; }
        button:hover { background: #1d4ed8; }
        table { width: 100%; border-collapse: collapse; background: #ffffff; }
        th, td { padding: 0.65rem 0.85rem; border: 1px solid #e2e8f0; text-align: left; vertical-align: top; font-size: 0.92rem; }
        th { background: #f1f5f9; }
        .note { color: #475569; font-size: 0.95rem; line-height: 1.6; }
        .status-box { margin-top: 1rem; padding: 1rem; border-radius: 12px; background: #f1f5f9; white-space: pre-wrap; }
        .status-box.error { color: #b91c1c; background: #fef2f2; }
        .status-box.success { color: #166534; }
        .status-tag { display: inline-flex; padding: 0.2rem 0.7rem; border-radius: 999px; font-size: 0.85rem; font-weight: 600; }
        .status-tag.success { background: #dcfce7; color: #166534; }
        .status-tag.failed { background: #fee2e2; color: #b91c1c; }
        .app-footer { margin-top: 3rem; text-align: center; font-size: 0.85rem; color: #94a3b8; }
"#;

const NAV_LINKS: &[(&str, &str)] = &[
    ("/", "Dashboard"),
    ("/text", "Text"),
    ("/url", "URL"),
    ("/upload", "File"),
    ("/batch", "Batch"),
    ("/history", "History"),
];

pub struct PageLayout<'a> {
    pub meta_title: &'a str,
    pub page_heading: &'a str,
    pub username: &'a str,
    pub body_html: String,
}

pub fn render_page(layout: PageLayout<'_>) -> String {
    let PageLayout {
        meta_title,
        page_heading,
        username,
        body_html,
    } = layout;

    let nav_links = NAV_LINKS
        .iter()
        .map(|(href, label)| format!(r#"<a href="{href}">{label}</a>"#))
        .collect::<String>();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{meta_title}</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="robots" content="noindex,nofollow">
    <style>
{styles}
    </style>
</head>
<body>
    <header>
        <div class="header-bar">
            <h1>{page_heading}</h1>
            <nav>
                {nav_links}
                <form method="post" action="/logout"><button type="submit">Sign out {user}</button></form>
            </nav>
        </div>
    </header>
    <main>
{body_html}
        {footer}
    </main>
</body>
</html>"#,
        meta_title = escape_html(meta_title),
        page_heading = escape_html(page_heading),
        styles = BASE_STYLES,
        user = escape_html(username),
        footer = render_footer(),
    )
}

pub fn render_login_page(error: Option<&str>) -> String {
    let error_html = error
        .map(|message| format!(r#"<div class="status-box error">{}</div>"#, escape_html(message)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Document Summarizer</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="robots" content="noindex,nofollow">
    <style>
{styles}
        .login {{ max-width: 440px; margin: 4rem auto; }}
    </style>
</head>
<body>
    <main>
        <section class="panel login">
            <h1>Document Summarizer</h1>
            <p class="note">Sign in to summarize text, web pages and documents.</p>
            {error_html}
            <form method="post" action="/login">
                <label for="username">Username</label>
                <input id="username" type="text" name="username" required>
                <label for="password">Password</label>
                <input id="password" type="password" name="password" required>
                <button type="submit">Sign in</button>
            </form>
        </section>
        {footer}
    </main>
</body>
</html>"#,
        styles = BASE_STYLES,
        footer = render_footer(),
    )
}

pub fn render_footer() -> String {
    format!(
        r#"<footer class="app-footer">© {year} Document Summarizer</footer>"#,
        year = Utc::now().year()
    )
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
