//! Markup tables for the text based report formats.

use std::borrow::Cow;

/// Text placed around each part of a report.
///
/// Every part is written as `open`, the escaped message, `close` and a line
/// break.
#[derive(Debug, Clone, Copy)]
pub struct Markup {
    pub begin: &'static str,
    pub begin_end: &'static str,
    pub new_file: &'static str,
    pub new_file_end: &'static str,
    pub module: &'static str,
    pub module_end: &'static str,
    pub method: &'static str,
    pub method_end: &'static str,
    pub complexity: &'static str,
    pub complexity_end: &'static str,
    pub taints_list: &'static str,
    pub taints_list_end: &'static str,
    pub taints_list_after: &'static str,
    pub new_taint: &'static str,
    pub new_taint_end: &'static str,
    pub taint: &'static str,
    pub taint_end: &'static str,
    pub taint_messages: &'static str,
    pub taint_messages_end: &'static str,
    pub sinks_list: &'static str,
    pub sinks_list_end: &'static str,
    pub sinks_list_after: &'static str,
    pub new_sink: &'static str,
    pub new_sink_end: &'static str,
    pub sink: &'static str,
    pub sink_end: &'static str,
    pub sink_messages: &'static str,
    pub sink_messages_end: &'static str,
    pub nothing_found: &'static str,
    pub nothing_found_end: &'static str,
    pub end: &'static str,
    pub end_end: &'static str,
    /// Escapes messages for the target format.
    pub escape: fn(&str) -> Cow<'_, str>,
}

const fn verbatim(text: &str) -> Cow<'_, str> {
    Cow::Borrowed(text)
}

/// Escapes `&`, `<`, `>`, `"` and `'`.
#[must_use]
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

pub const PLAINTEXT: Markup = Markup {
    begin: "",
    begin_end: "",
    new_file: "",
    new_file_end: "",
    module: "",
    module_end: "",
    method: "",
    method_end: "",
    complexity: "",
    complexity_end: "",
    taints_list: "\n",
    taints_list_end: "",
    taints_list_after: "",
    new_taint: "",
    new_taint_end: "",
    taint: "",
    taint_end: "",
    taint_messages: "",
    taint_messages_end: "",
    sinks_list: "\n",
    sinks_list_end: "",
    sinks_list_after: "",
    new_sink: "",
    new_sink_end: "",
    sink: "",
    sink_end: "",
    sink_messages: "",
    sink_messages_end: "",
    nothing_found: "",
    nothing_found_end: "",
    end: "\n",
    end_end: "",
    escape: verbatim,
};

pub const MARKDOWN: Markup = Markup {
    begin: "# ",
    new_file: "## ",
    method: "\n### ",
    taint: "- ",
    taint_messages: "  ",
    sink: "- ",
    sink_messages: "  ",
    nothing_found: "/",
    nothing_found_end: "/",
    end: "*",
    end_end: "*",
    ..PLAINTEXT
};

pub const HTML: Markup = Markup {
    begin: r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>TAINTalyzing report</title>
    <link rel="stylesheet" href="style.css">
</head>
<body>
    <h1 id="begin">"#,
    begin_end: "</h1>",
    new_file: r#"    <h2 class="new-file">"#,
    new_file_end: "</h2>",
    module: r#"    <p class="module">"#,
    module_end: "</p>",
    method: r#"    <h3 class="method">"#,
    method_end: "</h3>",
    complexity: r#"    <p class="complexity">"#,
    complexity_end: "</p>",
    taints_list: "    <div class=\"taints\">\n        <p>",
    taints_list_end: "</p>\n        <ul>",
    taints_list_after: "        </ul>\n    </div>",
    new_taint: r#"            <li class="taint">"#,
    new_taint_end: "\n            </li>",
    taint: "",
    taint_end: "",
    taint_messages: "",
    taint_messages_end: "<br>",
    sinks_list: "    <div class=\"sinks\">\n        <p>",
    sinks_list_end: "</p>\n        <ul>",
    sinks_list_after: "        </ul>\n    </div>",
    new_sink: r#"            <li class="sink">"#,
    new_sink_end: "\n            </li>",
    sink: "",
    sink_end: "",
    sink_messages: "",
    sink_messages_end: "<br>",
    nothing_found: r#"    <p id="nothing-found">"#,
    nothing_found_end: "</p>",
    end: r#"    <strong class="end">"#,
    end_end: "</strong>\n    <script src=\"customize.js\"></script>\n</body>\n</html>",
    escape: escape_html,
};
