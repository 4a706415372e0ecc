//! Rendering analysis results.
//!
//! A [`Report`] is built once from the finished analyses and can then be
//! rendered as plain text, Markdown, HTML or JSON. The three text formats
//! share one generator and differ only in their markup table.

mod markup;

use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{
    analysis::Analysis,
    domain::{Method, OriginKind, method::AppliedSanitizer},
    grammar::Span,
    storage::SourceFile,
};
use markup::Markup;

const STYLE: &str = include_str!("../assets/style.css");
const SCRIPT: &str = include_str!("../assets/customize.js");

/// Output format of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Plain text.
    Plaintext,
    /// Markdown.
    Markdown,
    /// A standalone HTML page.
    Html,
    /// Machine readable JSON.
    Json,
}

impl Format {
    /// Picks the format from the extension of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::UnknownFormat`] for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, ReportError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("txt") => Ok(Self::Plaintext),
            Some("md" | "markdown") => Ok(Self::Markdown),
            Some("htm" | "html") => Ok(Self::Html),
            Some("json") => Ok(Self::Json),
            _ => Err(ReportError::UnknownFormat(path.to_path_buf())),
        }
    }

    const fn markup(self) -> Option<&'static Markup> {
        match self {
            Self::Plaintext => Some(&markup::PLAINTEXT),
            Self::Markdown => Some(&markup::MARKDOWN),
            Self::Html => Some(&markup::HTML),
            Self::Json => None,
        }
    }
}

/// Errors that can occur while writing a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The output file has no known extension.
    #[error("unknown report format for {}, use .txt, .md, .html or .json", .0.display())]
    UnknownFormat(PathBuf),

    /// Writing a file failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// The file being written.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// Serializing to JSON failed.
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where a taint starts, by line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginReport {
    /// What kind of origin.
    pub kind: OriginKind,
    /// The source call or variable.
    pub name: String,
    /// Line of the origin.
    pub line: usize,
}

/// A taint as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaintReport {
    /// Line of the sink call.
    pub line: usize,
    /// The sink called.
    pub sink: String,
    /// The sink's comment.
    pub comment: String,
    /// Index of the tainted argument.
    pub argument: usize,
    /// Where the input comes from.
    pub origin: OriginReport,
    /// The sanitizer on the way, if any.
    pub sanitizer: Option<AppliedSanitizer>,
    /// Severity in percent.
    pub severity: usize,
}

/// A sink call without detected user input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    /// Line of the sink call.
    pub line: usize,
    /// The sink called.
    pub sink: String,
    /// The sink's comment.
    pub comment: String,
    /// Severity in percent.
    pub severity: usize,
}

/// A method worth reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodReport {
    /// Method name.
    pub name: String,
    /// The enclosing class, if any.
    pub class: Option<String>,
    /// First line of the definition.
    pub first_line: usize,
    /// Last line of the definition.
    pub last_line: usize,
    /// Cyclomatic complexity, when at or above the threshold.
    pub complexity: Option<usize>,
    /// Taints found.
    pub taints: Vec<TaintReport>,
    /// Sinks without user input.
    pub sinks: Vec<SinkReport>,
}

/// The results for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// The analysed file.
    pub path: PathBuf,
    /// The module it was analysed as.
    pub module: String,
    /// Methods worth reporting.
    pub methods: Vec<MethodReport>,
}

/// The results of a scan.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// When the report was created.
    pub created: DateTime<Local>,
    /// Complexity threshold used.
    pub complexity: usize,
    /// Maximum sanitizer indirection trusted.
    pub indirection: usize,
    /// One entry per analysed file.
    pub files: Vec<FileReport>,
}

impl Report {
    /// Collects the findings of `analyses`.
    ///
    /// A method is included when its complexity reaches `complexity` or when
    /// it has taints or sinks.
    #[must_use]
    pub fn new(analyses: &[Analysis], complexity: usize, indirection: usize) -> Self {
        let files = analyses
            .iter()
            .map(|analysis| FileReport {
                path: analysis.file().path().to_path_buf(),
                module: analysis.module().to_string(),
                methods: analysis
                    .methods()
                    .iter()
                    .filter_map(|method| {
                        method_report(analysis.file(), method, complexity, indirection)
                    })
                    .collect(),
            })
            .collect();
        Self {
            created: Local::now(),
            complexity,
            indirection,
            files,
        }
    }

    /// The number of taints across all files.
    #[must_use]
    pub fn taint_count(&self) -> usize {
        self.methods().map(|m| m.taints.len()).sum()
    }

    /// The number of sinks without user input across all files.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.methods().map(|m| m.sinks.len()).sum()
    }

    fn methods(&self) -> impl Iterator<Item = &MethodReport> {
        self.files.iter().flat_map(|file| &file.methods)
    }

    /// Renders the report.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Json`] if JSON serialization fails.
    pub fn render(&self, format: Format) -> Result<String, ReportError> {
        match format.markup() {
            Some(markup) => Ok(self.render_text(markup)),
            None => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    /// Writes the report to `path`, in the format its extension names.
    ///
    /// HTML reports also get `style.css` and `customize.js` next to them,
    /// unless those files already exist.
    ///
    /// # Errors
    ///
    /// Fails on an unknown extension or when a file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<Format, ReportError> {
        let format = Format::from_path(path)?;
        let rendered = self.render(format)?;
        write(path, rendered)?;

        if format == Format::Html {
            let dir = path.parent().unwrap_or_else(|| Path::new(""));
            for (name, contents) in [("style.css", STYLE), ("customize.js", SCRIPT)] {
                let asset = dir.join(name);
                if !asset.exists() {
                    tracing::debug!("Writing {}.", asset.display());
                    write(&asset, contents)?;
                }
            }
        }

        tracing::info!("Report written to {}.", path.display());
        Ok(format)
    }

    fn render_text(&self, markup: &Markup) -> String {
        let mut out = Writer {
            text: String::new(),
            markup,
            indirection: self.indirection,
        };
        out.part(
            markup.begin,
            &format!(
                "TAINTalyzing report created on {}",
                self.created.format("%c")
            ),
            markup.begin_end,
        );

        for file in &self.files {
            out.part(
                markup.new_file,
                &format!("Start of analysis for {}:", file.path.display()),
                markup.new_file_end,
            );
            out.part(
                markup.module,
                &format!("The filetype was detected as {}.", file.module),
                markup.module_end,
            );

            for method in &file.methods {
                out.method(method);
            }
            if file.methods.is_empty() {
                out.part(
                    markup.nothing_found,
                    "Congratulations, nothing to report for this file.",
                    markup.nothing_found_end,
                );
            }
        }

        out.part(
            markup.end,
            "Don't forget that these results are not necessarily complete and could be missing \
             vulnerabilities.  Additional security checks are highly recommended!",
            markup.end_end,
        );
        out.text
    }
}

struct Writer<'a> {
    text: String,
    markup: &'a Markup,
    indirection: usize,
}

impl Writer<'_> {
    fn part(&mut self, open: &str, message: &str, close: &str) {
        self.text.push_str(open);
        self.text.push_str(&(self.markup.escape)(message));
        self.text.push_str(close);
        self.text.push('\n');
    }

    fn tag(&mut self, tag: &str) {
        if !tag.is_empty() {
            self.text.push_str(tag);
            self.text.push('\n');
        }
    }

    fn method(&mut self, method: &MethodReport) {
        let m = self.markup;
        let name = method.class.as_ref().map_or_else(
            || method.name.clone(),
            |class| format!("{class}.{}", method.name),
        );
        self.part(
            m.method,
            &format!(
                "Analysis results for method \"{name}\" (lines {} to {}).",
                method.first_line, method.last_line
            ),
            m.method_end,
        );
        if let Some(complexity) = method.complexity {
            self.part(
                m.complexity,
                &format!("Method has a cyclomatic complexity of {complexity}."),
                m.complexity_end,
            );
        }

        if !method.taints.is_empty() {
            self.part(
                m.taints_list,
                "The following taints were detected:",
                m.taints_list_end,
            );
            for taint in &method.taints {
                self.tag(m.new_taint);
                self.part(
                    m.taint,
                    &format!(
                        "In line {} a call with potentially user controlled input is made to {}.",
                        taint.line, taint.sink
                    ),
                    m.taint_end,
                );
                self.comment(m.taint_messages, &taint.comment, m.taint_messages_end);
                self.part(
                    m.taint_messages,
                    &format!(
                        "The input comes from {} in line {}.",
                        taint.origin.name, taint.origin.line
                    ),
                    m.taint_messages_end,
                );
                // Sanitizers nested deeper than the trusted indirection do not count.
                let sanitizer = match &taint.sanitizer {
                    Some(s) if s.level <= self.indirection => format!(
                        "The taint seems to be sanitized (indirection level: {}).",
                        s.level
                    ),
                    _ => "No sanitizer detected.".to_string(),
                };
                self.part(m.taint_messages, &sanitizer, m.taint_messages_end);
                self.part(
                    m.taint_messages,
                    &format!("Severity level: {}%.", taint.severity),
                    m.taint_messages_end,
                );
                self.tag(m.new_taint_end);
            }
            self.tag(m.taints_list_after);
        }

        if !method.sinks.is_empty() {
            self.part(
                m.sinks_list,
                "The following sinks were detected:",
                m.sinks_list_end,
            );
            for sink in &method.sinks {
                self.tag(m.new_sink);
                self.part(
                    m.sink,
                    &format!(
                        "In line {} a call without any detected user controlled input is made \
                         to {}.",
                        sink.line, sink.sink
                    ),
                    m.sink_end,
                );
                self.comment(m.sink_messages, &sink.comment, m.sink_messages_end);
                self.part(
                    m.sink_messages,
                    &format!("Severity level: {}%.", sink.severity),
                    m.sink_messages_end,
                );
                self.tag(m.new_sink_end);
            }
            self.tag(m.sinks_list_after);
        }
    }

    fn comment(&mut self, open: &str, comment: &str, close: &str) {
        if !comment.is_empty() {
            self.part(
                open,
                &format!("The following comment is linked to this sink: {comment}"),
                close,
            );
        }
    }
}

fn method_report(
    file: &SourceFile,
    method: &Method,
    threshold: usize,
    indirection: usize,
) -> Option<MethodReport> {
    let line = |span: Span| file.column_to_line(span.start);

    let taints: Vec<TaintReport> = method
        .taints
        .iter()
        .map(|taint| TaintReport {
            line: line(taint.sink.span),
            sink: taint.sink.name.to_string(),
            comment: taint.comment.clone(),
            argument: taint.argument,
            origin: OriginReport {
                kind: taint.origin.kind,
                name: taint.origin.name.clone(),
                line: line(taint.origin.span),
            },
            sanitizer: taint.sanitizer.clone(),
            severity: severity(taint.sanitizer.as_ref(), indirection),
        })
        .collect();

    let mut seen: BTreeSet<Span> = method.taints.iter().map(|t| t.sink.span).collect();
    let sinks: Vec<SinkReport> = method
        .sinks
        .iter()
        .filter(|sink| seen.insert(sink.call.span))
        .map(|sink| SinkReport {
            line: line(sink.call.span),
            sink: sink.call.name.to_string(),
            comment: sink.comment.clone(),
            severity: 50,
        })
        .collect();

    let complexity = method.complexity.filter(|c| *c >= threshold);
    if complexity.is_none() && taints.is_empty() && sinks.is_empty() {
        return None;
    }

    Some(MethodReport {
        name: method.name.clone(),
        class: method.class.clone(),
        first_line: line(method.span),
        last_line: file.column_to_line(method.span.end.saturating_sub(1)),
        complexity,
        taints,
        sinks,
    })
}

/// Severity of a taint in percent.
///
/// Unsanitized taints, and taints sanitized deeper than `indirection`, are
/// 100%. A sanitizer at level `L` gives `50 + 50 * L / indirection`.
fn severity(sanitizer: Option<&AppliedSanitizer>, indirection: usize) -> usize {
    let indirection = indirection.max(1);
    match sanitizer {
        Some(s) if s.level <= indirection => 50 + (50 * s.level + indirection / 2) / indirection,
        _ => 100,
    }
}

fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), ReportError> {
    fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
