//! Context assembly.
//!
//! Formats selected entities into a token-budgeted context string with
//! source attribution. Token counting uses the `ceil(chars / 4)` estimate
//! throughout; the reported `tokens_used` covers the selected items plus
//! any prefix/suffix, while group headings and the sources block ride for
//! free.

use crate::config::AssemblerConfig;
use crate::models::{
    ContextFormat, ContextResult, ContextSource, Entity, ScoredEntity, sort_by_score,
};
use tracing::instrument;

/// Estimates tokens as `ceil(chars / 4)`.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Infers a fenced-code-block language from a file extension.
#[must_use]
pub fn language_for_path(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "py" => "python",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cpp" | "hpp" => "cpp",
        "md" => "markdown",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "sh" => "bash",
        _ => "",
    }
}

fn escape_xml(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    result
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars).collect();
        format!("{kept}…")
    }
}

/// Token-budgeted context formatter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    /// Creates an assembler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Assembles the context from scored candidates.
    ///
    /// Candidates below `min_relevance` are skipped outright; remaining
    /// candidates are taken in score order while they fit the budget.
    /// `truncated` is set the first time an eligible candidate is rejected
    /// solely for budget.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    #[instrument(skip(self, results, config), fields(candidates = results.len()))]
    pub fn assemble(&self, results: &[ScoredEntity], config: &AssemblerConfig) -> ContextResult {
        let mut ordered: Vec<ScoredEntity> = results.to_vec();
        sort_by_score(&mut ordered);

        let overhead = config.prefix.as_deref().map_or(0, estimate_tokens)
            + config.suffix.as_deref().map_or(0, estimate_tokens);

        let mut selected: Vec<(ScoredEntity, String, usize)> = Vec::new();
        let mut running = overhead;
        let mut truncated = false;

        for result in ordered {
            if result.score < config.min_relevance {
                continue;
            }
            let rendered = self.render_item(&result.entity, config);
            let tokens = estimate_tokens(&rendered);
            if running + tokens > config.max_tokens {
                truncated = true;
                continue;
            }
            running += tokens;
            selected.push((result, rendered, tokens));
        }

        let sources: Vec<ContextSource> = selected
            .iter()
            .map(|(result, _, _)| ContextSource {
                entity_id: result.entity.id.clone(),
                name: result.entity.name.clone(),
                entity_type: result.entity.entity_type,
                file_path: result.entity.file_path.clone(),
                line: result.entity.start_line,
                relevance: result.score,
            })
            .collect();

        let context = self.compose(&selected, &sources, config);

        metrics::histogram!("repolens_context_tokens").record(running as f64);
        ContextResult {
            context,
            sources,
            confidence: 0.0,
            tokens_used: running,
            truncated,
        }
    }

    fn compose(
        &self,
        selected: &[(ScoredEntity, String, usize)],
        sources: &[ContextSource],
        config: &AssemblerConfig,
    ) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(ref prefix) = config.prefix {
            parts.push(prefix.clone());
        }

        if config.group_by_type {
            for (title, filter) in Self::groups() {
                let items: Vec<&String> = selected
                    .iter()
                    .filter(|(r, _, _)| filter(&r.entity))
                    .map(|(_, rendered, _)| rendered)
                    .collect();
                if items.is_empty() {
                    continue;
                }
                parts.push(Self::group_heading(title, config.format));
                for item in items {
                    parts.push(item.clone());
                }
            }
        } else {
            for (_, rendered, _) in selected {
                parts.push(rendered.clone());
            }
        }

        if config.include_sources && !sources.is_empty() {
            parts.push(self.render_sources(sources, config.format));
        }
        if let Some(ref suffix) = config.suffix {
            parts.push(suffix.clone());
        }

        parts.join("\n\n")
    }

    /// Group order: code, documentation, conversations. Types outside the
    /// three lists (concepts in particular) fold into documentation.
    fn groups() -> [(&'static str, fn(&Entity) -> bool); 3] {
        [
            ("Relevant Code", |e| e.entity_type.is_code()),
            ("Related Documentation", |e| {
                !e.entity_type.is_code() && !e.entity_type.is_conversation()
            }),
            ("Previous Conversations", |e| {
                e.entity_type.is_conversation()
            }),
        ]
    }

    fn group_heading(title: &str, format: ContextFormat) -> String {
        match format {
            ContextFormat::Markdown => format!("## {title}"),
            ContextFormat::Xml => format!("<group name=\"{title}\">"),
            ContextFormat::Plain => format!("=== {title} ==="),
        }
    }

    fn content_for(entity: &Entity, config: &AssemblerConfig) -> Option<String> {
        if !config.include_code_content && entity.entity_type.is_code() {
            return None;
        }
        let content = entity.content.as_deref()?;
        let content = config
            .max_content_length
            .map_or_else(|| content.to_string(), |max| truncate_chars(content, max));
        Some(content)
    }

    fn render_item(&self, entity: &Entity, config: &AssemblerConfig) -> String {
        match config.format {
            ContextFormat::Markdown => Self::render_markdown(entity, config),
            ContextFormat::Xml => Self::render_xml(entity, config),
            ContextFormat::Plain => Self::render_plain(entity, config),
        }
    }

    fn render_markdown(entity: &Entity, config: &AssemblerConfig) -> String {
        let mut out = format!("### {}", entity.name);
        if let Some(ref path) = entity.file_path {
            match entity.start_line {
                Some(line) => out.push_str(&format!("\n*{path}:{line}*")),
                None => out.push_str(&format!("\n*{path}*")),
            }
        }
        if let Some(ref summary) = entity.summary {
            out.push_str(&format!("\n{summary}"));
        }
        if let Some(content) = Self::content_for(entity, config) {
            let lang = entity
                .file_path
                .as_deref()
                .map_or("", language_for_path);
            out.push_str(&format!("\n\n```{lang}\n{content}\n```"));
        }
        out
    }

    fn render_xml(entity: &Entity, config: &AssemblerConfig) -> String {
        let mut out = format!(
            "<entity name=\"{}\" type=\"{}\"",
            escape_xml(&entity.name),
            entity.entity_type.as_str(),
        );
        if let Some(ref path) = entity.file_path {
            out.push_str(&format!(" file=\"{}\"", escape_xml(path)));
        }
        out.push('>');
        if let Some(ref summary) = entity.summary {
            out.push_str(&format!("<summary>{}</summary>", escape_xml(summary)));
        }
        if let Some(content) = Self::content_for(entity, config) {
            out.push_str(&format!("<content>{}</content>", escape_xml(&content)));
        }
        out.push_str("</entity>");
        out
    }

    fn render_plain(entity: &Entity, config: &AssemblerConfig) -> String {
        let mut out = entity.name.clone();
        if let Some(ref path) = entity.file_path {
            match entity.start_line {
                Some(line) => out.push_str(&format!(" [{path}:{line}]")),
                None => out.push_str(&format!(" [{path}]")),
            }
        }
        if let Some(ref summary) = entity.summary {
            out.push('\n');
            out.push_str(summary);
        }
        if let Some(content) = Self::content_for(entity, config) {
            out.push('\n');
            out.push_str(&content);
        }
        out
    }

    fn render_sources(&self, sources: &[ContextSource], format: ContextFormat) -> String {
        const MAX_LISTED: usize = 10;
        let listed = &sources[..sources.len().min(MAX_LISTED)];
        let remainder = sources.len().saturating_sub(MAX_LISTED);

        match format {
            ContextFormat::Xml => {
                let mut out = String::from("<sources>");
                for source in listed {
                    out.push_str(&format!(
                        "<source id=\"{}\" name=\"{}\" type=\"{}\" relevance=\"{:.2}\"/>",
                        escape_xml(source.entity_id.as_str()),
                        escape_xml(&source.name),
                        source.entity_type.as_str(),
                        source.relevance,
                    ));
                }
                if remainder > 0 {
                    out.push_str(&format!("<more count=\"{remainder}\"/>"));
                }
                out.push_str("</sources>");
                out
            },
            ContextFormat::Markdown | ContextFormat::Plain => {
                let heading = if format == ContextFormat::Markdown {
                    "**Sources:**"
                } else {
                    "Sources:"
                };
                let mut lines = vec![heading.to_string()];
                for source in listed {
                    let location = match (&source.file_path, source.line) {
                        (Some(path), Some(line)) => format!(" — {path}:{line}"),
                        (Some(path), None) => format!(" — {path}"),
                        _ => String::new(),
                    };
                    lines.push(format!(
                        "- {} ({}){location} [{:.2}]",
                        source.name,
                        source.entity_type.as_str(),
                        source.relevance,
                    ));
                }
                if remainder > 0 {
                    lines.push(format!("- and {remainder} more"));
                }
                lines.join("\n")
            },
        }
    }
}
