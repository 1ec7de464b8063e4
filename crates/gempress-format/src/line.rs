//! Line formatter trait and the built-in Markdown/MDX formatters.

use std::sync::LazyLock;

use regex::Regex;

/// Per-document state shared by every formatter in a pipeline pass.
#[derive(Debug, Default)]
pub struct FormatterFlags {
    /// Inside a ``` fenced block; content lines pass through untouched.
    pub in_preformat: bool,

    /// Gemtext link lines generated mid-paragraph, emitted at the next
    /// blank line.
    pub buffer_until_empty_line: Vec<String>,
}

/// A single-line rewrite step.
///
/// Returning an empty string for a non-empty input drops the line from the
/// output entirely.
pub trait LineFormatter: Send + Sync {
    /// Unique formatter name.
    fn name(&self) -> &'static str;

    /// Source file extensions this formatter applies to.
    fn extensions(&self) -> &'static [&'static str];

    /// Rewrite one line. `line` carries no trailing newline.
    fn apply(&self, line: &str, flags: &mut FormatterFlags) -> String;
}

/// Strips inline bold/italic markers outside preformatted blocks.
///
/// Naive: underscores inside words (and URLs) are stripped too. The first
/// two characters are preserved so list and link-line markers survive.
pub struct StripInlineMarkdown;

static INLINE_MD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*{1,3}|_{1,3}").expect("inline markdown regex"));

impl LineFormatter for StripInlineMarkdown {
    fn name(&self) -> &'static str {
        "strip_inline_markdown"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "mdx"]
    }

    fn apply(&self, line: &str, flags: &mut FormatterFlags) -> String {
        if flags.in_preformat {
            return line.to_string();
        }
        let split = line
            .char_indices()
            .nth(2)
            .map(|(i, _)| i)
            .unwrap_or(line.len());
        let (head, tail) = line.split_at(split);
        format!("{head}{}", INLINE_MD.replace_all(tail, ""))
    }
}

/// Drops whole-line HTML comments.
pub struct StripHtmlComments;

impl LineFormatter for StripHtmlComments {
    fn name(&self) -> &'static str {
        "strip_html_comments"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "mdx"]
    }

    fn apply(&self, line: &str, _flags: &mut FormatterFlags) -> String {
        if line.starts_with("<!--") && line.ends_with("-->") {
            return String::new();
        }
        line.to_string()
    }
}

/// Converts `- [label](url)` bullet links into gemtext link lines.
pub struct ConvertBulletPointLinks;

impl LineFormatter for ConvertBulletPointLinks {
    fn name(&self) -> &'static str {
        "convert_bullet_point_links"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "mdx"]
    }

    fn apply(&self, line: &str, _flags: &mut FormatterFlags) -> String {
        let Some(rest) = line.strip_prefix("- [") else {
            return line.to_string();
        };
        let Some((label, url)) = rest.split_once("](") else {
            return line.to_string();
        };
        format!("=> {} {}", url.trim_end_matches(')'), label)
    }
}

/// Replaces inline `[label](url)` links with `label (see below)` and
/// queues a gemtext link line for the next blank line.
pub struct ConvertInlineLinks;

static INLINE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?P<label>[^\]]+)\]\((?P<url>[^)]+)\)").expect("link regex"));

impl LineFormatter for ConvertInlineLinks {
    fn name(&self) -> &'static str {
        "convert_inline_links"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "mdx"]
    }

    fn apply(&self, line: &str, flags: &mut FormatterFlags) -> String {
        if line.starts_with("- [") {
            // Bullet links have a dedicated formatter.
            return line.to_string();
        }
        if !INLINE_LINK.is_match(line) {
            return line.to_string();
        }

        for caps in INLINE_LINK.captures_iter(line) {
            flags
                .buffer_until_empty_line
                .push(format!("=> {} {}", &caps["url"], &caps["label"]));
        }

        INLINE_LINK
            .replace_all(line, "$label (see below)")
            .into_owned()
    }
}

/// Strips language tags from code fences so they match the gemtext
/// preformat toggle.
pub struct NormalizeCodeBlocks;

impl LineFormatter for NormalizeCodeBlocks {
    fn name(&self) -> &'static str {
        "normalize_code_blocks"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "mdx"]
    }

    fn apply(&self, line: &str, _flags: &mut FormatterFlags) -> String {
        if line.starts_with("```") {
            "```".to_string()
        } else {
            line.to_string()
        }
    }
}

/// Strips `{...}` JSX expressions from MDX lines.
pub struct StripJsxExpressions;

static JSX_EXPR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{.*?\}").expect("jsx expression regex"));

impl LineFormatter for StripJsxExpressions {
    fn name(&self) -> &'static str {
        "strip_jsx_expressions"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["mdx"]
    }

    fn apply(&self, line: &str, flags: &mut FormatterFlags) -> String {
        if flags.in_preformat {
            return line.to_string();
        }
        JSX_EXPR.replace_all(line, "").into_owned()
    }
}
