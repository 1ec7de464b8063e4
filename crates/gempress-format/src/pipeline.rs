//! Whole-document formatting pass.

use std::sync::Arc;

use crate::line::{FormatterFlags, LineFormatter};

/// Run a formatter chain over a document.
///
/// Lines are processed independently; a formatter returning an empty string
/// for a non-empty line removes it. Fenced blocks toggle the preformat flag
/// so content lines inside them pass through untouched, and link lines
/// deferred by inline-link conversion are flushed at the next blank line
/// (or at end of input).
pub fn format_document(input: &str, chain: &[Arc<dyn LineFormatter>]) -> String {
    let mut flags = FormatterFlags::default();
    let mut output: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.is_empty() {
            if !flags.in_preformat && !flags.buffer_until_empty_line.is_empty() {
                output.append(&mut flags.buffer_until_empty_line);
            }
            output.push(String::new());
            continue;
        }

        let is_fence = line.starts_with("```");

        let mut current = line.to_string();
        for formatter in chain {
            current = formatter.apply(&current, &mut flags);
        }

        // The fence line itself is formatted (language tag stripped); the
        // flag flips for the lines that follow it.
        if is_fence {
            flags.in_preformat = !flags.in_preformat;
        }

        if current.is_empty() {
            continue;
        }
        output.push(current);
    }

    if !flags.buffer_until_empty_line.is_empty() {
        output.append(&mut flags.buffer_until_empty_line);
    }

    let mut result = output.join("\n");
    if !result.is_empty() {
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FormatterRegistry;

    fn convert(input: &str, ext: &str) -> String {
        let registry = FormatterRegistry::builtin();
        format_document(input, &registry.for_extension(ext))
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(convert("", "md"), "");
    }

    #[test]
    fn test_bullet_links_and_comments() {
        let input = "# Title\n<!-- draft -->\n- [Docs](https://example.org/docs)\n";
        let out = convert(input, "md");
        assert_eq!(out, "# Title\n=> https://example.org/docs Docs\n");
    }

    #[test]
    fn test_inline_links_flush_on_blank_line() {
        let input = "read [the guide](https://g.example) first\n\nnext paragraph\n";
        let out = convert(input, "md");
        assert_eq!(
            out,
            "read the guide (see below) first\n=> https://g.example the guide\n\nnext paragraph\n"
        );
    }

    #[test]
    fn test_inline_links_flush_at_eof() {
        let input = "see [a](https://a.example)";
        let out = convert(input, "md");
        assert_eq!(out, "see a (see below)\n=> https://a.example a\n");
    }

    #[test]
    fn test_preformat_block_preserved() {
        let input = "```rust\nlet _x = *ptr;\n```\n";
        let out = convert(input, "md");
        assert_eq!(out, "```\nlet _x = *ptr;\n```\n");
    }

    #[test]
    fn test_mdx_expressions_stripped() {
        let input = "count: {count}\n";
        assert_eq!(convert(input, "mdx"), "count: \n");
        // .md documents keep braces.
        assert_eq!(convert(input, "md"), "count: {count}\n");
    }
}
