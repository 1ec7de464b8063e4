//! Formatter registry.

use std::sync::Arc;

use crate::line::{
    ConvertBulletPointLinks, ConvertInlineLinks, FormatterFlags, LineFormatter,
    NormalizeCodeBlocks, StripHtmlComments, StripInlineMarkdown, StripJsxExpressions,
};

/// Ordered registry of line formatters.
///
/// Registration order is application order; the registry is constructed
/// once at startup rather than populated by import-time side effects.
pub struct FormatterRegistry {
    line: Vec<Arc<dyn LineFormatter>>,
}

impl FormatterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { line: Vec::new() }
    }

    /// Registry with all built-in formatters in their canonical order.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(StripHtmlComments);
        registry.register(StripJsxExpressions);
        registry.register(ConvertBulletPointLinks);
        registry.register(ConvertInlineLinks);
        registry.register(StripInlineMarkdown);
        registry.register(NormalizeCodeBlocks);
        registry
    }

    /// Append a formatter to the chain.
    pub fn register<F: LineFormatter + 'static>(&mut self, formatter: F) {
        self.line.push(Arc::new(formatter));
    }

    /// Look up a formatter by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn LineFormatter>> {
        self.line.iter().find(|f| f.name() == name).cloned()
    }

    /// All registered formatter names, in application order.
    pub fn names(&self) -> Vec<&'static str> {
        self.line.iter().map(|f| f.name()).collect()
    }

    /// The formatter chain applicable to a source file extension.
    pub fn for_extension(&self, ext: &str) -> Vec<Arc<dyn LineFormatter>> {
        self.line
            .iter()
            .filter(|f| f.extensions().contains(&ext))
            .cloned()
            .collect()
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for FormatterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatterRegistry")
            .field("line", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UpperCase;

    impl LineFormatter for UpperCase {
        fn name(&self) -> &'static str {
            "upper_case"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["txt"]
        }

        fn apply(&self, line: &str, _flags: &mut FormatterFlags) -> String {
            line.to_uppercase()
        }
    }

    #[test]
    fn test_builtin_order() {
        let registry = FormatterRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec![
                "strip_html_comments",
                "strip_jsx_expressions",
                "convert_bullet_point_links",
                "convert_inline_links",
                "strip_inline_markdown",
                "normalize_code_blocks",
            ]
        );
    }

    #[test]
    fn test_for_extension_filters() {
        let registry = FormatterRegistry::builtin();
        let md = registry.for_extension("md");
        assert!(md.iter().all(|f| f.extensions().contains(&"md")));
        assert!(!md.iter().any(|f| f.name() == "strip_jsx_expressions"));

        let mdx = registry.for_extension("mdx");
        assert!(mdx.iter().any(|f| f.name() == "strip_jsx_expressions"));
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = FormatterRegistry::new();
        registry.register(UpperCase);
        assert!(registry.get("upper_case").is_some());
        assert!(registry.get("missing").is_none());
    }
}
