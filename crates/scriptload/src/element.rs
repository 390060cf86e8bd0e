//! The loader element inserted into a document.

use serde::Deserialize;

/// A `<script>` element bound to one URL.
///
/// Only `src` identifies the load. The remaining attributes are taken from
/// whichever request reaches the loader first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptElement {
    /// Script URL
    pub src: String,

    /// Emit `type="module"`
    #[serde(default)]
    pub module: bool,

    /// Emit `defer`
    #[serde(default)]
    pub defer: bool,

    /// Emit `async`
    #[serde(default, rename = "async")]
    pub async_load: bool,

    /// Subresource integrity hash
    #[serde(default)]
    pub integrity: Option<String>,

    /// CORS mode (`anonymous`, `use-credentials`)
    #[serde(default)]
    pub crossorigin: Option<String>,
}

impl ScriptElement {
    /// Create a plain classic script element for `src`.
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            module: false,
            defer: false,
            async_load: false,
            integrity: None,
            crossorigin: None,
        }
    }

    /// Mark the element as an ES module.
    pub fn module(mut self) -> Self {
        self.module = true;
        self
    }

    /// Mark the element as deferred.
    pub fn defer(mut self) -> Self {
        self.defer = true;
        self
    }

    /// Render the element as an HTML tag.
    pub fn to_html(&self) -> String {
        let mut tag = String::from("<script");

        if self.module {
            tag.push_str(r#" type="module""#);
        }
        tag.push_str(&format!(r#" src="{}""#, escape_attr(&self.src)));
        if self.defer {
            tag.push_str(" defer");
        }
        if self.async_load {
            tag.push_str(" async");
        }
        if let Some(integrity) = &self.integrity {
            tag.push_str(&format!(r#" integrity="{}""#, escape_attr(integrity)));
        }
        if let Some(crossorigin) = &self.crossorigin {
            tag.push_str(&format!(r#" crossorigin="{}""#, escape_attr(crossorigin)));
        }

        tag.push_str("></script>");
        tag
    }
}

/// Escape a value for use inside a double-quoted attribute.
fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_classic_script() {
        let el = ScriptElement::new("/wasm/game.js");
        assert_eq!(el.to_html(), r#"<script src="/wasm/game.js"></script>"#);
    }

    #[test]
    fn renders_all_attributes() {
        let el = ScriptElement {
            integrity: Some("sha384-abc".to_string()),
            crossorigin: Some("anonymous".to_string()),
            async_load: true,
            ..ScriptElement::new("https://cdn.example/a.js").module().defer()
        };

        assert_eq!(
            el.to_html(),
            r#"<script type="module" src="https://cdn.example/a.js" defer async integrity="sha384-abc" crossorigin="anonymous"></script>"#
        );
    }

    #[test]
    fn escapes_attribute_values() {
        let el = ScriptElement::new(r#"/a.js?x="1"&y=<2>"#);
        assert_eq!(
            el.to_html(),
            r#"<script src="/a.js?x=&quot;1&quot;&amp;y=&lt;2&gt;"></script>"#
        );
    }
}
