//! Comment banners that mark patched regions, by file type.

use camino::Utf8Path;

/// How a file type spells comments, which decides how we mark patches in it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Banner {
    /// `<!-- ... -->`: HTML, XML, SVG
    Markup,
    /// `/* ... */`: JavaScript, TypeScript, CSS
    CStyle,
    /// `# ...` to the end of the line: shell, Python, TOML, YAML...
    Hash,
}

impl Banner {
    /// Picks the banner for a path from its extension,
    /// or `None` if we don't know how to comment in that kind of file.
    pub fn for_path(path: &str) -> Option<Self> {
        let extension = Utf8Path::new(path).extension()?.to_ascii_lowercase();
        match extension.as_str() {
            "html" | "htm" | "xhtml" | "xml" | "svg" => Some(Banner::Markup),
            "js" | "mjs" | "cjs" | "ts" | "css" => Some(Banner::CStyle),
            "sh" | "py" | "rb" | "toml" | "yml" | "yaml" | "conf" => Some(Banner::Hash),
            _ => None,
        }
    }

    pub fn open(self) -> &'static str {
        match self {
            Banner::Markup => "<!-- rezip: begin patch -->",
            Banner::CStyle => "/* rezip: begin patch */",
            Banner::Hash => "# rezip: begin patch\n",
        }
    }

    pub fn close(self) -> &'static str {
        match self {
            Banner::Markup => "<!-- rezip: end patch -->",
            Banner::CStyle => "/* rezip: end patch */",
            Banner::Hash => "\n# rezip: end patch\n",
        }
    }

    /// Surrounds `body` with the opening and closing banners.
    pub fn wrap(self, body: &[u8]) -> Vec<u8> {
        let (open, close) = (self.open().as_bytes(), self.close().as_bytes());
        let mut wrapped = Vec::with_capacity(open.len() + body.len() + close.len());
        wrapped.extend_from_slice(open);
        wrapped.extend_from_slice(body);
        wrapped.extend_from_slice(close);
        wrapped
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(Banner::for_path("noVNC/vnc.html"), Some(Banner::Markup));
        assert_eq!(Banner::for_path("noVNC/app/UI.JS"), Some(Banner::CStyle));
        assert_eq!(Banner::for_path("noVNC/utils/launch.sh"), Some(Banner::Hash));
        assert_eq!(Banner::for_path("noVNC/LICENSE.txt"), None);
        assert_eq!(Banner::for_path("noVNC/Makefile"), None);
    }

    #[test]
    fn wrapping() {
        assert_eq!(
            Banner::CStyle.wrap(b"x = 1;"),
            b"/* rezip: begin patch */x = 1;/* rezip: end patch */"
        );
        assert_eq!(
            Banner::Hash.wrap(b"set -e"),
            b"# rezip: begin patch\nset -e\n# rezip: end patch\n"
        );
    }
}
