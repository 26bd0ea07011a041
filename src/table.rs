//! The table of patches to apply to an archive.

use crate::patch::PatchSpec;
use crate::result::*;

/// Reports the websockify proxy's answer if the connection check fails.
const CONNECTION_CHECK_SCRIPT: &str = r#"
	try {
		function parseQuery(e){for(var o=e.split("&"),n={},t=0;t<o.length;t++){var d=o[t].split("="),p=decodeURIComponent(d[0]),r=decodeURIComponent(d[1]);if(void 0===n[p])n[p]=decodeURIComponent(r);else if("string"==typeof n[p]){var i=[n[p],decodeURIComponent(r)];n[p]=i}else n[p].push(decodeURIComponent(r))}return n};
		fetch(parseQuery(window.location.search.replace(/^\?/, ""))["path"]).then(function(resp) {
			return resp.text();
		}).then(function (txt) {
			if (txt.indexOf("not websocket") == -1) alert(txt);
		});
	} catch (ex) {
		console.log(ex);
	}
"#;

/// An ordered list of patches.
///
/// Order matters: patches to the same file are applied one after another,
/// each to the output of the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTable {
    /// Bumped whenever the patches change,
    /// usually to follow changes in the archive they target.
    pub version: u32,
    pub specs: Vec<PatchSpec>,
}

impl PatchTable {
    pub fn new(version: u32, specs: Vec<PatchSpec>) -> Self {
        Self { version, specs }
    }

    /// The patches built into this tool, for noVNC release bundles.
    pub fn builtin() -> ZipResult<Self> {
        let inject_script = format!("<script>{CONNECTION_CHECK_SCRIPT}</script>\\1");
        Ok(Self::new(
            1,
            vec![PatchSpec::new(
                "noVNC/vnc.html",
                "</body>",
                "</body>",
                &inject_script,
            )?],
        ))
    }

    /// How many patches must be applied for a rewrite to succeed
    pub fn declared(&self) -> usize {
        self.specs.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::banner::Banner;
    use crate::patch::Template;

    #[test]
    fn builtin_table_parses() {
        let table = PatchTable::builtin().unwrap();
        assert_eq!(table.declared(), 1);
        let spec = &table.specs[0];
        assert_eq!(spec.target(), "noVNC/vnc.html");
        match spec.template() {
            Template::Backreference { before, after } => {
                assert!(before.starts_with("<script>"));
                assert!(before.ends_with("</script>"));
                assert!(after.is_empty());
            }
            other => panic!("Expected a backreference, got {:?}", other),
        }
    }

    #[test]
    fn builtin_table_injects_before_body_close() {
        let table = PatchTable::builtin().unwrap();
        let page = b"<html><body><div id=\"noVNC\"></div></body></html>";
        let spec = &table.specs[0];
        assert_eq!(spec.anchor(), "</body>");
        assert_eq!(spec.banner(), Banner::Markup);
        let patched = spec.apply(page).unwrap();
        let patched = String::from_utf8(patched).unwrap();
        assert!(patched.starts_with(
            "<html><body><div id=\"noVNC\"></div><!-- rezip: begin patch --><script>"
        ));
        assert!(patched.ends_with("</script></body><!-- rezip: end patch --></html>"));
        assert!(patched.contains("not websocket"));
    }
}
