//! Anchored text patches.
//!
//! A patch finds its anchor in a file, then the first span after it
//! matching its end pattern, and replaces that span with its template,
//! wrapped in a [`Banner`] so the change is easy to spot in the output.
//!
//! End patterns are either literal text, or text split by one `*` wildcard
//! into a prefix and suffix. The latter matches from the prefix through the
//! _first_ following suffix, whatever lies between.
//! Templates can include the matched span with one `\1` backreference.
//!
//! ```
//! # use rezip::patch::PatchSpec;
//! let spec = PatchSpec::new(
//!     "noVNC/app/ui.js",
//!     "this.dragViewport = false;",
//!     "this*;",
//!     "\\1\nEXTRA;",
//! )?;
//! let patched = spec.apply(b"foo this.dragViewport = false; bar").unwrap();
//! assert_eq!(
//!     patched,
//!     b"foo /* rezip: begin patch */this.dragViewport = false;\nEXTRA;/* rezip: end patch */ bar"
//! );
//! # Ok::<(), rezip::result::ZipError>(())
//! ```
//!
//! [`Banner`]: ../banner/enum.Banner.html

use std::ops::Range;

use log::*;
use memchr::memmem;

use crate::banner::Banner;
use crate::result::*;

/// Splits an end pattern into a prefix and suffix
pub const WILDCARD: &str = "*";

/// Stands in for the matched span in a template
pub const BACKREFERENCE: &str = "\\1";

/// What to replace after the anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndPattern {
    /// Exactly this text
    Literal(String),
    /// The prefix, then anything, then the first suffix after it
    Split { prefix: String, suffix: String },
}

impl EndPattern {
    fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err(String::from("empty end pattern"));
        }
        let mut pieces = raw.split(WILDCARD);
        match (pieces.next(), pieces.next(), pieces.next()) {
            (Some(literal), None, _) => Ok(EndPattern::Literal(literal.to_owned())),
            (Some(prefix), Some(suffix), None) => {
                if prefix.is_empty() && suffix.is_empty() {
                    return Err(String::from("end pattern is only a wildcard"));
                }
                Ok(EndPattern::Split {
                    prefix: prefix.to_owned(),
                    suffix: suffix.to_owned(),
                })
            }
            _ => Err(format!("more than one {WILDCARD} in end pattern {raw:?}")),
        }
    }

    /// Finds the span this pattern matches, starting the search at `from`.
    fn find(&self, content: &[u8], from: usize) -> Option<Range<usize>> {
        match self {
            EndPattern::Literal(literal) => {
                let beginning = from + memmem::find(&content[from..], literal.as_bytes())?;
                Some(beginning..beginning + literal.len())
            }
            EndPattern::Split { prefix, suffix } => {
                let beginning = from + memmem::find(&content[from..], prefix.as_bytes())?;
                // Not greedy: the first suffix after the prefix ends the span.
                let after_prefix = beginning + prefix.len();
                let suffix_at =
                    after_prefix + memmem::find(&content[after_prefix..], suffix.as_bytes())?;
                Some(beginning..suffix_at + suffix.len())
            }
        }
    }
}

/// What to replace the matched span with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// Just this text
    Plain(String),
    /// The matched span, with text on either side
    Backreference { before: String, after: String },
}

impl Template {
    fn parse(raw: &str) -> Result<Self, String> {
        let mut pieces = raw.split(BACKREFERENCE);
        match (pieces.next(), pieces.next(), pieces.next()) {
            (Some(plain), None, _) => Ok(Template::Plain(plain.to_owned())),
            (Some(before), Some(after), None) => Ok(Template::Backreference {
                before: before.to_owned(),
                after: after.to_owned(),
            }),
            _ => Err(format!("more than one {BACKREFERENCE} in template")),
        }
    }

    /// Fills in the template with the span it replaces.
    fn expand(&self, captured: &[u8]) -> Vec<u8> {
        match self {
            Template::Plain(plain) => plain.as_bytes().to_vec(),
            Template::Backreference { before, after } => {
                let mut expanded = Vec::with_capacity(before.len() + captured.len() + after.len());
                expanded.extend_from_slice(before.as_bytes());
                expanded.extend_from_slice(captured);
                expanded.extend_from_slice(after.as_bytes());
                expanded
            }
        }
    }
}

/// A single patch to a single file, parsed and ready to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSpec {
    target: String,
    anchor: String,
    end: EndPattern,
    template: Template,
    banner: Banner,
}

impl PatchSpec {
    /// Parses a patch from its textual parts.
    ///
    /// - `target` is the path of the file to patch, after moving it under the new root.
    /// - `anchor` is literal text the search starts from.
    /// - `end_pattern` is the text to replace, with up to one `*` wildcard.
    /// - `template` is the replacement, with up to one `\1` backreference.
    pub fn new(target: &str, anchor: &str, end_pattern: &str, template: &str) -> ZipResult<Self> {
        let invalid = |reason: String| ZipError::InvalidPatch {
            target: target.to_owned(),
            reason,
        };

        if anchor.is_empty() {
            return Err(invalid(String::from("empty anchor")));
        }
        let banner = Banner::for_path(target)
            .ok_or_else(|| invalid(String::from("don't know how to comment in this file")))?;
        let end = EndPattern::parse(end_pattern).map_err(invalid)?;
        let template = Template::parse(template).map_err(invalid)?;

        Ok(Self {
            target: target.to_owned(),
            anchor: anchor.to_owned(),
            end,
            template,
            banner,
        })
    }

    /// The path of the file this patch applies to
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn anchor(&self) -> &str {
        &self.anchor
    }

    pub fn end_pattern(&self) -> &EndPattern {
        &self.end
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn banner(&self) -> Banner {
        self.banner
    }

    /// Applies the patch, returning the new contents,
    /// or `None` if the anchor or end pattern couldn't be found.
    pub fn apply(&self, content: &[u8]) -> Option<Vec<u8>> {
        let anchor_at = memmem::find(content, self.anchor.as_bytes())?;
        let span = self.end.find(content, anchor_at)?;
        trace!("{}: replacing bytes {:?}", self.target, span);

        let replacement = self.banner.wrap(&self.template.expand(&content[span.clone()]));

        let mut patched = Vec::with_capacity(content.len() - span.len() + replacement.len());
        patched.extend_from_slice(&content[..span.start]);
        patched.extend_from_slice(&replacement);
        patched.extend_from_slice(&content[span.end..]);
        Some(patched)
    }
}

/// Applies, in order, each patch in `specs` that targets `path`.
///
/// Each patch sees the contents as left by the ones before it.
/// Patches that don't match are skipped; it's up to the caller to notice.
/// Returns the new contents and how many patches were applied.
pub fn apply_patches(path: &str, content: Vec<u8>, specs: &[PatchSpec]) -> (Vec<u8>, usize) {
    specs
        .iter()
        .filter(|spec| spec.target == path)
        .fold((content, 0), |(content, applied), spec| {
            match spec.apply(&content) {
                Some(patched) => {
                    debug!("Patched {path} at {:?}", spec.anchor);
                    (patched, applied + 1)
                }
                None => {
                    debug!("No match in {path} for patch at {:?}", spec.anchor);
                    (content, applied)
                }
            }
        })
}
