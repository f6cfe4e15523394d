use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use time::OffsetDateTime;

/// Scheme used for references into the locally managed media directory.
/// Anything else found in content (plain http links and the like) is not
/// ours to clean up.
const MEDIA_SCHEME: &str = "media://";

static IMG_TAG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img[^>]*\bsrc\s*=\s*"([^"]+)""#).expect("valid img tag pattern"));
static MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\(([^)\s]+)\)").expect("valid markdown image pattern"));

/// Extracts every media reference embedded in a piece of content,
/// de-duplicated. Both `<img src="...">` and Markdown image syntax are
/// recognised.
pub fn asset_refs(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    for captures in IMG_TAG_SRC
        .captures_iter(content)
        .chain(MARKDOWN_IMAGE.captures_iter(content))
    {
        let reference = captures[1].to_string();
        if seen.insert(reference.clone()) {
            refs.push(reference);
        }
    }
    refs
}

/// References present in `old` but no longer in `new`: the assets an edit
/// left behind.
pub fn orphaned_refs(old: &str, new: &str) -> Vec<String> {
    let kept: HashSet<String> = asset_refs(new).into_iter().collect();
    asset_refs(old)
        .into_iter()
        .filter(|reference| !kept.contains(reference))
        .collect()
}

/// Owns the media directory under the data dir. Content embeds
/// `media://<file>` references produced by [`MediaStore::import`]; the store
/// resolves and deletes only references carrying that scheme.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies a file into the media directory and returns the reference to
    /// embed in content. File names are sanitised and prefixed with the
    /// import timestamp to keep them unique.
    pub fn import(&self, source: &Path) -> Result<String> {
        let name = source
            .file_name()
            .and_then(|name| name.to_str())
            .map(sanitize_file_name)
            .unwrap_or_else(|| String::from("asset"));
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating media directory {}", self.root.display()))?;
        let stamp = OffsetDateTime::now_utc().unix_timestamp();
        let mut stamped = format!("{stamp}_{name}");
        let mut attempt = 1u32;
        while self.root.join(&stamped).exists() {
            stamped = format!("{stamp}-{attempt}_{name}");
            attempt += 1;
        }
        let target = self.root.join(&stamped);
        fs::copy(source, &target)
            .with_context(|| format!("importing {} into media store", source.display()))?;
        Ok(format!("{MEDIA_SCHEME}{stamped}"))
    }

    /// Maps a reference back to a path under the media root. References
    /// without our scheme, or smuggling path separators, resolve to nothing.
    pub fn local_path(&self, reference: &str) -> Option<PathBuf> {
        let name = reference.strip_prefix(MEDIA_SCHEME)?;
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return None;
        }
        Some(self.root.join(name))
    }

    /// Deletes the file behind a reference. A reference we do not own, or a
    /// file already gone, counts as success.
    pub fn delete(&self, reference: &str) -> Result<bool> {
        let Some(path) = self.local_path(reference) else {
            return Ok(false);
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => {
                Err(err).with_context(|| format!("deleting media file {}", path.display()))
            }
        }
    }

    /// Removes every asset an edit orphaned. Per-file failures are logged
    /// and skipped so one stubborn file cannot block the rest.
    pub fn cleanup_orphans(&self, old_content: &str, new_content: &str) -> usize {
        let mut removed = 0;
        for reference in orphaned_refs(old_content, new_content) {
            match self.delete(&reference) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(?err, reference, "failed to delete orphaned media asset");
                }
            }
        }
        removed
    }

    /// Removes every asset referenced by a deleted item's content.
    pub fn cleanup_all(&self, content: &str) -> usize {
        self.cleanup_orphans(content, "")
    }
}

fn sanitize_file_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        String::from("asset")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn extracts_both_reference_syntaxes() {
        let content = r#"intro <img alt="x" src="media://a.png"> middle
            ![chart](media://b.png) and an external ![ext](https://example.com/c.png)
            repeated <img src="media://a.png">"#;
        assert_eq!(
            asset_refs(content),
            vec![
                "media://a.png".to_string(),
                "media://b.png".to_string(),
                "https://example.com/c.png".to_string(),
            ]
        );
    }

    #[test]
    fn orphans_are_old_minus_new() {
        let old = "![a](media://a.png) ![b](media://b.png)";
        let new = "![b](media://b.png) ![c](media://c.png)";
        assert_eq!(orphaned_refs(old, new), vec!["media://a.png".to_string()]);
        assert!(orphaned_refs(old, old).is_empty());
    }

    #[test]
    fn import_then_cleanup_removes_only_orphans() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("photo.PNG");
        std::fs::write(&source, b"fake image bytes")?;

        let media = MediaStore::new(temp.path().join("media"));
        let kept_ref = media.import(&source)?;
        let orphan_ref = media.import(&source)?;

        let old = format!("![one]({kept_ref}) ![two]({orphan_ref})");
        let new = format!("![one]({kept_ref})");
        assert_eq!(media.cleanup_orphans(&old, &new), 1);

        assert!(media.local_path(&kept_ref).expect("owned ref").exists());
        assert!(!media.local_path(&orphan_ref).expect("owned ref").exists());

        // Deleting again is fine; the file is simply gone.
        assert!(!media.delete(&orphan_ref)?);
        Ok(())
    }

    #[test]
    fn foreign_and_hostile_references_are_ignored() {
        let media = MediaStore::new("/tmp/never-used");
        assert_eq!(media.local_path("https://example.com/a.png"), None);
        assert_eq!(media.local_path("media://../../etc/passwd"), None);
        assert_eq!(media.local_path("media://"), None);
    }

    #[test]
    fn file_names_are_sanitised() {
        assert_eq!(sanitize_file_name("My Photo (1).PNG"), "my-photo--1-.png");
        assert_eq!(sanitize_file_name("???"), "asset");
    }
}
