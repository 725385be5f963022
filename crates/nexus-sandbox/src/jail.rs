//! Path confinement
//!
//! A script-supplied name is resolved in two steps:
//!
//! 1. Lexically against the canonical base: absolute paths and root/prefix
//!    components are refused, `.` is dropped, `..` pops one level and may
//!    never pop above the base.
//! 2. Physically: the deepest ancestor that exists on disk is canonicalized
//!    (which follows symlinks) and the not-yet-existing tail is appended.
//!    The result must still start with the canonical base.
//!
//! Step 2 is what stops a symlink planted inside the base from leading out.

use crate::SandboxError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PathJail {
    base: PathBuf,
}

impl PathJail {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Canonical form of the base, creating the directory if needed
    pub fn canonical_base(&self) -> Result<PathBuf, SandboxError> {
        fs::create_dir_all(&self.base)?;
        Ok(fs::canonicalize(&self.base)?)
    }

    /// Resolve `name` to a path inside the base
    pub fn resolve(&self, name: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let name = name.as_ref();
        let base = self.canonical_base()?;

        let lexical = resolve_lexically(&base, name)?;
        let physical = resolve_physically(&lexical)?;

        if !physical.starts_with(&base) {
            return Err(SandboxError::Violation(format!(
                "'{}' resolves outside the sandbox",
                name.display()
            )));
        }
        Ok(physical)
    }

    /// Resolve `name` without following a symlink in its last component.
    ///
    /// The parent directory goes through the full check; the entry itself
    /// may be a link to anywhere, or to nothing. For operations on the
    /// entry, not on what it points at.
    pub fn resolve_entry(&self, name: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let name = name.as_ref();
        let base = self.canonical_base()?;

        let lexical = resolve_lexically(&base, name)?;
        if lexical == base {
            return Ok(base);
        }
        let (Some(parent), Some(entry)) = (lexical.parent(), lexical.file_name()) else {
            return Ok(base);
        };

        let parent = resolve_physically(parent)?;
        if !parent.starts_with(&base) {
            return Err(SandboxError::Violation(format!(
                "'{}' resolves outside the sandbox",
                name.display()
            )));
        }
        Ok(parent.join(entry))
    }
}

fn resolve_lexically(base: &Path, name: &Path) -> Result<PathBuf, SandboxError> {
    if name.is_absolute() {
        return Err(SandboxError::Violation(format!(
            "absolute path '{}' is not allowed",
            name.display()
        )));
    }

    let mut resolved = base.to_path_buf();
    for component in name.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(SandboxError::Violation(format!(
                    "'{}' has a root or prefix component",
                    name.display()
                )));
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved == base {
                    return Err(SandboxError::Violation(format!(
                        "'{}' climbs above the sandbox",
                        name.display()
                    )));
                }
                resolved.pop();
            }
            Component::Normal(part) => resolved.push(part),
        }
    }
    Ok(resolved)
}

/// Canonicalize the deepest existing ancestor of `path` and re-attach the rest
fn resolve_physically(path: &Path) -> Result<PathBuf, SandboxError> {
    for ancestor in path.ancestors() {
        match fs::canonicalize(ancestor) {
            Ok(real) => {
                let tail = path.strip_prefix(ancestor).unwrap_or_else(|_| Path::new(""));
                return Ok(if tail.as_os_str().is_empty() {
                    real
                } else {
                    real.join(tail)
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // A link whose target is missing would be followed on write
                if fs::symlink_metadata(ancestor).is_ok() {
                    return Err(SandboxError::Violation(format!(
                        "'{}' is a dangling symlink",
                        ancestor.display()
                    )));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(SandboxError::Violation(format!(
        "'{}' has no resolvable ancestor",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jail() -> (tempfile::TempDir, PathJail) {
        let dir = tempfile::tempdir().unwrap();
        let jail = PathJail::new(dir.path().join("data"));
        (dir, jail)
    }

    #[test]
    fn test_valid_path() {
        let (_dir, jail) = jail();
        let base = jail.canonical_base().unwrap();
        assert_eq!(jail.resolve("src/main.rs").unwrap(), base.join("src/main.rs"));
        assert_eq!(jail.resolve("./a/./b").unwrap(), base.join("a/b"));
        assert_eq!(jail.resolve("").unwrap(), base);
    }

    #[test]
    fn test_inner_parent_segments_allowed() {
        let (_dir, jail) = jail();
        let base = jail.canonical_base().unwrap();
        assert_eq!(jail.resolve("a/b/../c").unwrap(), base.join("a/c"));
    }

    #[test]
    fn test_traversal_blocked() {
        let (_dir, jail) = jail();
        for name in ["..", "../x", "src/../../etc/passwd", "a/../../data/x"] {
            assert!(
                matches!(jail.resolve(name), Err(SandboxError::Violation(_))),
                "{name} escaped"
            );
        }
    }

    #[test]
    fn test_absolute_blocked() {
        let (_dir, jail) = jail();
        assert!(matches!(
            jail.resolve("/etc/passwd"),
            Err(SandboxError::Violation(_))
        ));
    }

    #[test]
    fn test_sibling_with_common_prefix_blocked() {
        // "data-evil" shares a string prefix with "data" but is not inside it
        let (dir, jail) = jail();
        std::fs::create_dir_all(dir.path().join("data-evil")).unwrap();
        assert!(matches!(
            jail.resolve("../data-evil/x"),
            Err(SandboxError::Violation(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_base_blocked() {
        let (dir, jail) = jail();
        let base = jail.canonical_base().unwrap();
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, base.join("escape")).unwrap();

        assert!(matches!(
            jail.resolve("escape/secret.txt"),
            Err(SandboxError::Violation(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_blocked() {
        let (dir, jail) = jail();
        let base = jail.canonical_base().unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), base.join("dangling")).unwrap();

        assert!(matches!(
            jail.resolve("dangling"),
            Err(SandboxError::Violation(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_within_base_allowed() {
        let (_dir, jail) = jail();
        let base = jail.canonical_base().unwrap();
        std::fs::create_dir_all(base.join("real")).unwrap();
        std::os::unix::fs::symlink(base.join("real"), base.join("alias")).unwrap();

        assert_eq!(jail.resolve("alias/f.txt").unwrap(), base.join("real/f.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_keeps_final_symlink() {
        let (dir, jail) = jail();
        let base = jail.canonical_base().unwrap();
        std::fs::create_dir_all(base.join("real")).unwrap();
        std::os::unix::fs::symlink(base.join("real"), base.join("alias")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), base.join("dangling")).unwrap();

        assert_eq!(jail.resolve_entry("alias").unwrap(), base.join("alias"));
        assert_eq!(jail.resolve_entry("dangling").unwrap(), base.join("dangling"));
        assert_eq!(jail.resolve_entry("alias/f.txt").unwrap(), base.join("real/f.txt"));
        assert_eq!(jail.resolve_entry(".").unwrap(), base);
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_parent_still_confined() {
        let (dir, jail) = jail();
        let base = jail.canonical_base().unwrap();
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, base.join("escape")).unwrap();

        assert!(matches!(
            jail.resolve_entry("escape/file"),
            Err(SandboxError::Violation(_))
        ));
        assert!(matches!(
            jail.resolve_entry("../x"),
            Err(SandboxError::Violation(_))
        ));
    }
}
