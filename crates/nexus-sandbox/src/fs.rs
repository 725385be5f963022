//! Filesystem operations exposed to scripts as `nexus::sys`
//!
//! "Not found" is an answer, not an error: `load` gives `None`, `exists`
//! gives `false`, `list_dir` gives an empty listing and `remove` gives
//! `false`. Escapes and genuine I/O faults are errors.

use crate::{PathJail, SandboxError};
use nexus_net::HttpClient;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Subdirectory of the base that receives downloads
pub const DOWNLOADS_DIR: &str = "downloads";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "isDir")]
    pub is_dir: bool,
    pub size: u64,
}

pub struct SandboxedFs {
    jail: PathJail,
    http: Arc<HttpClient>,
}

impl SandboxedFs {
    pub fn new(base: impl Into<PathBuf>, http: Arc<HttpClient>) -> Self {
        Self {
            jail: PathJail::new(base),
            http,
        }
    }

    pub fn jail(&self) -> &PathJail {
        &self.jail
    }

    /// Write `content` to `name`, creating parent directories
    pub fn save(&self, name: &str, content: &str) -> Result<(), SandboxError> {
        let path = self.jail.resolve(name)?;
        ensure_parent(&path)?;
        fs::write(&path, content)?;
        debug!(path = %path.display(), bytes = content.len(), "saved");
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Option<String>, SandboxError> {
        let path = self.jail.resolve(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, name: &str) -> Result<bool, SandboxError> {
        Ok(self.jail.resolve(name)?.exists())
    }

    /// Entries of directory `name`, sorted by name
    pub fn list_dir(&self, name: &str) -> Result<Vec<DirEntry>, SandboxError> {
        let path = self.jail.resolve(name)?;
        let reader = match fs::read_dir(&path) {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in reader {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub fn mkdir(&self, name: &str) -> Result<(), SandboxError> {
        let path = self.jail.resolve(name)?;
        fs::create_dir_all(&path)?;
        Ok(())
    }

    /// Delete a file or a whole directory tree. Returns whether anything was there.
    /// A symlink is removed itself; its target is left alone.
    pub fn remove(&self, name: &str) -> Result<bool, SandboxError> {
        let path = self.jail.resolve_entry(name)?;
        if path == self.jail.canonical_base()? {
            return Err(SandboxError::Violation(
                "refusing to remove the sandbox root".to_string(),
            ));
        }

        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if meta.file_type().is_symlink() || !meta.is_dir() {
            fs::remove_file(&path)?;
        } else {
            fs::remove_dir_all(&path)?;
        }
        info!(path = %path.display(), "removed");
        Ok(true)
    }

    /// Fetch `url` into `downloads/<name>`. `true` on a 2xx response.
    pub fn download(&self, url: &str, name: &str) -> Result<bool, SandboxError> {
        let path = self.jail.resolve(Path::new(DOWNLOADS_DIR).join(name))?;
        ensure_parent(&path)?;

        let outcome = self.http.download(url, &path)?;
        info!(url, path = %path.display(), status = outcome.status, bytes = outcome.bytes, "download finished");
        Ok(outcome.is_success())
    }
}

fn ensure_parent(path: &Path) -> Result<(), SandboxError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_net::{
        ClientSettings, HttpResponse, PreparedRequest, RetryPolicy, Sleeper, Transport,
        TransportError,
    };
    use std::io::Write;
    use std::time::Duration;
    use url::Url;

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    /// Serves fixed bodies by URL path; unknown paths are 404
    struct StaticSite;

    impl Transport for StaticSite {
        fn send(&self, _: &PreparedRequest, _: Duration) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Connection("not used".to_string()))
        }

        fn stream(
            &self,
            url: &Url,
            _: Duration,
            sink: &mut dyn Write,
        ) -> Result<(u16, u64), TransportError> {
            match url.path() {
                "/logo.png" => {
                    sink.write_all(b"\x89PNG")?;
                    Ok((200, 4))
                }
                "/down" => Err(TransportError::Connection("refused".to_string())),
                _ => Ok((404, 0)),
            }
        }
    }

    fn sandbox() -> (tempfile::TempDir, SandboxedFs) {
        let dir = tempfile::tempdir().unwrap();
        let http = HttpClient::with_transport(
            Arc::new(StaticSite),
            Arc::new(NoSleep),
            ClientSettings {
                timeout: Duration::from_secs(1),
                retry: RetryPolicy::new(1, Duration::from_millis(1)),
            },
        );
        let fs = SandboxedFs::new(dir.path().join("data"), Arc::new(http));
        (dir, fs)
    }

    #[test]
    fn test_save_load_exists_remove() {
        let (_dir, fs) = sandbox();
        fs.save("a.txt", "hi").unwrap();
        assert_eq!(fs.load("a.txt").unwrap().as_deref(), Some("hi"));
        assert!(fs.exists("a.txt").unwrap());

        assert!(fs.remove("a.txt").unwrap());
        assert!(!fs.exists("a.txt").unwrap());
        assert!(!fs.remove("a.txt").unwrap());
    }

    #[test]
    fn test_missing_file_is_absent() {
        let (_dir, fs) = sandbox();
        assert_eq!(fs.load("nope.txt").unwrap(), None);
        assert!(!fs.exists("nope.txt").unwrap());
        assert!(fs.list_dir("nope").unwrap().is_empty());
    }

    #[test]
    fn test_save_creates_parents() {
        let (_dir, fs) = sandbox();
        fs.save("notes/2024/today.md", "# hi").unwrap();
        assert_eq!(fs.load("notes/2024/today.md").unwrap().as_deref(), Some("# hi"));
    }

    #[test]
    fn test_list_dir_sorted_with_sizes() {
        let (_dir, fs) = sandbox();
        fs.save("b.txt", "12345").unwrap();
        fs.save("a.txt", "1").unwrap();
        fs.mkdir("c").unwrap();

        let entries = fs.list_dir("").unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry { name: "a.txt".into(), is_dir: false, size: 1 },
                DirEntry { name: "b.txt".into(), is_dir: false, size: 5 },
                DirEntry { name: "c".into(), is_dir: true, size: 0 },
            ]
        );

        let json = serde_json::to_value(&entries[2]).unwrap();
        assert_eq!(json["isDir"], true);
    }

    #[test]
    fn test_remove_directory_tree() {
        let (_dir, fs) = sandbox();
        fs.save("tree/leaf/file.txt", "x").unwrap();
        assert!(fs.remove("tree").unwrap());
        assert!(!fs.exists("tree").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_symlink_keeps_target() {
        let (_dir, fs) = sandbox();
        fs.save("real/keep.txt", "kept").unwrap();
        let base = fs.jail().canonical_base().unwrap();
        std::os::unix::fs::symlink(base.join("real"), base.join("alias")).unwrap();

        assert!(fs.remove("alias").unwrap());
        assert!(std::fs::symlink_metadata(base.join("alias")).is_err());
        assert_eq!(fs.load("real/keep.txt").unwrap().as_deref(), Some("kept"));
        assert!(!fs.remove("alias").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_dangling_and_outward_links() {
        let (dir, fs) = sandbox();
        let base = fs.jail().canonical_base().unwrap();
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("secret.txt"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), base.join("dangling")).unwrap();
        std::os::unix::fs::symlink(&outside, base.join("out")).unwrap();

        assert!(fs.remove("dangling").unwrap());
        assert!(std::fs::symlink_metadata(base.join("dangling")).is_err());

        assert!(fs.remove("out").unwrap());
        assert!(outside.join("secret.txt").exists());
        assert!(matches!(fs.remove("out/secret.txt"), Ok(false)));
    }

    #[test]
    fn test_escapes_rejected_everywhere() {
        let (dir, fs) = sandbox();
        std::fs::write(dir.path().join("secret.txt"), "top secret").unwrap();

        assert!(matches!(fs.load("../secret.txt"), Err(SandboxError::Violation(_))));
        assert!(matches!(fs.save("../x", "y"), Err(SandboxError::Violation(_))));
        assert!(matches!(fs.exists("/etc/passwd"), Err(SandboxError::Violation(_))));
        assert!(matches!(fs.list_dir(".."), Err(SandboxError::Violation(_))));
        assert!(matches!(fs.mkdir("../evil"), Err(SandboxError::Violation(_))));
        assert!(matches!(fs.remove("../secret.txt"), Err(SandboxError::Violation(_))));
        assert!(dir.path().join("secret.txt").exists());
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let (_dir, fs) = sandbox();
        assert!(matches!(fs.remove(""), Err(SandboxError::Violation(_))));
        assert!(matches!(fs.remove("."), Err(SandboxError::Violation(_))));
        assert!(fs.jail().base().exists());
    }

    #[test]
    fn test_download_into_downloads_dir() {
        let (_dir, fs) = sandbox();
        assert!(fs.download("http://site.test/logo.png", "logo.png").unwrap());
        assert_eq!(fs.load("downloads/logo.png").unwrap().as_deref(), Some("\u{FFFD}PNG"));
    }

    #[test]
    fn test_download_error_status_is_false() {
        let (_dir, fs) = sandbox();
        assert!(!fs.download("http://site.test/missing", "missing.bin").unwrap());
        assert!(!fs.exists("downloads/missing.bin").unwrap());
    }

    #[test]
    fn test_download_transport_failure_is_error() {
        let (_dir, fs) = sandbox();
        let err = fs.download("http://site.test/down", "down.bin").unwrap_err();
        match err {
            SandboxError::Net(net) => assert_eq!(net.attempts(), Some(2)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_download_name_cannot_escape() {
        let (_dir, fs) = sandbox();
        assert!(matches!(
            fs.download("http://site.test/logo.png", "../../x.png"),
            Err(SandboxError::Violation(_))
        ));
    }
}
