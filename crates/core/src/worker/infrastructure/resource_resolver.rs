use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::APP_DIR_NAME;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write engine resource to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("engine resource not found: {0}")]
    NotFound(String),
    #[error("cannot derive a file name from {0}")]
    InvalidLocation(String),
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Download progress: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type DownloadProgress<'a> = &'a mut dyn FnMut(u64, u64);

/// Finds the engine resource named by an init location.
///
/// Resolution order:
/// 1. An existing local path is used as is
/// 2. Cache directory, by file name
/// 3. Bundled directory, by file name
/// 4. Download from the URL into the cache
pub struct ResourceResolver {
    cache_dir: PathBuf,
    bundled_dir: Option<PathBuf>,
}

impl ResourceResolver {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            bundled_dir: None,
        }
    }

    /// Resolver over the platform cache directory.
    pub fn with_default_cache() -> Result<Self, ResolveError> {
        Ok(Self::new(engine_cache_dir()?))
    }

    pub fn with_bundled_dir(mut self, dir: PathBuf) -> Self {
        self.bundled_dir = Some(dir);
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn resolve(
        &self,
        location: &str,
        progress: DownloadProgress<'_>,
    ) -> Result<PathBuf, ResolveError> {
        if !is_remote(location) {
            let local = PathBuf::from(location);
            if local.exists() {
                return Ok(local);
            }
        }

        let name = file_name_for(location)
            .ok_or_else(|| ResolveError::InvalidLocation(location.to_string()))?;

        let cached_path = self.cache_dir.join(name);
        if cached_path.exists() {
            return Ok(cached_path);
        }

        if let Some(dir) = &self.bundled_dir {
            let bundled_path = dir.join(name);
            if bundled_path.exists() {
                return Ok(bundled_path);
            }
        }

        if !is_remote(location) {
            return Err(ResolveError::NotFound(location.to_string()));
        }

        fs::create_dir_all(&self.cache_dir).map_err(ResolveError::CacheDir)?;
        download(location, &cached_path, progress)?;
        Ok(cached_path)
    }
}

/// Platform-specific engine cache directory.
///
/// - macOS: `~/Library/Application Support/ScanBridge/engines/`
/// - Linux: `$XDG_CACHE_HOME/ScanBridge/engines/` or `~/.cache/ScanBridge/engines/`
/// - Windows: `%LOCALAPPDATA%/ScanBridge/engines/`
pub fn engine_cache_dir() -> Result<PathBuf, ResolveError> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map(|d| d.join(APP_DIR_NAME).join("engines"))
        .ok_or(ResolveError::NoCacheDir)
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Last path segment of a URL or path, without query or fragment.
fn file_name_for(location: &str) -> Option<&str> {
    let trimmed = location
        .split(['?', '#'])
        .next()
        .unwrap_or(location)
        .trim_end_matches(['/', '\\']);
    let name = trimmed.rsplit(['/', '\\']).next()?;
    if name.is_empty() || name.contains(':') {
        None
    } else {
        Some(name)
    }
}

fn download(url: &str, dest: &Path, progress: DownloadProgress<'_>) -> Result<(), ResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: DownloadProgress<'_>,
) -> Result<(), ResolveError> {
    log::info!("downloading engine resource from {url}");
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let write_err = |path: &Path, source: std::io::Error| ResolveError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = fs::File::create(temp_path).map_err(|e| write_err(temp_path, e))?;

    let mut reader = response;
    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| write_err(temp_path, e))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .map_err(|e| write_err(temp_path, e))?;
        downloaded += n as u64;
        progress(downloaded, total);
    }

    file.flush().map_err(|e| write_err(temp_path, e))?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| write_err(dest, e))?;
    log::info!("engine resource cached at {}", dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn no_progress() -> impl FnMut(u64, u64) {
        |_, _| {}
    }

    #[rstest]
    #[case("https://cdn.example.com/engine/scan.wasm", Some("scan.wasm"))]
    #[case("https://cdn.example.com/engine/scan.wasm?v=3#x", Some("scan.wasm"))]
    #[case("resources/scan.script", Some("scan.script"))]
    #[case("scan.script", Some("scan.script"))]
    #[case("https://cdn.example.com/engine/", Some("engine"))]
    #[case("https://", None)]
    #[case("", None)]
    fn test_file_name_for(#[case] location: &str, #[case] expected: Option<&str>) {
        assert_eq!(file_name_for(location), expected);
    }

    #[test]
    fn test_existing_local_path_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.script");
        fs::write(&path, "valid").unwrap();

        let resolver = ResourceResolver::new(dir.path().join("cache"));
        let resolved = resolver
            .resolve(path.to_str().unwrap(), &mut no_progress())
            .unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn test_cached_resource_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("scan.wasm"), b"cached").unwrap();

        let resolver = ResourceResolver::new(cache.clone());
        let resolved = resolver
            .resolve("https://cdn.invalid/engine/scan.wasm", &mut no_progress())
            .unwrap();
        assert_eq!(resolved, cache.join("scan.wasm"));
    }

    #[test]
    fn test_bundled_resource_found_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let bundled = dir.path().join("bundled");
        fs::create_dir_all(&bundled).unwrap();
        fs::write(bundled.join("scan.wasm"), b"bundled").unwrap();

        let resolver =
            ResourceResolver::new(dir.path().join("cache")).with_bundled_dir(bundled.clone());
        let resolved = resolver
            .resolve("https://cdn.invalid/scan.wasm", &mut no_progress())
            .unwrap();
        assert_eq!(resolved, bundled.join("scan.wasm"));
    }

    #[test]
    fn test_missing_local_resource_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ResourceResolver::new(dir.path().join("cache"));
        let err = resolver
            .resolve("does/not/exist.script", &mut no_progress())
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
        assert!(!dir.path().join("cache").exists());
    }

    #[test]
    fn test_engine_cache_dir_ends_with_app_dir() {
        if let Ok(dir) = engine_cache_dir() {
            assert!(dir.ends_with(Path::new(APP_DIR_NAME).join("engines")));
        }
    }
}
