use crate::io::redownload::RedownloadQueue;
use crate::types::{GridError, GridResult};
use std::path::{Path, PathBuf};

/// HTTP download parameters
#[derive(Debug, Clone)]
pub struct DownloadParams {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Bodies smaller than this are treated as error pages
    pub min_size_bytes: u64,
}

impl Default for DownloadParams {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            user_agent: format!("efmi-regrid/{}", env!("CARGO_PKG_VERSION")),
            min_size_bytes: 1024,
        }
    }
}

/// Data-archive credentials stored as `user:` and `password:` lines
#[derive(Clone, PartialEq, Eq)]
pub struct HdaCredentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for HdaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdaCredentials").field("user", &self.user).finish_non_exhaustive()
    }
}

impl HdaCredentials {
    /// Default location, `~/.hdarc`
    pub fn default_path() -> GridResult<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".hdarc"))
            .ok_or_else(|| GridError::Config("Could not determine home directory".to_string()))
    }

    /// Load from `~/.hdarc`. The file is never created or prompted for.
    pub fn load() -> GridResult<Self> {
        Self::from_path(&Self::default_path()?)
    }

    pub fn from_path(path: &Path) -> GridResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GridError::Config(format!("Cannot read credentials {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> GridResult<Self> {
        let mut user = None;
        let mut password = None;
        for line in content.lines() {
            if let Some((key, value)) = line.split_once(':') {
                match key.trim() {
                    "user" => user = Some(value.trim().to_string()),
                    "password" => password = Some(value.trim().to_string()),
                    _ => {}
                }
            }
        }
        match (user, password) {
            (Some(user), Some(password)) if !user.is_empty() => Ok(Self { user, password }),
            _ => Err(GridError::Config("Credentials need 'user:' and 'password:' lines".to_string())),
        }
    }
}

/// One file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub file_name: String,
}

impl DownloadRequest {
    /// File name defaults to the last URL path segment
    pub fn new(url: &str, file_name: Option<&str>) -> GridResult<Self> {
        let name = match file_name {
            Some(name) => name.to_string(),
            None => url
                .split('?')
                .next()
                .and_then(|u| u.rsplit('/').next())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| GridError::Config(format!("Cannot derive a file name from {}", url)))?,
        };
        Ok(Self { url: url.to_string(), file_name: name })
    }

    /// Parse a URL list: one `url [file_name]` per line, `#` comments allowed
    pub fn parse_list(content: &str) -> GridResult<Vec<Self>> {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|line| {
                let mut parts = line.split_whitespace();
                let url = parts.next().unwrap_or_default();
                Self::new(url, parts.next())
            })
            .collect()
    }
}

/// Sequential downloader over one long-lived HTTP session.
///
/// Failed requests and files that do not open are queued for another
/// download; there is no retry loop.
pub struct Downloader {
    client: reqwest::blocking::Client,
    params: DownloadParams,
    credentials: Option<HdaCredentials>,
}

impl Downloader {
    pub fn new(params: DownloadParams, credentials: Option<HdaCredentials>) -> GridResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(params.timeout_secs))
            .user_agent(params.user_agent.clone())
            .build()?;
        Ok(Self { client, params, credentials })
    }

    /// Fetch every request into `dest_dir`, verifying each file with `verify`.
    /// Returns the files that downloaded and verified.
    pub fn fetch_all<V>(
        &self,
        requests: &[DownloadRequest],
        dest_dir: &Path,
        verify: V,
        queue: &mut RedownloadQueue,
    ) -> GridResult<Vec<PathBuf>>
    where
        V: Fn(&Path) -> GridResult<()>,
    {
        std::fs::create_dir_all(dest_dir)?;
        let mut fetched = Vec::new();
        for (i, request) in requests.iter().enumerate() {
            let path = dest_dir.join(&request.file_name);
            match self.fetch_one(request, &path).and_then(|_| verify(&path)) {
                Ok(()) => {
                    log::info!("Downloaded: {} ({}/{})", request.file_name, i + 1, requests.len());
                    fetched.push(path);
                }
                Err(e) => {
                    if path.exists() {
                        if let Err(rm) = std::fs::remove_file(&path) {
                            log::debug!("Could not remove {}: {}", path.display(), rm);
                        }
                    }
                    queue.push(&path, e.to_string());
                }
            }
        }
        Ok(fetched)
    }

    /// Single GET streamed to `path`
    pub fn fetch_one(&self, request: &DownloadRequest, path: &Path) -> GridResult<()> {
        log::debug!("GET {}", request.url);
        let mut builder = self.client.get(&request.url);
        if let Some(creds) = &self.credentials {
            builder = builder.basic_auth(&creds.user, Some(&creds.password));
        }
        let mut response = builder.send()?;

        if !response.status().is_success() {
            return Err(GridError::Processing(format!(
                "HTTP {} {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or(""),
                request.url
            )));
        }

        let mut file = std::fs::File::create(path)?;
        let written = response.copy_to(&mut file)?;
        if written < self.params.min_size_bytes {
            return Err(GridError::InvalidFormat(format!(
                "Downloaded file too small ({} bytes), likely an error page",
                written
            )));
        }
        log::debug!("Wrote {} bytes to {}", written, path.display());
        Ok(())
    }
}

/// Scan `files`, queue the ones `verify` cannot open and report them.
/// With `purge` the corrupt copies are deleted.
pub fn check_files<P>(files: &[PathBuf], verify: P, purge: bool) -> RedownloadQueue
where
    P: Fn(&Path) -> GridResult<()>,
{
    let mut queue = RedownloadQueue::new();
    for file in files {
        if let Err(e) = verify(file) {
            queue.push(file, e.to_string());
        }
    }
    if !queue.is_empty() {
        log::warn!("Download these again:");
        for path in queue.paths() {
            log::warn!("  {}", path.display());
        }
        if purge {
            queue.purge();
        }
    }
    queue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials() {
        let creds = HdaCredentials::parse("user:forest\npassword: s3cret\n").unwrap();
        assert_eq!(creds.user, "forest");
        assert_eq!(creds.password, "s3cret");
        assert!(!format!("{:?}", creds).contains("s3cret"));
        assert!(HdaCredentials::parse("user:forest\n").is_err());
    }

    #[test]
    fn test_parse_url_list() {
        let list = "# LAI\nhttps://example.org/data/c_gls_LAI300_201401100000.nc\n\nhttps://example.org/get?id=7 lai_7.nc\n";
        let requests = DownloadRequest::parse_list(list).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].file_name, "c_gls_LAI300_201401100000.nc");
        assert_eq!(requests[1].file_name, "lai_7.nc");
    }

    #[test]
    fn test_unreachable_host_is_queued() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(DownloadParams { timeout_secs: 5, ..Default::default() }, None).unwrap();
        let requests = vec![DownloadRequest::new("http://127.0.0.1:9/missing.nc", None).unwrap()];

        let mut queue = RedownloadQueue::new();
        let fetched = downloader.fetch_all(&requests, dir.path(), |_| Ok(()), &mut queue).unwrap();
        assert!(fetched.is_empty());
        assert!(queue.contains(&dir.path().join("missing.nc")));
    }

    #[test]
    fn test_check_files_purges_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.nc");
        let bad = dir.path().join("bad.nc");
        std::fs::write(&good, b"ok").unwrap();
        std::fs::write(&bad, b"").unwrap();

        let verify = |p: &Path| -> GridResult<()> {
            if std::fs::metadata(p)?.len() == 0 {
                Err(GridError::InvalidFormat("empty".to_string()))
            } else {
                Ok(())
            }
        };
        let queue = check_files(&[good.clone(), bad.clone()], verify, true);
        assert_eq!(queue.paths(), vec![bad.clone()]);
        assert!(!bad.exists());
        assert!(good.exists());
    }
}
