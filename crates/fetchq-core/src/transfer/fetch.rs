//! HTTP/S fetch primitive: stream one URL's body into a `FileSink`.

use std::time::Duration;

use super::sink::FileSink;
use crate::config::TransferConfig;
use crate::retry::TransferError;

/// Streams the body of `url` into `sink` and returns the number of bytes
/// written. Implementations block; callers run them on a blocking thread.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, sink: &mut FileSink) -> Result<u64, TransferError>;
}

/// Reject anything that is not an absolute http(s) URL before touching the network.
pub fn validate_url(url: &str) -> Result<url::Url, TransferError> {
    let parsed = url::Url::parse(url).map_err(|e| TransferError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(TransferError::InvalidUrl(format!(
            "{url}: unsupported scheme {other}"
        ))),
    }
}

/// libcurl easy-handle fetcher (one handle per attempt).
#[derive(Debug, Clone)]
pub struct CurlFetcher {
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl CurlFetcher {
    pub fn new(cfg: &TransferConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs.max(1)),
            timeout: Duration::from_secs(cfg.timeout_secs.max(1)),
        }
    }
}

impl Default for CurlFetcher {
    fn default() -> Self {
        Self::new(&TransferConfig::default())
    }
}

impl Fetcher for CurlFetcher {
    fn fetch(&self, url: &str, sink: &mut FileSink) -> Result<u64, TransferError> {
        validate_url(url)?;

        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(Duration::from_secs(60))?;
        easy.timeout(self.timeout)?;

        let mut write_err: Option<std::io::Error> = None;
        let performed = {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| match sink.write_chunk(data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    write_err = Some(e);
                    Ok(0) // abort transfer
                }
            })?;
            transfer.perform()
        };

        if let Some(e) = write_err {
            return Err(TransferError::Storage(e));
        }
        performed?;

        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(TransferError::Http(code));
        }
        Ok(sink.bytes_written())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_url_accepts_http_and_https() {
        assert!(validate_url("https://example.com/a.tif").is_ok());
        assert!(validate_url("http://127.0.0.1:8080/x").is_ok());
    }

    #[test]
    fn validate_url_rejects_garbage_and_other_schemes() {
        assert!(matches!(
            validate_url("not a url"),
            Err(TransferError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("ftp://example.com/file"),
            Err(TransferError::InvalidUrl(_))
        ));
    }

    #[test]
    fn curl_fetcher_rejects_invalid_url_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::create(&dir.path().join("x.bin")).unwrap();
        let err = CurlFetcher::default()
            .fetch("file:///etc/passwd", &mut sink)
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidUrl(_)));
    }
}
