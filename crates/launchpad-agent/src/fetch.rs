use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("download {url}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download {url}: server answered HTTP {code}")]
    HttpStatus { url: String, code: u16 },

    #[error("write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("launchpad/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> FetchError + '_ {
    move |source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Downloads `url` into `dest`, replacing whatever is there.
///
/// The body is streamed into `<dest>.part` and renamed over `dest` once
/// complete, so an interrupted download never leaves a truncated `dest`.
/// Single attempt. Returns the number of bytes written.
pub async fn fetch(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64, FetchError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            code: status.as_u16(),
        });
    }

    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_err(parent))?;
    }

    let tmp = part_path(dest);
    let written = match write_body(url, resp, &tmp).await {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
    };

    if let Err(source) = tokio::fs::rename(&tmp, dest).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(FetchError::Io {
            path: dest.to_path_buf(),
            source,
        });
    }

    tracing::debug!(url, dest = %dest.display(), bytes = written, "download complete");
    Ok(written)
}

async fn write_body(url: &str, resp: reqwest::Response, tmp: &Path) -> Result<u64, FetchError> {
    let mut f = tokio::fs::File::create(tmp).await.map_err(io_err(tmp))?;
    let mut total: u64 = 0;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;
        total = total.saturating_add(chunk.len() as u64);
        f.write_all(&chunk).await.map_err(io_err(tmp))?;
    }
    f.flush().await.map_err(io_err(tmp))?;
    f.sync_all().await.ok();
    Ok(total)
}
