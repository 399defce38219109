use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::Response;
use tokio::{
    fs,
    io::{AsyncWriteExt, BufWriter},
};
use tracing::{debug, trace};
use url::Url;

use crate::downloader::transfer::{Transfer, TransferOptions, Transferred};

#[derive(Debug, Default)]
pub struct HttpTransfer {
    client: reqwest::Client,
}

#[async_trait::async_trait]
impl Transfer for HttpTransfer {
    #[tracing::instrument(skip(self, url, options), fields(url = url.as_str()))]
    async fn transfer(
        &self,
        url: &Url,
        destination: &Path,
        options: TransferOptions,
    ) -> anyhow::Result<Transferred> {
        let resp = self.get_file_response(url, options.timeout).await?;

        if options.skip_if_complete && is_complete(destination, resp.content_length()).await {
            debug!("Destination already holds the whole file");
            return Ok(Transferred::AlreadyComplete);
        }

        write_resp_to_file(resp, destination).await?;

        Ok(Transferred::Written)
    }
}

impl HttpTransfer {
    async fn get_file_response(&self, url: &Url, timeout: Duration) -> anyhow::Result<Response> {
        debug!("Starting download");
        self.client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| anyhow::anyhow!(e))
    }
}

async fn is_complete(destination: &Path, content_length: Option<u64>) -> bool {
    let Some(expected) = content_length else {
        return false;
    };

    fs::metadata(destination)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() == expected)
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    destination.with_file_name(name)
}

async fn write_resp_to_file(resp: Response, file_path: &Path) -> anyhow::Result<()> {
    trace!(path = ?file_path, "Writing request response to disk");

    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let part_path = part_path(file_path);
    trace!(f = ?part_path, "Writing to partial file");

    if let Err(e) = stream_to(resp, &part_path).await {
        let _ = fs::remove_file(&part_path).await;
        return Err(e);
    }

    trace!(from = ?part_path, to = ?file_path, "Moving partial file to download path");
    fs::rename(&part_path, file_path).await?;

    debug!("Response written to disk");

    Ok(())
}

async fn stream_to(mut resp: Response, path: &Path) -> anyhow::Result<()> {
    let expected = resp.content_length();
    let mut written = 0u64;

    let mut out_file = BufWriter::new(fs::File::create(path).await?);
    while let Some(chunk) = resp.chunk().await? {
        out_file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out_file.flush().await?;

    if let Some(expected) = expected {
        if written != expected {
            anyhow::bail!("Incomplete body: got {written} of {expected} bytes");
        }
    }

    trace!(written, "Finished writing to disk");

    Ok(())
}
