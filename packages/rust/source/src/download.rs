//! Writing a bundle into a landing directory with an in-progress marker.

use std::path::{Path, PathBuf};

use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use url::Url;

use tenderflow_shared::{Result, TenderflowError};

/// Suffix carried by a file while it is still being written.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Fallback name when neither the headers nor the URL carry one.
const DEFAULT_BUNDLE_NAME: &str = "bundle.zip";

/// Stream `url` into `dir`, as `<name>.part` first, renamed once complete.
///
/// Returns the final path. Transfer failures come back as
/// [`TenderflowError::Download`]; landing-directory failures as I/O errors.
#[instrument(skip_all, fields(url = %url))]
pub async fn fetch_into(client: &Client, url: &Url, dir: &Path) -> Result<PathBuf> {
    let mut response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| TenderflowError::Download(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TenderflowError::Download(format!("{url}: HTTP {status}")));
    }

    let name = file_name_for(response.headers(), url);
    let final_path = dir.join(&name);
    let partial_path = dir.join(format!("{name}{PARTIAL_SUFFIX}"));

    let mut file = tokio::fs::File::create(&partial_path)
        .await
        .map_err(|e| TenderflowError::io(&partial_path, e))?;

    let mut written: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| TenderflowError::Download(format!("{url}: failed to read body: {e}")))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| TenderflowError::io(&partial_path, e))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| TenderflowError::io(&partial_path, e))?;
    drop(file);

    tokio::fs::rename(&partial_path, &final_path)
        .await
        .map_err(|e| TenderflowError::io(&final_path, e))?;

    debug!(file = %name, bytes = written, "bundle written");
    Ok(final_path)
}

/// Pick a file name from `Content-Disposition`, else the last URL segment.
pub fn file_name_for(headers: &HeaderMap, url: &Url) -> String {
    let from_header = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_file_name);

    let from_url = || {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    from_header
        .or_else(from_url)
        .map(|name| sanitize(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_BUNDLE_NAME.to_string())
}

fn disposition_file_name(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        let (key, raw) = part.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = raw.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// Keep only the last path component and drop characters unsafe in file names.
fn sanitize(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    last.chars()
        .filter(|c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect::<String>()
        .trim_start_matches('.')
        .trim()
        .to_string()
}
