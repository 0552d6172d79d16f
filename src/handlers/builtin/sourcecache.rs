use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use tracing::{debug, info};

use crate::handlers::registry::ModuleDescriptor;
use crate::handlers::traits::{HandlerError, ModuleHandler};
use crate::handlers::types::{ConfigBag, Fields, HandlerOutput};

const ARCHIVE_PATH_KEY: &str = "archivepath";
/// Largest source body kept in memory
const MAX_SOURCE_BYTES: usize = 20 * 1024 * 1024;
const USER_AGENT: &str = concat!("enrichbox/", env!("CARGO_PKG_VERSION"));

/// Fetches a link and returns its content base64-encoded in `data`,
/// optionally keeping a copy under the `archivepath` directory.
///
/// `archivepath` is operator-only: the value comes from the module's
/// configured defaults and a query cannot override it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceCacheHandler;

impl SourceCacheHandler {
    pub const INPUTS: [&'static str; 2] = ["link", "url"];

    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new("sourcecache")
            .description("Fetch a link and return its content")
            .inputs(Self::INPUTS)
            .operator_config([ARCHIVE_PATH_KEY])
            .external()
    }

    fn client() -> Result<Client, HandlerError> {
        Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| HandlerError::Internal(format!("HTTP client setup failed: {err}")))
    }
}

#[async_trait]
impl ModuleHandler for SourceCacheHandler {
    async fn run(&self, fields: Fields, config: ConfigBag) -> Result<HandlerOutput, HandlerError> {
        let (_, link) = fields
            .first_str(&Self::INPUTS)
            .ok_or_else(|| HandlerError::MissingInput(Self::INPUTS.join(", ")))?;
        let link = link.trim().to_string();

        if !link.starts_with("http://") && !link.starts_with("https://") {
            return Err(HandlerError::InvalidInput(format!(
                "'{link}' must be an http/https url"
            )));
        }

        let body = fetch(&link, MAX_SOURCE_BYTES).await?;

        if let Some(dir) = config.get(ARCHIVE_PATH_KEY) {
            let path = archive_path(Path::new(dir), &link);
            archive(&path, &body).await.map_err(|err| {
                HandlerError::Internal(format!("failed to archive {link}: {err}"))
            })?;
            info!(link = %link, path = %path.display(), size = body.len(), "Archived source");
        }

        Ok(HandlerOutput::values(link).with_data(STANDARD.encode(&body)))
    }
}

/// GET `link` and read at most `limit` bytes of its body
async fn fetch(link: &str, limit: usize) -> Result<Vec<u8>, HandlerError> {
    debug!(link = %link, "Fetching source");
    let mut response = SourceCacheHandler::client()?
        .get(link)
        .send()
        .await
        .map_err(|err| HandlerError::Upstream(format!("{link} not reachable: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(HandlerError::Upstream(format!(
            "{link} returned HTTP {}",
            status.as_u16()
        )));
    }

    let too_large = || HandlerError::Upstream(format!("{link} exceeds {limit} bytes"));
    if response
        .content_length()
        .is_some_and(|length| length > limit as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| HandlerError::Upstream(format!("failed to read {link}: {err}")))?
    {
        if body.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Archive location for `link`, always a direct child of `dir`
fn archive_path(dir: &Path, link: &str) -> PathBuf {
    let name = archive_file_name(link);
    let mut components = Path::new(&name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => dir.join(name),
        _ => dir.join("index"),
    }
}

async fn archive(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, body).await
}

/// Flat file name for `link`: anything outside `[A-Za-z0-9.-]` becomes `_`
fn archive_file_name(link: &str) -> String {
    let stripped = link
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let name: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = name.trim_matches('_');
    if name.chars().all(|c| c == '.') {
        "index".to_string()
    } else {
        name.to_string()
    }
}
