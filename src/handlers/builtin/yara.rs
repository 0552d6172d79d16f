use async_trait::async_trait;

use crate::handlers::registry::ModuleDescriptor;
use crate::handlers::traits::{HandlerError, ModuleHandler};
use crate::handlers::types::{ConfigBag, Fields, HandlerOutput};

/// Builds a YARA rule matching a file hash
#[derive(Debug, Clone, Copy, Default)]
pub struct YaraQueryHandler;

impl YaraQueryHandler {
    pub const INPUTS: [&'static str; 7] = [
        "md5",
        "sha1",
        "sha256",
        "imphash",
        "filename|md5",
        "filename|sha1",
        "filename|sha256",
    ];

    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new("yara_query")
            .description("Generate a YARA rule from a hash attribute")
            .inputs(Self::INPUTS)
    }
}

#[async_trait]
impl ModuleHandler for YaraQueryHandler {
    async fn run(&self, fields: Fields, _config: ConfigBag) -> Result<HandlerOutput, HandlerError> {
        let (key, value) = fields
            .first_str(&Self::INPUTS)
            .ok_or_else(|| HandlerError::MissingInput(Self::INPUTS.join(", ")))?;

        let (hash_type, hash) = match key.split_once('|') {
            Some((_, hash_type)) => {
                let hash = value.rsplit('|').next().unwrap_or(value);
                (hash_type, hash)
            }
            None => (key, value),
        };

        build_rule(hash_type, hash).map(HandlerOutput::values)
    }
}

fn expected_length(hash_type: &str) -> Option<usize> {
    match hash_type {
        "md5" | "imphash" => Some(32),
        "sha1" => Some(40),
        "sha256" => Some(64),
        _ => None,
    }
}

/// Rule text for `hash_type` (`md5`, `sha1`, `sha256` or `imphash`)
pub fn build_rule(hash_type: &str, hash: &str) -> Result<String, HandlerError> {
    let length = expected_length(hash_type)
        .ok_or_else(|| HandlerError::InvalidInput(format!("unsupported hash type: {hash_type}")))?;

    let hash = hash.trim().to_ascii_lowercase();
    if hash.len() != length || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(HandlerError::InvalidInput(format!(
            "'{hash}' is not a valid {hash_type} value"
        )));
    }

    let (import, condition) = if hash_type == "imphash" {
        ("pe", format!("pe.imphash() == \"{hash}\""))
    } else {
        ("hash", format!("hash.{hash_type}(0, filesize) == \"{hash}\""))
    };

    Ok(format!(
        "import \"{import}\"\r\nrule {name} {{\r\n\tcondition:\r\n\t\t{condition}\r\n}}",
        name = hash_type.to_ascii_uppercase()
    ))
}
