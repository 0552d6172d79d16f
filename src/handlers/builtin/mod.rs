//! Built-in modules
//!
//! A small reference set covering each handler family: network lookups
//! (`dns`, `reversedns`, `sourcecache`), syntax tooling
//! (`stix2_pattern_syntax_validator`, `yara_query`) and attachment parsing
//! (`docx_enrich`).

mod dns;
mod docx;
mod sourcecache;
mod stix2;
mod yara;

use std::sync::Arc;

use super::registry::ModuleDescriptor;
use super::traits::ModuleHandler;

pub use dns::{DnsHandler, ReverseDnsHandler};
pub use docx::DocxHandler;
pub use sourcecache::SourceCacheHandler;
pub use stix2::{Stix2PatternHandler, validate_pattern};
pub use yara::YaraQueryHandler;

pub(crate) fn all() -> Vec<(ModuleDescriptor, Arc<dyn ModuleHandler>)> {
    vec![
        (DnsHandler::descriptor(), Arc::new(DnsHandler)),
        (ReverseDnsHandler::descriptor(), Arc::new(ReverseDnsHandler)),
        (Stix2PatternHandler::descriptor(), Arc::new(Stix2PatternHandler)),
        (YaraQueryHandler::descriptor(), Arc::new(YaraQueryHandler)),
        (DocxHandler::descriptor(), Arc::new(DocxHandler)),
        (SourceCacheHandler::descriptor(), Arc::new(SourceCacheHandler)),
    ]
}
