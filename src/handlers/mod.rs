//! Module handlers for enrichbox
//!
//! Every enrichment capability is a [`ModuleHandler`] registered under a
//! unique name together with its [`ModuleDescriptor`].
//!
//! ## Key Components
//!
//! - [`ModuleHandler`] - Trait implemented by every module
//! - [`ModuleDescriptor`] - Inputs, accepted options and timeout class
//! - [`ModuleRegistry`] - Name to handler mapping, read-only once built
//! - [`Value`] - Closed set of shapes a module can return
//!
//! ## Example
//!
//! ```rust,ignore
//! use enrichbox::handlers::{ConfigBag, Fields, ModuleRegistry};
//!
//! let registry = ModuleRegistry::with_builtins()?;
//! let module = registry.resolve("dns")?;
//!
//! let fields = Fields::new().with("hostname", "www.circl.lu");
//! let output = module.handler.run(fields, ConfigBag::new()).await?;
//! ```

pub mod builtin;
mod registry;
mod traits;
mod types;

pub use registry::{ModuleDescriptor, ModuleRegistry, RegisteredModule, RegistryError};
pub use traits::{HandlerError, ModuleHandler};
pub use types::{ConfigBag, Fields, HandlerOutput, Value};
