//! Query dispatch
//!
//! Inbound query → [`validate`] → [`Dispatcher`] (handler run under a
//! timeout) → [`normalize`] → response envelope.

mod dispatcher;
mod error;
mod normalizer;
mod policy;
mod request;
mod validator;

pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use normalizer::{Envelope, Outcome, ResultEntry, normalize};
pub use policy::DispatchPolicy;
pub use request::QueryRequest;
pub use validator::{ValidatedRequest, validate};
