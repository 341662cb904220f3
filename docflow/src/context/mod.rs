//! Request-scoped context shared with stages.

mod request;

pub use request::RequestContext;
