//! Home-control directives embedded in assistant replies
//!
//! Replies carry zero or more `<HA_COMMAND>{...}</HA_COMMAND>` tags. Parsing
//! is two-stage: the tag boundaries yield candidate payloads, then each
//! payload is decoded strictly. Anything that fails to decode is skipped.

mod dispatch;
mod parse;

pub use dispatch::{DirectiveSink, DispatchReport, HomeAssistant, dispatch_all};
pub use parse::{Directive, ServiceCall, candidates, clean_response, decode, extract_directives};
