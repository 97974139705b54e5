//! Template parsing, execution and the function registry.
//!
//! Templates use the `text/template` dialect. Event fields are reached by
//! dotted path from `.`, functions take space-separated arguments, and a
//! pipe passes its value as the last argument of the next command:
//!
//! ```text
//! Check: {{ .Check.Name }} Entity: {{ .Entity.Name }}
//! Executed: {{(UnixTime .Check.Executed).Format "2 Jan 2006 15:04:05"}}
//! Event ID: {{UUIDFromBytes .ID}} Hostname: {{Hostname}}
//! {{ .Check.Name | replace "nginx" "sprig" | upper }}
//! {{ range $i, $h := .Check.History }}{{ if $i }},{{ end }}{{ $h.Status }}{{ end }}
//! ```
//!
//! Actions, `if`/`else if`/`else`, `range` (with `break` and `continue`),
//! `with`, variables, `define`/`template`/`block`, comments and the `{{-`
//! / `-}}` trim markers all behave as they do in `text/template`. A field
//! the data does not have is an execution error. `html`, `js`, `urlquery`
//! and `call` are not provided.
//!
//! ## Key Types
//!
//! - [`Evaluator`]: parses and renders templates against events
//! - [`Value`]: what templates see
//! - [`HostnameProvider`]: what `Hostname` reports
//!
//! ## See Also
//!
//! - [`crate::time`]: the value `UnixTime` returns

mod engine;
mod exec;
pub(crate) mod funcs;
mod helpers;
mod lexer;
mod node;
mod parse;
mod strings;
mod value;

pub use engine::Evaluator;
pub use helpers::{system_hostname, HostnameProvider};
pub use value::Value;

/// Largest text, in bytes, a render or a single helper call may produce.
pub const MAX_OUTPUT_LEN: usize = 1 << 20;
