//! # Event Template - Render Alert Text from Monitoring Events
//!
//! `event-template` turns a template and a monitoring [`Event`] (a check
//! result about an entity) into a notification message, log line or alert
//! body.
//!
//! ## Core Concepts
//!
//! - [`evaluate`]: render a template with the shared default [`Evaluator`]
//! - [`Evaluator`]: a reusable, thread-safe function registry
//! - [`Event`]: the event record, deserializable from its JSON wire format
//! - [`TemplateError`]: why a render produced no text
//! - [`Value`]: the field tree a template renders against
//!
//! ## Quick Start
//!
//! ```rust
//! use event_template::{evaluate, Event};
//!
//! let event: Event = serde_json::from_str(r#"{
//!     "check": { "metadata": { "name": "check-nginx" }, "executed": 1520275913 },
//!     "entity": { "metadata": { "name": "webserver01" } }
//! }"#).unwrap();
//!
//! let output = evaluate(
//!     "alert",
//!     "Check: {{ .Check.Name }} Entity: {{ .Entity.Name }} !",
//!     Some(&event),
//! ).unwrap();
//! assert_eq!(output, "Check: check-nginx Entity: webserver01 !");
//! ```
//!
//! ## Failure Is All-or-Nothing
//!
//! A render either returns the complete text or an error, never partial
//! output. Referencing a field the event does not have is an error, as is
//! rendering with no event:
//!
//! ```rust
//! use event_template::{evaluate, Event, TemplateError};
//!
//! let event = Event::default();
//! assert!(matches!(
//!     evaluate("alert", "{{ .Check.Name }}", Some(&event)),
//!     Err(TemplateError::Execution { .. })
//! ));
//! assert!(evaluate("alert", "text", None).is_err());
//! assert!(matches!(
//!     evaluate("alert", "", Some(&event)),
//!     Err(TemplateError::EmptySource { .. })
//! ));
//! ```

mod error;
pub mod event;
pub mod template;
pub mod time;

use once_cell::sync::Lazy;

pub use error::{ParseError, Result, TemplateError};
pub use event::{Check, CheckHistory, Entity, Event, ObjectMeta, System};
pub use template::{Evaluator, HostnameProvider, Value, MAX_OUTPUT_LEN};
pub use time::Time;

static DEFAULT_EVALUATOR: Lazy<Evaluator> = Lazy::new(Evaluator::new);

/// Renders `source` against `data` with the default [`Evaluator`].
///
/// `name` only appears in error messages. See [`Evaluator::evaluate`].
pub fn evaluate(name: &str, source: &str, data: Option<&Event>) -> Result<String> {
    DEFAULT_EVALUATOR.evaluate(name, source, data)
}
