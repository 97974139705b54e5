//! Template evaluation against events.
//!
//! [`Evaluator`] owns the function registry: the builtins, the string
//! library and the event helpers. The registry is built once and never
//! changes afterwards, so one evaluator can be shared by any number of
//! threads. Every call to [`Evaluator::evaluate`] parses its own throwaway
//! template: names are only used in diagnostics and are never registered,
//! so reusing a name is harmless.
//!
//! Output is plain text. Nothing is HTML-escaped and a trailing newline in
//! the source is kept.

use std::sync::Arc;

use crate::error::{Result, TemplateError};
use crate::event::Event;

use super::exec::execute;
use super::funcs::Funcs;
use super::helpers::{self, system_hostname, HostnameProvider};
use super::parse::parse;
use super::strings;

/// Renders templates against events.
///
/// # Example
///
/// ```rust
/// use event_template::{Check, Entity, Evaluator, Event, ObjectMeta};
///
/// let event = Event {
///     check: Some(Check {
///         metadata: ObjectMeta { name: "check-nginx".into(), ..Default::default() },
///         ..Default::default()
///     }),
///     entity: Some(Entity {
///         metadata: ObjectMeta { name: "webserver01".into(), ..Default::default() },
///         ..Default::default()
///     }),
///     ..Default::default()
/// };
///
/// let evaluator = Evaluator::with_hostname(|| "monitor01".to_string());
/// let output = evaluator
///     .evaluate(
///         "alert",
///         "{{ .Check.Name }} on {{ .Entity.Name }} (via {{ Hostname }})",
///         Some(&event),
///     )
///     .unwrap();
/// assert_eq!(output, "check-nginx on webserver01 (via monitor01)");
/// ```
#[derive(Debug)]
pub struct Evaluator {
    funcs: Funcs,
}

impl Evaluator {
    /// Creates an evaluator whose `Hostname` reads the system host name.
    pub fn new() -> Self {
        Self::with_hostname_provider(Arc::new(system_hostname))
    }

    /// Creates an evaluator whose `Hostname` returns what `hostname`
    /// produces.
    pub fn with_hostname<F>(hostname: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self::with_hostname_provider(Arc::new(hostname))
    }

    fn with_hostname_provider(hostname: HostnameProvider) -> Self {
        let mut funcs = Funcs::builtin();
        strings::register(&mut funcs);
        helpers::register(&mut funcs, hostname);
        Self { funcs }
    }

    /// Renders `source` against `data`.
    ///
    /// Fails without output when the source is empty, does not parse, or
    /// cannot be rendered against the event (including when there is no
    /// event at all).
    pub fn evaluate(&self, name: &str, source: &str, data: Option<&Event>) -> Result<String> {
        let result = self.render(name, source, data);
        match &result {
            Ok(output) => {
                tracing::debug!(template = name, bytes = output.len(), "rendered template")
            }
            Err(err) => {
                tracing::debug!(template = name, kind = err.kind(), error = %err, "template render failed")
            }
        }
        result
    }

    fn render(&self, name: &str, source: &str, data: Option<&Event>) -> Result<String> {
        if source.is_empty() {
            return Err(TemplateError::EmptySource {
                name: name.to_string(),
            });
        }

        let event = data.ok_or_else(|| TemplateError::Execution {
            name: name.to_string(),
            message: "no event data to render against".to_string(),
        })?;

        let tree = parse(source, &self.funcs).map_err(|source| TemplateError::Parse {
            name: name.to_string(),
            source,
        })?;
        execute(&tree, &self.funcs, event.to_value()).map_err(|err| TemplateError::Execution {
            name: name.to_string(),
            message: err.to_string(),
        })
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}
