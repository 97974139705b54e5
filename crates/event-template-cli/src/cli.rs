//! Command-line arguments and the render command.
//!
//! ```text
//! evtmpl --template 'Check: {{ .Check.Name }} on {{ .Entity.Name }}' --event event.json
//! evtmpl --template-file alert.tmpl < event.json
//! ```
//!
//! Exactly one template source is used. A source given on the command line
//! wins over one from `EVTMPL_TEMPLATE` / `EVTMPL_TEMPLATE_FILE`, so a
//! default template in the environment can be overridden per call.

use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::parser::ValueSource;
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};
use event_template::Event;

/// Render a template against a monitoring event
#[derive(Parser, Debug)]
#[command(name = "evtmpl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Template text
    #[arg(short, long, env = "EVTMPL_TEMPLATE")]
    pub template: Option<String>,

    /// File containing the template
    #[arg(short = 'f', long, env = "EVTMPL_TEMPLATE_FILE")]
    pub template_file: Option<PathBuf>,

    /// Event file, JSON or YAML (by extension); `-` reads JSON from stdin
    #[arg(short, long, env = "EVTMPL_EVENT", default_value = "-")]
    pub event: PathBuf,

    /// Template name shown in error messages [default: file stem, or "template"]
    #[arg(short, long)]
    pub name: Option<String>,

    /// More log output on stderr (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parses `args` and settles on a single template source.
    ///
    /// When one source comes from the command line and the other from the
    /// environment, the environment value is dropped. Two sources from the
    /// same place, or none at all, are usage errors.
    pub fn try_parse_args<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;
        let from_env = |id: &str| matches.value_source(id) == Some(ValueSource::EnvVariable);

        match (cli.template.is_some(), cli.template_file.is_some()) {
            (true, true) => match (from_env("template"), from_env("template_file")) {
                (true, false) => cli.template = None,
                (false, true) => cli.template_file = None,
                _ => {
                    return Err(Self::command().error(
                        ErrorKind::ArgumentConflict,
                        "--template and --template-file cannot be used together",
                    ))
                }
            },
            (false, false) => {
                return Err(Self::command().error(
                    ErrorKind::MissingRequiredArgument,
                    "one of --template or --template-file is required",
                ))
            }
            _ => {}
        }
        Ok(cli)
    }
}

/// Renders the template and writes the result to `stdout`.
pub fn run(cli: &Cli, stdin: impl Read, mut stdout: impl Write) -> Result<()> {
    let (name, source) = load_template(cli)?;
    let event = load_event(&cli.event, stdin)?;

    tracing::info!(template = %name, event = %cli.event.display(), "rendering");
    let rendered = event_template::evaluate(&name, &source, Some(&event))
        .with_context(|| format!("failed to render template {name:?}"))?;

    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn load_template(cli: &Cli) -> Result<(String, String)> {
    match (&cli.template, &cli.template_file) {
        (Some(source), None) => {
            let name = cli.name.clone().unwrap_or_else(|| "template".to_string());
            Ok((name, source.clone()))
        }
        (None, Some(path)) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read template file {}", path.display()))?;
            let name = cli.name.clone().unwrap_or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "template".to_string())
            });
            Ok((name, source))
        }
        _ => anyhow::bail!("exactly one of --template or --template-file is required"),
    }
}

fn load_event(path: &Path, mut stdin: impl Read) -> Result<Event> {
    if path == Path::new("-") {
        let mut raw = String::new();
        stdin
            .read_to_string(&mut raw)
            .context("failed to read event from stdin")?;
        return serde_json::from_str(&raw).context("failed to parse event JSON from stdin");
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read event file {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse event YAML {}", path.display()))
    } else {
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse event JSON {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Cursor;
    use tempfile::TempDir;

    const EVENT: &str = r#"{
        "check": { "metadata": { "name": "check-nginx" }, "executed": 1520275913 },
        "entity": { "metadata": { "name": "webserver01" } },
        "id": "JZnFp9+fQF2OxA6Tb8Hc5g=="
    }"#;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn run_with(args: &[&str], stdin: &str) -> Result<String> {
        let cli = Cli::try_parse_args(args)?;
        let mut out = Vec::new();
        run(&cli, Cursor::new(stdin.to_string()), &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    fn clear_template_env() {
        std::env::remove_var("EVTMPL_TEMPLATE");
        std::env::remove_var("EVTMPL_TEMPLATE_FILE");
    }

    #[test]
    fn test_inline_template_from_stdin_event() {
        let output = run_with(
            &["evtmpl", "--template", "{{ .Check.Name }}@{{ .Entity.Name }}"],
            EVENT,
        )
        .unwrap();
        assert_eq!(output, "check-nginx@webserver01");
    }

    #[test]
    fn test_template_file_and_event_file() {
        let dir = TempDir::new().unwrap();
        let template = write_file(dir.path(), "alert.tmpl", "ID {{UUIDFromBytes .ID}}\n");
        let event = write_file(dir.path(), "event.json", EVENT);

        let output = run_with(
            &[
                "evtmpl",
                "--template-file",
                template.to_str().unwrap(),
                "--event",
                event.to_str().unwrap(),
            ],
            "",
        )
        .unwrap();
        assert_eq!(output, "ID 2599c5a7-df9f-405d-8ec4-0e936fc1dce6\n");
    }

    #[test]
    fn test_yaml_event_file() {
        let dir = TempDir::new().unwrap();
        let event = write_file(
            dir.path(),
            "event.yaml",
            "check:\n  metadata:\n    name: check-disk\n",
        );
        let output = run_with(
            &["evtmpl", "-t", "{{ .Check.Name }}", "-e", event.to_str().unwrap()],
            "",
        )
        .unwrap();
        assert_eq!(output, "check-disk");
    }

    #[test]
    fn test_render_error_names_template() {
        let dir = TempDir::new().unwrap();
        let template = write_file(dir.path(), "alert.tmpl", "{{ .Check.NameZZZ }}");
        let err = run_with(
            &["evtmpl", "-f", template.to_str().unwrap()],
            EVENT,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("\"alert\""), "{err:#}");
    }

    #[test]
    fn test_explicit_name_wins() {
        let err = run_with(
            &["evtmpl", "-t", "{{ .Check.Name", "-n", "custom"],
            EVENT,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("custom"), "{err:#}");
    }

    #[test]
    fn test_invalid_event_json() {
        let err = run_with(&["evtmpl", "-t", "{{ .Check.Name }}"], "not json").unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse event JSON"));
    }

    #[test]
    fn test_missing_event_file() {
        let err = run_with(
            &["evtmpl", "-t", "x", "-e", "/nonexistent/event.json"],
            "",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("failed to read event file"));
    }

    #[test]
    #[serial]
    fn test_template_source_required() {
        clear_template_env();
        let err = Cli::try_parse_args(["evtmpl", "--event", "e.json"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        let err = Cli::try_parse_args(["evtmpl", "-t", "a", "-f", "b"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    #[serial]
    fn test_template_file_flag_overrides_env_template() {
        let dir = TempDir::new().unwrap();
        let template = write_file(dir.path(), "page.tmpl", "file {{ .Check.Name }}");

        clear_template_env();
        std::env::set_var("EVTMPL_TEMPLATE", "env {{ .Check.Name }}");
        let output = run_with(&["evtmpl", "-f", template.to_str().unwrap()], EVENT);
        let from_env = run_with(&["evtmpl"], EVENT);
        clear_template_env();

        assert_eq!(output.unwrap(), "file check-nginx");
        assert_eq!(from_env.unwrap(), "env check-nginx");
    }

    #[test]
    #[serial]
    fn test_template_flag_overrides_env_template_file() {
        clear_template_env();
        std::env::set_var("EVTMPL_TEMPLATE_FILE", "/nonexistent/alert.tmpl");
        let output = run_with(&["evtmpl", "-t", "inline {{ .Entity.Name }}"], EVENT);
        clear_template_env();

        assert_eq!(output.unwrap(), "inline webserver01");
    }

    #[test]
    #[serial]
    fn test_both_sources_from_env_conflict() {
        clear_template_env();
        std::env::set_var("EVTMPL_TEMPLATE", "a");
        std::env::set_var("EVTMPL_TEMPLATE_FILE", "b");
        let result = Cli::try_parse_args(["evtmpl"]);
        clear_template_env();

        assert_eq!(result.unwrap_err().kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_verbose_counts() {
        let cli = Cli::try_parse_args(["evtmpl", "-t", "x", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
