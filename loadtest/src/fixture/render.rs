//! Loader artifact rendering
//!
//! A template carries three slots (`{{users}}`, `{{profiles}}`, `{{posts}}`)
//! which receive the batch collections as indented literals. The literal
//! tokens for booleans and null come from a [`LiteralDialect`] so one batch
//! can target a Python loader as easily as a JSON one.

use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use super::types::{FixtureBatch, GenerationError};

pub const USERS_SLOT: &str = "users";
pub const PROFILES_SLOT: &str = "profiles";
pub const POSTS_SLOT: &str = "posts";

/// Tokens used for `true`, `false` and `null` in the rendered collections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralDialect {
    pub true_token: String,
    pub false_token: String,
    pub null_token: String,
}

impl LiteralDialect {
    pub fn json() -> Self {
        Self {
            true_token: "true".to_string(),
            false_token: "false".to_string(),
            null_token: "null".to_string(),
        }
    }

    pub fn python() -> Self {
        Self {
            true_token: "True".to_string(),
            false_token: "False".to_string(),
            null_token: "None".to_string(),
        }
    }
}

impl Default for LiteralDialect {
    fn default() -> Self {
        Self::python()
    }
}

/// Pretty printer that swaps scalar literal tokens.
///
/// Only value positions go through `write_bool`/`write_null`, so a string
/// containing the word `true` is left alone.
struct DialectFormatter<'a> {
    pretty: PrettyFormatter<'static>,
    dialect: &'a LiteralDialect,
}

impl Formatter for DialectFormatter<'_> {
    fn write_null<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.dialect.null_token.as_bytes())
    }

    fn write_bool<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: bool) -> io::Result<()> {
        let token = if value {
            &self.dialect.true_token
        } else {
            &self.dialect.false_token
        };
        writer.write_all(token.as_bytes())
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.pretty.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.pretty.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object_value(writer)
    }
}

/// Serialize a value as indented text using the dialect's literal tokens
pub fn to_literal<T: Serialize + ?Sized>(
    value: &T,
    dialect: &LiteralDialect,
) -> Result<String, GenerationError> {
    let mut buf = Vec::new();
    let formatter = DialectFormatter {
        pretty: PrettyFormatter::new(),
        dialect,
    };
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn placeholder(slot: &str) -> String {
    format!("{{{{{}}}}}", slot)
}

/// Loader template with the three collection slots
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
}

impl Template {
    /// Build a template from its text, checking every slot is present
    pub fn parse(source: impl Into<String>) -> Result<Self, GenerationError> {
        let source = source.into();
        for slot in [USERS_SLOT, PROFILES_SLOT, POSTS_SLOT] {
            if !source.contains(&placeholder(slot)) {
                return Err(GenerationError::MissingSlot(slot));
            }
        }
        Ok(Self { source })
    }

    /// Read a template asset from disk
    pub fn load(path: &Path) -> Result<Self, GenerationError> {
        let source =
            std::fs::read_to_string(path).map_err(|source| GenerationError::TemplateMissing {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(source)
    }

    /// Substitute the batch into the slots
    pub fn render(
        &self,
        batch: &FixtureBatch,
        dialect: &LiteralDialect,
    ) -> Result<String, GenerationError> {
        let users = to_literal(&batch.users, dialect)?;
        let profiles = to_literal(&batch.profiles, dialect)?;
        let posts = to_literal(&batch.posts, dialect)?;

        Ok(self
            .source
            .replace(&placeholder(USERS_SLOT), &users)
            .replace(&placeholder(PROFILES_SLOT), &profiles)
            .replace(&placeholder(POSTS_SLOT), &posts))
    }
}

/// Render the batch through the template at `template_path` and write the
/// single resulting artifact to `destination`
pub fn write_artifact(
    batch: &FixtureBatch,
    template_path: &Path,
    destination: &Path,
    dialect: &LiteralDialect,
) -> Result<PathBuf, GenerationError> {
    let template = Template::load(template_path)?;
    let rendered = template.render(batch, dialect)?;

    std::fs::write(destination, rendered.as_bytes()).map_err(|source| {
        GenerationError::Destination {
            path: destination.to_path_buf(),
            source,
        }
    })?;

    info!(
        "Wrote fixture artifact {:?} ({} bytes) from template {:?}",
        destination,
        rendered.len(),
        template_path
    );
    Ok(destination.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::generator::{DEFAULT_RANK_IDS, generate};
    use serde_json::json;
    use uuid::Uuid;

    const TEMPLATE: &str = "USERS = {{users}}\nPROFILES = {{profiles}}\nPOSTS = {{posts}}\n";

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("venue-loadtest-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn small_batch() -> FixtureBatch {
        let ranks: Vec<String> = DEFAULT_RANK_IDS.iter().map(|s| s.to_string()).collect();
        generate(2, 1, &ranks, 42).unwrap()
    }

    #[test]
    fn test_python_dialect_rewrites_values_only() {
        let value = json!({"active": true, "note": "true story", "gone": null, "off": false});
        let text = to_literal(&value, &LiteralDialect::python()).unwrap();
        assert!(text.contains("\"active\": True"));
        assert!(text.contains("\"off\": False"));
        assert!(text.contains("\"gone\": None"));
        assert!(text.contains("\"note\": \"true story\""));
    }

    #[test]
    fn test_json_dialect_round_trips() {
        let batch = small_batch();
        let text = to_literal(&batch.users, &LiteralDialect::json()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["username"], "perf1");
        assert_eq!(parsed[1]["is_active"], true);
    }

    #[test]
    fn test_template_requires_all_slots() {
        let err = Template::parse("USERS = {{users}}\nPOSTS = {{posts}}").unwrap_err();
        assert!(matches!(err, GenerationError::MissingSlot(PROFILES_SLOT)));
    }

    #[test]
    fn test_render_fills_every_slot() {
        let batch = small_batch();
        let rendered = Template::parse(TEMPLATE)
            .unwrap()
            .render(&batch, &LiteralDialect::python())
            .unwrap();

        assert!(!rendered.contains("{{"));
        assert!(rendered.contains("\"forum_rank_id\""));
        assert!(rendered.contains("\"unique_content_length\""));
        assert!(rendered.contains("\"is_active\": True"));
        assert!(rendered.contains("\"date_verified\": \"2018-06-10 03:27:46+00:00\""));
        assert!(!rendered.contains(": true"));
    }

    #[test]
    fn test_write_artifact_missing_template() {
        let dir = scratch_dir();
        let err = write_artifact(
            &small_batch(),
            &dir.join("absent.template"),
            &dir.join("out.py"),
            &LiteralDialect::python(),
        )
        .unwrap_err();
        assert!(matches!(err, GenerationError::TemplateMissing { .. }));
    }

    #[test]
    fn test_write_artifact_unwritable_destination() {
        let dir = scratch_dir();
        let template = dir.join("loader.template");
        std::fs::write(&template, TEMPLATE).unwrap();

        let err = write_artifact(
            &small_batch(),
            &template,
            &dir.join("missing-dir").join("out.py"),
            &LiteralDialect::python(),
        )
        .unwrap_err();
        assert!(matches!(err, GenerationError::Destination { .. }));
    }

    #[test]
    fn test_write_artifact_writes_one_file() {
        let dir = scratch_dir();
        let template = dir.join("loader.template");
        std::fs::write(&template, TEMPLATE).unwrap();
        let out = dir.join("seed.py");

        let written = write_artifact(&small_batch(), &template, &out, &LiteralDialect::python())
            .unwrap();
        assert_eq!(written, out);

        let content = std::fs::read_to_string(&out).unwrap();
        assert!(content.starts_with("USERS = ["));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);
    }
}
