//! The flat XML form of a record.
//!
//! ```text
//! <item state="loaded">
//! <itemid>1</itemid>
//! <description dirty="true" previous="PC Athlon">PC Intel</description>
//! <price>null</price>
//! </item>
//! ```
//!
//! The root element is named by the record's type tag, each child by a lower-case field
//! name, in field order. The text `null` stands for an absent value. Binary values are
//! base64-encoded. Optional attributes keep the change-tracking state: `dirty`, `previous`
//! (the value last synced with the database, or captured before the first change), `null`
//! (the database reported NULL) and `other` (the JSON payload of an `Other` column).
//!
//! A record set is written as a list of record documents, each wrapped in `daoListItem`:
//!
//! ```text
//! <item_list>
//! <daoListItem><item state="loaded">...</item></daoListItem>
//! <daoListItem><item state="new">...</item></daoListItem>
//! </item_list>
//! ```
//!
//! Action hints are not written; a reloaded field carries none.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use daodb_core::{Error, Result};
use regex::Regex;

use crate::record::{Record, RecordState};
use crate::record_set::RecordSet;

/// Text reserved for an absent value.
pub const NULL_TEXT: &str = "null";

/// Element wrapping each row of a record-set document.
pub const LIST_ITEM_TAG: &str = "daoListItem";

/// Suffix appended to the type tag to name the root of a record-set document.
pub const LIST_SUFFIX: &str = "_list";

fn root_pattern() -> &'static Regex {
    static ROOT: OnceLock<Regex> = OnceLock::new();
    ROOT.get_or_init(|| {
        Regex::new(
            r#"(?s)^\s*(?:<\?xml[^>]*\?>\s*)?<([A-Za-z_][\w.$#-]*)((?:\s+\w+="[^"]*")*)\s*>(.*)</([A-Za-z_][\w.$#-]*)\s*>\s*$"#,
        )
        .expect("root element pattern is valid")
    })
}

fn element_pattern() -> &'static Regex {
    static ELEMENT: OnceLock<Regex> = OnceLock::new();
    ELEMENT.get_or_init(|| {
        Regex::new(
            r#"<([A-Za-z_][\w$#]*)((?:\s+\w+="[^"]*")*)\s*>([^<]*)</([A-Za-z_][\w$#]*)\s*>"#,
        )
        .expect("field element pattern is valid")
    })
}

fn list_item_pattern() -> &'static Regex {
    static LIST_ITEM: OnceLock<Regex> = OnceLock::new();
    LIST_ITEM.get_or_init(|| {
        Regex::new(r"(?s)<daoListItem>(.*?)</daoListItem>").expect("list item pattern is valid")
    })
}

fn attribute_pattern() -> &'static Regex {
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"(\w+)="([^"]*)""#).expect("attribute pattern is valid")
    })
}

// ============================================================================
// Writing
// ============================================================================

/// Render a record in the flat XML form.
pub fn to_xml(record: &Record) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<{} state=\"{}\">",
        record.type_tag(),
        record.state().as_str()
    );
    for field in record.fields() {
        let text = if field.field_type().is_binary() {
            field.binary_value().map(|b| BASE64.encode(b))
        } else {
            field.value().map(escape)
        };

        let _ = write!(out, "<{}", field.name());
        if field.is_dirty() {
            out.push_str(" dirty=\"true\"");
        }
        if let Some(previous) = field.previous_value() {
            let _ = write!(out, " previous=\"{}\"", escape(previous));
        }
        if field.is_null() {
            out.push_str(" null=\"true\"");
        }
        if let Some(other) = field.other_value() {
            let _ = write!(out, " other=\"{}\"", escape(&other.to_string()));
        }
        let _ = writeln!(
            out,
            ">{}</{}>",
            text.as_deref().unwrap_or(NULL_TEXT),
            field.name()
        );
    }
    let _ = write!(out, "</{}>", record.type_tag());
    out
}

// ============================================================================
// Reading
// ============================================================================

/// The type tag of a document, without reading its fields.
pub fn root_tag(xml: &str) -> Result<&str> {
    let caps = root_pattern()
        .captures(xml)
        .ok_or_else(|| Error::Serialization("not a record document".to_string()))?;
    Ok(caps.get(1).map_or("", |m| m.as_str()))
}

/// Load a document into `record`, replacing every field value and the state.
///
/// Fields missing from the document end up empty. An element naming no field, or a root
/// tag other than the record's type tag, fails with `Error::Serialization`.
pub fn read_xml(record: &mut Record, xml: &str) -> Result<()> {
    let caps = root_pattern()
        .captures(xml)
        .ok_or_else(|| Error::Serialization("not a record document".to_string()))?;
    let open = &caps[1];
    let close = &caps[4];
    if open != close {
        return Err(Error::Serialization(format!(
            "element `{}` closed by `{}`",
            open, close
        )));
    }
    if !open.eq_ignore_ascii_case(record.type_tag()) {
        return Err(Error::Serialization(format!(
            "document holds `{}`, expected `{}`",
            open,
            record.type_tag()
        )));
    }
    let state = match attributes(&caps[2]).get("state") {
        Some(state) => state.parse::<RecordState>()?,
        None => RecordState::Loaded,
    };

    let mut loaded = record.empty_template();
    let mut assigned = vec![false; loaded.field_count()];
    for element in element_pattern().captures_iter(&caps[3]) {
        let name = &element[1];
        if name != &element[4] {
            return Err(Error::Serialization(format!(
                "element `{}` closed by `{}`",
                name, &element[4]
            )));
        }
        // repeated names map to repeated fields in order
        let index = loaded
            .fields()
            .iter()
            .enumerate()
            .position(|(i, f)| !assigned[i] && f.descriptor().is_named(name))
            .ok_or_else(|| {
                Error::Serialization(format!(
                    "`{}` has no field `{}`",
                    record.type_tag(),
                    name
                ))
            })?;
        assigned[index] = true;

        let attrs = attributes(&element[2]);
        let flag = |key: &str| attrs.get(key).is_some_and(|v| v == "true");
        let text = match &element[3] {
            NULL_TEXT => None,
            text => Some(unescape(text)),
        };

        let other = attrs
            .get("other")
            .map(|json| {
                serde_json::from_str(&unescape(json)).map_err(|e| {
                    Error::Serialization(format!("field `{}`: {}", name, e))
                })
            })
            .transpose()?;

        let field = &mut loaded.fields_mut()[index];
        let (value, binary) = if field.field_type().is_binary() {
            let bytes = text
                .map(|t| {
                    BASE64.decode(t.trim()).map_err(|e| {
                        Error::Serialization(format!("field `{}`: {}", name, e))
                    })
                })
                .transpose()?;
            (None, bytes)
        } else {
            (text, None)
        };
        field.restore(
            value,
            binary,
            other,
            attrs.get("previous").map(|p| unescape(p)),
            flag("null"),
            flag("dirty"),
        );
    }

    loaded.set_state(state);
    *record = loaded;
    Ok(())
}

// ============================================================================
// Record sets
// ============================================================================

/// Render every row of a set, each wrapped in a `daoListItem` element.
pub fn set_to_xml(set: &RecordSet) -> String {
    let root = list_tag(set.descriptor());
    let mut out = format!("<{}>\n", root);
    for row in set {
        let _ = writeln!(out, "<{0}>{1}</{0}>", LIST_ITEM_TAG, to_xml(row));
    }
    let _ = write!(out, "</{}>", root);
    out
}

/// Replace the rows of a set with those of a list document.
///
/// Each row starts from an empty template of the set's descriptor. The rows are only
/// replaced when every item reads back; on failure the set is left untouched.
pub fn read_set_xml(set: &mut RecordSet, xml: &str) -> Result<()> {
    let caps = root_pattern()
        .captures(xml)
        .ok_or_else(|| Error::Serialization("not a record list document".to_string()))?;
    let expected = list_tag(set.descriptor());
    if !caps[1].eq_ignore_ascii_case(&expected) || !caps[4].eq_ignore_ascii_case(&expected) {
        return Err(Error::Serialization(format!(
            "document holds `{}`, expected `{}`",
            &caps[1], expected
        )));
    }

    let rows = list_item_pattern()
        .captures_iter(&caps[3])
        .map(|item| {
            let mut row = set.new_row();
            read_xml(&mut row, &item[1])?;
            Ok(row)
        })
        .collect::<Result<Vec<_>>>()?;

    set.clear();
    for row in rows {
        set.add_row(row);
    }
    Ok(())
}

fn list_tag(descriptor: &Record) -> String {
    format!("{}{}", descriptor.type_tag(), LIST_SUFFIX)
}

// ============================================================================
// Files
// ============================================================================

fn write_file(path: &Path, xml: &str) -> Result<()> {
    fs::write(path, xml).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Writing XML file failed");
        Error::Serialization(format!("{}: {}", path.display(), e))
    })?;
    tracing::debug!(path = %path.display(), bytes = xml.len(), "XML file written");
    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Reading XML file failed");
        Error::Serialization(format!("{}: {}", path.display(), e))
    })
}

fn attributes(text: &str) -> HashMap<String, String> {
    attribute_pattern()
        .captures_iter(text)
        .map(|c| (c[1].to_ascii_lowercase(), c[2].to_string()))
        .collect()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ============================================================================
// Type-tag registry
// ============================================================================

/// Builds an empty record of one kind.
pub type RecordFactory = Arc<dyn Fn() -> Result<Record> + Send + Sync>;

/// Maps stored type tags to the factories able to rebuild them.
///
/// Documents only ever select among kinds the application registered up front.
#[derive(Clone, Default)]
pub struct RecordTypeRegistry {
    factories: HashMap<String, RecordFactory>,
}

impl RecordTypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a tag (case-insensitive). A later registration replaces
    /// an earlier one.
    pub fn register<F>(&mut self, tag: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Record> + Send + Sync + 'static,
    {
        self.factories
            .insert(tag.trim().to_ascii_lowercase(), Arc::new(factory));
        self
    }

    /// Whether a tag is registered.
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(&tag.trim().to_ascii_lowercase())
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Build an empty record of a registered kind.
    pub fn create(&self, tag: &str) -> Result<Record> {
        let key = tag.trim().to_ascii_lowercase();
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| Error::NotFound(format!("record type `{}`", tag.trim())))?;
        let mut record = factory()?;
        record.set_type_tag(&key);
        Ok(record)
    }

    /// Rebuild a record from its XML form.
    pub fn decode(&self, xml: &str) -> Result<Record> {
        let mut record = self.create(root_tag(xml)?)?;
        read_xml(&mut record, xml)?;
        Ok(record)
    }

    /// Rebuild a record set from its list form.
    ///
    /// The root element names the row kind followed by `_list`.
    pub fn decode_set(&self, xml: &str) -> Result<RecordSet> {
        let root = root_tag(xml)?;
        let tag = root
            .len()
            .checked_sub(LIST_SUFFIX.len())
            .filter(|&n| root.get(n..).is_some_and(|s| s.eq_ignore_ascii_case(LIST_SUFFIX)))
            .map(|n| &root[..n])
            .ok_or_else(|| Error::Serialization(format!("`{}` is not a record list", root)))?;
        let mut set = RecordSet::new(self.create(tag)?);
        read_set_xml(&mut set, xml)?;
        Ok(set)
    }
}

impl std::fmt::Debug for RecordTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordTypeRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

impl Record {
    /// The flat XML form of this record.
    pub fn to_xml(&self) -> String {
        to_xml(self)
    }

    /// Replace values and state with those of an XML document.
    pub fn load_xml(&mut self, xml: &str) -> Result<()> {
        read_xml(self, xml)
    }

    /// Write the XML form to a file, replacing its contents.
    pub fn save_xml_file(&self, path: impl AsRef<Path>) -> Result<()> {
        write_file(path.as_ref(), &self.to_xml())
    }

    /// Replace values and state with those stored in a file.
    pub fn restore_xml_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let xml = read_file(path.as_ref())?;
        self.load_xml(&xml)
    }
}

impl RecordSet {
    /// The list form of every row.
    pub fn to_xml(&self) -> String {
        set_to_xml(self)
    }

    /// Replace the rows with those of a list document.
    pub fn load_xml(&mut self, xml: &str) -> Result<()> {
        read_set_xml(self, xml)
    }

    /// Write the list form to a file, replacing its contents.
    pub fn save_xml_file(&self, path: impl AsRef<Path>) -> Result<()> {
        write_file(path.as_ref(), &self.to_xml())
    }

    /// Replace the rows with those stored in a file, returning how many were read.
    pub fn restore_xml_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let xml = read_file(path.as_ref())?;
        self.load_xml(&xml)?;
        Ok(self.row_count())
    }
}
