//! Status errors: declared business errors surfaced as non-2xx responses.
//!
//! A status error is a unit variant of an enum marked `#[derive(StatusError)]`
//! or `#[status_error]`. Variant docs carry the messages:
//!
//! ```text
//! /// User not found
//! /// @zh 用户不存在
//! /// @errTalk
//! NotFound = 404_000_001,
//! ```

pub mod formatter;
pub mod reachability;

use crate::eval::Evaluator;
use crate::index::attrs::{doc_lines, has_attr, has_derive};
use crate::index::{qualify, TypeIndex};
use crate::schema::Schema;
use indexmap::IndexMap;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub use formatter::{detect_formatter, ErrorFormatter};
pub use reachability::ErrorReachability;

/// Locale of the untagged message line.
pub const DEFAULT_LOCALE: &str = "default";

/// One declared business error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusErr {
    pub key: String,
    pub code: i64,
    /// Locale to message
    pub messages: BTreeMap<String, String>,
    pub description: Option<String>,
    pub can_be_talk: bool,
}

impl StatusErr {
    /// HTTP status: the leading digits of codes with at least seven digits,
    /// otherwise the code itself.
    pub fn status(&self) -> u16 {
        let status = if self.code.unsigned_abs() >= 1_000_000 {
            self.code / 1_000_000
        } else {
            self.code
        };
        u16::try_from(status)
            .ok()
            .filter(|s| (100..=599).contains(s))
            .unwrap_or(500)
    }

    /// Default-locale message, falling back to any message, then the key.
    pub fn message(&self) -> &str {
        self.messages
            .get(DEFAULT_LOCALE)
            .or_else(|| self.messages.values().next())
            .map(String::as_str)
            .unwrap_or(&self.key)
    }

    /// `@StatusErr[Key][code][message]`, with `!` appended when talkable.
    pub fn summary(&self) -> String {
        format!(
            "@StatusErr[{}][{}][{}]{}",
            self.key,
            self.code,
            self.message(),
            if self.can_be_talk { "!" } else { "" }
        )
    }

    pub fn identity(&self) -> (&str, i64) {
        (&self.key, self.code)
    }
}

/// Appends `found` to `into`, skipping errors already present by (key, code).
pub fn merge_unique(into: &mut Vec<StatusErr>, found: impl IntoIterator<Item = StatusErr>) {
    for err in found {
        if !into.iter().any(|e| e.identity() == err.identity()) {
            into.push(err);
        }
    }
}

/// Every status error declared in the program, keyed by the enum's
/// module-qualified name and the variant.
#[derive(Debug, Default)]
pub struct StatusErrorCatalog {
    errors: HashMap<(String, String), StatusErr>,
}

impl StatusErrorCatalog {
    pub fn new(index: &TypeIndex) -> Self {
        let mut errors = HashMap::new();
        for declared in index.enums() {
            let item = &declared.item;
            if !has_derive(&item.attrs, "StatusError") && !has_attr(&item.attrs, "status_error") {
                continue;
            }
            let enum_name = item.ident.to_string();
            let evaluator = Evaluator::new(index, &declared.module, Some(enum_name.as_str()));
            let mut next = 0i64;
            for variant in &item.variants {
                let code = variant
                    .discriminant
                    .as_ref()
                    .and_then(|(_, expr)| evaluator.eval_int(expr))
                    .unwrap_or(next);
                next = code.saturating_add(1);
                if !matches!(variant.fields, syn::Fields::Unit) {
                    continue;
                }
                let key = variant.ident.to_string();
                let err = parse_variant_docs(&key, code, &doc_lines(&variant.attrs));
                debug!("Status error {}::{} = {}", enum_name, key, code);
                errors.insert((qualify(&declared.module, &enum_name), key), err);
            }
        }
        Self { errors }
    }

    /// Looks up `variant` of the status enum whose qualified name is `enum_path`.
    pub fn get(&self, enum_path: &str, variant: &str) -> Option<&StatusErr> {
        self.errors.get(&(enum_path.to_string(), variant.to_string()))
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Splits variant docs into the default message, `@<locale>` messages,
/// the `@errTalk` flag and a free-form description.
fn parse_variant_docs(key: &str, code: i64, lines: &[String]) -> StatusErr {
    let mut messages = BTreeMap::new();
    let mut description = Vec::new();
    let mut can_be_talk = false;
    for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        if let Some(tagged) = line.strip_prefix('@') {
            let (tag, text) = tagged.split_once(char::is_whitespace).unwrap_or((tagged, ""));
            if tag == "errTalk" {
                can_be_talk = true;
            } else if !text.trim().is_empty() {
                messages.insert(tag.to_string(), text.trim().to_string());
            }
        } else if !messages.contains_key(DEFAULT_LOCALE) {
            messages.insert(DEFAULT_LOCALE.to_string(), line.to_string());
        } else {
            description.push(line);
        }
    }
    StatusErr {
        key: key.to_string(),
        code,
        messages,
        description: if description.is_empty() {
            None
        } else {
            Some(description.join("\n"))
        },
        can_be_talk,
    }
}

/// The built-in error record used when no custom formatter is registered.
pub fn default_error_schema() -> Schema {
    let string = || Schema::typed("string");
    let mut error_field = IndexMap::new();
    error_field.insert("field".to_string(), string());
    error_field.insert("in".to_string(), string());
    error_field.insert("msg".to_string(), string());

    let mut properties = IndexMap::new();
    properties.insert("key".to_string(), string());
    properties.insert("code".to_string(), Schema::typed("integer").with_format("int64"));
    properties.insert("msg".to_string(), string());
    properties.insert("desc".to_string(), string());
    properties.insert("canBeTalkError".to_string(), Schema::typed("boolean"));
    properties.insert("id".to_string(), string());
    properties.insert("sources".to_string(), Schema::array(string()));
    properties.insert(
        "errorFields".to_string(),
        Schema::array(Schema::object(
            error_field,
            vec!["field".to_string(), "in".to_string(), "msg".to_string()],
        )),
    );
    Schema::object(
        properties,
        vec!["key".to_string(), "code".to_string(), "msg".to_string()],
    )
}
