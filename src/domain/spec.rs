//! Print spec documents as submitted by callers.
//!
//! The document is opaque to this service apart from a few naming and
//! routing fields; everything else is handed to the renderer untouched.

use serde_json::{Map, Value};

use super::{artifact::NamingHints, error::DomainError};

const APP_KEY: &str = "app";
const LAYOUT_KEY: &str = "layout";
const OUTPUT_FILENAME_KEY: &str = "outputFilename";
const OUTPUT_FORMAT_KEY: &str = "outputFormat";

#[derive(Debug, Clone, PartialEq)]
pub struct PrintSpec {
    document: Map<String, Value>,
}

impl PrintSpec {
    /// Parse a spec document. Only JSON objects are accepted.
    pub fn parse(text: &str) -> Result<Self, DomainError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| DomainError::validation(format!("not valid JSON: {err}")))?;
        match value {
            Value::Object(document) => Ok(Self { document }),
            other => Err(DomainError::validation(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn app(&self) -> Option<&str> {
        self.string_field(APP_KEY)
    }

    pub fn layout(&self) -> Option<&str> {
        self.string_field(LAYOUT_KEY)
    }

    pub fn output_filename(&self) -> Option<&str> {
        self.string_field(OUTPUT_FILENAME_KEY)
    }

    pub fn output_format(&self) -> Option<&str> {
        self.string_field(OUTPUT_FORMAT_KEY)
    }

    pub fn naming_hints(&self) -> NamingHints {
        NamingHints {
            output_name: self.output_filename().map(str::to_string),
            layout: self.layout().map(str::to_string),
            app: self.app().map(str::to_string),
        }
    }

    /// Blank strings count as absent.
    fn string_field(&self, key: &str) -> Option<&str> {
        self.document
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Character encoding of spec documents submitted as a request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl InputEncoding {
    /// Accepts the usual labels, case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Self::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Some(Self::Latin1),
            _ => None,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String, DomainError> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|err| {
                DomainError::validation(format!("body is not valid utf-8: {err}"))
            }),
            // every byte maps to the code point of the same value
            Self::Latin1 => Ok(bytes.iter().map(|&byte| char::from(byte)).collect()),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
