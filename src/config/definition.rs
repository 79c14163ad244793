use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ANNOTATION_CONFIG: &str = "config";
pub const ELEMENT_ASYNC: &str = "async";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Int,
    Long,
    Float,
    Double,
    Bool,
    Object,
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::String => "string",
            AttributeType::Int => "int",
            AttributeType::Long => "long",
            AttributeType::Float => "float",
            AttributeType::Double => "double",
            AttributeType::Bool => "bool",
            AttributeType::Object => "object",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttributeType,
}

/// `key = 'value'` inside an annotation. A bare `'value'` has no key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    #[serde(default)]
    pub key: Option<String>,
    pub value: String,
}

/// A declared annotation such as `@config(async = 'false')`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: Vec::new(),
        }
    }

    pub fn element(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.elements.push(Element {
            key: Some(key.into()),
            value: value.into(),
        });
        self
    }
}

/// Shape and declared configuration of an output stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub id: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl StreamDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeType) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Number of attributes; sizes every queue slot for this stream.
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Look up `key` across every annotation called `annotation`.
    ///
    /// Names and keys match case-insensitively. Declaring the key more than
    /// once is an error, even when the values agree.
    pub fn annotation_element(
        &self,
        annotation: &str,
        key: &str,
    ) -> Result<Option<&str>, ConfigError> {
        let mut matches = self
            .annotations
            .iter()
            .filter(|a| a.name.eq_ignore_ascii_case(annotation))
            .flat_map(|a| a.elements.iter())
            .filter(|e| e.key.as_deref().is_some_and(|k| k.eq_ignore_ascii_case(key)));

        let found = matches.next();
        if matches.next().is_some() {
            return Err(ConfigError::DuplicateAnnotation {
                stream: self.to_string(),
                key: key.to_string(),
            });
        }
        Ok(found.map(|e| e.value.as_str()))
    }

    /// Whether results of this stream are delivered through the queue.
    ///
    /// Absent means enabled. `true`/`false` are read case-insensitively and
    /// anything else falls back to enabled.
    pub fn async_enabled(&self) -> Result<bool, ConfigError> {
        let value = match self.annotation_element(ANNOTATION_CONFIG, ELEMENT_ASYNC)? {
            Some(value) => value.trim(),
            None => return Ok(true),
        };

        if value.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if value.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            tracing::warn!(
                stream_id = %self.id,
                value,
                "unrecognised async setting, delivering asynchronously"
            );
            Ok(true)
        }
    }
}

impl fmt::Display for StreamDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "define stream {} (", self.id)?;
        for (i, attribute) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", attribute.name, attribute.kind)?;
        }
        write!(f, ")")
    }
}
