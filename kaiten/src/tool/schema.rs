//! Parameter type tags and JSON parameter schemas.
//!
//! Capabilities declare their parameters with textual type tags such as
//! `"i64"`, `"Option<String>"`, `"Vec<f64>"` or `"integer | null"`. The
//! mapping from tag to [`SchemaType`] is total: every tag resolves to one of
//! the seven JSON schema types, optional and union tags resolve to their first
//! non-null member, and anything unrecognized becomes `string`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// JSON schema primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// `string`
    String,
    /// `integer`
    Integer,
    /// `number`
    Number,
    /// `boolean`
    Boolean,
    /// `array`
    Array,
    /// `object`
    Object,
    /// `null`
    Null,
}

impl SchemaType {
    /// Get the JSON schema type string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
        }
    }

    /// Map a leaf type name to a schema type. Unknown names map to `string`.
    #[must_use]
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
            | "u128" | "usize" | "int" | "integer" => Self::Integer,
            "f32" | "f64" | "float" | "number" => Self::Number,
            "bool" | "boolean" => Self::Boolean,
            "Vec" | "VecDeque" | "HashSet" | "BTreeSet" | "list" | "array" => Self::Array,
            "HashMap" | "BTreeMap" | "Map" | "Value" | "dict" | "object" => Self::Object,
            "()" | "null" | "None" => Self::Null,
            _ => Self::String,
        }
    }

    /// Returns `true` if `value` is an instance of this type.
    ///
    /// Integers are accepted where a `number` is expected.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Null => value.is_null(),
        }
    }

    /// Name of the JSON type of `value`, for error messages.
    #[must_use]
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_f64() => Self::Number,
            Value::Number(_) => Self::Integer,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema information resolved from a type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// The JSON schema type.
    pub schema_type: SchemaType,
    /// Whether `null` is an accepted value.
    pub nullable: bool,
    /// Element type for arrays, when known.
    pub items: Option<Box<TypeInfo>>,
}

impl TypeInfo {
    /// A plain, non-nullable type.
    #[must_use]
    pub const fn new(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            nullable: false,
            items: None,
        }
    }

    /// Resolve a textual type tag. Never fails.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        let tag = strip_reference(tag.trim());

        let members = split_top_level(tag, '|');
        if members.len() > 1 {
            return Self::from_union(members.iter().map(|m| Self::parse(m)));
        }

        if tag.is_empty() {
            return Self::new(SchemaType::String);
        }

        if let Some(inner) = tag.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            return if inner.trim().is_empty() {
                Self::new(SchemaType::Null)
            } else {
                Self::new(SchemaType::Array)
            };
        }

        if let Some(inner) = tag.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let element = split_top_level(inner, ';').into_iter().next().unwrap_or_default();
            return Self::array_of(Self::parse(element));
        }

        let (path, args) = match (tag.find('<'), tag.rfind('>')) {
            (Some(open), Some(close)) if close > open => (
                &tag[..open],
                split_top_level(&tag[open + 1..close], ',')
                    .into_iter()
                    .map(str::trim)
                    .filter(|a| !a.starts_with('\''))
                    .collect::<Vec<_>>(),
            ),
            _ => (tag, Vec::new()),
        };
        let name = path.rsplit("::").next().unwrap_or(path).trim();

        match name {
            "Option" => {
                let mut inner = args
                    .first()
                    .map_or_else(|| Self::new(SchemaType::String), |a| Self::parse(a));
                inner.nullable = true;
                inner
            }
            "Box" | "Arc" | "Rc" | "Result" => args
                .first()
                .map_or_else(|| Self::new(SchemaType::String), |a| Self::parse(a)),
            "Cow" => Self::new(SchemaType::String),
            _ => {
                let schema_type = SchemaType::from_type_name(name);
                if schema_type == SchemaType::Array {
                    args.first().map_or_else(
                        || Self::new(SchemaType::Array),
                        |a| Self::array_of(Self::parse(a)),
                    )
                } else {
                    Self::new(schema_type)
                }
            }
        }
    }

    /// Resolve a JSON schema fragment (as produced by `schemars`). Never fails.
    #[must_use]
    pub fn from_json_schema(schema: &Value) -> Self {
        let Some(obj) = schema.as_object() else {
            return Self::new(SchemaType::String);
        };

        match obj.get("type") {
            Some(Value::String(t)) => {
                let mut info = Self::new(SchemaType::from_type_name(t));
                if info.schema_type == SchemaType::Array {
                    info.items = obj
                        .get("items")
                        .map(|items| Box::new(Self::from_json_schema(items)));
                }
                if obj.get("nullable").and_then(Value::as_bool) == Some(true) {
                    info.nullable = true;
                }
                return info;
            }
            Some(Value::Array(types)) => {
                let mut info = Self::from_union(
                    types
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|t| Self::new(SchemaType::from_type_name(t))),
                );
                if info.schema_type == SchemaType::Array {
                    info.items = obj
                        .get("items")
                        .map(|items| Box::new(Self::from_json_schema(items)));
                }
                return info;
            }
            _ => {}
        }

        for key in ["anyOf", "oneOf"] {
            if let Some(Value::Array(variants)) = obj.get(key) {
                return Self::from_union(variants.iter().map(Self::from_json_schema));
            }
        }

        if obj.contains_key("$ref") || obj.contains_key("properties") {
            return Self::new(SchemaType::Object);
        }

        Self::new(SchemaType::String)
    }

    /// Render as a JSON schema property (without description).
    #[must_use]
    pub fn to_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_owned(), json!(self.schema_type.as_str()));
        if let Some(items) = &self.items {
            schema.insert("items".to_owned(), items.to_schema());
        }
        if self.nullable && self.schema_type != SchemaType::Null {
            schema.insert("nullable".to_owned(), Value::Bool(true));
        }
        Value::Object(schema)
    }

    /// Returns `true` if `value` conforms to this type (shallowly).
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        (self.nullable && value.is_null()) || self.schema_type.matches(value)
    }

    fn array_of(items: Self) -> Self {
        Self {
            schema_type: SchemaType::Array,
            nullable: false,
            items: Some(Box::new(items)),
        }
    }

    fn from_union(members: impl Iterator<Item = Self>) -> Self {
        let mut saw_null = false;
        let mut first = None;
        for member in members {
            if member.schema_type == SchemaType::Null {
                saw_null = true;
            } else {
                saw_null |= member.nullable;
                if first.is_none() {
                    first = Some(member);
                }
            }
        }
        match first {
            Some(mut info) => {
                info.nullable |= saw_null;
                info
            }
            None if saw_null => Self::new(SchemaType::Null),
            None => Self::new(SchemaType::String),
        }
    }
}

/// Strip `&`, `&mut` and a lifetime from a reference type tag.
fn strip_reference(tag: &str) -> &str {
    let Some(rest) = tag.strip_prefix('&') else {
        return tag;
    };
    let mut rest = rest.trim_start();
    if let Some(lifetime) = rest.strip_prefix('\'') {
        let end = lifetime
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(lifetime.len());
        rest = lifetime[end..].trim_start();
    }
    if let Some(after_mut) = rest.strip_prefix("mut ") {
        rest = after_mut.trim_start();
    }
    rest
}

/// Split on `sep` ignoring separators nested in `<>`, `()` or `[]`.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// Declaration of one capability parameter.
///
/// A parameter is required unless its type is nullable, it was marked
/// [`optional`](Self::optional), or it carries a default. Injected parameters
/// are filled by the runtime and never appear in the provider-facing schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Resolved type.
    pub type_info: TypeInfo,
    /// Human-readable description, if declared.
    pub description: Option<String>,
    /// Value used when the argument is omitted.
    pub default: Option<Value>,
    /// Whether the provider must supply the argument.
    pub required: bool,
    /// Whether the runtime supplies the argument.
    pub injected: bool,
}

impl ParamSpec {
    /// Declare a parameter from a type tag.
    #[must_use]
    pub fn new(name: impl Into<String>, type_tag: &str) -> Self {
        Self::typed(name, TypeInfo::parse(type_tag))
    }

    /// Declare a parameter from resolved type information.
    #[must_use]
    pub fn typed(name: impl Into<String>, type_info: TypeInfo) -> Self {
        let required = !type_info.nullable;
        Self {
            name: name.into(),
            type_info,
            description: None,
            default: None,
            required,
            injected: false,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a default value, making the parameter optional.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }

    /// Mark the parameter as optional without a default.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Mark the parameter as supplied by the runtime.
    #[must_use]
    pub const fn injected(mut self) -> Self {
        self.injected = true;
        self
    }

    /// Render this parameter as a JSON schema property.
    #[must_use]
    pub fn to_property(&self, description: Option<&str>) -> Value {
        let mut property = self.type_info.to_schema();
        if let Some(obj) = property.as_object_mut() {
            if let Some(desc) = description {
                obj.insert("description".to_owned(), Value::String(desc.to_owned()));
            }
            if let Some(default) = self.default.as_ref().filter(|d| !d.is_null()) {
                obj.insert("default".to_owned(), default.clone());
            }
        }
        property
    }
}

/// JSON schema describing a capability's provider-visible parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Always `"object"`.
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    /// Property schemas keyed by parameter name.
    pub properties: Map<String, Value>,
    /// Names of required parameters, in declaration order.
    pub required: Vec<String>,
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            schema_type: SchemaType::Object,
            properties: Map::new(),
            required: Vec::new(),
        }
    }
}

impl ParameterSchema {
    /// Returns `true` if `name` is an exposed property.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Render as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "type": self.schema_type.as_str(),
            "properties": self.properties,
            "required": self.required,
        })
    }
}
