//! Request input as the gate sees it.
//!
//! Input is an ordered tree: form keys such as `tags[]` or `address[city]`
//! become lists and maps, JSON bodies map one to one. Order is kept so the
//! challenge can echo fields back the way they arrived.

use axum::http::Method;
use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<FieldValue>),
    Map(InputFields),
}

impl FieldValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::List(_) | Self::Map(_) => None,
        }
    }

    /// Mirrors form semantics: empty strings and empty collections count as absent.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Map(fields) => fields.is_empty(),
        }
    }

    fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Text(String::new()),
            Value::Bool(flag) => Self::Text(if flag { "1" } else { "0" }.to_string()),
            Value::Number(number) => Self::Text(number.to_string()),
            Value::String(text) => Self::Text(text),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(object) => Self::Map(InputFields(
                object
                    .into_iter()
                    .map(|(key, value)| (key, Self::from_json(value)))
                    .collect(),
            )),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::List(items) => items.serialize(serializer),
            Self::Map(fields) => fields.serialize(serializer),
        }
    }
}

/// Ordered field name to value mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputFields(Vec<(String, FieldValue)>);

impl InputFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Insert or replace a top-level field, keeping its original position.
    pub fn insert(&mut self, name: &str, value: FieldValue) {
        match self.0.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    #[must_use]
    pub fn without(&self, names: &[&str]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| !names.contains(&key.as_str()))
                .cloned()
                .collect(),
        )
    }

    /// Overlay `other` on top of `self`; later sources win per top-level key.
    pub fn merge(&mut self, other: Self) {
        for (key, value) in other.0 {
            self.insert(&key, value);
        }
    }

    /// Parse an `application/x-www-form-urlencoded` payload or query string.
    #[must_use]
    pub fn from_urlencoded(raw: &[u8]) -> Self {
        let mut fields = Self::new();
        for (key, value) in url::form_urlencoded::parse(raw) {
            fields.insert_path(&split_key(&key), value.into_owned());
        }
        fields
    }

    /// Top-level JSON objects become fields; anything else carries no input.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match FieldValue::from_json(value) {
            FieldValue::Map(fields) => fields,
            FieldValue::Text(_) | FieldValue::List(_) => Self::new(),
        }
    }

    fn entry(&mut self, name: &str, empty: impl FnOnce() -> FieldValue) -> &mut FieldValue {
        let index = match self.0.iter().position(|(key, _)| key == name) {
            Some(index) => index,
            None => {
                self.0.push((name.to_string(), empty()));
                self.0.len() - 1
            }
        };
        &mut self.0[index].1
    }

    fn insert_path(&mut self, path: &[String], value: String) {
        let Some((name, rest)) = path.split_first() else {
            return;
        };
        if rest.is_empty() {
            self.insert(name, FieldValue::Text(value));
            return;
        }
        let is_list = rest[0].is_empty();
        let slot = self.entry(name, || {
            if is_list {
                FieldValue::List(Vec::new())
            } else {
                FieldValue::Map(Self::new())
            }
        });
        insert_nested(slot, rest, value);
    }
}

impl Serialize for InputFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

fn insert_nested(slot: &mut FieldValue, path: &[String], value: String) {
    let Some((segment, rest)) = path.split_first() else {
        *slot = FieldValue::Text(value);
        return;
    };

    if segment.is_empty() {
        let child = nested_child(rest, value);
        match slot {
            FieldValue::List(items) => items.push(child),
            // Appending to a map takes the next free position.
            FieldValue::Map(fields) => {
                let index = next_index(fields);
                fields.insert(&index.to_string(), child);
            }
            FieldValue::Text(_) => *slot = FieldValue::List(vec![child]),
        }
        return;
    }

    // A named key on a list keeps the earlier items under their positions.
    if let FieldValue::List(items) = slot {
        let mut fields = InputFields::new();
        for (index, item) in std::mem::take(items).into_iter().enumerate() {
            fields.insert(&index.to_string(), item);
        }
        *slot = FieldValue::Map(fields);
    }
    if !matches!(slot, FieldValue::Map(_)) {
        *slot = FieldValue::Map(InputFields::new());
    }
    if let FieldValue::Map(fields) = slot {
        fields.insert_path(path, value);
    }
}

fn nested_child(rest: &[String], value: String) -> FieldValue {
    let Some(next) = rest.first() else {
        return FieldValue::Text(value);
    };
    let mut child = if next.is_empty() {
        FieldValue::List(Vec::new())
    } else {
        FieldValue::Map(InputFields::new())
    };
    insert_nested(&mut child, rest, value);
    child
}

fn next_index(fields: &InputFields) -> usize {
    fields
        .iter()
        .filter_map(|(key, _)| key.parse::<usize>().ok())
        .max()
        .map_or(0, |max| max + 1)
}

/// `a[b][]` -> `["a", "b", ""]`; keys with unbalanced brackets stay whole.
fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 {
        return vec![key.to_string()];
    }

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return vec![key.to_string()];
        };
        segments.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return vec![key.to_string()];
    }
    segments
}

/// What the gate needs from an inbound request.
pub trait GateRequest {
    fn method(&self) -> &Method;

    fn path(&self) -> &str;

    /// Raw query string without the leading `?`.
    fn query(&self) -> Option<&str>;

    /// Absolute URL of the request as the client addressed it.
    fn full_url(&self) -> String;

    fn input(&self, name: &str) -> Option<&FieldValue>;

    fn has(&self, name: &str) -> bool {
        self.input(name).is_some_and(|value| !value.is_blank())
    }

    fn all_except(&self, names: &[&str]) -> InputFields;
}

/// Owned request snapshot, built by the HTTP layer once the body is read.
#[derive(Clone, Debug)]
pub struct RequestInput {
    method: Method,
    base_url: String,
    path: String,
    query: Option<String>,
    fields: InputFields,
}

impl RequestInput {
    /// `base_url` is scheme, host and any proxy prefix, without a trailing slash.
    #[must_use]
    pub fn new(method: Method, base_url: &str, path: &str, query: Option<&str>) -> Self {
        Self {
            method,
            base_url: base_url.trim_end_matches('/').to_string(),
            path: path.to_string(),
            query: query.filter(|query| !query.is_empty()).map(str::to_string),
            fields: InputFields::new(),
        }
    }

    #[must_use]
    pub fn with_fields(mut self, fields: InputFields) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn fields(&self) -> &InputFields {
        &self.fields
    }
}

impl GateRequest for RequestInput {
    fn method(&self) -> &Method {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn full_url(&self) -> String {
        match &self.query {
            Some(query) => format!("{}{}?{query}", self.base_url, self.path),
            None => format!("{}{}", self.base_url, self.path),
        }
    }

    fn input(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    fn all_except(&self, names: &[&str]) -> InputFields {
        self.fields.without(names)
    }
}
