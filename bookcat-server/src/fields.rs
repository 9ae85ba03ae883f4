//! Lenient request-field access
//!
//! Write endpoints accept a JSON object, a urlencoded form or a multipart
//! form interchangeably. All three are read into one [`Fields`] map so the
//! handlers share accessors. A body that fails to parse reads as empty, and
//! the handler then reports whichever field it found missing.

use std::collections::HashMap;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::{header::CONTENT_TYPE, StatusCode},
    Form,
};
use bookcat_common::text::{normalize, parse_bool};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Field map of one request body (or query string)
#[derive(Debug, Clone, Default)]
pub struct Fields(Map<String, Value>);

impl Fields {
    pub fn from_json_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        )
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Raw string form of a scalar value; `None` for null, arrays and objects
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            _ => None,
        }
    }

    /// First present key among aliases (`new_password` / `newPassword`)
    pub fn text_any(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.text(k))
    }

    /// Normalized text; blank values read as `None`
    pub fn normalized(&self, key: &str) -> Option<String> {
        self.text(key).as_deref().and_then(normalize)
    }

    /// Integer value; numeric strings are accepted, floats truncate
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => parse_int(s),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Truthiness of a flag; unparseable values read as `false`
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.strict_bool(key).map(|parsed| parsed.unwrap_or(false))
    }

    /// Boolean that must parse; `Some(Err(()))` for a present but invalid value
    pub fn strict_bool(&self, key: &str) -> Option<Result<bool, ()>> {
        let parsed = match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|f| f != 0.0),
            Value::String(s) => parse_bool(s),
            Value::Null => Some(false),
            _ => None,
        };
        Some(parsed.ok_or(()))
    }

    /// Nested object (`placement: {bookcase_no, shelf_no}`)
    pub fn object(&self, key: &str) -> Option<Fields> {
        match self.0.get(key)? {
            Value::Object(map) => Some(Fields(map.clone())),
            _ => None,
        }
    }

    /// Merge another map over this one
    pub fn merge(&mut self, other: Fields) {
        self.0.extend(other.0);
    }
}

impl From<HashMap<String, String>> for Fields {
    fn from(params: HashMap<String, String>) -> Self {
        Self::from_pairs(params)
    }
}

/// Lenient integer parse: trims, accepts a sign and a fractional tail
pub fn parse_int(input: &str) -> Option<i64> {
    let s = input.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
}

/// A file part of a multipart upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Fields plus any uploaded files of one request
#[derive(Debug, Default)]
pub struct FormData {
    pub fields: Fields,
    pub files: HashMap<String, UploadedFile>,
}

impl FormData {
    /// Uploaded file by field name; empty parts count as absent
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name).filter(|f| !f.bytes.is_empty())
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload exceeds the request size limit".to_string())
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err))
    }
}

#[async_trait]
impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            let mut form = FormData::default();

            while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
                let name = field.name().unwrap_or("").to_string();
                if let Some(file_name) = field.file_name().map(str::to_string) {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    form.files.insert(
                        name,
                        UploadedFile {
                            file_name,
                            content_type,
                            bytes,
                        },
                    );
                } else {
                    let text = field.text().await.map_err(multipart_error)?;
                    if name == "payload" {
                        // Book forms send their fields as one JSON part
                        form.fields.merge(Fields::from_json_bytes(text.as_bytes()));
                    } else {
                        form.fields.insert(name, Value::String(text));
                    }
                }
            }
            return Ok(form);
        }

        if content_type.starts_with("application/json") {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            return Ok(FormData {
                fields: Fields::from_json_bytes(&bytes),
                files: HashMap::new(),
            });
        }

        let fields = Form::<Vec<(String, String)>>::from_request(req, state)
            .await
            .map(|Form(pairs)| Fields::from_pairs(pairs))
            .unwrap_or_default();
        Ok(FormData {
            fields,
            files: HashMap::new(),
        })
    }
}

#[async_trait]
impl<S> FromRequest<S> for Fields
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        FormData::from_request(req, state).await.map(|form| form.fields)
    }
}
