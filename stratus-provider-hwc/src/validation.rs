//! Attribute validation before any request is sent
//!
//! Checks cover the constraints the APIs reject with an opaque 400: name
//! formats, enumerations and numeric ranges.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use stratus_core::resource::Value;

static DCS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{3,63}$").expect("DCS name pattern is valid")
});

static IMAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\- ]{1,128}$").expect("image name pattern is valid")
});

/// `bucket:object` location of an image file in OBS
static IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]:.+$").expect("image URL pattern is valid")
});

const DCS_ENGINES: &[&str] = &["Redis", "Memcached"];

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation
pub type ValidationResult = Result<(), Vec<ValidationError>>;

fn error(path: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        path: path.to_string(),
        message: message.into(),
    }
}

fn check_pattern(
    attributes: &HashMap<String, Value>,
    key: &str,
    pattern: &Regex,
    hint: &str,
    errors: &mut Vec<ValidationError>,
) {
    match attributes.get(key) {
        Some(Value::String(s)) if !pattern.is_match(s) => {
            errors.push(error(key, format!("'{}' is invalid, {}", s, hint)));
        }
        Some(Value::String(_)) | None => {}
        Some(_) => errors.push(error(key, format!("{} must be a string", key))),
    }
}

fn check_range(
    attributes: &HashMap<String, Value>,
    key: &str,
    min: i64,
    max: i64,
    errors: &mut Vec<ValidationError>,
) {
    match attributes.get(key) {
        Some(Value::Int(n)) if *n < min || *n > max => errors.push(error(
            key,
            format!("{} must be between {} and {}, got {}", key, min, max, n),
        )),
        Some(Value::Int(_)) | None => {}
        Some(_) => errors.push(error(key, format!("{} must be an integer", key))),
    }
}

fn finish(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate DCS instance attributes
pub fn validate_dcs_instance(attributes: &HashMap<String, Value>) -> ValidationResult {
    let mut errors = Vec::new();

    check_pattern(
        attributes,
        "name",
        &DCS_NAME,
        "expected 4 to 64 letters, digits, '_' or '-' starting with a letter",
        &mut errors,
    );

    if let Some(value) = attributes.get("engine") {
        match value.as_str() {
            Some(engine) if DCS_ENGINES.iter().any(|e| *e == engine) => {}
            _ => errors.push(error(
                "engine",
                format!("engine must be one of {}", DCS_ENGINES.join(", ")),
            )),
        }
    }

    match attributes.get("capacity") {
        Some(Value::Int(n)) if *n <= 0 => {
            errors.push(error("capacity", "capacity must be positive"))
        }
        Some(Value::Float(f)) if *f <= 0.0 => {
            errors.push(error("capacity", "capacity must be positive"))
        }
        Some(Value::Int(_)) | Some(Value::Float(_)) | None => {}
        Some(_) => errors.push(error("capacity", "capacity must be a number")),
    }

    check_range(attributes, "port", 1, 65535, &mut errors);

    if let Some(value) = attributes.get("availability_zones") {
        match value {
            Value::List(zones) if !zones.is_empty() => {}
            _ => errors.push(error(
                "availability_zones",
                "availability_zones must be a non-empty list",
            )),
        }
    }

    finish(errors)
}

/// Validate IMS image attributes
pub fn validate_ims_image(attributes: &HashMap<String, Value>) -> ValidationResult {
    let mut errors = Vec::new();

    check_pattern(
        attributes,
        "name",
        &IMAGE_NAME,
        "expected 1 to 128 letters, digits, spaces, '_', '-' or '.'",
        &mut errors,
    );
    check_pattern(
        attributes,
        "image_url",
        &IMAGE_URL,
        "expected 'bucket:file'",
        &mut errors,
    );
    check_range(attributes, "min_disk", 1, 1024, &mut errors);
    check_range(attributes, "min_ram", 0, 1024 * 1024, &mut errors);
    check_range(attributes, "max_ram", 0, 1024 * 1024, &mut errors);

    finish(errors)
}

/// Validate a resource based on its type
pub fn validate_resource(
    resource_type: &str,
    attributes: &HashMap<String, Value>,
) -> ValidationResult {
    match resource_type {
        "dcs_instance" => validate_dcs_instance(attributes),
        "ims_image" => validate_ims_image(attributes),
        _ => Ok(()),
    }
}
