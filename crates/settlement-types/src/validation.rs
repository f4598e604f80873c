//! Schema checks for the free-form `config` tables handed to implementation
//! factories.

use thiserror::Error;

/// Why a `config` table was refused. Field names are dotted paths from the
/// table root.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	/// A required field is absent.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// The field has the right type but its value was refused, either by a
	/// format or range check or by a custom validator.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// The field holds a different TOML type.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

impl ValidationError {
	/// Prefixes the offending field with its parent table.
	fn nested_in(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => {
				ValidationError::MissingField(format!("{}.{}", parent, f))
			}
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
		}
	}
}

/// Expected shape of one field.
#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// `0x`-prefixed 20-byte hex string.
	Address,
	/// `http://` or `https://` URL.
	Url,
	/// Nested table checked against its own schema.
	Table(Schema),
}

/// Extra check run after the type matched; the error becomes the message
/// of [`ValidationError::InvalidValue`].
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field with its expected type.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	/// A field with no custom validator.
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a check that runs once the type matched.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of one table. Keys the schema does not name
/// are ignored.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Checks that `config` is a table holding every required field, and
	/// that each present field, required or optional, has the expected type
	/// and passes its validator. Stops at the first failure.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| mismatch("root", "table", config))?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}
		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}
		Ok(())
	}
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
	ValidationError::InvalidValue {
		field: field.to_string(),
		message: message.into(),
	}
}

fn check_type(name: &str, value: &toml::Value, expected: &FieldType) -> Result<(), ValidationError> {
	match expected {
		FieldType::String => {
			value.as_str().ok_or_else(|| mismatch(name, "string", value))?;
		}
		FieldType::Boolean => {
			value.as_bool().ok_or_else(|| mismatch(name, "boolean", value))?;
		}
		FieldType::Integer { min, max } => {
			let n = value
				.as_integer()
				.ok_or_else(|| mismatch(name, "integer", value))?;
			if min.is_some_and(|min| n < min) || max.is_some_and(|max| n > max) {
				return Err(invalid(
					name,
					format!("{} is outside [{:?}, {:?}]", n, min, max),
				));
			}
		}
		FieldType::Address => {
			let s = value.as_str().ok_or_else(|| mismatch(name, "address", value))?;
			let digits = s
				.strip_prefix("0x")
				.ok_or_else(|| invalid(name, "address must start with 0x"))?;
			if digits.len() != 40 || hex::decode(digits).is_err() {
				return Err(invalid(name, "address must be 20 bytes of hex"));
			}
		}
		FieldType::Url => {
			let s = value.as_str().ok_or_else(|| mismatch(name, "url", value))?;
			if !(s.starts_with("http://") || s.starts_with("https://")) {
				return Err(invalid(name, "URL must start with http:// or https://"));
			}
		}
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| e.nested_in(name))?;
		}
	}
	Ok(())
}

/// Implemented by each pluggable implementation for its `config` table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
