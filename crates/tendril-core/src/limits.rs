//! Input validation limits for schema declarations and batch writes

/// Maximum length for kind labels and relationship type labels (128 chars)
pub const MAX_LABEL_LEN: usize = 128;

/// Maximum length for property and relationship attribute names (128 chars)
pub const MAX_FIELD_NAME_LEN: usize = 128;

/// Maximum rows in a single batch create (1000)
pub const MAX_BATCH_ROWS: usize = 1000;

/// Label reserved for per-kind category nodes
pub const CATEGORY_LABEL: &str = "Category";

/// Validation error type
#[derive(Debug, Clone, PartialEq)]
pub enum LimitError {
    EmptyLabel,
    LabelTooLong { len: usize, max: usize },
    InvalidLabelChar { label: String, ch: char },
    ReservedLabel(String),
    EmptyFieldName,
    FieldNameTooLong { len: usize, max: usize },
    TooManyRows { count: usize, max: usize },
}

impl std::fmt::Display for LimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyLabel => write!(f, "Label cannot be empty"),
            Self::LabelTooLong { len, max } => {
                write!(f, "Label too long: {} chars (max {})", len, max)
            }
            Self::InvalidLabelChar { label, ch } => {
                write!(f, "Label '{}' contains invalid character '{}'", label, ch)
            }
            Self::ReservedLabel(label) => write!(f, "Label '{}' is reserved", label),
            Self::EmptyFieldName => write!(f, "Field name cannot be empty"),
            Self::FieldNameTooLong { len, max } => {
                write!(f, "Field name too long: {} chars (max {})", len, max)
            }
            Self::TooManyRows { count, max } => {
                write!(f, "Too many rows in batch: {} (max {})", count, max)
            }
        }
    }
}

impl std::error::Error for LimitError {}

/// Validate a kind label or relationship type label
pub fn validate_label(label: &str) -> Result<(), LimitError> {
    if label.is_empty() {
        return Err(LimitError::EmptyLabel);
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(LimitError::LabelTooLong {
            len: label.len(),
            max: MAX_LABEL_LEN,
        });
    }
    if let Some(ch) = label.chars().find(|c| !(c.is_alphanumeric() || *c == '_')) {
        return Err(LimitError::InvalidLabelChar {
            label: label.to_string(),
            ch,
        });
    }
    Ok(())
}

/// Validate a kind label, which additionally must not collide with the category label
pub fn validate_kind_label(label: &str) -> Result<(), LimitError> {
    validate_label(label)?;
    if label == CATEGORY_LABEL {
        return Err(LimitError::ReservedLabel(label.to_string()));
    }
    Ok(())
}

/// Validate a property or relationship attribute name
pub fn validate_field_name(name: &str) -> Result<(), LimitError> {
    if name.is_empty() {
        return Err(LimitError::EmptyFieldName);
    }
    if name.len() > MAX_FIELD_NAME_LEN {
        return Err(LimitError::FieldNameTooLong {
            len: name.len(),
            max: MAX_FIELD_NAME_LEN,
        });
    }
    Ok(())
}

/// Validate batch row count
pub fn validate_batch_rows(count: usize) -> Result<(), LimitError> {
    if count > MAX_BATCH_ROWS {
        return Err(LimitError::TooManyRows {
            count,
            max: MAX_BATCH_ROWS,
        });
    }
    Ok(())
}
