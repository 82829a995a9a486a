//! Required-field checks shared by the store and its callers.

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{field} must not be blank")]
pub struct BlankField {
    pub field: &'static str,
}

/// Trim `value` and reject it if nothing is left.
pub fn require_text<'a>(field: &'static str, value: &'a str) -> Result<&'a str, BlankField> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(BlankField { field })
    } else {
        Ok(trimmed)
    }
}
