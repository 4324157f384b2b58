//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dao::models::MatchLevel;

/// Parse a skill level identifier (`beginner`, `intermediate` or `advanced`).
pub fn parse_level(level: &str) -> Option<MatchLevel> {
    match level.trim().to_ascii_lowercase().as_str() {
        "beginner" => Some(MatchLevel::Beginner),
        "intermediate" => Some(MatchLevel::Intermediate),
        "advanced" => Some(MatchLevel::Advanced),
        _ => None,
    }
}

/// Validates that `level` names one of the supported skill levels.
pub fn validate_level(level: &str) -> Result<(), ValidationError> {
    if parse_level(level).is_some() {
        return Ok(());
    }
    let mut err = ValidationError::new("level");
    err.message = Some(
        format!("Level must be one of beginner, intermediate, advanced (got `{level}`)").into(),
    );
    Err(err)
}

/// Validates that a free-text identifier is not only whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_case_insensitive() {
        assert_eq!(parse_level("Advanced"), Some(MatchLevel::Advanced));
        assert_eq!(parse_level(" beginner "), Some(MatchLevel::Beginner));
        assert!(validate_level("intermediate").is_ok());
    }

    #[test]
    fn unknown_levels_are_rejected() {
        assert!(validate_level("pro").is_err());
        assert!(validate_level("").is_err());
    }

    #[test]
    fn blank_values_are_rejected() {
        assert!(validate_not_blank("   ").is_err());
        assert!(validate_not_blank("club-7").is_ok());
    }
}
