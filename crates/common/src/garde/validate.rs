//! Garde validation utilities.

use crate::domain::DomainError;
use garde::{Report, Validate};

/// Validate a struct, converting the garde report into a `DomainError::ValidationError`
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(format_validation_errors(&report)))
}

fn format_validation_errors(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            if path.to_string().is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{UpdateConfigParams, WakeUpParams};

    #[test]
    fn test_validate_success() {
        let params = WakeUpParams {
            collection_hours: 12,
            telemetry_interval_minutes: 60,
        };
        assert!(validate_struct(&params).is_ok());
    }

    #[test]
    fn test_validate_failure() {
        let params = WakeUpParams {
            collection_hours: 0,
            telemetry_interval_minutes: 60,
        };
        let result = validate_struct(&params);
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_validate_optional_fields_only_checked_when_present() {
        assert!(validate_struct(&UpdateConfigParams::default()).is_ok());

        let params = UpdateConfigParams {
            telemetry_interval_minutes: None,
            battery_threshold_v: Some(9.0),
        };
        if let Err(DomainError::ValidationError(msg)) = validate_struct(&params) {
            assert!(msg.contains("battery_threshold_v"));
        } else {
            panic!("Expected ValidationError");
        }
    }
}
