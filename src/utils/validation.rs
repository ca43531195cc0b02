use validator::Validate;

use crate::error::{AppError, AppResult};

/// Validate a struct and return AppError on failure
pub fn validate_request<T: Validate>(data: &T) -> AppResult<()> {
    data.validate().map_err(|e| {
        let messages: Vec<String> = e
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| "invalid".to_string())
                    )
                })
            })
            .collect();
        AppError::InvalidRequest(messages.join(", "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "must not be empty"))]
        name: String,
    }

    #[test]
    fn validate_request_ok() {
        let sample = Sample { name: "ok".into() };
        assert!(validate_request(&sample).is_ok());
    }

    #[test]
    fn validate_request_collects_field_errors() {
        let sample = Sample { name: "".into() };
        let err = validate_request(&sample).unwrap_err();
        match err {
            AppError::InvalidRequest(msg) => assert!(msg.contains("name")),
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }
}
