//! Runtime environment detection.

/// Environment variable set by the Lambda execution environment.
pub const LAMBDA_FUNCTION_NAME_VAR: &str = "AWS_LAMBDA_FUNCTION_NAME";

/// Returns `true` when the process runs inside AWS Lambda.
pub fn is_running_as_lambda() -> bool {
    std::env::var(LAMBDA_FUNCTION_NAME_VAR)
        .map(|name| !name.is_empty())
        .unwrap_or(false)
}

/// Read an environment variable, treating an empty value as unset.
pub fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_var_ignores_empty_values() {
        std::env::set_var("COMMONLIB_CORE_TEST_EMPTY", "");
        assert_eq!(non_empty_var("COMMONLIB_CORE_TEST_EMPTY"), None);

        std::env::set_var("COMMONLIB_CORE_TEST_SET", "value");
        assert_eq!(
            non_empty_var("COMMONLIB_CORE_TEST_SET"),
            Some("value".to_string())
        );
    }
}
