use crate::utils::error::ConfigError;
use std::collections::HashSet;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<(), ConfigError>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Accepts absolute http(s) URLs only.
pub fn validate_url(field_name: &str, url_str: &str) -> Result<Url, ConfigError> {
    if url_str.trim().is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str.trim()) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(field_name, url_str, format!("Invalid URL format: {}", e))),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<(), ConfigError> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_positive_number(
    field_name: &str,
    value: usize,
    min_value: usize,
) -> Result<(), ConfigError> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_file_extension(
    field_name: &str,
    file: &str,
    allowed_extensions: &[&str],
) -> Result<String, ConfigError> {
    let allowed_set: HashSet<&str> = allowed_extensions.iter().copied().collect();

    let extension = std::path::Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| invalid(field_name, file, "File has no extension or invalid filename"))?;

    if !allowed_set.contains(extension.as_str()) {
        return Err(invalid(
            field_name,
            file,
            format!(
                "Unsupported file extension: {}. Allowed extensions: {}",
                extension,
                allowed_extensions.join(", ")
            ),
        ));
    }

    Ok(extension)
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("url", "https://example.com").is_ok());
        assert!(validate_url("url", "http://example.com/page?q=1").is_ok());
        assert!(validate_url("url", "").is_err());
        assert!(validate_url("url", "invalid-url").is_err());
        assert!(validate_url("url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("batch.concurrent_requests", 5, 1).is_ok());
        assert!(validate_positive_number("batch.concurrent_requests", 0, 1).is_err());
    }

    #[test]
    fn test_validate_file_extension() {
        assert_eq!(
            validate_file_extension("input", "urls.CSV", &["txt", "csv", "json"]).unwrap(),
            "csv"
        );
        assert!(validate_file_extension("input", "urls.xlsx", &["txt", "csv", "json"]).is_err());
        assert!(validate_file_extension("input", "urls", &["txt"]).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("fetch.max_redirects", 5, 0, 20).is_ok());
        assert!(validate_range("fetch.max_redirects", 21, 0, 20).is_err());
    }
}
