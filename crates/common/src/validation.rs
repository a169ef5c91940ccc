//! Input validation for user-supplied names
//!
//! Requested subdomains end up as DNS labels and in log lines, so they are
//! checked before a tunnel is registered under them.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::TunnelError;

/// Regex for a single DNS label: lowercase alphanumerics with inner hyphens
static SUBDOMAIN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$").expect("valid regex"));

/// Maximum length of a DNS label
pub const MAX_SUBDOMAIN_LENGTH: usize = 63;

/// Validate a requested subdomain
///
/// # Examples
///
/// ```
/// use porthole_common::validation::validate_subdomain;
///
/// assert!(validate_subdomain("haas").is_ok());
/// assert!(validate_subdomain("my-app-2").is_ok());
/// assert!(validate_subdomain("Haas").is_err());
/// assert!(validate_subdomain("-edge").is_err());
/// ```
pub fn validate_subdomain(name: &str) -> Result<(), TunnelError> {
    if name.len() > MAX_SUBDOMAIN_LENGTH || !SUBDOMAIN_REGEX.is_match(name) {
        return Err(TunnelError::InvalidSubdomain(
            name.chars().take(MAX_SUBDOMAIN_LENGTH).collect::<String>(), // Limit error message
        ));
    }
    Ok(())
}
