//! Ticket handles derived from physical storage names.
//!
//! Every stored artifact is named `STORAGE_PREFIX + <random> + [.<format>] +
//! STORAGE_SUFFIX`; the handle is what remains once prefix and suffix are
//! removed, so `pressroom-Xk3Pq.pdf.printout` yields `Xk3Pq.pdf`.

use super::error::DomainError;

pub const STORAGE_PREFIX: &str = "pressroom-";
pub const STORAGE_SUFFIX: &str = ".printout";

/// Suffix used when creating the storage name for an artifact of the given format.
pub fn storage_suffix(file_suffix: &str) -> String {
    let file_suffix = file_suffix.trim_start_matches('.');
    if file_suffix.is_empty() {
        STORAGE_SUFFIX.to_string()
    } else {
        format!(".{file_suffix}{STORAGE_SUFFIX}")
    }
}

/// Derive the public handle from a storage name.
pub fn handle_from_storage_name(name: &str) -> Result<String, DomainError> {
    let handle = name
        .strip_prefix(STORAGE_PREFIX)
        .and_then(|rest| rest.strip_suffix(STORAGE_SUFFIX))
        .filter(|handle| !handle.is_empty())
        .ok_or_else(|| {
            DomainError::invariant(format!(
                "storage name `{name}` does not follow `{STORAGE_PREFIX}*{STORAGE_SUFFIX}`"
            ))
        })?;

    if !handle.chars().all(is_url_safe) {
        return Err(DomainError::invariant(format!(
            "handle `{handle}` contains characters that are not URL safe"
        )));
    }

    Ok(handle.to_string())
}

/// File name under which a handle is fetched back (`<handle>.printout`).
pub fn ticket_file_name(handle: &str) -> String {
    format!("{handle}{STORAGE_SUFFIX}")
}

/// Extract the handle from a fetch request's last path segment.
pub fn handle_from_ticket(segment: &str) -> Option<&str> {
    segment
        .strip_suffix(STORAGE_SUFFIX)
        .filter(|handle| !handle.is_empty())
}

fn is_url_safe(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')
}
