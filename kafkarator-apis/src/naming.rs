/// Aiven rejects service user names longer than this.
pub const SERVICE_USER_NAME_MAX_LENGTH: usize = 63;

// "-" followed by 8 hex digits
const SHORT_NAME_SUFFIX_LENGTH: usize = 9;

fn crc32_hex(value: &str) -> String {
    format!("{:08x}", crc32fast::hash(value.as_bytes()))
}

fn truncate(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Shortens `basename` so that it fits into `maxlen`, keeping it unique by
/// appending the CRC32 of the full basename.
///
/// Below the length of the checksum suffix only the leading checksum digits are kept.
pub fn short_name(basename: &str, maxlen: usize) -> String {
    let checksum = crc32_hex(basename);
    if maxlen < SHORT_NAME_SUFFIX_LENGTH {
        return truncate(&checksum, maxlen).to_string();
    }
    let head = truncate(basename, maxlen - SHORT_NAME_SUFFIX_LENGTH);
    format!("{}-{}", head, checksum)
}

/// Name of the service user an application of a team connects with.
pub fn service_user_name(team: &str, application: &str) -> String {
    short_name(
        &format!("{}__{}", team, application),
        SERVICE_USER_NAME_MAX_LENGTH,
    )
}

/// Pattern matching all service users generated for an application,
/// `{team}_{application}_{crc32}_*`.
pub fn wildcard_service_user_name(team: &str, application: &str) -> String {
    let suffix = format!("_{}_*", crc32_hex(&format!("{}{}", team, application)));
    let prefix = format!("{}_{}", team, application);
    let head = truncate(
        &prefix,
        SERVICE_USER_NAME_MAX_LENGTH.saturating_sub(suffix.len()),
    );
    format!("{}{}", head, suffix)
}
