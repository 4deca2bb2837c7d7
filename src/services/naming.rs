//! Generated filename helper
//!
//! Stored files are named `<field>-<timestamp_ms>-<random>[.<ext>]` where the
//! random part is a v4 UUID in simple form.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Longest extension carried over from the client-supplied name
const MAX_EXTENSION_LEN: usize = 16;

/// Generate a unique storage name for an upload received in `field`
pub fn generate_filename(field: &str, original_name: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let random = Uuid::new_v4().simple();

    match extension_of(original_name) {
        Some(ext) => format!("{field}-{timestamp}-{random}.{ext}"),
        None => format!("{field}-{timestamp}-{random}"),
    }
}

/// Extension of an untrusted client filename, if it is safe to reuse
///
/// Only short ASCII-alphanumeric extensions are kept.
pub fn extension_of(original_name: &str) -> Option<&str> {
    // Clients may send Windows-style paths.
    let base = original_name.rsplit(['/', '\\']).next().unwrap_or(original_name);
    let ext = Path::new(base).extension()?.to_str()?;

    let valid = !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}
