//! Public share slugs: `<title-base>-<random-suffix>`.

use rand::Rng;

/// Base used when the title has nothing URL-safe in it.
pub const PLACEHOLDER: &str = "snippet";
pub const SUFFIX_LEN: usize = 8;
/// Suffix length for the single retry after a collision.
pub const RETRY_SUFFIX_LEN: usize = 12;
const MAX_BASE_LEN: usize = 48;
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Lower-case the title and collapse every run of other characters into one `-`.
pub fn base_from_title(title: Option<&str>) -> String {
    let mut base = String::new();
    for c in title.unwrap_or_default().chars() {
        if c.is_ascii_alphanumeric() {
            base.push(c.to_ascii_lowercase());
        } else if !base.is_empty() && !base.ends_with('-') {
            base.push('-');
        }
    }
    base.truncate(MAX_BASE_LEN);
    let base = base.trim_end_matches('-');
    if base.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        base.to_string()
    }
}

pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

pub fn generate(title: Option<&str>, suffix_len: usize) -> String {
    format!("{}-{}", base_from_title(title), random_suffix(suffix_len))
}

pub fn is_well_formed(slug: &str) -> bool {
    let Some((base, suffix)) = slug.rsplit_once('-') else {
        return false;
    };
    suffix.len() >= 6
        && suffix.bytes().all(|b| ALPHABET.contains(&b))
        && !base.is_empty()
        && !base.starts_with('-')
        && !base.ends_with('-')
        && !base.contains("--")
        && base.bytes().all(|b| b == b'-' || ALPHABET.contains(&b))
}
