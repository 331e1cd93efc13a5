use crate::transform::params::ResizeOptions;
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of a transformed result: the content fingerprint of the source
/// bytes combined with every transform parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for `(input, options)`.
    ///
    /// Numeric fields are hashed at fixed width and the format is length
    /// prefixed, so no two distinct tuples share a preimage.
    pub fn derive(input: &[u8], options: &ResizeOptions) -> Self {
        let fingerprint = Sha256::digest(input);

        let mut hasher = Sha256::new();
        hasher.update(fingerprint);
        hasher.update(options.width.to_be_bytes());
        hasher.update(options.height.to_be_bytes());
        hasher.update([options.quality]);
        hasher.update((options.format.len() as u64).to_be_bytes());
        hasher.update(options.format.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn opts(width: u32, height: u32, quality: u8, format: &str) -> ResizeOptions {
        ResizeOptions { width, height, quality, format: format.to_string() }
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = CacheKey::derive(b"abc", &opts(400, 300, 80, "jpeg"));
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn format_is_not_confused_with_neighbouring_fields() {
        // "1" + "2x" and "12" + "x" would collide under naive concatenation.
        let a = CacheKey::derive(b"img", &opts(1, 2, 80, "webp"));
        let b = CacheKey::derive(b"img", &opts(12, 0, 80, "webp"));
        assert_ne!(a, b);
        assert_ne!(
            CacheKey::derive(b"img", &opts(1, 1, 8, "0jpeg")),
            CacheKey::derive(b"img", &opts(1, 1, 80, "jpeg")),
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_identical_inputs_give_identical_keys(
            content in prop::collection::vec(any::<u8>(), 0..256),
            w in 1u32..5000, h in 1u32..5000, q in 1u8..=100,
            fmt in "(jpeg|jpg|png|webp)",
        ) {
            let o = opts(w, h, q, &fmt);
            prop_assert_eq!(CacheKey::derive(&content, &o), CacheKey::derive(&content, &o.clone()));
        }

        #[test]
        fn prop_any_changed_field_changes_key(
            content in prop::collection::vec(any::<u8>(), 1..256),
            w in 1u32..5000, h in 1u32..5000, q in 1u8..100,
        ) {
            let base = opts(w, h, q, "jpeg");
            let key = CacheKey::derive(&content, &base);

            prop_assert_ne!(&key, &CacheKey::derive(&content, &opts(w + 1, h, q, "jpeg")));
            prop_assert_ne!(&key, &CacheKey::derive(&content, &opts(w, h + 1, q, "jpeg")));
            prop_assert_ne!(&key, &CacheKey::derive(&content, &opts(w, h, q + 1, "jpeg")));
            prop_assert_ne!(&key, &CacheKey::derive(&content, &opts(w, h, q, "png")));

            let mut other = content.clone();
            other[0] ^= 0xff;
            prop_assert_ne!(&key, &CacheKey::derive(&other, &base));
        }
    }
}
