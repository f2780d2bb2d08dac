use sha2::{Digest, Sha256};

const SEO_KEYWORDS: &[&str] = &[
    "handcrafted-jewelry",
    "custom-engagement-ring",
    "fine-gold-jewelry",
    "artisan-silver-jewelry",
    "bespoke-wedding-band",
    "lost-wax-cast-jewelry",
    "heirloom-quality-ring",
    "made-to-order-jewelry",
];

/// Lower-cases `value` and collapses every run of non-alphanumeric characters
/// into a single `-`. Leading and trailing separators are dropped.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Picks the SEO keyword for a SKU. Stable across processes and releases
/// because it hashes with SHA-256 rather than the std hasher.
pub fn seo_keyword(sku: &str) -> &'static str {
    let digest = Sha256::digest(sku.trim().to_uppercase().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let index = u64::from_be_bytes(prefix) % SEO_KEYWORDS.len() as u64;
    SEO_KEYWORDS[index as usize]
}

/// File extension for an uploaded image's content type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_ascii_lowercase()
        .as_str()
    {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

/// Object key for a stage image:
/// `{category}/{sku}-{keyword}-{phrase}.{ext}`.
pub fn storage_key(category: &str, sku: &str, phrase: &str, content_type: &str) -> String {
    let category = match slugify(category) {
        slug if slug.is_empty() => "uncategorized".to_string(),
        slug => slug,
    };
    format!(
        "{category}/{sku}-{keyword}-{phrase}.{ext}",
        sku = slugify(sku),
        keyword = seo_keyword(sku),
        phrase = slugify(phrase),
        ext = extension_for(content_type),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Custom Gold -- Ring!! "), "custom-gold-ring");
        assert_eq!(slugify("ABC_123"), "abc-123");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn seo_keyword_is_deterministic_and_case_insensitive() {
        let first = seo_keyword("ABC-123");
        assert_eq!(first, seo_keyword("ABC-123"));
        assert_eq!(first, seo_keyword(" abc-123 "));
        assert!(SEO_KEYWORDS.contains(&first));
    }

    #[test]
    fn storage_key_is_human_readable() {
        let key = storage_key("Rings", "ABC-123", "wax model photo", "image/png");
        let keyword = seo_keyword("ABC-123");
        assert_eq!(key, format!("rings/abc-123-{keyword}-wax-model-photo.png"));
    }

    #[test]
    fn storage_key_handles_blank_category_and_unknown_type() {
        let key = storage_key("", "X1", "final piece", "application/octet-stream");
        assert!(key.starts_with("uncategorized/x1-"));
        assert!(key.ends_with("-final-piece.jpg"));
    }

    #[test]
    fn extension_ignores_parameters() {
        assert_eq!(extension_for("image/webp; charset=binary"), "webp");
        assert_eq!(extension_for("IMAGE/PNG"), "png");
    }
}
