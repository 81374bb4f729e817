//! Object-storage path to public URL resolution.
//!
//! Product rows store image references as paths into the media bucket, as
//! written at upload time. Depending on which form wrote them they may be
//! percent-encoded, prefixed with the bucket name, or already be full URLs.
//! [`MediaResolver`] turns any of these into a public URL (or the placeholder)
//! and is the only place in the workspace that does so.
//!
//! Paths are percent-decoded exactly once. A stored `a%2520b.png` therefore
//! resolves to the object named `a%20b.png`, not `a b.png`.

use std::borrow::Cow;

/// Placeholder shown when a product has no image.
pub const DEFAULT_PLACEHOLDER: &str = "/static/placeholder.png";

/// Resolves stored media paths into public URLs for one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaResolver {
    base_url: String,
    bucket: String,
    placeholder: String,
}

impl MediaResolver {
    /// Create a resolver for `bucket` on the backend at `base_url`.
    #[must_use]
    pub fn new(base_url: &str, bucket: &str, placeholder: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            bucket: bucket.trim_matches('/').to_owned(),
            placeholder: placeholder.to_owned(),
        }
    }

    /// The bucket this resolver builds URLs for.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The placeholder URL.
    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Resolve a possibly-missing stored path to a URL.
    #[must_use]
    pub fn resolve(&self, path: Option<&str>) -> String {
        let Some(raw) = path.map(str::trim).filter(|p| !p.is_empty()) else {
            return self.placeholder.clone();
        };
        if is_absolute_url(raw) {
            return raw.to_owned();
        }
        match self.object_key(raw) {
            Some(key) => self.public_url(&key),
            None => self.placeholder.clone(),
        }
    }

    /// Resolve every stored path, keeping order.
    #[must_use]
    pub fn resolve_all(&self, paths: &[String]) -> Vec<String> {
        paths.iter().map(|p| self.resolve(Some(p))).collect()
    }

    /// The first image of a list, or the placeholder.
    #[must_use]
    pub fn primary(&self, paths: &[String]) -> String {
        self.resolve(paths.first().map(String::as_str))
    }

    /// The decoded object key inside the bucket, as storage APIs expect it.
    ///
    /// Accepts a stored path or a public URL produced by this resolver.
    /// Returns `None` for empty input or URLs pointing elsewhere.
    #[must_use]
    pub fn object_key(&self, stored: &str) -> Option<String> {
        let stored = stored.trim();
        let relative = if is_absolute_url(stored) {
            let prefix = format!("{}/{}/", self.public_prefix(), self.bucket);
            stored.strip_prefix(&prefix)?
        } else {
            stored
        };

        let decoded = decode_path(relative);
        let mut key = decoded.trim_start_matches('/');
        if let Some(rest) = key
            .strip_prefix(self.bucket.as_str())
            .and_then(|r| r.strip_prefix('/'))
        {
            key = rest;
        }
        (!key.is_empty()).then(|| key.to_owned())
    }

    /// Public URL for an already-decoded object key.
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        let encoded = key
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}/{encoded}", self.public_prefix(), self.bucket)
    }

    fn public_prefix(&self) -> String {
        format!("{}/storage/v1/object/public", self.base_url)
    }
}

fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Percent-decode a stored path once.
///
/// Invalid escapes or non-UTF-8 results leave the input untouched.
#[must_use]
pub fn decode_path(path: &str) -> Cow<'_, str> {
    urlencoding::decode(path).unwrap_or(Cow::Borrowed(path))
}

/// Make an uploaded file name safe for use as an object key.
///
/// Every character other than ASCII letters, digits, `.` and `-` becomes `_`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Object key for a product image upload.
///
/// Keys are namespaced by company and product so storage policies can scope
/// writes to the owning company, and prefixed with the upload time so
/// re-uploading a file with the same name never overwrites the original.
#[must_use]
pub fn product_image_key(
    company: impl std::fmt::Display,
    product: impl std::fmt::Display,
    uploaded_at_millis: i64,
    file_name: &str,
) -> String {
    format!(
        "{company}/{product}/{uploaded_at_millis}_{}",
        sanitize_file_name(file_name)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn resolver() -> MediaResolver {
        MediaResolver::new("https://proj.backend.test/", "product-images", "/img/none.png")
    }

    #[test]
    fn test_missing_path_gives_placeholder() {
        let r = resolver();
        assert_eq!(r.resolve(None), "/img/none.png");
        assert_eq!(r.resolve(Some("")), "/img/none.png");
        assert_eq!(r.resolve(Some("   ")), "/img/none.png");
        assert_eq!(r.primary(&[]), "/img/none.png");
    }

    #[test]
    fn test_relative_path_resolves() {
        assert_eq!(
            resolver().resolve(Some("c1/p1/honey.jpg")),
            "https://proj.backend.test/storage/v1/object/public/product-images/c1/p1/honey.jpg"
        );
    }

    #[test]
    fn test_bucket_prefix_and_leading_slash_are_stripped() {
        let r = resolver();
        let expected =
            "https://proj.backend.test/storage/v1/object/public/product-images/c1/honey.jpg";
        assert_eq!(r.resolve(Some("product-images/c1/honey.jpg")), expected);
        assert_eq!(r.resolve(Some("/c1/honey.jpg")), expected);
    }

    #[test]
    fn test_percent_escapes_decoded_exactly_once() {
        let r = resolver();
        assert_eq!(decode_path("raw%20honey.jpg"), "raw honey.jpg");
        assert_eq!(decode_path("a%2520b.png"), "a%20b.png");
        assert_eq!(r.object_key("c1/a%2520b.png").unwrap(), "c1/a%20b.png");
        assert_eq!(
            r.resolve(Some("c1/raw%20honey.jpg")),
            "https://proj.backend.test/storage/v1/object/public/product-images/c1/raw%20honey.jpg"
        );
        // The literal "%20" in the object name is re-encoded, not decoded again.
        assert_eq!(
            r.resolve(Some("c1/a%2520b.png")),
            "https://proj.backend.test/storage/v1/object/public/product-images/c1/a%2520b.png"
        );
    }

    #[test]
    fn test_absolute_urls_pass_through() {
        let url = "https://cdn.example.com/x.png";
        assert_eq!(resolver().resolve(Some(url)), url);
    }

    #[test]
    fn test_object_key_from_own_public_url() {
        let r = resolver();
        let url = r.resolve(Some("c1/raw%20honey.jpg"));
        assert_eq!(r.object_key(&url).unwrap(), "c1/raw honey.jpg");
        assert!(r.object_key("https://cdn.example.com/x.png").is_none());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("My Photo (1).JPG"), "My_Photo__1_.JPG");
        assert_eq!(sanitize_file_name("ghee-500g.v2.png"), "ghee-500g.v2.png");
        assert_eq!(sanitize_file_name("தேன்.png"), "____.png");
        assert_eq!(sanitize_file_name("a/b\\c?.png"), "a_b_c_.png");
    }

    #[test]
    fn test_product_image_key() {
        assert_eq!(
            product_image_key("c1", "p9", 1_700_000_000_000, "fresh jaggery.webp"),
            "c1/p9/1700000000000_fresh_jaggery.webp"
        );
    }
}
