use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::config::MediaConfig;

/// How the MIME type in an image data URI is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageMimePolicy {
    /// Always declare this type, whatever the bytes are.
    Fixed(String),
    /// Sniff the signature; declare `fallback` when it is not recognised.
    Detect { fallback: String },
}

impl Default for ImageMimePolicy {
    fn default() -> Self {
        Self::Fixed("image/jpeg".into())
    }
}

impl From<&MediaConfig> for ImageMimePolicy {
    fn from(config: &MediaConfig) -> Self {
        if config.detect_image_mime {
            Self::Detect {
                fallback: config.image_mime.clone(),
            }
        } else {
            Self::Fixed(config.image_mime.clone())
        }
    }
}

impl ImageMimePolicy {
    pub fn mime_for<'a>(&'a self, bytes: &[u8]) -> &'a str {
        match self {
            Self::Fixed(mime) => mime,
            Self::Detect { fallback } => match sniff_image_mime(bytes) {
                Some(mime) => mime,
                None => fallback,
            },
        }
    }
}

/// Recognise common image formats by their magic bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Encode bytes as a `data:<mime>;base64,<payload>` URI.
pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Decode a client-supplied base64 image. A leading `data:...;base64,` prefix
/// and surrounding whitespace are tolerated.
pub fn decode_base64_image(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = raw.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map_or(trimmed, |(_, payload)| payload),
        None => trimmed,
    };
    STANDARD.decode(payload)
}

/// Split a data URI into its declared MIME type and decoded bytes.
pub fn parse_data_uri(uri: &str) -> Option<(&str, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some((mime, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    #[test]
    fn sniffs_known_signatures() {
        assert_eq!(sniff_image_mime(PNG_HEADER), Some("image/png"));
        assert_eq!(sniff_image_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image_mime(b"GIF89a...."), Some("image/gif"));
        assert_eq!(sniff_image_mime(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image_mime(b"plain text"), None);
        assert_eq!(sniff_image_mime(&[]), None);
    }

    #[test]
    fn fixed_policy_ignores_content() {
        let policy = ImageMimePolicy::default();
        assert_eq!(policy.mime_for(PNG_HEADER), "image/jpeg");
    }

    #[test]
    fn detect_policy_sniffs_then_falls_back() {
        let policy = ImageMimePolicy::Detect {
            fallback: "image/jpeg".into(),
        };
        assert_eq!(policy.mime_for(PNG_HEADER), "image/png");
        assert_eq!(policy.mime_for(b"????"), "image/jpeg");
    }

    #[test]
    fn policy_from_config() {
        let mut config = MediaConfig::default();
        assert_eq!(
            ImageMimePolicy::from(&config),
            ImageMimePolicy::Fixed("image/jpeg".into())
        );
        config.detect_image_mime = true;
        assert_eq!(
            ImageMimePolicy::from(&config),
            ImageMimePolicy::Detect {
                fallback: "image/jpeg".into()
            }
        );
    }

    #[test]
    fn data_uri_decodes_to_original_bytes() {
        let bytes: Vec<u8> = (0..=255).collect();
        let uri = to_data_uri("image/jpeg", &bytes);
        assert!(uri.starts_with("data:image/jpeg;base64,"));

        let (mime, decoded) = parse_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn decode_accepts_bare_and_prefixed_base64() {
        assert_eq!(decode_base64_image("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_base64_image(" data:image/png;base64,aGVsbG8=\n").unwrap(),
            b"hello"
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_base64_image("not base64!!").is_err());
    }
}
