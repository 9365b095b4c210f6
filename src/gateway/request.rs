//! Decoding of `POST /chat` bodies into a single validated [`ChatRequest`].
//!
//! Two encodings are accepted: `application/json` with an optional base64
//! image, and `multipart/form-data` with an optional `image` file part. Both
//! collapse into [`RawChatRequest`] first, then [`RawChatRequest::validate`]
//! produces the typed request the handler works with.

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{header, HeaderMap};
use serde::Deserialize;

use super::error::ChatError;
use crate::media::decode_base64_image;

/// A validated chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
    pub image: Option<Vec<u8>>,
}

/// Image as it arrived on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RawImage {
    #[default]
    None,
    /// Uploaded file bytes (multipart).
    Bytes(Vec<u8>),
    /// Base64 text, optionally a data URI (JSON).
    Base64(String),
}

/// Fields extracted from either encoding, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawChatRequest {
    pub message: Option<String>,
    pub session_id: Option<String>,
    pub image: RawImage,
}

/// Body encodings accepted by `/chat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Multipart,
}

/// Classify the request by its `Content-Type` essence. `None` means unsupported.
pub fn classify_content_type(headers: &HeaderMap) -> Option<BodyKind> {
    let value = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next()?.trim().to_ascii_lowercase();

    if essence == "multipart/form-data" {
        Some(BodyKind::Multipart)
    } else if essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
    {
        Some(BodyKind::Json)
    } else {
        None
    }
}

#[derive(Debug, Deserialize)]
struct JsonChatBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "sessionId")]
    session_id: Option<String>,
    #[serde(default, rename = "imageBase64")]
    image_base64: Option<String>,
}

/// Parse a JSON `/chat` body.
pub fn parse_json_body(bytes: &[u8]) -> Result<RawChatRequest, ChatError> {
    let body: JsonChatBody =
        serde_json::from_slice(bytes).map_err(|e| ChatError::InvalidJson(e.to_string()))?;

    let image = match body.image_base64 {
        Some(raw) if !raw.trim().is_empty() => RawImage::Base64(raw),
        _ => RawImage::None,
    };

    Ok(RawChatRequest {
        message: body.message,
        session_id: body.session_id,
        image,
    })
}

/// Parse and validate a JSON `/chat` body in one step.
pub fn decode_json_body(bytes: &[u8]) -> Result<ChatRequest, ChatError> {
    parse_json_body(bytes)?.validate()
}

async fn parse_multipart(mut multipart: Multipart) -> Result<RawChatRequest, ChatError> {
    let mut raw = RawChatRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(ChatError::from_rejection)? {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("message") if raw.message.is_none() => {
                raw.message = Some(field.text().await.map_err(ChatError::from_rejection)?);
            }
            Some("sessionId") if raw.session_id.is_none() => {
                raw.session_id = Some(field.text().await.map_err(ChatError::from_rejection)?);
            }
            Some("image") if raw.image == RawImage::None => {
                // file parts without a filename are treated as absent
                let has_filename = field.file_name().is_some_and(|name| !name.is_empty());
                let bytes = field.bytes().await.map_err(ChatError::from_rejection)?;
                if has_filename && !bytes.is_empty() {
                    raw.image = RawImage::Bytes(bytes.to_vec());
                }
            }
            _ => {}
        }
    }

    Ok(raw)
}

/// Whitespace-only counts as missing; the value itself is kept verbatim.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RawChatRequest {
    /// Require `message` and `sessionId`, then decode any base64 image.
    ///
    /// Session ids are opaque: `" s1 "` and `"s1"` are different sessions.
    pub fn validate(self) -> Result<ChatRequest, ChatError> {
        let (Some(message), Some(session_id)) =
            (non_blank(self.message), non_blank(self.session_id))
        else {
            return Err(ChatError::MissingFields);
        };

        let image = match self.image {
            RawImage::None => None,
            RawImage::Bytes(bytes) => Some(bytes),
            RawImage::Base64(raw) => Some(
                decode_base64_image(&raw).map_err(|e| ChatError::InvalidImage(e.to_string()))?,
            ),
        };

        Ok(ChatRequest {
            message,
            session_id,
            image,
        })
    }
}

impl<S> FromRequest<S> for ChatRequest
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let raw = match classify_content_type(req.headers()) {
            Some(BodyKind::Json) => {
                let bytes = Bytes::from_request(req, state)
                    .await
                    .map_err(ChatError::from_rejection)?;
                parse_json_body(&bytes)?
            }
            Some(BodyKind::Multipart) => {
                let multipart = Multipart::from_request(req, state)
                    .await
                    .map_err(ChatError::from_rejection)?;
                parse_multipart(multipart).await?
            }
            None => return Err(ChatError::UnsupportedMediaType),
        };

        raw.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type).unwrap(),
        );
        headers
    }

    #[test]
    fn classifies_supported_content_types() {
        assert_eq!(
            classify_content_type(&headers_with("application/json")),
            Some(BodyKind::Json)
        );
        assert_eq!(
            classify_content_type(&headers_with("Application/JSON; charset=utf-8")),
            Some(BodyKind::Json)
        );
        assert_eq!(
            classify_content_type(&headers_with("application/vnd.api+json")),
            Some(BodyKind::Json)
        );
        assert_eq!(
            classify_content_type(&headers_with("multipart/form-data; boundary=xyz")),
            Some(BodyKind::Multipart)
        );
    }

    #[test]
    fn rejects_other_content_types() {
        assert_eq!(classify_content_type(&headers_with("text/plain")), None);
        assert_eq!(
            classify_content_type(&headers_with("application/x-www-form-urlencoded")),
            None
        );
        assert_eq!(classify_content_type(&HeaderMap::new()), None);
    }

    #[test]
    fn json_body_decodes_all_fields() {
        let req = decode_json_body(
            br#"{"message":"hello","sessionId":"s1","imageBase64":"aGVsbG8="}"#,
        )
        .unwrap();
        assert_eq!(req.message, "hello");
        assert_eq!(req.session_id, "s1");
        assert_eq!(req.image.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn json_null_or_empty_image_is_absent() {
        let req =
            decode_json_body(br#"{"message":"hi","sessionId":"s1","imageBase64":null}"#).unwrap();
        assert!(req.image.is_none());

        let req =
            decode_json_body(br#"{"message":"hi","sessionId":"s1","imageBase64":""}"#).unwrap();
        assert!(req.image.is_none());
    }

    #[test]
    fn missing_session_id_is_rejected() {
        let err = decode_json_body(br#"{"message":"hello"}"#).unwrap_err();
        assert!(matches!(err, ChatError::MissingFields));
    }

    #[test]
    fn blank_message_is_rejected() {
        let err = decode_json_body(br#"{"message":"   ","sessionId":"s1"}"#).unwrap_err();
        assert!(matches!(err, ChatError::MissingFields));
    }

    #[test]
    fn missing_fields_checked_before_image_decoding() {
        let err = decode_json_body(br#"{"imageBase64":"%%%"}"#).unwrap_err();
        assert!(matches!(err, ChatError::MissingFields));
    }

    #[test]
    fn invalid_base64_image_is_rejected() {
        let err = decode_json_body(br#"{"message":"hi","sessionId":"s1","imageBase64":"%%%"}"#)
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidImage(_)));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = decode_json_body(b"{not json").unwrap_err();
        assert!(matches!(err, ChatError::InvalidJson(_)));

        let err = decode_json_body(br#"{"message":42,"sessionId":"s1"}"#).unwrap_err();
        assert!(matches!(err, ChatError::InvalidJson(_)));
    }

    #[test]
    fn message_and_session_id_are_kept_verbatim() {
        let req = decode_json_body(br#"{"message":"  hello \n","sessionId":" s1 "}"#).unwrap();
        assert_eq!(req.message, "  hello \n");
        assert_eq!(req.session_id, " s1 ");
    }
}
