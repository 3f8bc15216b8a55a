//! Request validation rules: ranges on sampling parameters, the
//! thinking/temperature cross-field constraint, and image format/size
//! checks before anything is sent to Bedrock.

use vmv_core::{ContentBlock, Error};

use crate::request::{LmmRequest, ThinkingConfig};

const ALLOWED_IMAGE_MEDIA_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/gif"];
const MAX_BASE64_IMAGE_BYTES: usize = 5 * 1024 * 1024 * 4 / 3 + 4; // ~5MiB decoded, base64-inflated

/// Validate an `LmmRequest` before it is sent, returning the first violation
/// found.
pub fn validate_request(request: &LmmRequest) -> Result<(), Error> {
    if !(0.0..=1.0).contains(&request.temperature) {
        return Err(Error::validation(format!(
            "temperature must be within [0.0, 1.0], got {}",
            request.temperature
        )));
    }
    if !(0.0..=1.0).contains(&request.top_p) {
        return Err(Error::validation(format!(
            "top_p must be within [0.0, 1.0], got {}",
            request.top_p
        )));
    }
    if let ThinkingConfig::Enabled { .. } = request.thinking {
        if (request.temperature - 1.0).abs() > f64::EPSILON {
            return Err(Error::validation(
                "extended thinking requires temperature = 1.0",
            ));
        }
    }
    if request.messages.is_empty() {
        return Err(Error::validation("request must contain at least one message"));
    }

    for message in &request.messages {
        for block in &message.content {
            if let ContentBlock::Image { source: _, media_type } = block {
                if !ALLOWED_IMAGE_MEDIA_TYPES.contains(&media_type.as_str()) {
                    return Err(Error::validation(format!(
                        "unsupported image media type: {media_type}"
                    )));
                }
            }
        }
    }

    for message in &request.messages {
        for block in &message.content {
            if let ContentBlock::Image {
                source: vmv_core::ImageSource::Base64 { data },
                ..
            } = block
            {
                if data.len() > MAX_BASE64_IMAGE_BYTES {
                    return Err(Error::validation(format!(
                        "image payload too large: {} base64 bytes exceeds limit",
                        data.len()
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmv_core::Message;

    fn base_request() -> LmmRequest {
        LmmRequest {
            model: "anthropic.claude-3".to_string(),
            messages: vec![Message::user(vec![ContentBlock::text("hi")])],
            system: None,
            max_tokens: 1000,
            temperature: 0.7,
            top_p: 0.9,
            thinking: ThinkingConfig::Disabled,
        }
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let mut req = base_request();
        req.temperature = 1.5;
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn rejects_thinking_enabled_without_temperature_one() {
        let mut req = base_request();
        req.thinking = ThinkingConfig::Enabled { budget_tokens: 1000 };
        req.temperature = 0.7;
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn accepts_thinking_enabled_with_temperature_one() {
        let mut req = base_request();
        req.thinking = ThinkingConfig::Enabled { budget_tokens: 1000 };
        req.temperature = 1.0;
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn rejects_unsupported_image_media_type() {
        let mut req = base_request();
        req.messages = vec![Message::user(vec![ContentBlock::image_base64("abc", "image/bmp")])];
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn rejects_empty_message_list() {
        let mut req = base_request();
        req.messages = vec![];
        assert!(validate_request(&req).is_err());
    }
}
