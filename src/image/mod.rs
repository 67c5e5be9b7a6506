//! Upload validation for design images
//!
//! Checks the size ceiling and sniffs the container format from magic bytes.
//! The service never decodes pixel data; the images are forwarded to the
//! model as-is.

/// Sniff the image format from its leading bytes
pub fn detect_format(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.starts_with(b"\xff\xd8\xff") {
        Some("jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

/// MIME type for a detected format, used in the upstream payload
pub fn mime_type(format: &str) -> &'static str {
    match format {
        "png" => "image/png",
        "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Validate image size and format
///
/// Returns the detected format on success and a user-facing reason string
/// on failure. "jpg" and "jpeg" in the allow list are treated as the same
/// format.
pub fn validate_image(
    bytes: &[u8],
    max_size: usize,
    allowed_formats: &[String],
) -> Result<&'static str, String> {
    if bytes.len() > max_size {
        return Err(format!(
            "Image size exceeds {:.1}MB limit",
            max_size as f64 / 1024.0 / 1024.0
        ));
    }

    let format = detect_format(bytes).ok_or_else(|| "Invalid image: unrecognized format".to_string())?;

    let allowed = allowed_formats.iter().any(|ext| {
        let ext = ext.to_ascii_lowercase();
        ext == format || (format == "jpeg" && ext == "jpg")
    });

    if !allowed {
        return Err(format!("Image format {} not allowed", format));
    }

    Ok(format)
}
