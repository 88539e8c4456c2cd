pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Invalid file type '{0}'. Please upload an image file (JPEG, PNG, etc.)")]
    UnsupportedMediaType(String),
    #[error("File too large ({size} bytes). Please upload a file smaller than 50MB")]
    FileTooLarge { size: usize },
    #[error("No file was provided")]
    Empty,
}

/// An uploaded scan as received at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn validate(&self) -> Result<(), UploadError> {
        validate_upload(&self.media_type, self.bytes.len())
    }
}

/// Boundary checks, run before any decoding is attempted.
pub fn validate_upload(media_type: &str, size: usize) -> Result<(), UploadError> {
    if !media_type.starts_with("image/") {
        return Err(UploadError::UnsupportedMediaType(media_type.to_string()));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(UploadError::FileTooLarge { size });
    }
    if size == 0 {
        return Err(UploadError::Empty);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_fifty_mebibytes_is_accepted() {
        assert_eq!(validate_upload("image/png", MAX_UPLOAD_BYTES), Ok(()));
    }

    #[test]
    fn one_byte_over_the_limit_is_rejected() {
        assert_eq!(
            validate_upload("image/png", MAX_UPLOAD_BYTES + 1),
            Err(UploadError::FileTooLarge {
                size: MAX_UPLOAD_BYTES + 1
            })
        );
    }

    #[test]
    fn non_image_media_types_are_rejected() {
        assert!(matches!(
            validate_upload("application/pdf", 10),
            Err(UploadError::UnsupportedMediaType(_))
        ));
        assert!(matches!(
            validate_upload("", 10),
            Err(UploadError::UnsupportedMediaType(_))
        ));
        assert_eq!(validate_upload("image/x-dicom", 10), Ok(()));
    }

    #[test]
    fn media_type_is_checked_before_size() {
        assert!(matches!(
            validate_upload("text/plain", MAX_UPLOAD_BYTES + 1),
            Err(UploadError::UnsupportedMediaType(_))
        ));
    }
}
