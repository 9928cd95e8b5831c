//! Upload file validation
//!
//! Syntactic/semantic gatekeeper for inbound uploads. Pure checks, no
//! side effects; callers map a rejection to a client-facing 4xx with the
//! reason as the message. A rejected upload never creates a job.

use thiserror::Error;

/// Extensions the pipeline accepts
pub const ALLOWED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

/// Why an upload was rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Zero-byte payload
    #[error("File is empty")]
    Empty,

    /// Payload exceeds the configured maximum
    #[error("File too large ({actual} bytes). Maximum size is {limit} bytes")]
    TooLarge { actual: u64, limit: u64 },

    /// Extension outside the allow-list
    #[error("Invalid file extension: '{0}'. Allowed extensions: .csv, .xlsx, .xls")]
    UnsupportedExtension(String),

    /// Magic-byte sniffing contradicts the declared extension
    /// (defends against a renamed-extension attack)
    #[error("File content does not match its .{declared} extension (detected: {detected})")]
    ContentMismatch { declared: String, detected: String },
}

/// Upload validator with a configured size policy
#[derive(Debug, Clone)]
pub struct FileValidator {
    max_bytes: u64,
}

impl FileValidator {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Validate an upload against size, extension, and content checks.
    ///
    /// `declared_size` is the client-declared length; it is checked in
    /// addition to the actual byte length so a mismatched size header
    /// cannot smuggle an oversized body past the limit.
    pub fn validate(
        &self,
        filename: &str,
        declared_size: u64,
        bytes: &[u8],
    ) -> Result<(), ValidationError> {
        if declared_size > self.max_bytes {
            return Err(ValidationError::TooLarge {
                actual: declared_size,
                limit: self.max_bytes,
            });
        }
        if bytes.len() as u64 > self.max_bytes {
            return Err(ValidationError::TooLarge {
                actual: bytes.len() as u64,
                limit: self.max_bytes,
            });
        }
        if bytes.is_empty() {
            return Err(ValidationError::Empty);
        }

        let extension = file_extension(filename)
            .ok_or_else(|| ValidationError::UnsupportedExtension(filename.to_string()))?;
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ValidationError::UnsupportedExtension(format!(".{}", extension)));
        }

        self.check_content(&extension, bytes)
    }

    /// Magic-byte inspection independent of the declared extension.
    ///
    /// CSV carries no signature, so for `.csv` any recognized binary
    /// signature is a mismatch. Spreadsheet containers must present
    /// their container signature (zip for xlsx, OLE/CFB for xls).
    fn check_content(&self, extension: &str, bytes: &[u8]) -> Result<(), ValidationError> {
        let detected = infer::get(bytes);

        match extension {
            "csv" => match detected {
                None => Ok(()),
                Some(kind) => Err(ValidationError::ContentMismatch {
                    declared: extension.to_string(),
                    detected: kind.mime_type().to_string(),
                }),
            },
            "xlsx" => match detected {
                // xlsx is a zip container; infer may resolve either the
                // inner office type or the bare zip signature
                Some(kind) if kind.extension() == "xlsx" || kind.extension() == "zip" => Ok(()),
                Some(kind) => Err(ValidationError::ContentMismatch {
                    declared: extension.to_string(),
                    detected: kind.mime_type().to_string(),
                }),
                None => Err(ValidationError::ContentMismatch {
                    declared: extension.to_string(),
                    detected: "no spreadsheet signature".to_string(),
                }),
            },
            "xls" => match detected {
                Some(kind) if kind.extension() == "xls" => Ok(()),
                Some(kind) if kind.mime_type() == "application/x-ole-storage" => Ok(()),
                Some(kind) => Err(ValidationError::ContentMismatch {
                    declared: extension.to_string(),
                    detected: kind.mime_type().to_string(),
                }),
                None => Err(ValidationError::ContentMismatch {
                    declared: extension.to_string(),
                    detected: "no spreadsheet signature".to_string(),
                }),
            },
            _ => Err(ValidationError::UnsupportedExtension(format!(".{}", extension))),
        }
    }
}

/// Lowercased extension of a filename, without the dot
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
    const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00];

    fn validator(max: u64) -> FileValidator {
        FileValidator::new(max)
    }

    #[test]
    fn accepts_plain_csv() {
        let bytes = b"name,note\nA,\"great service\"\n";
        assert_eq!(
            validator(1024).validate("data.csv", bytes.len() as u64, bytes),
            Ok(())
        );
    }

    #[test]
    fn file_at_exactly_max_size_is_accepted() {
        let bytes = vec![b'a'; 64];
        assert_eq!(validator(64).validate("data.csv", 64, &bytes), Ok(()));
    }

    #[test]
    fn one_byte_over_max_is_rejected_with_size_reason() {
        let bytes = vec![b'a'; 65];
        let err = validator(64).validate("data.csv", 65, &bytes).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLarge {
                actual: 65,
                limit: 64
            }
        );
    }

    #[test]
    fn declared_size_is_checked_independently_of_body() {
        // Client claims more than the limit even though the body is small
        let err = validator(64).validate("data.csv", 1000, b"tiny").unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { actual: 1000, .. }));
    }

    #[test]
    fn empty_file_is_rejected_with_empty_reason() {
        assert_eq!(
            validator(64).validate("data.csv", 0, b""),
            Err(ValidationError::Empty)
        );
    }

    #[test]
    fn disallowed_extension_is_rejected() {
        let err = validator(1024).validate("data.txt", 4, b"abcd").unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedExtension(_)));
    }

    #[test]
    fn missing_extension_is_rejected() {
        let err = validator(1024).validate("data", 4, b"abcd").unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedExtension(_)));
    }

    #[test]
    fn jpeg_renamed_to_csv_is_rejected_as_mismatch() {
        let err = validator(1024)
            .validate("data.csv", JPEG_MAGIC.len() as u64, JPEG_MAGIC)
            .unwrap_err();
        assert!(matches!(err, ValidationError::ContentMismatch { .. }));
    }

    #[test]
    fn zip_container_is_accepted_as_xlsx() {
        assert_eq!(
            validator(1024).validate("report.xlsx", ZIP_MAGIC.len() as u64, ZIP_MAGIC),
            Ok(())
        );
    }

    #[test]
    fn plain_text_renamed_to_xlsx_is_rejected() {
        let err = validator(1024)
            .validate("report.xlsx", 9, b"name,note")
            .unwrap_err();
        assert!(matches!(err, ValidationError::ContentMismatch { .. }));
    }

    #[test]
    fn extension_comparison_is_case_insensitive() {
        let bytes = b"a,b\n1,2\n";
        assert_eq!(
            validator(1024).validate("DATA.CSV", bytes.len() as u64, bytes),
            Ok(())
        );
    }
}
