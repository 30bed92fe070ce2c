//! Encryption collaborator seam
//!
//! Cipher implementations live outside this crate. Documents only need to
//! hand string and stream bytes to an [`Encryptor`] together with the id of
//! the object that owns them.

use std::fmt;
use crate::error::PdfResult;
use crate::pdf::{Dictionary, ObjectId};

/// Trait for PDF object encryption/decryption
pub trait Encryptor: Send + Sync + fmt::Debug {
    /// Encrypt bytes belonging to object `id`
    fn encrypt_bytes(&self, id: ObjectId, data: &[u8]) -> PdfResult<Vec<u8>>;

    /// Decrypt bytes belonging to object `id`
    fn decrypt_bytes(&self, id: ObjectId, data: &[u8]) -> PdfResult<Vec<u8>>;

    /// Only embedded file streams are encrypted; strings and other streams
    /// are left in clear text
    fn is_embedded_files_only(&self) -> bool {
        false
    }

    /// `/Encrypt` dictionary written to the trailer
    fn encryption_dictionary(&self) -> Dictionary;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{PdfString, Serializer, Value};
    use pretty_assertions::assert_eq;
    use test_log::test;

    /// Adds the object number to every byte
    #[derive(Debug)]
    struct ShiftEncryptor {
        embedded_files_only: bool,
    }

    impl Encryptor for ShiftEncryptor {
        fn encrypt_bytes(&self, id: ObjectId, data: &[u8]) -> PdfResult<Vec<u8>> {
            Ok(data.iter().map(|b| b.wrapping_add(id.number as u8)).collect())
        }

        fn decrypt_bytes(&self, id: ObjectId, data: &[u8]) -> PdfResult<Vec<u8>> {
            Ok(data.iter().map(|b| b.wrapping_sub(id.number as u8)).collect())
        }

        fn is_embedded_files_only(&self) -> bool {
            self.embedded_files_only
        }

        fn encryption_dictionary(&self) -> Dictionary {
            Dictionary::with_type("Shift")
        }
    }

    fn written(encryptor: &dyn Encryptor, owner: ObjectId) -> PdfResult<String> {
        let mut out = Vec::new();
        Serializer::encrypting(encryptor, owner).write_value(&Value::from(PdfString::new("AB")), &mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    #[test]
    fn test_strings_use_owner_key() -> PdfResult<()> {
        let encryptor = ShiftEncryptor { embedded_files_only: false };
        assert_eq!(written(&encryptor, ObjectId::new(1, 0))?, "<4243>");
        assert_eq!(written(&encryptor, ObjectId::new(2, 0))?, "<4344>");
        let encrypted = encryptor.encrypt_bytes(ObjectId::new(7, 0), b"text")?;
        assert_eq!(encryptor.decrypt_bytes(ObjectId::new(7, 0), &encrypted)?, b"text");
        Ok(())
    }

    #[test]
    fn test_embedded_files_only_leaves_strings_clear() -> PdfResult<()> {
        let encryptor = ShiftEncryptor { embedded_files_only: true };
        assert_eq!(written(&encryptor, ObjectId::new(1, 0))?, "(AB)");
        Ok(())
    }
}
