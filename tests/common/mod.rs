#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use pdf_kernel::crypto::Encryptor;
use pdf_kernel::pdf::names;
use pdf_kernel::{Dictionary, Document, ObjectId, PdfResult, WriterProperties};

/// Cloneable in-memory output
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write a document built by `build` and return the file bytes
pub fn write_document(
    props: WriterProperties,
    build: impl FnOnce(&mut Document) -> PdfResult<()>,
) -> PdfResult<Vec<u8>> {
    let buffer = SharedBuffer::default();
    let mut doc = Document::create(buffer.clone(), props)?;
    build(&mut doc)?;
    doc.close()?;
    Ok(buffer.bytes())
}

/// Letter-sized pages
pub fn add_pages(doc: &mut Document, count: usize) -> PdfResult<Vec<ObjectId>> {
    (0..count).map(|_| doc.add_new_page([0.0, 0.0, 612.0, 792.0])).collect()
}

/// XOR with the file key salted by the object id; enough to tell
/// encrypted bytes apart
#[derive(Debug)]
pub struct XorEncryptor {
    pub file_key: Vec<u8>,
}

impl XorEncryptor {
    fn apply(&self, id: ObjectId, data: &[u8]) -> Vec<u8> {
        let mut key = self.file_key.clone();
        key.extend_from_slice(&id.number.to_le_bytes()[..3]);
        key.extend_from_slice(&id.generation.to_le_bytes());
        data.iter().zip(key.iter().cycle()).map(|(b, k)| b ^ k).collect()
    }
}

impl Encryptor for XorEncryptor {
    fn encrypt_bytes(&self, id: ObjectId, data: &[u8]) -> PdfResult<Vec<u8>> {
        Ok(self.apply(id, data))
    }

    fn decrypt_bytes(&self, id: ObjectId, data: &[u8]) -> PdfResult<Vec<u8>> {
        Ok(self.apply(id, data))
    }

    fn encryption_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Filter", "Xor");
        dict.set("V", 1);
        dict.set(names::LENGTH, 40);
        dict
    }
}
