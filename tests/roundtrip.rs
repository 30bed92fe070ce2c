mod common;

use std::sync::Arc;
use common::{add_pages, write_document, SharedBuffer, XorEncryptor};
use pdf_kernel::pdf::names;
use pdf_kernel::{
    CompressionKind, Dictionary, Document, ObjectId, PdfError, PdfReader, PdfResult, PdfString, ReaderProperties,
    Stream, Value, WriterProperties,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

const CONTENT: &[u8] = b"BT /F1 12 Tf 72 712 Td (Hello) Tj ET\n";

fn content_page(doc: &mut Document) -> PdfResult<(ObjectId, ObjectId)> {
    let page = add_pages(doc, 1)?[0];
    let mut stream = Stream::new();
    stream.set_data(CONTENT, false)?;
    stream.set_data(CONTENT, true)?;
    let contents = doc.make_indirect(stream)?;
    doc.get_mut(page)?.expect_dict_mut()?.set(names::CONTENTS, contents);
    Ok((page, contents))
}

fn decoded(doc: &Document, id: ObjectId) -> PdfResult<Vec<u8>> {
    let stream = doc.get(id)?.and_then(Value::as_stream).ok_or(PdfError::ObjectNotFound(id))?;
    stream
        .bytes_with(true, doc.reader())?
        .ok_or(PdfError::UnconsumedByteSource)
}

#[rstest]
#[case::classic(WriterProperties::default())]
#[case::object_streams(WriterProperties::default().with_full_compression(true))]
#[case::ascii85(WriterProperties::default().with_compression(CompressionKind::Ascii85))]
#[case::hex(WriterProperties::default().with_compression(CompressionKind::AsciiHex))]
#[case::run_length(WriterProperties::default().with_compression(CompressionKind::RunLength))]
#[case::uncompressed(WriterProperties::default().with_compression(CompressionKind::None))]
fn test_stream_content_survives(#[case] props: WriterProperties) -> PdfResult<()> {
    let mut contents = None;
    let data = write_document(props, |doc| {
        contents = Some(content_page(doc)?.1);
        Ok(())
    })?;

    let doc = Document::from_bytes(data)?;
    let contents = contents.unwrap();
    assert_eq!(decoded(&doc, contents)?, [CONTENT, CONTENT].concat());
    Ok(())
}

#[test_log::test]
fn test_encrypted_strings_and_streams() -> PdfResult<()> {
    let encryptor = Arc::new(XorEncryptor { file_key: b"secret".to_vec() });
    let mut ids = None;
    let data = write_document(WriterProperties::default().with_encryptor(encryptor.clone()), |doc| {
        let (_, contents) = content_page(doc)?;
        let mut note = Dictionary::new();
        note.set("Text", PdfString::from("confidential remark"));
        ids = Some((doc.make_indirect(note)?, contents));
        Ok(())
    })?;
    assert!(!data.windows(19).any(|w| w == b"confidential remark"));

    let (note, contents) = ids.unwrap();
    let reader = PdfReader::with_properties(data.clone(), ReaderProperties::default().with_encryptor(encryptor))?;
    assert!(reader.is_encrypted());
    let doc = Document::open(reader)?;
    let text = doc.get(note)?.and_then(Value::as_dict).and_then(|d| d.get_string("Text")).cloned();
    assert_eq!(text, Some(PdfString::from("confidential remark")));
    assert_eq!(decoded(&doc, contents)?, [CONTENT, CONTENT].concat());

    let unkeyed = Document::from_bytes(data)?;
    let text = unkeyed.get(note)?.and_then(Value::as_dict).and_then(|d| d.get_string("Text")).cloned();
    assert!(text.map_or(false, |t| t != PdfString::from("confidential remark")));
    Ok(())
}

#[test_log::test]
fn test_decoding_respects_memory_ceiling() -> PdfResult<()> {
    let mut contents = None;
    let data = write_document(WriterProperties::default(), |doc| {
        let mut stream = Stream::new();
        stream.set_data(&vec![b'x'; 64 * 1024], false)?;
        contents = Some(doc.make_indirect(stream)?);
        Ok(())
    })?;

    let reader = PdfReader::with_properties(data, ReaderProperties::default().with_max_stream_size(1024))?;
    let doc = Document::open(reader)?;
    let err = decoded(&doc, contents.unwrap()).unwrap_err();
    assert!(err.is_resource_exhaustion(), "unexpected error {:?}", err);
    Ok(())
}

#[test_log::test]
fn test_reference_chain_resolves_through_file() -> PdfResult<()> {
    let mut head = None;
    let data = write_document(WriterProperties::default(), |doc| {
        let mut next = doc.make_indirect(PdfString::from("end of chain"))?;
        for _ in 0..20 {
            next = doc.make_indirect(next)?;
        }
        head = Some(next);
        Ok(())
    })?;

    let doc = Document::from_bytes(data)?;
    let head = head.unwrap();
    assert_eq!(doc.resolve(head, true)?, Value::from(PdfString::from("end of chain")));
    assert!(doc.resolve(head, false)?.is_reference());
    Ok(())
}

#[test_log::test]
fn test_stamp_rewrites_compressed_file() -> PdfResult<()> {
    let mut contents = None;
    let data = write_document(WriterProperties::default().with_full_compression(true), |doc| {
        contents = Some(content_page(doc)?.1);
        doc.name_tree(names::EMBEDDED_FILES)?.add_entry("readme.txt", PdfString::from("notes"));
        Ok(())
    })?;

    let output = SharedBuffer::default();
    let mut doc = Document::stamp(PdfReader::new(data)?, output.clone(), WriterProperties::default())?;
    add_pages(&mut doc, 2)?;
    doc.close()?;

    let doc = Document::from_bytes(output.bytes())?;
    assert_eq!(doc.page_count(), 3);
    assert_eq!(decoded(&doc, contents.unwrap())?, [CONTENT, CONTENT].concat());
    assert_eq!(doc.read_name_tree(names::EMBEDDED_FILES)?.len(), 1);
    Ok(())
}
