mod common;

use common::{add_pages, write_document};
use pdf_kernel::pdf::{names, Resolve};
use pdf_kernel::{Dictionary, Document, PdfResult, PdfString, Value, WriterProperties};
use pretty_assertions::assert_eq;
use rstest::rstest;

/// Walk a tree on disk, checking fan-out and `/Limits`; returns the keys
/// in leaf order
fn check_node(doc: &Document, node: &Dictionary, is_root: bool, keys: &mut Vec<PdfString>) {
    if let Some(kids) = node.direct_array(names::KIDS, doc) {
        assert!(kids.len() <= 40, "{} kids", kids.len());
        assert_eq!(node.contains_key(names::LIMITS), !is_root);
        let first = keys.len();
        for kid in kids.iter() {
            let kid = doc.direct(kid).as_dict().expect("kid is a dictionary");
            check_node(doc, kid, false, keys);
        }
        if let Some(limits) = node.get_array(names::LIMITS) {
            assert_eq!(limits[0].as_string(), keys.get(first));
            assert_eq!(limits[1].as_string(), keys.last());
        }
        return;
    }
    let items = node.direct_array(names::NAMES, doc).expect("leaf has /Names");
    assert!(items.len() <= 80);
    let leaf_keys: Vec<PdfString> = items.iter().step_by(2).filter_map(|k| k.as_string().cloned()).collect();
    if let Some(limits) = node.get_array(names::LIMITS) {
        assert_eq!(limits[0].as_string(), leaf_keys.first());
        assert_eq!(limits[1].as_string(), leaf_keys.last());
    }
    keys.extend(leaf_keys);
}

#[rstest]
#[case(1)]
#[case(40)]
#[case(41)]
#[case(1601)]
fn test_javascript_tree_on_disk(#[case] count: usize) -> PdfResult<()> {
    let data = write_document(WriterProperties::default().with_full_compression(true), |doc| {
        let tree = doc.name_tree(names::JAVA_SCRIPT)?;
        for i in 0..count {
            tree.add_entry(format!("script{:05}", i).as_str(), PdfString::from("void(0)"));
        }
        Ok(())
    })?;

    let doc = Document::from_bytes(data)?;
    let root = doc
        .catalog()?
        .direct_dict(names::NAMES, &doc)
        .and_then(|names_dict| names_dict.direct_dict(names::JAVA_SCRIPT, &doc))
        .expect("tree root");
    let mut keys = Vec::new();
    check_node(&doc, root, true, &mut keys);
    assert_eq!(keys.len(), count);
    assert!(keys.windows(2).all(|pair| pair[0].compare_text(&pair[1]).is_lt()));
    assert_eq!(doc.read_name_tree(names::JAVA_SCRIPT)?.len(), count);
    Ok(())
}

#[test_log::test]
fn test_legacy_dests_are_merged_and_replaced() -> PdfResult<()> {
    let mut page = None;
    let data = write_document(WriterProperties::default(), |doc| {
        let id = add_pages(doc, 1)?[0];
        let mut legacy = Dictionary::new();
        let mut wrapped = Dictionary::new();
        wrapped.set(names::D, vec![Value::Reference(id), Value::from(names::FIT)]);
        legacy.set("intro", wrapped);
        doc.catalog_mut()?.set(names::DESTS, legacy);
        page = Some(id);
        Ok(())
    })?;
    let page = page.unwrap();

    let output = common::SharedBuffer::default();
    let mut doc = Document::stamp(pdf_kernel::PdfReader::new(data)?, output.clone(), WriterProperties::default())?;
    let dests = doc.name_tree(names::DESTS)?;
    assert_eq!(dests.len(), 1);
    let mut conflicts = Vec::new();
    dests.add_entry_with("intro", vec![Value::Reference(page), Value::from("FitH")], |key| {
        conflicts.push(key.to_text())
    });
    dests.add_entry("outro", vec![Value::Reference(page), Value::from(names::FIT)]);
    assert_eq!(conflicts, vec!["intro".to_string()]);
    doc.close()?;

    let doc = Document::from_bytes(output.bytes())?;
    assert!(!doc.catalog()?.contains_key(names::DESTS));
    let dests = doc.read_name_tree(names::DESTS)?;
    let keys: Vec<String> = dests.names().keys().map(PdfString::to_text).collect();
    assert_eq!(keys, vec!["intro".to_string(), "outro".to_string()]);
    let intro = dests.get(&PdfString::from("intro")).and_then(Value::as_array).unwrap();
    assert_eq!(intro[1], Value::from("FitH"));
    Ok(())
}

#[test_log::test]
fn test_same_reference_is_not_a_conflict() -> PdfResult<()> {
    let mut doc = Document::create(std::io::sink(), WriterProperties::default())?;
    let file = doc.make_indirect(Dictionary::with_type("Filespec"))?;
    let tree = doc.name_tree(names::EMBEDDED_FILES)?;
    let mut conflicts = 0;
    tree.add_entry_with("a.txt", file, |_| conflicts += 1);
    tree.add_entry_with("a.txt", file, |_| conflicts += 1);
    assert_eq!(conflicts, 0);
    assert_eq!(tree.len(), 1);
    Ok(())
}
