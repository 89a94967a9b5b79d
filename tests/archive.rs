mod common;

use std::fs;

use common::*;
use cryunpack::p4k::ExtractOutcome;
use cryunpack::{CryXmlFormat, Error, ExtractOptions, P4kFile, P4kOpenOptions};

#[test]
fn test_sample_archive_end_to_end() {
    let p4k = P4kFile::from_bytes(sample_archive()).unwrap();
    assert_eq!(p4k.len(), 4);
    assert_eq!(p4k.comment(), b"synthetic");

    let txt: Vec<&str> = p4k
        .search(&["*.txt"], true)
        .unwrap()
        .into_iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(txt, vec!["data/x.txt", "data/y_pak/inner.txt"]);

    assert_eq!(p4k.read("data/x.txt").unwrap(), b"hello");
    assert_eq!(p4k.read("data/y_pak/inner.txt").unwrap(), b"world");

    let dds = p4k.get_entry("data/z.dds").unwrap();
    assert!(dds.is_encrypted);
    assert_eq!(p4k.read_entry(dds).unwrap(), vec![0u8; 16]);

    let inner = p4k.get_entry("data/y_pak/inner.txt").unwrap();
    assert!(inner.sub_archive().is_some());
}

#[test]
fn test_sub_archive_mounting_can_be_disabled() {
    let options = P4kOpenOptions {
        mount_sub_archives: false,
        ..Default::default()
    };
    let p4k = P4kFile::from_bytes_with_options(sample_archive(), &options).unwrap();
    assert_eq!(p4k.len(), 3);
    assert!(p4k.get_entry("data/y_pak/inner.txt").unwrap_err().is_not_found());
}

#[test]
fn test_case_insensitive_lookup_and_search() {
    let data = build_p4k(&[
        TestEntry::new("Data/Objects/Foo.MTL", b"<Material/>", METHOD_DEFLATE),
        TestEntry::new("Data\\Objects\\bar.cgf", b"CrCh", METHOD_STORE),
    ]);
    let p4k = P4kFile::from_bytes(data).unwrap();

    let upper = p4k.get_entry("DATA/OBJECTS/FOO.MTL").unwrap();
    let lower = p4k.get_entry("data/objects/foo.mtl").unwrap();
    assert!(std::ptr::eq(upper, lower));
    assert_eq!(p4k.read_entry(upper).unwrap(), b"<Material/>");

    // backslashes are normalised
    assert_eq!(p4k.entries()[1].name, "Data/Objects/bar.cgf");

    assert_eq!(p4k.search(&["*.mtl"], true).unwrap().len(), 1);
    assert!(p4k.search(&["*.mtl"], false).unwrap().is_empty());
    assert!(p4k.search(&["*.dds"], true).unwrap().is_empty());
    assert!(matches!(p4k.search(&["[oops"], true), Err(Error::Pattern(_))));
}

#[test]
fn test_zip64_fields_and_duplicate_paths() {
    let data = build_p4k(&[
        TestEntry::new("data/big.bin", &[7u8; 40], METHOD_ZSTD)
            .encrypted()
            .zip64(),
        TestEntry::new("DATA/BIG.BIN", b"second", METHOD_STORE),
    ]);
    let p4k = P4kFile::from_bytes(data).unwrap();
    assert_eq!(p4k.len(), 1);

    let entry = p4k.get_entry("data/big.bin").unwrap();
    assert_eq!(entry.uncompressed_size, 40);
    assert_eq!(p4k.read_entry(entry).unwrap(), vec![7u8; 40]);
}

#[test]
fn test_extract_reproduces_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let p4k = P4kFile::from_bytes(sample_archive()).unwrap();

    let summary = p4k
        .extract_filter(&["*"], dir.path(), &ExtractOptions::default())
        .unwrap();
    assert_eq!(summary.extracted, 4);
    assert_eq!(summary.failed, 0);

    assert_eq!(fs::read(dir.path().join("data/x.txt")).unwrap(), b"hello");
    assert_eq!(
        fs::read(dir.path().join("data/y_pak/inner.txt")).unwrap(),
        b"world"
    );
    assert_eq!(fs::read(dir.path().join("data/z.dds")).unwrap(), vec![0u8; 16]);

    let skip_existing = ExtractOptions {
        overwrite: false,
        ..Default::default()
    };
    let again = p4k
        .extract_filter(&["*.txt"], dir.path(), &skip_existing)
        .unwrap();
    assert_eq!(again.extracted, 0);
    assert_eq!(again.skipped, 2);
}

#[test]
fn test_existing_target_is_skipped_before_decoding() {
    let dir = tempfile::tempdir().unwrap();
    // method 99 cannot be decoded, so only an untouched entry extracts cleanly
    let data = build_p4k(&[
        TestEntry::new("data/odd.bin", b"payload", 99),
        TestEntry::new("libs/config.xml", &cryxml_config(), METHOD_ZSTD),
    ]);
    let p4k = P4kFile::from_bytes(data).unwrap();
    let odd = p4k.get_entry("data/odd.bin").unwrap();
    let config = p4k.get_entry("libs/config.xml").unwrap();

    fs::create_dir_all(dir.path().join("data")).unwrap();
    fs::write(dir.path().join("data/odd.bin"), b"old").unwrap();
    fs::create_dir_all(dir.path().join("libs")).unwrap();
    fs::write(dir.path().join("libs/config.xml.json"), b"{}").unwrap();

    let skip_existing = ExtractOptions {
        overwrite: false,
        convert_cryxml: Some(CryXmlFormat::Json),
    };
    assert!(matches!(
        p4k.extract_with(odd, dir.path(), &skip_existing).unwrap(),
        ExtractOutcome::Skipped(_)
    ));
    assert!(matches!(
        p4k.extract_with(config, dir.path(), &skip_existing).unwrap(),
        ExtractOutcome::Skipped(path) if path.ends_with("config.xml.json")
    ));
    assert_eq!(fs::read(dir.path().join("libs/config.xml.json")).unwrap(), b"{}");

    assert!(matches!(
        p4k.extract_with(odd, dir.path(), &ExtractOptions::default()),
        Err(Error::UnsupportedCompression(99))
    ));
}

#[test]
fn test_extract_converts_cryxml() {
    let dir = tempfile::tempdir().unwrap();
    let data = build_p4k(&[TestEntry::new(
        "libs/config.xml",
        &cryxml_config(),
        METHOD_ZSTD,
    )]);
    let p4k = P4kFile::from_bytes(data).unwrap();
    let entry = p4k.get_entry("libs/config.xml").unwrap();

    let as_xml = ExtractOptions {
        convert_cryxml: Some(CryXmlFormat::Xml),
        ..Default::default()
    };
    p4k.extract_with(entry, dir.path(), &as_xml).unwrap();
    let xml = fs::read_to_string(dir.path().join("libs/config.xml")).unwrap();
    assert!(xml.contains(r#"<Config mode="fast"/>"#));

    let as_json = ExtractOptions {
        convert_cryxml: Some(CryXmlFormat::Json),
        ..Default::default()
    };
    p4k.extract_with(entry, dir.path(), &as_json).unwrap();
    let json: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("libs/config.xml.json")).unwrap())
            .unwrap();
    assert_eq!(json["Config"]["@mode"], "fast");
}

#[test]
fn test_open_from_disk_with_and_without_mmap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Data.p4k");
    fs::write(&path, sample_archive()).unwrap();

    let mapped = P4kFile::open(&path).unwrap();
    let read = P4kFile::open_with_options(
        &path,
        &P4kOpenOptions {
            use_mmap: false,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(mapped.len(), read.len());
    assert_eq!(mapped.read("data/z.dds").unwrap(), read.read("data/z.dds").unwrap());
}

#[test]
fn test_truncated_directory_is_bad_archive() {
    let mut data = sample_archive();
    // point the central directory past the end of the file
    let eocd = data.len() - 22 - "synthetic".len();
    data[eocd + 16..eocd + 20].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(matches!(P4kFile::from_bytes(data), Err(Error::BadArchive(_))));
}
