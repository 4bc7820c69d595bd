//! Tests for manifest writing and reading.

use super::*;
use serde_json::json;
use tempfile::TempDir;

fn record(value: serde_json::Value) -> SourceRecord {
    match value {
        Value::Object(map) => map,
        _ => panic!("record must be an object"),
    }
}

fn header_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|line| line.starts_with("\"Id\""))
        .count()
}

#[test]
fn test_header_written_once_across_batches() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("attachments.csv");
    let mut writer = ManifestWriter::create(&path).unwrap();

    writer
        .append_batch(&[
            record(json!({"Id": "A", "Name": "a.txt"})),
            record(json!({"Id": "B", "Name": "b.txt"})),
        ])
        .unwrap();
    writer
        .append_batch(&[record(json!({"Id": "C", "Name": "c.txt"}))])
        .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        content,
        "\"Id\",\"Name\"\n\"A\",\"a.txt\"\n\"B\",\"b.txt\"\n\"C\",\"c.txt\"\n"
    );
    assert_eq!(writer.rows_written(), 3);
}

#[test]
fn test_empty_first_batch_defers_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv");
    let mut writer = ManifestWriter::create(&path).unwrap();

    assert_eq!(writer.append_batch(&[]).unwrap(), 0);
    assert!(writer.columns().is_none());
    writer
        .append_batch(&[record(json!({"Id": "A"}))])
        .unwrap();

    assert_eq!(header_count(&path), 1);
}

#[test]
fn test_reopen_does_not_duplicate_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv");
    ManifestWriter::create(&path)
        .unwrap()
        .append_batch(&[record(json!({"Id": "A", "Name": "a"}))])
        .unwrap();

    let mut reopened = ManifestWriter::open(&path).unwrap();
    assert_eq!(
        reopened.columns(),
        Some(&["Id".to_string(), "Name".to_string()][..])
    );
    reopened
        .append_batch(&[record(json!({"Id": "B", "Name": "b"}))])
        .unwrap();

    assert_eq!(header_count(&path), 1);
    assert_eq!(read_manifest(&path).unwrap().len(), 2);
}

#[test]
fn test_schema_drift_is_rejected_without_writing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv");
    let mut writer = ManifestWriter::create(&path).unwrap();
    writer
        .append_batch(&[record(json!({"Id": "A"}))])
        .unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    let result = writer.append_batch(&[record(json!({"Id": "B", "Extra": "x"}))]);

    assert!(matches!(result, Err(Error::SchemaDrift(_))));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn test_missing_column_writes_empty_cell() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv");
    let mut writer = ManifestWriter::create(&path).unwrap();
    writer
        .append_batch(&[
            record(json!({"Id": "A", "Description": "first"})),
            record(json!({"Id": "B"})),
        ])
        .unwrap();

    let rows = read_manifest(&path).unwrap();
    assert_eq!(rows[1]["Description"], "");
}

#[test]
fn test_round_trip_preserves_special_characters() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv");
    let description = "Line one, with comma\nLine \"two\" quoted";
    let mut writer = ManifestWriter::create(&path).unwrap();
    writer
        .append_batch(&[record(json!({
            "Id": "00P1",
            "Description": description,
            "IsPrivate": false,
            "BodyLength": 1024,
            "ContentType": null
        }))])
        .unwrap();

    let rows = read_manifest(&path).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Description"], description);
    assert_eq!(rows[0]["IsPrivate"], "false");
    assert_eq!(rows[0]["BodyLength"], "1024");
    assert_eq!(rows[0]["ContentType"], "");
}

#[test]
fn test_reader_preserves_column_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv");
    std::fs::write(&path, "\"Name\",\"Id\"\n\"x\",\"1\"\n").unwrap();

    let reader = ManifestReader::open(&path).unwrap();
    assert_eq!(reader.headers(), &["Name".to_string(), "Id".to_string()]);
    let rows: Vec<SourceRecord> = reader.into_records().collect::<Result<_>>().unwrap();
    let keys: Vec<&String> = rows[0].keys().collect();
    assert_eq!(keys, vec!["Name", "Id"]);
}

#[test]
fn test_reader_rejects_empty_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "").unwrap();

    assert!(matches!(
        ManifestReader::open(&path),
        Err(Error::Manifest(_))
    ));
}
