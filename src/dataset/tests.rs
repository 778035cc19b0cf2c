use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use super::*;
use crate::model::MetadataRecord;

const DATA_SHEET_BOOK: &[u8] = include_bytes!("testdata/items.xlsb");
const OTHER_SHEET_BOOK: &[u8] = include_bytes!("testdata/no_data_sheet.xlsb");

struct Fixture {
    _tmp: TempDir,
    data: DataDir,
    ingestor: Ingestor,
    cache: Arc<RowCache>,
    items: ItemService,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().expect("tempdir");
    let data = DataDir::open(tmp.path().join("data")).expect("open data dir");
    let ingestor = Ingestor::new(data.clone());
    let cache = Arc::new(RowCache::new(&data));
    let items = ItemService::new(Arc::clone(&cache));
    Fixture {
        _tmp: tmp,
        data,
        ingestor,
        cache,
        items,
    }
}

fn upload(data: &DataDir, name: &str, bytes: &[u8]) -> Upload {
    let format = UploadFormat::from_filename(name).expect("accepted format");
    let mut file = data.create_upload_temp(name).expect("upload temp");
    file.write_all(bytes).expect("write upload");
    Upload {
        original_name: name.to_string(),
        format,
        file,
    }
}

fn metadata(data: &DataDir) -> MetadataRecord {
    MetadataStore::new(data.metadata_path()).load()
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("list dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn rows_json(rows: &[Row]) -> String {
    serde_json::to_string(rows).expect("serialize rows")
}

#[test]
fn empty_state_reports_defaults() {
    let fx = fixture();

    assert_eq!(metadata(&fx.data), MetadataRecord::default());
    let json = serde_json::to_string(&metadata(&fx.data)).expect("serialize");
    assert_eq!(json, r#"{"uploadedAt":null,"count":0}"#);

    let page = fx.items.list_items(&PageRequest::default()).expect("list");
    assert_eq!(page.total, 0);
    assert!(page.rows.is_empty());
    assert!(fx.items.list_all().expect("all").is_empty());
    assert!(!fx.cache.is_warm());
}

#[test]
fn ingest_without_file_is_rejected() {
    let fx = fixture();
    let err = fx.ingestor.ingest(None).unwrap_err();
    assert!(matches!(err, DatasetError::NoFile));
    assert_eq!(err.to_string(), "No file uploaded");
}

#[test]
fn csv_round_trip_returns_uploaded_rows() {
    let fx = fixture();

    let record = fx
        .ingestor
        .ingest(Some(upload(&fx.data, "items.csv", b"a,b\n1,2\n3,4\n")))
        .expect("ingest");
    assert_eq!(record.count, 2);
    assert!(record.uploaded_at.is_some());
    assert_eq!(metadata(&fx.data), record);

    let page = fx.items.list_items(&PageRequest::default()).expect("list");
    assert_eq!(page.total, 2);
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 200);
    assert_eq!(rows_json(&page.rows), r#"[{"a":"1","b":"2"},{"a":"3","b":"4"}]"#);

    assert_eq!(
        dir_entries(fx.data.root()),
        vec!["item_list.csv".to_string(), "metadata.json".to_string()]
    );
}

#[test]
fn reupload_is_idempotent_except_for_stamp() {
    let fx = fixture();
    let bytes = b"a,b\n1,2\n3,4\n";

    let first = fx
        .ingestor
        .ingest(Some(upload(&fx.data, "items.csv", bytes)))
        .expect("first ingest");
    let first_rows = rows_json(&fx.items.list_all().expect("all"));

    let second = fx
        .ingestor
        .ingest(Some(upload(&fx.data, "items.csv", bytes)))
        .expect("second ingest");
    let second_rows = rows_json(&fx.items.list_all().expect("all"));

    assert_eq!(first.count, second.count);
    assert_ne!(first.uploaded_at, second.uploaded_at);
    assert_eq!(first_rows, second_rows);
}

#[test]
fn total_tracks_latest_upload_count() {
    let fx = fixture();
    let uploads: [&[u8]; 3] = [
        b"a,b\n1,2\n3,4\n",
        b"a,b\n1,2\n3,4\n5,6\n7,8\n9,10\n",
        b"x\n\"multi\nline\"\n",
    ];

    for bytes in uploads {
        let record = fx
            .ingestor
            .ingest(Some(upload(&fx.data, "items.csv", bytes)))
            .expect("ingest");
        let page = fx
            .items
            .list_items(&PageRequest::from_raw(None, Some("2"), None))
            .expect("list");
        assert_eq!(page.total, record.count);
        assert!(fx.cache.is_warm());
    }
}

#[test]
fn pages_past_the_end_are_empty_with_total() {
    let fx = fixture();
    fx.ingestor
        .ingest(Some(upload(&fx.data, "items.csv", b"n\n1\n2\n3\n4\n5\n")))
        .expect("ingest");

    let second = fx
        .items
        .list_items(&PageRequest::from_raw(Some("2"), Some("2"), None))
        .expect("page 2");
    assert_eq!(rows_json(&second.rows), r#"[{"n":"3"},{"n":"4"}]"#);

    let last = fx
        .items
        .list_items(&PageRequest::from_raw(Some("3"), Some("2"), None))
        .expect("page 3");
    assert_eq!(rows_json(&last.rows), r#"[{"n":"5"}]"#);

    let beyond = fx
        .items
        .list_items(&PageRequest::from_raw(Some("4"), Some("2"), None))
        .expect("page 4");
    assert!(beyond.rows.is_empty());
    assert_eq!(beyond.total, 5);
    assert_eq!(beyond.page, 4);
}

#[test]
fn column_projection_keeps_requested_keys() {
    let fx = fixture();
    fx.ingestor
        .ingest(Some(upload(&fx.data, "items.csv", b"a,b\n1,2\n3,4\n")))
        .expect("ingest");

    let page = fx
        .items
        .list_items(&PageRequest::from_raw(None, None, Some("a,missing")))
        .expect("list");
    assert_eq!(rows_json(&page.rows), r#"[{"a":"1"},{"a":"3"}]"#);

    let all = fx.items.list_all().expect("all");
    assert_eq!(rows_json(&all), r#"[{"a":"1","b":"2"},{"a":"3","b":"4"}]"#);
}

#[test]
fn unsupported_extension_is_rejected_before_staging() {
    let fx = fixture();
    fx.ingestor
        .ingest(Some(upload(&fx.data, "items.csv", b"a,b\n1,2\n")))
        .expect("ingest");
    let before = metadata(&fx.data);

    let err = UploadFormat::from_filename("data.txt").unwrap_err();
    assert!(err.is_client_error());

    assert_eq!(metadata(&fx.data), before);
    assert_eq!(
        fs::read(fx.data.dataset_path()).expect("dataset"),
        b"a,b\n1,2\n"
    );
    assert_eq!(
        dir_entries(fx.data.root()),
        vec!["item_list.csv".to_string(), "metadata.json".to_string()]
    );
}

#[test]
fn malformed_csv_keeps_previous_dataset() {
    let fx = fixture();
    let good = fx
        .ingestor
        .ingest(Some(upload(&fx.data, "items.csv", b"a,b\n1,2\n")))
        .expect("ingest");

    let err = fx
        .ingestor
        .ingest(Some(upload(&fx.data, "broken.csv", b"a,b\n\xff\xfe,2\n")))
        .unwrap_err();
    assert!(err.is_parse_error());

    assert_eq!(metadata(&fx.data), good);
    assert_eq!(fs::read(fx.data.dataset_path()).expect("dataset"), b"a,b\n1,2\n");
    assert_eq!(
        dir_entries(fx.data.root()),
        vec!["item_list.csv".to_string(), "metadata.json".to_string()]
    );
}

#[test]
fn unreadable_spreadsheet_removes_temp_and_keeps_dataset() {
    let fx = fixture();
    let good = fx
        .ingestor
        .ingest(Some(upload(&fx.data, "items.csv", b"a,b\n1,2\n")))
        .expect("ingest");

    let err = fx
        .ingestor
        .ingest(Some(upload(&fx.data, "book.xlsb", b"PK\x03\x04 not really a zip")))
        .unwrap_err();
    assert!(err.is_parse_error());

    assert_eq!(metadata(&fx.data), good);
    assert_eq!(fs::read(fx.data.dataset_path()).expect("dataset"), b"a,b\n1,2\n");
    assert_eq!(
        dir_entries(fx.data.root()),
        vec!["item_list.csv".to_string(), "metadata.json".to_string()]
    );
}

#[test]
fn spreadsheet_upload_serves_data_sheet_rows() {
    let fx = fixture();

    let record = fx
        .ingestor
        .ingest(Some(upload(&fx.data, "Items.XLSB", DATA_SHEET_BOOK)))
        .expect("ingest book");
    assert_eq!(record.count, 2);
    assert_eq!(metadata(&fx.data), record);

    assert_eq!(
        fs::read_to_string(fx.data.dataset_path()).expect("dataset"),
        "sku,name,qty,active\nA1,Anvil,12,TRUE\nB2,\"Bolt, hex\",2.5,FALSE\n"
    );

    let page = fx.items.list_items(&PageRequest::default()).expect("list");
    assert_eq!(page.total, record.count);
    assert_eq!(
        rows_json(&page.rows),
        r#"[{"sku":"A1","name":"Anvil","qty":"12","active":"TRUE"},{"sku":"B2","name":"Bolt, hex","qty":"2.5","active":"FALSE"}]"#
    );
    assert_eq!(
        dir_entries(fx.data.root()),
        vec!["item_list.csv".to_string(), "metadata.json".to_string()]
    );
}

#[test]
fn spreadsheet_without_data_sheet_keeps_previous_dataset() {
    let fx = fixture();
    let good = fx
        .ingestor
        .ingest(Some(upload(&fx.data, "items.csv", b"a,b\n1,2\n")))
        .expect("ingest");
    assert_eq!(fx.items.list_all().expect("warm cache").len(), 1);

    let err = fx
        .ingestor
        .ingest(Some(upload(&fx.data, "book.xlsb", OTHER_SHEET_BOOK)))
        .unwrap_err();
    assert!(matches!(err, DatasetError::SheetNotFound { .. }));
    assert_eq!(err.to_string(), "Sheet \"DataSheet\" not found");
    assert!(err.is_parse_error());

    assert_eq!(metadata(&fx.data), good);
    assert_eq!(fs::read(fx.data.dataset_path()).expect("dataset"), b"a,b\n1,2\n");
    assert_eq!(rows_json(&fx.items.list_all().expect("all")), r#"[{"a":"1","b":"2"}]"#);
    assert_eq!(
        dir_entries(fx.data.root()),
        vec!["item_list.csv".to_string(), "metadata.json".to_string()]
    );
}

#[test]
fn missing_dataset_is_not_cached() {
    let fx = fixture();
    fx.ingestor
        .ingest(Some(upload(&fx.data, "items.csv", b"a\n1\n")))
        .expect("ingest");
    assert_eq!(fx.items.list_all().expect("all").len(), 1);

    fs::remove_file(fx.data.dataset_path()).expect("remove dataset");
    assert!(fx.items.list_all().expect("all").is_empty());

    fx.ingestor
        .ingest(Some(upload(&fx.data, "items.csv", b"a\n1\n2\n")))
        .expect("ingest again");
    assert_eq!(fx.items.list_all().expect("all").len(), 2);
}

#[test]
fn invalidate_drops_entries_from_other_stamps() {
    let fx = fixture();
    let record = fx
        .ingestor
        .ingest(Some(upload(&fx.data, "items.csv", b"a\n1\n")))
        .expect("ingest");
    fx.items.list_all().expect("warm cache");
    assert!(fx.cache.is_warm());

    fx.cache.invalidate(record.uploaded_at.as_deref());
    assert!(fx.cache.is_warm());

    fx.cache.invalidate(Some("1970-01-01T00:00:00.000Z"));
    assert!(!fx.cache.is_warm());
}

#[test]
fn stale_cache_rebuilds_when_metadata_moves() {
    let fx = fixture();
    fx.ingestor
        .ingest(Some(upload(&fx.data, "items.csv", b"a\n1\n")))
        .expect("ingest");
    assert_eq!(fx.items.list_all().expect("all").len(), 1);

    // A dataset swapped in by another process is picked up once its
    // metadata is committed, not before.
    fs::write(fx.data.dataset_path(), b"a\n1\n2\n3\n").expect("overwrite dataset");
    assert_eq!(fx.items.list_all().expect("all").len(), 1);

    let store = MetadataStore::new(fx.data.metadata_path());
    let next = MetadataStore::next_record(&store.load(), chrono::Utc::now(), 3);
    store.commit(&next).expect("commit metadata");
    assert_eq!(fx.items.list_all().expect("all").len(), 3);
}
