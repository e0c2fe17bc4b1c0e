//! Comtrade ingestion across text encodings and ragged files.

use std::fs;
use tempfile::TempDir;
use tradecast_core::data::comtrade::normalize_table;
use tradecast_core::data::decode::decode_table;
use tradecast_core::data::schema::{COUNTRY_NAME, PRODUCT_NAME};
use tradecast_core::data::{discover_groups, merge_group, normalize_file, TextEncoding};
use tradecast_core::domain::TradeFlow;

const HEADER: &str = "period,flowDesc,partnerISO,partnerDesc,cmdCode,primaryValue,qty,cmdDesc";

fn sample_csv() -> String {
    format!(
        "{HEADER}\n\
         202103,Export,CIV,Côte d'Ivoire,0901,1250.5,10,Café\n\
         202103,Export,CIV,Côte d'Ivoire,1801,300,4,Cacao en fèves\n\
         202103,Export,CHL,Chile,0901,80,1,Café\n"
    )
}

fn windows_1252(text: &str) -> Vec<u8> {
    let (bytes, _, had_errors) = encoding_rs::WINDOWS_1252.encode(text);
    assert!(!had_errors);
    bytes.into_owned()
}

#[test]
fn windows_1252_file_reads_like_utf8() {
    let text = sample_csv();
    let utf8 = decode_table(text.as_bytes()).unwrap();
    let legacy = decode_table(&windows_1252(&text)).unwrap();

    assert_eq!(utf8.encoding, TextEncoding::Utf8);
    assert_eq!(legacy.encoding, TextEncoding::Windows1252);

    let (a, _) = normalize_table(&utf8, "USA", TradeFlow::Export, 0, "utf8").unwrap();
    let (b, _) = normalize_table(&legacy, "USA", TradeFlow::Export, 0, "cp1252").unwrap();
    assert!(a.equals_missing(&b));

    let names = a.column(COUNTRY_NAME).unwrap().str().unwrap();
    assert!(names.into_iter().any(|n| n == Some("Côte d'Ivoire")));
    let products = a.column(PRODUCT_NAME).unwrap().str().unwrap();
    assert!(products.into_iter().any(|n| n == Some("Cacao en fèves")));
}

#[test]
fn extra_fields_get_placeholder_names() {
    let text = format!("{HEADER}\n202103,Export,CHL,Chile,0901,80,1,Café,stray,more\n");
    let table = decode_table(text.as_bytes()).unwrap();

    assert_eq!(table.placeholder_columns, 2);
    assert!(table.has_column("unnamed_col_0"));
    assert!(table.has_column("unnamed_col_1"));
    let idx = table.column_index("unnamed_col_1").unwrap();
    assert_eq!(table.rows[0].get(idx), Some("more"));
}

#[test]
fn group_merge_survives_bad_files() {
    let dir = TempDir::new().unwrap();
    let text = sample_csv();
    fs::write(dir.path().join("USA_X_202103_HS4.csv"), text.as_bytes()).unwrap();
    fs::write(dir.path().join("USA_X_202104_HS4.csv"), windows_1252(&text)).unwrap();
    // no qty column
    fs::write(
        dir.path().join("USA_X_202105_HS4.csv"),
        "period,flowDesc,partnerISO,partnerDesc,cmdCode,primaryValue\n202105,Export,CHL,Chile,0901,1\n",
    )
    .unwrap();
    // negative and missing quantities are dropped
    fs::write(
        dir.path().join("USA_X_202106_HS4.csv"),
        format!("{HEADER},extra\n202106,Export,CHL,Chile,0901,5,-1,Café,x\n202106,Export,CHL,Chile,0901,5,,Café,x\n202106,Export,CHL,Chile,0902,7,2,Thé,x\n"),
    )
    .unwrap();
    fs::write(dir.path().join("CHN_X_2021_HS4.csv"), text.as_bytes()).unwrap();
    fs::write(dir.path().join("USA_X_202103_HS6.csv"), text.as_bytes()).unwrap();

    let groups = discover_groups(dir.path(), "USA", &[2021, 2022]).unwrap();
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.flow, TradeFlow::Export);
    assert_eq!(group.files.len(), 4);

    let merged = merge_group(group).unwrap();
    assert_eq!(merged.name, "USA_2021_export");
    assert_eq!(merged.files_used, 3);
    assert_eq!(merged.files_skipped, 1);
    assert_eq!(merged.rows_dropped, 2);
    assert_eq!(merged.rows.len(), 7);
    assert_eq!(merged.headers.last().map(String::as_str), Some("extra"));
    assert!(merged.rows.iter().all(|r| r.len() == merged.headers.len()));

    let path = dir.path().join("merged").join("USA_2021_export.csv");
    merged.write_csv(&path).unwrap();
    let df = normalize_file(&path, "USA", TradeFlow::Export, 0).unwrap();
    // 2021-03: CIV 0901, CIV 1801, CHL 0901; 2021-06: CHL 0902
    assert_eq!(df.height(), 4);
}

#[test]
fn missing_directory_is_input_missing() {
    let dir = TempDir::new().unwrap();
    let err = discover_groups(&dir.path().join("absent"), "USA", &[2021]).unwrap_err();
    assert!(matches!(err, tradecast_core::data::DataError::InputMissing(_)));
}
