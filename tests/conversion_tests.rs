//! Conversion pipeline integration tests
//!
//! Drives `Converter` end to end over real files in temporary directories:
//! missing-column handling, cancellation, de-duplication, row accounting and
//! reader/writer round trips for both formats.

use pretty_assertions::assert_eq;
use royalbit_tabular::convert::{
    AlwaysContinue, Converter, NeverContinue, NoProgress, ProgressEvent, RunState,
};
use royalbit_tabular::error::ConvertResult;
use royalbit_tabular::profile::load_profile;
use royalbit_tabular::reader::{RowHandler, SourceFormat};
use royalbit_tabular::types::{
    Calculation, ColumnMapping, ConversionStatus, OutputFormat, OutputOptions, Profile, RowMap,
};
use royalbit_tabular::writer::SinkWriter;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Every record of a CSV output, BOM stripped
fn read_records(path: &Path) -> Vec<Vec<String>> {
    let text = fs::read_to_string(path).unwrap();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn region_profile() -> Profile {
    let mut profile = Profile::new("regional");
    profile.columns = vec![
        ColumnMapping::new("id").unique(),
        ColumnMapping::new("name"),
        ColumnMapping::new("Region"),
        ColumnMapping::new("amount"),
    ];
    profile
}

/// Collects the header and rows a reader produces
#[derive(Default)]
struct Collected {
    header: Vec<String>,
    rows: Vec<RowMap>,
}

impl RowHandler for Collected {
    fn on_header(&mut self, header: &[String]) -> ConvertResult<ControlFlow<()>> {
        self.header = header.to_vec();
        Ok(ControlFlow::Continue(()))
    }

    fn on_row(&mut self, row: RowMap) -> ConvertResult<()> {
        self.rows.push(row);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MISSING COLUMNS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_missing_region_declined_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = write_file(dir.path(), "east.csv", "id,name,amount\n1,Kim,10\n");

    let converter = Converter::new(region_profile()).with_output_dir(out.path());
    let report = converter.run(&[input], false, &mut NoProgress, &mut NeverContinue);

    let result = &report.results[0];
    assert_eq!(result.status, ConversionStatus::Failed);
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .contains("cancelled due to missing columns"));
    assert!(!out.path().join("east.csv").exists());
}

#[test]
fn test_missing_region_continue_omits_column() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = write_file(dir.path(), "east.csv", "id,name,amount\n1,Kim,10\n2,Lee,20\n");

    let mut asked = Vec::new();
    let mut confirm = |file: &str, missing: &[String]| {
        asked.push((file.to_string(), missing.to_vec()));
        true
    };
    let converter = Converter::new(region_profile()).with_output_dir(out.path());
    let report = converter.run(&[input], false, &mut NoProgress, &mut confirm);

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(asked, vec![("east.csv".to_string(), strings(&["Region"]))]);
    assert_eq!(
        read_records(&out.path().join("east.csv")),
        vec![
            strings(&["id", "name", "amount"]),
            strings(&["1", "Kim", "10"]),
            strings(&["2", "Lee", "20"]),
        ]
    );
}

#[test]
fn test_merge_later_file_missing_column_gets_empty_values() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a.csv", "id,name,Region,amount\n1,Kim,East,10\n");
    let b = write_file(dir.path(), "b.csv", "amount,id,name\n20,2,Lee\n");

    let mut profile = region_profile();
    profile.output_file_name = Some("combined".to_string());
    let converter = Converter::new(profile).with_output_dir(out.path());
    let report = converter.run(&[a, b], true, &mut NoProgress, &mut NeverContinue);

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(
        read_records(&out.path().join("combined.csv")),
        vec![
            strings(&["id", "name", "Region", "amount"]),
            strings(&["1", "Kim", "East", "10"]),
            strings(&["2", "Lee", "", "20"]),
        ]
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// CANCELLATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cancellation_after_second_file() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let files: Vec<PathBuf> = (1..=5)
        .map(|i| {
            write_file(
                dir.path(),
                &format!("part{}.csv", i),
                "id,name,Region,amount\n1,Kim,East,10\n",
            )
        })
        .collect();

    let converter = Converter::new(region_profile()).with_output_dir(out.path());
    let cancel = converter.cancel_handle();
    let mut started = Vec::new();
    let mut on_event = |event: ProgressEvent| match event {
        ProgressEvent::FileStart { index, .. } => started.push(index),
        ProgressEvent::FileComplete { index: 2, .. } => cancel.cancel(),
        _ => {}
    };

    let report = converter.run(&files, false, &mut on_event, &mut AlwaysContinue);

    assert_eq!(report.state, RunState::Cancelled);
    assert_eq!(report.results.len(), 2);
    assert_eq!(started, vec![1, 2]);
    for i in 3..=5 {
        assert!(!out.path().join(format!("part{}.csv", i)).exists());
    }
}

#[test]
fn test_merge_cancellation_keeps_written_rows() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a.csv", "id,name,Region,amount\n1,Kim,East,10\n");
    let b = write_file(dir.path(), "b.csv", "id,name,Region,amount\n2,Lee,West,20\n");

    let mut profile = region_profile();
    profile.output_file_name = Some("merged.csv".to_string());
    let converter = Converter::new(profile).with_output_dir(out.path());
    let cancel = converter.cancel_handle();
    let mut on_event = |event: ProgressEvent| {
        if let ProgressEvent::FileComplete { index: 1, .. } = event {
            cancel.cancel();
        }
    };

    let report = converter.run(&[a, b], true, &mut on_event, &mut AlwaysContinue);

    assert_eq!(report.state, RunState::Cancelled);
    assert_eq!(report.results[0].status, ConversionStatus::Cancelled);
    assert_eq!(report.results[0].output_rows, 1);
    assert_eq!(read_records(&out.path().join("merged.csv")).len(), 2);
}

// ═══════════════════════════════════════════════════════════════════════════
// DEDUPLICATION AND ROW ACCOUNTING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_dedup_uses_only_key_columns() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = write_file(
        dir.path(),
        "orders.csv",
        "order,line,sku\nA,1,x\nA,2,y\nA,1,z\nB,1,x\n",
    );

    let mut profile = Profile::new("lines");
    profile.columns = vec![
        ColumnMapping::new("order").unique(),
        ColumnMapping::new("line").unique(),
        ColumnMapping::new("sku"),
    ];
    let converter = Converter::new(profile).with_output_dir(out.path());
    let report = converter.run(&[input], false, &mut NoProgress, &mut AlwaysContinue);

    assert_eq!(report.results[0].duplicate_rows, 1);
    assert_eq!(
        read_records(&out.path().join("orders.csv")),
        vec![
            strings(&["order", "line", "sku"]),
            strings(&["A", "1", "x"]),
            strings(&["A", "2", "y"]),
            strings(&["B", "1", "x"]),
        ]
    );
}

#[test]
fn test_row_counts_never_exceed_input() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = write_file(
        dir.path(),
        "messy.csv",
        "id,name,Region,amount\n1,a,N,1\n,,,\n1,b,S,2\n2,c,E,3\n , , , \n3,d,W,4\n",
    );

    let converter = Converter::new(region_profile()).with_output_dir(out.path());
    let report = converter.run(&[input], false, &mut NoProgress, &mut AlwaysContinue);

    let r = &report.results[0];
    assert_eq!(r.input_rows, 6);
    assert_eq!(r.empty_rows, 2);
    assert_eq!(r.duplicate_rows, 1);
    assert_eq!(r.output_rows, 3);
    assert!(r.output_rows + r.duplicate_rows + r.empty_rows <= r.input_rows);
}

#[test]
fn test_blank_lines_are_counted_or_written() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = write_file(dir.path(), "gaps.csv", "a,b\n1,2\n\n3,4\n");

    let mut profile = Profile::new("gaps");
    profile.columns = vec![ColumnMapping::new("a"), ColumnMapping::new("b")];

    let converter = Converter::new(profile.clone()).with_output_dir(out.path());
    let report = converter.run(&[input.clone()], false, &mut NoProgress, &mut AlwaysContinue);
    let result = &report.results[0];
    assert_eq!(result.input_rows, 3);
    assert_eq!(result.output_rows, 2);
    assert_eq!(result.empty_rows, 1);

    profile.options.skip_empty_rows = false;
    let converter = Converter::new(profile).with_output_dir(out.path());
    let report = converter.run(&[input], false, &mut NoProgress, &mut AlwaysContinue);
    let result = &report.results[0];
    assert_eq!(result.input_rows, 3);
    assert_eq!(result.output_rows, 3);
    assert_eq!(result.empty_rows, 0);
    assert_eq!(
        read_records(&out.path().join("gaps.csv")),
        vec![
            strings(&["a", "b"]),
            strings(&["1", "2"]),
            strings(&["", ""]),
            strings(&["3", "4"]),
        ]
    );
}

#[test]
fn test_progress_counts_written_rows() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    // 25,000 distinct ids, with 10,000 of them repeated right away
    let mut content = String::from("id,v\n");
    for i in 0..25_000 {
        content.push_str(&format!("{},x\n", i));
        if i % 5 < 2 {
            content.push_str(&format!("{},x\n", i));
        }
    }
    let input = write_file(dir.path(), "big.csv", &content);

    let mut profile = Profile::new("big");
    profile.columns = vec![ColumnMapping::new("id").unique(), ColumnMapping::new("v")];
    let converter = Converter::new(profile).with_output_dir(out.path());

    let mut progress = Vec::new();
    let mut on_event = |event: ProgressEvent| {
        if let ProgressEvent::Progress {
            index,
            total,
            rows,
            file_name,
        } = event
        {
            progress.push((index, total, rows, file_name));
        }
    };

    let report = converter.run(&[input], false, &mut on_event, &mut AlwaysContinue);

    let result = &report.results[0];
    assert_eq!(result.input_rows, 35_000);
    assert_eq!(result.output_rows, 25_000);
    assert_eq!(result.duplicate_rows, 10_000);
    assert_eq!(
        progress,
        vec![
            (1, 1, 10_000, "big.csv".to_string()),
            (1, 1, 20_000, "big.csv".to_string()),
        ]
    );
}

#[test]
fn test_header_order_follows_profile_not_source() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let first = write_file(dir.path(), "one.csv", "amount,Region,name,id\n5,N,a,1\n");
    let second = write_file(dir.path(), "two.csv", "id,name,Region,amount\n2,b,S,6\n");

    let converter = Converter::new(region_profile()).with_output_dir(out.path());
    converter.run(&[first, second], false, &mut NoProgress, &mut AlwaysContinue);

    let one = read_records(&out.path().join("one.csv"));
    let two = read_records(&out.path().join("two.csv"));
    assert_eq!(one[0], two[0]);
    assert_eq!(one[1], strings(&["1", "a", "N", "5"]));
}

// ═══════════════════════════════════════════════════════════════════════════
// CALCULATIONS AND SAMPLE PROFILE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_sample_profile_end_to_end() {
    let profile_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("profiles/sales-report.json");
    let profile = load_profile(&profile_path).unwrap();

    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = write_file(
        dir.path(),
        "jan.csv",
        "order_id,customer,qty,unit_price,region,notes\n\
         1001,Acme Corp,3,1500.5,East,rush\n\
         1001,Acme Corp,3,1500.5,East,duplicate\n\
         1002,Globex,1,20,West,\n",
    );

    let converter = Converter::new(profile).with_output_dir(out.path());
    let report = converter.run(&[input], false, &mut NoProgress, &mut NeverContinue);
    assert_eq!(report.state, RunState::Completed);

    assert_eq!(
        read_records(&out.path().join("jan_sales.csv")),
        vec![
            strings(&[
                "Order",
                "Customer",
                "Customer Code",
                "Quantity",
                "Unit Price",
                "Total",
                "Region"
            ]),
            strings(&["1001", "Acme Corp", "Acm", "3", "1500.5", "4,501.50", "East"]),
            strings(&["1002", "Globex", "Glo", "1", "20", "20.00", "West"]),
        ]
    );
}

#[test]
fn test_chained_calculations() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = write_file(dir.path(), "n.csv", "x\n2\n\"1,000\"\n");

    let mut profile = Profile::new("chain");
    profile.columns = vec![ColumnMapping::new("x")];
    profile.calculations = vec![
        Calculation::new("squared", "${x} ^ 2"),
        Calculation::new("plus_one", "${squared} + 1").after("x"),
    ];
    let converter = Converter::new(profile).with_output_dir(out.path());
    converter.run(&[input], false, &mut NoProgress, &mut AlwaysContinue);

    assert_eq!(
        read_records(&out.path().join("n.csv")),
        vec![
            strings(&["x", "plus_one", "squared"]),
            strings(&["2", "5", "4"]),
            strings(&["1,000", "1000001", "1000000"]),
        ]
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// ROUND TRIPS
// ═══════════════════════════════════════════════════════════════════════════

fn round_trip(format: OutputFormat, source: SourceFormat, file: &str) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(file);
    let header = strings(&["code", "label", "note"]);
    let rows: Vec<Vec<String>> = (0..50)
        .map(|i| {
            vec![
                format!("{:03}", i),
                format!("item, \"{}\"", i),
                if i % 2 == 0 { "even".to_string() } else { "odd".to_string() },
            ]
        })
        .collect();

    let options = OutputOptions::default();
    let mut writer = SinkWriter::open(format, &path, &options).unwrap();
    writer.write_header(&header).unwrap();
    for row in &rows {
        writer.write_row(row).unwrap();
    }
    writer.close().unwrap();

    let mut collected = Collected::default();
    let emitted = source.read(&path, &options, &mut collected).unwrap();

    assert_eq!(emitted, rows.len() as u64);
    assert_eq!(collected.header, header);
    for (row, read) in rows.iter().zip(&collected.rows) {
        for (label, value) in header.iter().zip(row) {
            assert_eq!(&read[label], value);
        }
    }
}

#[test]
fn test_csv_round_trip() {
    round_trip(OutputFormat::Csv, SourceFormat::DelimitedText, "rt.csv");
}

#[test]
fn test_xlsx_round_trip() {
    round_trip(OutputFormat::Xlsx, SourceFormat::Spreadsheet, "rt.xlsx");
}

#[test]
fn test_xlsx_input_with_dates_to_csv() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = dir.path().join("visits.xlsx");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    sheet.write_string(0, 0, "id").unwrap();
    sheet.write_string(0, 1, "Region").unwrap();
    sheet.write_string(0, 2, "visited").unwrap();
    sheet.write_number(1, 0, 7).unwrap();
    sheet.write_string(1, 1, "North").unwrap();
    let date = ExcelDateTime::from_ymd(2024, 3, 15).unwrap();
    sheet.write_datetime_with_format(1, 2, &date, &date_format).unwrap();
    workbook.save(&input).unwrap();

    let mut profile = Profile::new("visits");
    profile.columns = vec![
        ColumnMapping::new("id"),
        ColumnMapping::new("Region"),
        ColumnMapping::new("visited").renamed("Date"),
    ];
    let converter = Converter::new(profile).with_output_dir(out.path());
    let report = converter.run(&[input], false, &mut NoProgress, &mut NeverContinue);

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(
        read_records(&out.path().join("visits.csv")),
        vec![
            strings(&["id", "Region", "Date"]),
            strings(&["7", "North", "2024-03-15"]),
        ]
    );
}

#[test]
fn test_merge_to_xlsx_reads_back() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a.csv", "id,name,Region,amount\n1,Kim,East,10\n");
    let b = write_file(dir.path(), "b.csv", "id,name,Region,amount\n1,Kim,East,10\n2,Lee,West,007\n");

    let profile = region_profile().with_output_format(OutputFormat::Xlsx);
    let converter = Converter::new(profile).with_output_dir(out.path());
    let report = converter.run(&[a, b], true, &mut NoProgress, &mut AlwaysContinue);

    let merged = &report.results[0];
    assert_eq!(merged.status, ConversionStatus::Success);
    assert_eq!(merged.duplicate_rows, 1);
    let output = merged.output_file.clone().unwrap();
    assert!(output
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("merged_"));
    assert_eq!(output.extension().unwrap(), "xlsx");

    let mut collected = Collected::default();
    SourceFormat::Spreadsheet
        .read(&output, &OutputOptions::default(), &mut collected)
        .unwrap();
    assert_eq!(collected.header, strings(&["id", "name", "Region", "amount"]));
    assert_eq!(collected.rows.len(), 2);
    assert_eq!(collected.rows[1]["amount"], "007");
    assert_eq!(collected.rows[1]["id"], "2");
}
