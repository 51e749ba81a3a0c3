// Import file decoding and roster CSV export

use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use drg_recon::parser::RowResult;
use drg_recon::{MemberRecord, RowError, SnapshotParser, ValidationError};

/// Column names written by [`export_roster`], in import order.
pub const EXPORT_HEADER: [&str; 5] = ["key", "name", "rank", "level", "power"];

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Decode one field: UTF-8 when valid, else Windows-1252 (Latin-1 superset).
///
/// Decided per field so a file mixing both encodings keeps every name intact.
pub fn decode_field(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        // Spreadsheet tools on Windows save CSV as cp1252
        Err(_) => encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes).0,
    }
}

/// Split raw snapshot bytes into rows and validate them, decoding each field
/// with [`decode_field`]. Stops after the first read failure.
pub fn decode_rows<R: Read>(reader: R, parser: &SnapshotParser) -> impl Iterator<Item = RowResult> {
    let mut last_line = if parser.has_header() { 1 } else { 0 };
    let mut failed = false;
    csv::ReaderBuilder::new()
        .delimiter(parser.delimiter())
        .has_headers(parser.has_header())
        .flexible(true)
        .from_reader(reader)
        .into_byte_records()
        .map_while(move |record| {
            if failed {
                return None;
            }
            let row = match record {
                Ok(record) => {
                    let line = record.position().map(|p| p.line()).unwrap_or(last_line + 1);
                    last_line = line;
                    let fields: Vec<Cow<'_, str>> = record.iter().map(decode_field).collect();
                    SnapshotParser::parse_record(line, &fields)
                }
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(last_line + 1);
                    last_line = line;
                    failed = e.is_io_error();
                    Err(RowError::new(line, ValidationError::Malformed(e.to_string())))
                }
            };
            Some(row)
        })
}

/// Decode and parse a weekly snapshot file. Row-level problems stay in the
/// returned rows; only an unreadable file is an error.
pub fn read_import(path: &Path, parser: &SnapshotParser) -> Result<Vec<RowResult>, String> {
    let file = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let rows: Vec<RowResult> = decode_rows(file, parser).collect();
    log::debug!("read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Write the roster in import format (`key,name,rank,level,power`, current values).
pub fn export_roster<W: Write>(records: &[MemberRecord], writer: W, has_header: bool) -> Result<(), String> {
    let mut writer = csv::WriterBuilder::new().from_writer(writer);

    if has_header {
        writer.write_record(EXPORT_HEADER).map_err(|e| e.to_string())?;
    }
    for record in records {
        let level = record.level_current().to_string();
        let power = record.power_current().to_string();
        writer
            .write_record([
                record.key().as_str(),
                record.display_name(),
                record.rank().as_str(),
                level.as_str(),
                power.as_str(),
            ])
            .map_err(|e| e.to_string())?;
    }

    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}

pub fn export_roster_to_path(records: &[MemberRecord], path: &Path, has_header: bool) -> Result<(), String> {
    let file = File::create(path).map_err(|e| format!("{}: {e}", path.display()))?;
    export_roster(records, std::io::BufWriter::new(file), has_header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    use drg_recon::{ImportMode, MemoryStore, Reconciler, RosterRead};

    fn names(rows: &[RowResult]) -> Vec<&str> {
        rows.iter()
            .map(|r| r.as_ref().unwrap().snapshot.display_name.as_str())
            .collect()
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cp1252.csv");
        // "Zoë" with 0xEB, invalid as UTF-8
        fs::write(&path, b"m1,Zo\xeb,R2,5,100\n").unwrap();

        let rows = read_import(&path, &SnapshotParser::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(names(&rows), ["Zoë"]);
    }

    #[test]
    fn test_mixed_encodings_decode_per_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed.csv");
        fs::write(&path, b"m1,Zo\xc3\xab,R2,5,100\nm2,Bj\xf6rn,R3,6,200\n").unwrap();
        let rows = read_import(&path, &SnapshotParser::default()).unwrap();
        assert_eq!(names(&rows), ["Zoë", "Björn"]);

        // BOM in front of a cp1252 row
        fs::write(&path, b"\xef\xbb\xbfm2,Bj\xf6rn,R3,6,200\nm1,Zo\xc3\xab,R2,5,100\n").unwrap();
        let rows = read_import(&path, &SnapshotParser::default()).unwrap();
        assert_eq!(names(&rows), ["Björn", "Zoë"]);
        assert_eq!(rows[0].as_ref().unwrap().snapshot.key.as_str(), "m2");
    }

    #[test]
    fn test_decoded_rows_keep_line_numbers_and_header() {
        let parser = SnapshotParser::default().with_header(true);
        let bytes: &[u8] = b"key,name,rank,level,power\nm1,A,R1,1,1\nm2,B\xe9,R9,1,1\n";
        let rows: Vec<RowResult> = decode_rows(bytes, &parser).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].as_ref().unwrap().line, 2);
        let err = rows[1].as_ref().unwrap_err();
        assert_eq!(err.line, 3);
        assert!(matches!(err.error, ValidationError::InvalidRank(_)));
    }

    #[test]
    fn test_decode_field() {
        assert_eq!(decode_field(b"Zo\xc3\xab"), "Zoë");
        assert_eq!(decode_field(b"Bj\xf6rn"), "Björn");
        assert_eq!(decode_field(b"\xef\xbb\xbfm1"), "m1");
        assert!(matches!(decode_field(b"plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = read_import(&dir.path().join("nope.csv"), &SnapshotParser::default()).unwrap_err();
        assert!(err.contains("nope.csv"));
    }

    #[test]
    fn test_export_quotes_names() {
        let store = MemoryStore::new();
        let rows = SnapshotParser::default().parse_str("m1,\"Smith, J\",R3,10,1000\nm2,Bob,R5,2,50\n");
        Reconciler::new(&store).reconcile(rows, ImportMode::Merge).unwrap();

        let mut out = Vec::new();
        export_roster(&store.list_all().unwrap(), &mut out, true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "key,name,rank,level,power\nm2,Bob,R5,2,50\nm1,\"Smith, J\",R3,10,1000\n");
    }

    #[test]
    fn test_export_reimports_to_same_roster() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roster.csv");

        let source = MemoryStore::new();
        let rows = SnapshotParser::default().parse_str("a,Ann,R1,1,10\nb,Ben,R4,7,700\nc,Cy,R4,7,900\n");
        Reconciler::new(&source).reconcile(rows, ImportMode::Merge).unwrap();
        export_roster_to_path(&source.list_all().unwrap(), &path, true).unwrap();

        let copy = MemoryStore::new();
        let parser = SnapshotParser::default().with_header(true);
        let report = Reconciler::new(&copy)
            .reconcile(read_import(&path, &parser).unwrap(), ImportMode::Authoritative)
            .unwrap();
        assert_eq!(report.inserted, 3);
        assert!(report.is_clean());
        assert_eq!(copy.list_all().unwrap(), source.list_all().unwrap());
    }
}
