//! ZIP extractor implementation

use super::extractor::{is_symlink_mode, Entry, EntryKind, ExtractContext, Extractor, Outcome};
use crate::progress::Total;
use crate::sniff::ArchiveSource;
use crate::Result;
use chrono::NaiveDate;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;
use zip::ZipArchive;

/// ZIP extractor
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn format_name(&self) -> &'static str {
        "zip"
    }

    fn extract(&self, source: ArchiveSource, ctx: &ExtractContext<'_>) -> Result<Outcome> {
        debug!("Extracting ZIP archive: {:?}", source.path());
        let file = source.into_random_access()?;
        let mut archive = ZipArchive::new(file)?;

        // The central directory gives an exact entry count up front
        ctx.progress.begin(Total::Items(archive.len() as u64));

        for i in 0..archive.len() {
            let mut zip_file = archive.by_index(i)?;
            ctx.progress.advance(1);

            let mode = zip_file.unix_mode();
            let kind = if zip_file.is_dir() {
                EntryKind::Dir
            } else if mode.is_some_and(is_symlink_mode) {
                let mut target = String::new();
                zip_file.read_to_string(&mut target)?;
                EntryKind::Symlink(PathBuf::from(target))
            } else {
                EntryKind::File
            };

            let entry = Entry {
                path: zip_file.name().to_string(),
                size: zip_file.size(),
                mode: mode.unwrap_or(0o644),
                kind,
                mtime: zip_file.last_modified().and_then(dos_to_unix),
                atime: None,
            };
            ctx.unpack(&entry, &mut zip_file)?;
        }

        Ok(Outcome::Extracted)
    }
}

/// Convert a DOS timestamp (local time, no zone) to Unix seconds
fn dos_to_unix(dt: zip::DateTime) -> Option<i64> {
    NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)?
        .and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)
        .map(|naive| naive.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::DestinationPlan;
    use crate::progress::Progress;
    use crate::session::InstallOptions;
    use crate::sniff;
    use std::fs;
    use std::io::{Cursor, Write};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    #[derive(Default)]
    struct Recorder {
        totals: Mutex<Vec<Total>>,
        advanced: AtomicU64,
    }

    impl Progress for Recorder {
        fn begin(&self, total: Total) {
            self.totals.lock().unwrap().push(total);
        }

        fn advance(&self, delta: u64) {
            self.advanced.fetch_add(delta, Ordering::SeqCst);
        }
    }

    fn build_zip() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().unix_permissions(0o755);
        writer.add_directory("app/", options).unwrap();
        writer.start_file("app/bin/run", options).unwrap();
        writer.write_all(b"#!/bin/sh\necho hi\n").unwrap();
        writer
            .start_file("app/notes.txt", options.unix_permissions(0o644))
            .unwrap();
        writer.write_all(b"notes").unwrap();
        writer.add_symlink("app/bin/alias", "run", options).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_counts_every_entry() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("app.zip");
        fs::write(&archive, build_zip()).unwrap();
        let root = temp_dir.path().join("root");

        let plan = DestinationPlan::new(&root).strip(1);
        let options = InstallOptions::default();
        let recorder = Arc::new(Recorder::default());
        let progress: Arc<dyn Progress> = recorder.clone();
        let ctx = ExtractContext {
            root: &root,
            plan: &plan,
            options: &options,
            progress: &progress,
        };
        ZipExtractor
            .extract(sniff::detect(&archive).unwrap(), &ctx)
            .unwrap();

        assert_eq!(*recorder.totals.lock().unwrap(), vec![Total::Items(4)]);
        assert_eq!(recorder.advanced.load(Ordering::SeqCst), 4);
        assert_eq!(
            fs::read(root.join("bin/run")).unwrap(),
            b"#!/bin/sh\necho hi\n"
        );
        assert_eq!(fs::read(root.join("notes.txt")).unwrap(), b"notes");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(root.join("bin/run")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
            assert_eq!(
                fs::read_link(root.join("bin/alias")).unwrap(),
                PathBuf::from("run")
            );
        }
    }

    #[test]
    fn test_dos_timestamp_conversion() {
        let dt = zip::DateTime::from_date_and_time(2020, 9, 13, 12, 26, 40).unwrap();
        assert_eq!(dos_to_unix(dt), Some(1_600_000_000));
    }
}
