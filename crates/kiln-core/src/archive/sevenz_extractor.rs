//! 7z extractor implementation

use super::extractor::{is_symlink_mode, Entry, EntryKind, ExtractContext, Extractor, Outcome};
use crate::error::IoContext;
use crate::progress::Total;
use crate::sniff::ArchiveSource;
use crate::{Error, Result};
use sevenz_rust::{Password, SevenZArchiveEntry, SevenZReader};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::debug;

/// Set in the Windows attributes when the high 16 bits carry a Unix mode
const UNIX_EXTENSION: u32 = 0x8000;

/// Mode given to files whose archive recorded no Unix permissions
const DEFAULT_MODE: u32 = 0o755;

/// Seconds between the Windows FILETIME epoch (1601) and the Unix epoch
const FILETIME_UNIX_OFFSET: i64 = 11_644_473_600;

/// 7z extractor
pub struct SevenZExtractor;

impl Extractor for SevenZExtractor {
    fn format_name(&self) -> &'static str {
        "7z"
    }

    fn extract(&self, source: ArchiveSource, ctx: &ExtractContext<'_>) -> Result<Outcome> {
        debug!("Extracting 7z archive: {:?}", source.path());
        let path = source.path().to_path_buf();
        let file = source.into_random_access()?;
        let len = file.metadata().at("stat", &path)?.len();

        let mut reader = SevenZReader::new(file, len, Password::empty())
            .map_err(|e| Error::archive("7z", e))?;

        // Entries stream out of solid blocks; the count is not known up front
        ctx.progress.begin(Total::Unknown);

        // The reader keeps walking later blocks after a callback declines,
        // so the first error is held and everything after it is skipped
        let mut failure = None;
        let walked = reader.for_each_entries(|archive_entry, data| {
            if failure.is_some() {
                return Ok(false);
            }
            ctx.progress.advance(1);
            match unpack_entry(ctx, archive_entry, data) {
                Ok(()) => Ok(true),
                Err(e) => {
                    failure = Some(e);
                    Ok(false)
                }
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        walked.map_err(|e| Error::archive("7z", e))?;
        Ok(Outcome::Extracted)
    }
}

fn unpack_entry(
    ctx: &ExtractContext<'_>,
    archive_entry: &SevenZArchiveEntry,
    data: &mut dyn Read,
) -> Result<()> {
    let entry = describe(archive_entry, data)?;
    ctx.unpack(&entry, data)?;
    // Entries of a solid block share one decoder; unread bytes would shift the next entry
    io::copy(data, &mut io::sink())?;
    Ok(())
}

fn describe(archive_entry: &SevenZArchiveEntry, data: &mut dyn Read) -> Result<Entry> {
    let mode = unix_mode(archive_entry);

    let kind = if !archive_entry.has_stream {
        EntryKind::EmptyMarker {
            empty_file: !archive_entry.is_directory,
        }
    } else if mode.is_some_and(is_symlink_mode) {
        let mut target = String::new();
        data.read_to_string(&mut target)?;
        EntryKind::Symlink(PathBuf::from(target))
    } else {
        EntryKind::File
    };

    Ok(Entry {
        path: archive_entry.name.clone(),
        size: archive_entry.size,
        mode: mode.unwrap_or(DEFAULT_MODE),
        kind,
        mtime: archive_entry
            .has_last_modified_date
            .then(|| unix_seconds(archive_entry.last_modified_date.to_raw())),
        atime: archive_entry
            .has_access_date
            .then(|| unix_seconds(archive_entry.access_date.to_raw())),
    })
}

/// Unix mode word stored by p7zip-style archivers, if any
fn unix_mode(archive_entry: &SevenZArchiveEntry) -> Option<u32> {
    let attributes = archive_entry.windows_attributes;
    (archive_entry.has_windows_attributes && attributes & UNIX_EXTENSION != 0)
        .then_some(attributes >> 16)
}

/// Convert 100ns ticks since 1601 to Unix seconds
fn unix_seconds(filetime: u64) -> i64 {
    (filetime / 10_000_000) as i64 - FILETIME_UNIX_OFFSET
}
