//! RPM package extractor

use super::cpio::{CpioHeader, CpioReader};
use super::extractor::{is_symlink_mode, Entry, EntryKind, ExtractContext, Extractor, Outcome};
use crate::sniff::{ArchiveSource, Compression};
use crate::{Error, Result};
use std::io::{BufReader, Cursor, Read};
use std::path::PathBuf;
use tracing::debug;

/// RPM package extractor
///
/// The lead, signature and header are parsed by the `rpm` crate; the payload
/// is a compressed cpio archive walked member by member.
pub struct RpmExtractor;

impl Extractor for RpmExtractor {
    fn format_name(&self) -> &'static str {
        "rpm"
    }

    fn extract(&self, source: ArchiveSource, ctx: &ExtractContext<'_>) -> Result<Outcome> {
        debug!("Extracting RPM package: {:?}", source.path());
        let mut reader = BufReader::new(source.into_reader());
        let package = rpm::Package::parse(&mut reader).map_err(|e| Error::archive("rpm", e))?;

        let payload = package.content;
        let compression = Compression::detect(&payload);
        debug!("RPM payload compression: {}", compression);
        let decoder = compression
            .decoder(Cursor::new(payload))
            .map_err(|e| Error::archive("rpm", e))?;

        unpack_payload(CpioReader::new(decoder), ctx)?;
        Ok(Outcome::Extracted)
    }
}

/// Materialize every member of a cpio payload
pub(crate) fn unpack_payload<R: Read>(
    mut cpio: CpioReader<R>,
    ctx: &ExtractContext<'_>,
) -> Result<()> {
    while let Some(header) = cpio.next_entry().map_err(|e| Error::archive("rpm", e))? {
        // Directories and empty files carry no data and are not written
        if header.size == 0 {
            continue;
        }
        let entry = describe(header, &mut cpio)?;
        ctx.unpack(&entry, &mut cpio)?;
    }
    Ok(())
}

fn describe<R: Read>(header: CpioHeader, cpio: &mut CpioReader<R>) -> Result<Entry> {
    let kind = if is_symlink_mode(header.mode) {
        let mut target = String::new();
        cpio.read_to_string(&mut target)
            .map_err(|e| Error::archive("rpm", e))?;
        EntryKind::Symlink(PathBuf::from(target))
    } else {
        EntryKind::File
    };

    Ok(Entry {
        path: header.name,
        size: header.size,
        mode: header.mode,
        kind,
        mtime: Some(i64::from(header.mtime)),
        atime: None,
    })
}
