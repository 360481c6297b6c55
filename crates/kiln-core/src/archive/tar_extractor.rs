//! Tar extractor implementation

use super::extractor::{Entry, EntryKind, ExtractContext, Extractor, Outcome};
use crate::sniff::ArchiveSource;
use crate::{Error, Result};
use std::io::Read;
use tar::{Archive, EntryType};
use tracing::{debug, warn};

/// Tar extractor
///
/// Reads the archive sequentially, so it works unchanged behind any
/// compression wrapper the sniffer peeled off.
pub struct TarExtractor;

impl Extractor for TarExtractor {
    fn format_name(&self) -> &'static str {
        "tar"
    }

    fn extract(&self, source: ArchiveSource, ctx: &ExtractContext<'_>) -> Result<Outcome> {
        debug!("Extracting tar archive: {:?}", source.path());
        let mut archive = Archive::new(source.into_reader());

        for entry in archive.entries().map_err(|e| Error::archive("tar", e))? {
            let mut entry = entry.map_err(|e| Error::archive("tar", e))?;
            let Some(item) = describe(&entry)? else {
                continue;
            };
            ctx.unpack(&item, &mut entry)?;
        }

        Ok(Outcome::Extracted)
    }
}

/// Map a tar header onto an [`Entry`]; `None` for entries that are not installed
fn describe<R: Read>(entry: &tar::Entry<'_, R>) -> Result<Option<Entry>> {
    let header = entry.header();
    let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

    let kind = match header.entry_type() {
        EntryType::Directory => EntryKind::Dir,
        EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => EntryKind::File,
        EntryType::Symlink => {
            let target = entry
                .link_name()
                .map_err(|e| Error::archive("tar", e))?
                .ok_or_else(|| Error::archive("tar", format!("{}: symlink without target", path)))?;
            EntryKind::Symlink(target.into_owned())
        }
        EntryType::Link => {
            let target = entry
                .link_name_bytes()
                .filter(|target| !target.is_empty())
                .ok_or_else(|| {
                    Error::archive("tar", format!("{}: hard link without target", path))
                })?;
            EntryKind::HardLink(String::from_utf8_lossy(&target).into_owned())
        }
        EntryType::XHeader | EntryType::XGlobalHeader => {
            debug!("Skipping pax metadata entry: {}", path);
            return Ok(None);
        }
        other => {
            warn!("Skipping unsupported tar entry {} ({:?})", path, other);
            return Ok(None);
        }
    };

    Ok(Some(Entry {
        path,
        size: entry.size(),
        mode: header.mode().unwrap_or(0o644),
        kind,
        mtime: header.mtime().ok().map(|t| t as i64),
        atime: header
            .as_gnu()
            .and_then(|gnu| gnu.atime().ok())
            .filter(|t| *t != 0)
            .map(|t| t as i64),
    }))
}
