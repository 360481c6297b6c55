//! Raw executables are installed as a single file

use super::extractor::{write_file, Entry, EntryKind, ExtractContext, Extractor, Outcome};
use crate::plan::DestinationPlan;
use crate::sniff::{ArchiveSource, Compression};
use crate::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Installs a bare executable as `<dest>/<name>`
pub struct ExecutableExtractor;

impl Extractor for ExecutableExtractor {
    fn format_name(&self) -> &'static str {
        "executable"
    }

    fn extract(&self, source: ArchiveSource, ctx: &ExtractContext<'_>) -> Result<Outcome> {
        let name = executable_name(ctx.plan, source.path())?;
        let target = ctx.root.join(&name);
        debug!("Installing executable {:?} as {:?}", source.path(), target);

        let mut entry = Entry::new(name, EntryKind::File);
        entry.mode = 0o700;
        entry.size = source.size();
        write_file(&target, &entry, &mut source.into_reader())?;
        Ok(Outcome::Extracted)
    }
}

/// Name the executable after its published source, minus any compression suffix
pub fn executable_name(plan: &DestinationPlan, source: &Path) -> Result<String> {
    let base = plan
        .source
        .as_deref()
        .map(Path::new)
        .unwrap_or(source)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(format!("cannot name executable from {:?}", source)))?;

    let trimmed = [
        Compression::Gzip,
        Compression::Bzip2,
        Compression::Xz,
        Compression::Zstd,
    ]
    .iter()
    .filter_map(|c| c.extension())
    .find_map(|ext| {
        base.strip_suffix(ext)
            .and_then(|stem| stem.strip_suffix('.'))
            .filter(|stem| !stem.is_empty())
    })
    .unwrap_or(base.as_str());

    Ok(trimmed.to_string())
}
