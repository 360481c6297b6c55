//! Debian package extractor
//!
//! A `.deb` is an `ar` archive whose `data.tar*` member holds the files to
//! install. That member is itself an archive of any supported type, so it is
//! handed to a nested install session rather than unpacked here.

use super::extractor::{ExtractContext, Extractor, Outcome};
use crate::error::IoContext;
use crate::session::InstallSession;
use crate::sniff::ArchiveSource;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use tracing::{debug, info};

const PAYLOAD_PREFIX: &str = "data.tar";

/// Debian package extractor
pub struct DebExtractor;

impl Extractor for DebExtractor {
    fn format_name(&self) -> &'static str {
        "deb"
    }

    fn extract(&self, source: ArchiveSource, ctx: &ExtractContext<'_>) -> Result<Outcome> {
        let path = source.path().to_path_buf();
        let options = ctx.options.nested(&path)?;

        let mut archive = ar::Archive::new(source.into_reader());
        while let Some(member) = archive.next_entry() {
            let mut member = member.map_err(|e| Error::archive("deb", e))?;
            let identifier = String::from_utf8_lossy(member.header().identifier()).into_owned();
            // GNU ar terminates member names with '/'
            let name = identifier.trim_end_matches('/');
            if !name.starts_with(PAYLOAD_PREFIX) {
                debug!("Skipping deb member {}", name);
                continue;
            }
            let Some(file_name) = Path::new(name).file_name() else {
                continue;
            };

            let payload = ctx.root.join(file_name);
            debug!("Unpacking deb payload {} to {:?}", name, payload);
            let mut out = payload_file(&payload)?;
            io::copy(&mut member, &mut out).at("write", &payload)?;
            drop(out);

            info!(
                "Installing {} payload of {:?} (nesting depth {})",
                name, path, options.depth
            );
            InstallSession::new(ctx.plan)
                .with_progress(ctx.progress.clone())
                .with_options(options)
                .install(&payload)?;
            return Ok(Outcome::Delegated);
        }

        Err(Error::archive(
            "deb",
            format!("{}: no {}* member", path.display(), PAYLOAD_PREFIX),
        ))
    }
}

fn payload_file(path: &Path) -> Result<std::fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).at("create", path)
}
