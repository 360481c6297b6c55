//! macOS disk images
//!
//! The image is attached with `hdiutil`, each requested application bundle is
//! copied out with `rsync`, and the image is detached again however the
//! install ends.

use super::command;
use crate::archive::extractor::{create_private_dir, symlink};
use crate::error::IoContext;
use crate::plan::DestinationPlan;
use crate::session::InstallOptions;
use crate::{Error, Result};
use quick_xml::events::Event;
use quick_xml::escape::unescape;
use quick_xml::Reader;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// A volume reported by `hdiutil attach`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedVolume {
    pub dev_entry: String,
    pub mount_point: PathBuf,
}

/// Detaches the volume when dropped
struct Detach(String);

impl Drop for Detach {
    fn drop(&mut self) {
        trace!("hdiutil detach {}", self.0);
        if let Err(e) = command::run("hdiutil", ["detach", self.0.as_str()]) {
            warn!("Failed to detach {}: {}", self.0, e);
        }
    }
}

/// Removes a directory tree when dropped, if it still exists
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if fs::symlink_metadata(&self.0).is_ok() {
            let _ = fs::remove_dir_all(&self.0);
        }
    }
}

/// Copy the plan's applications out of the disk image at `source`
pub fn install(source: &Path, plan: &DestinationPlan, options: &InstallOptions) -> Result<()> {
    if plan.apps.is_empty() {
        return Err(Error::Config(format!(
            "install plan for disk image {:?} lists no apps",
            source
        )));
    }
    let applications = options.applications_dir()?;

    let mut work = plan.dest.clone().into_os_string();
    work.push("~");
    let work = PathBuf::from(work);
    create_private_dir(&work)?;
    let _cleanup = RemoveOnDrop(work.clone());

    let plist = command::capture(
        "hdiutil",
        [OsStr::new("attach"), OsStr::new("-plist"), source.as_os_str()],
    )?;
    let volume = parse_attach_plist(&String::from_utf8_lossy(&plist))?
        .into_iter()
        .next()
        .ok_or_else(|| {
            Error::archive(
                "dmg",
                "couldn't determine volume information from hdiutil attach, volume may still be mounted",
            )
        })?;
    debug!("Attached {:?} at {:?}", volume.dev_entry, volume.mount_point);
    let _detach = Detach(volume.dev_entry.clone());

    fs::create_dir_all(&applications).at("mkdir", &applications)?;
    for app in &plan.apps {
        let base = app
            .file_name()
            .ok_or_else(|| Error::InvalidPath(format!("app {:?} has no name", app)))?;

        // Trailing slashes make rsync copy the bundle's contents
        let mut from = OsString::from(volume.mount_point.join(app));
        from.push("/");
        let mut to = OsString::from(work.join(base));
        to.push("/");
        command::run("rsync", [OsStr::new("-av"), from.as_os_str(), to.as_os_str()])?;

        let link = applications.join(base);
        symlink(&plan.dest.join(base), &link)?;
    }

    fs::rename(&work, &plan.dest).at("rename", &work)
}

#[derive(Default)]
struct DictState {
    key: Option<String>,
    dev_entry: Option<String>,
    mount_point: Option<String>,
}

/// Extract the mounted volumes from `hdiutil attach -plist` output.
///
/// Every dictionary holding both a `dev-entry` and a `mount-point` string is
/// returned, in document order.
pub fn parse_attach_plist(xml: &str) -> Result<Vec<AttachedVolume>> {
    let plist_error = |e: &dyn std::fmt::Display| Error::archive("plist", e);

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<DictState> = Vec::new();
    let mut volumes = Vec::new();
    loop {
        match reader.read_event().map_err(|e| plist_error(&e))? {
            Event::Start(e) => match e.name().as_ref() {
                b"dict" => {
                    if let Some(parent) = stack.last_mut() {
                        parent.key = None;
                    }
                    stack.push(DictState::default());
                }
                b"key" => {
                    let text = reader.read_text(e.name()).map_err(|e| plist_error(&e))?;
                    let key = unescape(&text).map_err(|e| plist_error(&e))?.into_owned();
                    if let Some(dict) = stack.last_mut() {
                        dict.key = Some(key);
                    }
                }
                b"string" => {
                    let text = reader.read_text(e.name()).map_err(|e| plist_error(&e))?;
                    let value = unescape(&text).map_err(|e| plist_error(&e))?.into_owned();
                    if let Some(dict) = stack.last_mut() {
                        match dict.key.take().as_deref() {
                            Some("dev-entry") => dict.dev_entry = Some(value),
                            Some("mount-point") => dict.mount_point = Some(value),
                            _ => {}
                        }
                    }
                }
                _ => {
                    if let Some(dict) = stack.last_mut() {
                        dict.key = None;
                    }
                }
            },
            Event::End(e) if e.name().as_ref() == b"dict" => {
                if let Some(DictState {
                    dev_entry: Some(dev_entry),
                    mount_point: Some(mount_point),
                    ..
                }) = stack.pop()
                {
                    volumes.push(AttachedVolume {
                        dev_entry,
                        mount_point: PathBuf::from(mount_point),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(volumes)
}
