//! macOS installer packages

use super::command;
use crate::archive::extractor::create_private_dir;
use crate::plan::DestinationPlan;
use crate::{Error, Result};
use quick_xml::escape::escape;
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Choice changes that redirect the package's default choice to a custom location
const CHOICE_CHANGES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
  <array>
    <dict>
      <key>choiceAttribute</key>
      <string>customLocation</string>
      <key>attributeSetting</key>
      <string>{dest}</string>
      <key>choiceIdentifier</key>
      <string>default</string>
    </dict>
  </array>
</plist>
"#;

/// Install a `.pkg` into `plan.dest` with the system `installer`
pub fn install(source: &Path, plan: &DestinationPlan) -> Result<()> {
    if plan.strip != 0 {
        return Err(Error::UnsupportedOption(format!(
            "\"strip = {}\" is not supported for macOS installer packages",
            plan.strip
        )));
    }

    create_private_dir(&plan.dest)?;
    let result = run_installer(source, &plan.dest);
    if result.is_err() {
        if let Err(e) = fs::remove_dir_all(&plan.dest) {
            warn!("Failed to remove {:?}: {}", plan.dest, e);
        }
    }
    result
}

fn run_installer(source: &Path, dest: &Path) -> Result<()> {
    let mut changes = tempfile::Builder::new()
        .prefix("kiln-")
        .suffix(".xml")
        .tempfile()?;
    changes.write_all(choice_changes(dest).as_bytes())?;
    changes.flush()?;
    debug!("Wrote installer choice changes to {:?}", changes.path());

    command::run(
        "installer",
        [
            OsStr::new("-verbose"),
            OsStr::new("-pkg"),
            source.as_os_str(),
            OsStr::new("-target"),
            OsStr::new("CurrentUserHomeDirectory"),
            OsStr::new("-applyChoiceChangesXML"),
            changes.path().as_os_str(),
        ],
    )
}

/// Render the choice changes document for `dest`
pub(crate) fn choice_changes(dest: &Path) -> String {
    CHOICE_CHANGES.replace("{dest}", &escape(&*dest.to_string_lossy()))
}
