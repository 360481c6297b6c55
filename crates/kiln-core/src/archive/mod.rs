//! Archive format extractors

pub mod cpio;
pub mod deb_extractor;
pub mod executable;
pub mod extractor;
pub mod rpm_extractor;
pub mod sevenz_extractor;
pub mod tar_extractor;
pub mod zip_extractor;

pub use extractor::{Entry, EntryKind, ExtractContext, Extractor, Outcome};

use crate::sniff::ContentType;

/// Select the extractor for a sniffed content type.
///
/// Returns `None` for [`ContentType::Unknown`]; the caller reports it.
pub fn extractor_for(content_type: ContentType) -> Option<&'static dyn Extractor> {
    match content_type {
        ContentType::Tar => Some(&tar_extractor::TarExtractor),
        ContentType::Zip => Some(&zip_extractor::ZipExtractor),
        ContentType::SevenZip => Some(&sevenz_extractor::SevenZExtractor),
        ContentType::Deb => Some(&deb_extractor::DebExtractor),
        ContentType::Rpm => Some(&rpm_extractor::RpmExtractor),
        ContentType::Executable => Some(&executable::ExecutableExtractor),
        ContentType::Unknown => None,
    }
}
