//! Content type detection that sees through one layer of compression

use crate::error::IoContext;
use crate::progress::{NoProgress, Progress, ProgressReader};
use crate::{Error, Result};
use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use xz2::read::XzDecoder;
use zstd::stream::read::Decoder as ZstdDecoder;

/// Number of leading bytes inspected when classifying a stream
pub const SNIFF_LEN: usize = 4096;

/// Compression wrapper around an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Not compressed
    None,
    /// gzip (.gz)
    Gzip,
    /// bzip2 (.bz2)
    Bzip2,
    /// xz (.xz)
    Xz,
    /// Zstandard (.zst)
    Zstd,
}

impl Compression {
    /// Detect a compression wrapper from magic bytes
    pub fn detect(head: &[u8]) -> Self {
        if head.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if head.starts_with(b"BZh") {
            Self::Bzip2
        } else if head.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Self::Xz
        } else if head.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Wrap `reader` in the matching decoder
    pub fn decoder<'a, R: Read + 'a>(self, reader: R) -> io::Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::None => Box::new(reader),
            Self::Gzip => Box::new(MultiGzDecoder::new(reader)),
            Self::Bzip2 => Box::new(BzDecoder::new(reader)),
            Self::Xz => Box::new(XzDecoder::new(reader)),
            Self::Zstd => Box::new(ZstdDecoder::new(reader)?),
        })
    }

    /// File extension conventionally used for this wrapper
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gzip => Some("gz"),
            Self::Bzip2 => Some("bz2"),
            Self::Xz => Some("xz"),
            Self::Zstd => Some("zst"),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "uncompressed",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        };
        f.write_str(name)
    }
}

/// The innermost kind of a source file, after any compression is peeled off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Tar,
    Zip,
    SevenZip,
    Deb,
    Rpm,
    Executable,
    Unknown,
}

impl ContentType {
    /// Classify a byte prefix
    pub fn detect(head: &[u8]) -> Self {
        if head.starts_with(b"PK\x03\x04")
            || head.starts_with(b"PK\x05\x06")
            || head.starts_with(b"PK\x07\x08")
        {
            Self::Zip
        } else if head.starts_with(&[b'7', b'z', 0xbc, 0xaf, 0x27, 0x1c]) {
            Self::SevenZip
        } else if head.starts_with(b"!<arch>\ndebian") {
            Self::Deb
        } else if head.starts_with(&[0xed, 0xab, 0xee, 0xdb]) {
            Self::Rpm
        } else if is_executable(head) {
            Self::Executable
        } else if is_tar(head) {
            Self::Tar
        } else {
            Self::Unknown
        }
    }

    /// MIME-like name for display and error messages
    pub fn mime(self) -> &'static str {
        match self {
            Self::Tar => "application/x-tar",
            Self::Zip => "application/zip",
            Self::SevenZip => "application/x-7z-compressed",
            Self::Deb => "application/vnd.debian.binary-package",
            Self::Rpm => "application/x-rpm",
            Self::Executable => "application/x-executable",
            Self::Unknown => "application/octet-stream",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

fn is_executable(head: &[u8]) -> bool {
    const MACHO: [[u8; 4]; 4] = [
        [0xfe, 0xed, 0xfa, 0xce],
        [0xfe, 0xed, 0xfa, 0xcf],
        [0xce, 0xfa, 0xed, 0xfe],
        [0xcf, 0xfa, 0xed, 0xfe],
    ];

    if head.starts_with(b"\x7fELF") || MACHO.iter().any(|magic| head.starts_with(magic)) {
        return true;
    }

    // Universal binaries share 0xcafebabe with Java classes; the class file
    // version sits where the fat header keeps a small architecture count.
    if head.len() >= 8 && head.starts_with(&[0xca, 0xfe, 0xba, 0xbe]) {
        let arch_count = u32::from_be_bytes([head[4], head[5], head[6], head[7]]);
        return arch_count > 0 && arch_count < 20;
    }

    if head.len() >= 0x40 && head.starts_with(b"MZ") {
        let pe_offset = u32::from_le_bytes([head[0x3c], head[0x3d], head[0x3e], head[0x3f]]);
        let pe_offset = pe_offset as usize;
        return head
            .get(pe_offset..pe_offset + 4)
            .is_some_and(|sig| sig == b"PE\0\0");
    }

    false
}

fn is_tar(head: &[u8]) -> bool {
    if head.len() < 512 {
        return false;
    }
    if &head[257..262] == b"ustar" {
        return true;
    }

    // Pre-POSIX headers carry no magic, only a checksum over the block with
    // the checksum field itself counted as spaces.
    let recorded = std::str::from_utf8(&head[148..156])
        .ok()
        .map(|field| field.trim_matches(|c: char| c == '\0' || c == ' '))
        .and_then(|field| u32::from_str_radix(field, 8).ok());
    let Some(recorded) = recorded else {
        return false;
    };
    let computed: u32 = head[..512]
        .iter()
        .enumerate()
        .map(|(i, b)| if (148..156).contains(&i) { 32 } else { *b as u32 })
        .sum();
    recorded == computed && head[0] != 0
}

/// Fill `buf` from `reader` until it is full or the reader is exhausted
fn read_prefix<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

enum Input {
    /// The source file itself, positioned at the start
    Raw(ProgressReader<File>),
    /// Decoded bytes: the sniffed prefix followed by the rest of the decoder
    Decoded(Box<dyn Read>),
}

/// An opened source file together with its detected content type
pub struct ArchiveSource {
    path: PathBuf,
    size: u64,
    content_type: ContentType,
    compression: Compression,
    input: Input,
}

impl fmt::Debug for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveSource")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .field("compression", &self.compression)
            .finish()
    }
}

impl ArchiveSource {
    /// Path of the source file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the source file on disk
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Innermost content type
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Compression wrapper that was peeled off, if any
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Sequential reader over the decompressed content
    pub fn into_reader(self) -> Box<dyn Read> {
        match self.input {
            Input::Raw(reader) => Box::new(reader),
            Input::Decoded(reader) => reader,
        }
    }

    /// Seekable handle over the decompressed content.
    ///
    /// Uncompressed sources hand back the file itself without progress
    /// accounting. Decoded content is spooled to an anonymous temporary file.
    pub fn into_random_access(self) -> Result<File> {
        match self.input {
            Input::Raw(reader) => {
                let mut file = reader.into_inner();
                file.seek(SeekFrom::Start(0)).at("seek", &self.path)?;
                Ok(file)
            }
            Input::Decoded(mut reader) => {
                debug!(
                    path = ?self.path,
                    compression = %self.compression,
                    "Spooling decoded archive for random access"
                );
                let mut spool = tempfile::tempfile()?;
                io::copy(&mut reader, &mut spool).at("decompress", &self.path)?;
                spool.seek(SeekFrom::Start(0))?;
                Ok(spool)
            }
        }
    }
}

/// Detect the content type of the file at `path`
pub fn detect(path: &Path) -> Result<ArchiveSource> {
    detect_with_progress(path, Arc::new(NoProgress))
}

/// Detect the content type of the file at `path`, counting raw bytes read into `progress`
pub fn detect_with_progress(path: &Path, progress: Arc<dyn Progress>) -> Result<ArchiveSource> {
    let mut file = File::open(path).at("open", path)?;
    let size = file.metadata().at("stat", path)?.len();

    let mut head = vec![0u8; SNIFF_LEN];
    let n = read_prefix(&mut file, &mut head).map_err(|source| Error::Sniff {
        path: path.to_path_buf(),
        source,
    })?;
    head.truncate(n);
    file.seek(SeekFrom::Start(0)).at("seek", path)?;

    let compression = Compression::detect(&head);
    let raw = ProgressReader::new(file, progress);

    if compression == Compression::None {
        let content_type = ContentType::detect(&head);
        debug!(path = ?path, %content_type, "Detected content type");
        return Ok(ArchiveSource {
            path: path.to_path_buf(),
            size,
            content_type,
            compression,
            input: Input::Raw(raw),
        });
    }

    let mut decoder = compression.decoder(raw).map_err(|source| Error::Sniff {
        path: path.to_path_buf(),
        source,
    })?;
    let mut prefix = vec![0u8; SNIFF_LEN];
    let n = read_prefix(&mut decoder, &mut prefix).map_err(|source| Error::Sniff {
        path: path.to_path_buf(),
        source,
    })?;
    if n == 0 {
        return Err(Error::EmptyStream {
            path: path.to_path_buf(),
            compression,
        });
    }
    prefix.truncate(n);

    let content_type = ContentType::detect(&prefix);
    debug!(path = ?path, %compression, %content_type, "Detected compressed content type");

    Ok(ArchiveSource {
        path: path.to_path_buf(),
        size,
        content_type,
        compression,
        input: Input::Decoded(Box::new(Cursor::new(prefix).chain(decoder))),
    })
}
