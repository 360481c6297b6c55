//! Archive fixtures built in memory

use anyhow::Result;
use sevenz_rust::{SeqReader, SevenZArchiveEntry, SevenZWriter, SourceReader};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

/// Builds a tar archive entry by entry
pub struct TarFixture {
    builder: tar::Builder<Vec<u8>>,
}

impl Default for TarFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TarFixture {
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    fn header(kind: tar::EntryType, mode: u32, size: u64) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(kind);
        header.set_mode(mode);
        header.set_size(size);
        header.set_mtime(1_600_000_000);
        header
    }

    /// Add a directory entry
    pub fn dir(mut self, path: &str) -> Result<Self> {
        let mut header = Self::header(tar::EntryType::Directory, 0o755, 0);
        self.builder.append_data(&mut header, path, std::io::empty())?;
        Ok(self)
    }

    /// Add a regular file
    pub fn file(mut self, path: &str, mode: u32, data: &[u8]) -> Result<Self> {
        let mut header = Self::header(tar::EntryType::Regular, mode, data.len() as u64);
        self.builder.append_data(&mut header, path, data)?;
        Ok(self)
    }

    /// Add a symbolic link to `target`
    pub fn symlink(mut self, path: &str, target: &str) -> Result<Self> {
        let mut header = Self::header(tar::EntryType::Symlink, 0o777, 0);
        self.builder.append_link(&mut header, path, target)?;
        Ok(self)
    }

    /// Add a hard link to the archive member `target`
    pub fn hardlink(mut self, path: &str, target: &str) -> Result<Self> {
        let mut header = Self::header(tar::EntryType::Link, 0o644, 0);
        self.builder.append_link(&mut header, path, target)?;
        Ok(self)
    }

    /// Finish the archive
    pub fn build(self) -> Result<Vec<u8>> {
        Ok(self.builder.into_inner()?)
    }
}

/// Builds a ZIP archive entry by entry
pub struct ZipFixture {
    writer: zip::ZipWriter<Cursor<Vec<u8>>>,
}

impl Default for ZipFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipFixture {
    pub fn new() -> Self {
        Self {
            writer: zip::ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Add a directory entry
    pub fn dir(mut self, path: &str) -> Result<Self> {
        self.writer
            .add_directory(path, SimpleFileOptions::default().unix_permissions(0o755))?;
        Ok(self)
    }

    /// Add a deflated file
    pub fn file(mut self, path: &str, mode: u32, data: &[u8]) -> Result<Self> {
        self.writer
            .start_file(path, SimpleFileOptions::default().unix_permissions(mode))?;
        self.writer.write_all(data)?;
        Ok(self)
    }

    /// Add a symbolic link to `target`
    pub fn symlink(mut self, path: &str, target: &str) -> Result<Self> {
        self.writer
            .add_symlink(path, target, SimpleFileOptions::default())?;
        Ok(self)
    }

    /// Finish the archive
    pub fn build(self) -> Result<Vec<u8>> {
        Ok(self.writer.finish()?.into_inner())
    }
}

/// Builds a 7z archive with p7zip-style Unix modes in the attributes
///
/// Entries are collected first so `build` and `build_solid` can lay the
/// same contents out as one block per file or as a single solid block.
#[derive(Default)]
pub struct SevenZFixture {
    entries: Vec<(SevenZArchiveEntry, Vec<u8>)>,
}

impl SevenZFixture {
    /// Windows attribute bit announcing a Unix mode in the high 16 bits
    const UNIX_EXTENSION: u32 = 0x8000;

    pub fn new() -> Self {
        Self::default()
    }

    fn entry(path: &str, mode: u32, attributes: u32) -> SevenZArchiveEntry {
        let mut entry = SevenZArchiveEntry::new();
        entry.name = path.to_string();
        entry.has_windows_attributes = true;
        entry.windows_attributes = (mode << 16) | Self::UNIX_EXTENSION | attributes;
        entry
    }

    /// Add a directory entry
    pub fn dir(mut self, path: &str) -> Self {
        let mut entry = Self::entry(path, 0o040755, 0x10);
        entry.is_directory = true;
        self.entries.push((entry, Vec::new()));
        self
    }

    /// Add a regular file with permission bits `mode`
    pub fn file(mut self, path: &str, mode: u32, data: &[u8]) -> Self {
        let entry = Self::entry(path, 0o100000 | (mode & 0o7777), 0x20);
        self.entries.push((entry, data.to_vec()));
        self
    }

    /// Finish the archive with every file compressed on its own
    pub fn build(self) -> Result<Vec<u8>> {
        let mut writer = SevenZWriter::new(Cursor::new(Vec::new()))?;
        for (entry, data) in self.entries {
            let reader = (!entry.is_directory && !data.is_empty()).then_some(&data[..]);
            writer.push_archive_entry(entry, reader)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Finish the archive with all non-empty files in one solid block
    pub fn build_solid(self) -> Result<Vec<u8>> {
        let mut writer = SevenZWriter::new(Cursor::new(Vec::new()))?;
        let mut solid = Vec::new();
        let mut readers = Vec::new();
        for (mut entry, data) in self.entries {
            if entry.is_directory || data.is_empty() {
                writer.push_archive_entry(entry, None::<&[u8]>)?;
            } else {
                entry.has_stream = true;
                solid.push(entry);
                readers.push(SourceReader::new(Cursor::new(data)));
            }
        }
        if !solid.is_empty() {
            writer.push_archive_entries(solid, SeqReader::new(readers))?;
        }
        Ok(writer.finish()?.into_inner())
    }
}

/// Wrap `data_member` (named e.g. `data.tar.gz`) in a minimal Debian package
pub fn deb(data_name: &str, data_member: &[u8]) -> Result<Vec<u8>> {
    let control = gzip(
        &TarFixture::new()
            .file("./control", 0o644, b"Package: fixture\nVersion: 1.0\n")?
            .build()?,
    )?;

    let mut builder = ar::Builder::new(Vec::new());
    for (name, data) in [
        ("debian-binary", &b"2.0\n"[..]),
        ("control.tar.gz", &control[..]),
        (data_name, data_member),
    ] {
        let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
        builder.append(&header, data)?;
    }
    Ok(builder.into_inner()?)
}

/// gzip-compress `data`
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// bzip2-compress `data`
pub fn bzip2(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// xz-compress `data`
pub fn xz(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// zstd-compress `data`
pub fn zstd(data: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::stream::encode_all(data, 3)?)
}

/// The package used throughout the docs: `pkg/bin/tool` and `pkg/share/doc/README`
pub fn sample_package() -> Result<Vec<u8>> {
    TarFixture::new()
        .dir("pkg/")?
        .dir("pkg/bin/")?
        .file("pkg/bin/tool", 0o755, b"#!/bin/sh\necho tool\n")?
        .file("pkg/share/doc/README", 0o644, b"read me\n")?
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sevenz_rust::{Password, SevenZReader};
    use std::io::Read;

    #[test]
    fn test_tar_fixture_round_trips_through_tar_crate() {
        let bytes = sample_package().unwrap();
        let mut archive = tar::Archive::new(&bytes[..]);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 4);
        assert_eq!(names[2], "pkg/bin/tool");
        assert_eq!(names[3], "pkg/share/doc/README");
    }

    #[test]
    fn test_deb_starts_with_debian_binary() {
        let bytes = deb("data.tar", &sample_package().unwrap()).unwrap();
        assert!(bytes.starts_with(b"!<arch>\ndebian-binary"));
    }

    #[test]
    fn test_compressors() {
        let data = b"some payload";
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(&gzip(data).unwrap()[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, data);
        assert!(bzip2(data).unwrap().starts_with(b"BZh"));
        assert!(xz(data).unwrap().starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0]));
        assert!(zstd(data).unwrap().starts_with(&[0x28, 0xb5, 0x2f, 0xfd]));
    }

    #[test]
    fn test_sevenz_fixture_layouts() {
        let fixture = || {
            SevenZFixture::new()
                .dir("pkg")
                .file("pkg/a.txt", 0o644, b"alpha")
                .file("pkg/b.txt", 0o600, b"beta")
        };
        for bytes in [fixture().build().unwrap(), fixture().build_solid().unwrap()] {
            assert!(bytes.starts_with(&[b'7', b'z', 0xbc, 0xaf, 0x27, 0x1c]));

            let len = bytes.len() as u64;
            let mut reader = SevenZReader::new(Cursor::new(bytes), len, Password::empty()).unwrap();
            let mut seen = Vec::new();
            reader
                .for_each_entries(|entry, data| {
                    let mut content = Vec::new();
                    data.read_to_end(&mut content).unwrap();
                    let mode = entry.windows_attributes >> 16;
                    seen.push((entry.name().to_string(), mode, content));
                    Ok(true)
                })
                .unwrap();
            seen.sort();
            assert_eq!(
                seen,
                vec![
                    ("pkg".to_string(), 0o040755, Vec::new()),
                    ("pkg/a.txt".to_string(), 0o100644, b"alpha".to_vec()),
                    ("pkg/b.txt".to_string(), 0o100600, b"beta".to_vec()),
                ]
            );
        }
    }
}
