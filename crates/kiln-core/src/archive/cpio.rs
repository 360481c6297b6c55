//! Streaming reader for cpio "newc" archives, the RPM payload format

use std::io::{self, Read};

const HEADER_LEN: usize = 110;
const MAGIC_NEWC: &[u8] = b"070701";
const MAGIC_CRC: &[u8] = b"070702";
const TRAILER: &str = "TRAILER!!!";

/// Header fields of one cpio member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpioHeader {
    pub name: String,
    pub mode: u32,
    pub size: u64,
    pub mtime: u32,
}

/// Reads cpio members one at a time.
///
/// After [`next_entry`](Self::next_entry) returns a header the reader itself
/// yields that member's data; whatever is left unread is skipped on the
/// next call.
pub struct CpioReader<R> {
    inner: R,
    remaining: u64,
    padding: u64,
}

fn pad4(len: u64) -> u64 {
    (4 - len % 4) % 4
}

fn truncated(e: io::Error) -> io::Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        io::Error::new(io::ErrorKind::UnexpectedEof, "truncated cpio archive")
    } else {
        e
    }
}

impl<R: Read> CpioReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            remaining: 0,
            padding: 0,
        }
    }

    /// Advance to the next member; `None` once the trailer is reached
    pub fn next_entry(&mut self) -> io::Result<Option<CpioHeader>> {
        self.skip_rest()?;

        let mut header = [0u8; HEADER_LEN];
        self.inner.read_exact(&mut header).map_err(truncated)?;

        let magic = &header[..6];
        if magic != MAGIC_NEWC && magic != MAGIC_CRC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid cpio magic {:?}", String::from_utf8_lossy(magic)),
            ));
        }

        let field = |index: usize| -> io::Result<u32> {
            let start = 6 + index * 8;
            std::str::from_utf8(&header[start..start + 8])
                .ok()
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "invalid cpio header field")
                })
        };
        // ino, mode, uid, gid, nlink, mtime, filesize, devmajor, devminor,
        // rdevmajor, rdevminor, namesize, check
        let mode = field(1)?;
        let mtime = field(5)?;
        let size = u64::from(field(6)?);
        let name_len = u64::from(field(11)?);

        let mut name = vec![0u8; name_len as usize];
        self.inner.read_exact(&mut name).map_err(truncated)?;
        if name.last() == Some(&0) {
            name.pop();
        }
        let name = String::from_utf8_lossy(&name).into_owned();
        self.discard(pad4(HEADER_LEN as u64 + name_len))?;

        if name == TRAILER {
            return Ok(None);
        }

        self.remaining = size;
        self.padding = pad4(size);
        Ok(Some(CpioHeader {
            name,
            mode,
            size,
            mtime,
        }))
    }

    fn skip_rest(&mut self) -> io::Result<()> {
        let skip = self.remaining + self.padding;
        self.remaining = 0;
        self.padding = 0;
        self.discard(skip)
    }

    fn discard(&mut self, len: u64) -> io::Result<()> {
        let skipped = io::copy(&mut (&mut self.inner).take(len), &mut io::sink())?;
        if skipped < len {
            return Err(truncated(io::ErrorKind::UnexpectedEof.into()));
        }
        Ok(())
    }
}

impl<R: Read> Read for CpioReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let limit = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.inner.read(&mut buf[..limit])?;
        if n == 0 {
            return Err(truncated(io::ErrorKind::UnexpectedEof.into()));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encode members as a newc archive, trailer included
    pub(crate) fn newc(members: &[(&str, u32, &[u8])]) -> Vec<u8> {
        fn push(out: &mut Vec<u8>, name: &str, mode: u32, data: &[u8]) {
            let fields = [
                1,
                mode,
                0,
                0,
                1,
                1_600_000_000,
                data.len() as u32,
                0,
                0,
                0,
                0,
                name.len() as u32 + 1,
                0,
            ];
            out.extend_from_slice(MAGIC_NEWC);
            for value in fields {
                out.extend_from_slice(format!("{:08x}", value).as_bytes());
            }
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            while out.len() % 4 != 0 {
                out.push(0);
            }
            out.extend_from_slice(data);
            while out.len() % 4 != 0 {
                out.push(0);
            }
        }

        let mut out = Vec::new();
        for (name, mode, data) in members {
            push(&mut out, name, *mode, data);
        }
        push(&mut out, TRAILER, 0, b"");
        out
    }

    #[test]
    fn test_read_members() {
        let bytes = newc(&[
            ("./usr/bin", 0o040755, b""),
            ("./usr/bin/tool", 0o100755, b"hello"),
            ("./usr/bin/link", 0o120777, b"tool"),
        ]);
        let mut reader = CpioReader::new(&bytes[..]);

        let dir = reader.next_entry().unwrap().unwrap();
        assert_eq!(dir.name, "./usr/bin");
        assert_eq!(dir.mode, 0o040755);
        assert_eq!(dir.size, 0);

        let file = reader.next_entry().unwrap().unwrap();
        assert_eq!(file.name, "./usr/bin/tool");
        assert_eq!(file.mtime, 1_600_000_000);
        let mut data = String::new();
        reader.read_to_string(&mut data).unwrap();
        assert_eq!(data, "hello");

        // leave the link target unread; it must be skipped
        let link = reader.next_entry().unwrap().unwrap();
        assert_eq!(link.size, 4);
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_truncated_archive() {
        let bytes = newc(&[("big", 0o100644, &[1u8; 64])]);
        let mut reader = CpioReader::new(&bytes[..140]);
        reader.next_entry().unwrap().unwrap();
        let mut sink = Vec::new();
        let err = reader.read_to_end(&mut sink).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = newc(&[]);
        bytes[..6].copy_from_slice(b"070707");
        let err = CpioReader::new(&bytes[..]).next_entry().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
