use kiln_core::progress::{Progress, Total};
use kiln_core::{install, DestinationPlan, Error, InstallOptions, InstallSession};
use kiln_testing::assertions::{assert_file_content, list_tree, staging_leftovers};
use kiln_testing::fixtures::{self, SevenZFixture, TarFixture, ZipFixture};
use kiln_testing::TestDir;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[cfg(unix)]
use kiln_testing::assertions::{assert_file_permissions, assert_read_only_tree};

fn readme_and_tool() -> Vec<u8> {
    TarFixture::new()
        .file("pkg/bin/tool", 0o755, b"#!/bin/sh\necho tool\n")
        .unwrap()
        .file("pkg/README", 0o644, b"read me\n")
        .unwrap()
        .build()
        .unwrap()
}

#[test]
fn test_tar_gz_with_strip() {
    let test_dir = TestDir::new().unwrap();
    let archive = test_dir
        .create_file("a.tar.gz", &fixtures::gzip(&readme_and_tool()).unwrap())
        .unwrap();
    let dest = test_dir.join("out");

    install(&archive, &DestinationPlan::new(&dest).strip(1)).unwrap();

    assert_eq!(list_tree(&dest).unwrap(), vec!["README", "bin", "bin/tool"]);
    assert_file_content(&dest, "bin/tool", b"#!/bin/sh\necho tool\n").unwrap();
    assert_file_content(&dest, "README", b"read me\n").unwrap();
    assert!(staging_leftovers(test_dir.path(), "out").unwrap().is_empty());

    #[cfg(unix)]
    {
        // owner keeps read and execute, everything else is gone
        assert_file_permissions(&dest.join("bin/tool"), 0o500).unwrap();
        assert_file_permissions(&dest.join("README"), 0o400).unwrap();
        assert_read_only_tree(&dest).unwrap();
    }
}

#[test]
fn test_every_compression_wrapper() {
    let tar = readme_and_tool();
    let wrapped = [
        ("plain.tar", tar.clone()),
        ("pkg.tar.bz2", fixtures::bzip2(&tar).unwrap()),
        ("pkg.tar.xz", fixtures::xz(&tar).unwrap()),
        ("pkg.tar.zst", fixtures::zstd(&tar).unwrap()),
    ];

    let test_dir = TestDir::new().unwrap();
    for (name, bytes) in wrapped {
        let archive = test_dir.create_file(name, &bytes).unwrap();
        let dest = test_dir.join(&format!("{}-installed", name.replace('.', "_")));
        install(&archive, &DestinationPlan::new(&dest).strip(1)).unwrap();
        assert_file_content(&dest, "bin/tool", b"#!/bin/sh\necho tool\n").unwrap();
    }
}

#[test]
fn test_zip_install() {
    let test_dir = TestDir::new().unwrap();
    let bytes = ZipFixture::new()
        .dir("app/")
        .unwrap()
        .file("app/bin/run", 0o755, b"run")
        .unwrap()
        .file("app/lib/data.bin", 0o644, &[0u8, 1, 2, 3])
        .unwrap()
        .build()
        .unwrap();
    let archive = test_dir.create_file("app.zip", &bytes).unwrap();
    let dest = test_dir.join("app");

    install(&archive, &DestinationPlan::new(&dest).strip(1)).unwrap();

    assert_eq!(
        list_tree(&dest).unwrap(),
        vec!["bin", "bin/run", "lib", "lib/data.bin"]
    );
    assert_file_content(&dest, "lib/data.bin", &[0, 1, 2, 3]).unwrap();
}

#[derive(Default)]
struct Recorder {
    totals: Mutex<Vec<Total>>,
    advanced: AtomicU64,
    finished: AtomicU64,
}

impl Progress for Recorder {
    fn begin(&self, total: Total) {
        self.totals.lock().unwrap().push(total);
    }

    fn advance(&self, delta: u64) {
        self.advanced.fetch_add(delta, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_zip_reports_one_increment_per_entry() {
    let test_dir = TestDir::new().unwrap();
    let bytes = ZipFixture::new()
        .dir("top/")
        .unwrap()
        .file("top/a", 0o644, b"a")
        .unwrap()
        .file("top/b", 0o644, b"b")
        .unwrap()
        .file("top/c/d", 0o644, b"d")
        .unwrap()
        .build()
        .unwrap();
    let archive = test_dir.create_file("four.zip", &bytes).unwrap();
    let dest = test_dir.join("four");

    let recorder = Arc::new(Recorder::default());
    let plan = DestinationPlan::new(&dest).strip(1);
    InstallSession::new(&plan)
        .with_progress(recorder.clone())
        .install(&archive)
        .unwrap();

    let totals = recorder.totals.lock().unwrap().clone();
    assert_eq!(
        totals,
        vec![Total::Bytes(bytes.len() as u64), Total::Items(4)]
    );
    assert_eq!(recorder.advanced.load(Ordering::SeqCst), 4);
    assert_eq!(recorder.finished.load(Ordering::SeqCst), 1);
    // "top/" is stripped away entirely
    assert_eq!(list_tree(&dest).unwrap(), vec!["a", "b", "c", "c/d"]);
}

#[test]
fn test_tar_reports_bytes() {
    let test_dir = TestDir::new().unwrap();
    let tar = TarFixture::new()
        .file("big.bin", 0o644, &vec![42u8; 256 * 1024])
        .unwrap()
        .build()
        .unwrap();
    let archive = test_dir.create_file("big.tar", &tar).unwrap();
    let dest = test_dir.join("big");

    let recorder = Arc::new(Recorder::default());
    let plan = DestinationPlan::new(&dest);
    InstallSession::new(&plan)
        .with_progress(recorder.clone())
        .install(&archive)
        .unwrap();

    assert_eq!(
        *recorder.totals.lock().unwrap(),
        vec![Total::Bytes(tar.len() as u64)]
    );
    let advanced = recorder.advanced.load(Ordering::SeqCst);
    assert!(advanced >= 256 * 1024 && advanced <= tar.len() as u64);
}

#[cfg(unix)]
#[test]
fn test_tar_links() {
    let test_dir = TestDir::new().unwrap();
    let tar = TarFixture::new()
        .file("pkg/lib/libz.so.1.3", 0o755, b"shared object")
        .unwrap()
        .symlink("pkg/lib/libz.so.1", "libz.so.1.3")
        .unwrap()
        .hardlink("pkg/bin/libz-copy", "pkg/lib/libz.so.1.3")
        .unwrap()
        .build()
        .unwrap();
    let archive = test_dir.create_file("links.tar", &tar).unwrap();
    let dest = test_dir.join("links");

    install(&archive, &DestinationPlan::new(&dest).strip(1)).unwrap();

    assert_eq!(
        fs::read_link(dest.join("lib/libz.so.1")).unwrap(),
        std::path::Path::new("libz.so.1.3")
    );
    assert_eq!(
        fs::read_link(dest.join("bin/libz-copy")).unwrap(),
        std::path::Path::new("../lib/libz.so.1.3")
    );
    assert_eq!(fs::read(dest.join("bin/libz-copy")).unwrap(), b"shared object");
    // the link target kept its permissions; the links themselves were not chmodded through
    assert_file_permissions(&dest.join("lib/libz.so.1.3"), 0o500).unwrap();
}

#[test]
fn test_renames_relative_to_package_root() {
    let test_dir = TestDir::new().unwrap();
    let archive = test_dir
        .create_file("sample.tar", &fixtures::sample_package().unwrap())
        .unwrap();
    let dest = test_dir.join("sample");

    let plan = DestinationPlan::new(&dest)
        .strip(1)
        .root(dest.join("share"))
        .rename("doc/README", "doc/README.md");
    install(&archive, &plan).unwrap();

    assert!(!dest.join("share/doc/README").exists());
    assert_file_content(&dest, "share/doc/README.md", b"read me\n").unwrap();
}

#[test]
fn test_plan_loaded_from_toml() {
    let test_dir = TestDir::new().unwrap();
    let archive = test_dir
        .create_file("sample.tgz", &fixtures::gzip(&fixtures::sample_package().unwrap()).unwrap())
        .unwrap();
    let dest = test_dir.join("from-toml");
    let plan_file = test_dir
        .create_file(
            "plan.toml",
            format!(
                "dest = {:?}\nstrip = 1\n\n[rename]\n\"bin/tool\" = \"bin/renamed\"\n",
                dest.to_str().unwrap()
            )
            .as_bytes(),
        )
        .unwrap();

    let plan = DestinationPlan::load(&plan_file).unwrap();
    install(&archive, &plan).unwrap();

    assert_file_content(&dest, "bin/renamed", b"#!/bin/sh\necho tool\n").unwrap();
}

#[test]
fn test_deb_payload_is_installed() {
    let test_dir = TestDir::new().unwrap();
    let payload = fixtures::xz(&fixtures::sample_package().unwrap()).unwrap();
    let archive = test_dir
        .create_file("tool_1.0_amd64.deb", &fixtures::deb("data.tar.xz", &payload).unwrap())
        .unwrap();
    let dest = test_dir.join("tool");

    install(&archive, &DestinationPlan::new(&dest).strip(1)).unwrap();

    assert_file_content(&dest, "bin/tool", b"#!/bin/sh\necho tool\n").unwrap();
    assert_file_content(&dest, "share/doc/README", b"read me\n").unwrap();
    // neither the outer nor the nested session left a staging area
    assert!(staging_leftovers(test_dir.path(), "tool").unwrap().is_empty());
    #[cfg(unix)]
    assert_read_only_tree(&dest).unwrap();
}

#[test]
fn test_deb_renames_apply_once() {
    let test_dir = TestDir::new().unwrap();
    let payload = fixtures::gzip(&fixtures::sample_package().unwrap()).unwrap();
    let archive = test_dir
        .create_file("tool.deb", &fixtures::deb("data.tar.gz", &payload).unwrap())
        .unwrap();
    let dest = test_dir.join("tool");

    let plan = DestinationPlan::new(&dest)
        .strip(1)
        .rename("bin/tool", "bin/tool-1.0");
    install(&archive, &plan).unwrap();

    assert_eq!(
        list_tree(&dest.join("bin")).unwrap(),
        vec!["tool-1.0"]
    );
}

#[test]
fn test_deb_nesting_limit() {
    let test_dir = TestDir::new().unwrap();
    let payload = fixtures::sample_package().unwrap();
    let archive = test_dir
        .create_file("tool.deb", &fixtures::deb("data.tar", &payload).unwrap())
        .unwrap();
    let dest = test_dir.join("tool");

    let plan = DestinationPlan::new(&dest).strip(1);
    let err = InstallSession::new(&plan)
        .with_options(InstallOptions {
            max_nesting: 0,
            ..Default::default()
        })
        .install(&archive)
        .unwrap_err();

    assert!(matches!(err, Error::NestingTooDeep { depth: 1, limit: 0, .. }));
    assert!(!dest.exists());
    assert!(staging_leftovers(test_dir.path(), "tool").unwrap().is_empty());
}

#[test]
fn test_deb_without_payload() {
    let test_dir = TestDir::new().unwrap();
    let archive = test_dir
        .create_file("empty.deb", &fixtures::deb("other.tar", b"").unwrap())
        .unwrap();
    let dest = test_dir.join("empty");

    let err = install(&archive, &DestinationPlan::new(&dest)).unwrap_err();
    assert!(matches!(err, Error::Archive { format: "deb", .. }));
    assert!(!dest.exists());
}

#[test]
fn test_raw_executable() {
    let test_dir = TestDir::new().unwrap();
    let mut elf = b"\x7fELF\x02\x01\x01\x00".to_vec();
    elf.extend_from_slice(&[0u8; 120]);
    let archive = test_dir
        .create_file("mytool-linux-amd64.gz", &fixtures::gzip(&elf).unwrap())
        .unwrap();
    let dest = test_dir.join("mytool");

    install(&archive, &DestinationPlan::new(&dest)).unwrap();

    assert_eq!(list_tree(&dest).unwrap(), vec!["mytool-linux-amd64"]);
    assert_file_content(&dest, "mytool-linux-amd64", &elf).unwrap();
    #[cfg(unix)]
    assert_file_permissions(&dest.join("mytool-linux-amd64"), 0o500).unwrap();
}

#[test]
fn test_raw_executable_named_after_plan_source() {
    let test_dir = TestDir::new().unwrap();
    let mut elf = b"\x7fELF\x02\x01\x01\x00".to_vec();
    elf.extend_from_slice(&[0u8; 56]);
    let archive = test_dir.create_file("download-3f9a", &elf).unwrap();
    let dest = test_dir.join("jq");

    let plan = DestinationPlan::new(&dest).source("https://example.com/jq-linux64");
    install(&archive, &plan).unwrap();

    assert_eq!(list_tree(&dest).unwrap(), vec!["jq-linux64"]);
}

#[test]
fn test_relative_destination_parent_is_created() {
    let test_dir = TestDir::new().unwrap();
    let archive = test_dir
        .create_file("sample.tar", &fixtures::sample_package().unwrap())
        .unwrap();
    let dest = test_dir.join("deeply/nested/parent/sample");

    install(&archive, &DestinationPlan::new(&dest).strip(1)).unwrap();
    assert_file_content(&dest, "share/doc/README", b"read me\n").unwrap();
}

#[test]
fn test_sevenz_install_both_layouts() {
    let fixture = || {
        SevenZFixture::new()
            .dir("tool-1.0")
            .file("tool-1.0/bin/run", 0o755, b"#!/bin/sh\necho run\n")
            .file("tool-1.0/share/doc/README", 0o644, b"read me\n")
    };
    let layouts = [
        ("separate.7z", fixture().build().unwrap()),
        ("solid.7z", fixture().build_solid().unwrap()),
    ];

    let test_dir = TestDir::new().unwrap();
    for (name, bytes) in layouts {
        let archive = test_dir.create_file(name, &bytes).unwrap();
        let dest = test_dir.join(&name.replace('.', "_"));

        install(&archive, &DestinationPlan::new(&dest).strip(1)).unwrap();

        assert_eq!(
            list_tree(&dest).unwrap(),
            vec!["bin", "bin/run", "share", "share/doc", "share/doc/README"]
        );
        assert_file_content(&dest, "bin/run", b"#!/bin/sh\necho run\n").unwrap();
        assert_file_content(&dest, "share/doc/README", b"read me\n").unwrap();

        #[cfg(unix)]
        {
            assert_file_permissions(&dest.join("bin/run"), 0o500).unwrap();
            assert_file_permissions(&dest.join("share/doc/README"), 0o400).unwrap();
            assert_read_only_tree(&dest).unwrap();
        }
    }
}

#[test]
fn test_sevenz_solid_block_with_skipped_top_level_file() {
    let test_dir = TestDir::new().unwrap();
    let bytes = SevenZFixture::new()
        .file("LICENSE", 0o644, b"top-level file removed by strip")
        .file("pkg/a.txt", 0o644, b"hello-payload")
        .build_solid()
        .unwrap();
    let archive = test_dir.create_file("licensed.7z", &bytes).unwrap();
    let dest = test_dir.join("licensed");

    install(&archive, &DestinationPlan::new(&dest).strip(1)).unwrap();

    assert_eq!(list_tree(&dest).unwrap(), vec!["a.txt"]);
    assert_file_content(&dest, "a.txt", b"hello-payload").unwrap();
}
