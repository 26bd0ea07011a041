use std::fs::{self, File};
use std::io::BufWriter;

use anyhow::{Context, Result};
use log::*;

use rezip::read::CompressionMethod;
use rezip::result::ZipError;
use rezip::*;

const VNC_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><title>noVNC</title></head>
<body>
    <div id="noVNC_container"></div>
</body>
</html>
"#;

/// Something shaped like a GitHub zipball of noVNC
fn zipball() -> Vec<Entry> {
    let stored_png = Entry {
        metadata: EntryMetadata {
            compression_method: CompressionMethod::None,
            external_attributes: 0o100644 << 16,
            extra_field: vec![0x55, 0x54, 5, 0, 1, 0x10, 0x20, 0x30, 0x40],
            ..EntryMetadata::default()
        },
        ..Entry::new(
            "novnc-noVNC-33e1462/app/images/icons/novnc-16x16.png",
            vec![0x89, b'P', b'N', b'G', 0, 0, 0, 0],
        )
    };
    vec![
        Entry::directory("novnc-noVNC-33e1462/"),
        Entry::new("novnc-noVNC-33e1462/README.md", "# noVNC\n"),
        Entry::directory("novnc-noVNC-33e1462/app/"),
        Entry::new("novnc-noVNC-33e1462/app/ui.js", "const UI = {};\n"),
        Entry::directory("novnc-noVNC-33e1462/app/images/"),
        Entry::directory("novnc-noVNC-33e1462/app/images/icons/"),
        stored_png,
        Entry::new("novnc-noVNC-33e1462/vnc.html", VNC_HTML),
    ]
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn smoke() -> Result<()> {
    init_logging();

    let tempdir = tempfile::tempdir()?;
    let input_path = tempdir.path().join("novnc.zip");
    let output_path = tempdir.path().join("noVNC.zip");

    let input_entries = zipball();
    {
        let mut writer = ZipWriter::new(BufWriter::new(File::create(&input_path)?));
        for entry in &input_entries {
            writer.write_entry(entry)?;
        }
        writer.finish()?;
    }

    info!("Rewriting {:?}", input_path);
    let input = fs::read(&input_path).context("Couldn't read input")?;
    let table = PatchTable::builtin()?;
    let (summary, rewritten) = rewrite_bytes(&input, &table, &RewriteOptions::new())?;
    fs::write(&output_path, rewritten)?;

    assert_eq!(summary.entries, input_entries.len());
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.declared, 1);
    assert_eq!(summary.patched_entries, 1);

    let output = Archive::parse(&fs::read(&output_path)?)?;
    let paths: Vec<&str> = output.entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        paths,
        [
            "noVNC/",
            "noVNC/README.md",
            "noVNC/app/",
            "noVNC/app/ui.js",
            "noVNC/app/images/",
            "noVNC/app/images/icons/",
            "noVNC/app/images/icons/novnc-16x16.png",
            "noVNC/vnc.html",
        ]
    );

    // Everything but vnc.html made it through untouched.
    for (before, after) in input_entries.iter().zip(&output.entries) {
        if after.path == "noVNC/vnc.html" {
            continue;
        }
        assert_eq!(before.content, after.content);
        assert_eq!(before.metadata, after.metadata);
    }

    let vnc = output.lookup("noVNC/vnc.html")?;
    let html = std::str::from_utf8(&vnc.content)?;
    assert!(html.contains("<!-- rezip: begin patch --><script>"));
    assert!(html.contains("</script></body><!-- rezip: end patch -->\n</html>"));
    assert!(html.starts_with(VNC_HTML.split("</body>").next().unwrap()));
    assert_ne!(vnc.metadata.last_modified, input_entries[7].metadata.last_modified);

    match output.lookup("novnc-noVNC-33e1462/vnc.html") {
        Err(ZipError::NoSuchFile(p)) => assert_eq!(p, "novnc-noVNC-33e1462/vnc.html"),
        other => panic!("Expected no such file, got {:?}", other),
    }
    Ok(())
}

#[test]
fn upstream_drift_fails() -> Result<()> {
    init_logging();

    // Upstream renamed vnc.html; the patch table doesn't know.
    let entries: Vec<Entry> = zipball()
        .into_iter()
        .map(|mut e| {
            e.path = e.path.replace("vnc.html", "index.html");
            e
        })
        .collect();
    let input = write::to_vec(&entries)?;

    let table = PatchTable::builtin()?;
    match rewrite_bytes(&input, &table, &RewriteOptions::new()) {
        Err(ZipError::PatchCountMismatch { declared, applied }) => {
            assert_eq!(declared, 1);
            assert_eq!(applied, 0);
        }
        Err(other) => panic!("Got incorrect error for a stale patch: {:?}", other),
        Ok(_) => panic!("Stale patch table didn't fail"),
    }
    Ok(())
}

#[test]
fn prepended_archives() -> Result<()> {
    init_logging();

    let mut bytes = b"#!/bin/sh\necho self-extracting\n".to_vec();
    let prefix_len = bytes.len();
    bytes.extend(write::to_vec(&zipball())?);

    match ZipArchive::new(&bytes) {
        Err(ZipError::PrependedWithUnknownBytes(n)) => assert_eq!(n, prefix_len),
        Err(other) => panic!("Got incorrect error from prepended archive: {:?}", other),
        Ok(_) => panic!("Prepended archive read without complaint"),
    }

    let (archive, offset) = ZipArchive::with_prepended_data(&bytes)?;
    assert_eq!(offset, prefix_len);
    let archive = Archive::from_zip(&archive)?;
    assert_eq!(archive.entries, zipball());
    Ok(())
}

#[test]
fn corrupt_contents_are_caught() -> Result<()> {
    init_logging();

    let entry = Entry {
        metadata: EntryMetadata {
            compression_method: CompressionMethod::None,
            ..EntryMetadata::default()
        },
        ..Entry::new("root/plain.txt", "plain text, stored")
    };
    let mut bytes = write::to_vec([&entry])?;
    // Flip a byte of the stored contents, just after the 30-byte header and name.
    let data_start = 30 + entry.path.len();
    bytes[data_start] ^= 0xff;

    match Archive::parse(&bytes) {
        Err(ZipError::InvalidArchive(_)) => { /* Cool. */ }
        other => panic!("Corrupt archive parsed: {:?}", other),
    }
    Ok(())
}
