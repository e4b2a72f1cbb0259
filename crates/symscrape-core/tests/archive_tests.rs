use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;
use zip::ZipArchive;

use symscrape_core::archive::repack::{repack_local_store, LastRun};
use symscrape_core::archive::{ArchiveSummary, SymbolSink, ZipArchiveSink};
use symscrape_core::symbols::SymbolRecord;

fn record(debug_file: &str, debug_id: &str) -> SymbolRecord {
    let payload = format!("MODULE Linux x86_64 {} {}\nFUNC 0 1 0 f\n", debug_id, debug_file);
    SymbolRecord::from_dump(payload.into_bytes()).unwrap()
}

fn write_gz(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

fn entry_text(archive: &Path, name: &str) -> String {
    let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    let mut text = String::new();
    zip.by_name(name).unwrap().read_to_string(&mut text).unwrap();
    text
}

#[test]
fn test_archive_layout_and_manifest() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("symbols.zip");
    let mut sink = ZipArchiveSink::create(&dest, "ossyms-1.0-Linux").unwrap();

    assert!(sink.accept(&record("libfoo.so", "AAAA")).unwrap());
    assert!(sink.accept(&record("libbar.so", "BBBB")).unwrap());
    assert!(!sink.accept(&record("libfoo.so", "AAAA")).unwrap());
    assert_eq!(sink.len(), 2);
    assert!(!dest.exists());

    let summary = sink.finalize().unwrap().unwrap();
    assert_eq!(summary.path, dest);
    assert!(dest.is_file());

    let manifest = entry_text(&dest, &summary.manifest_name);
    assert_eq!(
        manifest,
        "libfoo.so/AAAA/libfoo.so.sym\nlibbar.so/BBBB/libbar.so.sym"
    );
    assert!(entry_text(&dest, "libbar.so/BBBB/libbar.so.sym").starts_with("MODULE Linux"));

    let mut zip = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
    let entry = zip.by_name("libfoo.so/AAAA/libfoo.so.sym").unwrap();
    assert_eq!(entry.unix_mode().map(|m| m & 0o777), Some(0o664));
    drop(entry);
    assert_eq!(zip.len(), 3);

    let reopened = ArchiveSummary::open(&dest).unwrap();
    assert_eq!(reopened.manifest_name, summary.manifest_name);
    assert_eq!(
        reopened.entries,
        vec![
            "libbar.so/BBBB/libbar.so.sym".to_string(),
            "libfoo.so/AAAA/libfoo.so.sym".to_string(),
        ]
    );
}

#[test]
fn test_empty_archive_is_discarded() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("symbols.zip");
    let sink = ZipArchiveSink::create(&dest, "ossyms-1.0-Linux").unwrap();
    assert!(sink.is_empty());
    assert!(sink.finalize().unwrap().is_none());
    assert!(!dest.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_abandoned_archive_leaves_nothing_behind() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("symbols.zip");
    {
        let mut sink = ZipArchiveSink::create(&dest, "ossyms-1.0-Linux").unwrap();
        sink.accept(&record("libfoo.so", "AAAA")).unwrap();
    }
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_open_rejects_archive_without_manifest() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.zip");
    let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
    writer
        .start_file("a/b/a.sym", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"MODULE").unwrap();
    writer.finish().unwrap();

    assert!(ArchiveSummary::open(&path).is_err());
}

#[test]
fn test_repack_only_takes_files_newer_than_last_run() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("store");
    write_gz(&store.join("libold.dylib/1111/libold.dylib.sym.gz"), "MODULE old");

    let last_run = LastRun::new(dir.path().join("last-run"));
    thread::sleep(Duration::from_millis(50));
    last_run.store(SystemTime::now()).unwrap();
    thread::sleep(Duration::from_millis(50));

    write_gz(&store.join("libnew.dylib/2222/libnew.dylib.sym.gz"), "MODULE new");
    fs::write(store.join("README"), "not gzipped").unwrap();

    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    let mut sink = ZipArchiveSink::create(&out.join("repack.zip"), "osxsyms-1.0-Darwin").unwrap();
    let since = last_run.load().unwrap();
    let added = repack_local_store(&store, since, &mut sink).unwrap();
    assert_eq!(added, 1);

    let summary = sink.finalize().unwrap().unwrap();
    assert_eq!(summary.entries, vec!["libnew.dylib/2222/libnew.dylib.sym".to_string()]);
    assert!(summary.manifest_name.starts_with("osxsyms-1.0-Darwin-"));
    assert_eq!(
        entry_text(&summary.path, "libnew.dylib/2222/libnew.dylib.sym"),
        "MODULE new"
    );
}

#[test]
fn test_repack_without_last_run_takes_everything() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("store");
    write_gz(&store.join("a.dylib/1/a.dylib.sym.gz"), "MODULE a");
    write_gz(&store.join("b.dylib/2/b.dylib.sym.gz"), "MODULE b");

    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    let mut sink = ZipArchiveSink::create(&out.join("repack.zip"), "osxsyms-1.0-Darwin").unwrap();
    assert_eq!(repack_local_store(&store, None, &mut sink).unwrap(), 2);
}
