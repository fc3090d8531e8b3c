use std::io::Write;

use tracing_subscriber::fmt::MakeWriter;

use crate::logger::config::*;
use crate::logger::writer::LogFileWriter;

fn file_config(path: std::path::PathBuf, append: bool) -> FileConfig {
    FileConfig {
        enabled: true,
        path,
        append,
        format: LogFormat::Json,
    }
}

#[test]
fn test_writer_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("deeper").join("app.log");

    let writer = LogFileWriter::new(&file_config(path.clone(), true)).unwrap();
    {
        let mut guard = writer.make_writer();
        guard.write_all(b"hello\n").unwrap();
    }

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    assert!(!writer.is_in_fallback_mode());
}

#[test]
fn test_append_mode_keeps_existing_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    std::fs::write(&path, "first\n").unwrap();

    let writer = LogFileWriter::new(&file_config(path.clone(), true)).unwrap();
    {
        let mut guard = writer.make_writer();
        guard.write_all(b"second\n").unwrap();
    }

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
}

#[test]
fn test_truncate_mode_replaces_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    std::fs::write(&path, "stale\n").unwrap();

    let writer = LogFileWriter::new(&file_config(path.clone(), false)).unwrap();
    {
        let mut guard = writer.make_writer();
        guard.write_all(b"fresh\n").unwrap();
    }

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh\n");
}

#[test]
fn test_guards_share_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let writer = LogFileWriter::new(&file_config(path.clone(), true)).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let writer = writer.clone();
            std::thread::spawn(move || {
                let mut guard = writer.make_writer();
                guard.write_all(format!("line-{i}\n").as_bytes()).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 4);
}

#[test]
fn test_init_logger_with_console_and_file_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("both.log");
    let config = LoggerConfig {
        console: ConsoleConfig::new(true, false),
        file: FileConfig {
            format: LogFormat::Compact,
            ..file_config(path.clone(), true)
        },
        level: "info".to_string(),
    };

    // Only this test installs the global subscriber
    crate::logger::init_logger(config.clone()).unwrap();
    tracing::info!(target: "parl_pipeline::logger", "both outputs ready");

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("both outputs ready"));

    let again = crate::logger::init_logger(config);
    assert!(matches!(again, Err(crate::logger::LoggerError::Init { .. })));
}
