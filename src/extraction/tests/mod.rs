use crate::error::{Error, ExtractError, NO_CORRECT_PASSWORD};
use crate::extraction::*;
use crate::test_helpers::{FakeArchive, FakeArchiveTool, WrongPasswordBehavior, write_file};
use crate::types::Event;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn entries(list: &PasswordList) -> Vec<Option<&str>> {
    list.iter().map(|p| p.as_deref()).collect()
}

fn single_unit(archive: &Path) -> ExtractionUnit {
    ExtractionUnit {
        representative: archive.to_path_buf(),
        members: vec![archive.to_path_buf()],
        base_name: base_name(
            &archive.file_name().unwrap().to_string_lossy(),
            &NameRules::default(),
        ),
    }
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// PasswordList
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_password_list_collect_empty() {
    let passwords = PasswordList::collect(&[], None, false).await;
    assert!(passwords.is_empty());
    assert_eq!(passwords.len(), 0);
}

#[tokio::test]
async fn test_password_list_no_password_comes_first() {
    let passwords = PasswordList::collect(&["test".to_string()], None, true).await;
    assert_eq!(entries(&passwords), vec![None, Some("test")]);
}

#[tokio::test]
async fn test_password_list_empty_string_differs_from_no_password() {
    let passwords = PasswordList::collect(&[String::new()], None, true).await;
    assert_eq!(entries(&passwords), vec![None, Some("")]);
}

#[tokio::test]
async fn test_password_list_collect_deduplication() {
    let passwords = PasswordList::collect(
        &[
            "duplicate".to_string(),
            "duplicate".to_string(),
            "unique".to_string(),
        ],
        None,
        false,
    )
    .await;
    assert_eq!(entries(&passwords), vec![Some("duplicate"), Some("unique")]);
}

#[tokio::test]
async fn test_password_list_from_file() {
    use std::io::Write;
    use tempfile::NamedTempFile;

    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "password1").unwrap();
    writeln!(temp_file, "password2").unwrap();
    writeln!(temp_file).unwrap(); // Empty line should be ignored
    writeln!(temp_file, "  password3  ").unwrap(); // Should be trimmed
    writeln!(temp_file, "explicit").unwrap(); // Duplicate of an explicit password
    temp_file.flush().unwrap();

    let passwords =
        PasswordList::collect(&["explicit".to_string()], Some(temp_file.path()), true).await;
    assert_eq!(
        entries(&passwords),
        vec![
            None,
            Some("explicit"),
            Some("password1"),
            Some("password2"),
            Some("password3"),
        ]
    );
}

#[tokio::test]
async fn test_password_list_missing_file_is_skipped() {
    let passwords = PasswordList::collect(
        &["pw".to_string()],
        Some(Path::new("/nonexistent/passwords.txt")),
        true,
    )
    .await;
    assert_eq!(entries(&passwords), vec![None, Some("pw")]);
}

#[test]
fn test_password_list_promote() {
    let mut passwords = PasswordList::from_entries(vec![
        None,
        Some("a".to_string()),
        Some("b".to_string()),
    ]);
    passwords.promote(&Some("b".to_string()));
    assert_eq!(entries(&passwords), vec![Some("b"), None, Some("a")]);

    // Unknown and already-first entries leave the order alone
    passwords.promote(&Some("zzz".to_string()));
    passwords.promote(&Some("b".to_string()));
    assert_eq!(entries(&passwords), vec![Some("b"), None, Some("a")]);
}

// ---------------------------------------------------------------------------
// PasswordTrialExtractor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_trial_succeeds_without_password() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("photos.zip");
    write_file(&archive, 100);
    let tool = FakeArchiveTool::new().with(
        "photos.zip",
        FakeArchive::new("zip").entry("a.jpg", vec![1u8; 80]),
    );
    let (tx, mut rx) = broadcast::channel(100);

    let extractor = PasswordTrialExtractor::new(&tool, RatioThresholds::default(), &tx);
    let success = extractor
        .extract(&single_unit(&archive), &PasswordList::no_password())
        .await
        .unwrap();

    assert_eq!(success.output_dir, temp_dir.path().join("photos"));
    assert_eq!(success.password, None);
    assert!((success.ratio - 0.8).abs() < 1e-9);
    assert!(success.output_dir.join("a.jpg").exists());

    let events = drain(&mut rx);
    assert!(matches!(events[0], Event::Extracting { attempt: 1, total: 1, .. }));
    assert!(matches!(events.last(), Some(Event::Extracted { .. })));
}

#[tokio::test]
async fn test_trial_moves_past_wrong_passwords() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("secret.7z");
    write_file(&archive, 100);
    let tool = FakeArchiveTool::new().with(
        "secret.7z",
        FakeArchive::new("7z")
            .password("right")
            .wrong_password(WrongPasswordBehavior::Error)
            .entry("doc.pdf", vec![0u8; 120]),
    );
    let (tx, mut rx) = broadcast::channel(100);
    let passwords = PasswordList::from_entries(vec![
        None,
        Some("wrong".to_string()),
        Some("right".to_string()),
    ]);

    let extractor = PasswordTrialExtractor::new(&tool, RatioThresholds::default(), &tx);
    let success = extractor
        .extract(&single_unit(&archive), &passwords)
        .await
        .unwrap();

    assert_eq!(success.password.as_deref(), Some("right"));
    // Rejected attempts left nothing behind
    let dirs: Vec<PathBuf> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .collect();
    assert_eq!(dirs, vec![success.output_dir.clone()]);

    let wrong = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, Event::WrongPassword { .. }))
        .count();
    assert_eq!(wrong, 2);
}

#[tokio::test]
async fn test_trial_exhausted_list_is_no_correct_password() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("secret.zip");
    write_file(&archive, 1000);
    let tool = FakeArchiveTool::new().with(
        "secret.zip",
        FakeArchive::new("zip")
            .password("unknown")
            .entry("data.bin", vec![0u8; 900]),
    );
    let (tx, _rx) = broadcast::channel(100);
    let passwords = PasswordList::from_entries(vec![
        None,
        Some("wrong1".to_string()),
        Some("wrong2".to_string()),
    ]);

    let extractor = PasswordTrialExtractor::new(&tool, RatioThresholds::default(), &tx);
    let err = extractor
        .extract(&single_unit(&archive), &passwords)
        .await
        .unwrap_err();

    match err {
        Error::Extract(ExtractError::ExtractionFailed { reason, .. }) => {
            assert_eq!(reason, NO_CORRECT_PASSWORD);
        }
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
    assert_eq!(tool.extract_calls().len(), 3);
    assert!(archive.exists());
    assert!(!temp_dir.path().join("secret").exists());
}

#[tokio::test]
async fn test_trial_stops_on_corrupt_archive() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("broken.rar");
    write_file(&archive, 100);
    let tool = FakeArchiveTool::new().with(
        "broken.rar",
        FakeArchive::new("Rar5").exit_code(2).entry("x.bin", vec![0u8; 10]),
    );
    let (tx, _rx) = broadcast::channel(100);
    let passwords = PasswordList::from_entries(vec![None, Some("next".to_string())]);

    let extractor = PasswordTrialExtractor::new(&tool, RatioThresholds::default(), &tx);
    let err = extractor
        .extract(&single_unit(&archive), &passwords)
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "extraction_failed");
    assert_eq!(tool.extract_calls().len(), 1, "no further passwords after a terminal failure");
}

#[tokio::test]
async fn test_trial_with_empty_list_is_no_passwords_available() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("a.zip");
    write_file(&archive, 10);
    let tool = FakeArchiveTool::new();
    let (tx, _rx) = broadcast::channel(100);

    let extractor = PasswordTrialExtractor::new(&tool, RatioThresholds::default(), &tx);
    let err = extractor
        .extract(&single_unit(&archive), &PasswordList::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Extract(ExtractError::NoPasswordsAvailable { .. })
    ));
    assert!(tool.calls().is_empty());
}

#[tokio::test]
async fn test_trial_propagates_launch_failure() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("a.zip");
    write_file(&archive, 10);
    let tool = FakeArchiveTool::unlaunchable();
    let (tx, _rx) = broadcast::channel(100);

    let extractor = PasswordTrialExtractor::new(&tool, RatioThresholds::default(), &tx);
    let err = extractor
        .extract(&single_unit(&archive), &PasswordList::no_password())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(!temp_dir.path().join("a").exists());
}

#[tokio::test]
async fn test_trial_uses_unique_output_directory() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("music.zip");
    write_file(&archive, 100);
    std::fs::create_dir(temp_dir.path().join("music")).unwrap();
    let tool = FakeArchiveTool::new().with(
        "music.zip",
        FakeArchive::new("zip").entry("song.flac", vec![0u8; 100]),
    );
    let (tx, _rx) = broadcast::channel(100);

    let extractor = PasswordTrialExtractor::new(&tool, RatioThresholds::default(), &tx);
    let success = extractor
        .extract(&single_unit(&archive), &PasswordList::no_password())
        .await
        .unwrap();
    assert_eq!(success.output_dir, temp_dir.path().join("music (1)"));
}

#[tokio::test]
async fn test_volume_set_archive_bytes_cover_all_members() {
    let temp_dir = TempDir::new().unwrap();
    let members: Vec<PathBuf> = (1..=3)
        .map(|i| temp_dir.path().join(format!("report.7z.00{i}")))
        .collect();
    for member in &members {
        write_file(member, 100);
    }
    let unit = ExtractionUnit {
        representative: members[0].clone(),
        members,
        base_name: "report".to_string(),
    };
    assert_eq!(unit.archive_bytes(), 300);
}
