//! Export aggregator: `done` cards → one tab-separated Anki import file.
//!
//! Each finished card becomes one line, `front<TAB>back`, and lines are
//! joined with `\n` in queue order. Items in any other state are left out.
//! Fields never contain a raw tab or line break: tabs become a space and
//! line breaks become the [`SanitizePolicy`] separator, so Anki's
//! "fields separated by Tab" importer sees exactly two columns per row.

use crate::config::SanitizePolicy;
use crate::error::AnkiBatchError;
use crate::model::{ItemStatus, QueuedItem};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Flatten one card field onto a single line.
///
/// The result never contains a tab or line break, whatever the policy.
pub fn sanitize_field(text: &str, policy: &SanitizePolicy) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\t', " ")
        .replace('\n', &policy.line_break())
}

/// Serialise every `done` card, in queue order.
///
/// Returns an empty string when nothing is done. Calling this twice on the
/// same queue state yields identical output.
pub fn export_cards(items: &[QueuedItem], policy: &SanitizePolicy) -> String {
    items
        .iter()
        .filter(|item| item.status() == ItemStatus::Done)
        .filter_map(QueuedItem::card)
        .map(|card| {
            format!(
                "{}\t{}",
                sanitize_field(&card.front, policy),
                sanitize_field(&card.back, policy)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write the export to `path` atomically and return the number of cards.
///
/// The payload goes to a temporary file next to `path` which is then
/// renamed over it, so a reader never sees a half-written file. Fails with
/// [`AnkiBatchError::NothingToExport`] when no item is done.
pub async fn export_to_file(
    items: &[QueuedItem],
    policy: &SanitizePolicy,
    path: impl AsRef<Path>,
) -> Result<usize, AnkiBatchError> {
    let count = items
        .iter()
        .filter(|item| item.status() == ItemStatus::Done && item.card().is_some())
        .count();
    if count == 0 {
        return Err(AnkiBatchError::NothingToExport);
    }

    let payload = export_cards(items, policy);
    let path = path.as_ref().to_path_buf();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| write_failed(&path, e))?;

    let target = path.clone();
    tokio::task::spawn_blocking(move || -> Result<(), AnkiBatchError> {
        let mut tmp =
            tempfile::NamedTempFile::new_in(&parent).map_err(|e| write_failed(&target, e))?;
        tmp.write_all(payload.as_bytes())
            .map_err(|e| write_failed(&target, e))?;
        tmp.persist(&target)
            .map_err(|e| write_failed(&target, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| AnkiBatchError::Internal(format!("Export task panicked: {e}")))??;

    info!("Exported {} card(s) to {}", count, path.display());
    Ok(count)
}

/// `anki_batch_<unix-millis>.txt`
pub fn default_export_file_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let name = format!("anki_batch_{millis}.txt");
    debug!("Default export file name: {}", name);
    name
}

fn write_failed(path: &Path, source: std::io::Error) -> AnkiBatchError {
    AnkiBatchError::ExportWriteFailed {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Card, ImagePayload};

    fn done(front: &str, back: &str) -> QueuedItem {
        let mut item = QueuedItem::new(ImagePayload::new("AAAA", "image/png"));
        item.begin();
        item.complete(Card::new(front, back));
        item
    }

    fn failed() -> QueuedItem {
        let mut item = QueuedItem::new(ImagePayload::new("AAAA", "image/png"));
        item.begin();
        item.fail("extraction failed");
        item
    }

    fn pending() -> QueuedItem {
        QueuedItem::new(ImagePayload::new("AAAA", "image/png"))
    }

    #[test]
    fn only_done_items_are_exported_in_order() {
        let items = vec![done("Q1", "A1"), failed(), pending(), done("Q2", "A2")];
        assert_eq!(
            export_cards(&items, &SanitizePolicy::default()),
            "Q1\tA1\nQ2\tA2"
        );
    }

    #[test]
    fn html_break_policy() {
        let items = vec![done("line one\nline two", "a\tb\r\nc")];
        assert_eq!(
            export_cards(&items, &SanitizePolicy::HtmlBreak),
            "line one<br><br>line two\ta b<br><br>c"
        );
    }

    #[test]
    fn space_policy() {
        let items = vec![done("x\ny", "p\rq")];
        assert_eq!(export_cards(&items, &SanitizePolicy::Space), "x y\tp q");
    }

    #[test]
    fn custom_policy() {
        let policy = SanitizePolicy::Custom(" / ".into());
        assert_eq!(sanitize_field("a\nb", &policy), "a / b");
    }

    #[test]
    fn unvalidated_custom_separator_cannot_split_rows() {
        let items = vec![done("a\nb", "c"), done("q1\nq2", "a")];
        for sep in ["\t", "\n", "\r\n", "<br>\t"] {
            let out = export_cards(&items, &SanitizePolicy::Custom(sep.into()));
            let lines: Vec<&str> = out.split('\n').collect();
            assert_eq!(lines.len(), 2, "separator {sep:?} gave {out:?}");
            assert!(lines.iter().all(|l| l.matches('\t').count() == 1));
        }
        assert_eq!(
            export_cards(&items[..1], &SanitizePolicy::Custom("\t".into())),
            "a b\tc"
        );
    }

    #[test]
    fn fields_never_contain_raw_separators() {
        let items = vec![
            done("\t\tleading tabs\n\n", "mixed\r\n\tbreaks\r"),
            done("plain", "plain"),
        ];
        for policy in [SanitizePolicy::HtmlBreak, SanitizePolicy::Space] {
            let out = export_cards(&items, &policy);
            let lines: Vec<&str> = out.split('\n').collect();
            assert_eq!(lines.len(), 2);
            for line in lines {
                assert_eq!(line.matches('\t').count(), 1, "line: {line:?}");
                assert!(!line.contains('\r'));
            }
        }
    }

    #[test]
    fn export_is_idempotent() {
        let items = vec![done("Q", "multi\nline"), failed()];
        let policy = SanitizePolicy::default();
        assert_eq!(export_cards(&items, &policy), export_cards(&items, &policy));
    }

    #[test]
    fn nothing_done_exports_empty() {
        assert_eq!(
            export_cards(&[failed(), pending()], &SanitizePolicy::default()),
            ""
        );
    }

    #[tokio::test]
    async fn export_to_file_writes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cards.txt");
        let items = vec![done("Q1", "A1"), failed()];

        let count = export_to_file(&items, &SanitizePolicy::default(), &path)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Q1\tA1");
    }

    #[tokio::test]
    async fn export_to_file_refuses_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.txt");
        let err = export_to_file(&[failed()], &SanitizePolicy::default(), &path)
            .await
            .unwrap_err();
        assert!(matches!(err, AnkiBatchError::NothingToExport));
        assert!(!path.exists());
    }

    #[test]
    fn default_name_shape() {
        let name = default_export_file_name();
        assert!(name.starts_with("anki_batch_"));
        assert!(name.ends_with(".txt"));
        let digits = &name["anki_batch_".len()..name.len() - ".txt".len()];
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }
}
