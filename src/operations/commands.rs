use anyhow::{Context, Result};

use crate::cli::Command;
use crate::storage::ObjectStore;
use crate::ui::format_size;

/// Run a one-shot command and return the lines to print.
pub async fn execute(store: &dyn ObjectStore, command: &Command) -> Result<Vec<String>> {
    match command {
        Command::List { prefix } => {
            let entries = store
                .list_objects(prefix)
                .await
                .with_context(|| format!("Failed to list '{prefix}'"))?;
            Ok(entries
                .iter()
                .map(|entry| {
                    if entry.is_prefix {
                        format!("{:>12}  {:<19}  {}", "DIR", "", entry.key)
                    } else {
                        let modified = entry
                            .last_modified
                            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_default();
                        format!(
                            "{:>12}  {:<19}  {}",
                            format_size(entry.size),
                            modified,
                            entry.key
                        )
                    }
                })
                .collect())
        }
        Command::Remove { key } => {
            store
                .delete_object(key)
                .await
                .with_context(|| format!("Failed to delete '{key}'"))?;
            Ok(vec![format!("Deleted {key}")])
        }
        Command::Move { from, to } => {
            store
                .rename_object(from, to)
                .await
                .with_context(|| format!("Failed to move '{from}' to '{to}'"))?;
            Ok(vec![format!("Moved {from} -> {to}")])
        }
        Command::MakeDir { path } => {
            store
                .create_folder(path)
                .await
                .with_context(|| format!("Failed to create folder '{path}'"))?;
            Ok(vec![format!("Created {path}")])
        }
        Command::Url { key } => Ok(vec![store.file_url(key)]),
        Command::Upload { .. } | Command::Download { .. } => {
            anyhow::bail!("'{}' runs in the transfer view", command.name())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StorageError, StoreOp};

    #[tokio::test]
    async fn list_shows_folders_then_objects() {
        let store = MemoryStore::new();
        store.insert("docs/readme.md", vec![0u8; 2048]);
        store.insert("docs/img/logo.png", "png");

        let lines = execute(
            &store,
            &Command::List {
                prefix: "docs/".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("DIR") && lines[0].ends_with("docs/img/"));
        assert!(lines[1].contains("2.00 KB") && lines[1].ends_with("docs/readme.md"));
    }

    #[tokio::test]
    async fn move_and_remove() {
        let store = MemoryStore::new();
        store.insert("a.txt", "a");

        let moved = Command::Move {
            from: "a.txt".to_string(),
            to: "archive/a.txt".to_string(),
        };
        execute(&store, &moved).await.unwrap();
        assert_eq!(store.keys(), vec!["archive/a.txt".to_string()]);

        let removed = Command::Remove {
            key: "archive/a.txt".to_string(),
        };
        execute(&store, &removed).await.unwrap();
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn mkdir_and_url() {
        let store = MemoryStore::new().with_base_url("https://cdn.example.com");
        execute(
            &store,
            &Command::MakeDir {
                path: "photos".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(store.keys(), vec!["photos/".to_string()]);

        let url = execute(
            &store,
            &Command::Url {
                key: "photos/a b.jpg".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(url, vec!["https://cdn.example.com/photos/a%20b.jpg".to_string()]);
    }

    #[tokio::test]
    async fn store_errors_carry_context() {
        let store = MemoryStore::new();
        store.fail_always(StoreOp::Delete, StorageError::unauthorized("no delete"));

        let err = execute(
            &store,
            &Command::Remove {
                key: "x".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Failed to delete 'x'"));
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::Unauthorized { .. })
        ));
    }
}
