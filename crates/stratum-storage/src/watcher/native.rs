//! Translation of OS filesystem events into file changes

use std::path::PathBuf;

use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::Event;

use super::ChangeKind;

/// File-level changes carried by one native event
///
/// Renames become a delete of the old path and a create of the new one.
/// Folder events and access notifications are dropped.
pub fn translate(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
    let each = |kind: ChangeKind| -> Vec<(PathBuf, ChangeKind)> {
        event.paths.iter().map(|p| (p.clone(), kind)).collect()
    };

    match &event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Create(_) => each(ChangeKind::Created),
        EventKind::Remove(_) => each(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
            (RenameMode::Both, [from, to, ..]) => vec![
                (from.clone(), ChangeKind::Deleted),
                (to.clone(), ChangeKind::Created),
            ],
            (RenameMode::From, _) => each(ChangeKind::Deleted),
            (RenameMode::To, _) => each(ChangeKind::Created),
            _ => event
                .paths
                .iter()
                .map(|p| {
                    let kind = if p.exists() {
                        ChangeKind::Created
                    } else {
                        ChangeKind::Deleted
                    };
                    (p.clone(), kind)
                })
                .collect(),
        },
        EventKind::Modify(_) => each(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::DataChange;

    #[test]
    fn test_rename_becomes_delete_and_create() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/cfg/old.json"))
            .add_path(PathBuf::from("/cfg/new.json"));
        assert_eq!(
            translate(&event),
            vec![
                (PathBuf::from("/cfg/old.json"), ChangeKind::Deleted),
                (PathBuf::from("/cfg/new.json"), ChangeKind::Created),
            ]
        );
    }

    #[test]
    fn test_folder_events_dropped() {
        let event = Event::new(EventKind::Create(CreateKind::Folder)).add_path(PathBuf::from("/cfg/sub"));
        assert!(translate(&event).is_empty());
    }

    #[test]
    fn test_content_write_is_modified() {
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/cfg/config.json"));
        assert_eq!(
            translate(&event),
            vec![(PathBuf::from("/cfg/config.json"), ChangeKind::Modified)]
        );
    }
}
