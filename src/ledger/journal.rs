use crate::models::{revisions_match, same_document_number, ProcessTransition};

/// Append-only process-control log.
///
/// The remote sheet's row order is the ground truth, so "latest" is the last
/// matching row, never the one with the greatest timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessJournal {
    entries: Vec<ProcessTransition>,
}

impl ProcessJournal {
    pub fn new(entries: Vec<ProcessTransition>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ProcessTransition] {
        &self.entries
    }

    pub fn history_for<'a>(
        &'a self,
        document_number: &'a str,
        revision: Option<&'a str>,
    ) -> impl DoubleEndedIterator<Item = &'a ProcessTransition> + 'a {
        self.entries
            .iter()
            .filter(move |entry| Self::matches(entry, document_number, revision))
    }

    fn matches(entry: &ProcessTransition, document_number: &str, revision: Option<&str>) -> bool {
        same_document_number(&entry.document_number, document_number)
            && revision.map_or(true, |revision| revisions_match(&entry.revision, revision))
    }

    pub fn latest_transition(&self, document_number: &str, revision: Option<&str>) -> Option<&ProcessTransition> {
        self.entries
            .iter()
            .rev()
            .find(|entry| Self::matches(entry, document_number, revision))
    }

    pub fn append(&mut self, transition: ProcessTransition) {
        self.entries.push(transition);
    }

    pub fn remove(&mut self, transition_id: &str) -> Option<ProcessTransition> {
        let position = self.entries.iter().position(|entry| entry.id == transition_id)?;
        Some(self.entries.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::ProcessJournal;
    use crate::models::{ProcessTransition, StatusTag};

    fn transition(id: &str, revision: &str, timestamp: &str, tag: StatusTag) -> ProcessTransition {
        ProcessTransition {
            id: id.to_string(),
            document_number: "4410".to_string(),
            revision: revision.to_string(),
            timestamp: timestamp.to_string(),
            actor: "planilha".to_string(),
            description: String::new(),
            attachment: None,
            tag,
        }
    }

    #[test]
    fn latest_is_last_appended_not_newest_timestamp() {
        let journal = ProcessJournal::new(vec![
            transition("1", "6", "20/03/2024 10:00", StatusTag::Searching),
            transition("2", "6", "01/03/2024 10:00", StatusTag::Resolved),
        ]);
        let latest = journal.latest_transition("4410", Some("6")).expect("latest");
        assert_eq!(latest.tag, StatusTag::Resolved);
    }

    #[test]
    fn revision_filter_ignores_leading_zeros() {
        let journal = ProcessJournal::new(vec![
            transition("1", "06", "01/03/2024", StatusTag::Searching),
            transition("2", "7", "02/03/2024", StatusTag::Disputed),
        ]);
        assert_eq!(journal.history_for("4410", Some("6")).count(), 1);
        assert_eq!(
            journal.latest_transition("4410", Some("6")).map(|t| t.id.as_str()),
            Some("1")
        );
        assert_eq!(journal.history_for("4410", None).count(), 2);
        assert!(journal.latest_transition("9999", None).is_none());
    }

    #[test]
    fn append_and_remove() {
        let mut journal = ProcessJournal::default();
        journal.append(transition("temp", "1", "", StatusTag::Searching));
        assert_eq!(journal.len(), 1);
        assert!(journal.remove("temp").is_some());
        assert!(journal.is_empty());
    }
}
